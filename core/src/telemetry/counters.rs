//! telemetry/counters.rs
//! Live counters shared by every task of one race.
//!
//! Summary: workers bump atomics as they go; `values()` copies them into a
//! plain struct for snapshots and reports.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::arbiter::RegistrationOutcome;
use crate::telemetry::timers::{Stage, StageTimes};

#[derive(Debug, Default)]
pub struct RaceCounters {
    tasks_spawned: AtomicU64,
    tasks_failed: AtomicU64,
    improvements: AtomicU64,
    no_improvements: AtomicU64,
    invalid: AtomicU64,
    gated: AtomicU64,
    second_gate_skips: AtomicU64,
    bytes_offered: AtomicU64,
    stage_nanos: [AtomicU64; 3],
}

impl RaceCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task_spawned(&self) {
        self.tasks_spawned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn task_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one registration and the candidate bytes it carried.
    pub fn record(&self, outcome: RegistrationOutcome, candidate_len: usize) {
        let counter = match outcome {
            RegistrationOutcome::Improvement => &self.improvements,
            RegistrationOutcome::NoImprovement => &self.no_improvements,
            RegistrationOutcome::Invalid => &self.invalid,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.bytes_offered.fetch_add(candidate_len as u64, Ordering::Relaxed);
    }

    /// A candidate rejected by the size gate before any decoding.
    pub fn gated(&self) {
        self.gated.fetch_add(1, Ordering::Relaxed);
    }

    /// A candidate that passed decoder A but lost before decoder B ran.
    pub fn second_gate_skip(&self) {
        self.second_gate_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_stage_time(&self, stage: Stage, dur: Duration) {
        let nanos = u64::try_from(dur.as_nanos()).unwrap_or(u64::MAX);
        self.stage_nanos[stage.index()].fetch_add(nanos, Ordering::Relaxed);
    }

    pub fn values(&self) -> CounterValues {
        CounterValues {
            tasks_spawned: self.tasks_spawned.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            improvements: self.improvements.load(Ordering::Relaxed),
            no_improvements: self.no_improvements.load(Ordering::Relaxed),
            invalid: self.invalid.load(Ordering::Relaxed),
            gated: self.gated.load(Ordering::Relaxed),
            second_gate_skips: self.second_gate_skips.load(Ordering::Relaxed),
            bytes_offered: self.bytes_offered.load(Ordering::Relaxed),
        }
    }

    pub fn stage_times(&self) -> StageTimes {
        let mut times = StageTimes::default();
        for stage in Stage::ALL {
            let nanos = self.stage_nanos[stage.index()].load(Ordering::Relaxed);
            if nanos > 0 {
                times.add(stage, Duration::from_nanos(nanos));
            }
        }
        times
    }
}

/// Plain copy of [`RaceCounters`] at one point in time.
#[derive(Default, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterValues {
    pub tasks_spawned: u64,
    pub tasks_failed: u64,
    pub improvements: u64,
    pub no_improvements: u64,
    pub invalid: u64,
    pub gated: u64,
    pub second_gate_skips: u64,
    pub bytes_offered: u64,
}

impl CounterValues {
    pub fn registrations(&self) -> u64 {
        self.improvements + self.no_improvements + self.invalid
    }
}
