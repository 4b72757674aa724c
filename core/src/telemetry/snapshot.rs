//! telemetry/snapshot.rs
//! Immutable summary of one race, serializable for reports.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::arbiter::Candidate;
use crate::telemetry::counters::{CounterValues, RaceCounters};
use crate::telemetry::timers::StageTimes;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceSnapshot {
    pub job: String,
    pub input_bytes: u64,
    pub best_bytes: Option<u64>,
    pub best_source: Option<String>,
    /// `best_bytes / input_bytes`, 0.0 without a best.
    pub compression_ratio: f64,
    pub elapsed: Duration,
    pub counters: CounterValues,
    pub stage_times: StageTimes,
}

impl RaceSnapshot {
    pub fn from(
        job: &str,
        counters: &RaceCounters,
        started: Instant,
        input_len: usize,
        best: Option<&Candidate>,
    ) -> Self {
        let best_bytes = best.map(|c| c.len() as u64);
        let compression_ratio = match best_bytes {
            Some(b) if input_len > 0 => b as f64 / input_len as f64,
            _ => 0.0,
        };

        Self {
            job: job.to_string(),
            input_bytes: input_len as u64,
            best_bytes,
            best_source: best.map(|c| c.source.clone()),
            compression_ratio,
            elapsed: started.elapsed(),
            counters: counters.values(),
            stage_times: counters.stage_times(),
        }
    }

    /// Bytes saved relative to the input, if any best exists.
    pub fn saved_bytes(&self) -> Option<u64> {
        self.best_bytes.map(|b| self.input_bytes.saturating_sub(b))
    }

    /// A best exists exactly when at least one improvement was recorded.
    pub fn sanity_check(&self) -> bool {
        self.best_bytes.is_some() == (self.counters.improvements > 0)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
