//! telemetry/timers.rs
//! Time spent per race stage, summed over all workers.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Producing a candidate (in-process encoder or external tool).
    Encode,
    /// Decoding a candidate to check it against the input.
    Verify,
    /// Secondary recompression of an earlier candidate.
    Recompress,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Encode, Stage::Verify, Stage::Recompress];

    pub(crate) fn index(self) -> usize {
        match self {
            Stage::Encode => 0,
            Stage::Verify => 1,
            Stage::Recompress => 2,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Encode => "encode",
            Stage::Verify => "verify",
            Stage::Recompress => "recompress",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTimes {
    pub times: HashMap<Stage, Duration>,
}

impl StageTimes {
    pub fn add(&mut self, stage: Stage, dur: Duration) {
        *self.times.entry(stage).or_insert(Duration::ZERO) += dur;
    }

    pub fn get(&self, stage: Stage) -> Duration {
        self.times.get(&stage).copied().unwrap_or(Duration::ZERO)
    }

    pub fn total(&self) -> Duration {
        self.times.values().copied().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Stage, &Duration)> {
        self.times.iter()
    }
}
