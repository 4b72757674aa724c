//! config/mod.rs
//! Configuration store and the typed race settings resolved from it.

pub mod discovery;
pub mod intensity;
pub mod store;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::constants::{
    tool_names, DEFAULT_INTENSITY, DEFAULT_KILL_GRACE, DEFAULT_POLL_INTERVAL, DEFAULT_RELAY_CAPACITY,
    DEFAULT_RELAY_JOIN_GRACE, MAX_INTENSITY, MAX_WORKERS, PARAM_CORES, PARAM_INTENSITY, PARAM_KILL_GRACE_MS,
    PARAM_POLL_INTERVAL_MS, PARAM_RELAY_CAPACITY, PARAM_RELAY_JOIN_GRACE_MS, SIZE_GATE_DEN, SIZE_GATE_NUM,
};
use crate::engine::ParallelismProfile;
use crate::process::SessionTiming;

pub use discovery::{is_executable_file, locate_executable};
pub use intensity::{interpolate, quality_range};
pub use store::Configuration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: expected {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },
    #[error("argument {0:?} has no key")]
    EmptyKey(String),
}

/// Cheap pre-verification filter for candidates.
///
/// A candidate is only decoded if `size * den <= best * num`. After the
/// first decoder, `second_check` skips the second decoder for candidates
/// already larger than the (possibly updated) best.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SizeGate {
    pub num: u64,
    pub den: u64,
    pub second_check: bool,
}

impl SizeGate {
    /// True if a candidate of `size` bytes is worth decoding.
    pub fn admits(&self, best: Option<usize>, size: usize) -> bool {
        best.map_or(true, |b| (size as u64).saturating_mul(self.den) <= (b as u64).saturating_mul(self.num))
    }

    /// No gate at all.
    pub fn disabled() -> Self {
        Self {
            num: u64::MAX,
            den: 1,
            second_check: false,
        }
    }
}

impl Default for SizeGate {
    fn default() -> Self {
        Self {
            num: SIZE_GATE_NUM,
            den: SIZE_GATE_DEN,
            second_check: true,
        }
    }
}

/// Typed settings consumed by the engine, sessions and candidates.
#[derive(Debug, Clone, PartialEq)]
pub struct RaceConfig {
    pub workers: usize,
    pub intensity: u8,
    pub size_gate: SizeGate,
    pub relay_capacity: usize,
    pub poll_interval: Duration,
    pub kill_grace: Duration,
    pub relay_join_grace: Duration,
    /// Executable overrides keyed by tool name.
    pub tool_overrides: BTreeMap<String, PathBuf>,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get().clamp(1, MAX_WORKERS - 1),
            intensity: DEFAULT_INTENSITY,
            size_gate: SizeGate::default(),
            relay_capacity: DEFAULT_RELAY_CAPACITY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            kill_grace: DEFAULT_KILL_GRACE,
            relay_join_grace: DEFAULT_RELAY_JOIN_GRACE,
            tool_overrides: BTreeMap::new(),
        }
    }
}

impl RaceConfig {
    /// Resolve settings from a store. Out-of-range worker counts fall back
    /// to the default; intensity is clamped into 0..=10.
    pub fn from_configuration(cfg: &Configuration) -> Result<Self, ConfigError> {
        let mut out = Self::default();

        if let Some(n) = cfg.get_int(PARAM_CORES)? {
            if n >= 1 && n < MAX_WORKERS as i64 {
                out.workers = n as usize;
            } else {
                warn!(
                    target: "ultragz::engine",
                    requested = n,
                    using = out.workers,
                    "worker count out of range; using default"
                );
            }
        }

        if let Some(i) = cfg.get_int(PARAM_INTENSITY)? {
            out.intensity = i.clamp(0, i64::from(MAX_INTENSITY)) as u8;
        }

        if let Some(d) = millis(cfg, PARAM_POLL_INTERVAL_MS, 1)? {
            out.poll_interval = d;
        }
        if let Some(d) = millis(cfg, PARAM_KILL_GRACE_MS, 0)? {
            out.kill_grace = d;
        }
        if let Some(d) = millis(cfg, PARAM_RELAY_JOIN_GRACE_MS, 0)? {
            out.relay_join_grace = d;
        }
        if let Some(n) = cfg.get_int(PARAM_RELAY_CAPACITY)? {
            out.relay_capacity = usize::try_from(n)
                .ok()
                .filter(|&n| n >= 1)
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: PARAM_RELAY_CAPACITY.to_string(),
                    value: n.to_string(),
                    expected: "a positive byte count",
                })?;
        }

        for tool in [
            tool_names::GZIP,
            tool_names::PIGZ,
            tool_names::SEVEN_ZIP,
            tool_names::ZOPFLI,
            tool_names::ADVDEF,
            tool_names::PYTHON,
        ] {
            if let Some(path) = cfg.get_path(tool) {
                out.tool_overrides.insert(tool.to_string(), path);
            }
        }

        Ok(out)
    }

    pub fn parallelism(&self) -> ParallelismProfile {
        ParallelismProfile::fixed(self.workers).with_poll_interval(self.poll_interval)
    }

    pub fn session_timing(&self) -> SessionTiming {
        SessionTiming {
            kill_grace: self.kill_grace,
            relay_join_grace: self.relay_join_grace,
            relay_capacity: self.relay_capacity,
        }
    }

    /// [`quality_range`] at this config's intensity.
    pub fn quality_range(&self, min: u32, max: u32, default: u32) -> Vec<u32> {
        quality_range(min, max, default, self.intensity)
    }

    pub fn tool_override(&self, tool: &str) -> Option<&std::path::Path> {
        self.tool_overrides.get(tool).map(PathBuf::as_path)
    }
}

/// A duration in whole milliseconds, at least `min`.
fn millis(cfg: &Configuration, key: &str, min: i64) -> Result<Option<Duration>, ConfigError> {
    match cfg.get_int(key)? {
        None => Ok(None),
        Some(ms) if ms >= min => Ok(Some(Duration::from_millis(ms as u64))),
        Some(ms) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: ms.to_string(),
            expected: if min > 0 { "a positive number of milliseconds" } else { "a non-negative number of milliseconds" },
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_admits_up_to_one_and_a_half_times_best() {
        let gate = SizeGate::default();
        assert!(gate.admits(None, usize::MAX));
        assert!(gate.admits(Some(100), 150));
        assert!(!gate.admits(Some(100), 151));
        assert!(SizeGate::disabled().admits(Some(1), 1_000_000));
    }
}
