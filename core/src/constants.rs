//! constants.rs
//! Defaults and tunables shared across the engine, relays and arbiter.

use std::time::Duration;

/// Configuration key for the worker-pool size override.
pub const PARAM_CORES: &str = "nCores";
/// Configuration key for the 0..=10 intensity knob.
pub const PARAM_INTENSITY: &str = "gzipIntensity";
/// Configuration keys for the timing knobs, in milliseconds.
pub const PARAM_POLL_INTERVAL_MS: &str = "pollIntervalMs";
pub const PARAM_KILL_GRACE_MS: &str = "killGraceMs";
pub const PARAM_RELAY_JOIN_GRACE_MS: &str = "relayJoinGraceMs";
/// Configuration key for the relay buffer capacity, in bytes.
pub const PARAM_RELAY_CAPACITY: &str = "relayCapacity";

/// Upper bound (exclusive) for an explicit worker count.
pub const MAX_WORKERS: usize = 100;

pub const MIN_INTENSITY: u8 = 0;
pub const DEFAULT_INTENSITY: u8 = 5;
pub const MAX_INTENSITY: u8 = 10;

/// Poll/boost interval used by waiters that cannot help.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Grace delay before and after a terminate signal on forced teardown.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_millis(20);

/// How long a forced teardown waits for the child to exit on the terminate signal.
pub const DEFAULT_RELAY_JOIN_GRACE: Duration = Duration::from_millis(1000);

/// Default ring capacity of a relay buffer (1 MiB).
pub const DEFAULT_RELAY_CAPACITY: usize = 1024 * 1024;

/// Chunk size used by relay workers when moving bytes.
pub const RELAY_CHUNK: usize = 4096;

/// Size gate: a candidate larger than `best * NUM / DEN` is not verified.
pub const SIZE_GATE_NUM: u64 = 3;
pub const SIZE_GATE_DEN: u64 = 2;

/// Executable names probed during discovery (also their config keys).
pub mod tool_names {
    pub const GZIP: &str = "gzip";
    pub const PIGZ: &str = "pigz";
    pub const SEVEN_ZIP: &str = "7z";
    pub const ZOPFLI: &str = "zopfli";
    pub const ADVDEF: &str = "advdef";
    pub const PYTHON: &str = "python3";
}
