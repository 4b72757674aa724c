//! telemetry/mod.rs
//! Race telemetry: live counters, stage timers, and immutable snapshots.
//!
//! Counters are atomics updated from any worker; a snapshot freezes them
//! together with sizes and elapsed time once a job finishes.

pub mod counters;
pub mod snapshot;
pub mod timers;

pub use counters::*;
pub use snapshot::*;
pub use timers::*;
