//! ultragz-core
//!
//! Competitive best-of-N gzip engine.
//! Many compressor variants race on a shared task engine; the smallest
//! output that two independent decoders accept is kept.

#![deny(unsafe_code)]

// Shared and top level
pub mod constants;
pub mod types;
pub mod utils;
pub mod config;

// Execution
pub mod engine;
pub mod relay;
pub mod process;

// Race
pub mod arbiter;
pub mod candidates;
pub mod telemetry;

// -----------------------------------------------------------------------------
// Prelude (Rust users)
// -----------------------------------------------------------------------------
pub mod prelude {
    pub use crate::arbiter::{Candidate, RaceJob, RaceOutcome, RegistrationOutcome, Verifier};
    pub use crate::candidates::{CandidateRunner, Tool, ToolSet};
    pub use crate::config::{Configuration, RaceConfig, SizeGate};
    pub use crate::engine::{EngineHandle, ParallelismProfile, TaskEngine, TaskError, TaskHandle, TaskState};
    pub use crate::process::{ProcessBuilder, ProcessSession, StreamMode};
    pub use crate::relay::ByteRelayBuffer;
    pub use crate::telemetry::RaceSnapshot;
    pub use crate::types::JobError;
}
