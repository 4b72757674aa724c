//! arbiter/mod.rs
//! Competitive arbitration between candidate outputs of one job.
//!
//! Candidates are registered from any worker. Each is size-gated, decoded
//! by two independent decoders and compared to the input before it may
//! replace the current best.

pub mod best;
pub mod job;
pub mod outcome;
pub mod verify;

pub use best::{BestSlot, Candidate};
pub use job::{RaceJob, RaceJobBuilder, RaceOutcome};
pub use outcome::RegistrationOutcome;
pub use verify::{Flate2Verifier, LibdeflateVerifier, Verifier, VerifyError};
