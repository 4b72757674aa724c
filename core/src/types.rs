//! types.rs
//! Job-level error covering construction, engine start-up and the race result.
//!
//! Module errors (`TaskError`, `RelayError`, `ProcessError`, `CandidateError`)
//! stay inside task boundaries; only this type reaches the caller of a job.

use crate::config::ConfigError;
use crate::engine::EngineError;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Zero-length input is rejected up front rather than raced.
    #[error("cannot compress empty input")]
    EmptyInput,

    #[error("job name must not be blank")]
    BlankName,

    /// Every spawned task finished and none produced a verified candidate.
    #[error("no valid candidate was produced for {0}")]
    NoValidCandidate(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
