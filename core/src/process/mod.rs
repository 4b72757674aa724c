//! process/mod.rs
//! External process launching and ownership.
//!
//! [`ProcessBuilder`] validates stream wiring before launch and produces a
//! [`ProcessSession`], which owns the child, its pipes and any relay
//! workers until a graceful `wait_for` or a forced `close`.

pub mod builder;
pub mod mode;
pub mod session;

use std::io;
use std::path::PathBuf;

use crate::relay::RelayError;

pub use builder::ProcessBuilder;
pub use mode::{StreamMode, StreamSpec};
pub use session::{Captured, ProcessInput, ProcessOutput, ProcessSession, SessionTiming};

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("the executable must be set before adding arguments")]
    MissingExecutable,
    #[error("{stream} cannot use {mode:?} here; use the matching redirect setter")]
    InvalidMode { stream: &'static str, mode: StreamMode },
    #[error("stderr is merged into stdout and cannot be configured on its own")]
    StderrMerged,
    #[error("merged stdout and stderr must share one mode and one target")]
    MergeConflict,
    #[error("stdout and stderr cannot both be redirected to {}", .0.display())]
    SameRedirect(PathBuf),
    #[error("failed to start {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("process i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error("{0} thread panicked")]
    Panicked(&'static str),
}
