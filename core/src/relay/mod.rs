//! relay/mod.rs
//! Deadlock-free plumbing between a caller and a child process's pipes.
//!
//! When a session needs blocking access to more than one pipe, each pipe
//! gets a [`ByteRelayBuffer`] plus a dedicated [`RelayWorker`] thread, and
//! the caller only ever touches the buffers.

pub mod buffer;
pub mod stream;
pub mod worker;

use std::io;

pub use buffer::ByteRelayBuffer;
pub use stream::{RelayReader, RelayWriter};
pub use worker::{ModeFlag, RelayKind, RelayMode, RelayWorker};

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("relay buffer closed after {written} of {requested} bytes")]
    Closed { written: usize, requested: usize },
    #[error("relay i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("relay worker panicked")]
    Panicked,
}

impl From<RelayError> for io::Error {
    fn from(e: RelayError) -> Self {
        match e {
            RelayError::Io(inner) => inner,
            RelayError::Closed { .. } => io::Error::new(io::ErrorKind::BrokenPipe, e),
            RelayError::Panicked => io::Error::new(io::ErrorKind::Other, e),
        }
    }
}
