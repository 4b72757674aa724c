//! process/mode.rs
//! Stream modes and redirect targets for child process pipes.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// How one of the three standard streams is wired at launch.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StreamMode {
    /// Real pipe, read or written by the caller.
    AsStream,
    /// Pipe that is discarded: output is drained in the background,
    /// input is closed immediately.
    Ignore,
    /// Bound to a file.
    RedirectToPath,
    /// Bound to this process's own stream.
    Inherit,
}

impl StreamMode {
    /// Modes that create a pipe on our side.
    pub fn is_piped(self) -> bool {
        matches!(self, StreamMode::AsStream | StreamMode::Ignore)
    }
}

/// A stream's full wiring: mode plus file target when redirected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamSpec {
    pub mode: StreamMode,
    pub path: Option<PathBuf>,
    pub append: bool,
}

impl StreamSpec {
    pub fn new(mode: StreamMode) -> Self {
        Self {
            mode,
            path: None,
            append: false,
        }
    }

    pub fn redirect(path: impl Into<PathBuf>, append: bool) -> Self {
        Self {
            mode: StreamMode::RedirectToPath,
            path: Some(path.into()),
            append,
        }
    }

    /// File target, if this stream writes to one.
    pub fn target(&self) -> Option<&Path> {
        match self.mode {
            StreamMode::RedirectToPath => self.path.as_deref(),
            _ => None,
        }
    }

    pub(crate) fn open_for_read(&self) -> io::Result<Option<File>> {
        self.target().map(File::open).transpose()
    }

    pub(crate) fn open_for_write(&self) -> io::Result<Option<File>> {
        self.target()
            .map(|path| {
                let mut opts = OpenOptions::new();
                opts.create(true);
                if self.append {
                    opts.append(true);
                } else {
                    opts.write(true).truncate(true);
                }
                opts.open(path)
            })
            .transpose()
    }
}

impl Default for StreamSpec {
    fn default() -> Self {
        Self::new(StreamMode::AsStream)
    }
}
