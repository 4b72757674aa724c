//! relay/worker.rs
//! Background threads that move bytes between process pipes and relay buffers.
//!
//! Each worker owns one blocking stream, so no caller ever services two
//! pipes from one thread. Completion is reported over a channel, which
//! lets teardown wait with a deadline and then abandon a stuck worker.

use std::io::{self, ErrorKind, Read, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError};
use num_enum::TryFromPrimitive;
use tracing::{debug, trace};

use crate::constants::RELAY_CHUNK;
use crate::relay::{ByteRelayBuffer, RelayError};

/// Service level of a relay worker, in increasing severity.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, TryFromPrimitive)]
pub enum RelayMode {
    /// Forward everything.
    Alive = 0,
    /// Stop forwarding new reads but keep draining until the source ends.
    ShuttingDown = 1,
    /// Stop now and abandon anything unflushed.
    Killed = 2,
}

/// Shared mode cell. Only ever escalates.
#[derive(Debug)]
pub struct ModeFlag(AtomicU8);

impl ModeFlag {
    pub fn new() -> Self {
        Self(AtomicU8::new(RelayMode::Alive as u8))
    }

    pub fn get(&self) -> RelayMode {
        RelayMode::try_from_primitive(self.0.load(Ordering::Acquire)).unwrap_or(RelayMode::Killed)
    }

    pub fn escalate(&self, mode: RelayMode) {
        self.0.fetch_max(mode as u8, Ordering::AcqRel);
    }

    fn serving(&self) -> bool {
        self.get() <= RelayMode::ShuttingDown
    }
}

impl Default for ModeFlag {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RelayKind {
    Discard,
    SourceToBuffer,
    BufferToSink,
}

/// Handle to one running relay thread.
pub struct RelayWorker {
    kind: RelayKind,
    mode: Arc<ModeFlag>,
    done: Receiver<Result<(), RelayError>>,
    thread: Option<JoinHandle<()>>,
}

impl RelayWorker {
    /// Read and drop everything from `source` until it ends.
    pub fn discard<R>(label: &str, mut source: R) -> io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        Self::spawn(RelayKind::Discard, label, move |mode| {
            let mut chunk = [0u8; RELAY_CHUNK];
            while mode.serving() {
                if read_chunk(&mut source, &mut chunk)? == 0 {
                    break;
                }
            }
            Ok(())
        })
    }

    /// Copy `source` into `dest`. Once past `Alive` (or once the consumer
    /// closed `dest`) bytes are read and dropped so the source can finish.
    /// `dest` is always closed on exit.
    pub fn source_to_buffer<R>(label: &str, mut source: R, dest: Arc<ByteRelayBuffer>) -> io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        Self::spawn(RelayKind::SourceToBuffer, label, move |mode| {
            let mut chunk = [0u8; RELAY_CHUNK];
            let mut forwarding = true;
            let result = (|| -> Result<(), RelayError> {
                while mode.serving() {
                    let n = read_chunk(&mut source, &mut chunk)?;
                    if n == 0 {
                        break;
                    }
                    if forwarding && mode.get() == RelayMode::Alive && dest.write(&chunk[..n]).is_err() {
                        forwarding = false;
                    }
                }
                Ok(())
            })();
            dest.close();
            result
        })
    }

    /// Copy `source` into `sink`, flushing after every chunk, until the
    /// buffer reports end of data. The sink is dropped on exit.
    pub fn buffer_to_sink<W>(label: &str, source: Arc<ByteRelayBuffer>, mut sink: W) -> io::Result<Self>
    where
        W: Write + Send + 'static,
    {
        Self::spawn(RelayKind::BufferToSink, label, move |mode| {
            let mut chunk = [0u8; RELAY_CHUNK];
            let result = (|| -> Result<(), RelayError> {
                while mode.serving() {
                    let n = source.read(&mut chunk);
                    if n == 0 {
                        break;
                    }
                    sink.write_all(&chunk[..n])?;
                    sink.flush()?;
                }
                Ok(())
            })();
            source.close();
            drop(sink);
            result
        })
    }

    fn spawn<F>(kind: RelayKind, label: &str, body: F) -> io::Result<Self>
    where
        F: FnOnce(&ModeFlag) -> Result<(), RelayError> + Send + 'static,
    {
        let mode = Arc::new(ModeFlag::new());
        let (tx, rx) = bounded(1);
        let thread_mode = Arc::clone(&mode);
        let name = format!("ultragz-relay-{label}");
        let trace_name = name.clone();

        let thread = thread::Builder::new().name(name).spawn(move || {
            trace!(target: "ultragz::relay", relay = %trace_name, ?kind, "relay started");
            let result = match catch_unwind(AssertUnwindSafe(|| body(&thread_mode))) {
                Ok(result) => result,
                Err(_) => Err(RelayError::Panicked),
            };
            trace!(target: "ultragz::relay", relay = %trace_name, ok = result.is_ok(), "relay finished");
            let _ = tx.send(result);
        })?;

        Ok(Self {
            kind,
            mode,
            done: rx,
            thread: Some(thread),
        })
    }

    pub fn kind(&self) -> RelayKind {
        self.kind
    }

    pub fn mode(&self) -> RelayMode {
        self.mode.get()
    }

    /// Graceful stop: switch to `ShuttingDown` and wait for the thread to
    /// finish, for at most `grace` when one is given. A thread that does
    /// not finish in time is marked `Killed` and left to exit on its own.
    pub fn shut_down(&mut self, grace: Option<Duration>) -> Result<(), RelayError> {
        self.mode.escalate(RelayMode::ShuttingDown);
        let finished = match grace {
            Some(grace) => self.done.recv_timeout(grace),
            None => self.done.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match finished {
            Ok(result) => {
                self.join();
                result
            }
            Err(RecvTimeoutError::Timeout) => {
                debug!(target: "ultragz::relay", kind = ?self.kind, "relay did not finish in time; abandoning");
                self.kill();
                Ok(())
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.join();
                Err(RelayError::Panicked)
            }
        }
    }

    /// Forced stop: mark `Killed` and detach.
    pub fn kill(&mut self) {
        self.mode.escalate(RelayMode::Killed);
        self.thread.take();
    }

    fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for RelayWorker {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.kill();
        }
    }
}

fn read_chunk<R: Read>(source: &mut R, chunk: &mut [u8]) -> Result<usize, RelayError> {
    loop {
        match source.read(chunk) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}
