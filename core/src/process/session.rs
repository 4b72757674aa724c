//! process/session.rs
//! One running child process with its streams and relay workers.
//!
//! Teardown releases stdout, then stderr, then stdin (handle, buffer,
//! worker for each) and the child. A graceful close first ends the
//! child's input and waits for the child while its output keeps being
//! drained; only then are the relays joined. A forced close abandons the
//! relays and terminates the child. Every step runs even after an earlier
//! one failed; only the first error is reported.

use std::io::{self, ErrorKind, Read, Write};
use std::process::{Child, ChildStdin, ExitStatus};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::constants::{DEFAULT_KILL_GRACE, DEFAULT_RELAY_CAPACITY, DEFAULT_RELAY_JOIN_GRACE};
use crate::process::mode::StreamMode;
use crate::process::ProcessError;
use crate::relay::{ByteRelayBuffer, RelayError, RelayReader, RelayWorker, RelayWriter};

/// Timing and sizing knobs for a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionTiming {
    /// Delay around the terminate signal on a forced close.
    pub kill_grace: Duration,
    /// How long a forced close waits for the child to exit on the
    /// terminate signal before killing it.
    pub relay_join_grace: Duration,
    pub relay_capacity: usize,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            kill_grace: DEFAULT_KILL_GRACE,
            relay_join_grace: DEFAULT_RELAY_JOIN_GRACE,
            relay_capacity: DEFAULT_RELAY_CAPACITY,
        }
    }
}

/// Modes the builder launched with. `stderr` is `None` when merged.
pub(crate) struct Wiring {
    pub stdin: StreamMode,
    pub stdout: StreamMode,
    pub stderr: Option<StreamMode>,
}

// -----------------------------------------------------------------------------
// Stream endpoints
// -----------------------------------------------------------------------------

/// Caller-facing input stream of the child.
pub enum ProcessInput {
    Pipe(ChildStdin),
    Relayed(RelayWriter),
    /// Accepts and drops everything.
    Null,
}

impl Write for ProcessInput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            ProcessInput::Pipe(p) => p.write(buf),
            ProcessInput::Relayed(w) => w.write(buf),
            ProcessInput::Null => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            ProcessInput::Pipe(p) => p.flush(),
            ProcessInput::Relayed(w) => w.flush(),
            ProcessInput::Null => Ok(()),
        }
    }
}

/// Caller-facing output stream of the child.
pub enum ProcessOutput {
    Pipe(Box<dyn Read + Send>),
    Relayed(RelayReader),
    /// Always at end of data.
    Null,
}

impl Read for ProcessOutput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ProcessOutput::Pipe(p) => p.read(buf),
            ProcessOutput::Relayed(r) => r.read(buf),
            ProcessOutput::Null => Ok(0),
        }
    }
}

/// Everything a child wrote, collected by [`ProcessSession::communicate`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Captured {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

struct Lane<H> {
    handle: Option<H>,
    buffer: Option<Arc<ByteRelayBuffer>>,
    worker: Option<RelayWorker>,
}

impl<H> Default for Lane<H> {
    fn default() -> Self {
        Self {
            handle: None,
            buffer: None,
            worker: None,
        }
    }
}

impl<H> Lane<H> {
    fn is_empty(&self) -> bool {
        self.handle.is_none() && self.buffer.is_none() && self.worker.is_none()
    }

    fn release<F>(&mut self, step: &'static str, kill: bool, errors: &mut FirstError, close: F)
    where
        F: FnOnce(H) -> io::Result<()>,
    {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = close(handle) {
                errors.record(step, e.into());
            }
        }
        if let Some(buffer) = self.buffer.take() {
            buffer.close();
        }
        if let Some(mut worker) = self.worker.take() {
            if kill {
                worker.kill();
                return;
            }
            match worker.shut_down(None) {
                Ok(()) => {}
                // The child exited without reading all of its input.
                Err(RelayError::Io(e)) if e.kind() == ErrorKind::BrokenPipe => {
                    debug!(target: "ultragz::process", step, "child closed its input early");
                }
                Err(e) => errors.record(step, e.into()),
            }
        }
    }
}

#[derive(Default)]
struct FirstError(Option<ProcessError>);

impl FirstError {
    fn record(&mut self, step: &'static str, err: ProcessError) {
        match self.0 {
            None => self.0 = Some(err),
            Some(_) => debug!(target: "ultragz::process", step, error = %err, "further teardown error"),
        }
    }
}

// -----------------------------------------------------------------------------
// Session
// -----------------------------------------------------------------------------

/// Owner of one child process. Released exactly once, by
/// [`wait_for`](Self::wait_for), [`close`](Self::close) or drop.
pub struct ProcessSession {
    label: String,
    child: Option<Child>,
    stdin: Lane<ProcessInput>,
    stdout: Lane<ProcessOutput>,
    stderr: Lane<ProcessOutput>,
    timing: SessionTiming,
}

impl ProcessSession {
    /// Wrap a freshly spawned child. More than one caller-facing stream
    /// means every such stream is served through a relay.
    pub(crate) fn attach(
        label: String,
        mut child: Child,
        wiring: Wiring,
        merged: Option<io::PipeReader>,
        timing: SessionTiming,
    ) -> Result<Self, ProcessError> {
        let stdin_pipe = child.stdin.take();
        let stdout_src: Option<Box<dyn Read + Send>> = match merged {
            Some(reader) => Some(Box::new(reader)),
            None => child.stdout.take().map(|p| Box::new(p) as Box<dyn Read + Send>),
        };
        let stderr_src: Option<Box<dyn Read + Send>> = match wiring.stderr {
            Some(_) => child.stderr.take().map(|p| Box::new(p) as Box<dyn Read + Send>),
            None => None,
        };

        let real_streams = [Some(wiring.stdin), Some(wiring.stdout), wiring.stderr]
            .into_iter()
            .filter(|m| *m == Some(StreamMode::AsStream))
            .count();
        let relayed = real_streams > 1;

        // From here on a failure drops `session`, which force-closes the child.
        let mut session = Self {
            label,
            child: Some(child),
            stdin: Lane::default(),
            stdout: Lane::default(),
            stderr: Lane::default(),
            timing,
        };

        if let (StreamMode::AsStream, Some(pipe)) = (wiring.stdin, stdin_pipe) {
            if relayed {
                let buffer = Arc::new(ByteRelayBuffer::new(session.timing.relay_capacity));
                let name = format!("{}-stdin", session.label);
                session.stdin.worker = Some(RelayWorker::buffer_to_sink(&name, Arc::clone(&buffer), pipe)?);
                session.stdin.handle = Some(ProcessInput::Relayed(RelayWriter::new(Arc::clone(&buffer))));
                session.stdin.buffer = Some(buffer);
            } else {
                session.stdin.handle = Some(ProcessInput::Pipe(pipe));
            }
        }
        // Any other stdin pipe (Ignore) was dropped above, closing it at once.

        session.stdout = output_lane(&session.label, "stdout", wiring.stdout, stdout_src, relayed, &session.timing)?;
        if let Some(mode) = wiring.stderr {
            session.stderr = output_lane(&session.label, "stderr", mode, stderr_src, relayed, &session.timing)?;
        }

        Ok(session)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// The child's input. A no-op sink when stdin is not a caller stream.
    pub fn stdin(&mut self) -> &mut ProcessInput {
        self.stdin.handle.get_or_insert(ProcessInput::Null)
    }

    /// The child's output. Carries stderr too when the two are merged.
    pub fn stdout(&mut self) -> &mut ProcessOutput {
        self.stdout.handle.get_or_insert(ProcessOutput::Null)
    }

    /// The child's error output. Empty when merged or not a caller stream.
    pub fn stderr(&mut self) -> &mut ProcessOutput {
        self.stderr.handle.get_or_insert(ProcessOutput::Null)
    }

    /// Move the input stream out, e.g. to feed it from another thread.
    pub fn take_stdin(&mut self) -> ProcessInput {
        self.stdin.handle.take().unwrap_or(ProcessInput::Null)
    }

    pub fn take_stdout(&mut self) -> ProcessOutput {
        self.stdout.handle.take().unwrap_or(ProcessOutput::Null)
    }

    pub fn take_stderr(&mut self) -> ProcessOutput {
        self.stderr.handle.take().unwrap_or(ProcessOutput::Null)
    }

    /// Flush and close the child's input, signalling end of data.
    pub fn close_stdin(&mut self) -> Result<(), ProcessError> {
        if let Some(mut input) = self.stdin.handle.take() {
            input.flush()?;
        }
        Ok(())
    }

    /// Write `input`, close stdin, and collect stdout and stderr, all
    /// concurrently so no pipe can fill up while another is waited on.
    ///
    /// A child that exits without reading all of its input is not an
    /// error here; its exit status tells the rest.
    pub fn communicate(&mut self, input: &[u8]) -> Result<Captured, ProcessError> {
        let stdin = self.take_stdin();
        let stdout = self.take_stdout();
        let stderr = self.take_stderr();

        thread::scope(|scope| {
            let feeder = scope.spawn(move || feed(stdin, input));
            let errors = scope.spawn(move || drain(stderr));
            let out = drain(stdout);

            let fed = feeder.join().map_err(|_| ProcessError::Panicked("stdin feeder"))?;
            let err = errors.join().map_err(|_| ProcessError::Panicked("stderr reader"))?;
            fed?;
            Ok(Captured {
                stdout: out?,
                stderr: err?,
            })
        })
    }

    /// Graceful teardown: wait for the child to exit and return its code.
    ///
    /// A child killed by a signal reports `128 + signal` on unix.
    pub fn wait_for(mut self) -> Result<i32, ProcessError> {
        let status = self.teardown(false)?;
        Ok(status.map(exit_code).unwrap_or(-1))
    }

    /// Forced teardown: abandon the streams and terminate the child.
    pub fn close(mut self) -> Result<(), ProcessError> {
        self.teardown(true).map(|_| ())
    }

    fn is_released(&self) -> bool {
        self.child.is_none() && self.stdin.is_empty() && self.stdout.is_empty() && self.stderr.is_empty()
    }

    fn teardown(&mut self, kill: bool) -> Result<Option<ExitStatus>, ProcessError> {
        let mut errors = FirstError::default();

        let status = if kill {
            self.release_lanes(true, &mut errors);
            self.child.take().and_then(|child| self.reap(child, true, &mut errors))
        } else {
            self.detach_caller(&mut errors);
            let status = self.child.take().and_then(|child| self.reap(child, false, &mut errors));
            self.release_lanes(false, &mut errors);
            status
        };

        match errors.0 {
            Some(err) => {
                warn!(target: "ultragz::process", process = %self.label, error = %err, "process teardown failed");
                Err(err)
            }
            None => Ok(status),
        }
    }

    fn release_lanes(&mut self, kill: bool, errors: &mut FirstError) {
        self.stdout.release("stdout", kill, errors, |_| Ok(()));
        self.stderr.release("stderr", kill, errors, |_| Ok(()));
        self.stdin.release("stdin", kill, errors, |mut input| input.flush());
    }

    /// End the child's input and make sure output nobody reads any more
    /// keeps flowing, so the child can run to completion while waited on.
    fn detach_caller(&mut self, errors: &mut FirstError) {
        if let Some(mut input) = self.stdin.handle.take() {
            if let Err(e) = input.flush() {
                errors.record("stdin", e.into());
            }
        }
        if let Some(buffer) = &self.stdin.buffer {
            buffer.close();
        }

        for (stream, lane) in [("stdout", &mut self.stdout), ("stderr", &mut self.stderr)] {
            match lane.handle.take() {
                Some(ProcessOutput::Pipe(source)) => {
                    match RelayWorker::discard(&format!("{}-{stream}", self.label), source) {
                        Ok(worker) => lane.worker = Some(worker),
                        Err(e) => errors.record(stream, e.into()),
                    }
                }
                Some(ProcessOutput::Relayed(reader)) => drop(reader),
                Some(ProcessOutput::Null) | None => {}
            }
            // A closed buffer turns its source relay into a drain.
            if let Some(buffer) = &lane.buffer {
                buffer.close();
            }
        }
    }

    fn reap(&self, mut child: Child, kill: bool, errors: &mut FirstError) -> Option<ExitStatus> {
        if !kill {
            match child.wait() {
                Ok(status) => {
                    debug!(target: "ultragz::process", process = %self.label, %status, "process exited");
                    return Some(status);
                }
                Err(e) => errors.record("wait", e.into()),
            }
        }

        match child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) => {}
            Err(e) => errors.record("wait", e.into()),
        }

        thread::sleep(self.timing.kill_grace);
        if let Err(e) = terminate(&mut child) {
            errors.record("terminate", e.into());
        }
        thread::sleep(self.timing.kill_grace);

        // Give the child a bounded chance to exit on the signal, then kill it.
        let deadline = Instant::now() + self.timing.relay_join_grace;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!(target: "ultragz::process", process = %self.label, %status, "process terminated");
                    return Some(status);
                }
                Ok(None) if Instant::now() < deadline => thread::sleep(self.timing.kill_grace.max(Duration::from_millis(1))),
                Ok(None) => break,
                Err(e) => {
                    errors.record("wait", e.into());
                    break;
                }
            }
        }

        if let Err(e) = child.kill() {
            if e.kind() != ErrorKind::InvalidInput {
                errors.record("kill", e.into());
            }
        }
        match child.wait() {
            Ok(status) => Some(status),
            Err(e) => {
                errors.record("wait", e.into());
                None
            }
        }
    }
}

impl Drop for ProcessSession {
    fn drop(&mut self) {
        if self.is_released() {
            return;
        }
        if let Err(e) = self.teardown(true) {
            debug!(target: "ultragz::process", process = %self.label, error = %e, "forced close on drop failed");
        }
    }
}

fn output_lane(
    label: &str,
    stream: &'static str,
    mode: StreamMode,
    source: Option<Box<dyn Read + Send>>,
    relayed: bool,
    timing: &SessionTiming,
) -> Result<Lane<ProcessOutput>, ProcessError> {
    let mut lane = Lane::default();
    let Some(source) = source else {
        return Ok(lane);
    };
    let name = format!("{label}-{stream}");
    match mode {
        StreamMode::AsStream if relayed => {
            let buffer = Arc::new(ByteRelayBuffer::new(timing.relay_capacity));
            lane.worker = Some(RelayWorker::source_to_buffer(&name, source, Arc::clone(&buffer))?);
            lane.handle = Some(ProcessOutput::Relayed(RelayReader::new(Arc::clone(&buffer))));
            lane.buffer = Some(buffer);
        }
        StreamMode::AsStream => lane.handle = Some(ProcessOutput::Pipe(source)),
        StreamMode::Ignore => lane.worker = Some(RelayWorker::discard(&name, source)?),
        StreamMode::RedirectToPath | StreamMode::Inherit => {}
    }
    Ok(lane)
}

fn feed(mut input: ProcessInput, bytes: &[u8]) -> Result<(), ProcessError> {
    let result = input.write_all(bytes).and_then(|_| input.flush());
    drop(input);
    match result {
        Err(e) if e.kind() == ErrorKind::BrokenPipe => {
            debug!(target: "ultragz::process", "child closed its input early");
            Ok(())
        }
        other => other.map_err(ProcessError::from),
    }
}

fn drain(mut output: ProcessOutput) -> Result<Vec<u8>, ProcessError> {
    let mut buf = Vec::new();
    output.read_to_end(&mut buf)?;
    Ok(buf)
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn terminate(child: &mut Child) -> io::Result<()> {
    let pid = libc::pid_t::try_from(child.id())
        .map_err(|_| io::Error::new(ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: kill(2) has no memory-safety preconditions, and the child has
    // not been reaped yet so its pid cannot have been reused.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) -> io::Result<()> {
    child.kill()
}
