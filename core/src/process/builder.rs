//! process/builder.rs
//! Fluent description of a child process, validated before launch.

use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

use crate::process::mode::{StreamMode, StreamSpec};
use crate::process::session::{ProcessSession, SessionTiming, Wiring};
use crate::process::ProcessError;

#[derive(Clone, Debug)]
enum EnvChange {
    Set(OsString, OsString),
    Remove(OsString),
    Clear,
}

/// Builder for one external process.
///
/// Stream setters that take a [`StreamMode`] reject `RedirectToPath`;
/// use the `*_from`/`*_to` setters for file targets.
#[derive(Clone, Debug, Default)]
pub struct ProcessBuilder {
    program: Option<PathBuf>,
    args: Vec<OsString>,
    env: Vec<EnvChange>,
    directory: Option<PathBuf>,
    stdin: StreamSpec,
    stdout: StreamSpec,
    stderr: StreamSpec,
    merged: bool,
    timing: SessionTiming,
}

impl ProcessBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn executable(&mut self, program: impl Into<PathBuf>) -> &mut Self {
        self.program = Some(program.into());
        self
    }

    pub fn arg(&mut self, arg: impl AsRef<OsStr>) -> Result<&mut Self, ProcessError> {
        if self.program.is_none() {
            return Err(ProcessError::MissingExecutable);
        }
        self.args.push(arg.as_ref().to_os_string());
        Ok(self)
    }

    pub fn args<I, S>(&mut self, args: I) -> Result<&mut Self, ProcessError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self.arg(arg)?;
        }
        Ok(self)
    }

    /// Append a path argument, made absolute when it can be resolved.
    pub fn path_arg(&mut self, path: &Path) -> Result<&mut Self, ProcessError> {
        let resolved = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.arg(resolved)
    }

    pub fn env(&mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> &mut Self {
        self.env.push(EnvChange::Set(
            key.as_ref().to_os_string(),
            value.as_ref().to_os_string(),
        ));
        self
    }

    pub fn env_remove(&mut self, key: impl AsRef<OsStr>) -> &mut Self {
        self.env.push(EnvChange::Remove(key.as_ref().to_os_string()));
        self
    }

    pub fn env_clear(&mut self) -> &mut Self {
        self.env.push(EnvChange::Clear);
        self
    }

    pub fn directory(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.directory = Some(dir.into());
        self
    }

    pub fn timing(&mut self, timing: SessionTiming) -> &mut Self {
        self.timing = timing;
        self
    }

    // -------------------------------------------------------------------------
    // Streams
    // -------------------------------------------------------------------------

    pub fn stdin(&mut self, mode: StreamMode) -> Result<&mut Self, ProcessError> {
        reject_redirect("stdin", mode)?;
        self.stdin = StreamSpec::new(mode);
        Ok(self)
    }

    pub fn read_stdin_from(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.stdin = StreamSpec::redirect(path, false);
        self
    }

    /// Also applies to stderr while the two are merged.
    pub fn stdout(&mut self, mode: StreamMode) -> Result<&mut Self, ProcessError> {
        reject_redirect("stdout", mode)?;
        self.set_stdout(StreamSpec::new(mode));
        Ok(self)
    }

    pub fn write_stdout_to(&mut self, path: impl Into<PathBuf>, append: bool) -> &mut Self {
        self.set_stdout(StreamSpec::redirect(path, append));
        self
    }

    pub fn stderr(&mut self, mode: StreamMode) -> Result<&mut Self, ProcessError> {
        reject_redirect("stderr", mode)?;
        if self.merged {
            return Err(ProcessError::StderrMerged);
        }
        self.stderr = StreamSpec::new(mode);
        Ok(self)
    }

    pub fn write_stderr_to(&mut self, path: impl Into<PathBuf>, append: bool) -> Result<&mut Self, ProcessError> {
        if self.merged {
            return Err(ProcessError::StderrMerged);
        }
        self.stderr = StreamSpec::redirect(path, append);
        Ok(self)
    }

    /// Send stderr into stdout. Both must already share mode and target.
    pub fn merge_stdout_and_stderr(&mut self, merge: bool) -> Result<&mut Self, ProcessError> {
        if merge && self.stdout != self.stderr {
            return Err(ProcessError::MergeConflict);
        }
        self.merged = merge;
        Ok(self)
    }

    fn set_stdout(&mut self, spec: StreamSpec) {
        if self.merged {
            self.stderr = spec.clone();
        }
        self.stdout = spec;
    }

    /// Check stream wiring against the merge and same-file rules.
    pub fn validate(&self) -> Result<(), ProcessError> {
        if self.merged {
            if self.stdout != self.stderr {
                return Err(ProcessError::MergeConflict);
            }
            return Ok(());
        }
        if let (Some(out), Some(err)) = (self.stdout.target(), self.stderr.target()) {
            if out == err {
                return Err(ProcessError::SameRedirect(out.to_path_buf()));
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Launch
    // -------------------------------------------------------------------------

    pub fn start(&self) -> Result<ProcessSession, ProcessError> {
        let program = self.program.as_ref().ok_or(ProcessError::MissingExecutable)?;
        self.validate()?;

        let mut cmd = Command::new(program);
        cmd.args(&self.args);
        if let Some(dir) = &self.directory {
            cmd.current_dir(dir);
        }
        for change in &self.env {
            match change {
                EnvChange::Set(k, v) => {
                    cmd.env(k, v);
                }
                EnvChange::Remove(k) => {
                    cmd.env_remove(k);
                }
                EnvChange::Clear => {
                    cmd.env_clear();
                }
            }
        }

        cmd.stdin(input_stdio(&self.stdin)?);
        let mut merged_reader = None;
        if self.merged {
            match self.stdout.mode {
                StreamMode::AsStream | StreamMode::Ignore => {
                    let (reader, writer) = io::pipe()?;
                    cmd.stdout(writer.try_clone()?);
                    cmd.stderr(writer);
                    merged_reader = Some(reader);
                }
                StreamMode::Inherit => {
                    cmd.stdout(Stdio::inherit());
                    cmd.stderr(Stdio::inherit());
                }
                StreamMode::RedirectToPath => {
                    let file = self.stdout.open_for_write()?.ok_or(ProcessError::MergeConflict)?;
                    cmd.stdout(file.try_clone()?);
                    cmd.stderr(file);
                }
            }
        } else {
            cmd.stdout(output_stdio("stdout", &self.stdout)?);
            cmd.stderr(output_stdio("stderr", &self.stderr)?);
        }

        let label = program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.display().to_string());

        let child = cmd.spawn().map_err(|source| ProcessError::Launch {
            program: program.display().to_string(),
            source,
        })?;
        // The command still holds our copies of the merged pipe's write end.
        drop(cmd);

        debug!(
            target: "ultragz::process",
            program = %program.display(),
            pid = child.id(),
            "process started"
        );

        let wiring = Wiring {
            stdin: self.stdin.mode,
            stdout: self.stdout.mode,
            stderr: if self.merged { None } else { Some(self.stderr.mode) },
        };
        ProcessSession::attach(label, child, wiring, merged_reader, self.timing.clone())
    }
}

fn reject_redirect(stream: &'static str, mode: StreamMode) -> Result<(), ProcessError> {
    if mode == StreamMode::RedirectToPath {
        return Err(ProcessError::InvalidMode { stream, mode });
    }
    Ok(())
}

fn input_stdio(spec: &StreamSpec) -> Result<Stdio, ProcessError> {
    Ok(match spec.mode {
        StreamMode::AsStream | StreamMode::Ignore => Stdio::piped(),
        StreamMode::Inherit => Stdio::inherit(),
        StreamMode::RedirectToPath => {
            let file: File = spec.open_for_read()?.ok_or(ProcessError::InvalidMode {
                stream: "stdin",
                mode: spec.mode,
            })?;
            Stdio::from(file)
        }
    })
}

fn output_stdio(stream: &'static str, spec: &StreamSpec) -> Result<Stdio, ProcessError> {
    Ok(match spec.mode {
        StreamMode::AsStream | StreamMode::Ignore => Stdio::piped(),
        StreamMode::Inherit => Stdio::inherit(),
        StreamMode::RedirectToPath => {
            let file = spec
                .open_for_write()?
                .ok_or(ProcessError::InvalidMode { stream, mode: spec.mode })?;
            Stdio::from(file)
        }
    })
}
