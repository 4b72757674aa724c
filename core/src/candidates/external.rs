//! candidates/external.rs
//! Candidates produced by external command-line compressors.

use std::env;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use bytes::Bytes;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::arbiter::RaceJob;
use crate::candidates::recompress::chain_recompression;
use crate::candidates::tools::Tool;
use crate::candidates::{CandidateRunner, ChainPolicy};
use crate::process::{ProcessBuilder, StreamMode};
use crate::telemetry::Stage;

/// How the tool receives the input bytes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Feed {
    /// Written to the tool's stdin.
    Stdin,
    /// Written to a temporary file whose path is the last argument.
    TempFile,
}

/// One external tool invocation. The tool's stdout is the candidate.
#[derive(Clone, Debug)]
pub struct ExternalCandidate {
    tool: Tool,
    program: PathBuf,
    args: Vec<String>,
    feed: Feed,
    chain: ChainPolicy,
    label: Option<String>,
}

impl ExternalCandidate {
    pub fn new(tool: Tool, program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            tool,
            program: program.into(),
            args,
            feed: Feed::Stdin,
            chain: ChainPolicy::OnImprovement,
            label: None,
        }
    }

    pub fn feed(mut self, feed: Feed) -> Self {
        self.feed = feed;
        self
    }

    pub fn chain(mut self, chain: ChainPolicy) -> Self {
        self.chain = chain;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl CandidateRunner for ExternalCandidate {
    fn source(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => format!("{} {}", self.tool, self.args.join(" ")),
        }
    }

    fn chain_policy(&self) -> ChainPolicy {
        self.chain
    }

    fn run(self: Box<Self>, job: &RaceJob) -> anyhow::Result<()> {
        let source = self.source();
        let started = Instant::now();

        let input_file = match self.feed {
            Feed::TempFile => Some(write_temp(job.input())?),
            Feed::Stdin => None,
        };

        let mut builder = ProcessBuilder::new();
        builder
            .executable(&self.program)
            .directory(env::temp_dir())
            .timing(job.config().session_timing());
        builder.args(&self.args)?;
        match &input_file {
            Some(file) => {
                builder.path_arg(file.path())?;
                builder.stdin(StreamMode::Ignore)?;
            }
            None => {
                builder.stdin(StreamMode::AsStream)?;
            }
        }
        builder.stdout(StreamMode::AsStream)?.stderr(StreamMode::AsStream)?;

        let mut session = builder.start()?;
        let feed: &[u8] = if input_file.is_some() { &[] } else { job.input() };
        let captured = session.communicate(feed)?;
        let code = session.wait_for()?;
        job.counters().add_stage_time(Stage::Encode, started.elapsed());

        log_stderr(&source, &captured.stderr);
        if code != 0 {
            warn!(
                target: "ultragz::candidate",
                program = %self.program.display(),
                code,
                %source,
                "tool exited with non-zero status; candidate discarded"
            );
            return Ok(());
        }

        let bytes = Bytes::from(captured.stdout);
        let outcome = job.register(&bytes, &source);
        if self.chain_policy().applies(outcome) {
            chain_recompression(job, &bytes, &source);
        }
        Ok(())
    }
}

pub(crate) fn write_temp(data: &[u8]) -> std::io::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new().prefix("ultragz-").tempfile()?;
    file.write_all(data)?;
    file.flush()?;
    Ok(file)
}

/// One debug event per line of a tool's error output.
pub(crate) fn log_stderr(source: &str, stderr: &[u8]) {
    if stderr.is_empty() {
        return;
    }
    for line in String::from_utf8_lossy(stderr).lines().filter(|l| !l.trim().is_empty()) {
        debug!(target: "ultragz::candidate", %source, "stderr: {line}");
    }
}
