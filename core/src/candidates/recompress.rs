//! candidates/recompress.rs
//! Secondary pass: squeeze an existing gzip candidate further with advdef.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::arbiter::RaceJob;
use crate::candidates::external::write_temp;
use crate::candidates::tools::Tool;
use crate::candidates::CandidateRunner;
use crate::process::{ProcessBuilder, StreamMode};
use crate::telemetry::Stage;

/// advdef levels tried on every chained candidate.
pub const RECOMPRESS_LEVELS: [u8; 2] = [3, 4];

/// Rewrites a copy of `data` in place with advdef at one level.
#[derive(Clone, Debug)]
pub struct AdvdefRecompressor {
    program: PathBuf,
    level: u8,
    data: Bytes,
    origin: String,
}

impl AdvdefRecompressor {
    pub fn new(program: impl Into<PathBuf>, level: u8, data: Bytes, origin: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            level,
            data,
            origin: origin.into(),
        }
    }
}

impl CandidateRunner for AdvdefRecompressor {
    fn source(&self) -> String {
        format!("advdef -{} recompressing results of {}", self.level, self.origin)
    }

    fn run(self: Box<Self>, job: &RaceJob) -> anyhow::Result<()> {
        let source = self.source();
        let started = Instant::now();
        let file = write_temp(&self.data)?;

        let mut builder = ProcessBuilder::new();
        builder.executable(&self.program).timing(job.config().session_timing());
        builder
            .arg("-z")?
            .arg(format!("-{}", self.level))?
            .arg("-q")?
            .arg("-i")?
            .arg("64")?
            .path_arg(file.path())?;
        builder
            .stdin(StreamMode::Ignore)?
            .stdout(StreamMode::Ignore)?
            .stderr(StreamMode::Ignore)?
            .merge_stdout_and_stderr(true)?;

        let code = builder.start()?.wait_for()?;
        job.counters().add_stage_time(Stage::Recompress, started.elapsed());
        if code != 0 {
            warn!(
                target: "ultragz::candidate",
                program = %self.program.display(),
                code,
                %source,
                "advdef exited with non-zero status; result discarded"
            );
            return Ok(());
        }

        let size = usize::try_from(fs::metadata(file.path())?.len())?;
        if !job.is_promising(size) {
            debug!(target: "ultragz::candidate", %source, size, "recompressed result is not smaller than best");
            return Ok(());
        }
        let bytes = Bytes::from(fs::read(file.path())?);
        job.register(&bytes, &source);
        Ok(())
    }
}

/// Queue advdef passes over `bytes` when advdef is available.
pub fn chain_recompression(job: &RaceJob, bytes: &Bytes, origin: &str) {
    let Some(program) = job.tools().get(Tool::Advdef) else {
        trace!(target: "ultragz::candidate", %origin, "advdef not available; no secondary pass");
        return;
    };
    for level in RECOMPRESS_LEVELS {
        job.enqueue(Box::new(AdvdefRecompressor::new(
            program,
            level,
            bytes.clone(),
            origin,
        )));
    }
}
