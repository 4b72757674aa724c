//! candidates/mod.rs
//! The compressor variants that race in every job.
//!
//! Each variant is a [`CandidateRunner`] submitted as its own task. It
//! produces one blob, registers it with the job, and may queue secondary
//! recompression tasks depending on its [`ChainPolicy`].

pub mod external;
pub mod inprocess;
pub mod recompress;
pub mod tools;

use std::env;
use std::io;

use crate::arbiter::{RaceJob, RegistrationOutcome};
use crate::config::interpolate;
use crate::process::ProcessError;

pub use external::{ExternalCandidate, Feed};
pub use inprocess::{create_encoder, GzipEncoder, InProcessCandidate, InProcessCodec};
pub use recompress::{chain_recompression, AdvdefRecompressor, RECOMPRESS_LEVELS};
pub use tools::{Tool, ToolSet};

#[derive(Debug, thiserror::Error)]
pub enum CandidateError {
    #[error("{codec} does not support level {level}")]
    InvalidLevel { codec: &'static str, level: u32 },
    #[error("{codec} encoding failed: {msg}")]
    Encode { codec: &'static str, msg: String },
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("candidate i/o failed: {0}")]
    Io(#[from] io::Error),
}

/// One compressor variant. Runs once, on whichever thread selects it.
pub trait CandidateRunner: Send + 'static {
    /// Label used in logs and as the registration source.
    fn source(&self) -> String;

    /// When this variant's result is handed to the secondary pass.
    fn chain_policy(&self) -> ChainPolicy {
        ChainPolicy::Never
    }

    fn run(self: Box<Self>, job: &RaceJob) -> anyhow::Result<()>;
}

/// When a candidate's result is handed to the secondary pass.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChainPolicy {
    Never,
    /// Only when the result became the new best.
    OnImprovement,
    /// Whenever the result was not rejected as invalid.
    WhenValid,
}

impl ChainPolicy {
    pub fn applies(self, outcome: RegistrationOutcome) -> bool {
        match self {
            ChainPolicy::Never => false,
            ChainPolicy::OnImprovement => outcome.is_improvement(),
            ChainPolicy::WhenValid => outcome.is_valid(),
        }
    }

    /// `WhenValid` at or above `threshold`, else `OnImprovement`.
    pub fn from_quality(quality: u32, threshold: u32) -> Self {
        if quality >= threshold {
            ChainPolicy::WhenValid
        } else {
            ChainPolicy::OnImprovement
        }
    }
}

/// Python's own gzip module at level 9, reading stdin and writing stdout.
pub const PYTHON_GZIP_SCRIPT: &str =
    "import gzip,sys;sys.stdout.buffer.write(gzip.compress(sys.stdin.buffer.read(),9))";

/// Every variant for `job`, given its intensity and discovered tools.
pub fn default_runners(job: &RaceJob) -> Vec<Box<dyn CandidateRunner>> {
    let config = job.config();
    let tools = job.tools();
    let mut runners: Vec<Box<dyn CandidateRunner>> = Vec::new();

    for level in config.quality_range(7, 9, 8) {
        runners.push(Box::new(InProcessCandidate::new(InProcessCodec::Flate2, level)));
    }
    for level in config.quality_range(9, 12, 12) {
        runners.push(Box::new(InProcessCandidate::new(InProcessCodec::Libdeflate, level)));
    }

    for tool in [Tool::Gzip, Tool::Pigz] {
        let Some(program) = tools.get(tool) else { continue };
        for q in config.quality_range(1, 9, 6) {
            runners.push(Box::new(
                ExternalCandidate::new(tool, program, vec![format!("-{q}"), "-c".into()])
                    .chain(ChainPolicy::from_quality(q, 8)),
            ));
        }
        if tool == Tool::Pigz {
            runners.push(Box::new(
                ExternalCandidate::new(tool, program, vec!["-11".into(), "-c".into()])
                    .chain(ChainPolicy::WhenValid),
            ));
        }
    }

    if let Some(program) = tools.get(Tool::SevenZip) {
        let workdir = env::temp_dir();
        for q in [8u32, 9] {
            for fb in [None, Some(200u32), Some(258)] {
                for passes in [None, Some(15u32)] {
                    let mut args: Vec<String> = ["a", "dummy", "-tgzip", "-si", "-so"]
                        .into_iter()
                        .map(String::from)
                        .collect();
                    args.push(format!("-mx={q}"));
                    if let Some(fb) = fb {
                        args.push(format!("-mfb={fb}"));
                    }
                    if let Some(p) = passes {
                        args.push(format!("-mpass={p}"));
                    }
                    args.push(format!("-w{}", workdir.display()));
                    runners.push(Box::new(
                        ExternalCandidate::new(Tool::SevenZip, program, args).chain(ChainPolicy::from_quality(q, 9)),
                    ));
                }
            }
        }
    }

    if let Some(program) = tools.get(Tool::Zopfli) {
        let iterations = interpolate(15, 500, 2000, config.intensity);
        runners.push(Box::new(
            ExternalCandidate::new(
                Tool::Zopfli,
                program,
                vec!["-c".into(), "--gzip".into(), format!("--i{iterations}")],
            )
            .feed(Feed::TempFile)
            .chain(ChainPolicy::WhenValid),
        ));
    }

    if let Some(program) = tools.get(Tool::Python) {
        runners.push(Box::new(
            ExternalCandidate::new(Tool::Python, program, vec!["-c".into(), PYTHON_GZIP_SCRIPT.into()])
                .label("python3 gzip -9")
                .chain(ChainPolicy::WhenValid),
        ));
    }

    runners
}

/// Submit every default variant to the job's engine.
pub fn enqueue_default(job: &RaceJob) {
    for runner in default_runners(job) {
        job.enqueue(runner);
    }
}
