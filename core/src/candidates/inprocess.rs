//! candidates/inprocess.rs
//! Gzip encoders linked into the process: always available.

use std::io::Write;
use std::time::Instant;

use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::debug;

use crate::arbiter::RaceJob;
use crate::candidates::recompress::chain_recompression;
use crate::candidates::{CandidateError, CandidateRunner, ChainPolicy};
use crate::telemetry::Stage;

// Require Send so boxed encoders can move onto worker threads.
pub trait GzipEncoder: Send {
    fn name(&self) -> &'static str;
    /// Encode `input` as one complete gzip member appended to `out`.
    fn encode(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), CandidateError>;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InProcessCodec {
    /// zlib-family encoder, levels 0..=9.
    Flate2,
    /// libdeflate encoder, levels 0..=12.
    Libdeflate,
}

impl InProcessCodec {
    pub fn label(self) -> &'static str {
        match self {
            InProcessCodec::Flate2 => "flate2 gzip",
            InProcessCodec::Libdeflate => "libdeflate gzip",
        }
    }
}

pub struct Flate2GzipEncoder {
    level: Compression,
}

impl Flate2GzipEncoder {
    pub fn new(level: u32) -> Result<Box<dyn GzipEncoder>, CandidateError> {
        if level > 9 {
            return Err(CandidateError::InvalidLevel { codec: "flate2", level });
        }
        Ok(Box::new(Self {
            level: Compression::new(level),
        }))
    }
}

impl GzipEncoder for Flate2GzipEncoder {
    fn name(&self) -> &'static str {
        "flate2"
    }

    fn encode(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), CandidateError> {
        let mut enc = GzEncoder::new(Vec::with_capacity(input.len() / 2 + 64), self.level);
        enc.write_all(input).map_err(|e| CandidateError::Encode {
            codec: "flate2",
            msg: e.to_string(),
        })?;
        let compressed = enc.finish().map_err(|e| CandidateError::Encode {
            codec: "flate2",
            msg: e.to_string(),
        })?;
        out.extend_from_slice(&compressed);
        Ok(())
    }
}

pub struct LibdeflateGzipEncoder {
    inner: libdeflater::Compressor,
}

impl LibdeflateGzipEncoder {
    pub fn new(level: u32) -> Result<Box<dyn GzipEncoder>, CandidateError> {
        let lvl = i32::try_from(level)
            .ok()
            .and_then(|l| libdeflater::CompressionLvl::new(l).ok())
            .ok_or(CandidateError::InvalidLevel { codec: "libdeflate", level })?;
        Ok(Box::new(Self {
            inner: libdeflater::Compressor::new(lvl),
        }))
    }
}

impl GzipEncoder for LibdeflateGzipEncoder {
    fn name(&self) -> &'static str {
        "libdeflate"
    }

    fn encode(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), CandidateError> {
        let start = out.len();
        out.resize(start + self.inner.gzip_compress_bound(input.len()), 0);
        let n = self
            .inner
            .gzip_compress(input, &mut out[start..])
            .map_err(|e| CandidateError::Encode {
                codec: "libdeflate",
                msg: format!("{e:?}"),
            })?;
        out.truncate(start + n);
        Ok(())
    }
}

/// Factory for an in-process encoder at `level`.
pub fn create_encoder(codec: InProcessCodec, level: u32) -> Result<Box<dyn GzipEncoder>, CandidateError> {
    match codec {
        InProcessCodec::Flate2 => Flate2GzipEncoder::new(level),
        InProcessCodec::Libdeflate => LibdeflateGzipEncoder::new(level),
    }
}

/// One in-process encoder at one level.
#[derive(Clone, Debug)]
pub struct InProcessCandidate {
    codec: InProcessCodec,
    level: u32,
}

impl InProcessCandidate {
    pub fn new(codec: InProcessCodec, level: u32) -> Self {
        Self { codec, level }
    }
}

impl CandidateRunner for InProcessCandidate {
    fn source(&self) -> String {
        format!("{} -{}", self.codec.label(), self.level)
    }

    fn chain_policy(&self) -> ChainPolicy {
        ChainPolicy::WhenValid
    }

    fn run(self: Box<Self>, job: &RaceJob) -> anyhow::Result<()> {
        let source = self.source();
        let started = Instant::now();
        let mut encoder = create_encoder(self.codec, self.level)?;
        let mut out = Vec::new();
        encoder.encode(job.input(), &mut out)?;
        job.counters().add_stage_time(Stage::Encode, started.elapsed());
        debug!(target: "ultragz::candidate", %source, size = out.len(), "in-process candidate encoded");

        let bytes = Bytes::from(out);
        let outcome = job.register(&bytes, &source);
        if self.chain_policy().applies(outcome) {
            chain_recompression(job, &bytes, &source);
        }
        Ok(())
    }
}
