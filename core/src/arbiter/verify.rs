//! arbiter/verify.rs
//! Independent gzip decoders used to prove a candidate round-trips.
//!
//! Two unrelated implementations are used so that a bug in one decoder
//! cannot hide a corrupt encoder.

use std::io::{self, Read};

use flate2::read::MultiGzDecoder;

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("{decoder} rejected the stream: {source}")]
    Decode {
        decoder: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("{decoder} produced more than the {expected} expected bytes")]
    Oversized { decoder: &'static str, expected: usize },
}

/// A gzip decoder that checks a candidate against the original input.
pub trait Verifier: Send + Sync {
    fn name(&self) -> &'static str;

    /// Decode `archive`, producing at most `expected_len + 1` bytes.
    fn decode(&self, archive: &[u8], expected_len: usize) -> Result<Vec<u8>, VerifyError>;

    /// True if `archive` decodes to exactly `original`.
    fn matches(&self, archive: &[u8], original: &[u8]) -> Result<bool, VerifyError> {
        let decoded = self.decode(archive, original.len())?;
        Ok(decoded == original)
    }
}

/// Decoder A: flate2's streaming gzip reader (multi-member aware).
#[derive(Clone, Copy, Debug, Default)]
pub struct Flate2Verifier;

impl Verifier for Flate2Verifier {
    fn name(&self) -> &'static str {
        "flate2"
    }

    fn decode(&self, archive: &[u8], expected_len: usize) -> Result<Vec<u8>, VerifyError> {
        let limit = expected_len as u64 + 1;
        let mut out = Vec::with_capacity(expected_len);
        MultiGzDecoder::new(archive)
            .take(limit)
            .read_to_end(&mut out)
            .map_err(|source| VerifyError::Decode {
                decoder: self.name(),
                source,
            })?;
        Ok(out)
    }
}

/// Decoder B: libdeflate's whole-buffer gzip decoder.
#[derive(Clone, Copy, Debug, Default)]
pub struct LibdeflateVerifier;

impl Verifier for LibdeflateVerifier {
    fn name(&self) -> &'static str {
        "libdeflate"
    }

    fn decode(&self, archive: &[u8], expected_len: usize) -> Result<Vec<u8>, VerifyError> {
        let mut out = vec![0u8; expected_len];
        let mut decompressor = libdeflater::Decompressor::new();
        match decompressor.gzip_decompress(archive, &mut out) {
            Ok(n) => {
                out.truncate(n);
                Ok(out)
            }
            Err(libdeflater::DecompressionError::InsufficientSpace) => Err(VerifyError::Oversized {
                decoder: self.name(),
                expected: expected_len,
            }),
            Err(e) => Err(VerifyError::Decode {
                decoder: self.name(),
                source: io::Error::new(io::ErrorKind::InvalidData, format!("{e:?}")),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::best());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn both_decoders_accept_a_valid_stream() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(20);
        let archive = gzip(&data);
        assert!(Flate2Verifier.matches(&archive, &data).unwrap());
        assert!(LibdeflateVerifier.matches(&archive, &data).unwrap());
    }

    #[test]
    fn mismatched_content_is_not_a_match() {
        let archive = gzip(b"hello");
        assert!(!Flate2Verifier.matches(&archive, b"hellp").unwrap());
        assert!(!LibdeflateVerifier.matches(&archive, b"hellp").unwrap());
    }

    #[test]
    fn output_longer_than_expected_is_rejected() {
        let archive = gzip(b"hello world");
        assert!(!Flate2Verifier.matches(&archive, b"hello").unwrap());
        assert!(matches!(
            LibdeflateVerifier.decode(&archive, 5),
            Err(VerifyError::Oversized { .. })
        ));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(Flate2Verifier.decode(b"not gzip at all", 10).is_err());
        assert!(LibdeflateVerifier.decode(b"not gzip at all", 10).is_err());
    }
}
