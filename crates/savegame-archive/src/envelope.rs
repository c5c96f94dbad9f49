//! Compression envelope: `u64` big-endian uncompressed size followed by a
//! zlib stream.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use tracing::debug;

use crate::error::{ArchiveError, ArchiveResult};

/// Default zlib level.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

const HEADER_LEN: usize = 8;

/// Deflate never expands data by more than this factor in reverse.
const MAX_DEFLATE_RATIO: usize = 1032;

pub fn compress(data: &[u8], level: u32) -> ArchiveResult<Vec<u8>> {
    let mut out = Vec::with_capacity(HEADER_LEN + data.len() / 2);
    out.extend_from_slice(&(data.len() as u64).to_be_bytes());

    let mut encoder = ZlibEncoder::new(out, Compression::new(level.min(9)));
    encoder
        .write_all(data)
        .map_err(|e| ArchiveError::CompressionFailed(e.to_string()))?;
    let out = encoder
        .finish()
        .map_err(|e| ArchiveError::CompressionFailed(e.to_string()))?;

    debug!(raw = data.len(), compressed = out.len(), level, "compressed snapshot");
    Ok(out)
}

pub fn decompress(envelope: &[u8]) -> ArchiveResult<Vec<u8>> {
    if envelope.len() < HEADER_LEN {
        return Err(ArchiveError::UnexpectedEof {
            offset: 0,
            needed: HEADER_LEN - envelope.len(),
        });
    }
    let mut size_bytes = [0u8; HEADER_LEN];
    size_bytes.copy_from_slice(&envelope[..HEADER_LEN]);
    let expected = u64::from_be_bytes(size_bytes);
    let body = &envelope[HEADER_LEN..];

    // Pre-size from the header, bounded so a corrupt header cannot force a
    // huge allocation.
    let capacity = usize::try_from(expected)
        .unwrap_or(usize::MAX)
        .min(body.len().saturating_mul(MAX_DEFLATE_RATIO));
    let mut data = Vec::with_capacity(capacity);
    ZlibDecoder::new(body)
        .take(expected.saturating_add(1))
        .read_to_end(&mut data)
        .map_err(|e| ArchiveError::DecompressionFailed(e.to_string()))?;

    if data.len() as u64 != expected {
        return Err(ArchiveError::SizeMismatch {
            expected,
            actual: data.len() as u64,
        });
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let data: Vec<u8> = (0..10_000u32).flat_map(|i| (i % 97).to_be_bytes()).collect();
        let envelope = compress(&data, DEFAULT_COMPRESSION_LEVEL).unwrap();
        assert!(envelope.len() < data.len());
        assert_eq!(&envelope[..8], &(data.len() as u64).to_be_bytes());
        assert_eq!(decompress(&envelope).unwrap(), data);
    }

    #[test]
    fn empty_payload() {
        let envelope = compress(&[], 1).unwrap();
        assert_eq!(decompress(&envelope).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn size_mismatch_is_detected() {
        let mut envelope = compress(b"hello world", 6).unwrap();
        envelope[7] = 3;
        assert!(matches!(
            decompress(&envelope),
            Err(ArchiveError::SizeMismatch { expected: 3, .. })
        ));
    }

    #[test]
    fn truncated_header() {
        assert!(matches!(
            decompress(&[0, 0, 0]),
            Err(ArchiveError::UnexpectedEof { needed: 5, .. })
        ));
    }

    #[test]
    fn corrupt_body() {
        let mut envelope = compress(b"hello world", 6).unwrap();
        envelope.truncate(8 + 3);
        assert!(decompress(&envelope).is_err());
    }
}
