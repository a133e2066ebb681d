//! DEFLATE codec over in-memory buffers.
//!
//! Payloads are raw DEFLATE streams (RFC 1951, no zlib header or trailer),
//! which is what ZIP compression method 8 stores. A raw stream does not
//! record its decoded length, so decompression is always driven by the
//! uncompressed size the caller already knows from the container.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use log::warn;

use crate::error::{ArchiveError, Result};

/// Compression level used when none is configured.
pub const DEFAULT_LEVEL: u32 = 6;

/// DEFLATE compressor/decompressor with a fixed compression level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Codec {
    level: u32,
}

impl Default for Codec {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL,
        }
    }
}

impl Codec {
    /// Create a codec with the given level. Levels above 9 are clamped.
    pub fn new(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    /// Compress `input` into a raw DEFLATE stream.
    ///
    /// Empty input is legal and yields a single empty final block, so the
    /// output is never empty for a working encoder.
    pub fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(self.level));
        encoder
            .write_all(input)
            .map_err(|e| ArchiveError::CompressionFailed(e.to_string()))?;
        let compressed = encoder
            .finish()
            .map_err(|e| ArchiveError::CompressionFailed(e.to_string()))?;

        if compressed.is_empty() {
            return Err(ArchiveError::CompressionFailed(format!(
                "encoder produced no output for {} input bytes",
                input.len()
            )));
        }

        Ok(compressed)
    }

    /// Decompress `input` into a buffer of exactly `expected_size` bytes.
    ///
    /// The output capacity is reserved up front and the decoder never writes
    /// past it. A stream that decodes to more than `expected_size` bytes is
    /// truncated (with a warning); one that decodes to fewer is an error.
    pub fn decompress(&self, input: &[u8], expected_size: u32) -> Result<Vec<u8>> {
        let expected = expected_size as usize;
        let mut out = Vec::new();
        out.try_reserve_exact(expected)
            .map_err(|_| ArchiveError::InsufficientMemory(expected))?;

        if expected == 0 {
            return Ok(out);
        }

        // The limit keeps the decoder inside the reserved capacity.
        let mut limited = DeflateDecoder::new(input).take(expected_size as u64);
        limited
            .read_to_end(&mut out)
            .map_err(|e| ArchiveError::DecompressionFailed(e.to_string()))?;

        if out.is_empty() {
            return Err(ArchiveError::DecompressionFailed(
                "decoder produced no output".to_string(),
            ));
        }
        if out.len() < expected {
            return Err(ArchiveError::DecompressionFailed(format!(
                "decoded {} bytes, expected {}",
                out.len(),
                expected
            )));
        }

        // Probe one byte past the limit to report streams longer than declared.
        let mut decoder = limited.into_inner();
        let mut probe = [0u8; 1];
        if matches!(decoder.read(&mut probe), Ok(n) if n > 0) {
            warn!(
                "DEFLATE stream is longer than the declared size of {} bytes; output truncated",
                expected
            );
        }

        Ok(out)
    }
}

/// Compress `input` with the default codec.
pub fn compress(input: &[u8]) -> Result<Vec<u8>> {
    Codec::default().compress(input)
}

/// Decompress `input` with the default codec into `expected_size` bytes.
pub fn decompress(input: &[u8], expected_size: u32) -> Result<Vec<u8>> {
    Codec::default().decompress(input, expected_size)
}

/// A compressed payload together with what the container needs to know
/// about the original bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedBlock {
    pub compressed: Vec<u8>,
    /// Length of the original input.
    pub uncompressed_size: u32,
    /// CRC-32 (IEEE) of the original input.
    pub crc32: u32,
}

impl CompressedBlock {
    /// Compress `input` and record its true size and checksum.
    pub fn compress(codec: &Codec, input: &[u8]) -> Result<Self> {
        let uncompressed_size = u32::try_from(input.len()).map_err(|_| {
            ArchiveError::CompressionFailed(format!(
                "input of {} bytes exceeds the 4 GiB member limit",
                input.len()
            ))
        })?;

        Ok(Self {
            compressed: codec.compress(input)?,
            uncompressed_size,
            crc32: crc32fast::hash(input),
        })
    }

    pub fn compressed_size(&self) -> usize {
        self.compressed.len()
    }

    /// Decompress the block back into the original bytes.
    pub fn decompress(&self, codec: &Codec) -> Result<Vec<u8>> {
        codec.decompress(&self.compressed, self.uncompressed_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_world() {
        let original = b"Hello World";
        let compressed = compress(original).unwrap();
        assert!(!compressed.is_empty());

        let decompressed = decompress(&compressed, 11).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn test_empty_input() {
        let compressed = compress(&[]).unwrap();
        assert!(!compressed.is_empty());
        assert_eq!(decompress(&compressed, 0).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_all_byte_values() {
        let original: Vec<u8> = (0..=255u8).collect();
        let compressed = compress(&original).unwrap();
        assert_eq!(decompress(&compressed, 256).unwrap(), original);
    }

    #[test]
    fn test_expected_size_too_small_truncates() {
        let original = vec![7u8; 4096];
        let compressed = compress(&original).unwrap();

        let out = decompress(&compressed, 100).unwrap();
        assert_eq!(out.len(), 100);
        assert_eq!(out, &original[..100]);
    }

    #[test]
    fn test_expected_size_too_large_fails() {
        let compressed = compress(b"short").unwrap();
        let err = decompress(&compressed, 64).unwrap_err();
        assert!(matches!(err, ArchiveError::DecompressionFailed(_)));
    }

    #[test]
    fn test_garbage_input_fails() {
        // 0xFF starts a block with the reserved block type 3.
        let err = decompress(&[0xFF, 0xFF, 0xFF, 0xFF], 32).unwrap_err();
        assert!(matches!(err, ArchiveError::DecompressionFailed(_)));
    }

    #[test]
    fn test_deterministic_output() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i * 31 % 251) as u8).collect();
        assert_eq!(compress(&data).unwrap(), compress(&data).unwrap());
    }

    #[test]
    fn test_level_is_clamped() {
        assert_eq!(Codec::new(42).level(), 9);
        assert_eq!(Codec::new(0).level(), 0);
    }

    #[test]
    fn test_block_records_size_and_crc() {
        let codec = Codec::default();
        let block = CompressedBlock::compress(&codec, b"receipt").unwrap();
        assert_eq!(block.uncompressed_size, 7);
        assert_eq!(block.crc32, crc32fast::hash(b"receipt"));
        assert_eq!(block.decompress(&codec).unwrap(), b"receipt");
    }
}
