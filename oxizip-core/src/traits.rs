//! Core traits for streaming codecs and archive readers.
//!
//! Codecs work on caller-provided slices: every call reports how much input
//! it consumed, how much output it produced, and why it stopped. Nothing
//! blocks; a codec that runs out of input or output space simply returns and
//! resumes from its saved state on the next call.

use crate::entry::Entry;
use crate::error::Result;
use std::io::Write;

/// Status of a streaming decompression operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecompressStatus {
    /// More input is needed to continue decompression.
    NeedsInput,
    /// More output buffer space is needed.
    NeedsOutput,
    /// The final block has been decoded.
    Done,
}

/// Status of a streaming compression operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressStatus {
    /// More input data can be accepted.
    NeedsInput,
    /// More output buffer space is needed.
    NeedsOutput,
    /// Compression is complete.
    Done,
}

/// Flush mode for compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushMode {
    /// Buffer data for best compression.
    #[default]
    None,
    /// Close the current block and byte-align the output.
    Sync,
    /// Complete the stream with a final block.
    Finish,
}

/// A streaming decompressor.
pub trait Decompressor {
    /// Decompress from `input` into `output`.
    ///
    /// Returns (bytes consumed from input, bytes written to output, status).
    fn decompress(
        &mut self,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<(usize, usize, DecompressStatus)>;

    /// Reset the decompressor to its initial state.
    fn reset(&mut self);

    /// Check if the decompressor has finished.
    fn is_finished(&self) -> bool;

    /// Decode a whole in-memory stream.
    ///
    /// Fails with `UnexpectedEof` when `input` ends before the final block.
    fn decompress_all(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let mut decoded = Vec::with_capacity(input.len().saturating_mul(3));
        let mut chunk = vec![0u8; 64 * 1024];
        let mut rest = input;
        loop {
            let (consumed, produced, status) = self.decompress(rest, &mut chunk)?;
            rest = &rest[consumed..];
            decoded.extend_from_slice(&chunk[..produced]);
            match status {
                DecompressStatus::Done => return Ok(decoded),
                DecompressStatus::NeedsInput if rest.is_empty() && produced == 0 => {
                    return Err(crate::error::OxiZipError::unexpected_eof(1));
                }
                DecompressStatus::NeedsInput | DecompressStatus::NeedsOutput => {}
            }
        }
    }
}

/// A streaming compressor.
pub trait Compressor {
    /// Compress from `input` into `output`.
    ///
    /// Returns (bytes consumed from input, bytes written to output, status).
    fn compress(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        flush: FlushMode,
    ) -> Result<(usize, usize, CompressStatus)>;

    /// Reset the compressor to its initial state.
    fn reset(&mut self);

    /// Check if the compressor has finished.
    fn is_finished(&self) -> bool;

    /// Encode `input` as one complete stream.
    fn compress_all(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let mut encoded = Vec::with_capacity(input.len() / 2 + 64);
        let mut chunk = vec![0u8; 64 * 1024];
        let mut rest = input;
        loop {
            let (consumed, produced, status) = self.compress(rest, &mut chunk, FlushMode::Finish)?;
            rest = &rest[consumed..];
            encoded.extend_from_slice(&chunk[..produced]);
            if status == CompressStatus::Done {
                return Ok(encoded);
            }
        }
    }
}

/// Read access to an archive's entries.
pub trait ArchiveReader {
    /// All entries in central-directory order.
    fn entries(&self) -> &[Entry];

    /// Extract an entry's data into `writer`.
    ///
    /// Returns the number of bytes written.
    fn extract(&self, entry: &Entry, writer: &mut dyn Write) -> Result<u64>;

    /// Look up an entry by its decoded name.
    fn entry_by_name(&self, name: &str) -> Option<&Entry> {
        self.entries().iter().find(|e| e.name == name)
    }
}

/// Compression level (0 = store, 9 = best).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CompressionLevel(u8);

impl CompressionLevel {
    /// No compression (store only).
    pub const NONE: Self = Self(0);
    /// Fastest compression.
    pub const FAST: Self = Self(1);
    /// Default compression (balanced).
    pub const DEFAULT: Self = Self(6);
    /// Best compression (slowest).
    pub const BEST: Self = Self(9);

    /// Create a compression level, clamped to 0-9.
    pub fn new(level: u8) -> Self {
        Self(level.min(9))
    }

    /// Get the level value.
    pub fn level(&self) -> u8 {
        self.0
    }

    /// True for level 0.
    pub fn is_store(&self) -> bool {
        self.0 == 0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<u8> for CompressionLevel {
    fn from(level: u8) -> Self {
        Self::new(level)
    }
}
