//! # OxiZip Core
//!
//! Core components for the OxiZip streaming ZIP engine.
//!
//! - [`bitstream`]: Push-fed bit buffers for resumable codecs
//! - [`ringbuffer`]: Sliding history window for LZ77 back-references
//! - [`crc`]: CRC-32
//! - [`traits`]: Streaming codec traits and compression level
//! - [`entry`]: ZIP entry metadata and its builder
//! - [`datetime`]: MS-DOS timestamps
//! - [`abort`]: Cooperative cancellation
//! - [`error`]: Error types
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ L4: CLI                                                 │
//! │     list / extract / test / create                      │
//! ├─────────────────────────────────────────────────────────┤
//! │ L3: Container                                           │
//! │     ZIP records, Zip64, split volumes, encryption,      │
//! │     entry pipeline, worker pool, sources and sinks      │
//! ├─────────────────────────────────────────────────────────┤
//! │ L2: Codec                                               │
//! │     Incremental Deflate / Inflate (LZ77 + Huffman)      │
//! ├─────────────────────────────────────────────────────────┤
//! │ L1: Core (this crate)                                   │
//! │     Bit buffers, window, CRC-32, entry model, errors    │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use oxizip_core::bitstream::BitInput;
//! use oxizip_core::crc::Crc32;
//!
//! // Bits arrive in chunks; a short chunk suspends instead of failing
//! let mut bits = BitInput::new();
//! let mut pos = 0;
//! assert_eq!(bits.try_bits(12, &[0xCD], &mut pos), None);
//! let mut pos = 0;
//! assert_eq!(bits.try_bits(12, &[0xAB], &mut pos), Some(0xBCD));
//!
//! // Compute CRC-32
//! let crc = Crc32::compute(b"Hello, World!");
//! assert_eq!(crc, 0xEC4AC3D0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod abort;
pub mod bitstream;
pub mod crc;
pub mod datetime;
pub mod entry;
pub mod error;
pub mod ringbuffer;
pub mod traits;

// Re-exports for convenience
pub use abort::AbortSignal;
pub use bitstream::{BitInput, BitOutput};
pub use crc::Crc32;
pub use datetime::DosDateTime;
pub use entry::{
    AesStrength, AesVendorVersion, CompressionMethod, EncryptionInfo, Entry, EntryBuilder,
    Zip64Fields,
};
pub use error::{OxiZipError, Result};
pub use ringbuffer::Window;
pub use traits::{
    ArchiveReader, CompressStatus, CompressionLevel, Compressor, DecompressStatus, Decompressor,
    FlushMode,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::abort::AbortSignal;
    pub use crate::crc::Crc32;
    pub use crate::entry::{CompressionMethod, EncryptionInfo, Entry};
    pub use crate::error::{OxiZipError, Result};
    pub use crate::traits::{ArchiveReader, CompressionLevel, Compressor, Decompressor};
}
