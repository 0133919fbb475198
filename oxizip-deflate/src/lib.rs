//! # OxiZip Deflate
//!
//! Pure Rust DEFLATE (RFC 1951) with push-based, resumable codecs.
//!
//! Both directions work on caller-owned slices and keep all progress in
//! their own state, so input can arrive in arbitrarily small chunks and
//! output can be drained through arbitrarily small buffers:
//!
//! - [`Inflater`] decodes stored, fixed-Huffman and dynamic-Huffman blocks,
//!   suspending mid-symbol when the current input chunk runs out.
//! - [`Deflater`] runs an LZ77 matcher (levels 0-9, lazy matching from
//!   level 4) and emits each block as stored, fixed or dynamic, whichever
//!   is smallest.
//!
//! ## Example
//!
//! ```rust
//! use oxizip_deflate::{deflate, inflate};
//!
//! let original = b"Hello, World! Hello, World!";
//! let compressed = deflate(original, 6).unwrap();
//! let decompressed = inflate(&compressed).unwrap();
//! assert_eq!(&decompressed, original);
//! ```
//!
//! ## Streaming
//!
//! ```rust
//! use oxizip_core::traits::{DecompressStatus, Decompressor};
//! use oxizip_deflate::{Inflater, deflate};
//!
//! let compressed = deflate(&[b'z'; 4096], 9).unwrap();
//! let mut inflater = Inflater::new();
//! let mut out = [0u8; 100];
//! let mut total = 0;
//! let mut offset = 0;
//! loop {
//!     let end = (offset + 2).min(compressed.len());
//!     let (consumed, produced, status) =
//!         inflater.decompress(&compressed[offset..end], &mut out).unwrap();
//!     offset += consumed;
//!     total += produced;
//!     if status == DecompressStatus::Done {
//!         break;
//!     }
//! }
//! assert_eq!(total, 4096);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod deflate;
pub mod huffman;
pub mod inflate;
pub mod lz77;
pub mod tables;

pub use deflate::{Deflater, deflate};
pub use huffman::{Decoded, HuffmanTree};
pub use inflate::{Inflater, inflate};
pub use lz77::{Lz77Encoder, Lz77Token};
