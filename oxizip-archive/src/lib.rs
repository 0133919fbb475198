//! # OxiZip Archive
//!
//! Streaming ZIP container support for OxiZip.
//!
//! - [`zip`]: records, Zip64, split volumes, ZipCrypto and AE-x, the entry
//!   codec pipeline, the worker pool, and the reader and writer
//! - [`io`]: byte sources (memory, file, HTTP range, multi-volume) and
//!   sinks (buffer, file, stream, split volumes)
//!
//! ## Example
//!
//! ```rust
//! use oxizip_archive::io::VecSink;
//! use oxizip_archive::zip::{read_zip, EntryOptions, ReaderOptions, WriterOptions, ZipWriter};
//!
//! let writer = ZipWriter::new(
//!     VecSink::new(),
//!     WriterOptions::default().with_password("secret"),
//!     None,
//! );
//! writer.add_bytes("notes.txt", b"meet at noon", EntryOptions::default()).unwrap();
//! let (_, sink) = writer.close().unwrap();
//!
//! let reader = read_zip(sink.into_inner(), ReaderOptions::default().with_password("secret")).unwrap();
//! let entry = reader.entry("notes.txt").unwrap();
//! assert!(entry.is_encrypted());
//! assert_eq!(reader.read(entry).unwrap(), b"meet at noon");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod io;
pub mod zip;

// Re-exports
pub use io::{FileSink, FileSource, MemorySource, MultiVolumeSource, Sink, Source, VecSink};
pub use zip::{
    EncryptionMethod, EntryOptions, PoolConfig, ReaderOptions, WorkerPool, WriterOptions,
    ZipReader, ZipWriter,
};
