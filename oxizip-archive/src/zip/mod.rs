//! ZIP archive format support.
//!
//! Reading and writing of ZIP archives as specified in the PKWARE APPNOTE,
//! including Zip64, split volumes, data descriptors, ZipCrypto and WinZip
//! AE-x encryption.
//!
//! - [`header`]: fixed records and their serialization
//! - [`extra`]: extra-field sub-records
//! - [`crypto`] / [`encryption`]: ZipCrypto and AE-x
//! - [`codec`]: per-entry CRC, compression and encryption pipeline
//! - [`pool`]: worker threads running pipelines
//! - [`reader`] / [`writer`]: the archive front ends

pub mod charset;
pub mod codec;
pub mod crypto;
pub mod encryption;
pub mod extra;
pub mod header;
pub mod pool;
pub mod reader;
pub mod writer;

pub use charset::Charset;
pub use codec::{CodecEncryption, CodecOptions, Pipeline, PipelineOutcome, PipelineStats};
pub use pool::{EntryTask, PoolConfig, WorkerPool};
pub use reader::{ReaderOptions, ZipReader};
pub use writer::{EncryptionMethod, EntryOptions, PendingEntry, WriterOptions, ZipWriter};

use crate::io::{FileSource, MemorySource, Sink};
use oxizip_core::error::Result;
use std::path::Path;
use std::sync::Arc;

/// Open a ZIP file from disk.
pub fn open_zip(path: impl AsRef<Path>, options: ReaderOptions) -> Result<ZipReader<FileSource>> {
    ZipReader::open(FileSource::open(path)?, options, None)
}

/// Open a ZIP archive held in memory.
pub fn read_zip(bytes: impl Into<Arc<[u8]>>, options: ReaderOptions) -> Result<ZipReader<MemorySource>> {
    ZipReader::open(MemorySource::new(bytes), options, None)
}

/// Create a new ZIP archive writer.
pub fn write_zip<S: Sink>(sink: S, options: WriterOptions) -> ZipWriter<S> {
    ZipWriter::new(sink, options, None)
}
