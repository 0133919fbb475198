//! Byte sources and sinks the archive layer reads from and writes to.
//!
//! Readers only need positioned reads ([`Source`]); writers only append
//! ([`Sink`]). Both understand multi-volume (split) archives: a source maps
//! `(disk, local offset)` pairs into one global address space, and a sink
//! reports the volume it is currently filling.

mod sink;
mod source;

#[cfg(feature = "http")]
mod http;

pub use sink::{SPLIT_MARKER, FileSink, FileVolumes, MemoryVolumes, Sink, SplitSink, StreamSink, VecSink, VolumeFactory};
pub use source::{FileSource, MemorySource, MultiVolumeSource, Source};

#[cfg(feature = "http")]
pub use http::HttpRangeSource;
