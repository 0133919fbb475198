use oxizip_core::error::{OxiZipError, Result};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Signature written at the head of the first volume of a split archive.
pub const SPLIT_MARKER: [u8; 4] = [0x50, 0x4B, 0x07, 0x08];

/// Sequential byte destination of an archive.
pub trait Sink: Send {
    /// Append bytes.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Total bytes written across all volumes.
    fn position(&self) -> u64;

    /// `(disk, offset within disk)` of the next byte written.
    fn volume(&self) -> (u32, u64) {
        (0, self.position())
    }

    /// Make sure the next `len` bytes land on a single volume.
    fn reserve(&mut self, _len: u64) -> Result<()> {
        Ok(())
    }

    /// Flush and release the destination.
    fn close(&mut self) -> Result<()>;
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write(bytes)
    }
    fn position(&self) -> u64 {
        (**self).position()
    }
    fn volume(&self) -> (u32, u64) {
        (**self).volume()
    }
    fn reserve(&mut self, len: u64) -> Result<()> {
        (**self).reserve(len)
    }
    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Growable in-memory sink.
#[derive(Debug, Default, Clone)]
pub struct VecSink {
    buf: Vec<u8>,
}

impl VecSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes written so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Take the buffer.
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

impl Sink for VecSink {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    fn position(&self) -> u64 {
        self.buf.len() as u64
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Any `Write` as a sink, counting bytes as they pass.
#[derive(Debug)]
pub struct StreamSink<W: Write + Send> {
    inner: W,
    position: u64,
}

impl<W: Write + Send> StreamSink<W> {
    /// Wrap a writer.
    pub fn new(inner: W) -> Self {
        Self { inner, position: 0 }
    }

    /// Unwrap the writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write + Send> Sink for StreamSink<W> {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn close(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

/// Buffered file sink.
#[derive(Debug)]
pub struct FileSink {
    inner: StreamSink<BufWriter<File>>,
}

impl FileSink {
    /// Create (truncate) `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: StreamSink::new(BufWriter::new(file)),
        })
    }
}

impl Sink for FileSink {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write(bytes)
    }

    fn position(&self) -> u64 {
        self.inner.position()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()?;
        self.inner.inner.get_ref().sync_all()?;
        Ok(())
    }
}

/// Creates the volumes of a split archive.
pub trait VolumeFactory: Send {
    /// Open volume `disk` (0-based) for writing.
    fn create(&mut self, disk: u32) -> Result<Box<dyn Write + Send>>;

    /// Called once after the last volume (`last_disk`) is flushed.
    fn finish(&mut self, _last_disk: u32) -> Result<()> {
        Ok(())
    }
}

/// Volumes named `stem.z01`, `stem.z02`, ... with the last renamed to `stem.zip`.
#[derive(Debug, Clone)]
pub struct FileVolumes {
    base: PathBuf,
}

impl FileVolumes {
    /// `path` is the final `.zip` path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { base: path.into() }
    }

    /// Path of volume `disk` before the final rename.
    pub fn volume_path(&self, disk: u32) -> PathBuf {
        self.base.with_extension(format!("z{:02}", disk + 1))
    }
}

impl VolumeFactory for FileVolumes {
    fn create(&mut self, disk: u32) -> Result<Box<dyn Write + Send>> {
        let path = self.volume_path(disk);
        debug!(disk, path = %path.display(), "creating volume");
        Ok(Box::new(BufWriter::new(File::create(path)?)))
    }

    fn finish(&mut self, last_disk: u32) -> Result<()> {
        fs::rename(self.volume_path(last_disk), &self.base)?;
        Ok(())
    }
}

/// In-memory volumes, shared so they can be inspected after the writer closes.
#[derive(Debug, Clone, Default)]
pub struct MemoryVolumes {
    volumes: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MemoryVolumes {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every volume written so far.
    pub fn volumes(&self) -> Vec<Vec<u8>> {
        self.volumes
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }
}

struct MemoryVolume {
    volumes: Arc<Mutex<Vec<Vec<u8>>>>,
    disk: usize,
}

impl Write for MemoryVolume {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut volumes = self
            .volumes
            .lock()
            .map_err(|_| std::io::Error::other("volume set poisoned"))?;
        volumes[self.disk].extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl VolumeFactory for MemoryVolumes {
    fn create(&mut self, disk: u32) -> Result<Box<dyn Write + Send>> {
        let mut volumes = self
            .volumes
            .lock()
            .map_err(|_| OxiZipError::worker_failed("volume set poisoned"))?;
        volumes.resize(disk as usize + 1, Vec::new());
        Ok(Box::new(MemoryVolume {
            volumes: Arc::clone(&self.volumes),
            disk: disk as usize,
        }))
    }
}

/// Sink that cuts its output into fixed-capacity volumes.
pub struct SplitSink<F: VolumeFactory> {
    factory: F,
    capacity: u64,
    current: Option<Box<dyn Write + Send>>,
    disk: u32,
    local: u64,
    total: u64,
}

impl<F: VolumeFactory> SplitSink<F> {
    /// Smallest accepted volume size; every record must fit on one volume.
    pub const MIN_CAPACITY: u64 = 64 * 1024;

    /// Create the first volume and write the split marker.
    pub fn new(mut factory: F, capacity: u64) -> Result<Self> {
        if capacity < Self::MIN_CAPACITY {
            return Err(OxiZipError::invalid_header(format!(
                "split volume size {} below minimum {}",
                capacity,
                Self::MIN_CAPACITY
            )));
        }
        let mut current = factory.create(0)?;
        current.write_all(&SPLIT_MARKER)?;
        Ok(Self {
            factory,
            capacity,
            current: Some(current),
            disk: 0,
            local: SPLIT_MARKER.len() as u64,
            total: SPLIT_MARKER.len() as u64,
        })
    }

    /// Number of volumes opened so far.
    pub fn volume_count(&self) -> u32 {
        self.disk + 1
    }

    fn next_volume(&mut self) -> Result<()> {
        let mut previous = self.current.take().ok_or(OxiZipError::ArchiveClosed)?;
        previous.flush()?;
        self.disk += 1;
        self.current = Some(self.factory.create(self.disk)?);
        self.local = 0;
        Ok(())
    }
}

impl<F: VolumeFactory> Sink for SplitSink<F> {
    fn write(&mut self, mut bytes: &[u8]) -> Result<()> {
        while !bytes.is_empty() {
            if self.local >= self.capacity {
                self.next_volume()?;
            }
            let room = (self.capacity - self.local) as usize;
            let take = room.min(bytes.len());
            let current = self.current.as_mut().ok_or(OxiZipError::ArchiveClosed)?;
            current.write_all(&bytes[..take])?;
            self.local += take as u64;
            self.total += take as u64;
            bytes = &bytes[take..];
        }
        Ok(())
    }

    fn position(&self) -> u64 {
        self.total
    }

    fn volume(&self) -> (u32, u64) {
        if self.local >= self.capacity {
            (self.disk + 1, 0)
        } else {
            (self.disk, self.local)
        }
    }

    fn reserve(&mut self, len: u64) -> Result<()> {
        if self.local > 0 && self.local + len > self.capacity {
            self.next_volume()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut current) = self.current.take() else {
            return Ok(());
        };
        current.flush()?;
        drop(current);
        debug!(volumes = self.disk + 1, bytes = self.total, "split archive closed");
        self.factory.finish(self.disk)
    }
}

impl<F: VolumeFactory> std::fmt::Debug for SplitSink<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SplitSink")
            .field("capacity", &self.capacity)
            .field("disk", &self.disk)
            .field("local", &self.local)
            .field("total", &self.total)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_sink_position() {
        let mut sink = VecSink::new();
        sink.write(b"abc").unwrap();
        sink.write(b"de").unwrap();
        assert_eq!(sink.position(), 5);
        assert_eq!(sink.volume(), (0, 5));
        assert_eq!(sink.into_inner(), b"abcde");
    }

    #[test]
    fn test_split_sink_rolls_volumes() {
        let volumes = MemoryVolumes::new();
        let capacity = SplitSink::<MemoryVolumes>::MIN_CAPACITY;
        let mut sink = SplitSink::new(volumes.clone(), capacity).unwrap();
        assert_eq!(sink.volume(), (0, 4));

        let payload = vec![0xAB; (capacity * 2) as usize];
        sink.write(&payload).unwrap();
        assert_eq!(sink.position(), capacity * 2 + 4);
        assert_eq!(sink.volume(), (2, 4));
        sink.close().unwrap();

        let written = volumes.volumes();
        assert_eq!(written.len(), 3);
        assert_eq!(&written[0][..4], &SPLIT_MARKER);
        assert_eq!(written[0].len() as u64, capacity);
        assert_eq!(written[1].len() as u64, capacity);
        assert_eq!(written[2].len(), 4);
    }

    #[test]
    fn test_split_sink_reserve_moves_record() {
        let volumes = MemoryVolumes::new();
        let capacity = SplitSink::<MemoryVolumes>::MIN_CAPACITY;
        let mut sink = SplitSink::new(volumes.clone(), capacity).unwrap();
        sink.write(&vec![0u8; (capacity - 10) as usize]).unwrap();
        sink.reserve(30).unwrap();
        assert_eq!(sink.volume(), (1, 0));
        sink.write(&[1u8; 30]).unwrap();
        sink.close().unwrap();
        assert_eq!(volumes.volumes()[1], vec![1u8; 30]);
    }

    #[test]
    fn test_split_sink_rejects_tiny_volumes() {
        assert!(SplitSink::new(MemoryVolumes::new(), 100).is_err());
    }

    #[test]
    fn test_file_volumes_naming() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.zip");
        let capacity = SplitSink::<FileVolumes>::MIN_CAPACITY;
        let mut sink = SplitSink::new(FileVolumes::new(&target), capacity).unwrap();
        sink.write(&vec![7u8; capacity as usize + 10]).unwrap();
        sink.close().unwrap();

        assert!(dir.path().join("out.z01").exists());
        assert!(!dir.path().join("out.z02").exists());
        assert_eq!(fs::metadata(&target).unwrap().len(), 14);
    }
}
