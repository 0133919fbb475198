use oxizip_core::error::{OxiZipError, Result};
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Random-access bytes an archive is read from.
///
/// Implementations must be shareable between the threads that decode
/// entries concurrently.
pub trait Source: Send + Sync {
    /// Total size in bytes (all volumes together).
    fn size(&self) -> u64;

    /// Fill `buf` from `offset`. Running past the end is
    /// [`OxiZipError::UnexpectedEof`].
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Read `len` bytes at `offset` into a new buffer.
    fn read_range(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_at(offset, &mut buf)?;
        Ok(buf)
    }

    /// Number of volumes behind this source.
    fn volume_count(&self) -> u32 {
        1
    }

    /// Map a global offset to `(disk, local offset)`.
    fn volume_of(&self, global: u64) -> (u32, u64) {
        (0, global)
    }

    /// Map `(disk, local offset)` to a global offset.
    fn global_offset(&self, disk: u32, local: u64) -> Result<u64> {
        if disk == 0 {
            Ok(local)
        } else {
            Err(OxiZipError::SplitArchive)
        }
    }
}

impl<S: Source + ?Sized> Source for Arc<S> {
    fn size(&self) -> u64 {
        (**self).size()
    }
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        (**self).read_at(offset, buf)
    }
    fn volume_count(&self) -> u32 {
        (**self).volume_count()
    }
    fn volume_of(&self, global: u64) -> (u32, u64) {
        (**self).volume_of(global)
    }
    fn global_offset(&self, disk: u32, local: u64) -> Result<u64> {
        (**self).global_offset(disk, local)
    }
}

impl<S: Source + ?Sized> Source for Box<S> {
    fn size(&self) -> u64 {
        (**self).size()
    }
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        (**self).read_at(offset, buf)
    }
    fn volume_count(&self) -> u32 {
        (**self).volume_count()
    }
    fn volume_of(&self, global: u64) -> (u32, u64) {
        (**self).volume_of(global)
    }
    fn global_offset(&self, disk: u32, local: u64) -> Result<u64> {
        (**self).global_offset(disk, local)
    }
}

fn check_bounds(offset: u64, len: usize, size: u64) -> Result<()> {
    match offset.checked_add(len as u64) {
        Some(end) if end <= size => Ok(()),
        _ => Err(OxiZipError::unexpected_eof(len)),
    }
}

/// An archive held in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Arc<[u8]>,
}

impl MemorySource {
    /// Wrap bytes.
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self { data: data.into() }
    }

    /// The underlying bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl Source for MemorySource {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_bounds(offset, buf.len(), self.size())?;
        let start = offset as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }
}

/// A file read with positioned reads.
#[derive(Debug)]
pub struct FileSource {
    file: Mutex<File>,
    size: u64,
}

impl FileSource {
    /// Open `path` for reading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_file(File::open(path)?)
    }

    /// Wrap an already open file.
    pub fn from_file(file: File) -> Result<Self> {
        let size = file.metadata()?.len();
        Ok(Self {
            file: Mutex::new(file),
            size,
        })
    }
}

impl Source for FileSource {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_bounds(offset, buf.len(), self.size)?;
        let mut file = self
            .file
            .lock()
            .map_err(|_| OxiZipError::worker_failed("file source lock poisoned"))?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => OxiZipError::unexpected_eof(buf.len()),
            _ => OxiZipError::Io(e),
        })
    }
}

/// Several volumes of a split archive presented as one address space.
///
/// Volume `i` occupies `[start(i), start(i) + size(i))` of the global range.
pub struct MultiVolumeSource {
    volumes: Vec<Box<dyn Source>>,
    starts: Vec<u64>,
    total: u64,
}

impl MultiVolumeSource {
    /// Join volumes in disk order.
    pub fn new(volumes: Vec<Box<dyn Source>>) -> Result<Self> {
        if volumes.is_empty() {
            return Err(OxiZipError::invalid_header("multi-volume source needs at least one volume"));
        }
        let mut starts = Vec::with_capacity(volumes.len());
        let mut total = 0u64;
        for volume in &volumes {
            starts.push(total);
            total += volume.size();
        }
        Ok(Self {
            volumes,
            starts,
            total,
        })
    }

    /// Open `stem.z01`, `stem.z02`, ... followed by `stem.zip`.
    ///
    /// `last` is the path of the final volume (the `.zip` file).
    pub fn open_split(last: impl AsRef<Path>) -> Result<Self> {
        let last = last.as_ref();
        let mut volumes: Vec<Box<dyn Source>> = Vec::new();
        for index in 1.. {
            let part = last.with_extension(format!("z{:02}", index));
            if !part.exists() {
                break;
            }
            volumes.push(Box::new(FileSource::open(part)?));
        }
        volumes.push(Box::new(FileSource::open(last)?));
        Self::new(volumes)
    }

    /// Sources of all volumes in order.
    pub fn volumes(&self) -> &[Box<dyn Source>] {
        &self.volumes
    }

    /// Map a global offset to `(disk, local offset)`.
    pub fn locate(&self, global: u64) -> (u32, u64) {
        let disk = self.starts.partition_point(|&start| start <= global).saturating_sub(1);
        (disk as u32, global - self.starts[disk])
    }
}

impl std::fmt::Debug for MultiVolumeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiVolumeSource")
            .field("volumes", &self.volumes.len())
            .field("starts", &self.starts)
            .field("total", &self.total)
            .finish()
    }
}

impl Source for MultiVolumeSource {
    fn size(&self) -> u64 {
        self.total
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_bounds(offset, buf.len(), self.total)?;
        let mut done = 0;
        while done < buf.len() {
            let (disk, local) = self.locate(offset + done as u64);
            let volume = &self.volumes[disk as usize];
            let take = ((volume.size() - local) as usize).min(buf.len() - done);
            if take == 0 {
                return Err(OxiZipError::unexpected_eof(buf.len() - done));
            }
            volume.read_at(local, &mut buf[done..done + take])?;
            done += take;
        }
        Ok(())
    }

    fn volume_count(&self) -> u32 {
        self.volumes.len() as u32
    }

    fn volume_of(&self, global: u64) -> (u32, u64) {
        self.locate(global)
    }

    fn global_offset(&self, disk: u32, local: u64) -> Result<u64> {
        let start = self.starts.get(disk as usize).ok_or_else(|| {
            OxiZipError::invalid_header(format!(
                "disk {} referenced but only {} volumes present",
                disk,
                self.volumes.len()
            ))
        })?;
        Ok(start + local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_volumes() -> MultiVolumeSource {
        MultiVolumeSource::new(vec![
            Box::new(MemorySource::new(b"PK\x07\x08abcd".to_vec())),
            Box::new(MemorySource::new(b"efghij".to_vec())),
            Box::new(MemorySource::new(b"klm".to_vec())),
        ])
        .unwrap()
    }

    #[test]
    fn test_memory_source_bounds() {
        let source = MemorySource::new(b"hello".to_vec());
        assert_eq!(source.read_range(1, 3).unwrap(), b"ell");
        assert!(matches!(
            source.read_range(3, 3),
            Err(OxiZipError::UnexpectedEof { .. })
        ));
        assert!(source.read_range(u64::MAX, 1).is_err());
    }

    #[test]
    fn test_locate_maps_disks() {
        let source = three_volumes();
        assert_eq!(source.size(), 17);
        assert_eq!(source.locate(0), (0, 0));
        assert_eq!(source.locate(7), (0, 7));
        assert_eq!(source.locate(8), (1, 0));
        assert_eq!(source.locate(13), (1, 5));
        assert_eq!(source.locate(14), (2, 0));
        assert_eq!(source.global_offset(2, 1).unwrap(), 15);
        assert!(source.global_offset(3, 0).is_err());
    }

    #[test]
    fn test_read_straddles_volumes() {
        let source = three_volumes();
        assert_eq!(source.read_range(6, 10).unwrap(), b"cdefghijkl");
        assert!(source.read_range(10, 8).is_err());
    }

    #[test]
    fn test_single_volume_rejects_other_disks() {
        let source = MemorySource::new(vec![0u8; 4]);
        assert!(matches!(
            source.global_offset(1, 0),
            Err(OxiZipError::SplitArchive)
        ));
    }
}
