//! Fixed-layout ZIP records.
//!
//! Every record is parsed from a byte slice and serialized into a `Vec<u8>`;
//! the reader fetches the bytes from a [`Source`](crate::io::Source) and the
//! writer hands serialized records to a [`Sink`](crate::io::Sink). All
//! integers are little-endian.

use oxizip_core::error::{OxiZipError, Result};

/// Local file header signature (`PK\x03\x04`).
pub const LOCAL_FILE_HEADER_SIG: u32 = 0x04034B50;

/// Central directory header signature (`PK\x01\x02`).
pub const CENTRAL_DIR_HEADER_SIG: u32 = 0x02014B50;

/// End of central directory signature (`PK\x05\x06`).
pub const END_OF_CENTRAL_DIR_SIG: u32 = 0x06054B50;

/// Zip64 end of central directory signature (`PK\x06\x06`).
pub const ZIP64_END_OF_CENTRAL_DIR_SIG: u32 = 0x06064B50;

/// Zip64 end of central directory locator signature (`PK\x06\x07`).
pub const ZIP64_LOCATOR_SIG: u32 = 0x07064B50;

/// Data descriptor signature (`PK\x07\x08`), also the split-archive marker.
pub const DATA_DESCRIPTOR_SIG: u32 = 0x08074B50;

/// Sentinel for 32-bit fields moved to the Zip64 extra field.
pub const ZIP64_MARKER_32: u32 = 0xFFFF_FFFF;

/// Sentinel for 16-bit fields moved to the Zip64 records.
pub const ZIP64_MARKER_16: u16 = 0xFFFF;

/// Little-endian cursor over a record.
#[derive(Debug)]
pub(crate) struct LeReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> LeReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(OxiZipError::unexpected_eof(len - self.remaining()));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn u64(&mut self) -> Result<u64> {
        let b = self.bytes(8)?;
        let mut word = [0u8; 8];
        word.copy_from_slice(b);
        Ok(u64::from_le_bytes(word))
    }

    pub(crate) fn signature(&mut self, expected: u32) -> Result<()> {
        let found = self.u32()?;
        if found != expected {
            return Err(OxiZipError::invalid_magic(
                expected.to_le_bytes().to_vec(),
                found.to_le_bytes().to_vec(),
            ));
        }
        Ok(())
    }
}

fn field_len(bytes: &[u8], what: &str) -> Result<u16> {
    u16::try_from(bytes.len())
        .map_err(|_| OxiZipError::invalid_header(format!("{} is {} bytes (max 65535)", what, bytes.len())))
}

/// Local file header.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LocalFileHeader {
    /// Minimum version needed to extract.
    pub version_needed: u16,
    /// General purpose bit flag.
    pub flags: u16,
    /// Compression method field.
    pub method: u16,
    /// DOS time word.
    pub time: u16,
    /// DOS date word.
    pub date: u16,
    /// CRC-32 (zero when deferred to a data descriptor).
    pub crc32: u32,
    /// Compressed size or sentinel.
    pub compressed_size: u32,
    /// Uncompressed size or sentinel.
    pub uncompressed_size: u32,
    /// Raw name bytes.
    pub name: Vec<u8>,
    /// Raw extra field.
    pub extra: Vec<u8>,
}

impl LocalFileHeader {
    /// Size of the fixed part.
    pub const FIXED_SIZE: usize = 30;

    /// Parse the fixed part; returns the header with empty name/extra and
    /// the lengths still to read.
    pub fn parse_fixed(buf: &[u8]) -> Result<(Self, usize, usize)> {
        let mut r = LeReader::new(buf);
        r.signature(LOCAL_FILE_HEADER_SIG)?;
        let header = Self {
            version_needed: r.u16()?,
            flags: r.u16()?,
            method: r.u16()?,
            time: r.u16()?,
            date: r.u16()?,
            crc32: r.u32()?,
            compressed_size: r.u32()?,
            uncompressed_size: r.u32()?,
            name: Vec::new(),
            extra: Vec::new(),
        };
        let name_len = r.u16()? as usize;
        let extra_len = r.u16()? as usize;
        Ok((header, name_len, extra_len))
    }

    /// Parse a complete header.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let (mut header, name_len, extra_len) = Self::parse_fixed(buf)?;
        let mut r = LeReader::new(&buf[Self::FIXED_SIZE.min(buf.len())..]);
        header.name = r.bytes(name_len)?.to_vec();
        header.extra = r.bytes(extra_len)?.to_vec();
        Ok(header)
    }

    /// Serialized length.
    pub fn len(&self) -> usize {
        Self::FIXED_SIZE + self.name.len() + self.extra.len()
    }

    /// Always false; a header has a fixed part.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Serialize.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let name_len = field_len(&self.name, "name")?;
        let extra_len = field_len(&self.extra, "extra field")?;
        let mut out = Vec::with_capacity(self.len());
        out.extend_from_slice(&LOCAL_FILE_HEADER_SIG.to_le_bytes());
        out.extend_from_slice(&self.version_needed.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&self.method.to_le_bytes());
        out.extend_from_slice(&self.time.to_le_bytes());
        out.extend_from_slice(&self.date.to_le_bytes());
        out.extend_from_slice(&self.crc32.to_le_bytes());
        out.extend_from_slice(&self.compressed_size.to_le_bytes());
        out.extend_from_slice(&self.uncompressed_size.to_le_bytes());
        out.extend_from_slice(&name_len.to_le_bytes());
        out.extend_from_slice(&extra_len.to_le_bytes());
        out.extend_from_slice(&self.name);
        out.extend_from_slice(&self.extra);
        Ok(out)
    }
}

/// Central directory file header.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CentralDirectoryHeader {
    /// Version made by (host in the high byte).
    pub version_made_by: u16,
    /// Minimum version needed to extract.
    pub version_needed: u16,
    /// General purpose bit flag.
    pub flags: u16,
    /// Compression method field.
    pub method: u16,
    /// DOS time word.
    pub time: u16,
    /// DOS date word.
    pub date: u16,
    /// CRC-32.
    pub crc32: u32,
    /// Compressed size or sentinel.
    pub compressed_size: u32,
    /// Uncompressed size or sentinel.
    pub uncompressed_size: u32,
    /// Disk holding the local header, or sentinel.
    pub disk_start: u16,
    /// Internal attributes.
    pub internal_attributes: u16,
    /// External attributes.
    pub external_attributes: u32,
    /// Local header offset on its disk, or sentinel.
    pub local_header_offset: u32,
    /// Raw name bytes.
    pub name: Vec<u8>,
    /// Raw extra field.
    pub extra: Vec<u8>,
    /// Raw comment bytes.
    pub comment: Vec<u8>,
}

impl CentralDirectoryHeader {
    /// Size of the fixed part.
    pub const FIXED_SIZE: usize = 46;

    /// Parse one header from the start of `buf`; returns it and its length.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize)> {
        let mut r = LeReader::new(buf);
        r.signature(CENTRAL_DIR_HEADER_SIG)?;
        let version_made_by = r.u16()?;
        let version_needed = r.u16()?;
        let flags = r.u16()?;
        let method = r.u16()?;
        let time = r.u16()?;
        let date = r.u16()?;
        let crc32 = r.u32()?;
        let compressed_size = r.u32()?;
        let uncompressed_size = r.u32()?;
        let name_len = r.u16()? as usize;
        let extra_len = r.u16()? as usize;
        let comment_len = r.u16()? as usize;
        let disk_start = r.u16()?;
        let internal_attributes = r.u16()?;
        let external_attributes = r.u32()?;
        let local_header_offset = r.u32()?;
        let name = r.bytes(name_len)?.to_vec();
        let extra = r.bytes(extra_len)?.to_vec();
        let comment = r.bytes(comment_len)?.to_vec();
        Ok((
            Self {
                version_made_by,
                version_needed,
                flags,
                method,
                time,
                date,
                crc32,
                compressed_size,
                uncompressed_size,
                disk_start,
                internal_attributes,
                external_attributes,
                local_header_offset,
                name,
                extra,
                comment,
            },
            r.position(),
        ))
    }

    /// Serialized length.
    pub fn len(&self) -> usize {
        Self::FIXED_SIZE + self.name.len() + self.extra.len() + self.comment.len()
    }

    /// Always false; a header has a fixed part.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Serialize.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let name_len = field_len(&self.name, "name")?;
        let extra_len = field_len(&self.extra, "extra field")?;
        let comment_len = field_len(&self.comment, "entry comment")?;
        let mut out = Vec::with_capacity(self.len());
        out.extend_from_slice(&CENTRAL_DIR_HEADER_SIG.to_le_bytes());
        out.extend_from_slice(&self.version_made_by.to_le_bytes());
        out.extend_from_slice(&self.version_needed.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&self.method.to_le_bytes());
        out.extend_from_slice(&self.time.to_le_bytes());
        out.extend_from_slice(&self.date.to_le_bytes());
        out.extend_from_slice(&self.crc32.to_le_bytes());
        out.extend_from_slice(&self.compressed_size.to_le_bytes());
        out.extend_from_slice(&self.uncompressed_size.to_le_bytes());
        out.extend_from_slice(&name_len.to_le_bytes());
        out.extend_from_slice(&extra_len.to_le_bytes());
        out.extend_from_slice(&comment_len.to_le_bytes());
        out.extend_from_slice(&self.disk_start.to_le_bytes());
        out.extend_from_slice(&self.internal_attributes.to_le_bytes());
        out.extend_from_slice(&self.external_attributes.to_le_bytes());
        out.extend_from_slice(&self.local_header_offset.to_le_bytes());
        out.extend_from_slice(&self.name);
        out.extend_from_slice(&self.extra);
        out.extend_from_slice(&self.comment);
        Ok(out)
    }
}

/// Trailing sizes and CRC of an entry written with flag bit 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataDescriptor {
    /// CRC-32.
    pub crc32: u32,
    /// Compressed size.
    pub compressed_size: u64,
    /// Uncompressed size.
    pub uncompressed_size: u64,
}

impl DataDescriptor {
    /// Serialized length for the given layout.
    pub fn len(signature: bool, zip64: bool) -> usize {
        let sizes = if zip64 { 16 } else { 8 };
        4 + sizes + if signature { 4 } else { 0 }
    }

    /// Serialize with or without the optional signature.
    pub fn to_bytes(&self, signature: bool, zip64: bool) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::len(signature, zip64));
        if signature {
            out.extend_from_slice(&DATA_DESCRIPTOR_SIG.to_le_bytes());
        }
        out.extend_from_slice(&self.crc32.to_le_bytes());
        if zip64 {
            out.extend_from_slice(&self.compressed_size.to_le_bytes());
            out.extend_from_slice(&self.uncompressed_size.to_le_bytes());
        } else {
            out.extend_from_slice(&(self.compressed_size as u32).to_le_bytes());
            out.extend_from_slice(&(self.uncompressed_size as u32).to_le_bytes());
        }
        out
    }

    /// Parse a descriptor, detecting the optional signature.
    ///
    /// A CRC that happens to equal the signature is ambiguous; the
    /// signature reading wins.
    pub fn parse(buf: &[u8], zip64: bool) -> Result<Self> {
        let mut r = LeReader::new(buf);
        let mut crc32 = r.u32()?;
        if crc32 == DATA_DESCRIPTOR_SIG {
            crc32 = r.u32()?;
        }
        let (compressed_size, uncompressed_size) = if zip64 {
            (r.u64()?, r.u64()?)
        } else {
            (r.u32()? as u64, r.u32()? as u64)
        };
        Ok(Self {
            crc32,
            compressed_size,
            uncompressed_size,
        })
    }
}

/// End of central directory record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EndOfCentralDirectory {
    /// Number of this disk.
    pub disk: u16,
    /// Disk where the central directory starts.
    pub cd_disk: u16,
    /// Entries on this disk.
    pub entries_on_disk: u16,
    /// Total entries.
    pub total_entries: u16,
    /// Central directory size.
    pub cd_size: u32,
    /// Central directory offset on its disk.
    pub cd_offset: u32,
    /// Archive comment.
    pub comment: Vec<u8>,
}

impl EndOfCentralDirectory {
    /// Size without the comment.
    pub const FIXED_SIZE: usize = 22;

    /// Parse from `buf` (starting at the signature).
    ///
    /// A comment length running past the end is clamped to the bytes present.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let mut r = LeReader::new(buf);
        r.signature(END_OF_CENTRAL_DIR_SIG)?;
        let disk = r.u16()?;
        let cd_disk = r.u16()?;
        let entries_on_disk = r.u16()?;
        let total_entries = r.u16()?;
        let cd_size = r.u32()?;
        let cd_offset = r.u32()?;
        let comment_len = (r.u16()? as usize).min(r.remaining());
        let comment = r.bytes(comment_len)?.to_vec();
        Ok(Self {
            disk,
            cd_disk,
            entries_on_disk,
            total_entries,
            cd_size,
            cd_offset,
            comment,
        })
    }

    /// True when any field carries a Zip64 sentinel.
    pub fn needs_zip64(&self) -> bool {
        self.disk == ZIP64_MARKER_16
            || self.cd_disk == ZIP64_MARKER_16
            || self.entries_on_disk == ZIP64_MARKER_16
            || self.total_entries == ZIP64_MARKER_16
            || self.cd_size == ZIP64_MARKER_32
            || self.cd_offset == ZIP64_MARKER_32
    }

    /// Serialized length.
    pub fn len(&self) -> usize {
        Self::FIXED_SIZE + self.comment.len()
    }

    /// Always false; the record has a fixed part.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Serialize.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let comment_len = u16::try_from(self.comment.len()).map_err(|_| OxiZipError::CommentTooLong {
            len: self.comment.len(),
        })?;
        let mut out = Vec::with_capacity(self.len());
        out.extend_from_slice(&END_OF_CENTRAL_DIR_SIG.to_le_bytes());
        out.extend_from_slice(&self.disk.to_le_bytes());
        out.extend_from_slice(&self.cd_disk.to_le_bytes());
        out.extend_from_slice(&self.entries_on_disk.to_le_bytes());
        out.extend_from_slice(&self.total_entries.to_le_bytes());
        out.extend_from_slice(&self.cd_size.to_le_bytes());
        out.extend_from_slice(&self.cd_offset.to_le_bytes());
        out.extend_from_slice(&comment_len.to_le_bytes());
        out.extend_from_slice(&self.comment);
        Ok(out)
    }
}

/// Zip64 end of central directory record (version 1, no extensible data).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Zip64EndOfCentralDirectory {
    /// Version made by.
    pub version_made_by: u16,
    /// Version needed.
    pub version_needed: u16,
    /// Number of this disk.
    pub disk: u32,
    /// Disk where the central directory starts.
    pub cd_disk: u32,
    /// Entries on this disk.
    pub entries_on_disk: u64,
    /// Total entries.
    pub total_entries: u64,
    /// Central directory size.
    pub cd_size: u64,
    /// Central directory offset on its disk.
    pub cd_offset: u64,
}

impl Zip64EndOfCentralDirectory {
    /// Record size including signature and size field.
    pub const SIZE: usize = 56;

    /// Parse from `buf` (starting at the signature).
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let mut r = LeReader::new(buf);
        r.signature(ZIP64_END_OF_CENTRAL_DIR_SIG)?;
        let _record_size = r.u64()?;
        Ok(Self {
            version_made_by: r.u16()?,
            version_needed: r.u16()?,
            disk: r.u32()?,
            cd_disk: r.u32()?,
            entries_on_disk: r.u64()?,
            total_entries: r.u64()?,
            cd_size: r.u64()?,
            cd_offset: r.u64()?,
        })
    }

    /// Serialize.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.extend_from_slice(&ZIP64_END_OF_CENTRAL_DIR_SIG.to_le_bytes());
        // Size of the remaining record
        out.extend_from_slice(&((Self::SIZE - 12) as u64).to_le_bytes());
        out.extend_from_slice(&self.version_made_by.to_le_bytes());
        out.extend_from_slice(&self.version_needed.to_le_bytes());
        out.extend_from_slice(&self.disk.to_le_bytes());
        out.extend_from_slice(&self.cd_disk.to_le_bytes());
        out.extend_from_slice(&self.entries_on_disk.to_le_bytes());
        out.extend_from_slice(&self.total_entries.to_le_bytes());
        out.extend_from_slice(&self.cd_size.to_le_bytes());
        out.extend_from_slice(&self.cd_offset.to_le_bytes());
        out
    }
}

/// Zip64 end of central directory locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Zip64Locator {
    /// Disk holding the Zip64 EOCD record.
    pub cd64_disk: u32,
    /// Offset of the Zip64 EOCD record on that disk.
    pub cd64_offset: u64,
    /// Total number of disks.
    pub total_disks: u32,
}

impl Zip64Locator {
    /// Record size.
    pub const SIZE: usize = 20;

    /// Parse from `buf` (starting at the signature).
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let mut r = LeReader::new(buf);
        r.signature(ZIP64_LOCATOR_SIG)?;
        Ok(Self {
            cd64_disk: r.u32()?,
            cd64_offset: r.u64()?,
            total_disks: r.u32()?,
        })
    }

    /// Serialize.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.extend_from_slice(&ZIP64_LOCATOR_SIG.to_le_bytes());
        out.extend_from_slice(&self.cd64_disk.to_le_bytes());
        out.extend_from_slice(&self.cd64_offset.to_le_bytes());
        out.extend_from_slice(&self.total_disks.to_le_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_header_layout() {
        let header = LocalFileHeader {
            version_needed: 20,
            flags: 0x0808,
            method: 8,
            time: 0x6000,
            date: 0x5021,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            name: b"a.txt".to_vec(),
            extra: vec![],
        };
        let bytes = header.to_bytes().unwrap();
        assert_eq!(bytes.len(), 35);
        assert_eq!(&bytes[..4], b"PK\x03\x04");
        assert_eq!(&bytes[26..28], &5u16.to_le_bytes());
        assert_eq!(&bytes[30..], b"a.txt");
        assert_eq!(LocalFileHeader::parse(&bytes).unwrap(), header);
    }

    #[test]
    fn test_bad_signature() {
        let mut bytes = vec![0u8; 46];
        bytes[..4].copy_from_slice(b"PK\x03\x04");
        let err = CentralDirectoryHeader::parse(&bytes).unwrap_err();
        assert!(matches!(err, OxiZipError::InvalidMagic { .. }));
    }

    #[test]
    fn test_central_header_consumed_length() {
        let header = CentralDirectoryHeader {
            version_made_by: 0x031E,
            version_needed: 20,
            name: b"dir/".to_vec(),
            extra: vec![1, 2, 3, 4],
            comment: b"hi".to_vec(),
            external_attributes: 0o40755 << 16,
            ..Default::default()
        };
        let mut bytes = header.to_bytes().unwrap();
        bytes.extend_from_slice(b"trailing");
        let (parsed, used) = CentralDirectoryHeader::parse(&bytes).unwrap();
        assert_eq!(used, 46 + 4 + 4 + 2);
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_data_descriptor_signature_optional() {
        let dd = DataDescriptor {
            crc32: 0xCAFEBABE,
            compressed_size: 10,
            uncompressed_size: 20,
        };
        for (sig, zip64) in [(true, false), (false, false), (true, true), (false, true)] {
            let bytes = dd.to_bytes(sig, zip64);
            assert_eq!(bytes.len(), DataDescriptor::len(sig, zip64));
            assert_eq!(DataDescriptor::parse(&bytes, zip64).unwrap(), dd);
        }
    }

    #[test]
    fn test_eocd_comment_and_sentinels() {
        let eocd = EndOfCentralDirectory {
            total_entries: 3,
            entries_on_disk: 3,
            cd_size: 100,
            cd_offset: 200,
            comment: b"archive".to_vec(),
            ..Default::default()
        };
        let bytes = eocd.to_bytes().unwrap();
        assert_eq!(bytes.len(), 29);
        let parsed = EndOfCentralDirectory::parse(&bytes).unwrap();
        assert_eq!(parsed, eocd);
        assert!(!parsed.needs_zip64());

        let promoted = EndOfCentralDirectory {
            cd_offset: ZIP64_MARKER_32,
            ..eocd
        };
        assert!(promoted.needs_zip64());
    }

    #[test]
    fn test_eocd_truncated_comment_is_clamped() {
        let mut bytes = EndOfCentralDirectory::default().to_bytes().unwrap();
        bytes[20..22].copy_from_slice(&10u16.to_le_bytes());
        bytes.extend_from_slice(b"abc");
        assert_eq!(EndOfCentralDirectory::parse(&bytes).unwrap().comment, b"abc");
    }

    #[test]
    fn test_zip64_records() {
        let record = Zip64EndOfCentralDirectory {
            version_made_by: 0x031E,
            version_needed: 45,
            entries_on_disk: 70_000,
            total_entries: 70_000,
            cd_size: 5 << 32,
            cd_offset: 6 << 32,
            ..Default::default()
        };
        let bytes = record.to_bytes();
        assert_eq!(bytes.len(), Zip64EndOfCentralDirectory::SIZE);
        assert_eq!(Zip64EndOfCentralDirectory::parse(&bytes).unwrap(), record);

        let locator = Zip64Locator {
            cd64_disk: 2,
            cd64_offset: 1234,
            total_disks: 3,
        };
        assert_eq!(Zip64Locator::parse(&locator.to_bytes()).unwrap(), locator);
    }
}
