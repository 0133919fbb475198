//! ZIP entry metadata.
//!
//! An [`Entry`] describes one file or directory record. Readers build one per
//! central-directory header through [`EntryBuilder`], applying every extra
//! field before the value is frozen; writers produce the final value once an
//! entry's data has been flushed and its sizes and CRC are known.

use crate::datetime::DosDateTime;
use crate::error::{OxiZipError, Result};
use std::time::SystemTime;

/// Maximum encoded length of names and comments.
pub const MAX_FIELD_LEN: usize = u16::MAX as usize;

/// Compression method field of a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionMethod {
    /// No compression (method 0).
    #[default]
    Stored,
    /// DEFLATE (method 8).
    Deflate,
    /// AE-x wrapper (method 99); the real method lives in the 0x9901 extra field.
    Aes,
    /// Anything else.
    Unknown(u16),
}

impl CompressionMethod {
    /// Decode the header value.
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => Self::Stored,
            8 => Self::Deflate,
            99 => Self::Aes,
            other => Self::Unknown(other),
        }
    }

    /// Encode as header value.
    pub fn to_u16(self) -> u16 {
        match self {
            Self::Stored => 0,
            Self::Deflate => 8,
            Self::Aes => 99,
            Self::Unknown(v) => v,
        }
    }

    /// Get the method name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Stored => "Stored",
            Self::Deflate => "Deflate",
            Self::Aes => "AES",
            Self::Unknown(_) => "Unknown",
        }
    }
}

impl std::fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown(id) => write!(f, "Unknown({})", id),
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// AE-x key strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AesStrength {
    /// AES-128 (16-byte key, 8-byte salt)
    Aes128 = 1,
    /// AES-192 (24-byte key, 12-byte salt)
    Aes192 = 2,
    /// AES-256 (32-byte key, 16-byte salt)
    Aes256 = 3,
}

impl AesStrength {
    /// Salt length for this strength.
    pub fn salt_len(self) -> usize {
        match self {
            Self::Aes128 => 8,
            Self::Aes192 => 12,
            Self::Aes256 => 16,
        }
    }

    /// AES key length for this strength.
    pub fn key_len(self) -> usize {
        match self {
            Self::Aes128 => 16,
            Self::Aes192 => 24,
            Self::Aes256 => 32,
        }
    }

    /// PBKDF2 output length: AES key + HMAC key + 2-byte verifier.
    pub fn derived_key_len(self) -> usize {
        self.key_len() * 2 + 2
    }

    /// Key size in bits.
    pub fn bits(self) -> u16 {
        self.key_len() as u16 * 8
    }

    /// Decode the strength byte of the 0x9901 field.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Aes128),
            2 => Some(Self::Aes192),
            3 => Some(Self::Aes256),
            _ => None,
        }
    }
}

/// AE-x vendor version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AesVendorVersion {
    /// AE-1: CRC stored and checked.
    Ae1,
    /// AE-2: CRC field is zero; only the HMAC protects the data.
    Ae2,
}

impl AesVendorVersion {
    /// Header value.
    pub fn to_u16(self) -> u16 {
        match self {
            Self::Ae1 => 1,
            Self::Ae2 => 2,
        }
    }

    /// Decode header value.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::Ae1),
            2 => Some(Self::Ae2),
            _ => None,
        }
    }
}

/// Encryption applied to an entry's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionInfo {
    /// Legacy PKWARE stream cipher.
    ZipCrypto,
    /// WinZip AE-x.
    Aes {
        /// Key strength.
        strength: AesStrength,
        /// AE-1 or AE-2.
        vendor_version: AesVendorVersion,
        /// Method applied before encryption.
        actual_method: CompressionMethod,
    },
}

/// Which header fields overflowed into the Zip64 extra field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Zip64Fields {
    /// Uncompressed size was promoted.
    pub uncompressed_size: bool,
    /// Compressed size was promoted.
    pub compressed_size: bool,
    /// Local header offset was promoted.
    pub offset: bool,
    /// Disk number was promoted.
    pub disk: bool,
}

impl Zip64Fields {
    /// Any field promoted.
    pub fn any(&self) -> bool {
        self.uncompressed_size || self.compressed_size || self.offset || self.disk
    }
}

/// One file or directory record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Decoded name.
    pub name: String,
    /// Name bytes exactly as stored.
    pub raw_name: Vec<u8>,
    /// Decoded comment.
    pub comment: String,
    /// Comment bytes exactly as stored.
    pub raw_comment: Vec<u8>,
    /// Uncompressed size.
    pub size: u64,
    /// Compressed size (including encryption overhead).
    pub compressed_size: u64,
    /// CRC-32 of the uncompressed data (zero for AE-2).
    pub crc32: u32,
    /// DOS modification stamp from the header.
    pub modified: DosDateTime,
    /// High-resolution modification time from NTFS/extended-timestamp fields.
    pub last_modified: Option<SystemTime>,
    /// Last access time, if recorded.
    pub last_access: Option<SystemTime>,
    /// Creation time, if recorded.
    pub creation: Option<SystemTime>,
    /// Offset of the local header, relative to its disk.
    pub offset: u64,
    /// Disk holding the local header.
    pub disk: u32,
    /// Method field as stored (99 for AE-x).
    pub method: CompressionMethod,
    /// Encryption parameters.
    pub encryption: Option<EncryptionInfo>,
    /// Directory entry.
    pub directory: bool,
    /// Fields promoted into the Zip64 extra field.
    pub zip64: Zip64Fields,
    /// General purpose bit flags.
    pub flags: u16,
    /// Version made by.
    pub version_made_by: u16,
    /// Version needed to extract.
    pub version_needed: u16,
    /// Internal file attributes.
    pub internal_attributes: u16,
    /// External file attributes.
    pub external_attributes: u32,
    /// Raw extra field bytes from the central directory.
    pub extra: Vec<u8>,
}

impl Entry {
    /// Flag bit 0.
    pub const FLAG_ENCRYPTED: u16 = 0x0001;
    /// Flag bit 3.
    pub const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;
    /// Flag bit 11.
    pub const FLAG_UTF8: u16 = 0x0800;

    /// Start building an entry.
    pub fn builder(name: impl Into<String>) -> EntryBuilder {
        EntryBuilder::new(name)
    }

    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.directory
    }

    /// Check if this is a file.
    pub fn is_file(&self) -> bool {
        !self.directory
    }

    /// Check if the payload is encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.flags & Self::FLAG_ENCRYPTED != 0
    }

    /// Check if sizes and CRC follow the data in a descriptor.
    pub fn has_data_descriptor(&self) -> bool {
        self.flags & Self::FLAG_DATA_DESCRIPTOR != 0
    }

    /// Check if the name and comment are flagged UTF-8.
    pub fn is_utf8(&self) -> bool {
        self.flags & Self::FLAG_UTF8 != 0
    }

    /// Method actually applied to the plaintext (unwraps AE-x).
    pub fn actual_method(&self) -> CompressionMethod {
        match self.encryption {
            Some(EncryptionInfo::Aes { actual_method, .. }) => actual_method,
            _ => self.method,
        }
    }

    /// Whether the stored CRC is meaningful (AE-2 zeroes it).
    pub fn has_crc(&self) -> bool {
        !matches!(
            self.encryption,
            Some(EncryptionInfo::Aes {
                vendor_version: AesVendorVersion::Ae2,
                ..
            })
        )
    }

    /// Best available modification time.
    pub fn modified_time(&self) -> SystemTime {
        self.last_modified
            .unwrap_or_else(|| self.modified.to_system_time())
    }

    /// Unix mode bits when recorded by a Unix host.
    pub fn unix_mode(&self) -> Option<u32> {
        if self.version_made_by >> 8 == 3 && self.external_attributes >> 16 != 0 {
            Some(self.external_attributes >> 16)
        } else {
            None
        }
    }

    /// Calculate compression ratio (compressed / uncompressed).
    pub fn compression_ratio(&self) -> f64 {
        if self.size == 0 {
            1.0
        } else {
            self.compressed_size as f64 / self.size as f64
        }
    }

    /// Space savings as a percentage.
    pub fn space_savings(&self) -> f64 {
        (1.0 - self.compression_ratio()) * 100.0
    }

    /// Reject absolute paths, `..` components, and NUL bytes.
    pub fn validate_path(&self) -> Result<()> {
        let path = std::path::Path::new(&self.name);
        if path.is_absolute() || self.name.starts_with('/') || self.name.starts_with('\\') {
            return Err(OxiZipError::path_traversal(&self.name));
        }
        for component in path.components() {
            match component {
                std::path::Component::ParentDir => {
                    return Err(OxiZipError::path_traversal(&self.name));
                }
                std::path::Component::Normal(s) if s.to_string_lossy().contains('\0') => {
                    return Err(OxiZipError::path_traversal(&self.name));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Relative path with dangerous components dropped.
    pub fn sanitized_name(&self) -> String {
        let normalized = self.name.replace('\\', "/");
        normalized
            .split('/')
            .filter(|part| !part.is_empty() && *part != "." && *part != "..")
            .map(|part| part.replace('\0', "_"))
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl std::fmt::Display for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let type_char = if self.directory { 'd' } else { '-' };
        let lock = if self.is_encrypted() { '*' } else { ' ' };
        write!(
            f,
            "{}{:>12} {:>12} {:>6.1}% {:08x} {}{}",
            type_char,
            self.size,
            self.compressed_size,
            self.space_savings(),
            self.crc32,
            lock,
            self.name
        )
    }
}

/// Staged constructor for [`Entry`].
///
/// Readers feed it the fixed header fields first, then each parsed extra
/// field; [`EntryBuilder::build`] validates and freezes the result.
#[derive(Debug, Clone)]
pub struct EntryBuilder {
    entry: Entry,
}

impl EntryBuilder {
    /// Start with a UTF-8 name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let directory = name.ends_with('/');
        Self {
            entry: Entry {
                raw_name: name.as_bytes().to_vec(),
                name,
                comment: String::new(),
                raw_comment: Vec::new(),
                size: 0,
                compressed_size: 0,
                crc32: 0,
                modified: DosDateTime::EPOCH,
                last_modified: None,
                last_access: None,
                creation: None,
                offset: 0,
                disk: 0,
                method: CompressionMethod::Stored,
                encryption: None,
                directory,
                zip64: Zip64Fields::default(),
                flags: 0,
                version_made_by: 0x031E,
                version_needed: 10,
                internal_attributes: 0,
                external_attributes: 0,
                extra: Vec::new(),
            },
        }
    }

    /// Set raw name bytes alongside the decoded name.
    pub fn raw_name(mut self, raw: Vec<u8>) -> Self {
        self.entry.raw_name = raw;
        self
    }

    /// Replace the decoded name (e.g. from a Unicode path field).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.entry.name = name.into();
        self
    }

    /// Set comment and its raw bytes.
    pub fn comment(mut self, comment: impl Into<String>, raw: Vec<u8>) -> Self {
        self.entry.comment = comment.into();
        self.entry.raw_comment = raw;
        self
    }

    /// Set sizes.
    pub fn sizes(mut self, size: u64, compressed_size: u64) -> Self {
        self.entry.size = size;
        self.entry.compressed_size = compressed_size;
        self
    }

    /// Set CRC-32.
    pub fn crc32(mut self, crc: u32) -> Self {
        self.entry.crc32 = crc;
        self
    }

    /// Set DOS modification stamp.
    pub fn modified(mut self, stamp: DosDateTime) -> Self {
        self.entry.modified = stamp;
        self
    }

    /// Set high-resolution timestamps.
    pub fn times(
        mut self,
        modified: Option<SystemTime>,
        accessed: Option<SystemTime>,
        created: Option<SystemTime>,
    ) -> Self {
        if modified.is_some() {
            self.entry.last_modified = modified;
        }
        if accessed.is_some() {
            self.entry.last_access = accessed;
        }
        if created.is_some() {
            self.entry.creation = created;
        }
        self
    }

    /// Set local header location.
    pub fn location(mut self, disk: u32, offset: u64) -> Self {
        self.entry.disk = disk;
        self.entry.offset = offset;
        self
    }

    /// Set method field.
    pub fn method(mut self, method: CompressionMethod) -> Self {
        self.entry.method = method;
        self
    }

    /// Set encryption parameters.
    pub fn encryption(mut self, encryption: Option<EncryptionInfo>) -> Self {
        self.entry.encryption = encryption;
        self
    }

    /// Mark as directory.
    pub fn directory(mut self, directory: bool) -> Self {
        self.entry.directory = directory;
        self
    }

    /// Record Zip64 promotions.
    pub fn zip64(mut self, fields: Zip64Fields) -> Self {
        self.entry.zip64 = fields;
        self
    }

    /// Set flags.
    pub fn flags(mut self, flags: u16) -> Self {
        self.entry.flags = flags;
        self
    }

    /// Set version fields.
    pub fn versions(mut self, made_by: u16, needed: u16) -> Self {
        self.entry.version_made_by = made_by;
        self.entry.version_needed = needed;
        self
    }

    /// Set attribute words.
    pub fn attributes(mut self, internal: u16, external: u32) -> Self {
        self.entry.internal_attributes = internal;
        self.entry.external_attributes = external;
        self
    }

    /// Keep raw extra bytes.
    pub fn extra(mut self, extra: Vec<u8>) -> Self {
        self.entry.extra = extra;
        self
    }

    /// Validate field limits and freeze the entry.
    pub fn build(self) -> Result<Entry> {
        if self.entry.raw_name.is_empty() {
            return Err(OxiZipError::invalid_entry_name("empty name"));
        }
        if self.entry.raw_name.len() > MAX_FIELD_LEN {
            return Err(OxiZipError::invalid_entry_name(format!(
                "name is {} bytes (max {})",
                self.entry.raw_name.len(),
                MAX_FIELD_LEN
            )));
        }
        if self.entry.raw_comment.len() > MAX_FIELD_LEN {
            return Err(OxiZipError::CommentTooLong {
                len: self.entry.raw_comment.len(),
            });
        }
        Ok(self.entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_directory_detection() {
        let entry = Entry::builder("docs/").build().unwrap();
        assert!(entry.is_dir());
        let entry = Entry::builder("docs/a.txt").build().unwrap();
        assert!(entry.is_file());
    }

    #[test]
    fn test_builder_limits() {
        assert!(Entry::builder("").build().is_err());
        let long = "x".repeat(MAX_FIELD_LEN + 1);
        assert!(matches!(
            Entry::builder(long).build(),
            Err(OxiZipError::InvalidEntryName { .. })
        ));
        let comment = vec![b'c'; MAX_FIELD_LEN + 1];
        assert!(matches!(
            Entry::builder("a").comment("", comment).build(),
            Err(OxiZipError::CommentTooLong { .. })
        ));
    }

    #[test]
    fn test_actual_method_unwraps_aes() {
        let entry = Entry::builder("secret.bin")
            .method(CompressionMethod::Aes)
            .encryption(Some(EncryptionInfo::Aes {
                strength: AesStrength::Aes256,
                vendor_version: AesVendorVersion::Ae2,
                actual_method: CompressionMethod::Deflate,
            }))
            .build()
            .unwrap();
        assert_eq!(entry.actual_method(), CompressionMethod::Deflate);
        assert!(!entry.has_crc());
    }

    #[test]
    fn test_validate_path() {
        let ok = Entry::builder("dir/file.txt").build().unwrap();
        assert!(ok.validate_path().is_ok());
        let bad = Entry::builder("../etc/passwd").build().unwrap();
        assert!(bad.validate_path().is_err());
        let abs = Entry::builder("/etc/passwd").build().unwrap();
        assert!(abs.validate_path().is_err());
    }

    #[test]
    fn test_sanitized_name() {
        let entry = Entry::builder("../a/./b\\..\\c.txt").build().unwrap();
        assert_eq!(entry.sanitized_name(), "a/b/c.txt");
    }

    #[test]
    fn test_method_codes() {
        for code in [0u16, 8, 99, 12] {
            assert_eq!(CompressionMethod::from_u16(code).to_u16(), code);
        }
        assert_eq!(CompressionMethod::Unknown(12).to_string(), "Unknown(12)");
    }

    #[test]
    fn test_aes_strength_lengths() {
        assert_eq!(AesStrength::Aes128.salt_len(), 8);
        assert_eq!(AesStrength::Aes192.salt_len(), 12);
        assert_eq!(AesStrength::Aes256.salt_len(), 16);
        assert_eq!(AesStrength::Aes256.derived_key_len(), 66);
        assert_eq!(AesStrength::from_u8(4), None);
    }
}
