//! ZIP archive writer.
//!
//! Entries are compressed and encrypted by a [`Pipeline`], optionally on a
//! [`WorkerPool`] worker. A [`ZipWriter`] is `Sync`: several threads may add
//! entries at once. Whichever entry finds the sink free streams straight into
//! it and finishes with a data descriptor; the others compress into memory
//! and are written with known sizes once the sink frees up. With
//! [`WriterOptions::keep_order`] entries reach the sink strictly in the order
//! [`ZipWriter::prepare`] was called.
//!
//! # Example
//!
//! ```
//! use oxizip_archive::io::{MemorySource, VecSink};
//! use oxizip_archive::zip::{EntryOptions, ReaderOptions, WriterOptions, ZipReader, ZipWriter};
//!
//! let writer = ZipWriter::new(VecSink::new(), WriterOptions::default(), None);
//! writer.add_directory("docs/", EntryOptions::default()).unwrap();
//! writer.add_bytes("docs/readme.txt", b"hello", EntryOptions::default()).unwrap();
//! let (entries, sink) = writer.close().unwrap();
//! assert_eq!(entries.len(), 2);
//!
//! let reader = ZipReader::open(MemorySource::new(sink.into_inner()), ReaderOptions::default(), None).unwrap();
//! assert_eq!(reader.read_by_name("docs/readme.txt").unwrap(), b"hello");
//! ```

use super::codec::{CodecEncryption, CodecOptions, Pipeline, PipelineOutcome, PipelineStats};
use super::encryption::{AesExtraField, vendor_version_for};
use super::extra::{ExtendedTimestamp, ExtraField, NtfsTimes, Zip64Extra};
use super::header::{
    CentralDirectoryHeader, DataDescriptor, EndOfCentralDirectory, LocalFileHeader,
    ZIP64_MARKER_16, ZIP64_MARKER_32, Zip64EndOfCentralDirectory, Zip64Locator,
};
use super::pool::{EntryTask, WorkerPool};
use crate::io::{FileSink, FileVolumes, Sink, SplitSink};
use oxizip_core::abort::AbortSignal;
use oxizip_core::datetime::DosDateTime;
use oxizip_core::entry::{
    AesStrength, AesVendorVersion, CompressionMethod, EncryptionInfo, Entry, MAX_FIELD_LEN,
    Zip64Fields,
};
use oxizip_core::error::{OxiZipError, Result};
use oxizip_core::traits::CompressionLevel;
use std::collections::{BTreeSet, HashSet};
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, TryLockError};
use std::time::SystemTime;
use tracing::{debug, trace, warn};
use zeroize::Zeroizing;

const VERSION_DEFAULT: u16 = 10;
const VERSION_DEFLATE: u16 = 20;
const VERSION_ZIP64: u16 = 45;
const VERSION_AES: u16 = 51;

/// Unix `drwxr-xr-x` plus the MS-DOS directory bit.
const DIRECTORY_ATTRIBUTES: u32 = (0o40755 << 16) | 0x10;

/// Unix `-rw-r--r--`.
const FILE_ATTRIBUTES: u32 = 0o100644 << 16;

/// Cipher used when a password is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionMethod {
    /// Legacy PKWARE encryption.
    ZipCrypto,
    /// WinZip AE-x.
    Aes(AesStrength),
}

impl Default for EncryptionMethod {
    fn default() -> Self {
        Self::Aes(AesStrength::Aes256)
    }
}

/// Archive-wide writer settings.
#[derive(Clone)]
pub struct WriterOptions {
    /// Deflate level; 0 stores.
    pub level: CompressionLevel,
    /// Password applied to every file entry.
    pub password: Option<Zeroizing<Vec<u8>>>,
    /// Cipher used with `password`.
    pub encryption: EncryptionMethod,
    /// `Some(true)` forces Zip64 records, `Some(false)` forbids them,
    /// `None` promotes only on overflow.
    pub zip64: Option<bool>,
    /// Write entries in `prepare` order.
    pub keep_order: bool,
    /// Allow streaming with a trailing data descriptor.
    pub data_descriptor: bool,
    /// Prefix data descriptors with their signature.
    pub data_descriptor_signature: bool,
    /// Archive comment.
    pub comment: String,
    /// Split volume capacity in bytes.
    pub split_size: Option<u64>,
    /// Bytes read from the input per pipeline chunk.
    pub chunk_size: usize,
    /// Cooperative cancellation.
    pub abort: Option<AbortSignal>,
    /// Write the 0x5455 extended timestamp field.
    pub extended_timestamp: bool,
    /// Write the 0x000A NTFS timestamp field.
    pub ntfs_timestamp: bool,
    /// Version made by.
    pub version_made_by: u16,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            level: CompressionLevel::DEFAULT,
            password: None,
            encryption: EncryptionMethod::default(),
            zip64: None,
            keep_order: false,
            data_descriptor: true,
            data_descriptor_signature: true,
            comment: String::new(),
            split_size: None,
            chunk_size: 512 * 1024,
            abort: None,
            extended_timestamp: true,
            ntfs_timestamp: false,
            version_made_by: 0x031E,
        }
    }
}

impl WriterOptions {
    /// Set the compression level.
    pub fn with_level(mut self, level: impl Into<CompressionLevel>) -> Self {
        self.level = level.into();
        self
    }

    /// Encrypt every file entry.
    pub fn with_password(mut self, password: impl AsRef<[u8]>) -> Self {
        self.password = Some(Zeroizing::new(password.as_ref().to_vec()));
        self
    }

    /// Choose the cipher.
    pub fn with_encryption(mut self, encryption: EncryptionMethod) -> Self {
        self.encryption = encryption;
        self
    }

    /// Force, forbid or auto-detect Zip64.
    pub fn with_zip64(mut self, zip64: Option<bool>) -> Self {
        self.zip64 = zip64;
        self
    }

    /// Keep entries in `prepare` order.
    pub fn with_keep_order(mut self, keep_order: bool) -> Self {
        self.keep_order = keep_order;
        self
    }

    /// Allow or forbid data descriptors.
    pub fn with_data_descriptor(mut self, enabled: bool) -> Self {
        self.data_descriptor = enabled;
        self
    }

    /// Write or omit the data descriptor signature.
    pub fn with_data_descriptor_signature(mut self, enabled: bool) -> Self {
        self.data_descriptor_signature = enabled;
        self
    }

    /// Set the archive comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Split into volumes of `size` bytes.
    pub fn with_split_size(mut self, size: u64) -> Self {
        self.split_size = Some(size);
        self
    }

    /// Set the input chunk size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Attach an abort signal.
    pub fn with_abort(mut self, abort: AbortSignal) -> Self {
        self.abort = Some(abort);
        self
    }

    /// Enable or disable the extended timestamp field.
    pub fn with_extended_timestamp(mut self, enabled: bool) -> Self {
        self.extended_timestamp = enabled;
        self
    }

    /// Enable or disable the NTFS timestamp field.
    pub fn with_ntfs_timestamp(mut self, enabled: bool) -> Self {
        self.ntfs_timestamp = enabled;
        self
    }
}

impl std::fmt::Debug for WriterOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterOptions")
            .field("level", &self.level)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("encryption", &self.encryption)
            .field("zip64", &self.zip64)
            .field("keep_order", &self.keep_order)
            .field("data_descriptor", &self.data_descriptor)
            .field("split_size", &self.split_size)
            .finish_non_exhaustive()
    }
}

/// Per-entry settings; unset fields fall back to [`WriterOptions`].
#[derive(Clone, Default)]
pub struct EntryOptions {
    /// Compression level.
    pub level: Option<CompressionLevel>,
    /// Password; overrides the writer's.
    pub password: Option<Zeroizing<Vec<u8>>>,
    /// Store this entry unencrypted even if the writer has a password.
    pub no_password: bool,
    /// Cipher.
    pub encryption: Option<EncryptionMethod>,
    /// Zip64 policy.
    pub zip64: Option<bool>,
    /// Allow a data descriptor.
    pub data_descriptor: Option<bool>,
    /// Modification time (now when unset).
    pub last_modified: Option<SystemTime>,
    /// Access time.
    pub last_access: Option<SystemTime>,
    /// Creation time.
    pub creation: Option<SystemTime>,
    /// Entry comment.
    pub comment: Option<String>,
    /// Write a directory entry.
    pub directory: bool,
    /// Expected uncompressed size, used to pick Zip64 and AE-x layout up front.
    pub uncompressed_size: Option<u64>,
    /// External attributes.
    pub external_attributes: Option<u32>,
}

impl EntryOptions {
    /// Set the compression level.
    pub fn with_level(mut self, level: impl Into<CompressionLevel>) -> Self {
        self.level = Some(level.into());
        self
    }

    /// Encrypt with this password.
    pub fn with_password(mut self, password: impl AsRef<[u8]>) -> Self {
        self.password = Some(Zeroizing::new(password.as_ref().to_vec()));
        self
    }

    /// Leave this entry unencrypted.
    pub fn without_password(mut self) -> Self {
        self.no_password = true;
        self
    }

    /// Choose the cipher.
    pub fn with_encryption(mut self, encryption: EncryptionMethod) -> Self {
        self.encryption = Some(encryption);
        self
    }

    /// Zip64 policy for this entry.
    pub fn with_zip64(mut self, zip64: bool) -> Self {
        self.zip64 = Some(zip64);
        self
    }

    /// Allow or forbid a data descriptor.
    pub fn with_data_descriptor(mut self, enabled: bool) -> Self {
        self.data_descriptor = Some(enabled);
        self
    }

    /// Set the modification time.
    pub fn with_last_modified(mut self, time: SystemTime) -> Self {
        self.last_modified = Some(time);
        self
    }

    /// Set the access time.
    pub fn with_last_access(mut self, time: SystemTime) -> Self {
        self.last_access = Some(time);
        self
    }

    /// Set the creation time.
    pub fn with_creation(mut self, time: SystemTime) -> Self {
        self.creation = Some(time);
        self
    }

    /// Set the entry comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Hint the uncompressed size.
    pub fn with_uncompressed_size(mut self, size: u64) -> Self {
        self.uncompressed_size = Some(size);
        self
    }

    /// Set external attributes.
    pub fn with_external_attributes(mut self, attributes: u32) -> Self {
        self.external_attributes = Some(attributes);
        self
    }
}

impl std::fmt::Debug for EntryOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryOptions")
            .field("level", &self.level)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("encryption", &self.encryption)
            .field("directory", &self.directory)
            .field("uncompressed_size", &self.uncompressed_size)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct WriterState {
    names: HashSet<String>,
    entries: Vec<Entry>,
    corrupted: Vec<String>,
    next_ticket: u64,
    next_to_write: u64,
    /// Tickets settled ahead of `next_to_write`.
    settled: BTreeSet<u64>,
}

impl WriterState {
    fn settle(&mut self, ticket: u64) {
        self.settled.insert(ticket);
        while self.settled.remove(&self.next_to_write) {
            self.next_to_write += 1;
        }
    }
}

/// Streaming ZIP writer over any [`Sink`].
pub struct ZipWriter<S: Sink> {
    options: WriterOptions,
    pool: Option<Arc<WorkerPool>>,
    sink: Mutex<S>,
    state: Mutex<WriterState>,
    turn: Condvar,
}

impl ZipWriter<Box<dyn Sink>> {
    /// Create `path`, split into `stem.z01`, `stem.z02`, ... when
    /// [`WriterOptions::split_size`] is set.
    pub fn create(
        path: impl AsRef<Path>,
        options: WriterOptions,
        pool: Option<Arc<WorkerPool>>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let sink: Box<dyn Sink> = match options.split_size {
            Some(size) => Box::new(SplitSink::new(FileVolumes::new(path), size)?),
            None => Box::new(FileSink::create(path)?),
        };
        Ok(Self::new(sink, options, pool))
    }
}

impl<S: Sink> ZipWriter<S> {
    /// Write into `sink`.
    pub fn new(sink: S, options: WriterOptions, pool: Option<Arc<WorkerPool>>) -> Self {
        Self {
            options,
            pool,
            sink: Mutex::new(sink),
            state: Mutex::new(WriterState::default()),
            turn: Condvar::new(),
        }
    }

    /// Writer settings.
    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    /// Names of entries that failed mid-write and are absent from the directory.
    pub fn corrupted_entries(&self) -> Vec<String> {
        self.lock_state().corrupted.clone()
    }

    /// Entries written so far.
    pub fn entries(&self) -> Vec<Entry> {
        self.lock_state().entries.clone()
    }

    /// Reserve `name` and an ordering ticket.
    pub fn prepare(&self, name: &str, options: EntryOptions) -> Result<PendingEntry<'_, S>> {
        let mut name = name.replace('\\', "/");
        if options.directory && !name.ends_with('/') {
            name.push('/');
        }
        if name.is_empty() || name == "/" {
            return Err(OxiZipError::invalid_entry_name("empty name"));
        }
        if name.len() > MAX_FIELD_LEN {
            return Err(OxiZipError::invalid_entry_name(format!(
                "name is {} bytes (max {})",
                name.len(),
                MAX_FIELD_LEN
            )));
        }
        let comment_len = options.comment.as_ref().map_or(0, String::len);
        if comment_len > MAX_FIELD_LEN {
            return Err(OxiZipError::CommentTooLong { len: comment_len });
        }

        let mut state = self.lock_state();
        if !state.names.insert(name.clone()) {
            return Err(OxiZipError::duplicate_entry(name));
        }
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        trace!(name = %name, ticket, "entry prepared");
        Ok(PendingEntry {
            writer: self,
            name,
            options,
            ticket,
            settled: false,
        })
    }

    /// Add an entry read from `reader`.
    pub fn add(&self, name: &str, reader: impl Read, options: EntryOptions) -> Result<Entry> {
        self.prepare(name, options)?.write(reader)
    }

    /// Add an entry from memory.
    pub fn add_bytes(&self, name: &str, data: &[u8], options: EntryOptions) -> Result<Entry> {
        let options = EntryOptions {
            uncompressed_size: Some(data.len() as u64),
            ..options
        };
        self.add(name, data, options)
    }

    /// Add a directory entry; a trailing `/` is appended if missing.
    pub fn add_directory(&self, name: &str, options: EntryOptions) -> Result<Entry> {
        let options = EntryOptions {
            directory: true,
            ..options
        };
        self.add(name, std::io::empty(), options)
    }

    /// Write the central directory and end records, then close the sink.
    ///
    /// Returns the entries in directory order and the closed sink.
    pub fn close(self) -> Result<(Vec<Entry>, S)> {
        let state = self
            .state
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut sink = self
            .sink
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let options = self.options;
        let entries = state.entries;
        let forced = options.zip64 == Some(true);

        let comment = options.comment.as_bytes().to_vec();
        if comment.len() > MAX_FIELD_LEN {
            return Err(OxiZipError::CommentTooLong { len: comment.len() });
        }

        let mut header_disks = Vec::with_capacity(entries.len());
        let (cd_disk, cd_offset) = sink.volume();
        let cd_start = sink.position();
        for entry in &entries {
            let header = central_header(entry)?.to_bytes()?;
            header_disks.push(sink.volume().0);
            sink.write(&header)?;
        }
        let cd_size = sink.position() - cd_start;

        let end_len = EndOfCentralDirectory::FIXED_SIZE + comment.len();
        let zip64_len = Zip64EndOfCentralDirectory::SIZE + Zip64Locator::SIZE;
        let count = entries.len() as u64;
        let overflow = count >= ZIP64_MARKER_16 as u64
            || cd_size >= ZIP64_MARKER_32 as u64
            || cd_offset >= ZIP64_MARKER_32 as u64
            || cd_disk >= ZIP64_MARKER_16 as u32;
        let mut zip64 = forced || overflow;
        if !zip64 {
            // The end records may themselves land on a high disk number
            sink.reserve(end_len as u64)?;
            zip64 = sink.volume().0 >= ZIP64_MARKER_16 as u32;
        }
        if zip64 && options.zip64 == Some(false) {
            return Err(OxiZipError::zip64_required("central directory"));
        }

        if zip64 {
            sink.reserve((zip64_len + end_len) as u64)?;
            let (disk, record_offset) = sink.volume();
            let on_disk = header_disks.iter().filter(|&&d| d == disk).count() as u64;
            let record = Zip64EndOfCentralDirectory {
                version_made_by: options.version_made_by,
                version_needed: VERSION_ZIP64,
                disk,
                cd_disk,
                entries_on_disk: on_disk,
                total_entries: count,
                cd_size,
                cd_offset,
            };
            sink.write(&record.to_bytes())?;
            let locator = Zip64Locator {
                cd64_disk: disk,
                cd64_offset: record_offset,
                total_disks: disk + 1,
            };
            sink.write(&locator.to_bytes())?;
        }

        let (disk, _) = sink.volume();
        let on_disk = header_disks.iter().filter(|&&d| d == disk).count() as u64;
        let disk16 = |value: u32| -> u16 {
            if value >= ZIP64_MARKER_16 as u32 {
                ZIP64_MARKER_16
            } else {
                value as u16
            }
        };
        let clamp16 = |value: u64| -> u16 {
            if forced || value >= ZIP64_MARKER_16 as u64 {
                ZIP64_MARKER_16
            } else {
                value as u16
            }
        };
        let clamp32 = |value: u64| -> u32 {
            if forced || value >= ZIP64_MARKER_32 as u64 {
                ZIP64_MARKER_32
            } else {
                value as u32
            }
        };
        let eocd = EndOfCentralDirectory {
            disk: disk16(disk),
            cd_disk: disk16(cd_disk),
            entries_on_disk: clamp16(on_disk),
            total_entries: clamp16(count),
            cd_size: clamp32(cd_size),
            cd_offset: clamp32(cd_offset),
            comment,
        };
        sink.write(&eocd.to_bytes()?)?;
        sink.close()?;

        debug!(
            entries = entries.len(),
            corrupted = state.corrupted.len(),
            zip64,
            disks = disk + 1,
            "closed zip archive"
        );
        if !state.corrupted.is_empty() {
            warn!(names = ?state.corrupted, "archive closed with corrupted entries");
        }
        Ok((entries, sink))
    }

    fn lock_state(&self) -> MutexGuard<'_, WriterState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_sink(&self) -> MutexGuard<'_, S> {
        self.sink
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Block until `ticket` may touch the sink.
    fn wait_turn(&self, ticket: u64) {
        if !self.options.keep_order {
            return;
        }
        let mut state = self.lock_state();
        while state.next_to_write != ticket {
            state = self
                .turn
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// The sink, if it is free and it is `ticket`'s turn.
    fn try_sink_now(&self, ticket: u64) -> Option<MutexGuard<'_, S>> {
        if self.options.keep_order && self.lock_state().next_to_write != ticket {
            return None;
        }
        match self.sink.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    fn settle(&self, ticket: u64, outcome: std::result::Result<Entry, &str>) {
        let mut state = self.lock_state();
        match outcome {
            Ok(entry) => state.entries.push(entry),
            Err(name) => {
                state.names.remove(name);
                state.corrupted.push(name.to_owned());
            }
        }
        state.settle(ticket);
        drop(state);
        self.turn.notify_all();
    }

    fn release(&self, ticket: u64, name: &str) {
        let mut state = self.lock_state();
        state.names.remove(name);
        state.settle(ticket);
        drop(state);
        self.turn.notify_all();
    }
}

impl<S: Sink> std::fmt::Debug for ZipWriter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock_state();
        f.debug_struct("ZipWriter")
            .field("entries", &state.entries.len())
            .field("corrupted", &state.corrupted.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Everything about an entry that is fixed before its data is seen.
struct EntryPlan {
    name: String,
    method: CompressionMethod,
    level: u8,
    cipher: Option<(EncryptionMethod, Zeroizing<Vec<u8>>)>,
    modified: DosDateTime,
    times: (Option<SystemTime>, Option<SystemTime>, Option<SystemTime>),
    comment: String,
    directory: bool,
    zip64: Option<bool>,
    data_descriptor: bool,
    hint: Option<u64>,
    external_attributes: u32,
    version_made_by: u16,
    extended_timestamp: bool,
    ntfs_timestamp: bool,
}

impl EntryPlan {
    fn new(name: &str, options: &EntryOptions, writer: &WriterOptions) -> Self {
        let directory = options.directory || name.ends_with('/');
        let level = options.level.unwrap_or(writer.level);
        let method = if directory || level.is_store() {
            CompressionMethod::Stored
        } else {
            CompressionMethod::Deflate
        };
        let password = if directory || options.no_password {
            None
        } else {
            options.password.clone().or_else(|| writer.password.clone())
        };
        let cipher = password.map(|p| (options.encryption.unwrap_or(writer.encryption), p));
        let modified_time = options.last_modified.unwrap_or_else(SystemTime::now);
        Self {
            name: name.to_owned(),
            method,
            level: level.level(),
            cipher,
            modified: DosDateTime::from_system_time(modified_time),
            times: (Some(modified_time), options.last_access, options.creation),
            comment: options.comment.clone().unwrap_or_default(),
            directory,
            zip64: options.zip64.or(writer.zip64),
            data_descriptor: options.data_descriptor.unwrap_or(writer.data_descriptor),
            hint: if directory { Some(0) } else { options.uncompressed_size },
            external_attributes: options.external_attributes.unwrap_or(if directory {
                DIRECTORY_ATTRIBUTES
            } else {
                FILE_ATTRIBUTES
            }),
            version_made_by: writer.version_made_by,
            extended_timestamp: writer.extended_timestamp,
            ntfs_timestamp: writer.ntfs_timestamp,
        }
    }

    fn is_zipcrypto(&self) -> bool {
        matches!(self.cipher, Some((EncryptionMethod::ZipCrypto, _)))
    }

    /// AE-x variant for an AES entry of `size` bytes; `None` for every other entry.
    fn aes_version(&self, size: Option<u64>) -> Option<AesVendorVersion> {
        match self.cipher {
            Some((EncryptionMethod::Aes(_), _)) => {
                Some(size.map_or(AesVendorVersion::Ae1, vendor_version_for))
            }
            _ => None,
        }
    }

    fn codec_options(&self) -> CodecOptions {
        let encryption = self.cipher.as_ref().map(|(method, password)| match method {
            EncryptionMethod::ZipCrypto => CodecEncryption::ZipCrypto {
                password: password.clone(),
                check_byte: self.modified.check_byte(),
            },
            EncryptionMethod::Aes(strength) => CodecEncryption::Aes {
                password: password.clone(),
                strength: *strength,
            },
        });
        CodecOptions {
            method: self.method,
            level: self.level,
            encryption,
            ..Default::default()
        }
    }

    fn encryption_info(&self, aes: Option<AesVendorVersion>) -> Option<EncryptionInfo> {
        self.cipher.as_ref().map(|(method, _)| match method {
            EncryptionMethod::ZipCrypto => EncryptionInfo::ZipCrypto,
            EncryptionMethod::Aes(strength) => EncryptionInfo::Aes {
                strength: *strength,
                vendor_version: aes.unwrap_or(AesVendorVersion::Ae1),
                actual_method: self.method,
            },
        })
    }

    fn flags(&self, descriptor: bool) -> u16 {
        let mut flags = 0;
        if self.cipher.is_some() {
            flags |= Entry::FLAG_ENCRYPTED;
        }
        if descriptor {
            flags |= Entry::FLAG_DATA_DESCRIPTOR;
        }
        if !self.name.is_ascii() || !self.comment.is_ascii() {
            flags |= Entry::FLAG_UTF8;
        }
        flags
    }

    /// Extra fields shared by the local and central headers.
    fn common_extra(&self, aes: Option<AesVendorVersion>, central: bool) -> Vec<ExtraField> {
        let mut fields = Vec::new();
        if let Some((EncryptionMethod::Aes(strength), _)) = &self.cipher {
            fields.push(ExtraField::Aes(AesExtraField {
                vendor_version: aes.unwrap_or(AesVendorVersion::Ae1),
                strength: *strength,
                actual_method: self.method,
            }));
        }
        if self.extended_timestamp {
            fields.push(ExtraField::ExtendedTimestamp(if central {
                ExtendedTimestamp {
                    modified: self.times.0,
                    accessed: None,
                    created: None,
                }
            } else {
                ExtendedTimestamp {
                    modified: self.times.0,
                    accessed: self.times.1,
                    created: self.times.2,
                }
            }));
        }
        if self.ntfs_timestamp {
            if let Some(modified) = self.times.0 {
                fields.push(ExtraField::Ntfs(NtfsTimes {
                    modified,
                    accessed: self.times.1.unwrap_or(modified),
                    created: self.times.2.unwrap_or(modified),
                }));
            }
        }
        fields
    }

    fn version_needed(&self, zip64: bool) -> u16 {
        if matches!(self.cipher, Some((EncryptionMethod::Aes(_), _))) {
            VERSION_AES
        } else if zip64 {
            VERSION_ZIP64
        } else if self.method == CompressionMethod::Deflate || self.is_zipcrypto() {
            VERSION_DEFLATE
        } else {
            VERSION_DEFAULT
        }
    }

    fn stored_method(&self) -> CompressionMethod {
        match self.cipher {
            Some((EncryptionMethod::Aes(_), _)) => CompressionMethod::Aes,
            _ => self.method,
        }
    }

    /// Local header; `known` carries the final values, `None` writes zeros.
    fn local_header(
        &self,
        known: Option<&PipelineStats>,
        zip64: bool,
        descriptor: bool,
        aes: Option<AesVendorVersion>,
    ) -> Result<Vec<u8>> {
        let (crc32, size, csize) = match known {
            Some(stats) if !descriptor => (stats.crc32, stats.bytes_in, stats.bytes_out),
            _ => (0, 0, 0),
        };
        let crc32 = stored_crc(aes, crc32);
        let mut fields = Vec::new();
        if zip64 {
            fields.push(ExtraField::Zip64(Zip64Extra {
                uncompressed_size: Some(size),
                compressed_size: Some(csize),
                offset: None,
                disk: None,
            }));
        }
        fields.extend(self.common_extra(aes, false));
        let (size32, csize32) = if zip64 {
            (ZIP64_MARKER_32, ZIP64_MARKER_32)
        } else {
            (size as u32, csize as u32)
        };
        LocalFileHeader {
            version_needed: self.version_needed(zip64),
            flags: self.flags(descriptor),
            method: self.stored_method().to_u16(),
            time: self.modified.time,
            date: self.modified.date,
            crc32,
            compressed_size: csize32,
            uncompressed_size: size32,
            name: self.name.as_bytes().to_vec(),
            extra: ExtraField::serialize(&fields)?,
        }
        .to_bytes()
    }

    /// Decide Zip64 for final sizes and offset.
    fn zip64_for(&self, stats: &PipelineStats, offset: u64) -> Result<bool> {
        let overflow = stats.bytes_in >= ZIP64_MARKER_32 as u64
            || stats.bytes_out >= ZIP64_MARKER_32 as u64
            || offset >= ZIP64_MARKER_32 as u64;
        match self.zip64 {
            Some(true) => Ok(true),
            Some(false) if overflow => Err(OxiZipError::zip64_required(&self.name)),
            _ => Ok(overflow),
        }
    }

    /// Freeze the entry as the central directory will describe it.
    fn finish_entry(
        &self,
        stats: &PipelineStats,
        location: (u32, u64),
        zip64: bool,
        descriptor: bool,
        aes: Option<AesVendorVersion>,
    ) -> Result<Entry> {
        let crc32 = stored_crc(aes, stats.crc32);
        let forced = self.zip64 == Some(true);
        let promote = |value: u64| forced || value >= ZIP64_MARKER_32 as u64;
        let zip64_fields = Zip64Fields {
            uncompressed_size: promote(stats.bytes_in),
            compressed_size: promote(stats.bytes_out),
            offset: promote(location.1),
            disk: location.0 >= ZIP64_MARKER_16 as u32,
        };
        let mut builder = Entry::builder(self.name.clone())
            .comment(self.comment.clone(), self.comment.as_bytes().to_vec())
            .sizes(stats.bytes_in, stats.bytes_out)
            .crc32(crc32)
            .modified(self.modified)
            .times(self.times.0, self.times.1, self.times.2)
            .location(location.0, location.1)
            .method(self.stored_method())
            .encryption(self.encryption_info(aes))
            .directory(self.directory)
            .zip64(zip64_fields)
            .flags(self.flags(descriptor))
            .versions(
                self.version_made_by,
                self.version_needed(zip64 || zip64_fields.any()),
            )
            .attributes(0, self.external_attributes);
        builder = builder.extra(ExtraField::serialize(&self.common_extra(aes, true))?);
        builder.build()
    }
}

/// CRC as recorded in headers: AE-2 leaves the field zero.
fn stored_crc(aes: Option<AesVendorVersion>, crc32: u32) -> u32 {
    if aes == Some(AesVendorVersion::Ae2) { 0 } else { crc32 }
}

/// Central directory header for a written entry.
fn central_header(entry: &Entry) -> Result<CentralDirectoryHeader> {
    let z = entry.zip64;
    let zip64 = Zip64Extra {
        uncompressed_size: z.uncompressed_size.then_some(entry.size),
        compressed_size: z.compressed_size.then_some(entry.compressed_size),
        offset: z.offset.then_some(entry.offset),
        disk: z.disk.then_some(entry.disk),
    };
    let mask = zip64.fields();
    let mut extra = Vec::new();
    if mask.any() {
        extra = ExtraField::serialize(&[ExtraField::Zip64(zip64)])?;
    }
    extra.extend_from_slice(&entry.extra);
    let version_needed = if mask.any() {
        entry.version_needed.max(VERSION_ZIP64)
    } else {
        entry.version_needed
    };
    Ok(CentralDirectoryHeader {
        version_made_by: entry.version_made_by,
        version_needed,
        flags: entry.flags,
        method: entry.method.to_u16(),
        time: entry.modified.time,
        date: entry.modified.date,
        crc32: entry.crc32,
        compressed_size: if mask.compressed_size {
            ZIP64_MARKER_32
        } else {
            entry.compressed_size as u32
        },
        uncompressed_size: if mask.uncompressed_size {
            ZIP64_MARKER_32
        } else {
            entry.size as u32
        },
        disk_start: if mask.disk {
            ZIP64_MARKER_16
        } else {
            entry.disk as u16
        },
        internal_attributes: entry.internal_attributes,
        external_attributes: entry.external_attributes,
        local_header_offset: if mask.offset {
            ZIP64_MARKER_32
        } else {
            entry.offset as u32
        },
        name: entry.raw_name.clone(),
        extra,
        comment: entry.raw_comment.clone(),
    })
}

/// An entry whose name and ordering ticket are reserved.
///
/// Dropping it without writing releases both.
pub struct PendingEntry<'a, S: Sink> {
    writer: &'a ZipWriter<S>,
    name: String,
    options: EntryOptions,
    ticket: u64,
    settled: bool,
}

impl<S: Sink> PendingEntry<'_, S> {
    /// The reserved name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Compress, encrypt and write everything `reader` yields.
    ///
    /// On failure the entry is left out of the directory and listed in
    /// [`ZipWriter::corrupted_entries`].
    pub fn write(mut self, reader: impl Read) -> Result<Entry> {
        let plan = EntryPlan::new(&self.name, &self.options, &self.writer.options);
        let result = self.write_entry(&plan, reader);
        self.settled = true;
        match result {
            Ok(entry) => {
                trace!(name = %entry.name, size = entry.size, csize = entry.compressed_size, "entry written");
                self.writer.settle(self.ticket, Ok(entry.clone()));
                Ok(entry)
            }
            Err(e) => {
                warn!(name = %self.name, error = %e, "entry failed");
                self.writer.settle(self.ticket, Err(self.name.as_str()));
                Err(e)
            }
        }
    }

    fn write_entry(&self, plan: &EntryPlan, mut reader: impl Read) -> Result<Entry> {
        let writer = self.writer;
        if let Some(abort) = &writer.options.abort {
            abort.check()?;
        }
        let streamable = plan.data_descriptor && !plan.directory;
        if streamable {
            if let Some(sink) = writer.try_sink_now(self.ticket) {
                return self.stream(plan, sink, &mut reader);
            }
        }
        let (data, stats) = self.compress_to_memory(plan, &mut reader)?;
        writer.wait_turn(self.ticket);
        let sink = writer.lock_sink();
        self.write_buffered(plan, sink, &data, &stats)
    }

    fn start_task(&self, plan: &EntryPlan) -> Result<EntryTask> {
        let pipeline = Pipeline::for_write(&plan.codec_options())?;
        Ok(EntryTask::start(self.writer.pool.as_deref(), pipeline)
            .with_abort(self.writer.options.abort.clone()))
    }

    fn chunk_size(&self) -> usize {
        let writer = &self.writer;
        writer
            .pool
            .as_ref()
            .map_or(writer.options.chunk_size, |p| {
                p.config().chunk_size.min(writer.options.chunk_size)
            })
            .max(1)
    }

    /// Feed `reader` through a task, handing output to `emit`.
    fn pump(
        &self,
        mut task: EntryTask,
        reader: &mut impl Read,
        mut emit: impl FnMut(&[u8]) -> Result<()>,
    ) -> Result<PipelineStats> {
        let mut buf = vec![0u8; self.chunk_size()];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            let out = task.push(&buf[..n])?;
            if !out.is_empty() {
                emit(&out)?;
            }
        }
        let (tail, outcome) = task.finish()?;
        if !tail.is_empty() {
            emit(&tail)?;
        }
        match outcome {
            PipelineOutcome::Completed(stats) => Ok(stats),
            PipelineOutcome::PasswordVerified => {
                Err(OxiZipError::worker_failed("write pipeline stopped early"))
            }
        }
    }

    fn compress_to_memory(
        &self,
        plan: &EntryPlan,
        reader: &mut impl Read,
    ) -> Result<(Vec<u8>, PipelineStats)> {
        let task = self.start_task(plan)?;
        let mut data = Vec::new();
        let stats = self.pump(task, reader, |chunk| {
            data.extend_from_slice(chunk);
            Ok(())
        })?;
        Ok((data, stats))
    }

    /// Stream into the sink with a trailing data descriptor.
    fn stream(
        &self,
        plan: &EntryPlan,
        mut sink: MutexGuard<'_, S>,
        reader: &mut impl Read,
    ) -> Result<Entry> {
        let forced = plan.zip64 == Some(true);
        let hinted = plan.hint.is_some_and(|h| h >= ZIP64_MARKER_32 as u64);
        let zip64 = forced || (hinted && plan.zip64 != Some(false));
        if hinted && plan.zip64 == Some(false) {
            return Err(OxiZipError::zip64_required(&plan.name));
        }
        let aes = plan.aes_version(plan.hint);

        let header = plan.local_header(None, zip64, true, aes)?;
        sink.reserve(header.len() as u64)?;
        let location = sink.volume();
        if plan.zip64 == Some(false) && location.1 >= ZIP64_MARKER_32 as u64 {
            return Err(OxiZipError::zip64_required(&plan.name));
        }
        sink.write(&header)?;

        let task = self.start_task(plan)?;
        let stats = self.pump(task, reader, |chunk| sink.write(chunk))?;

        let overflow = stats.bytes_in >= ZIP64_MARKER_32 as u64
            || stats.bytes_out >= ZIP64_MARKER_32 as u64;
        if overflow && !zip64 {
            return Err(OxiZipError::zip64_required(format!(
                "{} (streamed without a size hint)",
                plan.name
            )));
        }
        let descriptor = DataDescriptor {
            crc32: stored_crc(aes, stats.crc32),
            compressed_size: stats.bytes_out,
            uncompressed_size: stats.bytes_in,
        };
        let signature = self.writer.options.data_descriptor_signature;
        sink.reserve(DataDescriptor::len(signature, zip64) as u64)?;
        sink.write(&descriptor.to_bytes(signature, zip64))?;
        drop(sink);

        plan.finish_entry(&stats, location, zip64, true, aes)
    }

    /// Write a fully compressed entry with known sizes.
    fn write_buffered(
        &self,
        plan: &EntryPlan,
        mut sink: MutexGuard<'_, S>,
        data: &[u8],
        stats: &PipelineStats,
    ) -> Result<Entry> {
        let aes = plan.aes_version(Some(stats.bytes_in));
        // ZipCrypto headers were keyed on the DOS time, which only a
        // descriptor-flagged entry may use as its check byte
        let descriptor = plan.is_zipcrypto();
        let provisional = plan.local_header(Some(stats), false, descriptor, aes)?;
        sink.reserve(provisional.len() as u64)?;
        let location = sink.volume();
        let zip64 = plan.zip64_for(stats, location.1)?;
        let sizes_zip64 = zip64
            && (plan.zip64 == Some(true)
                || stats.bytes_in >= ZIP64_MARKER_32 as u64
                || stats.bytes_out >= ZIP64_MARKER_32 as u64);
        let header = if sizes_zip64 {
            let header = plan.local_header(Some(stats), true, descriptor, aes)?;
            sink.reserve(header.len() as u64)?;
            header
        } else {
            provisional
        };
        let location = sink.volume();
        sink.write(&header)?;
        sink.write(data)?;
        if descriptor {
            let signature = self.writer.options.data_descriptor_signature;
            let record = DataDescriptor {
                crc32: stored_crc(aes, stats.crc32),
                compressed_size: stats.bytes_out,
                uncompressed_size: stats.bytes_in,
            };
            sink.reserve(DataDescriptor::len(signature, sizes_zip64) as u64)?;
            sink.write(&record.to_bytes(signature, sizes_zip64))?;
        }
        drop(sink);

        plan.finish_entry(stats, location, zip64, descriptor, aes)
    }
}

impl<S: Sink> Drop for PendingEntry<'_, S> {
    fn drop(&mut self) {
        if !self.settled {
            self.writer.release(self.ticket, &self.name);
        }
    }
}

impl<S: Sink> std::fmt::Debug for PendingEntry<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingEntry")
            .field("name", &self.name)
            .field("ticket", &self.ticket)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MemorySource, VecSink};
    use crate::zip::header::LocalFileHeader;
    use crate::zip::reader::{ReaderOptions, ZipReader};

    fn reopen(sink: VecSink, options: ReaderOptions) -> ZipReader<MemorySource> {
        ZipReader::open(MemorySource::new(sink.into_inner()), options, None).unwrap()
    }

    #[test]
    fn test_stored_and_deflated() {
        let writer = ZipWriter::new(VecSink::new(), WriterOptions::default(), None);
        let text = "line of text\n".repeat(500);
        writer
            .add_bytes("stored.bin", b"raw", EntryOptions::default().with_level(CompressionLevel::NONE))
            .unwrap();
        let deflated = writer
            .add_bytes("text.txt", text.as_bytes(), EntryOptions::default())
            .unwrap();
        assert_eq!(deflated.method, CompressionMethod::Deflate);
        assert!(deflated.compressed_size < deflated.size);

        let (_, sink) = writer.close().unwrap();
        let reader = reopen(sink, ReaderOptions::default());
        assert_eq!(reader.read_by_name("stored.bin").unwrap(), b"raw");
        assert_eq!(reader.read_by_name("text.txt").unwrap(), text.as_bytes());
        assert_eq!(reader.entry("text.txt").unwrap().crc32, deflated.crc32);
    }

    #[test]
    fn test_directory_entry() {
        let writer = ZipWriter::new(VecSink::new(), WriterOptions::default(), None);
        let dir = writer.add_directory("assets", EntryOptions::default()).unwrap();
        assert_eq!(dir.name, "assets/");
        assert_eq!(dir.method, CompressionMethod::Stored);
        assert_eq!(dir.external_attributes, DIRECTORY_ATTRIBUTES);
        assert!(!dir.has_data_descriptor());
        let (_, sink) = writer.close().unwrap();
        let reader = reopen(sink, ReaderOptions::default());
        assert!(reader.entry("assets/").unwrap().directory);
    }

    #[test]
    fn test_name_and_comment_validation() {
        let writer = ZipWriter::new(VecSink::new(), WriterOptions::default(), None);
        assert!(matches!(
            writer.prepare("", EntryOptions::default()),
            Err(OxiZipError::InvalidEntryName { .. })
        ));
        let long = "x".repeat(MAX_FIELD_LEN + 1);
        assert!(matches!(
            writer.prepare(&long, EntryOptions::default()),
            Err(OxiZipError::InvalidEntryName { .. })
        ));
        assert!(matches!(
            writer.prepare("a", EntryOptions::default().with_comment(long)),
            Err(OxiZipError::CommentTooLong { .. })
        ));

        writer.add_bytes("a", b"1", EntryOptions::default()).unwrap();
        assert!(matches!(
            writer.add_bytes("a", b"2", EntryOptions::default()),
            Err(OxiZipError::DuplicateEntry { .. })
        ));
    }

    #[test]
    fn test_dropped_pending_entry_frees_name() {
        let writer = ZipWriter::new(
            VecSink::new(),
            WriterOptions::default().with_keep_order(true),
            None,
        );
        let pending = writer.prepare("later", EntryOptions::default()).unwrap();
        drop(pending);
        // The ticket was released, so the next entry is not blocked
        writer.add_bytes("later", b"ok", EntryOptions::default()).unwrap();
        let (entries, _) = writer.close().unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_buffered_entry_has_known_sizes() {
        let writer = ZipWriter::new(
            VecSink::new(),
            WriterOptions::default().with_data_descriptor(false),
            None,
        );
        let entry = writer.add_bytes("plain", b"abcabcabc", EntryOptions::default()).unwrap();
        assert!(!entry.has_data_descriptor());
        let (_, sink) = writer.close().unwrap();
        let bytes = sink.into_inner();
        let local = LocalFileHeader::parse(&bytes).unwrap();
        assert_eq!(local.uncompressed_size, 9);
        assert_eq!(local.crc32, entry.crc32);
    }

    #[test]
    fn test_streamed_entry_uses_descriptor() {
        let writer = ZipWriter::new(VecSink::new(), WriterOptions::default(), None);
        let entry = writer
            .add("streamed", &b"streamed payload"[..], EntryOptions::default())
            .unwrap();
        assert!(entry.has_data_descriptor());
        let (_, sink) = writer.close().unwrap();
        let bytes = sink.into_inner();
        let local = LocalFileHeader::parse(&bytes).unwrap();
        assert_eq!(local.crc32, 0);
        assert_eq!(local.compressed_size, 0);
        let reader = ZipReader::open(MemorySource::new(bytes), ReaderOptions::default(), None).unwrap();
        assert_eq!(reader.read_by_name("streamed").unwrap(), b"streamed payload");
    }

    #[test]
    fn test_zipcrypto_round_trip() {
        let writer = ZipWriter::new(
            VecSink::new(),
            WriterOptions::default()
                .with_password("hunter2")
                .with_encryption(EncryptionMethod::ZipCrypto)
                .with_data_descriptor(false),
            None,
        );
        let entry = writer.add_bytes("secret.txt", b"top secret", EntryOptions::default()).unwrap();
        assert_eq!(entry.encryption, Some(EncryptionInfo::ZipCrypto));
        assert!(entry.has_data_descriptor());
        let (_, sink) = writer.close().unwrap();

        let reader = reopen(sink.clone(), ReaderOptions::default().with_password("hunter2"));
        assert_eq!(reader.read_by_name("secret.txt").unwrap(), b"top secret");

        let no_password = reopen(sink, ReaderOptions::default());
        assert!(matches!(
            no_password.read_by_name("secret.txt"),
            Err(OxiZipError::PasswordRequired { .. })
        ));
    }

    #[test]
    fn test_aes_vendor_version_by_size() {
        let writer = ZipWriter::new(
            VecSink::new(),
            WriterOptions::default().with_password("pw"),
            None,
        );
        let small = writer.add_bytes("small", b"tiny", EntryOptions::default()).unwrap();
        let large = writer
            .add_bytes("large", &[b'z'; 100], EntryOptions::default())
            .unwrap();
        let plain = writer
            .add_bytes("plain", b"open", EntryOptions::default().without_password())
            .unwrap();
        assert!(matches!(
            small.encryption,
            Some(EncryptionInfo::Aes { vendor_version: AesVendorVersion::Ae2, .. })
        ));
        assert_eq!(small.crc32, 0);
        assert!(matches!(
            large.encryption,
            Some(EncryptionInfo::Aes { vendor_version: AesVendorVersion::Ae1, .. })
        ));
        assert_eq!(large.method, CompressionMethod::Aes);
        assert_eq!(large.version_needed, VERSION_AES);
        assert!(plain.encryption.is_none());

        let (_, sink) = writer.close().unwrap();
        let reader = reopen(sink, ReaderOptions::default().with_password("pw"));
        assert_eq!(reader.read_by_name("small").unwrap(), b"tiny");
        assert_eq!(reader.read_by_name("large").unwrap(), vec![b'z'; 100]);
        assert_eq!(reader.read_by_name("plain").unwrap(), b"open");
    }

    #[test]
    fn test_small_entries_keep_crc_unless_ae2() {
        let real = oxizip_core::crc::Crc32::compute(b"hi");
        for streamed in [false, true] {
            let writer = ZipWriter::new(
                VecSink::new(),
                WriterOptions::default()
                    .with_password("pw")
                    .with_data_descriptor(streamed),
                None,
            );
            let plain = writer
                .add_bytes("plain", b"hi", EntryOptions::default().without_password())
                .unwrap();
            let zipcrypto = writer
                .add_bytes(
                    "zipcrypto",
                    b"hi",
                    EntryOptions::default().with_encryption(EncryptionMethod::ZipCrypto),
                )
                .unwrap();
            let aes = writer.add_bytes("aes", b"hi", EntryOptions::default()).unwrap();
            assert_eq!(plain.crc32, real);
            assert_eq!(zipcrypto.crc32, real);
            assert_eq!(aes.crc32, 0);
            assert!(matches!(
                aes.encryption,
                Some(EncryptionInfo::Aes { vendor_version: AesVendorVersion::Ae2, .. })
            ));

            let (_, sink) = writer.close().unwrap();
            let bytes = sink.into_inner();
            let local = LocalFileHeader::parse(&bytes).unwrap();
            assert_eq!(local.crc32, if streamed { 0 } else { real });

            let reader = ZipReader::open(
                MemorySource::new(bytes),
                ReaderOptions::default().with_password("pw"),
                None,
            )
            .unwrap();
            assert_eq!(reader.entry("plain").unwrap().crc32, real);
            assert_eq!(reader.entry("zipcrypto").unwrap().crc32, real);
            assert_eq!(reader.entry("aes").unwrap().crc32, 0);
            for name in ["plain", "zipcrypto", "aes"] {
                assert_eq!(reader.read_by_name(name).unwrap(), b"hi");
            }
        }
    }

    /// A sink that starts past the 32-bit offset limit.
    struct FarSink {
        base: u64,
        bytes: Vec<u8>,
    }

    impl Sink for FarSink {
        fn write(&mut self, bytes: &[u8]) -> Result<()> {
            self.bytes.extend_from_slice(bytes);
            Ok(())
        }

        fn position(&self) -> u64 {
            self.base + self.bytes.len() as u64
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_entry_zip64_forbidden_past_four_gib() {
        let far = FarSink {
            base: 1 << 32,
            bytes: Vec::new(),
        };
        let writer = ZipWriter::new(far, WriterOptions::default(), None);
        let streamed = writer.add(
            "streamed",
            &b"late"[..],
            EntryOptions::default().with_zip64(false),
        );
        assert!(matches!(streamed, Err(OxiZipError::Zip64Required { .. })));
        let buffered = writer.add_bytes(
            "buffered",
            b"late",
            EntryOptions::default()
                .with_zip64(false)
                .with_data_descriptor(false),
        );
        assert!(matches!(buffered, Err(OxiZipError::Zip64Required { .. })));
        assert_eq!(
            writer.corrupted_entries(),
            vec!["streamed".to_string(), "buffered".to_string()]
        );

        let auto = writer.add("auto", &b"late"[..], EntryOptions::default()).unwrap();
        assert!(auto.zip64.offset);
        let (entries, sink) = writer.close().unwrap();
        assert_eq!(entries.len(), 1);
        // Only the promoted entry reached the sink
        assert_eq!(LocalFileHeader::parse(&sink.bytes).unwrap().name, b"auto");
    }

    #[test]
    fn test_forced_zip64_layout() {
        let writer = ZipWriter::new(
            VecSink::new(),
            WriterOptions::default().with_zip64(Some(true)),
            None,
        );
        let entry = writer.add_bytes("big", b"not really big", EntryOptions::default()).unwrap();
        assert!(entry.zip64.uncompressed_size && entry.zip64.offset);
        let (_, sink) = writer.close().unwrap();
        let bytes = sink.into_inner();

        let eocd = EndOfCentralDirectory::parse(&bytes[bytes.len() - 22..]).unwrap();
        assert!(eocd.needs_zip64());
        assert_eq!(eocd.cd_offset, ZIP64_MARKER_32);

        let reader = ZipReader::open(MemorySource::new(bytes), ReaderOptions::default(), None).unwrap();
        let read_back = reader.entry("big").unwrap();
        assert_eq!(read_back.size, 14);
        assert!(read_back.zip64.uncompressed_size);
        assert_eq!(reader.read(read_back).unwrap(), b"not really big");
    }

    #[test]
    fn test_zip64_forbidden_hint() {
        let writer = ZipWriter::new(
            VecSink::new(),
            WriterOptions::default().with_zip64(Some(false)),
            None,
        );
        let result = writer.add(
            "huge",
            std::io::empty(),
            EntryOptions::default().with_uncompressed_size(1 << 33),
        );
        assert!(matches!(result, Err(OxiZipError::Zip64Required { .. })));
        assert_eq!(writer.corrupted_entries(), vec!["huge".to_string()]);
        let (entries, _) = writer.close().unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_abort_marks_entry_corrupted() {
        let abort = AbortSignal::new();
        let writer = ZipWriter::new(
            VecSink::new(),
            WriterOptions::default().with_abort(abort.clone()),
            None,
        );
        writer.add_bytes("before", b"kept", EntryOptions::default()).unwrap();
        abort.abort();
        assert!(matches!(
            writer.add_bytes("after", b"lost", EntryOptions::default()),
            Err(OxiZipError::Aborted)
        ));
        assert_eq!(writer.corrupted_entries(), vec!["after".to_string()]);
        let (entries, sink) = writer.close().unwrap();
        assert_eq!(entries.len(), 1);
        let reader = reopen(sink, ReaderOptions::default());
        assert_eq!(reader.read_by_name("before").unwrap(), b"kept");
    }

    #[test]
    fn test_utf8_flag_for_non_ascii_names() {
        let writer = ZipWriter::new(VecSink::new(), WriterOptions::default(), None);
        let entry = writer.add_bytes("résumé.txt", b"cv", EntryOptions::default()).unwrap();
        assert!(entry.is_utf8());
        let ascii = writer.add_bytes("plain.txt", b"cv", EntryOptions::default()).unwrap();
        assert!(!ascii.is_utf8());
        let (_, sink) = writer.close().unwrap();
        let reader = reopen(sink, ReaderOptions::default());
        assert!(reader.entry("résumé.txt").is_some());
    }
}
