//! ZIP archive reader.
//!
//! Opening an archive reads only the trailing records and the central
//! directory. Entry payloads are pulled from the [`Source`] one chunk at a
//! time and pushed through a decrypt → inflate → CRC [`Pipeline`], either in
//! the calling thread or on a [`WorkerPool`] worker.

use super::charset::{Charset, decode_field};
use super::codec::{CodecEncryption, CodecOptions, Pipeline, PipelineOutcome};
use super::crypto::ENCRYPTION_HEADER_SIZE;
use super::encryption::header_len;
use super::extra::{ExtraField, validated_unicode};
use super::header::{
    CENTRAL_DIR_HEADER_SIG, CentralDirectoryHeader, END_OF_CENTRAL_DIR_SIG, EndOfCentralDirectory,
    LocalFileHeader, ZIP64_END_OF_CENTRAL_DIR_SIG, ZIP64_LOCATOR_SIG, ZIP64_MARKER_16,
    ZIP64_MARKER_32, Zip64EndOfCentralDirectory, Zip64Locator,
};
use super::pool::{EntryTask, WorkerPool};
use crate::io::{SPLIT_MARKER, Source};
use oxizip_core::abort::AbortSignal;
use oxizip_core::datetime::DosDateTime;
use oxizip_core::entry::{CompressionMethod, EncryptionInfo, Entry, Zip64Fields};
use oxizip_core::error::{OxiZipError, Result};
use oxizip_core::traits::ArchiveReader;
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Largest EOCD comment plus the fixed record.
const EOCD_SEARCH_WINDOW: u64 = EndOfCentralDirectory::FIXED_SIZE as u64 + 65535;

/// Reader settings.
#[derive(Clone)]
pub struct ReaderOptions {
    /// Password for encrypted entries.
    pub password: Option<Zeroizing<Vec<u8>>>,
    /// Encoding of names without the UTF-8 flag (CP437 when unset).
    pub filename_encoding: Option<String>,
    /// Encoding of comments without the UTF-8 flag (CP437 when unset).
    pub comment_encoding: Option<String>,
    /// Verify CRCs and sizes.
    pub check_signature: bool,
    /// Bytes read from the source per pipeline chunk.
    pub chunk_size: usize,
    /// Cooperative cancellation.
    pub abort: Option<AbortSignal>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            password: None,
            filename_encoding: None,
            comment_encoding: None,
            check_signature: true,
            chunk_size: 512 * 1024,
            abort: None,
        }
    }
}

impl ReaderOptions {
    /// Set the password.
    pub fn with_password(mut self, password: impl AsRef<[u8]>) -> Self {
        self.password = Some(Zeroizing::new(password.as_ref().to_vec()));
        self
    }

    /// Set the legacy filename encoding label.
    pub fn with_filename_encoding(mut self, label: impl Into<String>) -> Self {
        self.filename_encoding = Some(label.into());
        self
    }

    /// Set the legacy comment encoding label.
    pub fn with_comment_encoding(mut self, label: impl Into<String>) -> Self {
        self.comment_encoding = Some(label.into());
        self
    }

    /// Enable or disable CRC and size verification.
    pub fn with_check_signature(mut self, check: bool) -> Self {
        self.check_signature = check;
        self
    }

    /// Set the read chunk size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Attach an abort signal.
    pub fn with_abort(mut self, abort: AbortSignal) -> Self {
        self.abort = Some(abort);
        self
    }
}

impl std::fmt::Debug for ReaderOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderOptions")
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("filename_encoding", &self.filename_encoding)
            .field("comment_encoding", &self.comment_encoding)
            .field("check_signature", &self.check_signature)
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}

/// Where the trailing records put the central directory.
#[derive(Debug, Clone, Copy)]
struct Directory {
    /// Global offset one past the EOCD comment.
    end: u64,
    /// Global offset where the central directory ends.
    cd_end: u64,
    cd_disk: u32,
    cd_offset: u64,
    cd_size: u64,
    total_entries: u64,
}

/// Random-access ZIP reader over any [`Source`].
pub struct ZipReader<S: Source> {
    source: S,
    options: ReaderOptions,
    pool: Option<Arc<WorkerPool>>,
    entries: Vec<Entry>,
    comment: String,
    raw_comment: Vec<u8>,
    /// Bytes by which every recorded offset is off.
    drift: i64,
    cd_start: u64,
    end: u64,
}

impl<S: Source> ZipReader<S> {
    /// Open an archive and read its central directory.
    pub fn open(source: S, options: ReaderOptions, pool: Option<Arc<WorkerPool>>) -> Result<Self> {
        let filename_charset = charset_for(options.filename_encoding.as_deref())?;
        let comment_charset = charset_for(options.comment_encoding.as_deref())?;

        let (eocd_pos, eocd) = find_eocd(&source)?;
        let directory = read_directory(&source, eocd_pos, &eocd)?;
        if directory.cd_disk > 0 && source.volume_count() == 1 {
            return Err(OxiZipError::SplitArchive);
        }

        let (cd_start, drift) = locate_central_directory(&source, &directory)?;
        let raw_cd = source.read_range(cd_start, (directory.cd_end - cd_start) as usize)?;
        let headers = parse_central_directory(&raw_cd, directory.total_entries, cd_start)?;

        let mut entries = Vec::with_capacity(headers.len());
        for header in headers {
            entries.push(build_entry(header, filename_charset, comment_charset)?);
        }

        let raw_comment = eocd.comment;
        let comment = comment_charset.decode(&raw_comment);
        debug!(
            entries = entries.len(),
            cd_start,
            drift,
            volumes = source.volume_count(),
            "opened zip archive"
        );
        Ok(Self {
            source,
            options,
            pool,
            entries,
            comment,
            raw_comment,
            drift,
            cd_start,
            end: directory.end,
        })
    }

    /// All entries in central-directory order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Look up an entry by decoded name.
    pub fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Archive comment.
    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// Archive comment as stored.
    pub fn raw_comment(&self) -> &[u8] {
        &self.raw_comment
    }

    /// The underlying source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Reader settings.
    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    /// Replace the password used for later extractions.
    pub fn set_password(&mut self, password: impl AsRef<[u8]>) {
        self.options.password = Some(Zeroizing::new(password.as_ref().to_vec()));
    }

    /// Bytes in front of the first local header.
    pub fn prepended_data_len(&self) -> u64 {
        self.entries
            .iter()
            .filter_map(|e| self.local_header_offset(e).ok())
            .min()
            .unwrap_or(self.cd_start)
    }

    /// Bytes after the EOCD record and its comment.
    pub fn appended_data_len(&self) -> u64 {
        self.source.size().saturating_sub(self.end)
    }

    /// The bytes in front of the first local header.
    pub fn read_prepended_data(&self) -> Result<Vec<u8>> {
        self.source.read_range(0, self.prepended_data_len() as usize)
    }

    /// Global offset of an entry's local header.
    pub fn local_header_offset(&self, entry: &Entry) -> Result<u64> {
        let recorded = self.source.global_offset(entry.disk, entry.offset)?;
        recorded
            .checked_add_signed(self.drift)
            .filter(|&offset| offset < self.source.size())
            .ok_or_else(|| {
                OxiZipError::corrupted_entry(&entry.name, "local header offset out of range")
            })
    }

    /// Global offset of an entry's payload, past its local header.
    pub fn local_data_offset(&self, entry: &Entry) -> Result<u64> {
        let offset = self.local_header_offset(entry)?;
        let fixed = self
            .source
            .read_range(offset, LocalFileHeader::FIXED_SIZE)?;
        let (local, name_len, extra_len) = LocalFileHeader::parse_fixed(&fixed)?;
        let name = self
            .source
            .read_range(offset + LocalFileHeader::FIXED_SIZE as u64, name_len)?;
        if name != entry.raw_name {
            warn!(
                entry = %entry.name,
                local = %String::from_utf8_lossy(&name),
                "local header name differs from central directory"
            );
        }
        if local.method != entry.method.to_u16() {
            warn!(entry = %entry.name, local = local.method, "local header method differs");
        }
        Ok(offset + (LocalFileHeader::FIXED_SIZE + name_len + extra_len) as u64)
    }

    /// Decode an entry into `out`; returns the number of bytes written.
    pub fn extract(&self, entry: &Entry, out: &mut dyn Write) -> Result<u64> {
        if entry.directory {
            return Ok(0);
        }
        let pipeline = Pipeline::for_read(&self.codec_options(entry, false)?)?;
        let mut written = 0u64;
        let outcome = self.drive(entry, pipeline, entry.compressed_size, |chunk| {
            out.write_all(chunk)?;
            written += chunk.len() as u64;
            Ok(())
        })?;
        out.flush()?;

        if let PipelineOutcome::Completed(stats) = outcome {
            if self.options.check_signature && stats.bytes_out != entry.size {
                return Err(OxiZipError::corrupted_entry(
                    &entry.name,
                    format!("expected {} bytes, decoded {}", entry.size, stats.bytes_out),
                ));
            }
        }
        Ok(written)
    }

    /// Decode an entry into memory.
    pub fn read(&self, entry: &Entry) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(entry.size.min(64 * 1024 * 1024) as usize);
        self.extract(entry, &mut out)?;
        Ok(out)
    }

    /// Decode an entry by name into memory.
    pub fn read_by_name(&self, name: &str) -> Result<Vec<u8>> {
        let entry = self
            .entry(name)
            .ok_or_else(|| OxiZipError::entry_not_found(name))?;
        self.read(entry)
    }

    /// Verify the password against the entry's header without decoding.
    ///
    /// Unencrypted entries pass trivially.
    pub fn check_password(&self, entry: &Entry) -> Result<()> {
        let header = match entry.encryption {
            None => return Ok(()),
            Some(EncryptionInfo::ZipCrypto) => ENCRYPTION_HEADER_SIZE as u64,
            Some(EncryptionInfo::Aes { strength, .. }) => header_len(strength) as u64,
        };
        let pipeline = Pipeline::for_read(&self.codec_options(entry, true)?)?;
        match self.drive(entry, pipeline, header.min(entry.compressed_size), |_| Ok(()))? {
            PipelineOutcome::PasswordVerified => Ok(()),
            PipelineOutcome::Completed(_) => Err(OxiZipError::corrupted_entry(
                &entry.name,
                "encryption header truncated",
            )),
        }
    }

    /// Fully decode an entry, discarding the output.
    pub fn test(&self, entry: &Entry) -> Result<u64> {
        self.extract(entry, &mut std::io::sink())
    }

    fn codec_options(&self, entry: &Entry, password_only: bool) -> Result<CodecOptions> {
        let encryption = match entry.encryption {
            None => None,
            Some(info) => {
                let password = self
                    .options
                    .password
                    .clone()
                    .ok_or_else(|| OxiZipError::password_required(&entry.name))?;
                Some(match info {
                    EncryptionInfo::ZipCrypto => CodecEncryption::ZipCrypto {
                        password,
                        check_byte: zipcrypto_check_byte(entry),
                    },
                    EncryptionInfo::Aes { strength, .. } => {
                        CodecEncryption::Aes { password, strength }
                    }
                })
            }
        };
        Ok(CodecOptions {
            method: entry.actual_method(),
            level: 0,
            encryption,
            check_signature: self.options.check_signature,
            expected_crc: entry.has_crc().then_some(entry.crc32),
            password_only,
        })
    }

    /// Stream `len` payload bytes through `pipeline`, handing output to `sink`.
    fn drive(
        &self,
        entry: &Entry,
        pipeline: Pipeline,
        len: u64,
        mut sink: impl FnMut(&[u8]) -> Result<()>,
    ) -> Result<PipelineOutcome> {
        let start = self.local_data_offset(entry)?;
        if start
            .checked_add(len)
            .is_none_or(|end| end > self.source.size())
        {
            return Err(OxiZipError::corrupted_entry(
                &entry.name,
                "payload runs past the end of the archive",
            ));
        }
        let mut task = EntryTask::start(self.pool.as_deref(), pipeline)
            .with_abort(self.options.abort.clone());
        let chunk_size = self
            .pool
            .as_ref()
            .map_or(self.options.chunk_size, |p| p.config().chunk_size.min(self.options.chunk_size));
        let mut buf = vec![0u8; chunk_size.min(len as usize).max(1)];
        let mut done = 0u64;
        while done < len {
            let n = ((len - done) as usize).min(buf.len());
            self.source.read_at(start + done, &mut buf[..n])?;
            let output = task.push(&buf[..n])?;
            if !output.is_empty() {
                sink(&output)?;
            }
            done += n as u64;
        }
        let (tail, outcome) = task.finish()?;
        if !tail.is_empty() {
            sink(&tail)?;
        }
        Ok(outcome)
    }
}

impl<S: Source> ArchiveReader for ZipReader<S> {
    fn entries(&self) -> &[Entry] {
        &self.entries
    }

    fn extract(&self, entry: &Entry, writer: &mut dyn Write) -> Result<u64> {
        ZipReader::extract(self, entry, writer)
    }
}

impl<S: Source> std::fmt::Debug for ZipReader<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipReader")
            .field("entries", &self.entries.len())
            .field("drift", &self.drift)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Byte the ZipCrypto header must end with.
fn zipcrypto_check_byte(entry: &Entry) -> u8 {
    if entry.has_data_descriptor() {
        entry.modified.check_byte()
    } else {
        (entry.crc32 >> 24) as u8
    }
}

fn charset_for(label: Option<&str>) -> Result<Charset> {
    label.map_or(Ok(Charset::Cp437), Charset::for_label)
}

/// Scan backward for the EOCD record.
fn find_eocd(source: &impl Source) -> Result<(u64, EndOfCentralDirectory)> {
    let size = source.size();
    let window_start = size.saturating_sub(EOCD_SEARCH_WINDOW);
    let tail = source.read_range(window_start, (size - window_start) as usize)?;
    let signature = END_OF_CENTRAL_DIR_SIG.to_le_bytes();

    let mut end = tail.len();
    while let Some(pos) = tail[..end].windows(4).rposition(|w| w == signature) {
        if tail.len() - pos >= EndOfCentralDirectory::FIXED_SIZE {
            if let Ok(eocd) = EndOfCentralDirectory::parse(&tail[pos..]) {
                return Ok((window_start + pos as u64, eocd));
            }
        }
        end = pos + 3;
    }

    let head = source.read_range(0, SPLIT_MARKER.len().min(size as usize))?;
    if head == SPLIT_MARKER {
        Err(OxiZipError::SplitArchive)
    } else {
        Err(OxiZipError::EocdNotFound)
    }
}

/// Resolve the final counts and offsets, following Zip64 records when needed.
fn read_directory(
    source: &impl Source,
    eocd_pos: u64,
    eocd: &EndOfCentralDirectory,
) -> Result<Directory> {
    let end = eocd_pos + eocd.len() as u64;
    if !eocd.needs_zip64() {
        return Ok(Directory {
            end,
            cd_end: eocd_pos,
            cd_disk: eocd.cd_disk as u32,
            cd_offset: eocd.cd_offset as u64,
            cd_size: eocd.cd_size as u64,
            total_entries: eocd.total_entries as u64,
        });
    }

    let locator_pos = eocd_pos
        .checked_sub(Zip64Locator::SIZE as u64)
        .ok_or(OxiZipError::Zip64LocatorNotFound)?;
    let locator_bytes = source.read_range(locator_pos, Zip64Locator::SIZE)?;
    if locator_bytes[..4] != ZIP64_LOCATOR_SIG.to_le_bytes() {
        return Err(OxiZipError::Zip64LocatorNotFound);
    }
    let locator = Zip64Locator::parse(&locator_bytes)?;

    let record_pos = read_zip64_record_pos(source, &locator, locator_pos)?;
    let record = Zip64EndOfCentralDirectory::parse(
        &source.read_range(record_pos, Zip64EndOfCentralDirectory::SIZE)?,
    )?;

    // Only fields holding a sentinel are taken from the Zip64 record
    Ok(Directory {
        end,
        cd_end: record_pos,
        cd_disk: if eocd.cd_disk == ZIP64_MARKER_16 {
            record.cd_disk
        } else {
            eocd.cd_disk as u32
        },
        cd_offset: if eocd.cd_offset == ZIP64_MARKER_32 {
            record.cd_offset
        } else {
            eocd.cd_offset as u64
        },
        cd_size: if eocd.cd_size == ZIP64_MARKER_32 {
            record.cd_size
        } else {
            eocd.cd_size as u64
        },
        total_entries: if eocd.total_entries == ZIP64_MARKER_16 {
            record.total_entries
        } else {
            eocd.total_entries as u64
        },
    })
}

/// The Zip64 EOCD record, at the recorded offset or just before the locator.
fn read_zip64_record_pos(source: &impl Source, locator: &Zip64Locator, locator_pos: u64) -> Result<u64> {
    let signature = ZIP64_END_OF_CENTRAL_DIR_SIG.to_le_bytes();
    let has_signature = |pos: u64| {
        source
            .read_range(pos, 4)
            .map(|bytes| bytes == signature)
            .unwrap_or(false)
    };
    if let Ok(recorded) = source.global_offset(locator.cd64_disk, locator.cd64_offset) {
        if has_signature(recorded) {
            return Ok(recorded);
        }
    }
    match locator_pos.checked_sub(Zip64EndOfCentralDirectory::SIZE as u64) {
        Some(adjacent) if has_signature(adjacent) => {
            warn!(adjacent, "Zip64 end record found by position, not by locator");
            Ok(adjacent)
        }
        _ => Err(OxiZipError::Zip64LocatorNotFound),
    }
}

/// Reconcile the recorded directory offset with the one implied by its size.
fn locate_central_directory(source: &impl Source, directory: &Directory) -> Result<(u64, i64)> {
    let signature = CENTRAL_DIR_HEADER_SIG.to_le_bytes();
    let has_signature = |pos: u64| {
        source
            .read_range(pos, 4)
            .map(|bytes| bytes == signature)
            .unwrap_or(false)
    };
    let computed = directory.cd_end.checked_sub(directory.cd_size);
    let expected = source
        .global_offset(directory.cd_disk, directory.cd_offset)
        .ok()
        .filter(|&pos| pos <= directory.cd_end);

    if directory.total_entries == 0 && directory.cd_size == 0 {
        return Ok((directory.cd_end, 0));
    }
    if let Some(expected) = expected {
        if has_signature(expected) {
            return Ok((expected, 0));
        }
    }
    if let Some(computed) = computed {
        if has_signature(computed) {
            let recorded = expected.unwrap_or(directory.cd_offset);
            let drift = computed as i64 - recorded as i64;
            warn!(
                recorded,
                actual = computed,
                drift,
                "central directory moved; correcting offsets for prepended data"
            );
            return Ok((computed, drift));
        }
    }
    Err(OxiZipError::CentralDirectoryNotFound {
        offset: expected.unwrap_or(directory.cd_offset),
    })
}

/// Parse `count` headers, then any further ones the counts missed.
fn parse_central_directory(
    raw: &[u8],
    count: u64,
    cd_start: u64,
) -> Result<Vec<CentralDirectoryHeader>> {
    let mut headers = Vec::with_capacity(count.min(1 << 16) as usize);
    let mut pos = 0usize;
    for index in 0..count {
        if raw.len() - pos < 4 || raw[pos..pos + 4] != CENTRAL_DIR_HEADER_SIG.to_le_bytes() {
            return Err(OxiZipError::corrupted(
                cd_start + pos as u64,
                format!("central directory header {} of {} has no signature", index + 1, count),
            ));
        }
        let (header, consumed) = CentralDirectoryHeader::parse(&raw[pos..])?;
        headers.push(header);
        pos += consumed;
    }
    while raw.len() - pos >= CentralDirectoryHeader::FIXED_SIZE
        && raw[pos..pos + 4] == CENTRAL_DIR_HEADER_SIG.to_le_bytes()
    {
        let Ok((header, consumed)) = CentralDirectoryHeader::parse(&raw[pos..]) else {
            break;
        };
        warn!(name = %String::from_utf8_lossy(&header.name), "entry beyond the recorded count");
        headers.push(header);
        pos += consumed;
    }
    Ok(headers)
}

/// Turn a central directory header into a finished [`Entry`].
fn build_entry(
    header: CentralDirectoryHeader,
    filename_charset: Charset,
    comment_charset: Charset,
) -> Result<Entry> {
    let utf8 = header.flags & Entry::FLAG_UTF8 != 0;
    let mut name = decode_field(&header.name, utf8, filename_charset);
    let mut comment = decode_field(&header.comment, utf8, comment_charset);

    let mask = Zip64Fields {
        uncompressed_size: header.uncompressed_size == ZIP64_MARKER_32,
        compressed_size: header.compressed_size == ZIP64_MARKER_32,
        offset: header.local_header_offset == ZIP64_MARKER_32,
        disk: header.disk_start == ZIP64_MARKER_16,
    };
    let mut size = header.uncompressed_size as u64;
    let mut compressed_size = header.compressed_size as u64;
    let mut offset = header.local_header_offset as u64;
    let mut disk = header.disk_start as u32;
    let mut zip64 = Zip64Fields::default();
    let mut encryption = None;
    let mut times = (None, None, None);
    let mut have_ntfs = false;

    let method = CompressionMethod::from_u16(header.method);
    for field in ExtraField::parse_all(&header.extra, mask)? {
        match field {
            ExtraField::Zip64(extra) => {
                zip64 = extra.fields();
                size = extra.uncompressed_size.unwrap_or(size);
                compressed_size = extra.compressed_size.unwrap_or(compressed_size);
                offset = extra.offset.unwrap_or(offset);
                disk = extra.disk.unwrap_or(disk);
            }
            ExtraField::Aes(aes) if method == CompressionMethod::Aes => {
                encryption = Some(EncryptionInfo::Aes {
                    strength: aes.strength,
                    vendor_version: aes.vendor_version,
                    actual_method: aes.actual_method,
                });
            }
            ExtraField::Ntfs(ntfs) => {
                times = (Some(ntfs.modified), Some(ntfs.accessed), Some(ntfs.created));
                have_ntfs = true;
            }
            ExtraField::ExtendedTimestamp(ts) if !have_ntfs => {
                times = (ts.modified, ts.accessed, ts.created);
            }
            ExtraField::UnicodePath { crc32, name: unicode } => {
                if let Some(valid) = validated_unicode(crc32, &unicode, &header.name) {
                    name = valid.to_owned();
                }
            }
            ExtraField::UnicodeComment {
                crc32,
                comment: unicode,
            } => {
                if let Some(valid) = validated_unicode(crc32, &unicode, &header.comment) {
                    comment = valid.to_owned();
                }
            }
            _ => {}
        }
    }

    if header.flags & Entry::FLAG_ENCRYPTED != 0 && encryption.is_none() {
        if method == CompressionMethod::Aes {
            return Err(OxiZipError::unsupported_encryption(format!(
                "{}: AES method without AE-x extra field",
                name
            )));
        }
        encryption = Some(EncryptionInfo::ZipCrypto);
    }
    if method == CompressionMethod::Aes && encryption.is_none() {
        return Err(OxiZipError::unsupported_encryption(format!(
            "{}: AES method without AE-x extra field",
            name
        )));
    }

    let directory = name.ends_with('/') || header.external_attributes & 0x10 != 0;
    Entry::builder(name)
        .raw_name(header.name)
        .comment(comment, header.comment)
        .sizes(size, compressed_size)
        .crc32(header.crc32)
        .modified(DosDateTime::from_raw(header.time, header.date))
        .times(times.0, times.1, times.2)
        .location(disk, offset)
        .method(method)
        .encryption(encryption)
        .directory(directory)
        .zip64(zip64)
        .flags(header.flags)
        .versions(header.version_made_by, header.version_needed)
        .attributes(header.internal_attributes, header.external_attributes)
        .extra(header.extra)
        .build()
}
