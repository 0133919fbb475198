//! Extra-field sub-records.
//!
//! Each record is `id: u16 | len: u16 | payload`. Known ids are decoded into
//! [`ExtraField`] variants; everything else is kept verbatim so it can be
//! copied through untouched.

use super::encryption::{AES_EXTRA_ID, AesExtraField};
use super::header::LeReader;
use oxizip_core::crc::Crc32;
use oxizip_core::entry::Zip64Fields;
use oxizip_core::error::{OxiZipError, Result};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Zip64 extended information.
pub const ZIP64_ID: u16 = 0x0001;
/// NTFS timestamps.
pub const NTFS_ID: u16 = 0x000A;
/// Extended (Unix) timestamp.
pub const EXTENDED_TIMESTAMP_ID: u16 = 0x5455;
/// Info-ZIP Unicode path.
pub const UNICODE_PATH_ID: u16 = 0x7075;
/// Info-ZIP Unicode comment.
pub const UNICODE_COMMENT_ID: u16 = 0x6375;

/// Seconds between 1601-01-01 and 1970-01-01.
const NTFS_EPOCH_OFFSET: u64 = 11_644_473_600;

/// Zip64 values; only fields whose header slot held the sentinel are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Zip64Extra {
    /// Uncompressed size.
    pub uncompressed_size: Option<u64>,
    /// Compressed size.
    pub compressed_size: Option<u64>,
    /// Local header offset.
    pub offset: Option<u64>,
    /// Disk start number.
    pub disk: Option<u32>,
}

impl Zip64Extra {
    /// Which fields are present.
    pub fn fields(&self) -> Zip64Fields {
        Zip64Fields {
            uncompressed_size: self.uncompressed_size.is_some(),
            compressed_size: self.compressed_size.is_some(),
            offset: self.offset.is_some(),
            disk: self.disk.is_some(),
        }
    }

    fn parse(data: &[u8], mask: Zip64Fields) -> Result<Self> {
        let mut r = LeReader::new(data);
        let mut read = |present: bool| -> Result<Option<u64>> {
            if present { r.u64().map(Some) } else { Ok(None) }
        };
        let uncompressed_size = read(mask.uncompressed_size)?;
        let compressed_size = read(mask.compressed_size)?;
        let offset = read(mask.offset)?;
        let disk = if mask.disk { Some(r.u32()?) } else { None };
        Ok(Self {
            uncompressed_size,
            compressed_size,
            offset,
            disk,
        })
    }

    fn payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(28);
        for value in [self.uncompressed_size, self.compressed_size, self.offset]
            .into_iter()
            .flatten()
        {
            out.extend_from_slice(&value.to_le_bytes());
        }
        if let Some(disk) = self.disk {
            out.extend_from_slice(&disk.to_le_bytes());
        }
        out
    }
}

/// NTFS modification, access and creation times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NtfsTimes {
    /// Last modification.
    pub modified: SystemTime,
    /// Last access.
    pub accessed: SystemTime,
    /// Creation.
    pub created: SystemTime,
}

/// Extended timestamp (Unix seconds); any subset may be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtendedTimestamp {
    /// Last modification.
    pub modified: Option<SystemTime>,
    /// Last access.
    pub accessed: Option<SystemTime>,
    /// Creation.
    pub created: Option<SystemTime>,
}

/// One decoded extra-field record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtraField {
    /// Zip64 extended information (0x0001).
    Zip64(Zip64Extra),
    /// AE-x parameters (0x9901).
    Aes(AesExtraField),
    /// NTFS timestamps (0x000A).
    Ntfs(NtfsTimes),
    /// Extended timestamp (0x5455).
    ExtendedTimestamp(ExtendedTimestamp),
    /// Info-ZIP Unicode path (0x7075).
    UnicodePath {
        /// CRC-32 of the raw header name.
        crc32: u32,
        /// UTF-8 name.
        name: String,
    },
    /// Info-ZIP Unicode comment (0x6375).
    UnicodeComment {
        /// CRC-32 of the raw header comment.
        crc32: u32,
        /// UTF-8 comment.
        comment: String,
    },
    /// Anything else.
    Unknown {
        /// Record id.
        id: u16,
        /// Payload.
        data: Vec<u8>,
    },
}

impl ExtraField {
    /// Record id.
    pub fn id(&self) -> u16 {
        match self {
            Self::Zip64(_) => ZIP64_ID,
            Self::Aes(_) => AES_EXTRA_ID,
            Self::Ntfs(_) => NTFS_ID,
            Self::ExtendedTimestamp(_) => EXTENDED_TIMESTAMP_ID,
            Self::UnicodePath { .. } => UNICODE_PATH_ID,
            Self::UnicodeComment { .. } => UNICODE_COMMENT_ID,
            Self::Unknown { id, .. } => *id,
        }
    }

    /// Decode every record in `data`.
    ///
    /// `zip64` says which header fields held the sentinel and therefore
    /// appear in the Zip64 record. A truncated trailing record is dropped
    /// with a warning; malformed known records are kept as `Unknown`, except
    /// Zip64 and AE-x whose values cannot be done without.
    pub fn parse_all(data: &[u8], zip64: Zip64Fields) -> Result<Vec<Self>> {
        let mut fields = Vec::new();
        let mut r = LeReader::new(data);
        while r.remaining() >= 4 {
            let id = r.u16()?;
            let len = r.u16()? as usize;
            let Ok(payload) = r.bytes(len) else {
                warn!(id, len, "truncated extra field ignored");
                break;
            };
            fields.push(Self::parse_one(id, payload, zip64)?);
        }
        Ok(fields)
    }

    fn parse_one(id: u16, payload: &[u8], zip64: Zip64Fields) -> Result<Self> {
        let unknown = || Self::Unknown {
            id,
            data: payload.to_vec(),
        };
        Ok(match id {
            ZIP64_ID => Self::Zip64(Zip64Extra::parse(payload, zip64).map_err(|_| {
                OxiZipError::corrupted(0, format!("Zip64 extra field too short ({} bytes)", payload.len()))
            })?),
            AES_EXTRA_ID => Self::Aes(AesExtraField::parse(payload)?),
            NTFS_ID => parse_ntfs(payload).map(Self::Ntfs).unwrap_or_else(unknown),
            EXTENDED_TIMESTAMP_ID => parse_extended_timestamp(payload)
                .map(Self::ExtendedTimestamp)
                .unwrap_or_else(unknown),
            UNICODE_PATH_ID => match parse_unicode(payload) {
                Some((crc32, name)) => Self::UnicodePath { crc32, name },
                None => unknown(),
            },
            UNICODE_COMMENT_ID => match parse_unicode(payload) {
                Some((crc32, comment)) => Self::UnicodeComment { crc32, comment },
                None => unknown(),
            },
            _ => unknown(),
        })
    }

    /// Payload bytes.
    pub fn payload(&self) -> Vec<u8> {
        match self {
            Self::Zip64(z) => z.payload(),
            Self::Aes(a) => a.to_payload().to_vec(),
            Self::Ntfs(t) => {
                let mut out = Vec::with_capacity(32);
                out.extend_from_slice(&0u32.to_le_bytes());
                out.extend_from_slice(&1u16.to_le_bytes());
                out.extend_from_slice(&24u16.to_le_bytes());
                for time in [t.modified, t.accessed, t.created] {
                    out.extend_from_slice(&system_to_ntfs(time).to_le_bytes());
                }
                out
            }
            Self::ExtendedTimestamp(t) => {
                let times = [t.modified, t.accessed, t.created];
                let mut flags = 0u8;
                let mut out = vec![0u8];
                for (bit, time) in times.iter().enumerate() {
                    if let Some(time) = time {
                        flags |= 1 << bit;
                        out.extend_from_slice(&system_to_unix(*time).to_le_bytes());
                    }
                }
                out[0] = flags;
                out
            }
            Self::UnicodePath { crc32, name: text } | Self::UnicodeComment { crc32, comment: text } => {
                let mut out = Vec::with_capacity(5 + text.len());
                out.push(1);
                out.extend_from_slice(&crc32.to_le_bytes());
                out.extend_from_slice(text.as_bytes());
                out
            }
            Self::Unknown { data, .. } => data.clone(),
        }
    }

    /// Serialize a list of records.
    pub fn serialize(fields: &[Self]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for field in fields {
            let payload = field.payload();
            let len = u16::try_from(payload.len()).map_err(|_| {
                OxiZipError::invalid_header(format!("extra field {:#06x} too long", field.id()))
            })?;
            out.extend_from_slice(&field.id().to_le_bytes());
            out.extend_from_slice(&len.to_le_bytes());
            out.extend_from_slice(&payload);
        }
        if out.len() > u16::MAX as usize {
            return Err(OxiZipError::invalid_header("extra fields exceed 65535 bytes"));
        }
        Ok(out)
    }
}

/// Unicode name or comment if its CRC matches the raw header bytes.
pub fn validated_unicode<'a>(crc32: u32, text: &'a str, raw: &[u8]) -> Option<&'a str> {
    (Crc32::compute(raw) == crc32).then_some(text)
}

fn parse_ntfs(payload: &[u8]) -> Option<NtfsTimes> {
    let mut r = LeReader::new(payload);
    r.u32().ok()?;
    while r.remaining() >= 4 {
        let tag = r.u16().ok()?;
        let size = r.u16().ok()? as usize;
        let body = r.bytes(size).ok()?;
        if tag == 1 && size >= 24 {
            let mut t = LeReader::new(body);
            return Some(NtfsTimes {
                modified: ntfs_to_system(t.u64().ok()?),
                accessed: ntfs_to_system(t.u64().ok()?),
                created: ntfs_to_system(t.u64().ok()?),
            });
        }
    }
    None
}

fn parse_extended_timestamp(payload: &[u8]) -> Option<ExtendedTimestamp> {
    let mut r = LeReader::new(payload);
    let flags = r.u8().ok()?;
    let mut times = [None; 3];
    for (bit, slot) in times.iter_mut().enumerate() {
        // Central copies carry the flags but only the modification time
        if flags & (1 << bit) != 0 && r.remaining() >= 4 {
            *slot = Some(unix_to_system(r.u32().ok()? as i32));
        }
    }
    Some(ExtendedTimestamp {
        modified: times[0],
        accessed: times[1],
        created: times[2],
    })
}

fn parse_unicode(payload: &[u8]) -> Option<(u32, String)> {
    let mut r = LeReader::new(payload);
    if r.u8().ok()? != 1 {
        return None;
    }
    let crc32 = r.u32().ok()?;
    let text = std::str::from_utf8(r.bytes(r.remaining()).ok()?).ok()?;
    Some((crc32, text.to_owned()))
}

/// 100 ns ticks since 1601 to `SystemTime`.
pub fn ntfs_to_system(ticks: u64) -> SystemTime {
    let secs = ticks / 10_000_000;
    let nanos = (ticks % 10_000_000) as u32 * 100;
    if secs >= NTFS_EPOCH_OFFSET {
        UNIX_EPOCH + Duration::new(secs - NTFS_EPOCH_OFFSET, nanos)
    } else {
        UNIX_EPOCH - Duration::from_secs(NTFS_EPOCH_OFFSET - secs) + Duration::from_nanos(nanos as u64)
    }
}

/// `SystemTime` to 100 ns ticks since 1601.
pub fn system_to_ntfs(time: SystemTime) -> u64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => (d.as_secs() + NTFS_EPOCH_OFFSET) * 10_000_000 + (d.subsec_nanos() / 100) as u64,
        Err(e) => {
            let before = e.duration();
            (NTFS_EPOCH_OFFSET * 10_000_000).saturating_sub(before.as_nanos() as u64 / 100)
        }
    }
}

fn unix_to_system(secs: i32) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs() as u64)
    }
}

fn system_to_unix(time: SystemTime) -> i32 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs().min(i32::MAX as u64) as i32,
        Err(e) => -(e.duration().as_secs().min(i32::MAX as u64) as i32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxizip_core::entry::{AesStrength, AesVendorVersion, CompressionMethod};

    #[test]
    fn test_zip64_mask_selects_fields() {
        let extra = Zip64Extra {
            uncompressed_size: Some(1 << 32),
            compressed_size: None,
            offset: Some(7 << 32),
            disk: None,
        };
        let bytes = ExtraField::serialize(&[ExtraField::Zip64(extra)]).unwrap();
        assert_eq!(bytes.len(), 4 + 16);

        let parsed = ExtraField::parse_all(&bytes, extra.fields()).unwrap();
        assert_eq!(parsed, vec![ExtraField::Zip64(extra)]);

        // Asking for more than is present is corruption
        let all = Zip64Fields {
            uncompressed_size: true,
            compressed_size: true,
            offset: true,
            disk: false,
        };
        assert!(ExtraField::parse_all(&bytes, all).is_err());
    }

    #[test]
    fn test_mixed_records_round_trip() {
        let t = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let fields = vec![
            ExtraField::ExtendedTimestamp(ExtendedTimestamp {
                modified: Some(t),
                accessed: None,
                created: Some(t),
            }),
            ExtraField::Ntfs(NtfsTimes {
                modified: t + Duration::from_nanos(1200),
                accessed: t,
                created: t,
            }),
            ExtraField::Aes(AesExtraField {
                vendor_version: AesVendorVersion::Ae1,
                strength: AesStrength::Aes128,
                actual_method: CompressionMethod::Stored,
            }),
            ExtraField::UnicodePath {
                crc32: 0x1234,
                name: "日本.txt".into(),
            },
            ExtraField::Unknown {
                id: 0xCAFE,
                data: vec![1, 2, 3],
            },
        ];
        let bytes = ExtraField::serialize(&fields).unwrap();
        let parsed = ExtraField::parse_all(&bytes, Zip64Fields::default()).unwrap();
        assert_eq!(parsed, fields);
    }

    #[test]
    fn test_truncated_record_is_dropped() {
        let mut bytes = ExtraField::serialize(&[ExtraField::Unknown {
            id: 0x0101,
            data: vec![9; 4],
        }])
        .unwrap();
        bytes.extend_from_slice(&[0x55, 0x54, 0x20, 0x00, 1]);
        let parsed = ExtraField::parse_all(&bytes, Zip64Fields::default()).unwrap();
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn test_unicode_crc_validation() {
        let raw = b"caf\x82.txt";
        let crc = Crc32::compute(raw);
        assert_eq!(validated_unicode(crc, "café.txt", raw), Some("café.txt"));
        assert_eq!(validated_unicode(crc ^ 1, "café.txt", raw), None);
    }

    #[test]
    fn test_ntfs_epoch() {
        assert_eq!(ntfs_to_system(NTFS_EPOCH_OFFSET * 10_000_000), UNIX_EPOCH);
        let t = UNIX_EPOCH + Duration::new(86_400, 500);
        assert_eq!(ntfs_to_system(system_to_ntfs(t)), t);
    }
}
