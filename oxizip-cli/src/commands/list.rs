//! List command implementation.

use crate::utils::{CliResult, filter_entries, open_archive, print_entries, reader_options};
use oxizip_core::entry::{EncryptionInfo, Entry};
use serde::Serialize;
use std::path::Path;

/// JSON serializable entry data for archive listings.
#[derive(Debug, Serialize)]
struct EntryJson {
    name: String,
    size: u64,
    compressed_size: u64,
    ratio: f64,
    method: String,
    crc: String,
    mtime: Option<u64>,
    is_dir: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    encryption: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    comment: String,
    zip64: bool,
    disk: u32,
    offset: u64,
}

impl EntryJson {
    fn from_entry(entry: &Entry) -> Self {
        let mtime = entry
            .modified_time()
            .duration_since(std::time::UNIX_EPOCH)
            .ok()
            .map(|d| d.as_secs());
        let encryption = entry.encryption.map(|info| match info {
            EncryptionInfo::ZipCrypto => "zipcrypto".to_string(),
            EncryptionInfo::Aes {
                strength,
                vendor_version,
                ..
            } => format!("aes-{} ({:?})", strength.bits(), vendor_version),
        });

        Self {
            name: entry.name.clone(),
            size: entry.size,
            compressed_size: entry.compressed_size,
            ratio: entry.compression_ratio(),
            method: entry.actual_method().name().to_string(),
            crc: format!("{:08x}", entry.crc32),
            mtime,
            is_dir: entry.is_dir(),
            encryption,
            comment: entry.comment.clone(),
            zip64: entry.zip64.any(),
            disk: entry.disk,
            offset: entry.offset,
        }
    }
}

/// JSON output for archive listing.
#[derive(Debug, Serialize)]
struct ArchiveListJson {
    archive: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    comment: String,
    entries: Vec<EntryJson>,
}

/// Options for listing archive contents.
pub struct ListOptions<'a> {
    pub long: bool,
    pub json: bool,
    pub encoding: Option<String>,
    pub include: &'a [String],
    pub exclude: &'a [String],
}

pub fn cmd_list(archive: &Path, options: &ListOptions) -> CliResult<()> {
    let reader = open_archive(archive, reader_options(options.encoding.as_deref(), None))?;
    let entries = filter_entries(reader.entries(), options.include, options.exclude);

    if options.json {
        let output = ArchiveListJson {
            archive: archive.display().to_string(),
            comment: reader.comment().to_string(),
            entries: entries.iter().map(EntryJson::from_entry).collect(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Archive: {}", archive.display());
    if !reader.comment().is_empty() {
        println!("Comment: {}", reader.comment());
    }
    println!();
    print_entries(&entries, options.long);
    Ok(())
}
