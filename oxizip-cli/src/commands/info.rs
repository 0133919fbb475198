//! Info command implementation.

use crate::utils::{CliResult, open_archive, reader_options};
use oxizip_archive::io::Source;
use std::path::Path;

pub fn cmd_info(archive: &Path) -> CliResult<()> {
    let reader = open_archive(archive, reader_options(None, None))?;
    let entries = reader.entries();

    let files = entries.iter().filter(|e| e.is_file()).count();
    let total_size: u64 = entries.iter().map(|e| e.size).sum();
    let total_compressed: u64 = entries.iter().map(|e| e.compressed_size).sum();
    let encrypted = entries.iter().filter(|e| e.is_encrypted()).count();
    let zip64 = entries.iter().filter(|e| e.zip64.any()).count();

    println!("Archive:      {}", archive.display());
    println!("Volumes:      {}", reader.source().volume_count());
    println!("Entries:      {} ({} files, {} directories)", entries.len(), files, entries.len() - files);
    println!("Total size:   {} bytes", total_size);
    println!("Compressed:   {} bytes", total_compressed);
    if total_size > 0 {
        println!(
            "Ratio:        {:.1}%",
            (1.0 - total_compressed as f64 / total_size as f64) * 100.0
        );
    }
    println!("Encrypted:    {}", encrypted);
    println!("Zip64:        {}", zip64);
    if reader.prepended_data_len() > 0 {
        println!("Prepended:    {} bytes", reader.prepended_data_len());
    }
    if reader.appended_data_len() > 0 {
        println!("Appended:     {} bytes", reader.appended_data_len());
    }
    if !reader.comment().is_empty() {
        println!("Comment:      {}", reader.comment());
    }
    Ok(())
}
