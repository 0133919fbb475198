//! Extract command implementation.

use crate::utils::{
    CliResult, create_progress_bar, matches_filters, open_archive, output_path, reader_options, unlock,
};
use dialoguer::Confirm;
use filetime::FileTime;
use oxizip_core::entry::Entry;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Options for extracting archive contents.
pub struct ExtractOptions<'a> {
    pub output: PathBuf,
    pub files: &'a [String],
    pub password: Option<String>,
    pub encoding: Option<String>,
    pub include: &'a [String],
    pub exclude: &'a [String],
    pub overwrite: bool,
    pub progress: bool,
}

impl ExtractOptions<'_> {
    fn selects(&self, name: &str) -> bool {
        let requested = self.files.is_empty()
            || self
                .files
                .iter()
                .any(|f| name == f || name.starts_with(&format!("{}/", f.trim_end_matches('/'))));
        requested && matches_filters(name, self.include, self.exclude)
    }
}

pub fn cmd_extract(archive: &Path, options: &ExtractOptions) -> CliResult<()> {
    let mut reader = open_archive(
        archive,
        reader_options(options.encoding.as_deref(), options.password.as_deref()),
    )?;
    let entries: Vec<Entry> = reader
        .entries()
        .iter()
        .filter(|e| options.selects(&e.name))
        .cloned()
        .collect();

    // Check every path before writing anything
    let targets = entries
        .iter()
        .map(|entry| output_path(&options.output, entry))
        .collect::<CliResult<Vec<_>>>()?;

    if let Some(encrypted) = entries.iter().find(|e| e.is_encrypted()) {
        unlock(&mut reader, encrypted)?;
    }

    println!("Extracting {} to {}", archive.display(), options.output.display());
    let pb = create_progress_bar(entries.len() as u64, options.progress);
    pb.set_message("entries");

    let mut written = 0u64;
    for (entry, target) in entries.iter().zip(&targets) {
        if entry.is_dir() {
            fs::create_dir_all(target)?;
        } else {
            if target.exists() && !options.overwrite {
                let replace = pb.suspend(|| {
                    Confirm::new()
                        .with_prompt(format!("Overwrite {}?", target.display()))
                        .default(false)
                        .interact()
                })?;
                if !replace {
                    debug!(name = %entry.name, "skipped existing file");
                    pb.inc(1);
                    continue;
                }
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = BufWriter::new(File::create(target)?);
            written += reader.extract(entry, &mut out)?;
            out.flush()?;
            drop(out);
            restore_metadata(target, entry);
        }
        pb.inc(1);
    }

    // Directory mtimes change as their children are written
    for (entry, target) in entries.iter().zip(&targets) {
        if entry.is_dir() {
            restore_metadata(target, entry);
        }
    }

    pb.finish_with_message("done");
    println!("Extracted {} entries ({} bytes)", entries.len(), written);
    Ok(())
}

fn restore_metadata(path: &Path, entry: &Entry) {
    let mtime = FileTime::from_system_time(entry.modified_time());
    if let Err(e) = filetime::set_file_mtime(path, mtime) {
        warn!(path = %path.display(), error = %e, "could not restore modification time");
    }
    restore_permissions(path, entry);
}

#[cfg(unix)]
fn restore_permissions(path: &Path, entry: &Entry) {
    use std::os::unix::fs::PermissionsExt;
    if let Some(mode) = entry.unix_mode() {
        let permissions = fs::Permissions::from_mode(mode & 0o7777);
        if let Err(e) = fs::set_permissions(path, permissions) {
            warn!(path = %path.display(), error = %e, "could not restore permissions");
        }
    }
}

#[cfg(not(unix))]
fn restore_permissions(_path: &Path, _entry: &Entry) {}

#[cfg(test)]
mod tests {
    use super::*;
    use oxizip_archive::zip::{EntryOptions, WriterOptions, ZipWriter};
    use std::time::{Duration, UNIX_EPOCH};

    fn options(output: PathBuf) -> ExtractOptions<'static> {
        ExtractOptions {
            output,
            files: &[],
            password: Some("pw".to_string()),
            encoding: None,
            include: &[],
            exclude: &[],
            overwrite: true,
            progress: false,
        }
    }

    #[test]
    fn test_extract_restores_tree() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("in.zip");
        let stamp = UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        let writer = ZipWriter::create(&archive, WriterOptions::default(), None).unwrap();
        writer.add_directory("docs/", EntryOptions::default()).unwrap();
        writer
            .add_bytes(
                "docs/a.txt",
                b"alpha",
                EntryOptions::default().with_last_modified(stamp),
            )
            .unwrap();
        writer
            .add_bytes("docs/b.txt", b"bravo", EntryOptions::default().with_password("pw"))
            .unwrap();
        writer.close().unwrap();

        let out = dir.path().join("out");
        cmd_extract(&archive, &options(out.clone())).unwrap();
        assert_eq!(fs::read(out.join("docs/a.txt")).unwrap(), b"alpha");
        assert_eq!(fs::read(out.join("docs/b.txt")).unwrap(), b"bravo");
        let mtime = fs::metadata(out.join("docs/a.txt")).unwrap().modified().unwrap();
        assert_eq!(mtime, stamp);
    }

    #[test]
    fn test_extract_refuses_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("evil.zip");
        let writer = ZipWriter::create(&archive, WriterOptions::default(), None).unwrap();
        writer.add_bytes("ok.txt", b"fine", EntryOptions::default()).unwrap();
        writer.add_bytes("../escape.txt", b"bad", EntryOptions::default()).unwrap();
        writer.close().unwrap();

        let out = dir.path().join("out");
        assert!(cmd_extract(&archive, &options(out.clone())).is_err());
        assert!(!dir.path().join("escape.txt").exists());
        // Nothing is written once any path is refused
        assert!(!out.join("ok.txt").exists());
    }
}
