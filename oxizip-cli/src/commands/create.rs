//! Create command implementation.

use crate::utils::{CliResult, create_progress_bar, prompt_password};
use clap::ValueEnum;
use oxizip_archive::zip::{
    EncryptionMethod, EntryOptions, PendingEntry, PoolConfig, WorkerPool, WriterOptions, ZipWriter,
};
use oxizip_archive::io::Sink;
use oxizip_core::entry::AesStrength;
use std::fs::{self, File, Metadata};
use std::io::BufReader;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

/// AES key strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AesBits {
    /// AES-128
    #[value(name = "128")]
    Aes128,
    /// AES-192
    #[value(name = "192")]
    Aes192,
    /// AES-256
    #[value(name = "256")]
    Aes256,
}

impl From<AesBits> for AesStrength {
    fn from(bits: AesBits) -> Self {
        match bits {
            AesBits::Aes128 => AesStrength::Aes128,
            AesBits::Aes192 => AesStrength::Aes192,
            AesBits::Aes256 => AesStrength::Aes256,
        }
    }
}

/// Options for creating an archive.
pub struct CreateOptions {
    pub level: u8,
    /// `Some(None)` asks for the password on the terminal.
    pub password: Option<Option<String>>,
    pub aes: Option<AesBits>,
    pub zipcrypto: bool,
    pub split: Option<u64>,
    pub keep_order: bool,
    pub workers: Option<usize>,
    pub comment: Option<String>,
    pub progress: bool,
}

/// A file system object headed for the archive.
struct Input {
    name: String,
    path: PathBuf,
    metadata: Metadata,
}

pub fn cmd_create(archive: &Path, paths: &[PathBuf], options: &CreateOptions) -> CliResult<()> {
    let (directories, files) = collect_inputs(paths)?;
    let writer_options = writer_options(options)?;

    let pool = match options.workers {
        Some(0) => None,
        Some(n) => Some(Arc::new(WorkerPool::new(PoolConfig::default().with_max_workers(n)))),
        None => Some(Arc::new(WorkerPool::new(PoolConfig::default()))),
    };
    let threads = pool.as_ref().map_or(1, |p| p.config().max_workers.max(1));

    println!("Creating {}", archive.display());
    let writer = ZipWriter::create(archive, writer_options, pool)?;
    let pb = create_progress_bar((directories.len() + files.len()) as u64, options.progress);
    pb.set_message("entries");

    // Directories go first so that ordered file tickets never wait on them
    for dir in &directories {
        writer.add_directory(&dir.name, entry_options(&dir.metadata))?;
        pb.inc(1);
    }

    let pending = files
        .iter()
        .map(|file| writer.prepare(&file.name, entry_options(&file.metadata)))
        .collect::<Result<Vec<_>, _>>()?;

    // Round-robin keeps each thread's tickets ascending under keep-order
    let mut buckets: Vec<Vec<(PendingEntry<'_, Box<dyn Sink>>, &Path)>> =
        (0..threads).map(|_| Vec::new()).collect();
    for (i, (entry, file)) in pending.into_iter().zip(&files).enumerate() {
        buckets[i % threads].push((entry, file.path.as_path()));
    }

    let failures: Vec<String> = thread::scope(|scope| {
        let handles: Vec<_> = buckets
            .into_iter()
            .map(|bucket| {
                let pb = pb.clone();
                scope.spawn(move || {
                    let mut failures = Vec::new();
                    for (entry, path) in bucket {
                        let name = entry.name().to_string();
                        let result = File::open(path)
                            .map_err(Into::into)
                            .and_then(|file| entry.write(BufReader::new(file)));
                        match result {
                            Ok(written) => {
                                debug!(name = %written.name, size = written.size, "added");
                            }
                            Err(e) => failures.push(format!("{}: {}", name, e)),
                        }
                        pb.inc(1);
                    }
                    failures
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap_or_else(|_| vec!["worker thread panicked".to_string()]))
            .collect()
    });

    let (entries, _) = writer.close()?;
    pb.finish_with_message("done");

    let total: u64 = entries.iter().map(|e| e.size).sum();
    let stored: u64 = entries.iter().map(|e| e.compressed_size).sum();
    println!("Added {} entries ({} bytes, {} stored)", entries.len(), total, stored);
    if failures.is_empty() {
        Ok(())
    } else {
        for failure in &failures {
            warn!("{}", failure);
        }
        Err(format!("{} entries could not be added: {}", failures.len(), failures.join("; ")).into())
    }
}

fn writer_options(options: &CreateOptions) -> CliResult<WriterOptions> {
    let mut writer = WriterOptions::default()
        .with_level(options.level)
        .with_keep_order(options.keep_order);
    if let Some(size) = options.split {
        writer = writer.with_split_size(size);
    }
    if let Some(comment) = &options.comment {
        writer = writer.with_comment(comment.clone());
    }

    let password = match &options.password {
        None => None,
        Some(Some(password)) => Some(password.clone()),
        Some(None) => Some(prompt_password(true)?),
    };
    match password {
        Some(password) => {
            let encryption = if options.zipcrypto {
                EncryptionMethod::ZipCrypto
            } else {
                EncryptionMethod::Aes(options.aes.map_or(AesStrength::Aes256, Into::into))
            };
            writer = writer.with_password(password).with_encryption(encryption);
        }
        None if options.zipcrypto || options.aes.is_some() => {
            return Err("--aes and --zipcrypto need --password".into());
        }
        None => {}
    }
    Ok(writer)
}

fn entry_options(metadata: &Metadata) -> EntryOptions {
    let mut options = EntryOptions::default();
    if let Ok(modified) = metadata.modified() {
        options = options.with_last_modified(modified);
    }
    if let Ok(accessed) = metadata.accessed() {
        options = options.with_last_access(accessed);
    }
    if metadata.is_file() {
        options = options.with_uncompressed_size(metadata.len());
    }
    unix_attributes(options, metadata)
}

#[cfg(unix)]
fn unix_attributes(options: EntryOptions, metadata: &Metadata) -> EntryOptions {
    use std::os::unix::fs::PermissionsExt;
    let mut attributes = metadata.permissions().mode() << 16;
    if metadata.is_dir() {
        attributes |= 0x10;
    }
    options.with_external_attributes(attributes)
}

#[cfg(not(unix))]
fn unix_attributes(options: EntryOptions, _metadata: &Metadata) -> EntryOptions {
    options
}

/// Walk `paths`, naming each object relative to the parent of the path it
/// was found under. Children are visited in name order.
fn collect_inputs(paths: &[PathBuf]) -> CliResult<(Vec<Input>, Vec<Input>)> {
    let mut directories = Vec::new();
    let mut files = Vec::new();
    for base in paths {
        walk(base, base, &mut directories, &mut files)?;
    }
    Ok((directories, files))
}

fn walk(path: &Path, base: &Path, directories: &mut Vec<Input>, files: &mut Vec<Input>) -> CliResult<()> {
    let metadata = fs::metadata(path)?;
    let name = archive_name(path, base);
    if metadata.is_dir() {
        if !name.is_empty() {
            directories.push(Input {
                name: format!("{}/", name),
                path: path.to_path_buf(),
                metadata,
            });
        }
        let mut children = fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()?;
        children.sort();
        for child in children {
            walk(&child, base, directories, files)?;
        }
    } else if name.is_empty() {
        return Err(format!("cannot name {} inside the archive", path.display()).into());
    } else {
        files.push(Input {
            name,
            path: path.to_path_buf(),
            metadata,
        });
    }
    Ok(())
}

fn archive_name(path: &Path, base: &Path) -> String {
    let root = base.parent().unwrap_or_else(|| Path::new(""));
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
