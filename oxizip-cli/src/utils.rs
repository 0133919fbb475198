//! Utility functions for the CLI.

use dialoguer::Password;
use glob::Pattern;
use indicatif::{ProgressBar, ProgressStyle};
use oxizip_archive::io::{FileSource, MultiVolumeSource, Source};
use oxizip_archive::zip::{ReaderOptions, ZipReader};
use oxizip_core::entry::Entry;
use oxizip_core::error::OxiZipError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Boxed error returned by every command.
pub type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// How many times a rejected password is asked for again.
const PASSWORD_ATTEMPTS: usize = 3;

/// Create a progress bar with standard styling.
pub fn create_progress_bar(len: u64, enable: bool) -> ProgressBar {
    if !enable {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len);
    if let Ok(style) =
        ProgressStyle::default_bar().template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("█▓▒░ "));
    }
    pb
}

/// Check if a name matches the filter patterns.
/// - If include patterns are specified, the name must match at least one
/// - If exclude patterns are specified, the name must not match any
pub fn matches_filters(name: &str, include: &[String], exclude: &[String]) -> bool {
    let matches = |pattern: &String| Pattern::new(pattern).is_ok_and(|p| p.matches(name));
    if exclude.iter().any(matches) {
        return false;
    }
    include.is_empty() || include.iter().any(matches)
}

/// Filter entries based on include/exclude patterns.
pub fn filter_entries(entries: &[Entry], include: &[String], exclude: &[String]) -> Vec<Entry> {
    entries
        .iter()
        .filter(|e| matches_filters(&e.name, include, exclude))
        .cloned()
        .collect()
}

/// Print entries, one name per line or as a table.
pub fn print_entries(entries: &[Entry], long: bool) {
    if !long {
        for entry in entries {
            println!("{}", entry.name);
        }
        return;
    }

    println!(
        "{:>12} {:>12} {:>6} {:>8}  {:<19}  Name",
        "Size", "Compressed", "Ratio", "Method", "Modified",
    );
    println!("{}", "-".repeat(80));

    let mut total_size = 0u64;
    let mut total_compressed = 0u64;
    for entry in entries {
        let ratio = if entry.size > 0 {
            format!("{:.1}%", entry.space_savings())
        } else {
            "-".to_string()
        };
        let marker = match (entry.is_dir(), entry.is_encrypted()) {
            (true, _) => "d ",
            (false, true) => "* ",
            _ => "  ",
        };
        println!(
            "{:>12} {:>12} {:>6} {:>8}  {:<19}  {}{}",
            entry.size,
            entry.compressed_size,
            ratio,
            entry.actual_method().name(),
            entry.modified.to_string(),
            marker,
            entry.name
        );
        total_size += entry.size;
        total_compressed += entry.compressed_size;
    }

    println!("{}", "-".repeat(80));
    let total_ratio = if total_size > 0 {
        (1.0 - total_compressed as f64 / total_size as f64) * 100.0
    } else {
        0.0
    };
    println!(
        "{:>12} {:>12} {:>5.1}%  {} entries",
        total_size,
        total_compressed,
        total_ratio,
        entries.len()
    );
}

/// Parse `123`, `64k`, `100m` or `2g` into bytes.
pub fn parse_size(text: &str) -> Result<u64, String> {
    let text = text.trim();
    let split = text.find(|c: char| !c.is_ascii_digit()).unwrap_or(text.len());
    let (digits, suffix) = text.split_at(split);
    let value: u64 = digits.parse().map_err(|_| format!("invalid size: {text:?}"))?;
    let multiplier: u64 = match suffix.to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" | "kib" => 1 << 10,
        "m" | "mb" | "mib" => 1 << 20,
        "g" | "gb" | "gib" => 1 << 30,
        other => return Err(format!("unknown size suffix {other:?}")),
    };
    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("size out of range: {text:?}"))
}

/// Reader options from the common `--encoding` and `--password` flags.
pub fn reader_options(encoding: Option<&str>, password: Option<&str>) -> ReaderOptions {
    let mut options = ReaderOptions::default();
    if let Some(label) = encoding {
        options = options.with_filename_encoding(label).with_comment_encoding(label);
    }
    if let Some(password) = password {
        options = options.with_password(password);
    }
    options
}

/// Open `path`, joining `stem.z01`, `stem.z02`, ... when they exist.
pub fn open_archive(path: &Path, options: ReaderOptions) -> CliResult<ZipReader<Box<dyn Source>>> {
    let source: Box<dyn Source> = if path.with_extension("z01").exists() {
        let volumes = MultiVolumeSource::open_split(path)?;
        debug!(volumes = volumes.volumes().len(), "opened split archive");
        Box::new(volumes)
    } else {
        Box::new(FileSource::open(path)?)
    };
    Ok(ZipReader::open(source, options, None)?)
}

/// Ask for a password on the terminal.
pub fn prompt_password(confirm: bool) -> CliResult<String> {
    let mut prompt = Password::new().with_prompt("Password");
    if confirm {
        prompt = prompt.with_confirmation("Repeat password", "Passwords do not match");
    }
    Ok(prompt.interact()?)
}

/// Make sure the reader holds a password that opens `entry`, prompting
/// until one is accepted.
pub fn unlock<S: Source>(reader: &mut ZipReader<S>, entry: &Entry) -> CliResult<()> {
    for attempt in 0..=PASSWORD_ATTEMPTS {
        match reader.check_password(entry) {
            Ok(()) => return Ok(()),
            Err(e) if e.is_password_error() && attempt < PASSWORD_ATTEMPTS => {
                if matches!(e, OxiZipError::WrongPassword) {
                    eprintln!("Wrong password for {}", entry.name);
                }
                let password = prompt_password(false)?;
                reader.set_password(password);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(OxiZipError::WrongPassword.into())
}

/// Where `entry` lands under `output`; refuses names that escape it.
pub fn output_path(output: &Path, entry: &Entry) -> CliResult<PathBuf> {
    entry.validate_path()?;
    let relative = entry.name.trim_end_matches('/');
    if relative.contains('\\') || relative.contains(':') {
        return Err(OxiZipError::path_traversal(&entry.name).into());
    }
    Ok(output.join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> Entry {
        Entry::builder(name).build().unwrap()
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("65536").unwrap(), 65536);
        assert_eq!(parse_size("64k").unwrap(), 64 * 1024);
        assert_eq!(parse_size("100M").unwrap(), 100 << 20);
        assert_eq!(parse_size("2GiB").unwrap(), 2 << 30);
        assert!(parse_size("12q").is_err());
        assert!(parse_size("k").is_err());
    }

    #[test]
    fn test_filters() {
        let include = vec!["*.txt".to_string()];
        let exclude = vec!["secret*".to_string()];
        assert!(matches_filters("notes.txt", &include, &exclude));
        assert!(!matches_filters("secret.txt", &include, &exclude));
        assert!(!matches_filters("image.png", &include, &exclude));
        assert!(matches_filters("image.png", &[], &[]));
    }

    #[test]
    fn test_output_path_rejects_traversal() {
        let out = Path::new("/tmp/out");
        assert_eq!(output_path(out, &entry("a/b.txt")).unwrap(), out.join("a/b.txt"));
        assert_eq!(output_path(out, &entry("dir/")).unwrap(), out.join("dir"));
        assert!(output_path(out, &entry("../evil")).is_err());
        assert!(output_path(out, &entry("a/../../evil")).is_err());
        assert!(output_path(out, &entry("/etc/passwd")).is_err());
        assert!(output_path(out, &entry("..\\evil")).is_err());
        assert!(output_path(out, &entry("C:/evil")).is_err());
    }
}
