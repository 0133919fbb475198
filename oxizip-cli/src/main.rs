//! OxiZip CLI - streaming ZIP archiver
//!
//! Lists, extracts, tests and creates ZIP archives, including Zip64,
//! split volumes, ZipCrypto and AES-encrypted entries.

mod commands;
mod utils;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use commands::{AesBits, CreateOptions, ExtractOptions, ListOptions};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "oxizip")]
#[command(author, version, about = "Pure Rust streaming ZIP archiver")]
#[command(long_about = "
OxiZip reads and writes ZIP archives: deflate, Zip64, split volumes,
data descriptors, ZipCrypto and WinZip AES.

Examples:
  oxizip list archive.zip
  oxizip list archive.zip --json
  oxizip extract archive.zip -d out --password secret
  oxizip extract legacy.zip --encoding shift_jis
  oxizip test archive.zip
  oxizip create backup.zip src docs --level 9
  oxizip create secret.zip notes.txt --password --aes 256
  oxizip create big.zip data --split 100m --workers 4
")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List contents of an archive
    #[command(alias = "l")]
    List {
        /// Archive file to list
        archive: PathBuf,

        /// Show sizes, ratio and method per entry
        #[arg(short, long)]
        long: bool,

        /// Output as JSON (machine-readable)
        #[arg(short, long)]
        json: bool,

        /// Name encoding for entries without the UTF-8 flag (default cp437)
        #[arg(short, long)]
        encoding: Option<String>,

        /// Include only entries matching pattern (glob syntax: *.txt, src/**/*)
        #[arg(short = 'I', long)]
        include: Vec<String>,

        /// Exclude entries matching pattern (glob syntax)
        #[arg(short = 'X', long)]
        exclude: Vec<String>,
    },

    /// Extract entries from an archive
    #[command(alias = "x")]
    Extract {
        /// Archive file to extract
        archive: PathBuf,

        /// Output directory
        #[arg(short = 'd', long = "dir", default_value = ".")]
        output: PathBuf,

        /// Entries to extract (all if empty)
        files: Vec<String>,

        /// Password for encrypted entries (prompted for when needed)
        #[arg(short, long)]
        password: Option<String>,

        /// Name encoding for entries without the UTF-8 flag (default cp437)
        #[arg(short, long)]
        encoding: Option<String>,

        /// Include only entries matching pattern (glob syntax)
        #[arg(short = 'I', long)]
        include: Vec<String>,

        /// Exclude entries matching pattern (glob syntax)
        #[arg(short = 'X', long)]
        exclude: Vec<String>,

        /// Overwrite existing files without asking
        #[arg(short = 'o', long)]
        overwrite: bool,

        /// Hide the progress bar
        #[arg(short, long)]
        quiet: bool,
    },

    /// Test archive integrity
    #[command(alias = "t")]
    Test {
        /// Archive file to test
        archive: PathBuf,

        /// Password for encrypted entries (prompted for when needed)
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Create a new archive
    #[command(alias = "c")]
    Create {
        /// Output archive file
        archive: PathBuf,

        /// Files and directories to add
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Deflate level, 0 stores
        #[arg(short, long, default_value_t = 6, value_parser = clap::value_parser!(u8).range(0..=9))]
        level: u8,

        /// Encrypt entries; without a value the password is prompted for
        #[arg(short, long, num_args = 0..=1)]
        password: Option<Option<String>>,

        /// AES key strength
        #[arg(long, value_enum, conflicts_with = "zipcrypto")]
        aes: Option<AesBits>,

        /// Use legacy ZipCrypto instead of AES
        #[arg(long)]
        zipcrypto: bool,

        /// Split into volumes of SIZE bytes (k, m and g suffixes allowed)
        #[arg(short, long, value_parser = utils::parse_size)]
        split: Option<u64>,

        /// Write entries in the order given even when compressing in parallel
        #[arg(short, long)]
        keep_order: bool,

        /// Compression threads, 0 compresses on the calling thread
        #[arg(short, long)]
        workers: Option<usize>,

        /// Archive comment
        #[arg(short, long)]
        comment: Option<String>,

        /// Hide the progress bar
        #[arg(short, long)]
        quiet: bool,
    },

    /// Show information about an archive
    #[command(alias = "i")]
    Info {
        /// Archive file to inspect
        archive: PathBuf,
    },

    /// Generate shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        })
    });
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false).compact());
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::List {
            archive,
            long,
            json,
            encoding,
            include,
            exclude,
        } => commands::cmd_list(
            &archive,
            &ListOptions {
                long,
                json,
                encoding,
                include: &include,
                exclude: &exclude,
            },
        ),
        Commands::Extract {
            archive,
            output,
            files,
            password,
            encoding,
            include,
            exclude,
            overwrite,
            quiet,
        } => commands::cmd_extract(
            &archive,
            &ExtractOptions {
                output,
                files: &files,
                password,
                encoding,
                include: &include,
                exclude: &exclude,
                overwrite,
                progress: !quiet,
            },
        ),
        Commands::Test { archive, password } => commands::cmd_test(&archive, password),
        Commands::Create {
            archive,
            paths,
            level,
            password,
            aes,
            zipcrypto,
            split,
            keep_order,
            workers,
            comment,
            quiet,
        } => commands::cmd_create(
            &archive,
            &paths,
            &CreateOptions {
                level,
                password,
                aes,
                zipcrypto,
                split,
                keep_order,
                workers,
                comment,
                progress: !quiet,
            },
        ),
        Commands::Info { archive } => commands::cmd_info(&archive),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "oxizip", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
