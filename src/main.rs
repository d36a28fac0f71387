//! `sar`: a command-line wrapper around the `sar-archiver` library.

use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgGroup, Parser};
use sar_archiver::{ArchiveFlags, ArchiveReader, ArchiveWriter, CreateOptions, Error, OpenOptions};

#[derive(Parser, Debug)]
#[command(
    name = "sar",
    version,
    about = "Simple ARchiver",
    group(ArgGroup::new("mode").required(true).args(["information", "create", "extract", "list"]))
)]
struct Cli {
    /// Print the archive's header summary (version, flags) and exit.
    #[arg(short = 'i', long = "information")]
    information: bool,

    /// Create a new archive from the given paths.
    #[arg(short = 'c', long = "create")]
    create: bool,

    /// Extract the archive's contents into the current (or --directory) directory.
    #[arg(short = 'x', long = "extract")]
    extract: bool,

    /// List the archive's contents without writing anything.
    #[arg(short = 't', long = "list")]
    list: bool,

    /// Archive file path. Defaults to stdin/stdout when omitted.
    #[arg(short = 'f', long = "file")]
    file: Option<PathBuf>,

    /// Change to DIR before performing the operation.
    #[arg(short = 'd', long = "directory")]
    directory: Option<PathBuf>,

    /// Disable CRC-32 checksums (create mode only).
    #[arg(short = 'C', long = "no-crc")]
    no_crc: bool,

    /// Disable nanosecond-precision timestamps (create mode only).
    #[arg(short = 'N', long = "no-nano")]
    no_nano: bool,

    /// Pipe the archive stream through this compressor executable.
    #[arg(long = "compress", value_name = "EXE")]
    compress: Option<String>,

    #[arg(short = 'z', long = "gzip")]
    gzip: bool,
    #[arg(short = 'j', long = "bzip2")]
    bzip2: bool,
    #[arg(short = 'J', long = "xz")]
    xz: bool,
    #[arg(short = 'Z', long = "lzw")]
    lzw: bool,
    #[arg(long = "lzma")]
    lzma: bool,
    #[arg(long = "lzip")]
    lzip: bool,
    #[arg(long = "lzop")]
    lzop: bool,

    /// Increase verbosity; repeatable.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Paths to add when creating an archive.
    paths: Vec<PathBuf>,
}

impl Cli {
    fn compressor(&self) -> Option<String> {
        self.compress.clone().or_else(|| {
            if self.gzip {
                Some("gzip".to_string())
            } else if self.bzip2 {
                Some("bzip2".to_string())
            } else if self.xz {
                Some("xz".to_string())
            } else if self.lzw {
                Some("compress".to_string())
            } else if self.lzma {
                Some("lzma".to_string())
            } else if self.lzip {
                Some("lzip".to_string())
            } else if self.lzop {
                Some("lzop".to_string())
            } else {
                None
            }
        })
    }
}

/// Saves the current working directory and restores it on drop, so
/// `--directory` only affects this invocation.
struct DirectoryGuard {
    original: PathBuf,
}

impl DirectoryGuard {
    fn enter(target: &Path) -> std::io::Result<Self> {
        let original = env::current_dir()?;
        env::set_current_dir(target)?;
        Ok(Self { original })
    }
}

impl Drop for DirectoryGuard {
    fn drop(&mut self) {
        let _ = env::set_current_dir(&self.original);
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).with_target(false).init();

    if let Err(e) = run(&cli) {
        tracing::error!("{e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn run(cli: &Cli) -> Result<(), Error> {
    if (cli.no_crc || cli.no_nano) && !cli.create {
        return Err(Error::InvalidFlagCombination);
    }

    let _guard = match &cli.directory {
        Some(dir) => Some(DirectoryGuard::enter(dir)?),
        None => None,
    };

    let archive_path = cli
        .file
        .clone()
        .unwrap_or_else(|| PathBuf::from("/dev/stdin"));

    if cli.create {
        let mut writer = ArchiveWriter::create(
            &archive_path,
            CreateOptions {
                crc: !cli.no_crc,
                nano_time: !cli.no_nano,
                verbosity: cli.verbose,
                compressor: cli.compressor(),
            },
        )?;
        for path in &cli.paths {
            writer.add(path)?;
        }
        writer.close()?;
    } else {
        let mut reader = ArchiveReader::open(
            &archive_path,
            OpenOptions {
                verbosity: cli.verbose,
                compressor: cli.compressor(),
            },
        )?;

        if cli.information {
            let flags = reader.flags();
            println!(
                "crc={} nano_time={}",
                flags.contains(ArchiveFlags::CRC),
                flags.contains(ArchiveFlags::NANO_TIME)
            );
        } else if cli.list {
            reader.list()?;
        } else if cli.extract {
            reader.extract(&env::current_dir()?)?;
        }
        reader.close()?;
    }

    Ok(())
}
