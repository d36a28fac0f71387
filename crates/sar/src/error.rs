use std::path::PathBuf;

use thiserror::Error as ThisError;

pub type Result<R, E = Error> = std::result::Result<R, E>;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unix error: {0}")]
    Errno(#[from] nix::Error),

    #[error("incompatible magic number in archive header")]
    BadMagic,

    #[error("unsupported archive format version {0}")]
    UnsupportedVersion(u8),

    #[error("node name or working path too long for {0:?}")]
    PathTooLong(PathBuf),

    #[error("symlink or hardlink target {0:?} too large to encode")]
    LinkTooLarge(PathBuf),

    #[error("premature end of stream while decoding archive")]
    ShortRead,

    #[error("cannot spawn compressor {0:?}: {1}")]
    CompressorSpawn(String, std::io::Error),

    #[error("compressor {0:?} exited with status {1}")]
    CompressorFailed(String, std::process::ExitStatus),

    #[error("options -C/-N are only valid together with create mode")]
    InvalidFlagCombination,
}
