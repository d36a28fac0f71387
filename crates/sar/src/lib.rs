//! Codec for the sar archive format.
//!
//! [`writer::ArchiveWriter`] builds an archive from a filesystem tree;
//! [`reader::ArchiveReader`] restores one, or walks it read-only for
//! listing. Everything below that is wire-format plumbing: mode
//! translation, the size-class byte, CRC framing, and the hardlink
//! reconciliation table.

mod compress;
mod crc32;
mod display;
mod error;
mod hardlink;
mod io;
mod mode;
mod path;
mod record;
mod reader;
mod sizeclass;
mod writer;

pub use display::{format_entry, EntryInfo};
pub use error::{Error, Result};
pub use mode::Kind;
pub use reader::{ArchiveReader, OpenOptions};
pub use record::ArchiveFlags;
pub use writer::{ArchiveWriter, CreateOptions};
