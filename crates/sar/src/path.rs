//! The working path: a capped scratch buffer shared by the writer and the
//! reader for the path of the entry currently being processed.
//!
//! Archive names are raw bytes (not necessarily UTF-8), so this operates on
//! `Vec<u8>` / `OsStr` rather than `String`. Appends and restores are
//! index-based: descending into a directory extends the buffer in place,
//! and returning from it truncates back to the saved length, mirroring the
//! reference's `wp`/`wp_idx` pair instead of allocating a fresh `PathBuf`
//! per recursion level.

use std::borrow::Cow;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use crate::error::{Error, Result};

/// Maximum size of the working path buffer (spec.md §3, `WP_MAX`).
pub const WP_MAX: usize = 4095;
/// Maximum size of a single path component (spec.md §3, `NODE_MAX`).
pub const NODE_MAX: usize = 255;

#[derive(Debug, Default)]
pub struct WorkingPath {
    buf: Vec<u8>,
}

impl WorkingPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `/name` to the buffer, returning the length to restore to
    /// on the way back out (the caller's responsibility, mirroring
    /// `rec_add`'s save-index/recurse/restore-index dance) along with the
    /// name actually used. A component over `NODE_MAX` bytes is truncated
    /// to `NODE_MAX - 1` bytes plus a `~` sentinel rather than rejected;
    /// the caller must use the returned name for the archive record too,
    /// so the working path and the wire name stay in sync.
    pub fn push_component<'a>(&mut self, name: &'a [u8]) -> Result<(usize, Cow<'a, [u8]>)> {
        let effective: Cow<[u8]> = if name.len() > NODE_MAX {
            let mut truncated = name[..NODE_MAX - 1].to_vec();
            truncated.push(b'~');
            tracing::warn!(
                name = %String::from_utf8_lossy(name),
                "path component exceeds {NODE_MAX} bytes, truncating"
            );
            Cow::Owned(truncated)
        } else {
            Cow::Borrowed(name)
        };

        let saved = self.buf.len();
        if saved != 0 {
            self.buf.push(b'/');
        }
        self.buf.extend_from_slice(&effective);
        if self.buf.len() >= WP_MAX {
            self.buf.truncate(saved);
            return Err(Error::PathTooLong(self.as_path().to_path_buf()));
        }
        Ok((saved, effective))
    }

    pub fn truncate(&mut self, len: usize) {
        self.buf.truncate(len);
    }

    pub fn as_path(&self) -> &Path {
        Path::new(OsStr::from_bytes(&self.buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_restore_round_trips() {
        let mut wp = WorkingPath::new();
        let (saved_root, _) = wp.push_component(b"d").unwrap();
        let (saved, _) = wp.push_component(b"child").unwrap();
        assert_eq!(wp.as_path(), Path::new("d/child"));
        wp.truncate(saved);
        assert_eq!(wp.as_path(), Path::new("d"));
        wp.truncate(saved_root);
        assert_eq!(wp.as_path(), Path::new(""));
    }

    #[test]
    fn truncates_oversized_component_with_sentinel() {
        let mut wp = WorkingPath::new();
        wp.push_component(b"d").unwrap();
        let long_name = vec![b'x'; NODE_MAX + 1];
        let (_, effective) = wp.push_component(&long_name).unwrap();
        assert_eq!(effective.len(), NODE_MAX);
        assert_eq!(effective.last(), Some(&b'~'));
        assert!(wp.as_path().to_string_lossy().ends_with('~'));
    }

    #[test]
    fn exact_node_max_component_is_not_truncated() {
        let mut wp = WorkingPath::new();
        let name = vec![b'x'; NODE_MAX];
        let (_, effective) = wp.push_component(&name).unwrap();
        assert_eq!(effective.as_ref(), name.as_slice());
    }
}
