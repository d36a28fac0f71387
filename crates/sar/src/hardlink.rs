//! Hardlink reconciliation table.
//!
//! Tracks multi-linked inodes seen while walking a source tree so that only
//! the first occurrence of an inode is emitted as a real node; every later
//! occurrence is emitted as a hardlink reference to the first path.
//!
//! The reference implementation scans a linearly-probed slab that grows in
//! fixed blocks of 1024 slots. That's an artefact of hand-rolled open
//! addressing without tombstones (see spec.md §9's design notes); a
//! `HashMap` gives the same observable contract — at most one non-hardlink
//! emission per inode, decremented and released on its last sighting —
//! without reimplementing slab growth by hand.

use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InodeKey {
    pub ino: u64,
    pub dev: u64,
}

struct Entry {
    remaining_links: u64,
    path: PathBuf,
}

/// Process-lifetime map from (inode, device) to the archive path of the
/// first occurrence, used by the writer. The reader needs no equivalent
/// table: a hardlink record embeds its target path directly.
#[derive(Debug, Default)]
pub struct HardlinkTable {
    entries: HashMap<InodeKey, Entry>,
}

impl HardlinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records or resolves one sighting of `(ino, dev)`.
    ///
    /// - If this inode was seen before, returns the path recorded at first
    ///   sighting and decrements the remaining-link counter, releasing the
    ///   slot once it reaches one (the last sighting).
    /// - Otherwise records a new entry with `nlink` remaining sightings and
    ///   returns `None`.
    pub fn observe(&mut self, ino: u64, dev: u64, nlink: u64, path: &std::path::Path) -> Option<PathBuf> {
        let key = InodeKey { ino, dev };

        if let Some(entry) = self.entries.get_mut(&key) {
            let target = entry.path.clone();
            entry.remaining_links = entry.remaining_links.saturating_sub(1);
            if entry.remaining_links <= 1 {
                self.entries.remove(&key);
            }
            return Some(target);
        }

        self.entries.insert(
            key,
            Entry {
                remaining_links: nlink,
                path: path.to_path_buf(),
            },
        );
        None
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn first_sighting_returns_none() {
        let mut table = HardlinkTable::new();
        assert_eq!(table.observe(7, 1, 3, Path::new("d/a")), None);
    }

    #[test]
    fn later_sightings_return_first_path() {
        let mut table = HardlinkTable::new();
        table.observe(7, 1, 3, Path::new("d/a"));

        assert_eq!(table.observe(7, 1, 3, Path::new("d/b")), Some(PathBuf::from("d/a")));
        assert_eq!(table.observe(7, 1, 3, Path::new("d/c")), Some(PathBuf::from("d/a")));
    }

    #[test]
    fn entry_is_released_after_last_sighting() {
        let mut table = HardlinkTable::new();
        table.observe(7, 1, 2, Path::new("d/a"));
        table.observe(7, 1, 2, Path::new("d/b"));

        // Same inode number reused on a fresh walk (e.g. after reset) should
        // not resolve against the released entry.
        table.reset();
        assert_eq!(table.observe(7, 1, 2, Path::new("e/a")), None);
    }

    #[test]
    fn distinct_devices_do_not_collide() {
        let mut table = HardlinkTable::new();
        table.observe(7, 1, 2, Path::new("d/a"));
        assert_eq!(table.observe(7, 2, 2, Path::new("other/a")), None);
    }
}
