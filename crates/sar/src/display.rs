//! Human-readable per-entry reporting, used by both `--create`/`--extract`
//! progress output and `--list`.
//!
//! Verbosity is cumulative: 0 is silent, 1 prints one path per line, 2 adds
//! an `ls -l`-style mode/owner/size/mtime prefix, 3 appends the CRC (when
//! the archive carries one), 4 additionally shows atime.

use std::path::Path;

use crate::mode::{self, Kind};

/// One archive entry's metadata, gathered fresh by the writer or decoded
/// off the wire by the reader.
pub struct EntryInfo<'a> {
    pub path: &'a Path,
    pub archive_mode: u16,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub atime: i64,
    pub mtime: i64,
    pub crc: Option<u32>,
}

fn kind_glyph(archive_mode: u16) -> char {
    match Kind::from_archive_mode(archive_mode) {
        Kind::Regular => '-',
        Kind::Directory => 'd',
        Kind::Symlink => 'l',
        Kind::Fifo => 'p',
        Kind::BlockDevice => 'b',
        Kind::CharDevice => 'c',
        Kind::Hardlink => 'h',
        Kind::Control => {
            if archive_mode & mode::PERM_MASK == mode::M_C_IGNORE {
                'I'
            } else {
                'C'
            }
        }
    }
}

fn perm_triplet(archive_mode: u16, r: u16, w: u16, x: u16, set_bit: u16, set_lower: char, set_upper: char) -> String {
    let mut s = String::with_capacity(3);
    s.push(if archive_mode & r != 0 { 'r' } else { '-' });
    s.push(if archive_mode & w != 0 { 'w' } else { '-' });
    s.push(match (archive_mode & x != 0, archive_mode & set_bit != 0) {
        (true, true) => set_lower,
        (false, true) => set_upper,
        (true, false) => 'x',
        (false, false) => '-',
    });
    s
}

/// The 9-character `rwxrwxrwx`-with-overrides permission string (the mode
/// glyph itself is printed separately, by [`kind_glyph`]).
pub fn perm_string(archive_mode: u16) -> String {
    let mut s = String::with_capacity(9);
    s.push_str(&perm_triplet(
        archive_mode,
        mode::M_IRUSR,
        mode::M_IWUSR,
        mode::M_IXUSR,
        mode::M_ISUID,
        's',
        'S',
    ));
    s.push_str(&perm_triplet(
        archive_mode,
        mode::M_IRGRP,
        mode::M_IWGRP,
        mode::M_IXGRP,
        mode::M_ISGID,
        's',
        'S',
    ));
    s.push_str(&perm_triplet(
        archive_mode,
        mode::M_IROTH,
        mode::M_IWOTH,
        mode::M_IXOTH,
        mode::M_ISVTX,
        't',
        'T',
    ));
    s
}

/// Renders one entry at the given verbosity level. Returns `None` at
/// verbosity 0 (nothing to print).
pub fn format_entry(verbosity: u8, info: &EntryInfo) -> Option<String> {
    if verbosity == 0 {
        return None;
    }
    if verbosity == 1 {
        return Some(info.path.display().to_string());
    }

    let mut line = format!(
        "{}{} {:>5} {:>5} {:>10} {}",
        kind_glyph(info.archive_mode),
        perm_string(info.archive_mode),
        info.uid,
        info.gid,
        info.size,
        info.path.display()
    );

    if verbosity >= 3 {
        match info.crc {
            Some(crc) => line.push_str(&format!(" crc={crc:08x}")),
            None => line.push_str(" crc=none"),
        }
    }
    if verbosity >= 4 {
        line.push_str(&format!(" atime={} mtime={}", info.atime, info.mtime));
    } else {
        line.push_str(&format!(" mtime={}", info.mtime));
    }

    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_zero_prints_nothing() {
        let info = EntryInfo {
            path: Path::new("a"),
            archive_mode: mode::mode_to_archive(libc::S_IFREG | 0o644),
            uid: 0,
            gid: 0,
            size: 0,
            atime: 0,
            mtime: 0,
            crc: None,
        };
        assert_eq!(format_entry(0, &info), None);
    }

    #[test]
    fn verbosity_one_is_bare_path() {
        let info = EntryInfo {
            path: Path::new("a/b"),
            archive_mode: mode::mode_to_archive(libc::S_IFREG | 0o644),
            uid: 0,
            gid: 0,
            size: 0,
            atime: 0,
            mtime: 0,
            crc: None,
        };
        assert_eq!(format_entry(1, &info).unwrap(), "a/b");
    }

    #[test]
    fn setuid_shows_lowercase_s_when_executable() {
        let mode = mode::mode_to_archive(libc::S_IFREG | libc::S_ISUID | 0o755);
        assert_eq!(&perm_string(mode)[0..3], "rws");
    }

    #[test]
    fn setuid_shows_uppercase_s_when_not_executable() {
        let mode = mode::mode_to_archive(libc::S_IFREG | libc::S_ISUID | 0o644);
        assert_eq!(&perm_string(mode)[0..3], "rwS");
    }

    #[test]
    fn directory_glyph_is_d() {
        let mode = mode::mode_to_archive(libc::S_IFDIR | 0o755);
        assert_eq!(kind_glyph(mode), 'd');
    }

    #[test]
    fn ignore_sentinel_glyph_is_i() {
        let mode = mode::mode_to_archive(libc::S_IFSOCK | 0o600);
        assert_eq!(kind_glyph(mode), 'I');
    }
}
