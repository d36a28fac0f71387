//! Bidirectional translation between OS file-mode bits and archive mode bits.
//!
//! An archive mode is a 16-bit value: the low 3 bits are the [`Kind`] tag,
//! the upper 13 bits are permission bits (mirroring the S_ISUID/S_ISGID/
//! S_ISVTX/rwx×3 layout one-for-one, just renumbered to start at bit 3).

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Mask isolating the kind tag from an archive mode word.
pub const KIND_MASK: u16 = 0x7;
/// Mask isolating the permission bits from an archive mode word.
pub const PERM_MASK: u16 = 0xFFF8;

pub const M_ISUID: u16 = 0x8;
pub const M_ISGID: u16 = 0x10;
pub const M_ISVTX: u16 = 0x20;
pub const M_IRUSR: u16 = 0x40;
pub const M_IWUSR: u16 = 0x80;
pub const M_IXUSR: u16 = 0x100;
pub const M_IRGRP: u16 = 0x200;
pub const M_IWGRP: u16 = 0x400;
pub const M_IXGRP: u16 = 0x800;
pub const M_IROTH: u16 = 0x1000;
pub const M_IWOTH: u16 = 0x2000;
pub const M_IXOTH: u16 = 0x4000;

/// Control sub-kind carried in the permission bits of a [`Kind::Control`] record.
pub const M_C_CHILD: u16 = 0x0;
pub const M_C_IGNORE: u16 = 0x8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum Kind {
    Regular = 0,
    Directory = 1,
    Symlink = 2,
    Fifo = 3,
    BlockDevice = 4,
    CharDevice = 5,
    Hardlink = 6,
    Control = 7,
}

impl Kind {
    pub fn from_archive_mode(mode: u16) -> Self {
        // KIND_MASK only yields 0-7, all of which are valid discriminants.
        Kind::try_from_primitive(mode & KIND_MASK).expect("kind mask is exhaustive over 0..=7")
    }
}

/// Forward translation: OS `mode_t` bits (as returned by `lstat`) to an
/// archive mode word. Kinds outside the six regular OS kinds (i.e. sockets)
/// come back as the control/ignore sentinel rather than an error — they are
/// silently dropped per spec.md's non-goals.
pub fn mode_to_archive(mode: u32) -> u16 {
    let kind = match mode as libc::mode_t & libc::S_IFMT {
        libc::S_IFREG => Kind::Regular,
        libc::S_IFDIR => Kind::Directory,
        libc::S_IFLNK => Kind::Symlink,
        libc::S_IFIFO => Kind::Fifo,
        libc::S_IFBLK => Kind::BlockDevice,
        libc::S_IFCHR => Kind::CharDevice,
        _ => return u16::from(Kind::Control) | M_C_IGNORE,
    };

    let mut out: u16 = kind.into();
    out |= perm_to_archive(mode);
    out
}

/// Translates only the permission bits (set-uid/set-gid/sticky + rwx×3),
/// independent of file kind.
pub fn perm_to_archive(mode: u32) -> u16 {
    let mode = mode as libc::mode_t;
    let mut out = 0u16;

    if mode & libc::S_ISUID != 0 {
        out |= M_ISUID;
    }
    if mode & libc::S_ISGID != 0 {
        out |= M_ISGID;
    }
    if mode & libc::S_ISVTX != 0 {
        out |= M_ISVTX;
    }
    if mode & libc::S_IRUSR != 0 {
        out |= M_IRUSR;
    }
    if mode & libc::S_IWUSR != 0 {
        out |= M_IWUSR;
    }
    if mode & libc::S_IXUSR != 0 {
        out |= M_IXUSR;
    }
    if mode & libc::S_IRGRP != 0 {
        out |= M_IRGRP;
    }
    if mode & libc::S_IWGRP != 0 {
        out |= M_IWGRP;
    }
    if mode & libc::S_IXGRP != 0 {
        out |= M_IXGRP;
    }
    if mode & libc::S_IROTH != 0 {
        out |= M_IROTH;
    }
    if mode & libc::S_IWOTH != 0 {
        out |= M_IWOTH;
    }
    if mode & libc::S_IXOTH != 0 {
        out |= M_IXOTH;
    }

    out
}

/// Inverse translation: archive mode word to OS `mode_t` bits. Returns
/// `None` for kinds with no OS analogue (hardlink reference, control).
pub fn archive_to_mode(archive_mode: u16) -> Option<u32> {
    let kind_bits = match Kind::from_archive_mode(archive_mode) {
        Kind::Regular => libc::S_IFREG,
        Kind::Directory => libc::S_IFDIR,
        Kind::Symlink => libc::S_IFLNK,
        Kind::Fifo => libc::S_IFIFO,
        Kind::BlockDevice => libc::S_IFBLK,
        Kind::CharDevice => libc::S_IFCHR,
        Kind::Hardlink | Kind::Control => return None,
    };

    let mut mode: libc::mode_t = kind_bits;

    if archive_mode & M_ISUID != 0 {
        mode |= libc::S_ISUID;
    }
    if archive_mode & M_ISGID != 0 {
        mode |= libc::S_ISGID;
    }
    if archive_mode & M_ISVTX != 0 {
        mode |= libc::S_ISVTX;
    }
    if archive_mode & M_IRUSR != 0 {
        mode |= libc::S_IRUSR;
    }
    if archive_mode & M_IWUSR != 0 {
        mode |= libc::S_IWUSR;
    }
    if archive_mode & M_IXUSR != 0 {
        mode |= libc::S_IXUSR;
    }
    if archive_mode & M_IRGRP != 0 {
        mode |= libc::S_IRGRP;
    }
    if archive_mode & M_IWGRP != 0 {
        mode |= libc::S_IWGRP;
    }
    if archive_mode & M_IXGRP != 0 {
        mode |= libc::S_IXGRP;
    }
    if archive_mode & M_IROTH != 0 {
        mode |= libc::S_IROTH;
    }
    if archive_mode & M_IWOTH != 0 {
        mode |= libc::S_IWOTH;
    }
    if archive_mode & M_IXOTH != 0 {
        mode |= libc::S_IXOTH;
    }

    Some(mode as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_regular_file_permissions() {
        let mode = libc::S_IFREG | 0o644;
        let archive = mode_to_archive(mode);
        assert_eq!(Kind::from_archive_mode(archive), Kind::Regular);
        assert_eq!(archive_to_mode(archive), Some(mode as u32));
    }

    #[test]
    fn round_trips_setuid_directory() {
        let mode = libc::S_IFDIR | libc::S_ISUID | 0o755;
        let archive = mode_to_archive(mode);
        assert_eq!(archive_to_mode(archive), Some(mode as u32));
    }

    #[test]
    fn socket_becomes_ignore_sentinel() {
        let mode = libc::S_IFSOCK | 0o600;
        let archive = mode_to_archive(mode);
        assert_eq!(Kind::from_archive_mode(archive), Kind::Control);
        assert_eq!(archive & PERM_MASK, M_C_IGNORE);
    }

    #[test]
    fn hardlink_and_control_are_untranslatable() {
        assert_eq!(archive_to_mode(u16::from(Kind::Hardlink)), None);
        assert_eq!(archive_to_mode(u16::from(Kind::Control) | M_C_CHILD), None);
    }
}
