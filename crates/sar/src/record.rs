//! Archive header framing and the per-field wire encoding driven by the
//! size-class byte.
//!
//! All multi-byte integers are little-endian. The magic word packs a fixed
//! 3-byte tag and a version byte into one `u32` so a truncated archive (fewer
//! than 4 bytes available) fails the same read call that checks the tag.

use std::io::{Read, Write};

use bitflags::bitflags;

use crate::crc32::Crc32;
use crate::error::{Error, Result};
use crate::io::{read_exact_gated, write_exact_gated};
use crate::sizeclass::{FileClass, IdClass, TimeClass};

const TAG_SAR: u32 = 0x0052_4153;
const TAG_MASK: u32 = 0x00FF_FFFF;
pub const CURRENT_VERSION: u8 = 0;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ArchiveFlags: u8 {
        const CRC = 0x1;
        const NANO_TIME = 0x2;
    }
}

pub fn write_header<W: Write + ?Sized>(w: &mut W, flags: ArchiveFlags) -> Result<()> {
    let magic = TAG_SAR | ((CURRENT_VERSION as u32) << 24);
    write_exact_gated(w, &magic.to_le_bytes(), &mut None)?;
    write_exact_gated(w, &[flags.bits()], &mut None)?;
    Ok(())
}

pub fn read_header<R: Read + ?Sized>(r: &mut R) -> Result<ArchiveFlags> {
    let mut magic_buf = [0u8; 4];
    read_exact_gated(r, &mut magic_buf, &mut None)?;
    let magic = u32::from_le_bytes(magic_buf);

    if magic & TAG_MASK != TAG_SAR {
        return Err(Error::BadMagic);
    }
    let version = (magic >> 24) as u8;
    if version != CURRENT_VERSION {
        return Err(Error::UnsupportedVersion(version));
    }

    let mut flags_buf = [0u8; 1];
    read_exact_gated(r, &mut flags_buf, &mut None)?;
    ArchiveFlags::from_bits(flags_buf[0]).ok_or(Error::InvalidFlagCombination)
}

/// Writes a `width`-byte little-endian unsigned value, truncating to the
/// low `width` bytes (the caller has already classified the value as
/// fitting, via [`FileClass`]/[`IdClass`]).
fn write_uint<W: Write + ?Sized>(w: &mut W, gate: &mut Option<Crc32>, value: u64, width: usize) -> Result<()> {
    let bytes = value.to_le_bytes();
    write_exact_gated(w, &bytes[..width], gate)
}

fn read_uint<R: Read + ?Sized>(r: &mut R, gate: &mut Option<Crc32>, width: usize) -> Result<u64> {
    let mut bytes = [0u8; 8];
    read_exact_gated(r, &mut bytes[..width], gate)?;
    Ok(u64::from_le_bytes(bytes))
}

fn write_int<W: Write + ?Sized>(w: &mut W, gate: &mut Option<Crc32>, value: i64, width: usize) -> Result<()> {
    write_uint(w, gate, value as u64, width)
}

fn read_int<R: Read + ?Sized>(r: &mut R, gate: &mut Option<Crc32>, width: usize) -> Result<i64> {
    let mut bytes = [0u8; 8];
    read_exact_gated(r, &mut bytes[..width], gate)?;
    if width < 8 {
        let shift = (8 - width) * 8;
        Ok(((u64::from_le_bytes(bytes) << shift) as i64) >> shift)
    } else {
        Ok(u64::from_le_bytes(bytes) as i64)
    }
}

pub fn encode_size<W: Write + ?Sized>(w: &mut W, gate: &mut Option<Crc32>, class: FileClass, size: u64) -> Result<()> {
    write_uint(w, gate, size, class.width())
}

pub fn decode_size<R: Read + ?Sized>(r: &mut R, gate: &mut Option<Crc32>, class: FileClass) -> Result<u64> {
    read_uint(r, gate, class.width())
}

const USER_OFFSET: u32 = 1000;

pub fn encode_ids<W: Write + ?Sized>(
    w: &mut W,
    gate: &mut Option<Crc32>,
    class: IdClass,
    uid: u32,
    gid: u32,
) -> Result<()> {
    use IdClass::*;
    match class {
        RootRoot | UserUser => Ok(()),
        SameRootByte | SameUserByte => {
            let offset = if class == SameUserByte { USER_OFFSET } else { 0 };
            write_uint(w, gate, (uid - offset) as u64, 1)
        }
        RootByte | UserByte => {
            let offset = if class == UserByte { USER_OFFSET } else { 0 };
            write_uint(w, gate, (gid - offset) as u64, 1)
        }
        SameKilo => write_uint(w, gate, uid as u64, 2),
        BothByte => {
            write_uint(w, gate, uid as u64, 1)?;
            write_uint(w, gate, gid as u64, 1)
        }
        BothUserByte => {
            write_uint(w, gate, (uid - USER_OFFSET) as u64, 1)?;
            write_uint(w, gate, (gid - USER_OFFSET) as u64, 1)
        }
        ByteKilo => {
            write_uint(w, gate, uid as u64, 1)?;
            write_uint(w, gate, gid as u64, 2)
        }
        KiloByte => {
            write_uint(w, gate, uid as u64, 2)?;
            write_uint(w, gate, gid as u64, 1)
        }
        SameGiga => write_uint(w, gate, uid as u64, 4),
        BothKilo => {
            write_uint(w, gate, uid as u64, 2)?;
            write_uint(w, gate, gid as u64, 2)
        }
        KiloGiga => {
            write_uint(w, gate, uid as u64, 2)?;
            write_uint(w, gate, gid as u64, 4)
        }
        GigaKilo => {
            write_uint(w, gate, uid as u64, 4)?;
            write_uint(w, gate, gid as u64, 2)
        }
        BothGiga => {
            write_uint(w, gate, uid as u64, 4)?;
            write_uint(w, gate, gid as u64, 4)
        }
    }
}

pub fn decode_ids<R: Read + ?Sized>(r: &mut R, gate: &mut Option<Crc32>, class: IdClass) -> Result<(u32, u32)> {
    use IdClass::*;
    Ok(match class {
        RootRoot => (0, 0),
        UserUser => (USER_OFFSET, USER_OFFSET),
        SameRootByte | SameUserByte => {
            let offset = if class == SameUserByte { USER_OFFSET } else { 0 };
            let v = read_uint(r, gate, 1)? as u32 + offset;
            (v, v)
        }
        RootByte | UserByte => {
            let offset = if class == UserByte { USER_OFFSET } else { 0 };
            let uid = offset;
            let gid = read_uint(r, gate, 1)? as u32 + offset;
            (uid, gid)
        }
        SameKilo => {
            let v = read_uint(r, gate, 2)? as u32;
            (v, v)
        }
        BothByte => (read_uint(r, gate, 1)? as u32, read_uint(r, gate, 1)? as u32),
        BothUserByte => (
            read_uint(r, gate, 1)? as u32 + USER_OFFSET,
            read_uint(r, gate, 1)? as u32 + USER_OFFSET,
        ),
        ByteKilo => (read_uint(r, gate, 1)? as u32, read_uint(r, gate, 2)? as u32),
        KiloByte => (read_uint(r, gate, 2)? as u32, read_uint(r, gate, 1)? as u32),
        SameGiga => {
            let v = read_uint(r, gate, 4)? as u32;
            (v, v)
        }
        BothKilo => (read_uint(r, gate, 2)? as u32, read_uint(r, gate, 2)? as u32),
        KiloGiga => (read_uint(r, gate, 2)? as u32, read_uint(r, gate, 4)? as u32),
        GigaKilo => (read_uint(r, gate, 4)? as u32, read_uint(r, gate, 2)? as u32),
        BothGiga => (read_uint(r, gate, 4)? as u32, read_uint(r, gate, 4)? as u32),
    })
}

pub fn encode_times<W: Write + ?Sized>(
    w: &mut W,
    gate: &mut Option<Crc32>,
    class: TimeClass,
    atime: i64,
    mtime: i64,
) -> Result<()> {
    match class {
        TimeClass::Same32 => write_int(w, gate, atime, 4),
        TimeClass::Same64 => write_int(w, gate, atime, 8),
        TimeClass::Both32 => {
            write_int(w, gate, atime, 4)?;
            write_int(w, gate, mtime, 4)
        }
        TimeClass::Both64 => {
            write_int(w, gate, atime, 8)?;
            write_int(w, gate, mtime, 8)
        }
    }
}

pub fn decode_times<R: Read + ?Sized>(r: &mut R, gate: &mut Option<Crc32>, class: TimeClass) -> Result<(i64, i64)> {
    Ok(match class {
        TimeClass::Same32 => {
            let v = read_int(r, gate, 4)?;
            (v, v)
        }
        TimeClass::Same64 => {
            let v = read_int(r, gate, 8)?;
            (v, v)
        }
        TimeClass::Both32 => (read_int(r, gate, 4)?, read_int(r, gate, 4)?),
        TimeClass::Both64 => (read_int(r, gate, 8)?, read_int(r, gate, 8)?),
    })
}

/// Nanosecond remainders, present only when [`ArchiveFlags::NANO_TIME`] is
/// set. Always two 4-byte fields regardless of the time class.
pub fn encode_nsec<W: Write + ?Sized>(w: &mut W, gate: &mut Option<Crc32>, atime_nsec: i64, mtime_nsec: i64) -> Result<()> {
    write_uint(w, gate, atime_nsec as u64, 4)?;
    write_uint(w, gate, mtime_nsec as u64, 4)
}

pub fn decode_nsec<R: Read + ?Sized>(r: &mut R, gate: &mut Option<Crc32>) -> Result<(i64, i64)> {
    Ok((read_uint(r, gate, 4)? as i64, read_uint(r, gate, 4)? as i64))
}

pub fn write_u64<W: Write + ?Sized>(w: &mut W, gate: &mut Option<Crc32>, value: u64) -> Result<()> {
    write_uint(w, gate, value, 8)
}

pub fn read_u64<R: Read + ?Sized>(r: &mut R, gate: &mut Option<Crc32>) -> Result<u64> {
    read_uint(r, gate, 8)
}

pub fn write_u16<W: Write + ?Sized>(w: &mut W, gate: &mut Option<Crc32>, value: u16) -> Result<()> {
    write_exact_gated(w, &value.to_le_bytes(), gate)
}

pub fn read_u16<R: Read + ?Sized>(r: &mut R, gate: &mut Option<Crc32>) -> Result<u16> {
    let mut bytes = [0u8; 2];
    read_exact_gated(r, &mut bytes, gate)?;
    Ok(u16::from_le_bytes(bytes))
}

pub fn write_u32<W: Write + ?Sized>(w: &mut W, gate: &mut Option<Crc32>, value: u32) -> Result<()> {
    write_exact_gated(w, &value.to_le_bytes(), gate)
}

pub fn read_u32<R: Read + ?Sized>(r: &mut R, gate: &mut Option<Crc32>) -> Result<u32> {
    let mut bytes = [0u8; 4];
    read_exact_gated(r, &mut bytes, gate)?;
    Ok(u32::from_le_bytes(bytes))
}
