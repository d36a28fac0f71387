//! Restores an archive onto a filesystem tree, or walks it without writing
//! anything for `--list`/`--information`.
//!
//! The two modes share every byte-consuming step so the stream stays in
//! sync either way; `list_only` just gates the filesystem calls.

use std::ffi::OsStr;
use std::fs::{self, File};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{lchown, symlink};
use std::path::Path;

use nix::sys::stat::{mknod, Mode, SFlag};
use nix::sys::time::TimeSpec;
use nix::unistd::mkfifo;

use crate::compress::CompressorReader;
use crate::crc32::Crc32;
use crate::display::{self, EntryInfo};
use crate::error::Result;
use crate::io::{self, InputSource};
use crate::mode::{self, Kind};
use crate::path::WorkingPath;
use crate::record::{self, ArchiveFlags};
use crate::sizeclass::SizeClass;

pub struct OpenOptions {
    pub verbosity: u8,
    pub compressor: Option<String>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            verbosity: 0,
            compressor: None,
        }
    }
}

pub struct ArchiveReader {
    source: InputSource,
    compressor: CompressorReader,
    flags: ArchiveFlags,
    verbosity: u8,
    working_path: WorkingPath,
    list_only: bool,
}

impl ArchiveReader {
    pub fn open(src: &Path, options: OpenOptions) -> Result<Self> {
        let file = File::open(src)?;
        let (compressor, mut source) = CompressorReader::open(file, options.compressor.as_deref())?;
        let flags = record::read_header(&mut source)?;

        Ok(Self {
            source,
            compressor,
            flags,
            verbosity: options.verbosity,
            working_path: WorkingPath::new(),
            list_only: false,
        })
    }

    pub fn flags(&self) -> ArchiveFlags {
        self.flags
    }

    pub fn extract(&mut self, dest_root: &Path) -> Result<()> {
        self.list_only = false;
        self.run(dest_root)
    }

    pub fn list(&mut self) -> Result<()> {
        self.list_only = true;
        self.run(Path::new("."))
    }

    pub fn close(self) -> Result<()> {
        let Self { source, compressor, .. } = self;
        compressor.close(source)
    }

    fn crc_gate(&self) -> Option<Crc32> {
        self.flags.contains(ArchiveFlags::CRC).then(Crc32::new)
    }

    fn run(&mut self, dest_root: &Path) -> Result<()> {
        while let Some(archive_mode) = self.try_read_top_level()? {
            self.dispatch(archive_mode, dest_root)?;
        }
        Ok(())
    }

    /// Reads the 2-byte archive mode that starts every top-level record,
    /// returning `None` on a clean end of stream (no bytes at all) rather
    /// than erroring — unlike inside a directory's child list, running out
    /// of input here is the normal way an archive ends.
    fn try_read_top_level(&mut self) -> Result<Option<u16>> {
        let mut first = [0u8; 1];
        let n = self.source.read_byte(&mut first)?;
        if n == 0 {
            return Ok(None);
        }
        let mut second = [0u8; 1];
        io::read_exact(&mut self.source, &mut second)?;
        Ok(Some(u16::from_le_bytes([first[0], second[0]])))
    }

    /// Reads and processes one record whose archive-mode word has already
    /// been consumed. Returns `false` when it was an end-of-children
    /// sentinel, `true` otherwise (used by [`Self::read_children`] to know
    /// when to stop).
    fn dispatch(&mut self, archive_mode: u16, dest_root: &Path) -> Result<bool> {
        let mut gate = self.crc_gate();
        if let Some(crc) = &mut gate {
            crc.update(&archive_mode.to_le_bytes());
        }

        match Kind::from_archive_mode(archive_mode) {
            Kind::Control => {
                let is_end = archive_mode & mode::PERM_MASK == mode::M_C_CHILD;
                self.finish_record_read(gate)?;
                if !is_end && self.verbosity > 0 {
                    tracing::warn!("skipping archive entry of unsupported type");
                }
                Ok(!is_end)
            }
            Kind::Hardlink => {
                self.read_hardlink_record(&mut gate, dest_root)?;
                Ok(true)
            }
            _ => {
                self.read_normal_record(archive_mode, &mut gate, dest_root)?;
                Ok(true)
            }
        }
    }

    fn read_children(&mut self, dest_root: &Path) -> Result<()> {
        loop {
            let archive_mode = record::read_u16(&mut self.source, &mut None)?;
            if !self.dispatch(archive_mode, dest_root)? {
                return Ok(());
            }
        }
    }

    fn read_hardlink_record(&mut self, gate: &mut Option<Crc32>, dest_root: &Path) -> Result<()> {
        let mut name_len = [0u8; 1];
        io::read_exact_gated(&mut self.source, &mut name_len, gate)?;
        let mut name = vec![0u8; name_len[0] as usize];
        io::read_exact_gated(&mut self.source, &mut name, gate)?;

        let target_len = record::read_u16(&mut self.source, gate)?;
        let mut target = vec![0u8; target_len as usize];
        io::read_exact_gated(&mut self.source, &mut target, gate)?;

        self.finish_record_read(gate.take())?;

        let (saved, _) = self.working_path.push_component(&name)?;

        if !self.list_only {
            let dest_path = dest_root.join(self.working_path.as_path());
            let target_path = dest_root.join(Path::new(OsStr::from_bytes(&target)));
            fs::hard_link(&target_path, &dest_path)?;
        }

        if self.verbosity > 0 {
            let info = EntryInfo {
                path: self.working_path.as_path(),
                archive_mode: u16::from(Kind::Hardlink),
                uid: 0,
                gid: 0,
                size: 0,
                atime: 0,
                mtime: 0,
                crc: None,
            };
            if let Some(line) = display::format_entry(self.verbosity, &info) {
                tracing::info!("{line}");
            }
        }

        self.working_path.truncate(saved);
        Ok(())
    }

    fn read_normal_record(&mut self, archive_mode: u16, gate: &mut Option<Crc32>, dest_root: &Path) -> Result<()> {
        let kind = Kind::from_archive_mode(archive_mode);

        let mut size_class_byte = [0u8; 1];
        io::read_exact_gated(&mut self.source, &mut size_class_byte, gate)?;
        let size_class = SizeClass::from_byte(size_class_byte[0]);

        let (uid, gid) = record::decode_ids(&mut self.source, gate, size_class.id)?;
        let (atime, mtime) = record::decode_times(&mut self.source, gate, size_class.time)?;
        let (atime_nsec, mtime_nsec) = if self.flags.contains(ArchiveFlags::NANO_TIME) {
            record::decode_nsec(&mut self.source, gate)?
        } else {
            (0, 0)
        };

        let mut name_len = [0u8; 1];
        io::read_exact_gated(&mut self.source, &mut name_len, gate)?;
        let mut name = vec![0u8; name_len[0] as usize];
        io::read_exact_gated(&mut self.source, &mut name, gate)?;

        let (saved, _) = self.working_path.push_component(&name)?;
        let dest_path = dest_root.join(self.working_path.as_path());
        let perm_mode = mode::archive_to_mode(archive_mode).map(|m| m & 0o7777).unwrap_or(0);

        let mut entry_size = 0u64;

        match kind {
            Kind::Regular => {
                let size = record::decode_size(&mut self.source, gate, size_class.file)?;
                entry_size = size;
                if self.list_only {
                    self.source.skip(size)?;
                } else {
                    let mut out = File::create(&dest_path)?;
                    io::copy_n_gated(&mut self.source, &mut out, size, gate)?;
                }
            }
            Kind::Directory => {
                if !self.list_only {
                    fs::create_dir_all(&dest_path)?;
                }
            }
            Kind::Symlink => {
                let size = record::decode_size(&mut self.source, gate, size_class.file)?;
                entry_size = size;
                let mut target = vec![0u8; size as usize];
                io::read_exact_gated(&mut self.source, &mut target, gate)?;
                if !self.list_only {
                    symlink(Path::new(OsStr::from_bytes(&target)), &dest_path)?;
                }
            }
            Kind::Fifo => {
                if !self.list_only {
                    mkfifo(&dest_path, Mode::from_bits_truncate(perm_mode))?;
                }
            }
            Kind::BlockDevice | Kind::CharDevice => {
                let raw_dev = record::read_u64(&mut self.source, gate)?;
                if !self.list_only {
                    let sflag = if kind == Kind::BlockDevice { SFlag::S_IFBLK } else { SFlag::S_IFCHR };
                    mknod(&dest_path, sflag, Mode::from_bits_truncate(perm_mode), raw_dev)?;
                }
            }
            Kind::Hardlink | Kind::Control => unreachable!("handled by dispatch"),
        }

        if self.verbosity > 0 {
            let display_crc = gate.as_ref().copied().map(|c| c.finish());
            let info = EntryInfo {
                path: self.working_path.as_path(),
                archive_mode,
                uid,
                gid,
                size: entry_size,
                atime,
                mtime,
                crc: display_crc,
            };
            if let Some(line) = display::format_entry(self.verbosity, &info) {
                tracing::info!("{line}");
            }
        }

        if kind == Kind::Directory {
            self.read_children(dest_root)?;
        }

        self.finish_record_read(gate.take())?;

        if !self.list_only {
            let is_symlink = kind == Kind::Symlink;
            apply_metadata(&dest_path, uid, gid, perm_mode, atime, atime_nsec, mtime, mtime_nsec, is_symlink)?;
        }

        self.working_path.truncate(saved);
        Ok(())
    }

    fn finish_record_read(&mut self, gate: Option<Crc32>) -> Result<()> {
        if let Some(crc) = gate {
            let stored = record::read_u32(&mut self.source, &mut None)?;
            if stored != crc.finish() {
                tracing::warn!("CRC mismatch on archive entry; data may be corrupt");
            }
        }
        Ok(())
    }
}

/// nix's `Read` isn't implemented for [`InputSource`] by name, so give the
/// top-level-EOF probe a one-byte read that goes through the same `Read`
/// impl as everything else.
trait ReadByte {
    fn read_byte(&mut self, buf: &mut [u8; 1]) -> Result<usize>;
}

impl ReadByte for InputSource {
    fn read_byte(&mut self, buf: &mut [u8; 1]) -> Result<usize> {
        use std::io::Read;
        Ok(self.read(buf)?)
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_metadata(
    path: &Path,
    uid: u32,
    gid: u32,
    perm_mode: u32,
    atime: i64,
    atime_nsec: i64,
    mtime: i64,
    mtime_nsec: i64,
    symlink_target: bool,
) -> Result<()> {
    lchown(path, Some(uid), Some(gid))?;

    if !symlink_target {
        fs::set_permissions(path, fs::Permissions::from_mode(perm_mode))?;
    }

    let atime_spec = TimeSpec::new(atime, atime_nsec);
    let mtime_spec = TimeSpec::new(mtime, mtime_nsec);
    let follow = if symlink_target {
        nix::sys::stat::UtimensatFlags::NoFollowSymlink
    } else {
        nix::sys::stat::UtimensatFlags::FollowSymlink
    };
    nix::sys::stat::utimensat(Some(nix::fcntl::AT_FDCWD), path, &atime_spec, &mtime_spec, follow)?;
    Ok(())
}

use std::os::unix::fs::PermissionsExt;
