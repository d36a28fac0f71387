//! Builds an archive from a filesystem tree.
//!
//! `add` walks one source path: any intermediate path components the
//! caller supplied (e.g. `add("a/b/file")` when only `file` is the real
//! target) are emitted as their own container directory records so the
//! full relative path survives, without pulling in their unrelated
//! siblings. Directories proper are walked in full.

use std::fs::{self, File};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use nix::fcntl::AT_FDCWD;
use nix::sys::stat::UtimensatFlags;
use nix::sys::time::TimeSpec;

use crate::compress::CompressorWriter;
use crate::crc32::Crc32;
use crate::display::{self, EntryInfo};
use crate::error::{Error, Result};
use crate::hardlink::HardlinkTable;
use crate::io::{self, OutputSink};
use crate::mode::{self, Kind};
use crate::path::WorkingPath;
use crate::record::{self, ArchiveFlags};
use crate::sizeclass::{classify_link_size, SizeClass};

pub struct CreateOptions {
    pub crc: bool,
    pub nano_time: bool,
    pub verbosity: u8,
    pub compressor: Option<String>,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            crc: true,
            nano_time: true,
            verbosity: 0,
            compressor: None,
        }
    }
}

enum Descend<'a> {
    All,
    Chain(&'a [&'a Path]),
}

pub struct ArchiveWriter {
    sink: OutputSink,
    compressor: CompressorWriter,
    flags: ArchiveFlags,
    verbosity: u8,
    working_path: WorkingPath,
    hardlinks: HardlinkTable,
}

impl ArchiveWriter {
    pub fn create(dest: &Path, options: CreateOptions) -> Result<Self> {
        let file = File::create(dest)?;
        let (compressor, mut sink) = CompressorWriter::open(file, options.compressor.as_deref())?;

        let mut flags = ArchiveFlags::empty();
        if options.crc {
            flags |= ArchiveFlags::CRC;
        }
        if options.nano_time {
            flags |= ArchiveFlags::NANO_TIME;
        }
        record::write_header(&mut sink, flags)?;

        Ok(Self {
            sink,
            compressor,
            flags,
            verbosity: options.verbosity,
            working_path: WorkingPath::new(),
            hardlinks: HardlinkTable::new(),
        })
    }

    pub fn add(&mut self, source: &Path) -> Result<()> {
        let mut ancestors: Vec<&Path> = source.ancestors().filter(|p| !p.as_os_str().is_empty()).collect();
        ancestors.reverse();

        let Some((first, rest)) = ancestors.split_first() else {
            return Ok(());
        };

        let name = leaf_name_bytes(first).to_vec();
        let (saved, name) = self.working_path.push_component(&name)?;
        let name = name.into_owned();
        let descend = if rest.is_empty() { Descend::All } else { Descend::Chain(rest) };
        self.write_entry(first, &name, descend)?;
        self.working_path.truncate(saved);
        Ok(())
    }

    pub fn close(self) -> Result<()> {
        let Self { sink, compressor, .. } = self;
        compressor.close(sink)
    }

    fn crc_gate(&self) -> Option<Crc32> {
        self.flags.contains(ArchiveFlags::CRC).then(Crc32::new)
    }

    fn write_entry(&mut self, fs_path: &Path, name: &[u8], descend: Descend) -> Result<()> {
        let meta = match fs::symlink_metadata(fs_path) {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!(path = %fs_path.display(), error = %e, "cannot stat entry, skipping");
                return Ok(());
            }
        };

        if meta.nlink() >= 2 && !meta.is_dir() {
            if let Some(target) = self
                .hardlinks
                .observe(meta.ino(), meta.dev(), meta.nlink(), self.working_path.as_path())
            {
                self.write_hardlink_record(name, &target)?;
                return Ok(());
            }
        }

        self.write_node_header(fs_path, &meta, name)?;

        if meta.is_dir() {
            match descend {
                Descend::All => self.add_directory_children(fs_path)?,
                Descend::Chain(rest) => {
                    if let Some((next, tail)) = rest.split_first() {
                        let child_name = leaf_name_bytes(next).to_vec();
                        let (saved, child_name) = self.working_path.push_component(&child_name)?;
                        let child_name = child_name.into_owned();
                        let next_descend = if tail.is_empty() { Descend::All } else { Descend::Chain(tail) };
                        self.write_entry(next, &child_name, next_descend)?;
                        self.working_path.truncate(saved);
                    }
                }
            }
            self.write_end_of_children()?;
        }

        Ok(())
    }

    fn add_directory_children(&mut self, dir: &Path) -> Result<()> {
        let read_dir = match fs::read_dir(dir) {
            Ok(read_dir) => read_dir,
            Err(e) => {
                tracing::warn!(path = %dir.display(), error = %e, "cannot read directory, skipping its contents");
                return Ok(());
            }
        };

        for entry in read_dir {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(path = %dir.display(), error = %e, "cannot read directory entry, skipping");
                    continue;
                }
            };
            let name = entry.file_name();
            let name_bytes = name.as_bytes().to_vec();
            let child_path = entry.path();

            let (saved, name_bytes) = self.working_path.push_component(&name_bytes)?;
            let name_bytes = name_bytes.into_owned();
            self.write_entry(&child_path, &name_bytes, Descend::All)?;
            self.working_path.truncate(saved);
        }
        Ok(())
    }

    fn write_node_header(&mut self, fs_path: &Path, meta: &fs::Metadata, name: &[u8]) -> Result<()> {
        let archive_mode = mode::mode_to_archive(meta.mode());
        let mut gate = self.crc_gate();

        io::write_exact_gated(&mut self.sink, &archive_mode.to_le_bytes(), &mut gate)?;

        if Kind::from_archive_mode(archive_mode) == Kind::Control {
            self.finish_record(gate)?;
            if self.verbosity > 0 {
                tracing::warn!(path = %fs_path.display(), "skipping entry of unsupported type");
            }
            return Ok(());
        }

        let size = if meta.is_dir() { 0 } else { meta.size() };
        let (atime, atime_nsec) = (meta.atime(), meta.atime_nsec());
        let (mtime, mtime_nsec) = (meta.mtime(), meta.mtime_nsec());
        let size_class = SizeClass::classify(size, meta.uid(), meta.gid(), atime, mtime);

        io::write_exact_gated(&mut self.sink, &[size_class.to_byte()], &mut gate)?;
        record::encode_ids(&mut self.sink, &mut gate, size_class.id, meta.uid(), meta.gid())?;
        record::encode_times(&mut self.sink, &mut gate, size_class.time, atime, mtime)?;
        if self.flags.contains(ArchiveFlags::NANO_TIME) {
            record::encode_nsec(&mut self.sink, &mut gate, atime_nsec, mtime_nsec)?;
        }

        io::write_exact_gated(&mut self.sink, &[name.len() as u8], &mut gate)?;
        io::write_exact_gated(&mut self.sink, name, &mut gate)?;

        match Kind::from_archive_mode(archive_mode) {
            Kind::Regular => {
                record::encode_size(&mut self.sink, &mut gate, size_class.file, size)?;
                let mut src = File::open(fs_path)?;
                io::copy_n_gated(&mut src, &mut self.sink, size, &mut gate)?;
            }
            Kind::Symlink => {
                let target = fs::read_link(fs_path)?;
                let target_bytes = target.as_os_str().as_bytes();
                let link_class = classify_link_size(target_bytes.len() as u64)
                    .ok_or_else(|| Error::LinkTooLarge(fs_path.to_path_buf()))?;
                record::encode_size(&mut self.sink, &mut gate, link_class, target_bytes.len() as u64)?;
                io::write_exact_gated(&mut self.sink, target_bytes, &mut gate)?;
            }
            Kind::BlockDevice | Kind::CharDevice => {
                record::write_u64(&mut self.sink, &mut gate, meta.rdev())?;
            }
            Kind::Directory | Kind::Fifo => {}
            Kind::Hardlink | Kind::Control => unreachable!("handled above"),
        }

        let display_crc = gate.as_ref().copied().map(|c| c.finish());
        self.finish_record(gate)?;
        restore_source_times(fs_path, meta)?;

        if self.verbosity > 0 {
            let info = EntryInfo {
                path: self.working_path.as_path(),
                archive_mode,
                uid: meta.uid(),
                gid: meta.gid(),
                size,
                atime,
                mtime,
                crc: display_crc,
            };
            if let Some(line) = display::format_entry(self.verbosity, &info) {
                tracing::info!("{line}");
            }
        }
        Ok(())
    }

    fn write_hardlink_record(&mut self, name: &[u8], target: &Path) -> Result<()> {
        let archive_mode = u16::from(Kind::Hardlink);
        let mut gate = self.crc_gate();

        io::write_exact_gated(&mut self.sink, &archive_mode.to_le_bytes(), &mut gate)?;
        io::write_exact_gated(&mut self.sink, &[name.len() as u8], &mut gate)?;
        io::write_exact_gated(&mut self.sink, name, &mut gate)?;

        let target_bytes = target.as_os_str().as_bytes();
        record::write_u16(&mut self.sink, &mut gate, target_bytes.len() as u16)?;
        io::write_exact_gated(&mut self.sink, target_bytes, &mut gate)?;

        self.finish_record(gate)?;
        Ok(())
    }

    fn write_end_of_children(&mut self) -> Result<()> {
        let archive_mode = u16::from(Kind::Control) | mode::M_C_CHILD;
        let mut gate = self.crc_gate();
        io::write_exact_gated(&mut self.sink, &archive_mode.to_le_bytes(), &mut gate)?;
        self.finish_record(gate)
    }

    fn finish_record(&mut self, gate: Option<Crc32>) -> Result<()> {
        if let Some(crc) = gate {
            record::write_u32(&mut self.sink, &mut None, crc.finish())?;
        }
        Ok(())
    }
}

fn leaf_name_bytes(path: &Path) -> &[u8] {
    path.file_name().map(OsStrExt::as_bytes).unwrap_or_else(|| path.as_os_str().as_bytes())
}

/// Restores the source file's original atime/mtime after it's been read
/// for archiving (reading a regular file's contents bumps its atime).
fn restore_source_times(path: &Path, meta: &fs::Metadata) -> Result<()> {
    let atime = TimeSpec::new(meta.atime(), meta.atime_nsec());
    let mtime = TimeSpec::new(meta.mtime(), meta.mtime_nsec());
    nix::sys::stat::utimensat(Some(AT_FDCWD), path, &atime, &mtime, UtimensatFlags::NoFollowSymlink)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::tempdir;

    #[test]
    fn single_regular_file_round_trips_through_header() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("hello.txt");
        std::fs::write(&src, b"hello world").unwrap();

        let dest = dir.path().join("out.sar");
        let mut writer = ArchiveWriter::create(
            &dest,
            CreateOptions {
                crc: true,
                nano_time: false,
                verbosity: 0,
                compressor: None,
            },
        )
        .unwrap();
        writer.add(&src).unwrap();
        writer.close().unwrap();

        let bytes = std::fs::read(&dest).unwrap();
        assert!(bytes.len() > 5);
        assert_eq!(&bytes[0..3], b"SAR");
    }

    #[test]
    fn directory_with_children_emits_end_sentinel() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("d")).unwrap();
        std::fs::write(dir.path().join("d/a"), b"x").unwrap();

        let dest = dir.path().join("out.sar");
        let mut writer = ArchiveWriter::create(&dest, CreateOptions::default()).unwrap();
        writer.add(&dir.path().join("d")).unwrap();
        writer.close().unwrap();

        let bytes = std::fs::read(&dest).unwrap();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn single_file_byte_trace_matches_wire_format() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("f");
        std::fs::write(&src, b"hello\n").unwrap();

        let atime = TimeSpec::new(1_600_000_000, 0);
        nix::sys::stat::utimensat(
            Some(AT_FDCWD),
            &src,
            &atime,
            &atime,
            UtimensatFlags::FollowSymlink,
        )
        .unwrap();
        let meta = fs::symlink_metadata(&src).unwrap();

        let dest = dir.path().join("out.sar");
        let mut writer = ArchiveWriter::create(
            &dest,
            CreateOptions {
                crc: true,
                nano_time: false,
                verbosity: 0,
                compressor: None,
            },
        )
        .unwrap();
        writer.add(&src).unwrap();
        writer.close().unwrap();

        let bytes = std::fs::read(&dest).unwrap();

        assert_eq!(&bytes[0..4], &[b'S', b'A', b'R', 0x00]);
        assert_eq!(bytes[4], ArchiveFlags::CRC.bits());

        let archive_mode = mode::mode_to_archive(meta.mode());
        assert_eq!(&bytes[5..7], &archive_mode.to_le_bytes());

        let size_class = SizeClass::classify(6, meta.uid(), meta.gid(), 1_600_000_000, 1_600_000_000);
        assert_eq!(bytes[7], size_class.to_byte());

        let mut cursor = 8usize;
        let mut none_gate = None;

        let mut ids = Vec::new();
        record::encode_ids(&mut ids, &mut none_gate, size_class.id, meta.uid(), meta.gid()).unwrap();
        assert_eq!(&bytes[cursor..cursor + ids.len()], &ids[..]);
        cursor += ids.len();

        let mut times = Vec::new();
        record::encode_times(&mut times, &mut none_gate, size_class.time, 1_600_000_000, 1_600_000_000).unwrap();
        assert_eq!(&bytes[cursor..cursor + times.len()], &times[..]);
        cursor += times.len();

        assert_eq!(bytes[cursor], 1);
        cursor += 1;
        assert_eq!(&bytes[cursor..cursor + 1], b"f");
        cursor += 1;

        let mut size_bytes = Vec::new();
        record::encode_size(&mut size_bytes, &mut none_gate, size_class.file, 6).unwrap();
        assert_eq!(&bytes[cursor..cursor + size_bytes.len()], &size_bytes[..]);
        cursor += size_bytes.len();

        assert_eq!(&bytes[cursor..cursor + 6], b"hello\n");
        cursor += 6;

        // Exactly one top-level entry: the rest of the stream is its
        // 4-byte trailing CRC, nothing more.
        assert_eq!(bytes.len(), cursor + 4);
    }

    #[test]
    fn hardlinked_files_emit_a_reference_record() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::write(&a, b"shared").unwrap();
        std::fs::hard_link(&a, &b).unwrap();

        std::fs::create_dir(dir.path().join("root")).unwrap();
        std::fs::rename(&a, dir.path().join("root/a")).unwrap();
        std::fs::rename(&b, dir.path().join("root/b")).unwrap();

        let dest = dir.path().join("out.sar");
        let mut writer = ArchiveWriter::create(&dest, CreateOptions::default()).unwrap();
        writer.add(&dir.path().join("root")).unwrap();
        writer.close().unwrap();

        assert!(std::fs::metadata(&dest).unwrap().len() > 0);
    }
}
