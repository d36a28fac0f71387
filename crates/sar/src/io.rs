//! Streaming I/O primitives shared by the writer and the reader: short-read
//! safe `read_exact`/`write_exact`, a CRC-gated variant of each, and a
//! forward-skip that seeks when the underlying source is a real file and
//! falls back to a discard-read loop when it is a pipe.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::process::{ChildStdin, ChildStdout};

use crate::crc32::Crc32;
use crate::error::{Error, Result};

/// Single read/write call is capped at this many bytes, so a 4 GiB file
/// streams in bounded-memory chunks rather than needing an intermediate
/// buffer sized to the whole payload.
pub const CHUNK_SIZE: usize = 64 * 1024;
const DISCARD_BUF_SIZE: usize = 32 * 1024;

/// Reads until `buf` is full, looping over short reads. A zero-length read
/// before `buf` is full means the stream ended early.
pub fn read_exact<R: Read + ?Sized>(r: &mut R, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = r.read(&mut buf[filled..])?;
        if n == 0 {
            return Err(Error::ShortRead);
        }
        filled += n;
    }
    Ok(())
}

/// Writes all of `buf`, looping over short writes.
pub fn write_exact<W: Write + ?Sized>(w: &mut W, buf: &[u8]) -> Result<()> {
    let mut written = 0;
    while written < buf.len() {
        let n = w.write(&buf[written..])?;
        if n == 0 {
            return Err(Error::ShortRead);
        }
        written += n;
    }
    Ok(())
}

/// Reads `buf`, additionally folding the bytes into `gate` when it's `Some`.
pub fn read_exact_gated<R: Read + ?Sized>(r: &mut R, buf: &mut [u8], gate: &mut Option<Crc32>) -> Result<()> {
    read_exact(r, buf)?;
    if let Some(crc) = gate {
        crc.update(buf);
    }
    Ok(())
}

/// Writes `buf`, additionally folding the bytes into `gate` when it's `Some`.
pub fn write_exact_gated<W: Write + ?Sized>(w: &mut W, buf: &[u8], gate: &mut Option<Crc32>) -> Result<()> {
    write_exact(w, buf)?;
    if let Some(crc) = gate {
        crc.update(buf);
    }
    Ok(())
}

/// Copies exactly `len` bytes from `r` to `w` in bounded chunks, optionally
/// accumulating a running CRC over what was copied.
pub fn copy_n_gated<R: Read + ?Sized, W: Write + ?Sized>(
    r: &mut R,
    w: &mut W,
    mut len: u64,
    gate: &mut Option<Crc32>,
) -> Result<()> {
    let mut buf = [0u8; CHUNK_SIZE];
    while len > 0 {
        let chunk = len.min(CHUNK_SIZE as u64) as usize;
        read_exact(r, &mut buf[..chunk])?;
        if let Some(crc) = gate {
            crc.update(&buf[..chunk]);
        }
        write_exact(w, &buf[..chunk])?;
        len -= chunk as u64;
    }
    Ok(())
}

/// Advances past `n` bytes without keeping them, for the reader's
/// directory-listing mode.
pub fn skip_forward<R: Read + ?Sized>(r: &mut R, mut n: u64) -> Result<()> {
    let mut buf = [0u8; DISCARD_BUF_SIZE];
    while n > 0 {
        let chunk = n.min(DISCARD_BUF_SIZE as u64) as usize;
        let read = r.read(&mut buf[..chunk])?;
        if read == 0 {
            return Err(Error::ShortRead);
        }
        n -= read as u64;
    }
    Ok(())
}

/// An archive's byte source: a plain file (seekable, so skipping is a real
/// seek) or the stdout of a decompressor child / process stdin (not
/// seekable, so skipping reads and discards).
pub enum InputSource {
    File(std::fs::File),
    Pipe(ChildStdout),
    Stdin(io::Stdin),
}

impl Read for InputSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            InputSource::File(f) => f.read(buf),
            InputSource::Pipe(p) => p.read(buf),
            InputSource::Stdin(s) => s.read(buf),
        }
    }
}

impl InputSource {
    /// Skips `n` bytes, seeking when possible and discard-reading otherwise.
    pub fn skip(&mut self, n: u64) -> Result<()> {
        match self {
            InputSource::File(f) => {
                f.seek(SeekFrom::Current(i64::try_from(n).unwrap_or(i64::MAX)))?;
                Ok(())
            }
            InputSource::Pipe(p) => skip_forward(p, n),
            InputSource::Stdin(s) => skip_forward(s, n),
        }
    }
}

/// An archive's byte destination: a plain file or the stdin of a compressor
/// child / process stdout.
pub enum OutputSink {
    File(std::fs::File),
    Pipe(ChildStdin),
    Stdout(io::Stdout),
}

impl Write for OutputSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputSink::File(f) => f.write(buf),
            OutputSink::Pipe(p) => p.write(buf),
            OutputSink::Stdout(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputSink::File(f) => f.flush(),
            OutputSink::Pipe(p) => p.flush(),
            OutputSink::Stdout(s) => s.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn read_exact_loops_over_short_reads() {
        struct OneByteAtATime(Cursor<Vec<u8>>);
        impl Read for OneByteAtATime {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                self.0.read(&mut buf[..1.min(buf.len())])
            }
        }

        let mut src = OneByteAtATime(Cursor::new(vec![1, 2, 3, 4]));
        let mut out = [0u8; 4];
        read_exact(&mut src, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn read_exact_errors_on_premature_eof() {
        let mut src = Cursor::new(vec![1, 2]);
        let mut out = [0u8; 4];
        assert!(matches!(read_exact(&mut src, &mut out), Err(Error::ShortRead)));
    }

    #[test]
    fn copy_n_gated_accumulates_crc() {
        let mut src = Cursor::new(vec![b'a'; 10]);
        let mut dst = Vec::new();
        let mut gate = Some(Crc32::new());
        copy_n_gated(&mut src, &mut dst, 10, &mut gate).unwrap();
        assert_eq!(dst.len(), 10);
        assert_eq!(gate.unwrap().finish(), crate::crc32::update(0, &[b'a'; 10]));
    }

    #[test]
    fn skip_forward_consumes_exact_count() {
        let mut src = Cursor::new(vec![0u8; 100]);
        skip_forward(&mut src, 40).unwrap();
        let mut rest = Vec::new();
        src.read_to_end(&mut rest).unwrap();
        assert_eq!(rest.len(), 60);
    }
}
