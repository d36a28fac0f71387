//! Bridges the archive stream through an external compressor process.
//!
//! The writer pipes its output through `compressor`'s stdin and lets its
//! stdout go straight to the destination file; the reader does the mirror
//! image, running `compressor -d` with the archive file as stdin and
//! reading the decompressed stream back from its stdout. Compression is
//! opt-in: a `None` compressor means the archive stream is used directly.

use std::fs::File;
use std::process::{Child, Command, Stdio};

use crate::error::{Error, Result};
use crate::io::{InputSource, OutputSink};

/// A spawned compressor child, if any, kept around so `close` can wait on it.
pub struct CompressorWriter {
    child: Option<Child>,
    exe: String,
}

impl CompressorWriter {
    /// Opens `dest` for writing and, if `compressor` is set, routes the
    /// returned sink through a spawned `compressor` child's stdin.
    pub fn open(dest: File, compressor: Option<&str>) -> Result<(Self, OutputSink)> {
        let Some(exe) = compressor else {
            return Ok((Self { child: None, exe: String::new() }, OutputSink::File(dest)));
        };

        let mut child = Command::new(exe)
            .stdin(Stdio::piped())
            .stdout(Stdio::from(dest))
            .spawn()
            .map_err(|e| Error::CompressorSpawn(exe.to_string(), e))?;

        let stdin = child.stdin.take().expect("piped stdin");
        Ok((
            Self {
                child: Some(child),
                exe: exe.to_string(),
            },
            OutputSink::Pipe(stdin),
        ))
    }

    /// Drops the sink (closing the pipe so the child sees EOF) and waits
    /// for it to exit, treating a non-zero status as fatal.
    pub fn close(mut self, sink: OutputSink) -> Result<()> {
        drop(sink);
        if let Some(mut child) = self.child.take() {
            let status = child.wait()?;
            if !status.success() {
                return Err(Error::CompressorFailed(self.exe.clone(), status));
            }
        }
        Ok(())
    }
}

pub struct CompressorReader {
    child: Option<Child>,
    exe: String,
}

impl CompressorReader {
    /// Opens `src` for reading and, if `compressor` is set, runs
    /// `compressor -d` with `src` as stdin, returning its stdout as the
    /// archive source.
    pub fn open(src: File, compressor: Option<&str>) -> Result<(Self, InputSource)> {
        let Some(exe) = compressor else {
            return Ok((Self { child: None, exe: String::new() }, InputSource::File(src)));
        };

        let mut child = Command::new(exe)
            .arg("-d")
            .stdin(Stdio::from(src))
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| Error::CompressorSpawn(exe.to_string(), e))?;

        let stdout = child.stdout.take().expect("piped stdout");
        Ok((
            Self {
                child: Some(child),
                exe: exe.to_string(),
            },
            InputSource::Pipe(stdout),
        ))
    }

    pub fn close(mut self, source: InputSource) -> Result<()> {
        drop(source);
        if let Some(mut child) = self.child.take() {
            let status = child.wait()?;
            if !status.success() {
                return Err(Error::CompressorFailed(self.exe.clone(), status));
            }
        }
        Ok(())
    }
}
