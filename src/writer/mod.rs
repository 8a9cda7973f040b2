//! Output sink that pipes file content through an external filter process.
//!
//! Each output file gets its own child process (default `gzip -1`) whose
//! stdout is attached directly to the file on disk. Content is fed to the
//! child's stdin; the OS pipe buffer provides backpressure, so a slow
//! compressor throttles the whole scan. A writer must be finished before the
//! next section is processed — dropping an unfinished writer kills and reaps
//! the child so no process or half-written pipe leaks.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use crate::error::SplitError;

pub const WRITER_BUFFER_SIZE: usize = 256 * 1024;

/// Map a filter program name to its conventional file extension.
pub fn filter_extension(command: &str) -> &'static str {
    match command.split_whitespace().next().unwrap_or("") {
        "gzip" | "pigz" => ".gz",
        "bzip2" | "pbzip2" => ".bz2",
        "lzop" => ".lzo",
        "xz" => ".xz",
        "lzma" => ".lzma",
        "zstd" | "pzstd" => ".zst",
        _ => "",
    }
}

/// A single output file fed through a filter child process.
pub struct FilterWriter {
    command: String,
    path: PathBuf,
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    finished: bool,
}

impl FilterWriter {
    /// Open `path` truncated and spawn the filter in front of it.
    pub fn create(command: &str, path: &Path) -> Result<Self, SplitError> {
        Self::open(command, path, false)
    }

    /// Open `path` for appending. Stream compressors emit concatenable
    /// members, so appending another filtered block keeps the file valid.
    pub fn append(command: &str, path: &Path) -> Result<Self, SplitError> {
        Self::open(command, path, true)
    }

    fn open(command: &str, path: &Path, append: bool) -> Result<Self, SplitError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| SplitError::OutputIo {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        let file = if append {
            OpenOptions::new().create(true).append(true).open(path)
        } else {
            File::create(path)
        }
        .map_err(|source| SplitError::OutputIo {
            path: path.to_path_buf(),
            source,
        })?;

        // The command is a full shell line ("gzip -1", "zstd -T0 -3", ...).
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(file)
            .spawn()
            .map_err(|e| SplitError::FilterProcess {
                command: command.to_string(),
                reason: format!("spawn failed: {e}"),
            })?;
        let stdin = child
            .stdin
            .take()
            .map(|s| BufWriter::with_capacity(WRITER_BUFFER_SIZE, s));

        Ok(Self {
            command: command.to_string(),
            path: path.to_path_buf(),
            child,
            stdin,
            finished: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_all(&mut self, chunk: &[u8]) -> Result<(), SplitError> {
        if let Some(stdin) = self.stdin.as_mut() {
            stdin
                .write_all(chunk)
                .map_err(|source| SplitError::OutputIo {
                    path: self.path.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Close the child's stdin, wait for it, and check its exit status.
    pub fn finish(mut self) -> Result<(), SplitError> {
        if let Some(stdin) = self.stdin.take() {
            let inner = stdin.into_inner().map_err(|e| SplitError::OutputIo {
                path: self.path.clone(),
                source: e.into_error(),
            })?;
            drop(inner); // EOF lets the filter flush and exit
        }
        let status = self.child.wait().map_err(|e| SplitError::FilterProcess {
            command: self.command.clone(),
            reason: format!("wait failed: {e}"),
        })?;
        self.finished = true;
        if !status.success() {
            return Err(SplitError::FilterProcess {
                command: self.command.clone(),
                reason: format!("exited with {status}"),
            });
        }
        Ok(())
    }
}

impl Drop for FilterWriter {
    fn drop(&mut self) {
        if !self.finished {
            drop(self.stdin.take());
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
