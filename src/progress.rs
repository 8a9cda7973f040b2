//! Byte-based progress tracking for the input side of a run.

use std::io::Read;

/// A reader wrapper that tracks bytes read and calls a progress callback.
///
/// Wraps the raw (still compressed) input file so the callback reports
/// positions that match the on-disk file size.
pub struct ProgressReader<R: Read> {
    reader: R,
    callback: Box<dyn FnMut(u64)>,
    bytes_read: u64,
}

impl<R: Read> ProgressReader<R> {
    /// The callback receives the total bytes read so far after each
    /// successful read operation.
    pub fn new<F>(reader: R, callback: F) -> Self
    where
        F: FnMut(u64) + 'static,
    {
        Self {
            reader,
            callback: Box::new(callback),
            bytes_read: 0,
        }
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.reader.read(buf)?;
        self.bytes_read += n as u64;
        (self.callback)(self.bytes_read);
        Ok(n)
    }
}
