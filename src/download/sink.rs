//! Caller-side capability consumed by the download loop.

use super::error::DownloadError;

/// Receives downloaded data and steers a transfer.
///
/// Both backends call these on the downloading thread: `check_running`
/// between chunks, `write` with each filled chunk, and `progress` after it.
pub trait DownloadSink {
    /// Consumes one chunk. Returning an error stops the transfer with it.
    ///
    /// # Errors
    ///
    /// Any error the sink wants the download to fail with.
    fn write(&mut self, chunk: &[u8]) -> Result<(), DownloadError>;

    /// Polled between chunks; return an error (usually
    /// [`DownloadError::Cancelled`]) to stop the transfer.
    ///
    /// # Errors
    ///
    /// The error the download should end with.
    fn check_running(&mut self) -> Result<(), DownloadError> {
        Ok(())
    }

    /// Best-effort progress report. `total` is 0 when unknown.
    fn progress(&mut self, _total: u64, _current: u64) {}
}

impl<S: DownloadSink + ?Sized> DownloadSink for &mut S {
    fn write(&mut self, chunk: &[u8]) -> Result<(), DownloadError> {
        (**self).write(chunk)
    }

    fn check_running(&mut self) -> Result<(), DownloadError> {
        (**self).check_running()
    }

    fn progress(&mut self, total: u64, current: u64) {
        (**self).progress(total, current);
    }
}

/// Copies successive chunks into one caller buffer.
///
/// Bytes beyond the buffer's capacity are dropped without error.
#[derive(Debug)]
pub struct BufferSink<'a> {
    buf: &'a mut [u8],
    written: usize,
}

impl<'a> BufferSink<'a> {
    /// Creates a sink that fills `buf` from the start.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, written: 0 }
    }

    /// Number of bytes copied so far.
    #[must_use]
    pub fn written(&self) -> usize {
        self.written
    }
}

impl DownloadSink for BufferSink<'_> {
    fn write(&mut self, chunk: &[u8]) -> Result<(), DownloadError> {
        let count = chunk.len().min(self.buf.len() - self.written);
        self.buf[self.written..self.written + count].copy_from_slice(&chunk[..count]);
        self.written += count;
        Ok(())
    }
}
