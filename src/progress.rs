//! Progress UI for a single download.

use std::io::Write;

use hbfetch_core::{DownloadError, DownloadSink};
use indicatif::{ProgressBar, ProgressStyle};

/// Sink that writes chunks to `out` and drives a progress bar on stderr.
pub(crate) struct ProgressSink<W: Write> {
    out: W,
    bar: ProgressBar,
}

impl<W: Write> ProgressSink<W> {
    /// Creates the sink; a hidden bar is used when `show` is false.
    pub(crate) fn new(out: W, show: bool) -> Self {
        let bar = if show {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::with_template(
                    "{spinner} [{elapsed_precise}] {bar:30} {bytes}/{total_bytes} {bytes_per_sec}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar
        } else {
            ProgressBar::hidden()
        };
        Self { out, bar }
    }

    /// Flushes the output and clears the bar.
    pub(crate) fn finish(mut self) -> std::io::Result<()> {
        self.bar.finish_and_clear();
        self.out.flush()
    }
}

impl<W: Write> DownloadSink for ProgressSink<W> {
    fn write(&mut self, chunk: &[u8]) -> Result<(), DownloadError> {
        self.out
            .write_all(chunk)
            .map_err(|e| DownloadError::sink(e.to_string()))
    }

    fn progress(&mut self, total: u64, current: u64) {
        // Compressed bodies advertise their encoded size; let the bar grow.
        if total > 0 {
            self.bar.set_length(total.max(current));
        }
        self.bar.set_position(current);
    }
}
