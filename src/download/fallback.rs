//! Fallback backend for hosts the native TLS stack cannot reach.
//!
//! The whole request lifecycle (DNS, modern TLS, redirects, transparent
//! decompression) runs as one blocking transfer on a general-purpose client.
//! Body bytes are staged in the caller's buffer and handed to the sink each
//! time it fills; the tail is flushed once the transfer succeeds.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{Client, redirect};
use tokio::runtime::Runtime;
use tracing::{debug, instrument};

use super::constants::MAX_REDIRECTS;
use super::error::DownloadError;
use super::sink::DownloadSink;

/// Blocking transfer through `reqwest` with redirects and decompression enabled.
#[derive(Debug, Clone)]
pub struct FallbackBackend {
    client: Client,
    runtime: Arc<Runtime>,
}

impl FallbackBackend {
    /// Builds the fallback client.
    ///
    /// Certificate verification is disabled, matching the native stack's
    /// trust policy; `connect_timeout` bounds connection setup only.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be built.
    pub fn new(
        runtime: Arc<Runtime>,
        user_agent: &str,
        connect_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(connect_timeout)
            .redirect(redirect::Policy::limited(MAX_REDIRECTS as usize))
            .gzip(true)
            .deflate(true)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self { client, runtime })
    }

    /// Downloads `url`, staging data in `buf` and flushing it through `sink`.
    ///
    /// # Errors
    ///
    /// - the sink's own error when `write` or `check_running` fails
    /// - `HttpStatus` when the server answers 4xx/5xx
    /// - `TooManyRedirects` when the redirect bound is exceeded
    /// - `Backend` for any other client failure
    #[instrument(skip(self, buf, sink), fields(url = %url, buffer = buf.len()))]
    pub fn transfer<S: DownloadSink + ?Sized>(
        &self,
        url: &str,
        buf: &mut [u8],
        sink: &mut S,
    ) -> Result<(), DownloadError> {
        let mut state = TransferState::new(buf, sink);
        let outcome = self.runtime.block_on(perform(&self.client, url, &mut state));

        if outcome.is_ok() {
            state.flush_tail();
        }
        if let Some(failure) = state.take_failure() {
            return Err(failure);
        }

        match outcome {
            Ok(()) => {
                debug!(delivered = state.delivered(), "fallback transfer complete");
                Ok(())
            }
            Err(PerformError::Aborted) => Err(DownloadError::Cancelled),
            Err(PerformError::Status(status)) => Err(DownloadError::http_status(url, status)),
            Err(PerformError::Library(error)) if error.is_redirect() => {
                Err(DownloadError::too_many_redirects(url, MAX_REDIRECTS))
            }
            Err(PerformError::Library(error)) => Err(DownloadError::backend(url, error)),
        }
    }
}

#[derive(Debug)]
enum PerformError {
    /// A hook asked the transfer to stop; the reason is in the state.
    Aborted,
    Status(u16),
    Library(reqwest::Error),
}

async fn perform<S: DownloadSink + ?Sized>(
    client: &Client,
    url: &str,
    state: &mut TransferState<'_, S>,
) -> Result<(), PerformError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(PerformError::Library)?;

    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        return Err(PerformError::Status(status.as_u16()));
    }

    let total = response.content_length().unwrap_or(0);
    let mut now = 0u64;
    if !state.on_progress(total, now) {
        return Err(PerformError::Aborted);
    }

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(PerformError::Library)?;
        now += chunk.len() as u64;
        if state.on_data(&chunk) < chunk.len() || !state.on_progress(total, now) {
            return Err(PerformError::Aborted);
        }
    }
    Ok(())
}

/// Staging buffer and hook state for one fallback transfer.
///
/// `on_data` and `on_progress` are the write and progress hooks the client
/// drives; the first sink failure is recorded and makes every later hook
/// refuse, which aborts the transfer.
#[derive(Debug)]
pub struct TransferState<'a, S: ?Sized> {
    buf: &'a mut [u8],
    pos: usize,
    delivered: u64,
    sink: &'a mut S,
    failure: Option<DownloadError>,
}

impl<'a, S: DownloadSink + ?Sized> TransferState<'a, S> {
    /// Stages into `buf` and delivers to `sink`.
    pub fn new(buf: &'a mut [u8], sink: &'a mut S) -> Self {
        Self {
            buf,
            pos: 0,
            delivered: 0,
            sink,
            failure: None,
        }
    }

    /// Write hook: stages `data`, handing the buffer to the sink each time it
    /// fills. Returns how many bytes were accepted (0 once a failure is recorded).
    pub fn on_data(&mut self, data: &[u8]) -> usize {
        if self.failure.is_some() {
            return 0;
        }
        if self.buf.is_empty() {
            return match self.sink.write(data) {
                Ok(()) => {
                    self.delivered += data.len() as u64;
                    data.len()
                }
                Err(error) => {
                    self.failure = Some(error);
                    0
                }
            };
        }

        let mut offset = 0;
        while offset < data.len() {
            let count = (data.len() - offset).min(self.buf.len() - self.pos);
            self.buf[self.pos..self.pos + count].copy_from_slice(&data[offset..offset + count]);
            self.pos += count;
            offset += count;

            if self.pos == self.buf.len() {
                let result = self.sink.write(self.buf);
                self.delivered += self.pos as u64;
                self.pos = 0;
                if let Err(error) = result {
                    self.failure = Some(error);
                    return 0;
                }
            }
        }
        data.len()
    }

    /// Progress hook: polls the sink's running check, then forwards totals.
    /// Returns `false` to abort the transfer.
    pub fn on_progress(&mut self, total: u64, now: u64) -> bool {
        if self.failure.is_some() {
            return false;
        }
        if let Err(error) = self.sink.check_running() {
            self.failure = Some(error);
            return false;
        }
        self.sink.progress(total, now);
        true
    }

    /// Hands a final partial buffer to the sink.
    pub fn flush_tail(&mut self) {
        if self.pos == 0 || self.failure.is_some() {
            return;
        }
        let result = self.sink.write(&self.buf[..self.pos]);
        self.delivered += self.pos as u64;
        self.pos = 0;
        if let Err(error) = result {
            self.failure = Some(error);
        }
    }

    /// Bytes staged but not yet handed to the sink.
    #[must_use]
    pub fn staged(&self) -> usize {
        self.pos
    }

    /// Bytes handed to the sink so far.
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Takes the recorded failure, if any.
    pub fn take_failure(&mut self) -> Option<DownloadError> {
        self.failure.take()
    }
}
