//! Download orchestrator.
//!
//! [`HttpClient`] opens a transport session on the native stack and pumps it
//! into a [`DownloadSink`]. When the native stack cannot complete a TLS
//! handshake the whole request is handed to the [`FallbackBackend`] instead.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use super::constants::{DEFAULT_BUFFER_SIZE, MAX_BUFFER_SIZE, TIMEOUT};
use super::error::DownloadError;
use super::fallback::FallbackBackend;
use super::native::{NativeError, NativeHttp, NativeRequest, ReqwestStack};
use super::session::TransportSession;
use super::sink::{BufferSink, DownloadSink};
use super::slab::alloc_zeroed;
use crate::user_agent;

/// Tunables shared by every download a client performs.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Working buffer size used by the buffer and JSON wrappers.
    pub buffer_size: usize,
    /// Per-call timeout for native receives; also the fallback connect timeout.
    pub timeout: Duration,
    /// Whether the native stack sends `User-Agent`. The fallback always does.
    pub send_user_agent: bool,
    /// The `User-Agent` value.
    pub user_agent: String,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            timeout: TIMEOUT,
            send_user_agent: true,
            user_agent: user_agent::default_user_agent(),
        }
    }
}

/// Which backend served a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// The native stack, through a [`TransportSession`].
    Primary,
    /// The general-purpose client, used when the native TLS handshake fails.
    Fallback,
}

impl Backend {
    /// The backend to retry with after the primary open failed with `error`,
    /// or `None` when the failure is terminal.
    #[must_use]
    pub fn after_open_failure(error: &DownloadError) -> Option<Self> {
        error.is_tls_verify_failure().then_some(Self::Fallback)
    }
}

/// Blocking downloader over the native stack with a fallback backend.
///
/// Every call blocks the current thread; do not call from inside an async
/// runtime.
///
/// # Example
///
/// ```no_run
/// use hbfetch_core::{BufferSink, HttpClient};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::try_new()?;
/// let mut buf = vec![0u8; 4096];
/// let size = client.download_to_buffer("http://example.com/list.json", &mut buf)?;
/// println!("downloaded {size} bytes");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct HttpClient<H: NativeHttp = ReqwestStack> {
    native: H,
    fallback: FallbackBackend,
    options: DownloadOptions,
}

impl HttpClient<ReqwestStack> {
    /// Creates a client with default options.
    ///
    /// # Panics
    ///
    /// Panics if the I/O runtime or the HTTP clients cannot be built. Use
    /// [`try_new`](Self::try_new) to handle that instead.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self::try_new().expect("failed to build HTTP client with static configuration")
    }

    /// Creates a client with default options.
    ///
    /// # Errors
    ///
    /// Returns an error if the I/O runtime or the HTTP clients cannot be built.
    pub fn try_new() -> Result<Self, NativeError> {
        Self::with_options(DownloadOptions::default())
    }

    /// Creates a client with `options`; both backends share one I/O runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the I/O runtime or the HTTP clients cannot be built.
    pub fn with_options(options: DownloadOptions) -> Result<Self, NativeError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|source| NativeError::Runtime { source })?;
        let runtime = Arc::new(runtime);

        let native = ReqwestStack::with_runtime(Arc::clone(&runtime))?;
        let fallback = FallbackBackend::new(runtime, &options.user_agent, options.timeout)
            .map_err(|source| NativeError::Request { source })?;
        Ok(Self::with_backends(native, fallback, options))
    }
}

impl Default for HttpClient<ReqwestStack> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: NativeHttp> HttpClient<H> {
    /// Assembles a client from explicit backends.
    #[must_use]
    pub fn with_backends(native: H, fallback: FallbackBackend, options: DownloadOptions) -> Self {
        Self {
            native,
            fallback,
            options,
        }
    }

    /// The native stack requests are opened on.
    #[must_use]
    pub fn native(&self) -> &H {
        &self.native
    }

    /// The options this client was built with.
    #[must_use]
    pub fn options(&self) -> &DownloadOptions {
        &self.options
    }

    /// Downloads `url` into `sink`, staging chunks in a `buffer_size` buffer.
    ///
    /// Returns the backend that served the transfer.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an empty URL
    /// - `OutOfMemory` when `buffer_size` is zero, above [`MAX_BUFFER_SIZE`],
    ///   or cannot be allocated
    /// - any open, read, decompression or backend error
    /// - whatever the sink returns from `write` or `check_running`
    /// - a close failure after an otherwise successful transfer
    #[instrument(skip(self, sink), fields(url = %url))]
    pub fn download<S: DownloadSink + ?Sized>(
        &self,
        url: &str,
        buffer_size: usize,
        sink: &mut S,
    ) -> Result<Backend, DownloadError> {
        if url.is_empty() {
            return Err(DownloadError::invalid_argument("URL must not be empty"));
        }
        let mut buf = allocate_buffer(buffer_size)?;

        let user_agent = self
            .options
            .send_user_agent
            .then_some(self.options.user_agent.as_str());
        let mut session =
            match TransportSession::open(&self.native, url, user_agent, self.options.timeout) {
                Ok(session) => session,
                Err(error) => {
                    return match Backend::after_open_failure(&error) {
                        Some(Backend::Fallback) => {
                            warn!(error = %error, "native TLS failed, using fallback backend");
                            self.fallback.transfer(url, &mut buf, sink)?;
                            Ok(Backend::Fallback)
                        }
                        _ => Err(error),
                    };
                }
            };

        let pumped = pump(&mut session, &mut buf, sink);
        let closed = session.close();
        match (pumped, closed) {
            (Ok(delivered), Ok(())) => {
                info!(delivered, "download complete");
                Ok(Backend::Primary)
            }
            (Ok(_), Err(error)) => {
                warn!(error = %error, "close failed after transfer");
                Err(error)
            }
            (Err(error), _) => Err(error),
        }
    }

    /// Downloads `url` into `dest`, returning how many bytes were copied.
    ///
    /// Bytes beyond `dest.len()` are dropped without error.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`download`](Self::download).
    pub fn download_to_buffer(&self, url: &str, dest: &mut [u8]) -> Result<usize, DownloadError> {
        let buffer_size = dest.len().clamp(1, self.options.buffer_size.max(1));
        let mut sink = BufferSink::new(dest);
        self.download(url, buffer_size, &mut sink)?;
        Ok(sink.written())
    }

    /// Downloads at most `max_size` bytes from `url` and parses them as JSON.
    ///
    /// # Errors
    ///
    /// Returns `Parse` when the body is not valid JSON (including a body cut
    /// short by `max_size`), or the same errors as [`download`](Self::download).
    pub fn download_json(
        &self,
        url: &str,
        max_size: usize,
    ) -> Result<serde_json::Value, DownloadError> {
        self.download_json_as(url, max_size)
    }

    /// Like [`download_json`](Self::download_json), deserializing into `T`.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`download_json`](Self::download_json).
    pub fn download_json_as<T: DeserializeOwned>(
        &self,
        url: &str,
        max_size: usize,
    ) -> Result<T, DownloadError> {
        let mut text = allocate_buffer(max_size)?;
        let size = self.download_to_buffer(url, &mut text)?;
        debug!(url = %url, size, "parsing JSON body");
        serde_json::from_slice(&text[..size]).map_err(|source| DownloadError::parse(url, source))
    }
}

/// Moves the session's body into `sink` one buffer at a time.
fn pump<R, S>(
    session: &mut TransportSession<R>,
    buf: &mut [u8],
    sink: &mut S,
) -> Result<u64, DownloadError>
where
    R: NativeRequest,
    S: DownloadSink + ?Sized,
{
    let total = session.content_length()?;
    sink.progress(total, 0);

    // The advertised length of a compressed body is its encoded size.
    let bounded = !session.is_compressed() && total > 0;
    let mut delivered = 0u64;

    while !session.is_finished() && (!bounded || delivered < total) {
        sink.check_running()?;

        let window = if bounded {
            usize::try_from(total - delivered).map_or(buf.len(), |rest| rest.min(buf.len()))
        } else {
            buf.len()
        };
        let size = session.read(&mut buf[..window])?;
        if size == 0 {
            continue;
        }

        sink.write(&buf[..size])?;
        delivered += size as u64;
        sink.progress(total, delivered);
    }
    Ok(delivered)
}

fn allocate_buffer(size: usize) -> Result<Vec<u8>, DownloadError> {
    if size == 0 || size > MAX_BUFFER_SIZE {
        return Err(DownloadError::OutOfMemory { requested: size });
    }
    alloc_zeroed(size)
}
