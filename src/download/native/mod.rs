//! Abstraction over the platform-native HTTP stack.
//!
//! The console exposes HTTP as a small set of blocking, context-based calls:
//! open a context for a URL, set options and headers, begin the request, read
//! the status with a timeout, query response headers, and pull the body into
//! caller buffers one timeout-bounded receive at a time. [`NativeHttp`] and
//! [`NativeRequest`] mirror that surface so the transport session can follow
//! redirects and decode content itself, independent of what implements it.
//!
//! [`ReqwestStack`] is the production implementation used off-console.

mod reqwest_stack;

use std::time::Duration;

use thiserror::Error;

pub use reqwest_stack::{ReqwestRequest, ReqwestStack};

/// Errors reported by the native HTTP stack.
#[derive(Debug, Error)]
pub enum NativeError {
    /// The TLS handshake failed verification; the host needs a more capable TLS stack.
    #[error("TLS verification failed: {message}")]
    TlsVerifyFailed {
        /// Diagnostic from the TLS layer.
        message: String,
    },

    /// A blocking call did not complete within its timeout.
    #[error("timed out after {after:?}")]
    Timeout {
        /// The timeout that elapsed.
        after: Duration,
    },

    /// The URL cannot be opened as a request context.
    #[error("invalid request URL: {url}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
    },

    /// A required response header was absent.
    #[error("response header {name} not found")]
    HeaderNotFound {
        /// The requested header name.
        name: String,
    },

    /// The context was used out of order (e.g. status before begin).
    #[error("request context used out of order: {reason}")]
    InvalidState {
        /// What was attempted.
        reason: &'static str,
    },

    /// Connection, send or body-read failure.
    #[error("request failed: {source}")]
    Request {
        /// The underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The stack's I/O driver could not be started.
    #[error("failed to start I/O driver: {source}")]
    Runtime {
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl NativeError {
    /// Whether this is the distinguished TLS-verification failure.
    #[must_use]
    pub fn is_tls_verify_failure(&self) -> bool {
        matches!(self, Self::TlsVerifyFailed { .. })
    }
}

/// Outcome of one [`NativeRequest::receive`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveStatus {
    /// The whole body has been received.
    Complete,
    /// The buffer filled (or the call returned early) and more body remains.
    Pending,
}

/// Byte counters for the body of an open request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DownloadState {
    /// Body bytes received so far, as transferred on the wire.
    pub downloaded: u64,
    /// Advertised body size; 0 when the server did not announce one.
    pub total: u64,
}

/// Factory for request contexts on the native stack.
pub trait NativeHttp {
    /// The request context type produced by [`NativeHttp::open`].
    type Request: NativeRequest;

    /// Opens a GET request context for `url`. Nothing is sent yet.
    ///
    /// # Errors
    ///
    /// Returns [`NativeError::InvalidUrl`] when the URL cannot be used.
    fn open(&self, url: &str) -> Result<Self::Request, NativeError>;
}

/// One request context on the native stack.
///
/// Calls are expected in order: options and headers, [`begin`](Self::begin),
/// [`status`](Self::status), then headers and body reads. Dropping a context
/// releases it; [`close`](Self::close) does the same but reports failure.
pub trait NativeRequest {
    /// Disables certificate verification for this request.
    ///
    /// # Errors
    ///
    /// Returns an error if the option cannot be applied.
    fn disable_verify(&mut self) -> Result<(), NativeError>;

    /// Adds a request header.
    ///
    /// # Errors
    ///
    /// Returns an error if the header is rejected.
    fn add_header(&mut self, name: &str, value: &str) -> Result<(), NativeError>;

    /// Enables or disables connection keep-alive.
    ///
    /// # Errors
    ///
    /// Returns an error if the option cannot be applied.
    fn set_keep_alive(&mut self, enabled: bool) -> Result<(), NativeError>;

    /// Sends the request.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be started.
    fn begin(&mut self) -> Result<(), NativeError>;

    /// Waits up to `timeout` for the response status line.
    ///
    /// # Errors
    ///
    /// Returns [`NativeError::Timeout`] when the status does not arrive in
    /// time and [`NativeError::TlsVerifyFailed`] when the handshake is refused.
    fn status(&mut self, timeout: Duration) -> Result<u16, NativeError>;

    /// Reads a response header.
    ///
    /// # Errors
    ///
    /// Returns [`NativeError::HeaderNotFound`] when the header is absent.
    fn header(&self, name: &str) -> Result<String, NativeError>;

    /// Receives body bytes into `buf`, blocking at most `timeout` per wait.
    ///
    /// The number of bytes written is observable through
    /// [`download_state`](Self::download_state).
    ///
    /// # Errors
    ///
    /// Returns [`NativeError::Timeout`] or a request error.
    fn receive(&mut self, buf: &mut [u8], timeout: Duration)
    -> Result<ReceiveStatus, NativeError>;

    /// Current body counters.
    ///
    /// # Errors
    ///
    /// Returns an error if the request has not produced a response yet.
    fn download_state(&self) -> Result<DownloadState, NativeError>;

    /// Releases the context.
    ///
    /// # Errors
    ///
    /// Returns an error if the stack fails to release it cleanly.
    fn close(self) -> Result<(), NativeError>;
}
