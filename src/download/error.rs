//! Error types for the download module.
//!
//! Every failure in the pipeline is returned as a [`DownloadError`]; nothing
//! panics and nothing is retried at this layer.

use std::path::PathBuf;

use thiserror::Error;

use super::native::NativeError;

/// Errors that can occur while downloading.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// A caller-supplied argument was empty, zero or otherwise unusable.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// What was wrong with the argument.
        reason: String,
    },

    /// A working buffer or decoder could not be allocated.
    #[error("out of memory allocating {requested} bytes")]
    OutOfMemory {
        /// The allocation size that was refused.
        requested: usize,
    },

    /// The server answered with a non-success status.
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The redirect bound was exceeded.
    #[error("too many redirects (limit {limit}) downloading {url}")]
    TooManyRedirects {
        /// The URL that started the redirect chain.
        url: String,
        /// The configured redirect bound.
        limit: u32,
    },

    /// The native HTTP stack failed (open, send, header read, receive, timeout).
    #[error("transport error downloading {url}: {source}")]
    Transport {
        /// The URL being requested when the failure happened.
        url: String,
        /// The underlying native-stack error.
        #[source]
        source: NativeError,
    },

    /// The fallback client library failed.
    #[error("fallback client error downloading {url}: {source}")]
    Backend {
        /// The URL that failed to download.
        url: String,
        /// The underlying client library error.
        #[source]
        source: reqwest::Error,
    },

    /// The compressed body could not be inflated.
    #[error("corrupt compressed body from {url}: {message}")]
    Decompress {
        /// The URL that served the body.
        url: String,
        /// Decoder diagnostic.
        message: String,
    },

    /// A body expected to hold structured data did not parse.
    #[error("failed to parse response from {url}: {source}")]
    Parse {
        /// The URL that served the body.
        url: String,
        /// The parser error.
        #[source]
        source: serde_json::Error,
    },

    /// A configuration value is outside the supported set.
    #[error("{what} is out of range")]
    OutOfRange {
        /// Description of the offending value.
        what: String,
    },

    /// The response did not have the expected size.
    #[error("bad data: expected {expected} bytes, got {actual}")]
    BadData {
        /// Expected size in bytes.
        expected: usize,
        /// Actual size in bytes.
        actual: usize,
    },

    /// The caller asked for the transfer to stop.
    #[error("download cancelled")]
    Cancelled,

    /// A data sink could not consume a chunk.
    #[error("data sink failed: {reason}")]
    Sink {
        /// Sink-provided description.
        reason: String,
    },

    /// File system error on a local path.
    #[error("IO error on {path}: {source}")]
    Io {
        /// The path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a redirect-bound error.
    pub fn too_many_redirects(url: impl Into<String>, limit: u32) -> Self {
        Self::TooManyRedirects {
            url: url.into(),
            limit,
        }
    }

    /// Creates a native transport error.
    pub fn transport(url: impl Into<String>, source: NativeError) -> Self {
        Self::Transport {
            url: url.into(),
            source,
        }
    }

    /// Creates a fallback client error.
    pub fn backend(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Backend {
            url: url.into(),
            source,
        }
    }

    /// Creates a decompression error.
    pub fn decompress(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decompress {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a parse error.
    pub fn parse(url: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Parse {
            url: url.into(),
            source,
        }
    }

    /// Creates an out-of-range error.
    pub fn out_of_range(what: impl Into<String>) -> Self {
        Self::OutOfRange { what: what.into() }
    }

    /// Creates a sink failure.
    pub fn sink(reason: impl Into<String>) -> Self {
        Self::Sink {
            reason: reason.into(),
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns the HTTP status carried by this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the native stack rejected the host's TLS handshake.
    #[must_use]
    pub fn is_tls_verify_failure(&self) -> bool {
        matches!(self, Self::Transport { source, .. } if source.is_tls_verify_failure())
    }
}

// Variants carry context (url, path) the source errors don't have, so there
// are no blanket `From` impls; use the constructors above.
