//! Bounded-memory HTTP downloads over the native stack with a fallback client.
//!
//! This module provides blocking downloads that stream a response body
//! through a caller-sized buffer into a [`DownloadSink`].
//!
//! # Features
//!
//! - Manual `301`/`302`/`303` redirect following (bounded by [`MAX_REDIRECTS`])
//! - `gzip`/`deflate` bodies decoded through a fixed 32 KiB input slab
//! - Fallback to a general-purpose client when the native TLS handshake fails
//! - Cooperative cancellation and progress through the sink
//! - Buffer and JSON convenience wrappers
//!
//! # Example
//!
//! ```no_run
//! use hbfetch_core::download::HttpClient;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::try_new()?;
//! let doc = client.download_json("https://example.com/titles.json", 64 * 1024)?;
//! println!("{doc}");
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod error;
mod fallback;
mod inflate;
mod native;
mod redirect;
mod session;
mod sink;
mod slab;

pub use client::{Backend, DownloadOptions, HttpClient};
pub use constants::{
    DEFAULT_BUFFER_SIZE, MAX_BUFFER_SIZE, MAX_REDIRECTS, SESSION_BUFFER_SIZE, TIMEOUT,
    TIMEOUT_SECS, URL_CAPACITY,
};
pub use error::DownloadError;
pub use fallback::{FallbackBackend, TransferState};
pub use inflate::ContentEncoding;
pub use native::{
    DownloadState, NativeError, NativeHttp, NativeRequest, ReceiveStatus, ReqwestRequest,
    ReqwestStack,
};
pub use redirect::resolve_redirect;
pub use session::TransportSession;
pub use sink::{BufferSink, DownloadSink};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
