//! hbfetch Core Library
//!
//! This library provides resilient HTTP content retrieval for a handheld
//! homebrew title manager: a blocking, bounded-memory downloader that runs
//! over the console's native HTTP stack and falls back to a general-purpose
//! client when the native TLS stack cannot talk to a host.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`download`] - Redirects, decompression, transport sessions, fallback and orchestration
//! - [`seed`] - Per-title seed lookup on the SD volume with network fallback

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;
pub mod seed;
#[cfg(test)]
pub(crate) mod test_support;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use download::{
    Backend, BufferSink, ContentEncoding, DEFAULT_BUFFER_SIZE, DownloadError, DownloadOptions,
    DownloadSink, FallbackBackend, HttpClient, MAX_REDIRECTS, NativeError, NativeHttp,
    NativeRequest, ReceiveStatus, ReqwestStack, TransferState, TransportSession,
    resolve_redirect,
};
pub use seed::{
    Region, SEED_CDN, SEED_SIZE, SeedFetcher, VolumeGuard, VolumeRegistry, seed_path, seed_url,
};
