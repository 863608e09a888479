//! Shared helpers for integration tests.
//!
//! The download API blocks, so tests run it on the test thread while the
//! wiremock server is started and configured on a runtime the test owns.

#![allow(dead_code, clippy::unwrap_used)]

pub mod socket_guard;

use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;
use hbfetch_core::{DownloadError, DownloadSink};
use tokio::runtime::Runtime;
use wiremock::{Mock, MockServer};

/// A wiremock server plus the runtime used to talk to it.
pub struct MockHost {
    // Declared first so it drops before the runtime.
    server: MockServer,
    runtime: Runtime,
}

impl MockHost {
    /// Starts a server, or returns `None` when sockets are unavailable.
    #[track_caller]
    pub fn start_or_skip() -> Option<Self> {
        if socket_guard::should_skip_socket_bound_test() {
            return None;
        }
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let server = runtime.block_on(MockServer::start());
        Some(Self { server, runtime })
    }

    pub fn mount(&self, mock: Mock) {
        self.runtime.block_on(mock.mount(&self.server));
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.server.uri())
    }

    pub fn received_requests(&self) -> Vec<wiremock::Request> {
        self.runtime
            .block_on(self.server.received_requests())
            .unwrap_or_default()
    }
}

/// Deterministic, moderately compressible text of exactly `len` bytes.
pub fn sample_text(len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len + 32);
    let mut n: u32 = 0;
    while out.len() < len {
        n = n.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        out.extend_from_slice(format!("title {:05} seed {:04x}\n", n % 100_000, n >> 20).as_bytes());
    }
    out.truncate(len);
    out
}

pub fn gzip_bytes(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Sink that records chunks and progress, optionally cancelling.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub chunks: Vec<Vec<u8>>,
    pub progress: Vec<(u64, u64)>,
    pub checks: usize,
    /// Report cancellation once this many checks have passed.
    pub cancel_after_checks: Option<usize>,
}

impl CollectingSink {
    pub fn body(&self) -> Vec<u8> {
        self.chunks.concat()
    }
}

impl DownloadSink for CollectingSink {
    fn write(&mut self, chunk: &[u8]) -> Result<(), DownloadError> {
        self.chunks.push(chunk.to_vec());
        Ok(())
    }

    fn check_running(&mut self) -> Result<(), DownloadError> {
        if self.cancel_after_checks == Some(self.checks) {
            return Err(DownloadError::Cancelled);
        }
        self.checks += 1;
        Ok(())
    }

    fn progress(&mut self, total: u64, current: u64) {
        self.progress.push((total, current));
    }
}
