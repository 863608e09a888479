//! Shared helpers for unit tests: a scripted native stack and body codecs.

#![allow(clippy::unwrap_used)]

mod scripted;

use std::io::Write;

use flate2::Compression;
use flate2::write::{DeflateEncoder, GzEncoder, ZlibEncoder};

pub(crate) use scripted::{ScriptedHttp, ScriptedRequest, ScriptedResponse};

/// Deterministic, moderately compressible text of exactly `len` bytes.
pub(crate) fn sample_text(len: usize) -> Vec<u8> {
    const WORDS: [&str; 8] = [
        "title ", "seed ", "ticket ", "content ", "region ", "banner ", "icon ", "update ",
    ];
    let mut state: u32 = 0x2545_F491;
    let mut out = Vec::with_capacity(len + 16);
    while out.len() < len {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        out.extend_from_slice(WORDS[(state % 8) as usize].as_bytes());
        out.extend_from_slice(format!("{:04x} ", state & 0xFFFF).as_bytes());
    }
    out.truncate(len);
    out
}

pub(crate) fn gzip_bytes(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub(crate) fn deflate_bytes(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub(crate) fn raw_deflate_bytes(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Sink that records everything and can be told to fail.
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    pub(crate) chunks: Vec<Vec<u8>>,
    pub(crate) progress: Vec<(u64, u64)>,
    pub(crate) checks: usize,
    /// Fail the write with this 0-based index.
    pub(crate) fail_write_at: Option<usize>,
    /// Report cancellation once this many checks have passed.
    pub(crate) cancel_after_checks: Option<usize>,
}

impl RecordingSink {
    pub(crate) fn body(&self) -> Vec<u8> {
        self.chunks.concat()
    }
}

impl crate::download::DownloadSink for RecordingSink {
    fn write(&mut self, chunk: &[u8]) -> Result<(), crate::download::DownloadError> {
        if self.fail_write_at == Some(self.chunks.len()) {
            return Err(crate::download::DownloadError::sink("disk full"));
        }
        self.chunks.push(chunk.to_vec());
        Ok(())
    }

    fn check_running(&mut self) -> Result<(), crate::download::DownloadError> {
        if self.cancel_after_checks == Some(self.checks) {
            return Err(crate::download::DownloadError::Cancelled);
        }
        self.checks += 1;
        Ok(())
    }

    fn progress(&mut self, total: u64, current: u64) {
        self.progress.push((total, current));
    }
}
