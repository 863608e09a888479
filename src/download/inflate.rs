//! Streaming inflate for `gzip` and `deflate` content encodings.
//!
//! The adapter never owns input or output buffers: each call consumes what it
//! can from the caller's input and writes into the caller's output, reporting
//! both counts so the session can keep undecoded leftovers in its slab.

use flate2::{Decompress, FlushDecompress, Status};

/// A `Content-Encoding` the session knows how to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    /// RFC 1952 gzip framing.
    Gzip,
    /// RFC 1950 zlib framing; raw RFC 1951 streams are accepted too.
    Deflate,
}

impl ContentEncoding {
    /// Parses a `Content-Encoding` header value; anything else is identity.
    #[must_use]
    pub fn from_header(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("gzip") {
            Some(Self::Gzip)
        } else if value.eq_ignore_ascii_case("deflate") {
            Some(Self::Deflate)
        } else {
            None
        }
    }
}

/// Result of one inflate pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct InflateStep {
    pub(crate) consumed: usize,
    pub(crate) produced: usize,
    pub(crate) finished: bool,
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub(crate) struct InflateError(String);

pub(crate) struct Inflater {
    encoding: ContentEncoding,
    // `None` for deflate until the first two bytes reveal the framing.
    engine: Option<Decompress>,
    finished: bool,
}

impl std::fmt::Debug for Inflater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inflater")
            .field("encoding", &self.encoding)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl Inflater {
    pub(crate) fn new(encoding: ContentEncoding) -> Self {
        let engine = match encoding {
            ContentEncoding::Gzip => Some(Decompress::new_gzip(15)),
            ContentEncoding::Deflate => None,
        };
        Self {
            encoding,
            engine,
            finished: false,
        }
    }

    pub(crate) fn encoding(&self) -> ContentEncoding {
        self.encoding
    }

    #[cfg(test)]
    pub(crate) fn is_finished(&self) -> bool {
        self.finished
    }

    /// Runs one sync-flush pass from `input` into `output`.
    pub(crate) fn inflate(
        &mut self,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<InflateStep, InflateError> {
        if self.finished {
            return Ok(InflateStep {
                finished: true,
                ..InflateStep::default()
            });
        }

        if self.engine.is_none() {
            if input.len() < 2 {
                return Ok(InflateStep::default());
            }
            self.engine = Some(Decompress::new(has_zlib_header(input)));
        }
        let Some(engine) = self.engine.as_mut() else {
            return Ok(InflateStep::default());
        };

        let before_in = engine.total_in();
        let before_out = engine.total_out();
        let status = engine
            .decompress(input, output, FlushDecompress::Sync)
            .map_err(|e| InflateError(e.to_string()))?;

        self.finished = status == Status::StreamEnd;
        Ok(InflateStep {
            consumed: delta(before_in, engine.total_in()),
            produced: delta(before_out, engine.total_out()),
            finished: self.finished,
        })
    }
}

fn delta(before: u64, after: u64) -> usize {
    usize::try_from(after - before).unwrap_or(usize::MAX)
}

/// RFC 1950 header check: CM = 8 and the first two bytes are a multiple of 31.
fn has_zlib_header(input: &[u8]) -> bool {
    let cmf = input[0];
    let flg = input[1];
    cmf & 0x0F == 8 && (u16::from(cmf) << 8 | u16::from(flg)) % 31 == 0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::{deflate_bytes, gzip_bytes, raw_deflate_bytes, sample_text};

    /// Feeds `encoded` in `chunk`-sized pieces through a bounded input window
    /// and a bounded output window, mimicking the session's slab discipline.
    fn inflate_in_pieces(
        encoding: ContentEncoding,
        encoded: &[u8],
        chunk: usize,
        out_window: usize,
    ) -> Vec<u8> {
        let mut inflater = Inflater::new(encoding);
        let mut pending: Vec<u8> = Vec::new();
        let mut decoded = Vec::new();
        let mut offset = 0;
        let mut out = vec![0u8; out_window];

        loop {
            if offset < encoded.len() {
                let end = (offset + chunk).min(encoded.len());
                pending.extend_from_slice(&encoded[offset..end]);
                offset = end;
            }
            let step = inflater.inflate(&pending, &mut out).unwrap();
            pending.drain(..step.consumed);
            decoded.extend_from_slice(&out[..step.produced]);
            if step.finished {
                break;
            }
            if offset >= encoded.len() && step.consumed == 0 && step.produced == 0 {
                break;
            }
        }
        decoded
    }

    #[test]
    fn test_content_encoding_from_header() {
        assert_eq!(
            ContentEncoding::from_header("gzip"),
            Some(ContentEncoding::Gzip)
        );
        assert_eq!(
            ContentEncoding::from_header(" Deflate "),
            Some(ContentEncoding::Deflate)
        );
        assert_eq!(ContentEncoding::from_header("br"), None);
        assert_eq!(ContentEncoding::from_header("identity"), None);
    }

    #[test]
    fn test_gzip_any_chunk_alignment_yields_original() {
        let original = sample_text(20_000);
        let encoded = gzip_bytes(&original);
        for chunk in [1, 3, 7, 64, 1000, encoded.len()] {
            for window in [1, 17, 4096] {
                let decoded = inflate_in_pieces(ContentEncoding::Gzip, &encoded, chunk, window);
                assert_eq!(
                    decoded, original,
                    "chunk {chunk} window {window} altered the body"
                );
            }
        }
    }

    #[test]
    fn test_deflate_accepts_zlib_and_raw_framing() {
        let original = sample_text(5_000);
        let zlib = inflate_in_pieces(ContentEncoding::Deflate, &deflate_bytes(&original), 5, 256);
        assert_eq!(zlib, original);
        let raw = inflate_in_pieces(
            ContentEncoding::Deflate,
            &raw_deflate_bytes(&original),
            5,
            256,
        );
        assert_eq!(raw, original);
    }

    #[test]
    fn test_finished_inflater_reports_end_without_consuming() {
        let encoded = gzip_bytes(b"tiny");
        let mut inflater = Inflater::new(ContentEncoding::Gzip);
        let mut out = [0u8; 64];
        let step = inflater.inflate(&encoded, &mut out).unwrap();
        assert!(step.finished);
        assert_eq!(&out[..step.produced], b"tiny");
        assert!(inflater.is_finished());

        let again = inflater.inflate(b"trailing", &mut out).unwrap();
        assert_eq!(again.consumed, 0);
        assert_eq!(again.produced, 0);
        assert!(again.finished);
    }

    #[test]
    fn test_corrupt_gzip_is_an_error() {
        let mut inflater = Inflater::new(ContentEncoding::Gzip);
        let mut out = [0u8; 64];
        assert!(
            inflater
                .inflate(b"definitely not gzip data", &mut out)
                .is_err()
        );
    }

    #[test]
    fn test_zlib_header_detection() {
        assert!(has_zlib_header(&[0x78, 0x9C]));
        assert!(has_zlib_header(&[0x78, 0x01]));
        assert!(!has_zlib_header(&[0x1F, 0x8B]));
        assert!(!has_zlib_header(&[0xED, 0xBD]));
    }
}
