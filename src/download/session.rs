//! Transport session on the native HTTP stack.
//!
//! A session owns one request context from open to close. Opening follows
//! `301`/`302`/`303` redirects by hand and negotiates `gzip`/`deflate`;
//! reading fills the caller's buffer, either straight from the transport or
//! through the inflate adapter with undecoded input parked in a bounded slab.

use std::time::Duration;

use tracing::{debug, instrument, warn};

use super::constants::{MAX_REDIRECTS, SESSION_BUFFER_SIZE, URL_CAPACITY};
use super::error::DownloadError;
use super::inflate::{ContentEncoding, Inflater};
use super::native::{NativeError, NativeHttp, NativeRequest, ReceiveStatus};
use super::redirect::resolve_redirect;
use super::slab::Slab;

const ACCEPT_ENCODING: &str = "gzip, deflate";

/// Body decoding state for a compressed response.
#[derive(Debug)]
struct Decoder {
    inflater: Inflater,
    slab: Slab,
}

/// One open download on the native stack.
#[derive(Debug)]
pub struct TransportSession<R: NativeRequest> {
    request: Option<R>,
    url: String,
    decoder: Option<Decoder>,
    timeout: Duration,
    transport_done: bool,
    body_done: bool,
}

impl<R: NativeRequest> TransportSession<R> {
    /// Opens `url`, following redirects up to [`MAX_REDIRECTS`].
    ///
    /// When `user_agent` is set it is sent as the `User-Agent` header.
    /// Certificate verification is always disabled on the native stack.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an empty URL
    /// - `Transport` when the stack fails to open, send or read headers
    /// - `TooManyRedirects` when the redirect bound is exceeded
    /// - `HttpStatus` for any final status other than `200`
    #[instrument(level = "debug", skip(http, user_agent, timeout))]
    pub fn open<H>(
        http: &H,
        url: &str,
        user_agent: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, DownloadError>
    where
        H: NativeHttp<Request = R>,
    {
        if url.is_empty() {
            return Err(DownloadError::invalid_argument("URL must not be empty"));
        }

        let mut current = String::with_capacity(URL_CAPACITY);
        resolve_redirect(&mut current, url, URL_CAPACITY);
        let mut redirects = 0u32;

        loop {
            let mut request = http
                .open(&current)
                .map_err(|e| DownloadError::transport(&current, e))?;

            let status = match send(&mut request, user_agent, timeout) {
                Ok(status) => status,
                Err(error) => {
                    release(request, &current);
                    return Err(DownloadError::transport(&current, error));
                }
            };

            if matches!(status, 301..=303) {
                let location = match request.header("Location") {
                    Ok(location) => location,
                    Err(error) => {
                        release(request, &current);
                        return Err(DownloadError::transport(&current, error));
                    }
                };
                release(request, &current);

                if redirects == MAX_REDIRECTS {
                    return Err(DownloadError::too_many_redirects(url, MAX_REDIRECTS));
                }
                redirects += 1;
                resolve_redirect(&mut current, &location, URL_CAPACITY);
                debug!(status, to = %current, redirects, "following redirect");
                continue;
            }

            if status != 200 {
                release(request, &current);
                return Err(DownloadError::http_status(&current, status));
            }

            let encoding = request
                .header("Content-Encoding")
                .ok()
                .and_then(|value| ContentEncoding::from_header(&value));
            let decoder = match encoding.map(Decoder::new).transpose() {
                Ok(decoder) => decoder,
                Err(error) => {
                    release(request, &current);
                    return Err(error);
                }
            };
            debug!(url = %current, ?encoding, "session open");

            return Ok(Self {
                request: Some(request),
                url: current,
                decoder,
                timeout,
                transport_done: false,
                body_done: false,
            });
        }
    }

    /// The URL that finally answered `200`.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the body is being inflated.
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.decoder.is_some()
    }

    /// The negotiated content encoding, if any.
    #[must_use]
    pub fn encoding(&self) -> Option<ContentEncoding> {
        self.decoder.as_ref().map(|d| d.inflater.encoding())
    }

    /// Whether every body byte has been delivered.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.body_done
    }

    /// Advertised body size as sent on the wire; 0 when unknown.
    ///
    /// For compressed bodies this is the encoded size.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the stack cannot report its counters.
    pub fn content_length(&self) -> Result<u64, DownloadError> {
        let request = self.live_request()?;
        request
            .download_state()
            .map(|state| state.total)
            .map_err(|e| DownloadError::transport(&self.url, e))
    }

    /// Fills `buf` until it is full or the body ends; returns bytes written.
    ///
    /// # Errors
    ///
    /// Returns `Transport` on receive failure or timeout and `Decompress`
    /// when a compressed body is corrupt.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, DownloadError> {
        if buf.is_empty() || self.body_done {
            return Ok(0);
        }
        if self.decoder.is_some() {
            self.read_compressed(buf)
        } else {
            self.read_plain(buf)
        }
    }

    fn read_plain(&mut self, buf: &mut [u8]) -> Result<usize, DownloadError> {
        let url = &self.url;
        let timeout = self.timeout;
        let request = self
            .request
            .as_mut()
            .ok_or_else(|| closed_error(url))?;

        let start = downloaded(request, url)?;
        let mut out = 0;
        while out < buf.len() {
            let status = request
                .receive(&mut buf[out..], timeout)
                .map_err(|e| DownloadError::transport(url, e))?;
            out = usize::try_from(downloaded(request, url)? - start)
                .unwrap_or(buf.len())
                .min(buf.len());
            if status == ReceiveStatus::Complete {
                self.transport_done = true;
                self.body_done = true;
                break;
            }
        }
        Ok(out)
    }

    fn read_compressed(&mut self, buf: &mut [u8]) -> Result<usize, DownloadError> {
        let url = &self.url;
        let timeout = self.timeout;
        let (Some(request), Some(decoder)) = (self.request.as_mut(), self.decoder.as_mut()) else {
            return Err(closed_error(url));
        };

        let mut out = 0;
        while out < buf.len() {
            let mut received = 0;
            if !self.transport_done && !decoder.slab.spare_mut().is_empty() {
                let before = downloaded(request, url)?;
                let status = request
                    .receive(decoder.slab.spare_mut(), timeout)
                    .map_err(|e| DownloadError::transport(url, e))?;
                received = usize::try_from(downloaded(request, url)? - before).unwrap_or(0);
                decoder.slab.fill(received);
                self.transport_done = status == ReceiveStatus::Complete;
            }

            let step = decoder
                .inflater
                .inflate(decoder.slab.filled(), &mut buf[out..])
                .map_err(|e| DownloadError::decompress(url, e.to_string()))?;
            decoder.slab.consume(step.consumed);
            decoder.slab.compact();
            out += step.produced;

            if step.finished {
                self.body_done = true;
                break;
            }
            if step.consumed == 0 && step.produced == 0 && received == 0 {
                if self.transport_done {
                    warn!(url = %url, leftover = decoder.slab.len(), "compressed body ended early");
                    self.body_done = true;
                    break;
                }
                if decoder.slab.spare_mut().is_empty() {
                    return Err(DownloadError::decompress(
                        url,
                        "decoder stalled with a full input buffer",
                    ));
                }
            }
        }
        Ok(out)
    }

    /// Releases the request context and any decoder state.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the stack fails to release the context.
    pub fn close(mut self) -> Result<(), DownloadError> {
        self.decoder = None;
        match self.request.take() {
            Some(request) => request
                .close()
                .map_err(|e| DownloadError::transport(&self.url, e)),
            None => Ok(()),
        }
    }

    fn live_request(&self) -> Result<&R, DownloadError> {
        self.request
            .as_ref()
            .ok_or_else(|| closed_error(&self.url))
    }
}

impl<R: NativeRequest> Drop for TransportSession<R> {
    fn drop(&mut self) {
        if let Some(request) = self.request.take() {
            release(request, &self.url);
        }
    }
}

impl Decoder {
    fn new(encoding: ContentEncoding) -> Result<Self, DownloadError> {
        Ok(Self {
            inflater: Inflater::new(encoding),
            slab: Slab::with_capacity(SESSION_BUFFER_SIZE)?,
        })
    }
}

/// Configures and sends one hop, returning its status.
fn send<R: NativeRequest>(
    request: &mut R,
    user_agent: Option<&str>,
    timeout: Duration,
) -> Result<u16, NativeError> {
    request.disable_verify()?;
    if let Some(agent) = user_agent {
        request.add_header("User-Agent", agent)?;
    }
    request.add_header("Accept-Encoding", ACCEPT_ENCODING)?;
    request.set_keep_alive(true)?;
    request.begin()?;
    request.status(timeout)
}

/// Closes a context on a path that already has a result to report.
fn release<R: NativeRequest>(request: R, url: &str) {
    if let Err(error) = request.close() {
        debug!(url = %url, error = %error, "ignoring close failure");
    }
}

fn downloaded<R: NativeRequest>(request: &R, url: &str) -> Result<u64, DownloadError> {
    request
        .download_state()
        .map(|state| state.downloaded)
        .map_err(|e| DownloadError::transport(url, e))
}

fn closed_error(url: &str) -> DownloadError {
    DownloadError::transport(
        url,
        NativeError::InvalidState {
            reason: "session already closed",
        },
    )
}
