//! Native stack implementation over `reqwest`, driven from blocking code.
//!
//! The stack behaves like the console's HTTP service: no automatic redirects,
//! no transparent decompression, TLS capped at 1.2, and every wait bounded by
//! the caller's timeout. A private current-thread runtime executes the
//! futures; calls must not be made from inside another async runtime.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{CONNECTION, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, redirect, tls};
use tokio::runtime::Runtime;
use tracing::debug;
use url::Url;

use super::{DownloadState, NativeError, NativeHttp, NativeRequest, ReceiveStatus};

type PendingResponse = Pin<Box<dyn Future<Output = Result<Response, reqwest::Error>> + Send>>;

/// Native HTTP stack backed by `reqwest`.
///
/// Cloning is cheap; clones share connection pools and the I/O runtime.
#[derive(Debug, Clone)]
pub struct ReqwestStack {
    verifying: Client,
    permissive: Client,
    runtime: Arc<Runtime>,
}

impl ReqwestStack {
    /// Creates a stack with its own single-threaded I/O runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime or the HTTP clients cannot be built.
    pub fn new() -> Result<Self, NativeError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|source| NativeError::Runtime { source })?;
        Self::with_runtime(Arc::new(runtime))
    }

    /// Creates a stack that drives its requests on `runtime`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP clients cannot be built.
    pub fn with_runtime(runtime: Arc<Runtime>) -> Result<Self, NativeError> {
        Ok(Self {
            verifying: build_client(false)?,
            permissive: build_client(true)?,
            runtime,
        })
    }

    /// The runtime requests are driven on.
    #[must_use]
    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }
}

fn build_client(accept_invalid_certs: bool) -> Result<Client, NativeError> {
    Client::builder()
        .redirect(redirect::Policy::none())
        .no_gzip()
        .no_deflate()
        .max_tls_version(tls::Version::TLS_1_2)
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
        .map_err(|source| NativeError::Request { source })
}

impl NativeHttp for ReqwestStack {
    type Request = ReqwestRequest;

    fn open(&self, url: &str) -> Result<ReqwestRequest, NativeError> {
        let parsed = Url::parse(url)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .ok_or_else(|| NativeError::InvalidUrl {
                url: url.to_string(),
            })?;

        Ok(ReqwestRequest {
            stack: self.clone(),
            url: parsed,
            headers: HeaderMap::new(),
            verify: true,
            in_flight: None,
            response: None,
            pending: Bytes::new(),
            downloaded: 0,
            finished: false,
        })
    }
}

/// A request context on [`ReqwestStack`].
pub struct ReqwestRequest {
    stack: ReqwestStack,
    url: Url,
    headers: HeaderMap,
    verify: bool,
    in_flight: Option<PendingResponse>,
    response: Option<Response>,
    // Tail of the last body chunk that did not fit the caller's buffer.
    pending: Bytes,
    downloaded: u64,
    finished: bool,
}

impl std::fmt::Debug for ReqwestRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestRequest")
            .field("url", &self.url.as_str())
            .field("verify", &self.verify)
            .field("sent", &(self.in_flight.is_some() || self.response.is_some()))
            .field("downloaded", &self.downloaded)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl NativeRequest for ReqwestRequest {
    fn disable_verify(&mut self) -> Result<(), NativeError> {
        self.verify = false;
        Ok(())
    }

    fn add_header(&mut self, name: &str, value: &str) -> Result<(), NativeError> {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
            NativeError::InvalidState {
                reason: "invalid header name",
            }
        })?;
        let value = HeaderValue::from_str(value).map_err(|_| NativeError::InvalidState {
            reason: "invalid header value",
        })?;
        self.headers.insert(name, value);
        Ok(())
    }

    fn set_keep_alive(&mut self, enabled: bool) -> Result<(), NativeError> {
        if enabled {
            self.headers.remove(CONNECTION);
        } else {
            self.headers
                .insert(CONNECTION, HeaderValue::from_static("close"));
        }
        Ok(())
    }

    fn begin(&mut self) -> Result<(), NativeError> {
        if self.in_flight.is_some() || self.response.is_some() {
            return Err(NativeError::InvalidState {
                reason: "request already sent",
            });
        }
        let client = if self.verify {
            &self.stack.verifying
        } else {
            &self.stack.permissive
        };
        let request = client.get(self.url.clone()).headers(self.headers.clone());
        self.in_flight = Some(Box::pin(request.send()));
        Ok(())
    }

    fn status(&mut self, timeout: Duration) -> Result<u16, NativeError> {
        if let Some(response) = &self.response {
            return Ok(response.status().as_u16());
        }
        let runtime = Arc::clone(&self.stack.runtime);
        let Some(in_flight) = self.in_flight.as_mut() else {
            return Err(NativeError::InvalidState {
                reason: "status read before begin",
            });
        };

        // The timer must be created inside the runtime that owns the reactor.
        match runtime.block_on(async { tokio::time::timeout(timeout, in_flight).await }) {
            Err(_) => Err(NativeError::Timeout { after: timeout }),
            Ok(Err(error)) => {
                self.in_flight = None;
                Err(classify_send_error(error))
            }
            Ok(Ok(response)) => {
                self.in_flight = None;
                let status = response.status().as_u16();
                debug!(url = %self.url, status, "native response");
                self.response = Some(response);
                Ok(status)
            }
        }
    }

    fn header(&self, name: &str) -> Result<String, NativeError> {
        self.response
            .as_ref()
            .and_then(|response| response.headers().get(name))
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| NativeError::HeaderNotFound {
                name: name.to_string(),
            })
    }

    fn receive(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<ReceiveStatus, NativeError> {
        let Self {
            stack,
            response,
            pending,
            downloaded,
            finished,
            ..
        } = self;
        let Some(response) = response.as_mut() else {
            return Err(NativeError::InvalidState {
                reason: "receive before response",
            });
        };

        let mut written = 0;
        while written < buf.len() {
            if pending.is_empty() {
                if *finished {
                    break;
                }
                match stack
                    .runtime
                    .block_on(async { tokio::time::timeout(timeout, response.chunk()).await })
                {
                    Err(_) => return Err(NativeError::Timeout { after: timeout }),
                    Ok(Err(source)) => return Err(NativeError::Request { source }),
                    Ok(Ok(None)) => {
                        *finished = true;
                        break;
                    }
                    Ok(Ok(Some(chunk))) => *pending = chunk,
                }
            }

            let count = pending.len().min(buf.len() - written);
            let chunk = pending.split_to(count);
            buf[written..written + count].copy_from_slice(&chunk);
            written += count;
            *downloaded += count as u64;
        }

        if *finished && pending.is_empty() {
            Ok(ReceiveStatus::Complete)
        } else {
            Ok(ReceiveStatus::Pending)
        }
    }

    fn download_state(&self) -> Result<DownloadState, NativeError> {
        let response = self.response.as_ref().ok_or(NativeError::InvalidState {
            reason: "download state before response",
        })?;
        Ok(DownloadState {
            downloaded: self.downloaded,
            total: response.content_length().unwrap_or(0),
        })
    }

    fn close(self) -> Result<(), NativeError> {
        debug!(url = %self.url, downloaded = self.downloaded, "native context closed");
        Ok(())
    }
}

/// Maps a send failure, singling out handshakes the capped TLS stack refused.
fn classify_send_error(error: reqwest::Error) -> NativeError {
    if error.is_connect() && causes_mention_tls(&error) {
        return NativeError::TlsVerifyFailed {
            message: error_chain(&error),
        };
    }
    NativeError::Request { source: error }
}

/// Inspects only the causes of `error`; the top-level message carries the URL.
fn causes_mention_tls(error: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = error.source();
    while let Some(inner) = source {
        let message = inner.to_string().to_ascii_lowercase();
        if TLS_MARKERS.iter().any(|needle| message.contains(needle)) {
            return true;
        }
        source = inner.source();
    }
    false
}

const TLS_MARKERS: [&str; 8] = [
    "tls",
    "ssl",
    "certificate",
    "handshake",
    "protocol version",
    "protocolversion",
    "peer is incompatible",
    "fatal alert",
];

fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}
