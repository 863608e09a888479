//! In-memory native stack answering from a table of scripted responses.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use crate::download::{DownloadState, NativeError, NativeHttp, NativeRequest, ReceiveStatus};

#[derive(Debug, Clone)]
enum Outcome {
    Status(u16),
    TlsFailure,
}

/// What a scripted URL answers with.
#[derive(Debug, Clone)]
pub(crate) struct ScriptedResponse {
    outcome: Outcome,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    trickle: usize,
    stall_at: Option<usize>,
    close_fails: bool,
}

impl ScriptedResponse {
    pub(crate) fn status(code: u16) -> Self {
        Self {
            outcome: Outcome::Status(code),
            headers: Vec::new(),
            body: Vec::new(),
            trickle: usize::MAX,
            stall_at: None,
            close_fails: false,
        }
    }

    pub(crate) fn ok(body: Vec<u8>) -> Self {
        Self {
            body,
            ..Self::status(200)
        }
    }

    pub(crate) fn redirect(code: u16, location: &str) -> Self {
        Self::status(code).header("Location", location)
    }

    pub(crate) fn tls_failure() -> Self {
        Self {
            outcome: Outcome::TlsFailure,
            ..Self::status(0)
        }
    }

    pub(crate) fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Deliver at most `bytes` per receive call.
    pub(crate) fn trickle(mut self, bytes: usize) -> Self {
        self.trickle = bytes.max(1);
        self
    }

    /// Time out every receive once `bytes` have been delivered.
    pub(crate) fn stall_after(mut self, bytes: usize) -> Self {
        self.stall_at = Some(bytes);
        self
    }

    pub(crate) fn close_fails(mut self) -> Self {
        self.close_fails = true;
        self
    }
}

#[derive(Debug, Default)]
struct Log {
    opened: Vec<String>,
    closed: usize,
    headers: Vec<(String, String)>,
    verify_disabled: bool,
    keep_alive: bool,
}

/// Native stack whose responses come from a URL table.
#[derive(Debug, Default)]
pub(crate) struct ScriptedHttp {
    routes: HashMap<String, ScriptedResponse>,
    log: Rc<RefCell<Log>>,
}

impl ScriptedHttp {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn route(mut self, url: &str, response: ScriptedResponse) -> Self {
        self.routes.insert(url.to_string(), response);
        self
    }

    pub(crate) fn opened(&self) -> Vec<String> {
        self.log.borrow().opened.clone()
    }

    pub(crate) fn closed(&self) -> usize {
        self.log.borrow().closed
    }

    pub(crate) fn sent_headers(&self) -> Vec<(String, String)> {
        self.log.borrow().headers.clone()
    }

    pub(crate) fn verify_disabled(&self) -> bool {
        self.log.borrow().verify_disabled
    }

    pub(crate) fn keep_alive_enabled(&self) -> bool {
        self.log.borrow().keep_alive
    }
}

impl NativeHttp for ScriptedHttp {
    type Request = ScriptedRequest;

    fn open(&self, url: &str) -> Result<ScriptedRequest, NativeError> {
        self.log.borrow_mut().opened.push(url.to_string());
        let response = self
            .routes
            .get(url)
            .cloned()
            .ok_or_else(|| NativeError::InvalidUrl {
                url: url.to_string(),
            })?;
        Ok(ScriptedRequest {
            response,
            log: Rc::clone(&self.log),
            sent: false,
            answered: false,
            downloaded: 0,
        })
    }
}

/// Request context handed out by [`ScriptedHttp`].
#[derive(Debug)]
pub(crate) struct ScriptedRequest {
    response: ScriptedResponse,
    log: Rc<RefCell<Log>>,
    sent: bool,
    answered: bool,
    downloaded: usize,
}

impl NativeRequest for ScriptedRequest {
    fn disable_verify(&mut self) -> Result<(), NativeError> {
        self.log.borrow_mut().verify_disabled = true;
        Ok(())
    }

    fn add_header(&mut self, name: &str, value: &str) -> Result<(), NativeError> {
        self.log
            .borrow_mut()
            .headers
            .push((name.to_string(), value.to_string()));
        Ok(())
    }

    fn set_keep_alive(&mut self, enabled: bool) -> Result<(), NativeError> {
        self.log.borrow_mut().keep_alive = enabled;
        Ok(())
    }

    fn begin(&mut self) -> Result<(), NativeError> {
        self.sent = true;
        Ok(())
    }

    fn status(&mut self, _timeout: Duration) -> Result<u16, NativeError> {
        if !self.sent {
            return Err(NativeError::InvalidState {
                reason: "status read before begin",
            });
        }
        match self.response.outcome {
            Outcome::Status(code) => {
                self.answered = true;
                Ok(code)
            }
            Outcome::TlsFailure => Err(NativeError::TlsVerifyFailed {
                message: "scripted handshake failure".to_string(),
            }),
        }
    }

    fn header(&self, name: &str) -> Result<String, NativeError> {
        self.response
            .headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.clone())
            .ok_or_else(|| NativeError::HeaderNotFound {
                name: name.to_string(),
            })
    }

    fn receive(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<ReceiveStatus, NativeError> {
        let body = &self.response.body;
        let limit = self.response.stall_at.unwrap_or(body.len()).min(body.len());
        if self.downloaded >= limit && self.downloaded < body.len() {
            return Err(NativeError::Timeout { after: timeout });
        }

        let count = buf
            .len()
            .min(self.response.trickle)
            .min(limit - self.downloaded);
        buf[..count].copy_from_slice(&body[self.downloaded..self.downloaded + count]);
        self.downloaded += count;

        if self.downloaded == body.len() {
            Ok(ReceiveStatus::Complete)
        } else {
            Ok(ReceiveStatus::Pending)
        }
    }

    fn download_state(&self) -> Result<DownloadState, NativeError> {
        if !self.answered {
            return Err(NativeError::InvalidState {
                reason: "download state before response",
            });
        }
        Ok(DownloadState {
            downloaded: self.downloaded as u64,
            total: self.response.body.len() as u64,
        })
    }

    fn close(self) -> Result<(), NativeError> {
        self.log.borrow_mut().closed += 1;
        if self.response.close_fails {
            return Err(NativeError::InvalidState {
                reason: "scripted close failure",
            });
        }
        Ok(())
    }
}
