//! HTTP/1.1 per-connection state machine (spec.md §4.3).
//!
//! `REQUEST_LINE -> HEADERS -> BODY -> RESPONDING -> KEEPALIVE_OR_CLOSE`,
//! mirroring the phase structure of `h2::proto::Connection` but driven
//! by line/header parsing instead of framed binary records.

pub mod body;
pub mod request;
pub mod response;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use http::{HeaderMap, Method};

use crate::buffer::{InputBuffer, OutputQueue};
use crate::dispatch::{dispatch, IncomingRequest, ResponseHandle, RouteTable};
use crate::error::Http1Error;
use crate::executor::Executor;

use self::body::Body;

const MAX_REQUEST_LINE_LEN: usize = 8 * 1024;
const MAX_HEADER_LINE_LEN: usize = 8 * 1024;
const MAX_HEADER_COUNT: usize = 100;

#[derive(Debug, PartialEq, Eq)]
enum Phase {
    RequestLine,
    Headers,
    Body,
    /// A response has been handed to the dispatcher; further input
    /// (pipelined requests) is withheld until the handler replies.
    Responding,
    /// The handler replied; connection either reads the next request
    /// or, for `Connection: close` / HTTP/1.0 without keep-alive,
    /// shuts down once the output queue drains.
    KeepAliveOrClose,
    Closed,
}

/// Parsed so far, accumulated across `Phase::RequestLine` /
/// `Phase::Headers`.
#[derive(Default)]
struct PartialRequest {
    method: Option<Method>,
    path: Option<String>,
    headers: HeaderMap,
    header_count: usize,
}

pub enum Step {
    NeedMoreData,
    Progressed,
    /// The request and its HTTP/1.1 headers are fully parsed and this
    /// connection should be upgraded to h2c; `body` is whatever
    /// request bytes had already been buffered before the upgrade
    /// decision was made.
    UpgradeToH2c { method: Method, path: String, headers: HeaderMap, body: Vec<u8>, http2_settings: Vec<u8> },
    /// Fatal parse error; caller writes the mapped status and closes.
    Error(Http1Error),
    Closed,
}

/// One HTTP/1.1 connection's parsing state.
pub struct Connection {
    phase: Phase,
    partial: PartialRequest,
    body: Body,
    body_bytes: Vec<u8>,
    max_request_size: usize,
    keep_alive: bool,
}

impl Connection {
    pub fn new(max_request_size: usize) -> Connection {
        Connection {
            phase: Phase::RequestLine,
            partial: PartialRequest::default(),
            body: Body::None,
            body_bytes: Vec::new(),
            max_request_size,
            keep_alive: true,
        }
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.phase == Phase::Responding
    }

    /// True before any byte of a request line has been parsed —
    /// the only point at which a prior-knowledge HTTP/2 preface can
    /// still be sniffed instead (spec.md §4.2).
    pub fn is_fresh(&self) -> bool {
        self.phase == Phase::RequestLine && self.partial.method.is_none()
    }

    pub fn should_close(&self) -> bool {
        self.phase == Phase::Closed || (self.phase == Phase::KeepAliveOrClose && !self.keep_alive)
    }

    /// Advances the state machine as far as the currently buffered
    /// input allows.
    pub fn poll(&mut self, input: &mut InputBuffer) -> Step {
        loop {
            match self.phase {
                Phase::RequestLine => match request::parse_request_line(input, MAX_REQUEST_LINE_LEN) {
                    Ok(Some((method, path, http10))) => {
                        self.partial.method = Some(method);
                        self.partial.path = Some(path);
                        self.keep_alive = !http10;
                        self.phase = Phase::Headers;
                    }
                    Ok(None) => return Step::NeedMoreData,
                    Err(()) => return Step::Error(Http1Error::RequestUriTooLong),
                },
                Phase::Headers => match request::parse_header_line(input, MAX_HEADER_LINE_LEN) {
                    Ok(Some(Some((name, value)))) => {
                        if self.partial.header_count >= MAX_HEADER_COUNT {
                            return Step::Error(Http1Error::HeaderTooLarge);
                        }
                        self.partial.header_count += 1;
                        self.partial.headers.append(name, value);
                    }
                    Ok(Some(None)) => {
                        if let Some(upgrade) = self.check_h2c_upgrade() {
                            return upgrade;
                        }
                        self.body = body::start(&self.partial.headers);
                        self.phase = Phase::Body;
                    }
                    Ok(None) => return Step::NeedMoreData,
                    Err(()) => return Step::Error(Http1Error::HeaderTooLarge),
                },
                Phase::Body => {
                    match self.body.advance(input, &mut self.body_bytes, self.max_request_size) {
                        Ok(true) => {
                            self.phase = Phase::Responding;
                            return Step::Progressed;
                        }
                        Ok(false) => return Step::NeedMoreData,
                        Err(e) => return Step::Error(e),
                    }
                }
                Phase::Responding | Phase::KeepAliveOrClose | Phase::Closed => return Step::NeedMoreData,
            }
        }
    }

    fn check_h2c_upgrade(&mut self) -> Option<Step> {
        let is_upgrade = self
            .partial
            .headers
            .get("upgrade")
            .map(|v| v.as_bytes().eq_ignore_ascii_case(b"h2c"))
            .unwrap_or(false);
        if !is_upgrade {
            return None;
        }
        let settings_header = self.partial.headers.get("http2-settings")?.to_str().ok()?.to_string();
        let http2_settings = request::decode_base64url(&settings_header)?;

        Some(Step::UpgradeToH2c {
            method: self.partial.method.clone()?,
            path: self.partial.path.clone()?,
            headers: std::mem::take(&mut self.partial.headers),
            body: std::mem::take(&mut self.body_bytes),
            http2_settings,
        })
    }

    /// Hands the fully assembled request to the dispatcher. The
    /// connection stays in `Responding` (withholding pipelined input)
    /// until `respond` is called on the handle.
    pub fn dispatch_request(&mut self, queue: OutputQueue, routes: &dyn RouteTable, executor: &dyn Executor) {
        let method = self.partial.method.clone().expect("request line parsed");
        let path = self.partial.path.clone().expect("request line parsed");
        let headers = std::mem::take(&mut self.partial.headers);
        let body = std::mem::take(&mut self.body_bytes);

        let request = IncomingRequest { method, path, headers, body };
        let response = ResponseHandle::new_http1(queue, Arc::new(AtomicBool::new(!self.keep_alive)));
        dispatch(routes, executor, request, response);
    }

    /// Called once a response has been written; resets parsing state
    /// for the next pipelined request (if keep-alive).
    pub fn reset_for_next_request(&mut self) {
        self.partial = PartialRequest::default();
        self.body = Body::None;
        self.body_bytes.clear();
        self.phase = if self.keep_alive { Phase::RequestLine } else { Phase::Closed };
    }
}
