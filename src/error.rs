//! Error taxonomy for the connection engine (spec.md §7).

use crate::h2::frame::{self, Reason};

/// A failure that terminates an entire HTTP/2 connection.
///
/// Carries the `Reason` that is sent in the GOAWAY frame (spec.md §4.4
/// "Connection error path").
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
#[error("connection error: {0:?}")]
pub struct ConnectionError(pub Reason);

impl From<Reason> for ConnectionError {
    fn from(reason: Reason) -> Self {
        ConnectionError(reason)
    }
}

impl From<frame::Error> for ConnectionError {
    fn from(e: frame::Error) -> Self {
        ConnectionError(Reason::from(e))
    }
}

/// A failure scoped to a single HTTP/2 stream; the connection survives.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
#[error("stream error: {reason:?}")]
pub struct StreamError {
    pub reason: Reason,
}

impl StreamError {
    pub fn new(reason: Reason) -> Self {
        StreamError { reason }
    }
}

/// Outcome of parsing/consuming frames or request records off the wire.
///
/// Mirrors the teacher's `codec::RecvError`, generalized to the two
/// protocols this engine speaks.
#[derive(Debug, thiserror::Error)]
pub enum RecvError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("stream {id} error: {reason:?}")]
    Stream { id: u32, reason: Reason },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures that terminate an HTTP/1.1 request without a handler ever
/// running (spec.md §4.3 "Failure semantics").
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum Http1Error {
    #[error("request line too long")]
    RequestUriTooLong,
    #[error("malformed request")]
    BadRequest,
    #[error("header field too large")]
    HeaderTooLarge,
    #[error("request payload too large")]
    PayloadTooLarge,
}

impl Http1Error {
    /// The status code a well-formed-but-rejected request gets back,
    /// per spec.md §4.3 and §7.
    pub fn status_code(self) -> u16 {
        match self {
            Http1Error::RequestUriTooLong => 414,
            Http1Error::BadRequest => 400,
            Http1Error::HeaderTooLarge => 431,
            Http1Error::PayloadTooLarge => 413,
        }
    }
}

/// Top-level engine error, returned by operations that are not scoped
/// to one connection (e.g. reactor bring-up).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}
