//! The handoff from a fully-assembled request to an executor that
//! invokes a handler (spec.md §4.7 "Dispatcher").
//!
//! The route table, request/response value types, and handler thread
//! pool are external collaborators per spec.md §1; this module defines
//! only the narrow contract the connection engine needs from them.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};

use crate::buffer::OutputQueue;
use crate::executor::Executor;
use crate::h2::frame::{Reason, StreamId};

/// A fully-assembled request, handed to the dispatcher once the
/// connection's state machine has read a complete request line /
/// headers / body (HTTP/1.1) or HEADERS (+ CONTINUATION) + DATA with
/// END_STREAM (HTTP/2), per spec.md §2 "Data flow".
#[derive(Debug)]
pub struct IncomingRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// External collaborator contract: `(method, path) -> handler` lookup
/// (spec.md §3 "Route entry"). No pattern matching is required
/// (spec.md §9 Open Question 3).
pub trait RouteTable: Send + Sync + 'static {
    fn find(&self, method: &Method, path: &str) -> Option<Arc<dyn Handler>>;
}

pub trait Handler: Send + Sync + 'static {
    fn handle(&self, request: IncomingRequest, response: ResponseHandle);
}

impl<F> Handler for F
where
    F: Fn(IncomingRequest, ResponseHandle) + Send + Sync + 'static,
{
    fn handle(&self, request: IncomingRequest, response: ResponseHandle) {
        (self)(request, response)
    }
}

/// A command queued by a handler thread for the reactor thread to turn
/// into real wire frames. This, and `OutputQueue`, are the only two
/// thread-crossing surfaces in the engine (spec.md §5).
#[derive(Debug)]
pub enum H2Command {
    Respond {
        status: u16,
        headers: HeaderMap,
        body: Option<Bytes>,
        streaming: bool,
    },
    Data {
        bytes: Bytes,
        end_stream: bool,
    },
    Trailers(HeaderMap),
    Reset(Reason),
}

pub type H2CommandQueue = Arc<Mutex<VecDeque<(StreamId, H2Command)>>>;

#[derive(Clone)]
enum Sink {
    Http1 {
        queue: OutputQueue,
        status: u16,
        headers: HeaderMap,
        close_after: Arc<AtomicBool>,
    },
    Http2 {
        stream_id: StreamId,
        commands: H2CommandQueue,
        status: u16,
        headers: HeaderMap,
    },
}

/// Handed to a handler in place of writing directly to the socket.
/// Exposes the operations spec.md §4.7 requires; calling any `respond`
/// variant a second time fails, per spec.md §7.
pub struct ResponseHandle {
    sink: Sink,
    responded: Arc<AtomicBool>,
}

#[derive(Debug, thiserror::Error)]
#[error("response already sent on this stream")]
pub struct AlreadyResponded;

impl ResponseHandle {
    pub(crate) fn new_http1(queue: OutputQueue, close_after: Arc<AtomicBool>) -> ResponseHandle {
        ResponseHandle {
            sink: Sink::Http1 { queue, status: 200, headers: HeaderMap::new(), close_after },
            responded: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn new_http2(stream_id: StreamId, commands: H2CommandQueue) -> ResponseHandle {
        ResponseHandle {
            sink: Sink::Http2 { stream_id, commands, status: 200, headers: HeaderMap::new() },
            responded: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn status_code(&mut self, code: u16) {
        match &mut self.sink {
            Sink::Http1 { status, .. } => *status = code,
            Sink::Http2 { status, .. } => *status = code,
        }
    }

    pub fn header(&mut self, name: HeaderName, value: HeaderValue) {
        match &mut self.sink {
            Sink::Http1 { headers, .. } => {
                headers.append(name, value);
            }
            Sink::Http2 { headers, .. } => {
                headers.append(name, value);
            }
        }
    }

    /// Status-only response with no body.
    pub fn respond(&mut self) -> Result<(), AlreadyResponded> {
        self.mark_responded()?;
        match &self.sink {
            Sink::Http1 { queue, status, headers, close_after } => {
                crate::h1::response::write_status_only(queue, *status, headers, close_after.load(Ordering::Relaxed));
            }
            Sink::Http2 { stream_id, commands, status, headers } => {
                push_h2(commands, *stream_id, H2Command::Respond {
                    status: *status,
                    headers: headers.clone(),
                    body: None,
                    streaming: false,
                });
            }
        }
        Ok(())
    }

    /// Sends a complete body in one shot with the given content type.
    pub fn respond_bytes(
        &mut self,
        content_type: &'static str,
        body: impl Into<Bytes>,
    ) -> Result<(), AlreadyResponded> {
        self.mark_responded()?;
        let body: Bytes = body.into();
        match &self.sink {
            Sink::Http1 { queue, status, headers, close_after } => {
                let mut headers = headers.clone();
                headers.insert("content-type", HeaderValue::from_static(content_type));
                crate::h1::response::write_full_body(
                    queue,
                    *status,
                    &headers,
                    &body,
                    close_after.load(Ordering::Relaxed),
                );
            }
            Sink::Http2 { stream_id, commands, status, headers } => {
                let mut headers = headers.clone();
                headers.insert("content-type", HeaderValue::from_static(content_type));
                push_h2(commands, *stream_id, H2Command::Respond {
                    status: *status,
                    headers,
                    body: Some(body),
                    streaming: false,
                });
            }
        }
        Ok(())
    }

    /// Begins a streamed response; further chunks are written through
    /// the returned `OutputStream` (spec.md §4.7
    /// "respond(content_type) -> output_stream").
    pub fn respond_stream(&mut self, content_type: &'static str) -> Result<OutputStream, AlreadyResponded> {
        self.mark_responded()?;
        let stream = match &self.sink {
            Sink::Http1 { queue, status, headers, close_after } => {
                let mut headers = headers.clone();
                headers.insert("content-type", HeaderValue::from_static(content_type));
                OutputStream::Http1(crate::h1::response::begin_streaming(
                    queue.clone(),
                    *status,
                    headers,
                    close_after.clone(),
                ))
            }
            Sink::Http2 { stream_id, commands, status, headers } => {
                let mut headers = headers.clone();
                headers.insert("content-type", HeaderValue::from_static(content_type));
                push_h2(commands, *stream_id, H2Command::Respond {
                    status: *status,
                    headers,
                    body: None,
                    streaming: true,
                });
                OutputStream::Http2 { stream_id: *stream_id, commands: commands.clone(), finished: false }
            }
        };
        Ok(stream)
    }

    /// A second handle onto the same sink, sharing the `responded`
    /// flag — used to send a `500` if the handler panics without ever
    /// responding (spec.md §4.7 "on handler exception,
    /// response_handle.respond(500) if not already sent").
    pub(crate) fn clone_for_fallback(&self) -> ResponseHandle {
        ResponseHandle { sink: self.sink.clone(), responded: self.responded.clone() }
    }

    fn mark_responded(&self) -> Result<(), AlreadyResponded> {
        if self.responded.swap(true, Ordering::SeqCst) {
            Err(AlreadyResponded)
        } else {
            Ok(())
        }
    }
}

fn push_h2(commands: &H2CommandQueue, stream_id: StreamId, cmd: H2Command) {
    commands.lock().unwrap().push_back((stream_id, cmd));
}

/// A handle for writing a streamed response body. Every write respects
/// FIFO ordering within the stream (spec.md §5 "Within a stream,
/// response frames are delivered in the order written by the
/// handler").
pub enum OutputStream {
    Http1(crate::h1::response::StreamingBody),
    Http2 { stream_id: StreamId, commands: H2CommandQueue, finished: bool },
}

impl OutputStream {
    pub fn write(&mut self, chunk: impl Into<Bytes>) {
        let bytes = chunk.into();
        match self {
            OutputStream::Http1(body) => body.write(&bytes),
            OutputStream::Http2 { stream_id, commands, .. } => {
                push_h2(commands, *stream_id, H2Command::Data { bytes, end_stream: false });
            }
        }
    }

    pub fn finish(mut self) {
        match &mut self {
            OutputStream::Http1(body) => body.finish(),
            OutputStream::Http2 { stream_id, commands, finished } => {
                push_h2(commands, *stream_id, H2Command::Data { bytes: Bytes::new(), end_stream: true });
                *finished = true;
            }
        }
    }
}

/// Matches `(method, path)` against the route table; on no match,
/// responds `404` synchronously. On a match, submits a task to
/// `executor` that invokes the handler; the task closes the response
/// handle on exit regardless of outcome (spec.md §4.7).
pub fn dispatch(
    routes: &dyn RouteTable,
    executor: &dyn Executor,
    request: IncomingRequest,
    mut response: ResponseHandle,
) {
    let handler = match routes.find(&request.method, &request.path) {
        Some(h) => h,
        None => {
            response.status_code(404);
            let _ = response.respond();
            return;
        }
    };

    let mut fallback = response.clone_for_fallback();
    executor.execute(Box::new(move || {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            handler.handle(request, response);
        }));
        if result.is_err() {
            fallback.status_code(500);
            if fallback.respond().is_ok() {
                tracing::error!("handler panicked; responded 500");
            }
        }
    }));
}
