//! Serializes an HTTP/1.1 response directly into the connection's
//! `OutputQueue` (spec.md §4.6). Unlike the HTTP/2 side, no
//! connection-owned state needs to mediate this: framing needs no
//! flow-control bookkeeping, so the handler thread can format and
//! enqueue bytes itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use http::HeaderMap;

use crate::buffer::{OutputBuffer, OutputQueue};

fn reason_phrase(status: u16) -> &'static str {
    match status {
        101 => "Switching Protocols",
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

fn write_head(buf: &mut Vec<u8>, status: u16, headers: &HeaderMap, close: bool) {
    buf.extend_from_slice(format!("HTTP/1.1 {} {}\r\n", status, reason_phrase(status)).as_bytes());
    for (name, value) in headers.iter() {
        buf.extend_from_slice(name.as_str().as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(value.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    buf.extend_from_slice(if close { b"Connection: close\r\n" } else { b"Connection: keep-alive\r\n" });
}

pub fn write_status_only(queue: &OutputQueue, status: u16, headers: &HeaderMap, close: bool) {
    let mut head = Vec::new();
    write_head(&mut head, status, headers, close);
    head.extend_from_slice(b"Content-Length: 0\r\n\r\n");
    enqueue(queue, head);
}

pub fn write_full_body(queue: &OutputQueue, status: u16, headers: &HeaderMap, body: &[u8], close: bool) {
    let mut head = Vec::new();
    write_head(&mut head, status, headers, close);
    head.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
    head.extend_from_slice(body);
    enqueue(queue, head);
}

/// Writes the `101 Switching Protocols` response that precedes an h2c
/// upgrade (spec.md §4.3, RFC 9113 §3.2).
pub fn write_switching_protocols(queue: &OutputQueue) {
    let mut head = Vec::new();
    head.extend_from_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
    head.extend_from_slice(b"Connection: Upgrade\r\n");
    head.extend_from_slice(b"Upgrade: h2c\r\n\r\n");
    enqueue(queue, head);
}

fn enqueue(queue: &OutputQueue, bytes: Vec<u8>) {
    let mut buf = OutputBuffer::with_capacity(bytes.len());
    buf.extend(&bytes);
    queue.enqueue(buf);
}

/// A response body of unknown-at-start length, sent with
/// `Transfer-Encoding: chunked` (RFC 9112 §7.1) so the handler can
/// stream writes as they become available.
pub struct StreamingBody {
    queue: OutputQueue,
    close_after: Arc<AtomicBool>,
}

pub fn begin_streaming(queue: OutputQueue, status: u16, headers: HeaderMap, close_after: Arc<AtomicBool>) -> StreamingBody {
    let close = close_after.load(Ordering::Relaxed);
    let mut head = Vec::new();
    write_head(&mut head, status, &headers, close);
    head.extend_from_slice(b"Transfer-Encoding: chunked\r\n\r\n");
    enqueue(&queue, head);
    StreamingBody { queue, close_after }
}

impl StreamingBody {
    pub fn write(&mut self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }
        let mut buf = Vec::with_capacity(chunk.len() + 16);
        buf.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
        buf.extend_from_slice(chunk);
        buf.extend_from_slice(b"\r\n");
        enqueue(&self.queue, buf);
    }

    pub fn finish(&mut self) {
        enqueue(&self.queue, b"0\r\n\r\n".to_vec());
        let _ = &self.close_after;
    }
}
