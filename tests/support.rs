//! Shared scaffolding for the integration tests: frame builders and a
//! tiny HTTP/1.1 response reader, since there is no async test
//! harness to borrow here (SPEC_FULL.md "Test tooling").

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use h2c_engine::h2::frame::{Data, Head, Headers, Kind, Settings, StreamId};
use h2c_engine::h2::hpack::{Encoder, Pseudo};

pub fn set_test_timeouts(stream: &TcpStream) {
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    stream.set_write_timeout(Some(Duration::from_secs(2))).unwrap();
}

/// Reads bytes until `needle` is found, returning everything read
/// (including the needle).
pub fn read_until(stream: &mut TcpStream, needle: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).expect("read");
        if n == 0 {
            break;
        }
        buf.push(byte[0]);
        if buf.len() >= needle.len() && &buf[buf.len() - needle.len()..] == needle {
            break;
        }
    }
    buf
}

/// Parses an HTTP/1.1 response head + body read off `stream`, assuming
/// `Content-Length` framing (the only kind these tests send).
pub fn read_http1_response(stream: &mut TcpStream) -> (u16, Vec<u8>) {
    let head = read_until(stream, b"\r\n\r\n");
    let head_str = String::from_utf8_lossy(&head);
    let mut lines = head_str.split("\r\n");
    let status_line = lines.next().unwrap();
    let status: u16 = status_line.split_whitespace().nth(1).unwrap().parse().unwrap();

    let mut content_length = 0usize;
    for line in lines {
        if let Some(v) = line.strip_prefix("Content-Length: ").or_else(|| line.strip_prefix("content-length: ")) {
            content_length = v.trim().parse().unwrap_or(0);
        }
    }

    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        stream.read_exact(&mut body).expect("read body");
    }
    (status, body)
}

pub fn write_h1_request(stream: &mut TcpStream, method: &str, path: &str, extra_headers: &[(&str, &str)], body: &[u8]) {
    let mut req = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n");
    for (k, v) in extra_headers {
        req.push_str(&format!("{k}: {v}\r\n"));
    }
    if !body.is_empty() {
        req.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    req.push_str("\r\n");
    stream.write_all(req.as_bytes()).unwrap();
    stream.write_all(body).unwrap();
}

pub const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Writes the connection preface followed by an (empty, by default)
/// client SETTINGS frame, the minimum a conforming h2 client sends
/// before anything else (RFC 9113 §3.4).
pub fn write_h2_preface_and_settings(stream: &mut TcpStream, settings: &Settings) {
    stream.write_all(PREFACE).unwrap();
    let mut bytes = BytesMut::new();
    settings.encode(&mut bytes);
    stream.write_all(&bytes).unwrap();
}

/// Reads one frame header + payload off `stream`.
pub fn read_frame(stream: &mut TcpStream) -> (Head, Bytes) {
    let mut head_buf = [0u8; 9];
    stream.read_exact(&mut head_buf).expect("read frame header");
    let (head, len) = Head::parse(&head_buf);
    let mut payload = vec![0u8; len as usize];
    if len > 0 {
        stream.read_exact(&mut payload).expect("read frame payload");
    }
    (head, Bytes::from(payload))
}

/// Reads frames until one of `kind` is found (server SETTINGS, most
/// often, which every server must send before anything else).
pub fn read_until_kind(stream: &mut TcpStream, kind: Kind) -> (Head, Bytes) {
    loop {
        let (head, payload) = read_frame(stream);
        if head.kind() == kind {
            return (head, payload);
        }
    }
}

pub fn build_headers_frame(id: u32, method: &str, path: &str, end_stream: bool) -> Vec<u8> {
    let mut enc = Encoder::new();
    let pseudo = Pseudo::request(method.parse().unwrap(), path);
    let block = enc.encode(&pseudo, &http::HeaderMap::new());
    let mut dst = BytesMut::new();
    Headers::encode(StreamId::new(id), end_stream, &block, 16_384, &mut dst);
    dst.to_vec()
}

pub fn build_data_frame(id: u32, payload: &[u8], end_stream: bool) -> Vec<u8> {
    let data = Data::new(StreamId::new(id), Bytes::copy_from_slice(payload), end_stream);
    let mut dst = BytesMut::new();
    data.encode(&mut dst);
    dst.to_vec()
}
