//! Request body decoding: `Content-Length` and `Transfer-Encoding:
//! chunked` (RFC 9112 §7).

use http::HeaderMap;

use crate::buffer::InputBuffer;
use crate::error::Http1Error;

/// Chunk-size lines are capped well below what a 32-bit length needs
/// (`ffffffff` is 8 hex digits); 7 digits still covers 256MiB chunks,
/// generously above any reasonable single chunk, while bounding how
/// much header-like garbage a bad client can make us buffer.
const MAX_CHUNK_SIZE_HEX_DIGITS: usize = 7;
const MAX_CHUNK_FOOTERS_LEN: usize = 8 * 1024;

enum ChunkedState {
    Size(Vec<u8>),
    Data(usize),
    DataCrlf,
    Footers(usize),
    Done,
}

pub enum Body {
    None,
    ContentLength(usize),
    Chunked(ChunkedState),
}

/// Selects a body reader from the parsed request headers, preferring
/// `Transfer-Encoding: chunked` per RFC 9112 §6.3 precedence rules.
pub fn start(headers: &HeaderMap) -> Body {
    let chunked = headers
        .get("transfer-encoding")
        .map(|v| v.as_bytes().eq_ignore_ascii_case(b"chunked"))
        .unwrap_or(false);
    if chunked {
        return Body::Chunked(ChunkedState::Size(Vec::new()));
    }
    let len = headers
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    if len == 0 {
        Body::None
    } else {
        Body::ContentLength(len)
    }
}

impl Body {
    /// Reads as much of the body as is currently buffered in `input`,
    /// appending decoded bytes to `out`. Returns `Ok(true)` once the
    /// body is fully consumed.
    pub fn advance(
        &mut self,
        input: &mut InputBuffer,
        out: &mut Vec<u8>,
        max_request_size: usize,
    ) -> Result<bool, Http1Error> {
        match self {
            Body::None => Ok(true),
            Body::ContentLength(remaining) => {
                let n = (*remaining).min(input.len());
                if n > 0 {
                    let bytes = input.read_vec(n).map_err(|_| Http1Error::BadRequest)?;
                    if out.len() + bytes.len() > max_request_size {
                        return Err(Http1Error::PayloadTooLarge);
                    }
                    out.extend_from_slice(&bytes);
                    *remaining -= n;
                }
                Ok(*remaining == 0)
            }
            Body::Chunked(state) => advance_chunked(state, input, out, max_request_size),
        }
    }
}

fn advance_chunked(
    state: &mut ChunkedState,
    input: &mut InputBuffer,
    out: &mut Vec<u8>,
    max_request_size: usize,
) -> Result<bool, Http1Error> {
    loop {
        match state {
            ChunkedState::Size(digits) => match read_chunk_size_line(input, digits)? {
                None => return Ok(false),
                Some(0) => *state = ChunkedState::Footers(0),
                Some(size) => *state = ChunkedState::Data(size),
            },
            ChunkedState::Data(remaining) => {
                let n = (*remaining).min(input.len());
                if n > 0 {
                    let bytes = input.read_vec(n).map_err(|_| Http1Error::BadRequest)?;
                    if out.len() + bytes.len() > max_request_size {
                        return Err(Http1Error::PayloadTooLarge);
                    }
                    out.extend_from_slice(&bytes);
                    *remaining -= n;
                }
                if *remaining == 0 {
                    *state = ChunkedState::DataCrlf;
                } else {
                    return Ok(false);
                }
            }
            ChunkedState::DataCrlf => {
                if !input.available(2) {
                    return Ok(false);
                }
                input.skip(2).map_err(|_| Http1Error::BadRequest)?;
                *state = ChunkedState::Size(Vec::new());
            }
            ChunkedState::Footers(consumed) => match input.read_line(MAX_CHUNK_FOOTERS_LEN - *consumed) {
                Ok(Some(line)) => {
                    *consumed += line.len() + 2;
                    if *consumed > MAX_CHUNK_FOOTERS_LEN {
                        return Err(Http1Error::HeaderTooLarge);
                    }
                    if line.is_empty() {
                        *state = ChunkedState::Done;
                        return Ok(true);
                    }
                }
                Ok(None) => return Ok(false),
                Err(()) => return Err(Http1Error::HeaderTooLarge),
            },
            ChunkedState::Done => return Ok(true),
        }
    }
}

/// Reads one `chunk-size [ ";" chunk-ext ] CRLF` line, byte by byte so
/// chunk extensions can be skipped without a second buffer pass.
fn read_chunk_size_line(input: &mut InputBuffer, digits: &mut Vec<u8>) -> Result<Option<usize>, Http1Error> {
    loop {
        match input.peek_byte(0) {
            None => return Ok(None),
            Some(b'\r') => {
                if !input.available(2) {
                    return Ok(None);
                }
                input.skip(2).map_err(|_| Http1Error::BadRequest)?;
                let text = std::str::from_utf8(digits).map_err(|_| Http1Error::BadRequest)?;
                let size = usize::from_str_radix(text, 16).map_err(|_| Http1Error::BadRequest)?;
                return Ok(Some(size));
            }
            Some(b';') => {
                // Chunk extension: consume until CRLF without growing `digits`.
                input.skip(1).map_err(|_| Http1Error::BadRequest)?;
                loop {
                    match input.peek_byte(0) {
                        None => return Ok(None),
                        Some(b'\r') => break,
                        Some(_) => {
                            input.skip(1).map_err(|_| Http1Error::BadRequest)?;
                        }
                    }
                }
            }
            Some(b) => {
                if digits.len() >= MAX_CHUNK_SIZE_HEX_DIGITS {
                    return Err(Http1Error::BadRequest);
                }
                input.skip(1).map_err(|_| Http1Error::BadRequest)?;
                digits.push(b);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_length_body() {
        let mut body = Body::ContentLength(5);
        let mut input = InputBuffer::new(32);
        let mut src: &[u8] = b"hello";
        input.add_data(&mut src).unwrap();
        let mut out = Vec::new();
        assert!(body.advance(&mut input, &mut out, 1024).unwrap());
        assert_eq!(out, b"hello");
    }

    #[test]
    fn chunked_body_single_chunk() {
        let mut body = Body::Chunked(ChunkedState::Size(Vec::new()));
        let mut input = InputBuffer::new(64);
        let mut src: &[u8] = b"5\r\nhello\r\n0\r\n\r\n";
        input.add_data(&mut src).unwrap();
        let mut out = Vec::new();
        assert!(body.advance(&mut input, &mut out, 1024).unwrap());
        assert_eq!(out, b"hello");
    }

    #[test]
    fn chunked_body_multiple_chunks() {
        let mut body = Body::Chunked(ChunkedState::Size(Vec::new()));
        let mut input = InputBuffer::new(64);
        let mut src: &[u8] = b"2\r\nab\r\n3\r\ncde\r\n0\r\n\r\n";
        input.add_data(&mut src).unwrap();
        let mut out = Vec::new();
        assert!(body.advance(&mut input, &mut out, 1024).unwrap());
        assert_eq!(out, b"abcde");
    }
}
