//! Request-line and header-field parsing (RFC 9112 §3, §5).

use base64::Engine;
use http::{HeaderName, HeaderValue, Method};

use crate::buffer::InputBuffer;

/// Parses `METHOD SP request-target SP HTTP-version CRLF`. Returns
/// `Ok(None)` when the line is not fully buffered yet.
pub fn parse_request_line(
    input: &mut InputBuffer,
    max_len: usize,
) -> Result<Option<(Method, String, bool)>, ()> {
    let line = match input.read_line(max_len)? {
        Some(l) => l,
        None => return Ok(None),
    };

    let line = std::str::from_utf8(&line).map_err(|_| ())?;
    let mut parts = line.splitn(3, ' ');
    let method = parts.next().ok_or(())?;
    let target = parts.next().ok_or(())?;
    let version = parts.next().ok_or(())?;

    let method = Method::from_bytes(method.as_bytes()).map_err(|_| ())?;
    if target.is_empty() {
        return Err(());
    }
    let http10 = version == "HTTP/1.0";
    if version != "HTTP/1.1" && !http10 {
        return Err(());
    }

    Ok(Some((method, target.to_string(), http10)))
}

/// Parses one header field line, or recognizes the blank line that
/// terminates the header section (`Ok(Some(None))`).
pub fn parse_header_line(
    input: &mut InputBuffer,
    max_len: usize,
) -> Result<Option<Option<(HeaderName, HeaderValue)>>, ()> {
    let line = match input.read_line(max_len)? {
        Some(l) => l,
        None => return Ok(None),
    };

    if line.is_empty() {
        return Ok(Some(None));
    }

    let colon = line.iter().position(|&b| b == b':').ok_or(())?;
    let name = HeaderName::from_bytes(&line[..colon]).map_err(|_| ())?;
    let value = line[colon + 1..].iter().copied().skip_while(|b| *b == b' ' || *b == b'\t').collect::<Vec<u8>>();
    let value = HeaderValue::from_bytes(&value).map_err(|_| ())?;

    Ok(Some(Some((name, value))))
}

/// Decodes the `HTTP2-Settings` request header: unpadded, URL-safe
/// base64 carrying a serialized SETTINGS frame payload (RFC 9113
/// §3.2.1).
pub fn decode_base64url(s: &str) -> Option<Vec<u8>> {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(s.trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_request_line() {
        let mut buf = InputBuffer::new(128);
        let mut src: &[u8] = b"GET /index.html HTTP/1.1\r\n";
        buf.add_data(&mut src).unwrap();
        let (method, path, http10) = parse_request_line(&mut buf, 128).unwrap().unwrap();
        assert_eq!(method, Method::GET);
        assert_eq!(path, "/index.html");
        assert!(!http10);
    }

    #[test]
    fn parses_header_field_and_blank_line() {
        let mut buf = InputBuffer::new(128);
        let mut src: &[u8] = b"Host: example.com\r\n\r\n";
        buf.add_data(&mut src).unwrap();
        let (name, value) = parse_header_line(&mut buf, 128).unwrap().unwrap().unwrap();
        assert_eq!(name, "host");
        assert_eq!(value, "example.com");
        assert!(parse_header_line(&mut buf, 128).unwrap().unwrap().is_none());
    }
}
