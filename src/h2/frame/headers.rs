//! HEADERS / CONTINUATION framing (RFC 9113 §6.2, §6.10).
//!
//! Unlike the teacher's `frame::headers`, HPACK decoding does not
//! happen inline here: the connection owns the single HPACK decoder
//! for its lifetime (spec.md §3 "hpack_decoder" is a connection field,
//! not a per-frame one), so this module only strips frame-level
//! padding/priority and hands back the raw field-block fragment. See
//! `h2::hpack` for the decode/encode step.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{Error, Frame, Head, Kind, StreamId};

const END_STREAM: u8 = 0x1;
const END_HEADERS: u8 = 0x4;
const PADDED: u8 = 0x8;
const PRIORITY: u8 = 0x20;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct HeadersFlag(u8);

impl HeadersFlag {
    pub fn load(bits: u8) -> HeadersFlag {
        HeadersFlag(bits & (END_STREAM | END_HEADERS | PADDED | PRIORITY))
    }

    pub fn is_end_stream(&self) -> bool {
        self.0 & END_STREAM == END_STREAM
    }

    pub fn set_end_stream(&mut self) {
        self.0 |= END_STREAM;
    }

    pub fn is_end_headers(&self) -> bool {
        self.0 & END_HEADERS == END_HEADERS
    }

    pub fn is_priority(&self) -> bool {
        self.0 & PRIORITY == PRIORITY
    }
}

/// A parsed HEADERS frame with the field block left undecoded.
#[derive(Debug)]
pub struct Headers {
    stream_id: StreamId,
    flags: HeadersFlag,
    header_block_fragment: Bytes,
}

impl Headers {
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn is_end_stream(&self) -> bool {
        self.flags.is_end_stream()
    }

    pub fn is_end_headers(&self) -> bool {
        self.flags.is_end_headers()
    }

    pub fn header_block_fragment(&self) -> &Bytes {
        &self.header_block_fragment
    }

    pub fn into_header_block_fragment(self) -> Bytes {
        self.header_block_fragment
    }

    /// `payload` is the frame body (header already stripped).
    pub fn load(head: Head, mut payload: Bytes) -> Result<Headers, Error> {
        if head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }

        let flags = HeadersFlag::load(head.flag());

        if flags.0 & PADDED == PADDED {
            if payload.is_empty() {
                return Err(Error::TooMuchPadding);
            }
            let pad_len = payload[0] as usize;
            payload.advance(1);
            if pad_len > payload.len() {
                return Err(Error::TooMuchPadding);
            }
            payload.truncate(payload.len() - pad_len);
        }

        if flags.is_priority() {
            // Stream dependency (4 bytes, top bit exclusive flag) + 1
            // byte weight; the core never maintains a priority tree
            // (spec.md §1) so these are parsed only to advance past
            // them.
            if payload.len() < 5 {
                return Err(Error::PayloadLengthTooShort);
            }
            payload.advance(5);
        }

        Ok(Headers { stream_id: head.stream_id(), flags, header_block_fragment: payload })
    }

    /// Encodes `field_block` (already HPACK-encoded) as a HEADERS
    /// frame, splitting into HEADERS + CONTINUATION frames when the
    /// block exceeds `max_frame_size` (spec.md §4.5 "write_response").
    pub fn encode(
        stream_id: StreamId,
        end_stream: bool,
        field_block: &[u8],
        max_frame_size: usize,
        dst: &mut BytesMut,
    ) {
        let mut remaining = field_block;
        let mut first = true;

        loop {
            let take = remaining.len().min(max_frame_size.max(1));
            let (chunk, rest) = remaining.split_at(take);
            let is_last = rest.is_empty();

            let mut flags = 0u8;
            if first && end_stream {
                flags |= END_STREAM;
            }
            if is_last {
                flags |= END_HEADERS;
            }

            let kind = if first { Kind::Headers } else { Kind::Continuation };
            let head = Head::new(kind, flags, stream_id);
            head.encode(chunk.len(), dst);
            dst.put(chunk);

            if is_last {
                break;
            }
            remaining = rest;
            first = false;
        }
    }
}

impl From<Headers> for Frame {
    fn from(src: Headers) -> Frame {
        Frame::Headers(src)
    }
}

/// A parsed CONTINUATION frame: just a stream id and a raw fragment,
/// merged by the connection's header-assembly state machine.
#[derive(Debug)]
pub struct Continuation {
    stream_id: StreamId,
    end_headers: bool,
    fragment: Bytes,
}

impl Continuation {
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn is_end_headers(&self) -> bool {
        self.end_headers
    }

    pub fn into_fragment(self) -> Bytes {
        self.fragment
    }

    pub fn load(head: Head, payload: Bytes) -> Result<Continuation, Error> {
        if head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }
        let end_headers = head.flag() & END_HEADERS == END_HEADERS;
        Ok(Continuation { stream_id: head.stream_id(), end_headers, fragment: payload })
    }
}

impl From<Continuation> for Frame {
    fn from(src: Continuation) -> Frame {
        Frame::Continuation(src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_padding_and_priority() {
        let flags = PADDED | PRIORITY;
        let head = Head::new(Kind::Headers, flags, StreamId::new(1));
        let mut payload = vec![2u8]; // pad len
        payload.extend_from_slice(&[0, 0, 0, 0]); // dependency + exclusive
        payload.push(16); // weight
        payload.extend_from_slice(b"hpack-bytes");
        payload.extend_from_slice(&[0, 0]); // padding
        let parsed = Headers::load(head, Bytes::from(payload)).unwrap();
        assert_eq!(parsed.header_block_fragment(), &Bytes::from_static(b"hpack-bytes"));
    }

    #[test]
    fn encode_splits_on_max_frame_size() {
        let mut dst = BytesMut::new();
        let block = vec![0xAB; 10];
        Headers::encode(StreamId::new(1), true, &block, 4, &mut dst);

        let (head1, len1) = Head::parse(&dst);
        assert_eq!(head1.kind(), Kind::Headers);
        assert_eq!(len1, 4);
        assert!(!HeadersFlag::load(head1.flag()).is_end_headers());

        let mut offset = super::HEADER_LEN + len1 as usize;
        let (head2, len2) = Head::parse(&dst[offset..]);
        assert_eq!(head2.kind(), Kind::Continuation);
        assert_eq!(len2, 4);
        offset += super::HEADER_LEN + len2 as usize;

        let (head3, len3) = Head::parse(&dst[offset..]);
        assert_eq!(head3.kind(), Kind::Continuation);
        assert_eq!(len3, 2);
        assert!(HeadersFlag::load(head3.flag()).is_end_headers());
    }
}
