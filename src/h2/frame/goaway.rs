//! GOAWAY frame (RFC 9113 §6.8).

use bytes::{BufMut, Bytes};

use super::{Error, Frame, Head, Kind, Reason, StreamId};

#[derive(Debug)]
pub struct GoAway {
    last_stream_id: StreamId,
    error_code: Reason,
    debug_data: Bytes,
}

impl GoAway {
    pub fn new(last_stream_id: StreamId, error_code: Reason) -> GoAway {
        GoAway { last_stream_id, error_code, debug_data: Bytes::new() }
    }

    pub fn last_stream_id(&self) -> StreamId {
        self.last_stream_id
    }

    pub fn reason(&self) -> Reason {
        self.error_code
    }

    pub fn load(payload: &[u8]) -> Result<GoAway, Error> {
        if payload.len() < 8 {
            return Err(Error::BadFrameSize);
        }

        let last_stream_id = StreamId::new(u32::from_be_bytes([
            payload[0], payload[1], payload[2], payload[3],
        ]));
        let error_code = Reason::from_u32(u32::from_be_bytes([
            payload[4], payload[5], payload[6], payload[7],
        ]));
        let debug_data = Bytes::copy_from_slice(&payload[8..]);

        Ok(GoAway { last_stream_id, error_code, debug_data })
    }

    pub fn encode<B: BufMut>(&self, dst: &mut B) {
        let head = Head::new(Kind::GoAway, 0, StreamId::CONNECTION);
        head.encode(8 + self.debug_data.len(), dst);
        dst.put_u32(u32::from(self.last_stream_id));
        dst.put_u32(self.error_code.as_u32());
        dst.put(&self.debug_data[..]);
    }
}

impl From<GoAway> for Frame {
    fn from(src: GoAway) -> Frame {
        Frame::GoAway(src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let g = GoAway::new(StreamId::new(7), Reason::PROTOCOL_ERROR);
        let mut buf = Vec::new();
        g.encode(&mut buf);
        let parsed = GoAway::load(&buf[super::HEADER_LEN..]).unwrap();
        assert_eq!(parsed.last_stream_id(), StreamId::new(7));
        assert_eq!(parsed.reason(), Reason::PROTOCOL_ERROR);
    }
}
