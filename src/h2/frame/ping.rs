//! PING frame (RFC 9113 §6.7).

use bytes::BufMut;

use super::{Error, Frame, Head, Kind, StreamId};

const ACK_FLAG: u8 = 0x1;

pub type Payload = [u8; 8];

#[derive(Debug)]
pub struct Ping {
    ack: bool,
    payload: Payload,
}

impl Ping {
    pub fn ping(payload: Payload) -> Ping {
        Ping { ack: false, payload }
    }

    pub fn pong(payload: Payload) -> Ping {
        Ping { ack: true, payload }
    }

    pub fn is_ack(&self) -> bool {
        self.ack
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }

    pub fn load(head: Head, payload: &[u8]) -> Result<Ping, Error> {
        debug_assert_eq!(head.kind(), Kind::Ping);

        if !head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }

        if payload.len() != 8 {
            return Err(Error::BadFrameSize);
        }

        let ack = head.flag() & ACK_FLAG != 0;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(payload);

        Ok(Ping { ack, payload: buf })
    }

    pub fn encode<B: BufMut>(&self, dst: &mut B) {
        tracing::trace!(ack = self.ack, "encoding PING");

        let flags = if self.ack { ACK_FLAG } else { 0 };
        let head = Head::new(Kind::Ping, flags, StreamId::CONNECTION);

        head.encode(self.payload.len(), dst);
        dst.put(&self.payload[..]);
    }
}

impl From<Ping> for Frame {
    fn from(src: Ping) -> Frame {
        Frame::Ping(src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_requires_exactly_8_bytes() {
        let head = Head::new(Kind::Ping, 0, StreamId::CONNECTION);
        assert_eq!(Ping::load(head, &[0u8; 4]).unwrap_err(), Error::BadFrameSize);
    }

    #[test]
    fn non_ack_echoes_with_ack_set() {
        let ping = Ping::ping(*b"abcdefgh");
        let mut buf = Vec::new();
        ping.encode(&mut buf);
        let (head, len) = Head::parse(&buf);
        let parsed = Ping::load(head, &buf[super::HEADER_LEN..super::HEADER_LEN + len as usize]).unwrap();
        assert!(!parsed.is_ack());
        let pong = Ping::pong(parsed.into_payload());
        assert!(pong.is_ack());
    }
}
