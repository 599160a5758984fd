//! DATA frame (RFC 9113 §6.1).

use bytes::{BufMut, Bytes};

use super::{Error, Frame, Head, Kind, StreamId};

const END_STREAM: u8 = 0x1;
const PADDED: u8 = 0x8;

#[derive(Debug)]
pub struct Data {
    stream_id: StreamId,
    data: Bytes,
    end_stream: bool,
}

impl Data {
    pub fn new(stream_id: StreamId, data: Bytes, end_stream: bool) -> Data {
        Data { stream_id, data, end_stream }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn payload(&self) -> &Bytes {
        &self.data
    }

    pub fn into_payload(self) -> Bytes {
        self.data
    }

    pub fn is_end_stream(&self) -> bool {
        self.end_stream
    }

    /// `payload` is the frame body with the 9-byte header already
    /// stripped; padding (if any) has already been validated by the
    /// caller against the declared length.
    pub fn load(head: Head, mut payload: Bytes) -> Result<Data, Error> {
        if head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }

        let is_padded = head.flag() & PADDED == PADDED;
        if is_padded {
            if payload.is_empty() {
                return Err(Error::TooMuchPadding);
            }
            let pad_len = payload[0] as usize;
            payload = payload.split_off(1);
            if pad_len > payload.len() {
                return Err(Error::TooMuchPadding);
            }
            payload.truncate(payload.len() - pad_len);
        }

        let end_stream = head.flag() & END_STREAM == END_STREAM;

        Ok(Data { stream_id: head.stream_id(), data: payload, end_stream })
    }

    pub fn encode<B: BufMut>(&self, dst: &mut B) {
        let flags = if self.end_stream { END_STREAM } else { 0 };
        let head = Head::new(Kind::Data, flags, self.stream_id);
        head.encode(self.data.len(), dst);
        dst.put(&self.data[..]);
    }
}

impl From<Data> for Frame {
    fn from(src: Data) -> Frame {
        Frame::Data(src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_without_padding() {
        let d = Data::new(StreamId::new(1), Bytes::from_static(b"hello"), true);
        let mut buf = Vec::new();
        d.encode(&mut buf);
        let (head, len) = Head::parse(&buf);
        let payload = Bytes::copy_from_slice(&buf[super::HEADER_LEN..super::HEADER_LEN + len as usize]);
        let parsed = Data::load(head, payload).unwrap();
        assert_eq!(parsed.payload(), &Bytes::from_static(b"hello"));
        assert!(parsed.is_end_stream());
    }

    #[test]
    fn strips_padding() {
        let head = Head::new(Kind::Data, PADDED, StreamId::new(1));
        let mut payload = vec![2u8]; // pad_len = 2
        payload.extend_from_slice(b"hi");
        payload.extend_from_slice(&[0, 0]);
        let parsed = Data::load(head, Bytes::from(payload)).unwrap();
        assert_eq!(parsed.payload(), &Bytes::from_static(b"hi"));
    }
}
