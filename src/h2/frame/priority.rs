//! PRIORITY frame (RFC 9113 §5.3.2). Parsed and ignored per spec.md §1
//! ("priority hints ... parsed and ignored").

use super::{Error, Frame, Head, Kind, StreamId};

#[derive(Debug)]
pub struct Priority {
    stream_id: StreamId,
}

impl Priority {
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn load(head: Head, payload: &[u8]) -> Result<Priority, Error> {
        if head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }
        if payload.len() != 5 {
            return Err(Error::BadFrameSize);
        }
        // Stream dependency + exclusive bit + weight are discarded;
        // the core does not maintain a priority tree (spec.md §1).
        Ok(Priority { stream_id: head.stream_id() })
    }
}

impl From<Priority> for Frame {
    fn from(src: Priority) -> Frame {
        Frame::Priority(src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_length_is_frame_size_error() {
        let head = Head::new(Kind::Priority, 0, StreamId::new(1));
        assert_eq!(Priority::load(head, &[0u8; 4]).unwrap_err(), Error::BadFrameSize);
    }
}
