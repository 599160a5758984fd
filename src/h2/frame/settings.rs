//! SETTINGS frame (RFC 9113 §6.5).

use bytes::BufMut;

use super::{Error, Frame, Head, Kind, StreamId};

const ACK_FLAG: u8 = 0x1;
const ENTRY_LEN: usize = 6;

pub const HEADER_TABLE_SIZE: u16 = 0x1;
pub const ENABLE_PUSH: u16 = 0x2;
pub const MAX_CONCURRENT_STREAMS: u16 = 0x3;
pub const INITIAL_WINDOW_SIZE: u16 = 0x4;
pub const MAX_FRAME_SIZE: u16 = 0x5;
pub const MAX_HEADER_LIST_SIZE: u16 = 0x6;

pub const DEFAULT_SETTINGS_HEADER_TABLE_SIZE: usize = 4_096;
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16_384;
pub const MAX_MAX_FRAME_SIZE: u32 = 16_777_215;
pub const DEFAULT_INITIAL_WINDOW_SIZE: u32 = 65_535;

/// A single SETTINGS frame: either an update (zero or more entries) or
/// an ACK (always empty).
#[derive(Debug, Clone, Default)]
pub struct Settings {
    ack: bool,
    header_table_size: Option<u32>,
    enable_push: Option<bool>,
    max_concurrent_streams: Option<u32>,
    initial_window_size: Option<u32>,
    max_frame_size: Option<u32>,
    max_header_list_size: Option<u32>,
}

impl Settings {
    pub fn ack() -> Settings {
        Settings { ack: true, ..Default::default() }
    }

    pub fn is_ack(&self) -> bool {
        self.ack
    }

    pub fn set_header_table_size(&mut self, v: Option<u32>) {
        self.header_table_size = v;
    }
    pub fn header_table_size(&self) -> Option<u32> {
        self.header_table_size
    }

    pub fn set_enable_push(&mut self, v: Option<bool>) {
        self.enable_push = v;
    }
    pub fn enable_push(&self) -> Option<bool> {
        self.enable_push
    }

    pub fn set_max_concurrent_streams(&mut self, v: Option<u32>) {
        self.max_concurrent_streams = v;
    }
    pub fn max_concurrent_streams(&self) -> Option<u32> {
        self.max_concurrent_streams
    }

    pub fn set_initial_window_size(&mut self, v: Option<u32>) {
        self.initial_window_size = v;
    }
    pub fn initial_window_size(&self) -> Option<u32> {
        self.initial_window_size
    }

    pub fn set_max_frame_size(&mut self, v: Option<u32>) {
        if let Some(val) = v {
            assert!(DEFAULT_MAX_FRAME_SIZE <= val && val <= MAX_MAX_FRAME_SIZE);
        }
        self.max_frame_size = v;
    }
    pub fn max_frame_size(&self) -> Option<u32> {
        self.max_frame_size
    }

    pub fn set_max_header_list_size(&mut self, v: Option<u32>) {
        self.max_header_list_size = v;
    }
    pub fn max_header_list_size(&self) -> Option<u32> {
        self.max_header_list_size
    }

    /// Parses the SETTINGS payload. `payload` must already have the
    /// frame header stripped.
    pub fn load(head: Head, payload: &[u8]) -> Result<Settings, Error> {
        if !head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }

        let is_ack = head.flag() & ACK_FLAG == ACK_FLAG;

        if is_ack {
            if !payload.is_empty() {
                return Err(Error::InvalidPayloadAckSettings);
            }
            return Ok(Settings::ack());
        }

        if payload.len() % ENTRY_LEN != 0 {
            return Err(Error::PartialSettingLength);
        }

        let mut settings = Settings::default();

        for chunk in payload.chunks(ENTRY_LEN) {
            let id = u16::from_be_bytes([chunk[0], chunk[1]]);
            let value = u32::from_be_bytes([chunk[2], chunk[3], chunk[4], chunk[5]]);

            match id {
                id if id == HEADER_TABLE_SIZE => settings.header_table_size = Some(value),
                id if id == ENABLE_PUSH => settings.enable_push = Some(value != 0),
                id if id == MAX_CONCURRENT_STREAMS => settings.max_concurrent_streams = Some(value),
                id if id == INITIAL_WINDOW_SIZE => settings.initial_window_size = Some(value),
                id if id == MAX_FRAME_SIZE => settings.max_frame_size = Some(value),
                id if id == MAX_HEADER_LIST_SIZE => settings.max_header_list_size = Some(value),
                // Unrecognised ids are silently ignored (spec.md §4.4).
                _ => {}
            }
        }

        Ok(settings)
    }

    pub fn encode<B: BufMut>(&self, dst: &mut B) {
        let flags = if self.ack { ACK_FLAG } else { 0 };
        let head = Head::new(Kind::Settings, flags, StreamId::CONNECTION);

        if self.ack {
            head.encode(0, dst);
            return;
        }

        let mut entries = Vec::new();
        if let Some(v) = self.header_table_size {
            entries.push((HEADER_TABLE_SIZE, v));
        }
        if let Some(v) = self.enable_push {
            entries.push((ENABLE_PUSH, v as u32));
        }
        if let Some(v) = self.max_concurrent_streams {
            entries.push((MAX_CONCURRENT_STREAMS, v));
        }
        if let Some(v) = self.initial_window_size {
            entries.push((INITIAL_WINDOW_SIZE, v));
        }
        if let Some(v) = self.max_frame_size {
            entries.push((MAX_FRAME_SIZE, v));
        }
        if let Some(v) = self.max_header_list_size {
            entries.push((MAX_HEADER_LIST_SIZE, v));
        }

        head.encode(entries.len() * ENTRY_LEN, dst);
        for (id, value) in entries {
            dst.put_u16(id);
            dst.put_u32(value);
        }
    }
}

impl From<Settings> for Frame {
    fn from(src: Settings) -> Frame {
        Frame::Settings(src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_round_trips_empty() {
        let s = Settings::ack();
        let mut buf = Vec::new();
        s.encode(&mut buf);
        let (head, len) = Head::parse(&buf);
        assert_eq!(len, 0);
        let parsed = Settings::load(head, &[]).unwrap();
        assert!(parsed.is_ack());
    }

    #[test]
    fn bad_length_is_frame_size_error() {
        let head = Head::new(Kind::Settings, 0, StreamId::CONNECTION);
        let err = Settings::load(head, &[0u8; 7]).unwrap_err();
        assert_eq!(err, Error::PartialSettingLength);
    }

    #[test]
    fn unknown_ids_ignored() {
        let head = Head::new(Kind::Settings, 0, StreamId::CONNECTION);
        let mut payload = Vec::new();
        payload.extend_from_slice(&0x99u16.to_be_bytes());
        payload.extend_from_slice(&1u32.to_be_bytes());
        let parsed = Settings::load(head, &payload).unwrap();
        assert_eq!(parsed.max_frame_size(), None);
    }
}
