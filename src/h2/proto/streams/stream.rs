//! Per-stream state (spec.md §3 "HTTP/2 stream", §4.5).

use std::collections::VecDeque;

use bytes::Bytes;
use http::HeaderMap;

use crate::h2::frame::StreamId;
use crate::h2::hpack::Pseudo;

use super::flow_control::Window;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum State {
    Idle,
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
    Closed,
    ReservedLocal,
    ReservedRemote,
}

/// Data queued to be sent once flow-control credit and frame-size
/// limits allow (spec.md §4.5 "if credit is insufficient, the frame is
/// queued until WINDOW_UPDATE arrives").
#[derive(Debug)]
pub struct PendingData {
    pub bytes: Bytes,
    pub end_stream: bool,
}

#[derive(Debug)]
pub struct Stream {
    pub id: StreamId,
    pub state: State,

    pub request_pseudo: Pseudo,
    pub request_fields: HeaderMap,
    pub request_body: Vec<u8>,
    pub request_trailers: Option<HeaderMap>,

    pub send_window: Window,
    pub recv_window: Window,
    /// Bytes received but not yet credited back via WINDOW_UPDATE.
    pub recv_unreplenished: u32,

    pub end_stream_seen: bool,
    pub dispatched: bool,

    pub send_queue: VecDeque<PendingData>,

    /// Linked-list bookkeeping for the store's queue of streams with
    /// buffered outgoing data awaiting credit (mirrors the teacher's
    /// `proto/streams/store.rs` intrusive queue).
    pub next_pending_send: Option<super::store::Key>,
    pub is_pending_send: bool,
}

impl Stream {
    pub fn new(id: StreamId, init_send_window: u32, init_recv_window: u32) -> Stream {
        Stream {
            id,
            state: State::Idle,
            request_pseudo: Pseudo::default(),
            request_fields: HeaderMap::new(),
            request_body: Vec::new(),
            request_trailers: None,
            send_window: Window::new(init_send_window),
            recv_window: Window::new(init_recv_window),
            recv_unreplenished: 0,
            end_stream_seen: false,
            dispatched: false,
            send_queue: VecDeque::new(),
            next_pending_send: None,
            is_pending_send: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }
}
