//! The HTTP/2 connection state machine (spec.md §4.4).
//!
//! Grounded in the teacher's `proto/connection.rs`: a per-connection
//! struct owning the stream table, the HPACK codecs and the handshake
//! phase, driven one frame at a time. Unlike the teacher, this is not
//! a `Future` polled by a Tokio reactor: it exposes plain methods
//! called from the engine's own `mio`-based reactor (spec.md §9
//! "Coroutine control flow").

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, Method};

use crate::buffer::{InputBuffer, OutputBuffer, OutputQueue};
use crate::dispatch::{dispatch, H2Command, H2CommandQueue, IncomingRequest, ResponseHandle, RouteTable};
use crate::error::ConnectionError;
use crate::executor::Executor;
use crate::h2::frame::{
    self, Continuation, Data, GoAway, Head, Kind, Ping, Priority, Reason, Reset, Settings,
    StreamId, WindowUpdate, HEADER_LEN,
};
use crate::h2::hpack::{self, Pseudo};
use crate::h2::proto::streams::stream::PendingData;
use crate::h2::proto::streams::{State, Store, Stream, Window};

/// The 24-byte connection preface every HTTP/2 connection begins with
/// (spec.md §6 "Wire formats").
pub const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Phase {
    /// Waiting for the 24-byte preface (only when the connection was
    /// not reached via an h2c upgrade, where the preface is implicit).
    Preface,
    /// Preface consumed (or skipped, for h2c); server's SETTINGS must
    /// go out and the client's first frame must be SETTINGS.
    AwaitingClientSettings,
    Open,
    /// Mid-HEADERS: a CONTINUATION is mandatory next and no other
    /// frame may interleave (spec.md §4.4 "HEADERS interrupted by a
    /// different frame type").
    ExpectingContinuation(StreamId),
    Closed,
}

struct PeerSettings {
    initial_window_size: u32,
    max_frame_size: u32,
}

impl Default for PeerSettings {
    fn default() -> Self {
        PeerSettings {
            initial_window_size: frame::DEFAULT_INITIAL_WINDOW_SIZE,
            max_frame_size: frame::DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// One HTTP/2 connection's full state (spec.md §3 "HTTP/2 connection
/// state machine").
pub struct Connection {
    phase: Phase,
    streams: Store,
    highest_client_stream_id: StreamId,

    connection_send_window: Window,
    connection_recv_window: Window,

    hpack_decoder: hpack::Decoder,
    hpack_encoder: hpack::Encoder,

    peer: PeerSettings,
    max_concurrent_streams: u32,
    max_header_list_size: usize,

    /// Bytes of a HEADERS/CONTINUATION sequence accumulated so far.
    header_block: BytesMut,
    header_block_stream: Option<StreamId>,
    header_block_end_stream: bool,

    /// Malformed-but-not-fatal events counted toward spec.md §5's
    /// "patience" bad-client accounting.
    penalty_count: u32,
    patience_threshold: u32,

    max_frame_size_local: u32,
    output_buffer_size: usize,

    commands: H2CommandQueue,
    pending_dispatch: VecDeque<(IncomingRequest, ResponseHandle)>,
}

pub enum Step {
    /// No complete frame was available; caller should wait for more
    /// input.
    NeedMoreData,
    /// A frame was consumed and handled.
    Progressed,
    /// The connection hit a fatal error; GOAWAY has been queued and
    /// the caller should close the channel once the output queue
    /// drains.
    Terminated(ConnectionError),
}

impl Connection {
    /// Begins a new HTTP/2 connection. Pass `skip_preface: true` when
    /// the connection was reached through an h2c upgrade, where the
    /// preface is never sent (spec.md §4.3).
    pub fn new(
        max_concurrent_streams: u32,
        max_header_list_size: usize,
        patience_threshold: u32,
        output_buffer_size: usize,
        out: &OutputQueue,
        skip_preface: bool,
    ) -> Connection {
        let mut conn = Connection {
            phase: if skip_preface { Phase::AwaitingClientSettings } else { Phase::Preface },
            streams: Store::new(),
            highest_client_stream_id: StreamId::new(0),
            connection_send_window: Window::new(frame::DEFAULT_INITIAL_WINDOW_SIZE),
            connection_recv_window: Window::new(frame::DEFAULT_INITIAL_WINDOW_SIZE),
            hpack_decoder: hpack::Decoder::new(max_header_list_size),
            hpack_encoder: hpack::Encoder::new(),
            peer: PeerSettings::default(),
            max_concurrent_streams,
            max_header_list_size,
            header_block: BytesMut::new(),
            header_block_stream: None,
            header_block_end_stream: false,
            penalty_count: 0,
            patience_threshold,
            max_frame_size_local: frame::DEFAULT_MAX_FRAME_SIZE,
            output_buffer_size,
            commands: H2CommandQueue::default(),
            pending_dispatch: VecDeque::new(),
        };
        conn.send_initial_settings(out);
        conn
    }

    fn send_initial_settings(&mut self, out: &OutputQueue) {
        let mut settings = Settings::default();
        settings.set_enable_push(Some(false));
        settings.set_max_concurrent_streams(Some(self.max_concurrent_streams));
        settings.set_initial_window_size(Some(frame::DEFAULT_INITIAL_WINDOW_SIZE));
        settings.set_max_header_list_size(Some(self.max_header_list_size as u32));

        let mut bytes = BytesMut::new();
        settings.encode(&mut bytes);
        let mut buf = OutputBuffer::with_capacity(self.output_buffer_size);
        buf.extend(&bytes);
        out.enqueue(buf);
    }

    /// Seeds stream 1, already in `HALF_CLOSED_REMOTE`, for a request
    /// that arrived over HTTP/1.1 before the h2c upgrade completed
    /// (spec.md §4.3).
    pub fn seed_upgraded_stream(&mut self, method: Method, path: String, headers: HeaderMap, body: Vec<u8>) {
        let id = StreamId::new(1);
        let mut stream = Stream::new(id, self.peer.initial_window_size, frame::DEFAULT_INITIAL_WINDOW_SIZE);
        stream.state = State::HalfClosedRemote;
        stream.request_pseudo = Pseudo::request(method, path);
        stream.request_fields = headers;
        stream.request_body = body;
        stream.end_stream_seen = true;
        self.streams.insert(id, stream);
        self.highest_client_stream_id = id;
        self.maybe_dispatch(id);
    }

    pub fn command_queue(&self) -> H2CommandQueue {
        self.commands.clone()
    }

    /// Attempts to consume a single frame (or the preface) from
    /// `input`. Returns `NeedMoreData` when the buffer does not yet
    /// hold a complete unit.
    pub fn poll(&mut self, input: &mut InputBuffer, out: &OutputQueue) -> Step {
        if self.phase == Phase::Closed {
            return Step::Terminated(ConnectionError(Reason::NO_ERROR));
        }

        if self.phase == Phase::Preface {
            if !input.available(PREFACE.len()) {
                return Step::NeedMoreData;
            }
            if !input.prefix_match(PREFACE) {
                return self.fail(Reason::PROTOCOL_ERROR, out);
            }
            input.skip(PREFACE.len()).ok();
            self.phase = Phase::AwaitingClientSettings;
            return Step::Progressed;
        }

        if !input.available(HEADER_LEN) {
            return Step::NeedMoreData;
        }
        input.mark();
        let mut head_bytes = [0u8; HEADER_LEN];
        if input.read_bytes(&mut head_bytes).is_err() {
            input.reset_to_mark();
            return Step::NeedMoreData;
        }
        let (head, len) = Head::parse(&head_bytes);
        let len = len as usize;

        if len > self.max_frame_size_local as usize {
            input.reset_to_mark();
            return self.fail(Reason::FRAME_SIZE_ERROR, out);
        }
        if !input.available(len) {
            input.reset_to_mark();
            return Step::NeedMoreData;
        }
        let payload = match input.read_vec(len) {
            Ok(v) => Bytes::from(v),
            Err(_) => {
                input.reset_to_mark();
                return Step::NeedMoreData;
            }
        };

        if self.phase == Phase::AwaitingClientSettings && head.kind() != Kind::Settings {
            return self.fail(Reason::PROTOCOL_ERROR, out);
        }

        if let Phase::ExpectingContinuation(expected) = self.phase {
            if head.kind() != Kind::Continuation || head.stream_id() != expected {
                return self.fail(Reason::PROTOCOL_ERROR, out);
            }
        }

        self.dispatch_frame(head, payload, out)
    }

    fn dispatch_frame(&mut self, head: Head, payload: Bytes, out: &OutputQueue) -> Step {
        let result: Result<(), ConnectionError> = match head.kind() {
            Kind::Data => Data::load(head, payload).map_err(Into::into).and_then(|f| self.on_data(f, out)),
            Kind::Headers => crate::h2::frame::Headers::load(head, payload)
                .map_err(Into::into)
                .and_then(|f| self.on_headers(f, out)),
            Kind::Priority => Priority::load(head, &payload).map(|_| ()).map_err(Into::into),
            Kind::Reset => Reset::load(head, &payload).map_err(Into::into).and_then(|f| self.on_reset(f)),
            Kind::Settings => Settings::load(head, &payload).map_err(Into::into).and_then(|f| self.on_settings(f, out)),
            Kind::PushPromise => Err(ConnectionError(Reason::PROTOCOL_ERROR)),
            Kind::Ping => Ping::load(head, &payload).map_err(Into::into).and_then(|f| self.on_ping(f, out)),
            Kind::GoAway => GoAway::load(&payload).map(|_| { self.phase = Phase::Closed; }).map_err(Into::into),
            Kind::WindowUpdate => WindowUpdate::load(head, &payload).map_err(Into::into).and_then(|f| self.on_window_update(f, out)),
            Kind::Continuation => Continuation::load(head, payload).map_err(Into::into).and_then(|f| self.on_continuation(f, out)),
            Kind::Unknown(_) => {
                self.penalty_count += 1;
                Ok(())
            }
        };

        match result {
            Ok(()) => {
                if self.penalty_count > self.patience_threshold {
                    return self.fail(Reason::ENHANCE_YOUR_CALM, out);
                }
                Step::Progressed
            }
            Err(e) => self.fail(e.0, out),
        }
    }

    fn fail(&mut self, reason: Reason, out: &OutputQueue) -> Step {
        self.send_goaway(reason, out);
        self.phase = Phase::Closed;
        Step::Terminated(ConnectionError(reason))
    }

    fn send_goaway(&mut self, reason: Reason, out: &OutputQueue) {
        let goaway = GoAway::new(self.highest_client_stream_id, reason);
        let mut bytes = BytesMut::new();
        goaway.encode(&mut bytes);
        let mut buf = OutputBuffer::with_capacity(self.output_buffer_size);
        buf.extend(&bytes);
        out.enqueue(buf);
        out.close();
    }

    // -- per-frame-type handling (spec.md §4.4 dispatch table) -------

    fn on_settings(&mut self, settings: Settings, out: &OutputQueue) -> Result<(), ConnectionError> {
        if settings.is_ack() {
            return Ok(());
        }

        if let Some(v) = settings.max_frame_size() {
            if !(frame::DEFAULT_MAX_FRAME_SIZE..=frame::MAX_MAX_FRAME_SIZE).contains(&v) {
                return Err(ConnectionError(Reason::PROTOCOL_ERROR));
            }
            self.peer.max_frame_size = v;
        }
        if let Some(new_initial) = settings.initial_window_size() {
            let delta = new_initial as i64 - self.peer.initial_window_size as i64;
            self.peer.initial_window_size = new_initial;
            self.streams.for_each_mut(|s| {
                if !s.is_closed() {
                    s.send_window.apply_settings_delta(delta);
                }
            });
        }

        if self.phase == Phase::AwaitingClientSettings {
            self.phase = Phase::Open;
        }

        let ack = Settings::ack();
        let mut bytes = BytesMut::new();
        ack.encode(&mut bytes);
        let mut buf = OutputBuffer::with_capacity(self.output_buffer_size);
        buf.extend(&bytes);
        out.enqueue(buf);
        Ok(())
    }

    fn on_ping(&mut self, ping: Ping, out: &OutputQueue) -> Result<(), ConnectionError> {
        if ping.is_ack() {
            return Ok(());
        }
        let pong = Ping::pong(ping.into_payload());
        let mut bytes = BytesMut::new();
        pong.encode(&mut bytes);
        let mut buf = OutputBuffer::with_capacity(self.output_buffer_size);
        buf.extend(&bytes);
        out.enqueue(buf);
        Ok(())
    }

    fn on_window_update(&mut self, wu: WindowUpdate, out: &OutputQueue) -> Result<(), ConnectionError> {
        if wu.stream_id().is_zero() {
            if self.connection_send_window.increment(wu.size_increment() as i64).is_err() {
                return Err(ConnectionError(Reason::FLOW_CONTROL_ERROR));
            }
        } else if let Some(stream) = self.streams.find_mut(wu.stream_id()) {
            if stream.send_window.increment(wu.size_increment() as i64).is_err() {
                let id = wu.stream_id();
                self.reset_stream(id, Reason::FLOW_CONTROL_ERROR, out);
                return Ok(());
            }
        }
        self.pump_pending_sends(out);
        Ok(())
    }

    fn on_reset(&mut self, reset: Reset) -> Result<(), ConnectionError> {
        if let Some(stream) = self.streams.find_mut(reset.stream_id()) {
            stream.state = State::Closed;
        }
        Ok(())
    }

    fn on_data(&mut self, data: Data, out: &OutputQueue) -> Result<(), ConnectionError> {
        let n = data.payload().len() as u32;
        if self.connection_recv_window.available() < n as i64 {
            return Err(ConnectionError(Reason::FLOW_CONTROL_ERROR));
        }
        self.connection_recv_window.consume(n);

        let end_stream = data.is_end_stream();
        let stream_id = data.stream_id();
        let stream = match self.streams.find_mut(stream_id) {
            Some(s) => s,
            None => {
                self.reset_stream(stream_id, Reason::STREAM_CLOSED, out);
                return Ok(());
            }
        };
        if stream.recv_window.available() < n as i64 {
            self.reset_stream(stream_id, Reason::FLOW_CONTROL_ERROR, out);
            return Ok(());
        }
        stream.recv_window.consume(n);
        stream.request_body.extend_from_slice(data.payload());
        if end_stream {
            stream.end_stream_seen = true;
            stream.state = match stream.state {
                State::Open => State::HalfClosedRemote,
                other => other,
            };
        }

        self.replenish_connection_window(out);
        if end_stream {
            self.maybe_dispatch(stream_id);
        }
        Ok(())
    }

    fn replenish_connection_window(&mut self, out: &OutputQueue) {
        let target = frame::DEFAULT_INITIAL_WINDOW_SIZE as i64;
        let deficit = target - self.connection_recv_window.available();
        if deficit > 0 {
            let _ = self.connection_recv_window.increment(deficit);
            let wu = WindowUpdate::new(StreamId::new(0), deficit as u32);
            let mut bytes = BytesMut::new();
            wu.encode(&mut bytes);
            let mut buf = OutputBuffer::with_capacity(self.output_buffer_size);
            buf.extend(&bytes);
            out.enqueue(buf);
        }
    }

    fn on_headers(&mut self, headers: crate::h2::frame::Headers, out: &OutputQueue) -> Result<(), ConnectionError> {
        let id = headers.stream_id();
        if !id.is_client_initiated() || id <= self.highest_client_stream_id {
            return Err(ConnectionError(Reason::PROTOCOL_ERROR));
        }

        if self.streams.len() as u32 >= self.max_concurrent_streams {
            self.reset_stream(id, Reason::REFUSED_STREAM, out);
            return Ok(());
        }

        self.highest_client_stream_id = id;
        let mut stream = Stream::new(id, self.peer.initial_window_size, frame::DEFAULT_INITIAL_WINDOW_SIZE);
        stream.state = if headers.is_end_stream() { State::HalfClosedRemote } else { State::Open };
        self.streams.insert(id, stream);

        self.header_block.clear();
        self.header_block.extend_from_slice(headers.header_block_fragment());
        self.header_block_stream = Some(id);
        self.header_block_end_stream = headers.is_end_stream();

        if headers.is_end_headers() {
            self.finish_header_block(out)?;
        } else {
            self.phase = Phase::ExpectingContinuation(id);
        }
        Ok(())
    }

    fn on_continuation(&mut self, cont: Continuation, out: &OutputQueue) -> Result<(), ConnectionError> {
        let end_headers = cont.is_end_headers();
        self.header_block.extend_from_slice(&cont.into_fragment());
        if end_headers {
            self.phase = Phase::Open;
            self.finish_header_block(out)?;
        }
        Ok(())
    }

    fn finish_header_block(&mut self, out: &OutputQueue) -> Result<(), ConnectionError> {
        let id = match self.header_block_stream.take() {
            Some(id) => id,
            None => return Ok(()),
        };
        let end_stream = self.header_block_end_stream;
        let block = self.header_block.split().freeze();

        // A decode failure desynchronizes the shared compression state
        // and must tear down the whole connection (spec.md §4.5).
        let decoded = self.hpack_decoder.decode(&block).map_err(ConnectionError)?;

        let stream = match self.streams.find_mut(id) {
            Some(s) => s,
            None => return Ok(()),
        };
        stream.request_pseudo = decoded.pseudo;
        stream.request_fields = decoded.fields;
        if end_stream {
            stream.end_stream_seen = true;
        }

        if end_stream {
            self.maybe_dispatch(id);
        }
        let _ = out;
        Ok(())
    }

    fn maybe_dispatch(&mut self, id: StreamId) {
        let (method, path, headers, body) = {
            let stream = match self.streams.find_mut(id) {
                Some(s) => s,
                None => return,
            };
            if stream.dispatched || !stream.end_stream_seen {
                return;
            }
            stream.dispatched = true;
            (
                stream.request_pseudo.method.clone(),
                stream.request_pseudo.path.clone(),
                stream.request_fields.clone(),
                std::mem::take(&mut stream.request_body),
            )
        };
        let (method, path) = match (method, path) {
            (Some(m), Some(p)) => (m, p),
            _ => {
                if let Some(stream) = self.streams.find_mut(id) {
                    stream.state = State::Closed;
                }
                return;
            }
        };

        let request = IncomingRequest { method, path, headers, body };
        let response = ResponseHandle::new_http2(id, self.commands.clone());
        self.pending_dispatch.push_back((request, response));
    }

    /// Drains requests queued by `maybe_dispatch` into the dispatcher.
    /// Split from `maybe_dispatch` itself so the borrow checker doesn't
    /// need `routes`/`executor` threaded through every frame handler.
    pub fn flush_dispatch(&mut self, routes: &dyn RouteTable, executor: &dyn Executor) {
        while let Some((request, response)) = self.pending_dispatch.pop_front() {
            dispatch(routes, executor, request, response);
        }
    }

    fn reset_stream(&mut self, id: StreamId, reason: Reason, out: &OutputQueue) {
        if let Some(stream) = self.streams.find_mut(id) {
            stream.state = State::Closed;
        }
        let reset = Reset::new(id, reason);
        let mut bytes = BytesMut::new();
        reset.encode(&mut bytes);
        let mut buf = OutputBuffer::with_capacity(self.output_buffer_size);
        buf.extend(&bytes);
        out.enqueue(buf);
    }

    /// Drains handler-submitted `H2Command`s into real frames,
    /// respecting flow control; called once per reactor tick (spec.md
    /// §5 "the reactor thread is the sole mutator of connection
    /// state").
    pub fn pump_pending_sends(&mut self, out: &OutputQueue) {
        let commands: Vec<_> = {
            let mut q = self.commands.lock().unwrap();
            q.drain(..).collect()
        };
        for (id, cmd) in commands {
            self.apply_command(id, cmd, out);
        }

        let ids: Vec<StreamId> = {
            let mut v = Vec::new();
            self.streams.for_each_mut(|s| {
                if !s.send_queue.is_empty() {
                    v.push(s.id);
                }
            });
            v
        };
        for id in ids {
            self.flush_stream_send_queue(id, out);
        }
        self.streams.evict_closed();
    }

    fn apply_command(&mut self, id: StreamId, cmd: H2Command, out: &OutputQueue) {
        match cmd {
            H2Command::Respond { status, headers, body, streaming } => {
                let pseudo = Pseudo::response(
                    http::StatusCode::from_u16(status).unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR),
                );
                let block = self.hpack_encoder.encode(&pseudo, &headers);
                let end_stream = body.is_none() && !streaming;
                let mut bytes = BytesMut::new();
                crate::h2::frame::Headers::encode(id, end_stream, &block, self.peer.max_frame_size as usize, &mut bytes);
                let mut buf = OutputBuffer::with_capacity(self.output_buffer_size);
                buf.extend(&bytes);
                out.enqueue(buf);
                self.close_local_if(id, end_stream);

                if let Some(body) = body {
                    if let Some(stream) = self.streams.find_mut(id) {
                        stream.send_queue.push_back(PendingData { bytes: body, end_stream: true });
                    }
                    self.flush_stream_send_queue(id, out);
                }
            }
            H2Command::Data { bytes, end_stream } => {
                if let Some(stream) = self.streams.find_mut(id) {
                    stream.send_queue.push_back(PendingData { bytes, end_stream });
                }
                self.flush_stream_send_queue(id, out);
            }
            H2Command::Trailers(headers) => {
                let pseudo = Pseudo::default();
                let block = self.hpack_encoder.encode(&pseudo, &headers);
                let mut bytes = BytesMut::new();
                crate::h2::frame::Headers::encode(id, true, &block, self.peer.max_frame_size as usize, &mut bytes);
                let mut buf = OutputBuffer::with_capacity(self.output_buffer_size);
                buf.extend(&bytes);
                out.enqueue(buf);
                self.close_local_if(id, true);
            }
            H2Command::Reset(reason) => {
                self.reset_stream(id, reason, out);
            }
        }
    }

    fn close_local_if(&mut self, id: StreamId, end_stream: bool) {
        if !end_stream {
            return;
        }
        if let Some(stream) = self.streams.find_mut(id) {
            stream.state = match stream.state {
                State::Open => State::HalfClosedLocal,
                State::HalfClosedRemote => State::Closed,
                other => other,
            };
        }
    }

    fn flush_stream_send_queue(&mut self, id: StreamId, out: &OutputQueue) {
        let max_frame = self.peer.max_frame_size as usize;
        loop {
            let conn_credit = self.connection_send_window.available();
            if conn_credit <= 0 {
                return;
            }
            let (chunk, end_stream, drained) = {
                let stream = match self.streams.find_mut(id) {
                    Some(s) => s,
                    None => return,
                };
                let pending = match stream.send_queue.front_mut() {
                    Some(p) => p,
                    None => return,
                };
                let credit = stream.send_window.available().min(conn_credit).max(0) as usize;
                let take = credit.min(max_frame).min(pending.bytes.len());
                if take == 0 && !pending.bytes.is_empty() {
                    return;
                }
                let chunk = pending.bytes.split_to(take);
                let drained = pending.bytes.is_empty();
                let end_stream = drained && pending.end_stream;
                stream.send_window.consume(chunk.len() as u32);
                (chunk, end_stream, drained)
            };
            self.connection_send_window.consume(chunk.len() as u32);

            let data = Data::new(id, chunk, end_stream);
            let mut bytes = BytesMut::new();
            data.encode(&mut bytes);
            let mut buf = OutputBuffer::with_capacity(self.output_buffer_size);
            buf.extend(&bytes);
            out.enqueue(buf);

            if drained {
                if let Some(stream) = self.streams.find_mut(id) {
                    stream.send_queue.pop_front();
                }
                self.close_local_if(id, end_stream);
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.phase == Phase::Closed
    }
}
