//! A single accepted TCP connection: owns the byte buffers and
//! dispatches to either the HTTP/1.1 or HTTP/2 state machine
//! (spec.md §3 "Connection context").

use std::io;
use std::time::Instant;

use mio::net::TcpStream;
use mio::Token;

use crate::buffer::{InputBuffer, OutputQueue};
use crate::config::Config;
use crate::dispatch::RouteTable;
use crate::h1;
use crate::h2;

enum Mode {
    Http1(h1::Connection),
    Http2(h2::Connection),
}

/// Owns one accepted socket end to end: reading bytes in, handing
/// complete requests to the dispatcher, and draining the output
/// queue back out. Exactly one reactor tick at a time touches this
/// (spec.md §5 "at most one state-machine step runs at a time").
pub struct ConnectionContext {
    pub stream: TcpStream,
    pub token: Token,
    input: InputBuffer,
    output: OutputQueue,
    mode: Mode,
    pub last_active: Instant,
    closing: bool,
}

impl ConnectionContext {
    /// Takes ownership of `input` rather than allocating one, so the
    /// reactor can hand out a reused buffer from its `BufferPool`
    /// (spec.md §5 "Resource lifetimes").
    pub fn accept(stream: TcpStream, token: Token, config: &Config, input: InputBuffer) -> ConnectionContext {
        ConnectionContext {
            stream,
            token,
            input,
            output: OutputQueue::new(),
            mode: Mode::Http1(h1::Connection::new(config.max_request_size)),
            last_active: Instant::now(),
            closing: false,
        }
    }

    /// Reclaims this connection's input buffer so it can be returned
    /// to the pool once the connection is torn down.
    pub fn into_input_buffer(self) -> InputBuffer {
        self.input
    }

    pub fn is_closing(&self) -> bool {
        self.closing && self.output.is_empty()
    }

    /// Reads whatever the socket currently offers and advances
    /// whichever protocol state machine is active.
    pub fn on_readable(&mut self, config: &Config, routes: &dyn RouteTable) {
        self.last_active = Instant::now();
        match self.input.add_data(&mut self.stream) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(_) => {
                self.closing = true;
                return;
            }
        }

        loop {
            match &mut self.mode {
                Mode::Http1(conn) => {
                    if conn.is_awaiting_response() {
                        return;
                    }
                    if conn.is_fresh() && self.input.available(h2::PREFACE.len()) {
                        if self.input.prefix_match(h2::PREFACE) {
                            // Prior-knowledge HTTP/2 (spec.md §4.2):
                            // the preface itself is left in the buffer
                            // for `h2::Connection::poll` to consume.
                            self.mode = Mode::Http2(h2::Connection::new(
                                config.max_concurrent_streams_per_connection,
                                config.max_header_list_size,
                                config.patience_threshold,
                                config.output_buffer_size,
                                &self.output,
                                false,
                            ));
                            continue;
                        }
                    }
                    match conn.poll(&mut self.input) {
                        h1::Step::NeedMoreData => return,
                        h1::Step::Progressed => {
                            conn.dispatch_request(self.output.clone(), routes, config.executor.as_ref());
                            return;
                        }
                        h1::Step::UpgradeToH2c { method, path, headers, body, http2_settings: _ } => {
                            crate::h1::response::write_switching_protocols(&self.output);
                            let mut h2_conn = h2::Connection::new(
                                config.max_concurrent_streams_per_connection,
                                config.max_header_list_size,
                                config.patience_threshold,
                                config.output_buffer_size,
                                &self.output,
                                true,
                            );
                            h2_conn.seed_upgraded_stream(method, path, headers, body);
                            h2_conn.flush_dispatch(routes, config.executor.as_ref());
                            self.mode = Mode::Http2(h2_conn);
                            let mut adopted = InputBuffer::new(config.max_request_size.max(16 * 1024));
                            adopted.adopt(&mut self.input);
                            self.input = adopted;
                        }
                        h1::Step::Error(e) => {
                            crate::h1::response::write_status_only(&self.output, e.status_code(), &http::HeaderMap::new(), true);
                            self.closing = true;
                            return;
                        }
                        h1::Step::Closed => {
                            self.closing = true;
                            return;
                        }
                    }
                }
                Mode::Http2(conn) => {
                    loop {
                        match conn.poll(&mut self.input, &self.output) {
                            h2::Step::NeedMoreData => break,
                            h2::Step::Progressed => continue,
                            h2::Step::Terminated(_) => {
                                self.closing = true;
                                break;
                            }
                        }
                    }
                    conn.flush_dispatch(routes, config.executor.as_ref());
                    return;
                }
            }
        }
    }

    /// Called once a handler thread has written a response, to
    /// re-arm request parsing (HTTP/1.1) and pick pipelined requests
    /// back up.
    pub fn on_response_written(&mut self) {
        if let Mode::Http1(conn) = &mut self.mode {
            conn.reset_for_next_request();
            if conn.should_close() {
                self.closing = true;
            }
        }
    }

    /// Periodic tick: lets HTTP/2 connections pump handler-submitted
    /// response commands into real frames even when no new bytes
    /// arrived (spec.md §5).
    pub fn on_tick(&mut self) {
        if let Mode::Http2(conn) = &mut self.mode {
            conn.pump_pending_sends(&self.output);
            if conn.is_closed() {
                self.closing = true;
            }
        }
    }

    /// Drains the output queue into the socket. Returns `true` once
    /// fully drained (caller may stop watching for writability).
    pub fn on_writable(&mut self) -> io::Result<bool> {
        let done = self.output.drain_into(&mut self.stream)?;
        if done {
            self.on_response_written();
        }
        Ok(done)
    }

    pub fn has_pending_output(&self) -> bool {
        !self.output.is_empty()
    }
}
