//! The single-threaded, non-blocking event loop (spec.md §4.1
//! "Reactor").
//!
//! Grounded in `other_examples/ab061287_kill-ux-01-server`'s
//! `mio`-based connection loop: one `mio::Poll`, one listener, and a
//! token-indexed map of live connections. All connection state
//! mutation happens here or synchronously underneath a call made from
//! here — handler threads only ever touch the thread-safe output
//! queue and command queue (spec.md §5).

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};

use crate::config::Config;
use crate::connection::ConnectionContext;
use crate::dispatch::RouteTable;
use crate::pool::BufferPool;

const LISTENER: Token = Token(0);

/// Bounds how many live connections are scanned for closure in a
/// single loop iteration, so a large connection count cannot turn
/// per-tick bookkeeping into an O(n) stall (spec.md §4.1).
const MAX_CONNECTIONS_TO_CHECK_PER_LOOP: usize = 10;

pub struct Reactor {
    poll: Poll,
    listener: TcpListener,
    connections: HashMap<Token, ConnectionContext>,
    next_token: usize,
    evict_cursor: usize,
    config: Arc<Config>,
    routes: Arc<dyn RouteTable>,
    pool: Arc<BufferPool>,
}

impl Reactor {
    pub fn bind(addr: SocketAddr, config: Arc<Config>, routes: Arc<dyn RouteTable>) -> io::Result<Reactor> {
        let std_listener = std::net::TcpListener::bind(addr)?;
        std_listener.set_nonblocking(true)?;
        let mut listener = TcpListener::from_std(std_listener);

        let poll = Poll::new()?;
        poll.registry().register(&mut listener, LISTENER, Interest::READABLE)?;

        let buffer_size = config.max_request_size.max(16 * 1024);
        let pool = Arc::new(BufferPool::new(config.max_idle_connections, buffer_size));

        Ok(Reactor {
            poll,
            listener,
            connections: HashMap::new(),
            next_token: 1,
            evict_cursor: 0,
            config,
            routes,
            pool,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs until `should_stop` returns `true` after a poll cycle.
    pub fn run(&mut self, mut should_stop: impl FnMut() -> bool) -> io::Result<()> {
        let mut events = Events::with_capacity(1024);
        loop {
            self.poll.poll(&mut events, Some(self.config.poll_timeout))?;

            for event in events.iter() {
                if event.token() == LISTENER {
                    self.accept_all()?;
                    continue;
                }
                self.handle_connection_event(event.token(), event.is_readable(), event.is_writable());
            }

            self.tick_all();
            self.evict_closed();

            if should_stop() {
                return Ok(());
            }
        }
    }

    fn accept_all(&mut self) -> io::Result<()> {
        loop {
            match self.listener.accept() {
                Ok((stream, _peer)) => self.register_connection(stream)?,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    fn register_connection(&mut self, mut stream: TcpStream) -> io::Result<()> {
        if self.config.no_delay {
            let _ = stream.set_nodelay(true);
        }
        if self.connections.len() >= self.config.max_idle_connections {
            // Over capacity: drop the connection rather than let an
            // unbounded number of sockets pile up (spec.md §6
            // "max_idle_connections").
            return Ok(());
        }

        let token = Token(self.next_token);
        self.next_token += 1;
        self.poll.registry().register(&mut stream, token, Interest::READABLE)?;

        let input = self.pool.acquire();
        let ctx = ConnectionContext::accept(stream, token, &self.config, input);
        self.connections.insert(token, ctx);
        Ok(())
    }

    fn handle_connection_event(&mut self, token: Token, readable: bool, writable: bool) {
        let ctx = match self.connections.get_mut(&token) {
            Some(c) => c,
            None => return,
        };

        if writable {
            match ctx.on_writable() {
                Ok(done) => {
                    if done {
                        let _ = self.poll.registry().reregister(&mut ctx.stream, token, Interest::READABLE);
                    }
                }
                Err(_) => {
                    self.remove(token);
                    return;
                }
            }
        }

        if readable {
            ctx.on_readable(&self.config, self.routes.as_ref());
            if ctx.has_pending_output() {
                let _ = self.poll.registry().reregister(
                    &mut self.connections.get_mut(&token).unwrap().stream,
                    token,
                    Interest::READABLE | Interest::WRITABLE,
                );
            }
        }
    }

    fn tick_all(&mut self) {
        for ctx in self.connections.values_mut() {
            ctx.on_tick();
            if ctx.has_pending_output() {
                let _ = self.poll.registry().reregister(&mut ctx.stream, ctx.token, Interest::READABLE | Interest::WRITABLE);
            }
        }
    }

    fn evict_closed(&mut self) {
        if self.connections.is_empty() {
            return;
        }
        let tokens: Vec<Token> = self.connections.keys().copied().collect();
        let mut checked = 0;
        let mut to_remove = Vec::new();
        while checked < MAX_CONNECTIONS_TO_CHECK_PER_LOOP.min(tokens.len()) {
            let idx = (self.evict_cursor + checked) % tokens.len();
            let token = tokens[idx];
            if self.connections.get(&token).map(|c| c.is_closing()).unwrap_or(false) {
                to_remove.push(token);
            }
            checked += 1;
        }
        self.evict_cursor = (self.evict_cursor + checked) % tokens.len().max(1);
        for token in to_remove {
            self.remove(token);
        }
    }

    fn remove(&mut self, token: Token) {
        if let Some(mut ctx) = self.connections.remove(&token) {
            let _ = self.poll.registry().deregister(&mut ctx.stream);
            self.pool.release(ctx.into_input_buffer());
        }
    }
}
