//! Top-level builder tying configuration, routing, and the reactor
//! together (spec.md §1 "Purpose & Scope").

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::{Builder as ConfigBuilder, Config};
use crate::dispatch::RouteTable;
use crate::reactor::Reactor;

/// An embeddable HTTP/1.1 + h2c server. Construction never binds a
/// socket; call `run` (or `run_until`) to start serving.
pub struct Server {
    config: Arc<Config>,
    routes: Arc<dyn RouteTable>,
}

impl Server {
    pub fn new(config: Config, routes: impl RouteTable + 'static) -> Server {
        Server { config: Arc::new(config), routes: Arc::new(routes) }
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Binds and serves forever.
    pub fn run(self) -> io::Result<()> {
        self.run_until(Arc::new(AtomicBool::new(false)))
    }

    /// Binds and serves until `stop` is set to `true` from another
    /// thread (e.g. a signal handler) — the only externally visible
    /// shutdown mechanism the engine exposes (spec.md §1 Non-goals:
    /// "graceful drain policy is the embedder's responsibility").
    pub fn run_until(self, stop: Arc<AtomicBool>) -> io::Result<()> {
        let addr = SocketAddr::new(self.config.host, self.config.port);
        let mut reactor = Reactor::bind(addr, self.config, self.routes)?;
        reactor.run(|| stop.load(Ordering::Relaxed))
    }

    /// Binds immediately and returns the reactor plus the bound
    /// address, letting a test (or an embedder needing the ephemeral
    /// port) drive `run` separately.
    pub fn bind(self) -> io::Result<(Reactor, SocketAddr)> {
        let addr = SocketAddr::new(self.config.host, self.config.port);
        let reactor = Reactor::bind(addr, self.config, self.routes)?;
        let local = reactor.local_addr()?;
        Ok((reactor, local))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Handler;

    struct Empty;
    impl RouteTable for Empty {
        fn find(&self, _method: &http::Method, _path: &str) -> Option<Arc<dyn Handler>> {
            None
        }
    }

    #[test]
    fn bind_picks_ephemeral_port() {
        let config = Server::builder().port(0).build();
        let server = Server::new(config, Empty);
        let (_reactor, addr) = server.bind().unwrap();
        assert_ne!(addr.port(), 0);
    }
}
