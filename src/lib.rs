//! Embeddable HTTP/1.1 + HTTP/2 cleartext (h2c) connection engine
//! (spec.md §1 "Purpose & Scope").
//!
//! A connection accepted by [`Server`] starts out speaking HTTP/1.1
//! and, if the client requests it, upgrades in place to HTTP/2 over
//! the same TCP stream (RFC 9113 §3.2) — no TLS, no ALPN, no protocol
//! sniffing beyond the literal `PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n`
//! connection preface. Routing and request handling are delegated to
//! an embedder-supplied [`RouteTable`]; this crate owns only the wire
//! protocol and the reactor that drives it.

pub mod buffer;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod h1;
pub mod h2;
pub mod pool;
pub mod reactor;
pub mod server;

pub use config::{Builder, Config};
pub use dispatch::{Handler, IncomingRequest, OutputStream, ResponseHandle, RouteTable};
pub use error::{ConnectionError, Error, Http1Error, RecvError, StreamError};
pub use executor::{Executor, SingleThreadExecutor, ThreadPerTaskExecutor};
pub use reactor::Reactor;
pub use server::Server;
