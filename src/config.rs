//! Engine configuration (spec.md §6 "Configuration").
//!
//! A plain builder struct, the way the teacher's own `client::Builder`
//! / `server::Builder` configure handshake parameters.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::executor::{Executor, SingleThreadExecutor};

/// Resolved configuration for a `Server` (spec.md §6 table).
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub backlog: u32,
    pub no_delay: bool,
    pub max_idle_connections: usize,
    pub max_request_size: usize,
    pub max_concurrent_streams_per_connection: u32,
    pub max_header_list_size: usize,
    pub max_header_table_size: u32,
    pub output_buffer_size: usize,
    pub patience_threshold: u32,
    pub poll_timeout: Duration,
    pub executor: Arc<dyn Executor>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("backlog", &self.backlog)
            .field("no_delay", &self.no_delay)
            .field("max_idle_connections", &self.max_idle_connections)
            .field("max_request_size", &self.max_request_size)
            .field("max_concurrent_streams_per_connection", &self.max_concurrent_streams_per_connection)
            .field("max_header_list_size", &self.max_header_list_size)
            .field("max_header_table_size", &self.max_header_table_size)
            .field("output_buffer_size", &self.output_buffer_size)
            .field("patience_threshold", &self.patience_threshold)
            .field("poll_timeout", &self.poll_timeout)
            .finish()
    }
}

/// Builds a `Config`, defaulting every field per spec.md §6.
pub struct Builder {
    host: IpAddr,
    port: u16,
    backlog: u32,
    no_delay: bool,
    max_idle_connections: usize,
    max_request_size: usize,
    max_concurrent_streams_per_connection: u32,
    max_header_list_size: usize,
    max_header_table_size: u32,
    output_buffer_size: usize,
    patience_threshold: u32,
    poll_timeout: Duration,
    executor: Option<Arc<dyn Executor>>,
}

impl Default for Builder {
    fn default() -> Self {
        Builder {
            host: IpAddr::from([127, 0, 0, 1]),
            port: 0,
            backlog: 1024,
            no_delay: true,
            max_idle_connections: 1024,
            max_request_size: 1 << 20,
            max_concurrent_streams_per_connection: 128,
            max_header_list_size: 16 << 20,
            max_header_table_size: 4096,
            output_buffer_size: 16 * 1024,
            patience_threshold: 32,
            poll_timeout: Duration::from_millis(500),
            executor: None,
        }
    }
}

macro_rules! setter {
    ($name:ident: $ty:ty) => {
        pub fn $name(mut self, v: $ty) -> Self {
            self.$name = v;
            self
        }
    };
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    setter!(host: IpAddr);
    setter!(port: u16);
    setter!(backlog: u32);
    setter!(no_delay: bool);
    setter!(max_idle_connections: usize);
    setter!(max_request_size: usize);
    setter!(max_concurrent_streams_per_connection: u32);
    setter!(max_header_list_size: usize);
    setter!(max_header_table_size: u32);
    setter!(output_buffer_size: usize);
    setter!(patience_threshold: u32);
    setter!(poll_timeout: Duration);

    pub fn executor(mut self, executor: impl Executor) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    pub fn build(self) -> Config {
        Config {
            host: self.host,
            port: self.port,
            backlog: self.backlog,
            no_delay: self.no_delay,
            max_idle_connections: self.max_idle_connections,
            max_request_size: self.max_request_size,
            max_concurrent_streams_per_connection: self.max_concurrent_streams_per_connection,
            max_header_list_size: self.max_header_list_size,
            max_header_table_size: self.max_header_table_size,
            output_buffer_size: self.output_buffer_size,
            patience_threshold: self.patience_threshold,
            poll_timeout: self.poll_timeout,
            executor: self.executor.unwrap_or_else(|| Arc::new(SingleThreadExecutor::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Builder::new().port(8080).build();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.max_concurrent_streams_per_connection, 128);
        assert!(cfg.patience_threshold > 0);
    }
}
