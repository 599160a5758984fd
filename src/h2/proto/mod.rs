//! HTTP/2 protocol state machines (spec.md §4.4, §4.5).

pub mod connection;
pub mod streams;

pub use self::connection::{Connection, Step, PREFACE};
