//! HTTP/2 cleartext (h2c) support (spec.md §4.4, §4.5, §6 "h2c
//! upgrade").

pub mod frame;
pub mod hpack;
pub mod proto;

pub use self::proto::{Connection, Step, PREFACE};
