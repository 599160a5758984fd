//! HTTP/2 stream lifecycle management (spec.md §4.5).

pub mod flow_control;
pub mod store;
pub mod stream;

pub use self::flow_control::{Window, WindowSize, MAX_WINDOW_SIZE};
pub use self::store::{Key, Store};
pub use self::stream::{PendingData, State, Stream};
