//! I/O buffers (spec.md §4.2, §4.6).

mod input;
mod output;

pub use self::input::InputBuffer;
pub use self::output::{OutputBuffer, OutputQueue};
