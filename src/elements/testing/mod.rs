//! Test elements with real streaming threads.
//!
//! - [`FakeSrc`]: pushes empty buffers, optionally live
//! - [`FakeSink`]: prerolls on its first buffer and counts the rest
//! - [`FailingElement`]: refuses one chosen transition

mod failing;
mod fakesink;
mod fakesrc;

pub use failing::FailingElement;
pub use fakesink::{FakeSink, FakeSinkConfig, FakeSinkStats};
pub use fakesrc::{FakeSrc, FakeSrcConfig};
