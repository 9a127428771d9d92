//! Built-in elements.
//!
//! - [`Identity`]: pass-through with a buffer callback
//! - [`FakeSrc`], [`FakeSink`], [`FailingElement`]: protocol test elements

mod identity;
pub mod testing;

pub use identity::{BufferCallback, Identity, IdentityStats};
pub use testing::{FailingElement, FakeSink, FakeSinkConfig, FakeSinkStats, FakeSrc, FakeSrcConfig};
