//! # Parallax state
//!
//! The element state-change protocol of the Parallax pipeline engine.
//!
//! Elements move through `NULL -> READY -> PAUSED -> PLAYING`. A request
//! for a target state propagates through bins to every child, sinks first
//! and sources last, and each step returns one of four outcomes:
//!
//! - **SUCCESS**: the element is in the requested state
//! - **ASYNC**: accepted; completion follows on another thread (a sink
//!   waiting for its first buffer)
//! - **NO_PREROLL**: accepted, but the element is live and never prerolls
//! - **FAILURE**: the step failed; an error message is on the bus
//!
//! Completion of every step is reported on the pipeline's [`Bus`](bus::Bus),
//! children always before their bin.
//!
//! ## Quick Start
//!
//! ```rust
//! use parallax_state::prelude::*;
//! use std::time::Duration;
//!
//! let pipeline = Pipeline::new("pipeline");
//! let src = FakeSrc::new(FakeSrcConfig::default().with_num_buffers(10)).into_element("src");
//! let sink = FakeSink::new(FakeSinkConfig::default()).into_element("sink");
//! pipeline.add_many(&[&src, &sink])?;
//! src.link(&sink)?;
//!
//! assert_eq!(pipeline.set_state(State::Paused), StateChangeReturn::Async);
//! let (ret, current, _) = pipeline.get_state(Some(Duration::from_secs(5)));
//! assert_eq!((ret, current), (StateChangeReturn::Success, State::Paused));
//!
//! pipeline.set_state(State::Null);
//! # Ok::<(), parallax_state::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod bus;
pub mod clock;
pub mod element;
pub mod elements;
pub mod error;
pub mod message;
pub mod observability;
pub mod pipeline;
pub mod state;
mod sync;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::buffer::Buffer;
    pub use crate::bus::{Bus, BusConfig};
    pub use crate::clock::{Clock, ClockTime};
    pub use crate::element::{Element, ElementContext, ElementFlags, ElementImpl};
    pub use crate::elements::{FakeSink, FakeSinkConfig, FakeSrc, FakeSrcConfig, Identity};
    pub use crate::error::{Error, Result};
    pub use crate::message::{Message, MessageKind, MessageType};
    pub use crate::pipeline::{Bin, Pipeline, PipelineConfig};
    pub use crate::state::{State, StateChange, StateChangeReturn};
}

pub use error::{Error, Result};
