//! Containers: bins and the top-level pipeline.
//!
//! - [`Bin`]: groups elements and drives them as one, sinks first
//! - [`Pipeline`]: a bin with a bus, clock selection and running time
//!
//! # Example
//!
//! ```rust
//! use parallax_state::element::{Element, ElementFlags, ElementImpl};
//! use parallax_state::pipeline::Pipeline;
//! use parallax_state::state::{State, StateChangeReturn};
//!
//! struct Passive;
//! impl ElementImpl for Passive {}
//!
//! let pipeline = Pipeline::new("pipeline");
//! let sink = Element::builder("sink")
//!     .flags(ElementFlags::SINK)
//!     .async_preroll(false)
//!     .build(Passive);
//! pipeline.add(&sink)?;
//!
//! assert_eq!(pipeline.set_state(State::Playing), StateChangeReturn::Success);
//! assert_eq!(sink.current_state(), State::Playing);
//! pipeline.set_state(State::Null);
//! # Ok::<(), parallax_state::error::Error>(())
//! ```

pub mod bin;
mod graph;
mod toplevel;

pub use bin::Bin;
pub use toplevel::{ClockSelection, Pipeline, PipelineConfig};
