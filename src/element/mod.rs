//! Elements and the state-change harness.
//!
//! An [`Element`] is a handle shared between the application, its parent
//! bin and streaming threads. It pairs a user-supplied [`ElementImpl`]
//! with the generic state machine:
//!
//! - [`Element::set_state`] decomposes a request into adjacent steps
//! - each step runs [`ElementImpl::enter`], the base behaviour selected by
//!   the element's [`ElementFlags`], then [`ElementImpl::leave`]
//! - sinks return `ASYNC` on the way to PAUSED until their first buffer
//!   arrives through [`Element::chain`]
//! - live sources return `NO_PREROLL` in PAUSED
//!
//! # Example
//!
//! ```rust
//! use parallax_state::element::{Element, ElementFlags, ElementImpl};
//! use parallax_state::state::{State, StateChangeReturn};
//!
//! struct Null;
//! impl ElementImpl for Null {}
//!
//! let sink = Element::builder("sink").flags(ElementFlags::SINK).build(Null);
//! assert_eq!(sink.set_state(State::Paused), StateChangeReturn::Async);
//! assert_eq!(sink.current_state(), State::Ready);
//! assert_eq!(sink.pending_state(), Some(State::Paused));
//! sink.set_state(State::Null);
//! ```

mod base;
mod context;
pub(crate) mod handle;
mod harness;
mod pad;
mod record;
mod traits;

pub use context::ElementContext;
pub use handle::{Element, ElementBuilder, ElementId, WeakElement};
pub use pad::{Pad, PadDirection};
pub use traits::{ElementFlags, ElementImpl};
