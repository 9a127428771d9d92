//! Error types for the state-change protocol.
//!
//! Only [`StateChangeReturn::Failure`](crate::state::StateChangeReturn) is a
//! hard outcome of a transition. The errors here describe *why* an element
//! failed; the harness turns them into a `Failure` return plus a bus
//! [`Message::Error`](crate::message::Message).

use crate::state::{State, StateChange};
use thiserror::Error;

/// Result type alias using the crate's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for state-change operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An element hook refused a transition.
    #[error("element '{element}' failed {transition}: {reason}")]
    StateChange {
        /// Name of the failing element.
        element: String,
        /// The transition being applied.
        transition: StateChange,
        /// Human-readable cause.
        reason: String,
    },

    /// A device or other resource could not be opened or allocated.
    #[error("resource error: {0}")]
    Resource(String),

    /// A streaming thread failed after the transition was accepted.
    #[error("streaming error: {0}")]
    Streaming(String),

    /// The element is not in a state where it accepts data.
    #[error("element is flushing")]
    Flushing,

    /// A pad has no peer to push to.
    #[error("pad '{0}' is not linked")]
    NotLinked(String),

    /// Linking two pads failed.
    #[error("link error: {0}")]
    Link(String),

    /// The element already belongs to another bin.
    #[error("element '{0}' already has a parent")]
    AlreadyHasParent(String),

    /// The element is not a child of this bin.
    #[error("element '{0}' is not a child of this bin")]
    NotAChild(String),

    /// A bin already has a child with this name.
    #[error("name '{0}' is already in use in this bin")]
    NameInUse(String),

    /// A bin cannot be added to itself or to one of its descendants.
    #[error("cannot add bin '{0}' to itself")]
    AddSelf(String),

    /// An element was asked to do something its current state forbids.
    #[error("invalid state {state:?}: {reason}")]
    InvalidState {
        /// Current state of the element.
        state: State,
        /// Why the request was rejected.
        reason: String,
    },
}

impl Error {
    /// Build a [`Error::StateChange`].
    pub fn state_change(
        element: impl Into<String>,
        transition: StateChange,
        reason: impl Into<String>,
    ) -> Self {
        Self::StateChange {
            element: element.into(),
            transition,
            reason: reason.into(),
        }
    }
}
