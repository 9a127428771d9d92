//! Pads: the single input and output port of an element.
//!
//! Pads only carry the peer link. Sources have an output pad, sinks an
//! input pad, everything else one of each. Bins have none; links between
//! elements in different bins are made directly between the leaves.

use crate::element::{Element, WeakElement};
use crate::sync::lock;
use std::sync::Mutex;

/// Direction of a pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadDirection {
    /// Receives buffers from upstream.
    Input,
    /// Sends buffers downstream.
    Output,
}

/// A connection point on an element.
pub struct Pad {
    name: &'static str,
    direction: PadDirection,
    peer: Mutex<Option<WeakElement>>,
}

impl Pad {
    /// The input pad, named `sink`.
    pub(crate) fn input() -> Self {
        Self {
            name: "sink",
            direction: PadDirection::Input,
            peer: Mutex::new(None),
        }
    }

    /// The output pad, named `src`.
    pub(crate) fn output() -> Self {
        Self {
            name: "src",
            direction: PadDirection::Output,
            peer: Mutex::new(None),
        }
    }

    /// Pad name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Pad direction.
    pub fn direction(&self) -> PadDirection {
        self.direction
    }

    /// The element on the other side of the link, if still alive.
    pub fn peer(&self) -> Option<Element> {
        lock(&self.peer).as_ref().and_then(WeakElement::upgrade)
    }

    /// Whether the pad is linked to a live peer.
    pub fn is_linked(&self) -> bool {
        self.peer().is_some()
    }

    pub(crate) fn set_peer(&self, peer: Option<WeakElement>) {
        *lock(&self.peer) = peer;
    }
}

impl std::fmt::Debug for Pad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pad")
            .field("name", &self.name)
            .field("direction", &self.direction)
            .field("linked", &self.is_linked())
            .finish()
    }
}
