//! Element runtime context.
//!
//! The context is handed to every [`ElementImpl`](crate::element::ElementImpl)
//! hook. It is cheap to clone and may be moved into a streaming thread: it
//! holds the element weakly, so a thread owning a context does not keep its
//! element alive.

use crate::buffer::Buffer;
use crate::clock::{Clock, ClockTime};
use crate::element::{Element, WeakElement};
use crate::error::{Error, Result};
use crate::message::{Message, MessageKind};
use crate::state::State;
use std::sync::Arc;

/// Runtime context of an element.
#[derive(Clone)]
pub struct ElementContext {
    element: WeakElement,
    name: Arc<str>,
}

impl ElementContext {
    pub(crate) fn new(element: WeakElement, name: Arc<str>) -> Self {
        Self { element, name }
    }

    /// Name of the element.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The element, if it is still alive.
    pub fn element(&self) -> Option<Element> {
        self.element.upgrade()
    }

    /// Post a message from this element.
    pub fn post(&self, kind: MessageKind) -> bool {
        match self.element() {
            Some(element) => element.post(Message::new(self.name.as_ref(), kind)),
            None => false,
        }
    }

    /// Post an error message from this element.
    pub fn post_error(&self, error: Error) -> bool {
        tracing::warn!(element = %self.name, %error, "posting error");
        self.post(MessageKind::Error { error })
    }

    /// Post a warning message from this element.
    pub fn post_warning(&self, message: impl Into<String>) -> bool {
        self.post(MessageKind::Warning {
            message: message.into(),
        })
    }

    /// Push a buffer to the peer of the output pad.
    ///
    /// Fails with [`Error::NotLinked`] when there is no peer and with
    /// [`Error::Flushing`] when the peer does not accept data in its
    /// current state.
    pub fn push(&self, buffer: Buffer) -> Result<()> {
        let element = self.element().ok_or(Error::Flushing)?;
        let peer = element
            .src_pad()
            .and_then(|pad| pad.peer())
            .ok_or_else(|| Error::NotLinked(format!("{}:src", self.name)))?;
        peer.chain(buffer)
    }

    /// Current state of the element.
    pub fn current_state(&self) -> State {
        self.element()
            .map(|e| e.current_state())
            .unwrap_or(State::Null)
    }

    /// Whether the element is live.
    pub fn is_live(&self) -> bool {
        self.element().is_some_and(|e| e.is_live())
    }

    /// Base time distributed by the pipeline, NONE before the first PLAYING.
    pub fn base_time(&self) -> ClockTime {
        self.element()
            .map(|e| e.base_time())
            .unwrap_or(ClockTime::NONE)
    }

    /// Clock distributed by the pipeline.
    pub fn clock(&self) -> Option<Arc<dyn Clock>> {
        self.element().and_then(|e| e.clock())
    }

    /// Current running time: clock time minus base time.
    pub fn running_time(&self) -> ClockTime {
        let base = self.base_time();
        match self.clock() {
            Some(clock) if base.is_some() => clock.now() - base,
            _ => ClockTime::NONE,
        }
    }
}

impl std::fmt::Debug for ElementContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementContext")
            .field("name", &self.name)
            .field("alive", &self.element().is_some())
            .finish()
    }
}
