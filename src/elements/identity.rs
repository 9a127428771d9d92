//! Identity element with callbacks for debugging.
//!
//! A pass-through element that allows inspection of buffers via callbacks.

use crate::buffer::Buffer;
use crate::element::{Element, ElementContext, ElementImpl};
use crate::error::Result;
use crate::state::{StateChange, StateChangeReturn};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Callback type for buffer inspection.
pub type BufferCallback = Box<dyn Fn(&Buffer) + Send + Sync>;

/// An identity element that passes buffers through unchanged while
/// optionally calling callbacks for inspection.
///
/// # Example
///
/// ```rust
/// use parallax_state::elements::Identity;
///
/// let identity = Identity::new().on_buffer(|buf| {
///     println!("buffer seq={}", buf.sequence());
/// });
/// let stats = identity.stats();
/// let element = identity.into_element("debug-point");
/// assert_eq!(element.name(), "debug-point");
/// assert_eq!(stats.buffer_count(), 0);
/// ```
pub struct Identity {
    callback: Option<BufferCallback>,
    stats: Arc<IdentityStats>,
}

impl Identity {
    /// Create a new identity element.
    pub fn new() -> Self {
        Self {
            callback: None,
            stats: Arc::new(IdentityStats::default()),
        }
    }

    /// Set a callback to be called for each buffer.
    pub fn on_buffer<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Buffer) + Send + Sync + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Shared statistics, readable after the element is built.
    pub fn stats(&self) -> Arc<IdentityStats> {
        Arc::clone(&self.stats)
    }

    /// Build the element.
    pub fn into_element(self, name: impl Into<String>) -> Element {
        Element::builder(name).build(self)
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementImpl for Identity {
    fn enter(
        &mut self,
        _ctx: &ElementContext,
        transition: StateChange,
    ) -> Result<StateChangeReturn> {
        if transition == StateChange::ReadyToPaused {
            self.stats.reset();
        }
        Ok(StateChangeReturn::Success)
    }

    fn chain(&mut self, ctx: &ElementContext, buffer: Buffer) -> Result<()> {
        self.stats.count.fetch_add(1, Ordering::Relaxed);
        if let Some(cb) = &self.callback {
            cb(&buffer);
        }
        ctx.push(buffer)
    }
}

/// Statistics for the identity element.
#[derive(Debug, Default)]
pub struct IdentityStats {
    count: AtomicU64,
}

impl IdentityStats {
    /// Buffers passed through since the last READY to PAUSED step.
    pub fn buffer_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ClockTime;
    use crate::element::ElementFlags;
    use crate::error::Error;
    use crate::state::State;
    use std::sync::atomic::AtomicUsize;

    struct Drain;
    impl ElementImpl for Drain {}

    #[test]
    fn test_identity_passthrough_and_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let identity = Identity::new().on_buffer(move |_buf| {
            calls_clone.fetch_add(1, Ordering::Relaxed);
        });
        let stats = identity.stats();
        let element = identity.into_element("identity");
        let sink = Element::builder("sink")
            .flags(ElementFlags::SINK)
            .async_preroll(false)
            .build(Drain);
        element.link(&sink).unwrap();

        sink.set_state(State::Paused);
        element.set_state(State::Paused);
        for seq in 0..5 {
            element.chain(Buffer::new(seq, ClockTime::ZERO)).unwrap();
        }

        assert_eq!(calls.load(Ordering::Relaxed), 5);
        assert_eq!(stats.buffer_count(), 5);

        element.set_state(State::Null);
        sink.set_state(State::Null);
    }

    #[test]
    fn test_identity_refuses_data_in_ready() {
        let element = Identity::new().into_element("identity");
        element.set_state(State::Ready);
        assert_eq!(
            element.chain(Buffer::new(0, ClockTime::ZERO)),
            Err(Error::Flushing)
        );
        element.set_state(State::Null);
    }

    #[test]
    fn test_identity_unlinked() {
        let element = Identity::new().into_element("identity");
        element.set_state(State::Paused);
        assert!(matches!(
            element.chain(Buffer::new(0, ClockTime::ZERO)),
            Err(Error::NotLinked(_))
        ));
        element.set_state(State::Null);
    }
}
