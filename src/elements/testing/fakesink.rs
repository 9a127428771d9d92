//! FakeSink: a sink that prerolls and counts buffers.

use crate::buffer::Buffer;
use crate::clock::{Clock, ClockTime};
use crate::element::{Element, ElementContext, ElementFlags, ElementImpl};
use crate::error::{Error, Result};
use crate::message::MessageKind;
use crate::state::{StateChange, StateChangeReturn};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Configuration for [`FakeSink`].
#[derive(Clone)]
pub struct FakeSinkConfig {
    /// Wait for a first buffer before completing PAUSED.
    pub async_preroll: bool,
    /// Fail this transition from `enter`.
    pub state_error: Option<StateChange>,
    /// Clock offered to the pipeline.
    pub clock: Option<Arc<dyn Clock>>,
}

impl Default for FakeSinkConfig {
    fn default() -> Self {
        Self {
            async_preroll: true,
            state_error: None,
            clock: None,
        }
    }
}

impl FakeSinkConfig {
    /// Set whether the sink prerolls asynchronously.
    pub fn with_async_preroll(mut self, async_preroll: bool) -> Self {
        self.async_preroll = async_preroll;
        self
    }

    /// Fail `transition`.
    pub fn with_state_error(mut self, transition: StateChange) -> Self {
        self.state_error = Some(transition);
        self
    }

    /// Offer `clock` to the pipeline.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }
}

impl fmt::Debug for FakeSinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeSinkConfig")
            .field("async_preroll", &self.async_preroll)
            .field("state_error", &self.state_error)
            .field("clock", &self.clock.as_ref().map(|c| c.name().to_string()))
            .finish()
    }
}

/// Counters shared between a [`FakeSink`] and the test that built it.
#[derive(Debug)]
pub struct FakeSinkStats {
    buffers: AtomicU64,
    base_time: AtomicU64,
    eos: AtomicBool,
}

impl Default for FakeSinkStats {
    fn default() -> Self {
        Self {
            buffers: AtomicU64::new(0),
            base_time: AtomicU64::new(ClockTime::NONE.nanos()),
            eos: AtomicBool::new(false),
        }
    }
}

impl FakeSinkStats {
    /// Buffers received.
    pub fn buffers(&self) -> u64 {
        self.buffers.load(Ordering::Acquire)
    }

    /// Base time seen with the last buffer.
    pub fn base_time(&self) -> ClockTime {
        ClockTime::from_nanos(self.base_time.load(Ordering::Acquire))
    }

    /// Whether the last buffer of the stream arrived.
    pub fn is_eos(&self) -> bool {
        self.eos.load(Ordering::Acquire)
    }
}

/// A sink that discards buffers after counting them.
///
/// Prerolls on its first buffer unless built with `async_preroll = false`,
/// and posts `Eos` when a buffer flagged as last arrives.
///
/// # Example
///
/// ```rust
/// use parallax_state::elements::{FakeSink, FakeSinkConfig};
/// use parallax_state::state::{State, StateChangeReturn};
///
/// let sink = FakeSink::new(FakeSinkConfig::default());
/// let stats = sink.stats();
/// let sink = sink.into_element("sink");
///
/// assert_eq!(sink.set_state(State::Paused), StateChangeReturn::Async);
/// assert_eq!(stats.buffers(), 0);
/// sink.set_state(State::Null);
/// ```
pub struct FakeSink {
    config: FakeSinkConfig,
    stats: Arc<FakeSinkStats>,
}

impl FakeSink {
    /// Create a sink.
    pub fn new(config: FakeSinkConfig) -> Self {
        Self {
            config,
            stats: Arc::new(FakeSinkStats::default()),
        }
    }

    /// Shared counters.
    pub fn stats(&self) -> Arc<FakeSinkStats> {
        Arc::clone(&self.stats)
    }

    /// Build the element.
    pub fn into_element(self, name: impl Into<String>) -> Element {
        let mut flags = ElementFlags::SINK;
        if self.config.clock.is_some() {
            flags = flags | ElementFlags::PROVIDES_CLOCK;
        }
        Element::builder(name)
            .flags(flags)
            .async_preroll(self.config.async_preroll)
            .build(self)
    }
}

impl ElementImpl for FakeSink {
    fn enter(
        &mut self,
        ctx: &ElementContext,
        transition: StateChange,
    ) -> Result<StateChangeReturn> {
        if self.config.state_error == Some(transition) {
            return Err(Error::state_change(ctx.name(), transition, "configured to fail"));
        }
        if transition == StateChange::ReadyToPaused {
            self.stats.eos.store(false, Ordering::Release);
        }
        Ok(StateChangeReturn::Success)
    }

    fn chain(&mut self, ctx: &ElementContext, buffer: Buffer) -> Result<()> {
        self.stats.buffers.fetch_add(1, Ordering::AcqRel);
        self.stats
            .base_time
            .store(ctx.base_time().nanos(), Ordering::Release);
        tracing::trace!(element = %ctx.name(), seq = buffer.sequence(), pts = %buffer.pts(), "received buffer");

        if buffer.is_last() && !self.stats.eos.swap(true, Ordering::AcqRel) {
            ctx.post(MessageKind::Eos);
        }
        Ok(())
    }

    fn provide_clock(&self) -> Option<Arc<dyn Clock>> {
        self.config.clock.clone()
    }
}
