//! The top-level pipeline: a bin with a bus, a clock and running time.

use crate::bus::{Bus, BusConfig};
use crate::clock::{Clock, ClockTime, PipelineClock, SystemClock};
use crate::element::Element;
use crate::error::Result;
use crate::message::{Message, MessageKind};
use crate::pipeline::bin::{Bin, BinCore};
use crate::state::StateChange;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// How a pipeline picks its clock when going to PLAYING.
#[derive(Clone, Default)]
pub enum ClockSelection {
    /// First clock offered by a child in walk order (sinks first), falling
    /// back to the system clock.
    #[default]
    Auto,
    /// Always the system clock.
    System,
    /// A fixed clock.
    Fixed(Arc<dyn Clock>),
}

impl fmt::Debug for ClockSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockSelection::Auto => f.write_str("Auto"),
            ClockSelection::System => f.write_str("System"),
            ClockSelection::Fixed(clock) => f.debug_tuple("Fixed").field(&clock.name()).finish(),
        }
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Pipeline name.
    pub name: String,
    /// Configuration of the pipeline's bus.
    pub bus: BusConfig,
    /// Flush the bus when reaching NULL and unflush it when leaving NULL.
    ///
    /// Messages posted while the pipeline is in NULL are dropped.
    pub auto_flush_bus: bool,
    /// Clock selection policy.
    pub clock: ClockSelection,
}

impl PipelineConfig {
    /// Defaults for a pipeline called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            bus: BusConfig::default().with_name(format!("{name}-bus")),
            name,
            auto_flush_bus: true,
            clock: ClockSelection::Auto,
        }
    }

    /// Set the bus configuration.
    pub fn with_bus(mut self, bus: BusConfig) -> Self {
        self.bus = bus;
        self
    }

    /// Enable or disable automatic bus flushing.
    pub fn with_auto_flush_bus(mut self, auto_flush_bus: bool) -> Self {
        self.auto_flush_bus = auto_flush_bus;
        self
    }

    /// Set the clock selection policy.
    pub fn with_clock(mut self, clock: ClockSelection) -> Self {
        self.clock = clock;
        self
    }
}

pub(crate) struct PipelineCore {
    config: PipelineConfig,
    timing: PipelineClock,
    system_clock: Arc<dyn Clock>,
}

/// Pipeline work done before the children walk.
pub(crate) fn enter(
    pipeline: &Element,
    core: &PipelineCore,
    transition: StateChange,
) -> Result<()> {
    match transition {
        StateChange::NullToReady if core.config.auto_flush_bus => {
            if let Some(bus) = pipeline.bus() {
                bus.set_flushing(false);
            }
        }
        StateChange::ReadyToPaused => core.timing.reset(),
        StateChange::PausedToPlaying => {
            let clock = select_clock(pipeline, core);
            if core.timing.select(clock.clone()) {
                tracing::info!(pipeline = %pipeline.name(), clock = %clock.name(), "selected clock");
                pipeline.post(Message::new(
                    pipeline.name(),
                    MessageKind::NewClock {
                        clock: clock.name().to_string(),
                    },
                ));
            }
            let base_time = core.timing.play();
            tracing::debug!(pipeline = %pipeline.name(), %base_time, "distributing base time");
            distribute(pipeline, &Some(clock), base_time);
        }
        _ => {}
    }
    Ok(())
}

/// Pipeline work done after a successful children walk.
pub(crate) fn leave(
    pipeline: &Element,
    core: &PipelineCore,
    transition: StateChange,
) -> Result<()> {
    match transition {
        StateChange::PlayingToPaused => {
            core.timing.pause();
            tracing::debug!(
                pipeline = %pipeline.name(),
                running_time = %core.timing.running_time(),
                "paused running time"
            );
        }
        StateChange::ReadyToNull if core.config.auto_flush_bus => {
            if let Some(bus) = pipeline.bus() {
                bus.set_flushing(true);
            }
        }
        _ => {}
    }
    Ok(())
}

fn select_clock(pipeline: &Element, core: &PipelineCore) -> Arc<dyn Clock> {
    match &core.config.clock {
        ClockSelection::Fixed(clock) => clock.clone(),
        ClockSelection::System => core.system_clock.clone(),
        ClockSelection::Auto => pipeline
            .provide_clock()
            .unwrap_or_else(|| core.system_clock.clone()),
    }
}

fn distribute(element: &Element, clock: &Option<Arc<dyn Clock>>, base_time: ClockTime) {
    element.set_clock(clock.clone());
    element.set_base_time(base_time);
    if let Some(bin) = Bin::from_element(element) {
        for child in bin.children() {
            distribute(&child, clock, base_time);
        }
    }
}

/// A top-level bin owning a bus.
///
/// Besides driving its children, the pipeline selects a clock and hands
/// out a base time when going to PLAYING, and tracks running time across
/// pauses.
///
/// # Example
///
/// ```rust
/// use parallax_state::pipeline::Pipeline;
/// use parallax_state::state::{State, StateChangeReturn};
///
/// let pipeline = Pipeline::new("empty");
/// assert_eq!(pipeline.set_state(State::Playing), StateChangeReturn::Success);
/// assert!(pipeline.clock().is_some());
/// assert_eq!(pipeline.set_state(State::Null), StateChangeReturn::Success);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Pipeline(Bin);

impl Pipeline {
    /// Create a pipeline with default configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(PipelineConfig::new(name))
    }

    /// Create a pipeline from a configuration.
    pub fn with_config(config: PipelineConfig) -> Self {
        let bus = Bus::with_config(config.bus.clone());
        let name = config.name.clone();
        let core = PipelineCore {
            config,
            timing: PipelineClock::new(),
            system_clock: Arc::new(SystemClock::new()),
        };
        let bin = Bin::from_core(name, BinCore::new(Some(core)));
        bin.set_bus(Some(bus));
        Self(bin)
    }

    fn core(&self) -> &PipelineCore {
        match self.0.as_element().bin_core().and_then(|c| c.pipeline.as_ref()) {
            Some(core) => core,
            None => unreachable!("Pipeline always wraps a pipeline bin"),
        }
    }

    /// The pipeline's bus.
    pub fn bus(&self) -> Bus {
        match self.0.as_element().bus() {
            Some(bus) => bus,
            None => unreachable!("pipelines are created with a bus"),
        }
    }

    /// The configuration the pipeline was built with.
    pub fn config(&self) -> &PipelineConfig {
        &self.core().config
    }

    /// The clock selected at the last PAUSED to PLAYING step.
    pub fn clock(&self) -> Option<Arc<dyn Clock>> {
        self.core().timing.clock()
    }

    /// Running time: advances while PLAYING, frozen while PAUSED, reset
    /// when going from READY to PAUSED.
    pub fn running_time(&self) -> ClockTime {
        self.core().timing.running_time()
    }

    /// The pipeline as a bin.
    pub fn as_bin(&self) -> &Bin {
        &self.0
    }
}

impl Deref for Pipeline {
    type Target = Bin;

    fn deref(&self) -> &Bin {
        &self.0
    }
}

impl From<Pipeline> for Element {
    fn from(pipeline: Pipeline) -> Self {
        pipeline.0.into()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("bin", &self.0)
            .field("clock", &self.clock().map(|c| c.name().to_string()))
            .finish()
    }
}
