//! FakeSrc: a source with a real streaming thread.

use crate::buffer::{Buffer, BufferFlags};
use crate::clock::ClockTime;
use crate::element::{Element, ElementContext, ElementFlags, ElementImpl};
use crate::error::{Error, Result};
use crate::message::MessageKind;
use crate::state::{StateChange, StateChangeReturn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

/// Configuration for [`FakeSrc`].
#[derive(Debug, Clone)]
pub struct FakeSrcConfig {
    /// Produce data only while PLAYING and report `NO_PREROLL` in PAUSED.
    pub is_live: bool,
    /// Stop after this many buffers; the last one carries
    /// [`BufferFlags::LAST`]. `None` streams until stopped.
    pub num_buffers: Option<u64>,
    /// Pause between two buffers.
    pub interval: Duration,
    /// Fail this transition from `enter`.
    pub fail_on: Option<StateChange>,
    /// Post a streaming error instead of the buffer with this sequence
    /// number.
    pub error_after: Option<u64>,
}

impl Default for FakeSrcConfig {
    fn default() -> Self {
        Self {
            is_live: false,
            num_buffers: None,
            interval: Duration::from_millis(2),
            fail_on: None,
            error_after: None,
        }
    }
}

impl FakeSrcConfig {
    /// Set whether the source is live.
    pub fn with_live(mut self, is_live: bool) -> Self {
        self.is_live = is_live;
        self
    }

    /// Limit the number of buffers.
    pub fn with_num_buffers(mut self, num_buffers: u64) -> Self {
        self.num_buffers = Some(num_buffers);
        self
    }

    /// Set the pause between buffers.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Fail `transition`.
    pub fn with_fail_on(mut self, transition: StateChange) -> Self {
        self.fail_on = Some(transition);
        self
    }

    /// Post a streaming error at buffer `sequence`.
    pub fn with_error_after(mut self, sequence: u64) -> Self {
        self.error_after = Some(sequence);
        self
    }
}

struct StreamingThread {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl StreamingThread {
    fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            // The last handle may be dropped by the streaming thread itself.
            if handle.thread().id() != std::thread::current().id() && handle.join().is_err() {
                tracing::error!("fakesrc streaming thread panicked");
            }
        }
    }
}

impl Drop for StreamingThread {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A source that pushes empty buffers from its own thread.
///
/// A non-live source starts streaming on READY to PAUSED, so the sink can
/// preroll; a live source only streams while PLAYING. Streaming stops on
/// PAUSED to READY. A push refused with `Flushing` ends streaming quietly;
/// any other push error (such as an unlinked output) is posted as an
/// error message.
///
/// # Example
///
/// ```rust
/// use parallax_state::elements::{FakeSrc, FakeSrcConfig};
///
/// let src = FakeSrc::new(FakeSrcConfig::default().with_live(true)).into_element("src");
/// assert!(src.is_live());
/// ```
pub struct FakeSrc {
    config: FakeSrcConfig,
    sequence: Arc<AtomicU64>,
    streaming: Option<StreamingThread>,
}

impl FakeSrc {
    /// Create a source.
    pub fn new(config: FakeSrcConfig) -> Self {
        Self {
            config,
            sequence: Arc::new(AtomicU64::new(0)),
            streaming: None,
        }
    }

    /// Build the element.
    pub fn into_element(self, name: impl Into<String>) -> Element {
        let live = self.config.is_live;
        Element::builder(name)
            .flags(ElementFlags::SOURCE)
            .live(live)
            .build(self)
    }

    fn start(&mut self, ctx: &ElementContext) -> Result<()> {
        if self.streaming.is_some() {
            return Ok(());
        }
        let stop = Arc::new(AtomicBool::new(false));
        let worker = Worker {
            ctx: ctx.clone(),
            stop: Arc::clone(&stop),
            sequence: Arc::clone(&self.sequence),
            config: self.config.clone(),
        };
        let handle = std::thread::Builder::new()
            .name(format!("{}-stream", ctx.name()))
            .spawn(move || worker.run())
            .map_err(|e| Error::Resource(format!("cannot spawn streaming thread: {e}")))?;
        tracing::debug!(element = %ctx.name(), "started streaming");
        self.streaming = Some(StreamingThread {
            stop,
            handle: Some(handle),
        });
        Ok(())
    }

    fn stop(&mut self, ctx: &ElementContext) {
        if let Some(mut streaming) = self.streaming.take() {
            streaming.stop();
            tracing::debug!(element = %ctx.name(), "stopped streaming");
        }
    }
}

impl ElementImpl for FakeSrc {
    fn enter(
        &mut self,
        ctx: &ElementContext,
        transition: StateChange,
    ) -> Result<StateChangeReturn> {
        if self.config.fail_on == Some(transition) {
            return Err(Error::state_change(ctx.name(), transition, "configured to fail"));
        }
        match transition {
            StateChange::ReadyToPaused => {
                self.sequence.store(0, Ordering::Release);
                if !ctx.is_live() {
                    self.start(ctx)?;
                }
            }
            StateChange::PausedToPlaying if ctx.is_live() => self.start(ctx)?,
            _ => {}
        }
        Ok(StateChangeReturn::Success)
    }

    fn leave(&mut self, ctx: &ElementContext, transition: StateChange) -> Result<()> {
        match transition {
            StateChange::PlayingToPaused if ctx.is_live() => self.stop(ctx),
            StateChange::PausedToReady => self.stop(ctx),
            _ => {}
        }
        Ok(())
    }
}

struct Worker {
    ctx: ElementContext,
    stop: Arc<AtomicBool>,
    sequence: Arc<AtomicU64>,
    config: FakeSrcConfig,
}

impl Worker {
    fn run(self) {
        if self.sequence.load(Ordering::Acquire) == 0 {
            self.ctx.post(MessageKind::StreamStart);
        }

        while !self.stop.load(Ordering::Acquire) {
            let seq = self.sequence.fetch_add(1, Ordering::AcqRel);
            if self.config.num_buffers.is_some_and(|n| seq >= n) {
                break;
            }
            if self.config.error_after == Some(seq) {
                self.ctx
                    .post_error(Error::Streaming(format!("stream failed at buffer {seq}")));
                break;
            }

            let mut buffer = Buffer::new(seq, self.pts(seq));
            if self.config.num_buffers == Some(seq + 1) {
                buffer = buffer.with_flags(BufferFlags::LAST);
            }

            match self.ctx.push(buffer) {
                Ok(()) => {}
                Err(Error::Flushing) => {
                    tracing::trace!(element = %self.ctx.name(), "peer flushing, pausing stream");
                    break;
                }
                Err(error) => {
                    self.ctx.post_error(error);
                    break;
                }
            }

            std::thread::sleep(self.config.interval);
        }
    }

    fn pts(&self, seq: u64) -> ClockTime {
        if self.config.is_live {
            let running = self.ctx.running_time();
            if running.is_some() {
                return running;
            }
        }
        ClockTime::from_nanos((self.config.interval.as_nanos() as u64).saturating_mul(seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::State;

    #[test]
    fn test_config_builders() {
        let config = FakeSrcConfig::default()
            .with_live(true)
            .with_num_buffers(3)
            .with_fail_on(StateChange::NullToReady);
        assert!(config.is_live);
        assert_eq!(config.num_buffers, Some(3));
        assert_eq!(config.fail_on, Some(StateChange::NullToReady));
    }

    #[test]
    fn test_live_source_reports_no_preroll() {
        let src = FakeSrc::new(FakeSrcConfig::default().with_live(true)).into_element("src");
        assert_eq!(src.set_state(State::Paused), StateChangeReturn::NoPreroll);
        assert_eq!(src.current_state(), State::Paused);
        assert_eq!(src.set_state(State::Paused), StateChangeReturn::NoPreroll);
        assert_eq!(src.last_return(), StateChangeReturn::NoPreroll);
        assert_eq!(src.set_state(State::Null), StateChangeReturn::Success);
    }

    #[test]
    fn test_fail_on_transition() {
        let src = FakeSrc::new(FakeSrcConfig::default().with_fail_on(StateChange::NullToReady))
            .into_element("src");
        assert_eq!(src.set_state(State::Ready), StateChangeReturn::Failure);
        assert_eq!(src.current_state(), State::Null);
    }
}
