//! Generic base steps run between an element's `enter` and `leave` hooks.

use crate::element::Element;
use crate::element::record::StateRecord;
use crate::error::{Error, Result};
use crate::state::{State, StateChange, StateChangeReturn};
use crate::sync::lock;
use std::sync::Mutex;

/// Role-specific base behaviour of a leaf element.
pub(crate) enum BaseBehaviour {
    /// Filters, muxers, demuxers: every step succeeds.
    Plain,
    /// Sources: live sources cannot preroll.
    Source,
    /// Sinks: upward steps wait for the first buffer.
    Sink(SinkPreroll),
}

impl BaseBehaviour {
    pub(crate) fn change_state(
        &self,
        element: &Element,
        transition: StateChange,
    ) -> StateChangeReturn {
        match self {
            BaseBehaviour::Plain => StateChangeReturn::Success,
            // Every step that lands in PAUSED, including a repeated request
            // for PAUSED, reports that a live source cannot preroll.
            BaseBehaviour::Source => match transition.to() {
                State::Paused if element.is_live() => StateChangeReturn::NoPreroll,
                _ => StateChangeReturn::Success,
            },
            BaseBehaviour::Sink(preroll) => preroll.change_state(transition),
        }
    }
}

/// Preroll bookkeeping of a sink.
///
/// The flag is only written under its own mutex, which is taken before
/// the element's record when both are needed.
pub(crate) struct SinkPreroll {
    async_preroll: bool,
    prerolled: Mutex<bool>,
}

impl SinkPreroll {
    pub(crate) fn new(async_preroll: bool) -> Self {
        Self {
            async_preroll,
            prerolled: Mutex::new(false),
        }
    }

    fn change_state(&self, transition: StateChange) -> StateChangeReturn {
        let mut prerolled = lock(&self.prerolled);
        let waiting = self.async_preroll && !*prerolled;
        match transition {
            StateChange::ReadyToPaused
            | StateChange::PausedToPlaying
            | StateChange::PlayingToPaused
                if waiting =>
            {
                StateChangeReturn::Async
            }
            StateChange::PausedToReady => {
                *prerolled = false;
                StateChangeReturn::Success
            }
            _ => StateChangeReturn::Success,
        }
    }

    /// Record an accepted buffer. Returns `true` for the buffer that
    /// completes preroll.
    pub(crate) fn mark(&self, record: &Mutex<StateRecord>) -> Result<bool> {
        let mut prerolled = lock(&self.prerolled);
        if lock(record).heading() < State::Paused {
            return Err(Error::Flushing);
        }
        if *prerolled {
            return Ok(false);
        }
        *prerolled = true;
        Ok(true)
    }

    pub(crate) fn is_prerolled(&self) -> bool {
        *lock(&self.prerolled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_waits_until_prerolled() {
        let preroll = SinkPreroll::new(true);
        assert_eq!(
            preroll.change_state(StateChange::ReadyToPaused),
            StateChangeReturn::Async
        );

        let record = Mutex::new(StateRecord {
            current: State::Ready,
            next: Some(State::Paused),
            pending: Some(State::Paused),
            ..Default::default()
        });
        assert_eq!(preroll.mark(&record), Ok(true));
        assert_eq!(preroll.mark(&record), Ok(false));
        assert_eq!(
            preroll.change_state(StateChange::PausedToPlaying),
            StateChangeReturn::Success
        );

        assert_eq!(
            preroll.change_state(StateChange::PausedToReady),
            StateChangeReturn::Success
        );
        assert!(!preroll.is_prerolled());
    }

    #[test]
    fn test_sink_refuses_data_below_paused() {
        let preroll = SinkPreroll::new(true);
        let record = Mutex::new(StateRecord {
            current: State::Paused,
            next: Some(State::Ready),
            pending: Some(State::Null),
            ..Default::default()
        });
        assert_eq!(preroll.mark(&record), Err(Error::Flushing));
        assert!(!preroll.is_prerolled());
    }

    #[test]
    fn test_sync_sink_never_waits() {
        let preroll = SinkPreroll::new(false);
        assert_eq!(
            preroll.change_state(StateChange::ReadyToPaused),
            StateChangeReturn::Success
        );
    }
}
