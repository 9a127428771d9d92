//! The per-element state record.

use crate::state::{State, StateChangeReturn};

/// Everything the state machine knows about one element.
///
/// Guarded by the element's record mutex; the companion condition
/// variable is signalled whenever `pending` is cleared.
#[derive(Debug, Clone, Default)]
pub(crate) struct StateRecord {
    /// State the element is fully in.
    pub current: State,
    /// Adjacent state of the step in flight.
    pub next: Option<State>,
    /// Final state of the transition in flight.
    pub pending: Option<State>,
    /// Last state requested with `set_state`.
    pub target: State,
    /// Return of the last step.
    pub last_return: StateChangeReturn,
    /// Bumped whenever `target` changes.
    pub cookie: u64,
    /// An `AsyncStart` was posted and no `AsyncDone` yet.
    pub async_started: bool,
}

impl StateRecord {
    /// Whether an asynchronous step is waiting for completion.
    pub fn is_async_pending(&self) -> bool {
        self.last_return == StateChangeReturn::Async && self.pending.is_some()
    }

    /// The state the element is in or heading to in the current step.
    pub fn heading(&self) -> State {
        self.next.unwrap_or(self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_record() {
        let rec = StateRecord::default();
        assert_eq!(rec.current, State::Null);
        assert_eq!(rec.pending, None);
        assert_eq!(rec.last_return, StateChangeReturn::Success);
        assert!(!rec.is_async_pending());
    }

    #[test]
    fn test_heading() {
        let rec = StateRecord {
            current: State::Ready,
            next: Some(State::Paused),
            pending: Some(State::Playing),
            last_return: StateChangeReturn::Async,
            ..Default::default()
        };
        assert_eq!(rec.heading(), State::Paused);
        assert!(rec.is_async_pending());
    }
}
