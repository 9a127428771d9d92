//! States, transitions and the state-change return algebra.
//!
//! Elements move through four states, strictly ordered:
//!
//! ```text
//! NULL < READY < PAUSED < PLAYING
//! ```
//!
//! A single call only ever applies one adjacent [`StateChange`]; the
//! harness decomposes longer jumps into steps. Every step reports a
//! [`StateChangeReturn`], and bins reduce the returns of their children
//! with [`StateChangeReturn::aggregate`].

use std::fmt;

/// Lifecycle state of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum State {
    /// Rest state: no resources held.
    #[default]
    Null,
    /// Resources allocated, devices opened, no data flowing.
    Ready,
    /// Data accepted and prerolled, clock not running.
    Paused,
    /// Data flowing against the running clock.
    Playing,
}

/// No transition in flight.
///
/// Pending states are `Option<State>`; `None` is the void sentinel and is
/// never the same thing as [`State::Null`].
pub const VOID_PENDING: Option<State> = None;

impl State {
    /// All states in ascending order.
    pub const ALL: [State; 4] = [State::Null, State::Ready, State::Paused, State::Playing];

    /// The adjacent state one step from `self` in the direction of `target`.
    ///
    /// Returns `self` when `self == target`.
    pub fn next_towards(self, target: State) -> State {
        use State::*;
        match self.cmp(&target) {
            std::cmp::Ordering::Equal => self,
            std::cmp::Ordering::Less => match self {
                Null => Ready,
                Ready => Paused,
                Paused | Playing => Playing,
            },
            std::cmp::Ordering::Greater => match self {
                Playing => Paused,
                Paused => Ready,
                Ready | Null => Null,
            },
        }
    }

    /// Upper-case name used in messages and logs.
    pub fn name(self) -> &'static str {
        match self {
            State::Null => "NULL",
            State::Ready => "READY",
            State::Paused => "PAUSED",
            State::Playing => "PLAYING",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An adjacent (or identity) pair of states.
///
/// The pair, not the absolute state, selects which logic an element runs:
/// `ReadyToPaused` acquires streaming resources, `PausedToReady` releases
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateChange {
    /// NULL -> READY.
    NullToReady,
    /// READY -> PAUSED.
    ReadyToPaused,
    /// PAUSED -> PLAYING.
    PausedToPlaying,
    /// PLAYING -> PAUSED.
    PlayingToPaused,
    /// PAUSED -> READY.
    PausedToReady,
    /// READY -> NULL.
    ReadyToNull,
    /// NULL -> NULL.
    NullToNull,
    /// READY -> READY.
    ReadyToReady,
    /// PAUSED -> PAUSED.
    PausedToPaused,
    /// PLAYING -> PLAYING.
    PlayingToPlaying,
}

impl StateChange {
    /// Build the transition between two states.
    ///
    /// Returns `None` unless `from` and `to` are equal or adjacent.
    pub fn new(from: State, to: State) -> Option<Self> {
        use State::*;
        use StateChange::*;
        let change = match (from, to) {
            (Null, Ready) => NullToReady,
            (Ready, Paused) => ReadyToPaused,
            (Paused, Playing) => PausedToPlaying,
            (Playing, Paused) => PlayingToPaused,
            (Paused, Ready) => PausedToReady,
            (Ready, Null) => ReadyToNull,
            (Null, Null) => NullToNull,
            (Ready, Ready) => ReadyToReady,
            (Paused, Paused) => PausedToPaused,
            (Playing, Playing) => PlayingToPlaying,
            _ => return None,
        };
        Some(change)
    }

    /// The first step from `current` towards `target`.
    pub fn step(current: State, target: State) -> Self {
        let next = current.next_towards(target);
        // next_towards always yields an equal or adjacent state
        Self::new(current, next).unwrap_or(Self::identity(current))
    }

    /// The identity transition for a state.
    pub fn identity(state: State) -> Self {
        match state {
            State::Null => StateChange::NullToNull,
            State::Ready => StateChange::ReadyToReady,
            State::Paused => StateChange::PausedToPaused,
            State::Playing => StateChange::PlayingToPlaying,
        }
    }

    /// State the element is in when the transition starts.
    pub fn from(self) -> State {
        use State::*;
        use StateChange::*;
        match self {
            NullToReady | NullToNull => Null,
            ReadyToPaused | ReadyToNull | ReadyToReady => Ready,
            PausedToPlaying | PausedToReady | PausedToPaused => Paused,
            PlayingToPaused | PlayingToPlaying => Playing,
        }
    }

    /// State the element is in once the transition completes.
    pub fn to(self) -> State {
        use State::*;
        use StateChange::*;
        match self {
            ReadyToNull | NullToNull => Null,
            NullToReady | PausedToReady | ReadyToReady => Ready,
            ReadyToPaused | PlayingToPaused | PausedToPaused => Paused,
            PausedToPlaying | PlayingToPlaying => Playing,
        }
    }

    /// Whether the transition moves towards PLAYING.
    pub fn is_upward(self) -> bool {
        self.from() < self.to()
    }

    /// Whether the transition moves towards NULL.
    pub fn is_downward(self) -> bool {
        self.from() > self.to()
    }

    /// Whether `from == to`.
    pub fn is_identity(self) -> bool {
        self.from() == self.to()
    }
}

impl fmt::Display for StateChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.from(), self.to())
    }
}

/// Outcome of a state change request.
///
/// Only `Failure` is a hard outcome; the other three accept the request
/// with different completion semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StateChangeReturn {
    /// The element is fully in the requested state.
    #[default]
    Success,
    /// Accepted; completion happens later on another thread.
    Async,
    /// Accepted, but the element is live and will never preroll.
    NoPreroll,
    /// The transition failed.
    Failure,
}

impl StateChangeReturn {
    fn rank(self) -> u8 {
        match self {
            StateChangeReturn::Success => 0,
            StateChangeReturn::Async => 1,
            StateChangeReturn::NoPreroll => 2,
            StateChangeReturn::Failure => 3,
        }
    }

    /// Combine two child returns into the return of their container.
    ///
    /// `Failure` is absolute; otherwise `NoPreroll` outranks `Async`, which
    /// outranks `Success`.
    pub fn aggregate(self, other: Self) -> Self {
        if other.rank() > self.rank() { other } else { self }
    }

    /// Fold a sequence of returns; an empty sequence is `Success`.
    pub fn aggregate_all<I: IntoIterator<Item = Self>>(returns: I) -> Self {
        returns
            .into_iter()
            .fold(StateChangeReturn::Success, StateChangeReturn::aggregate)
    }

    /// Whether this is `Failure`.
    pub fn is_failure(self) -> bool {
        self == StateChangeReturn::Failure
    }

    /// Whether the request was accepted.
    pub fn is_accepted(self) -> bool {
        !self.is_failure()
    }
}

impl fmt::Display for StateChangeReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StateChangeReturn::Success => "SUCCESS",
            StateChangeReturn::Async => "ASYNC",
            StateChangeReturn::NoPreroll => "NO_PREROLL",
            StateChangeReturn::Failure => "FAILURE",
        };
        f.write_str(s)
    }
}
