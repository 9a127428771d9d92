//! Messages posted by elements on the bus.
//!
//! A [`Message`] is an owned, immutable value. It moves through the bus to
//! exactly one consumer; observers that want their own copy subscribe a
//! watcher and receive a clone.

use crate::error::Error;
use crate::state::State;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SEQNUM: AtomicU64 = AtomicU64::new(1);

/// Payload of a bus message.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageKind {
    /// An element committed a state step.
    StateChanged {
        /// State before the step.
        old: State,
        /// State after the step.
        new: State,
        /// Final target still pending, or `None` when settled.
        pending: Option<State>,
    },

    /// An element started an asynchronous transition.
    AsyncStart,

    /// An element finished an asynchronous transition.
    AsyncDone,

    /// An element failed; usually paired with a `Failure` return.
    Error {
        /// The underlying cause.
        error: Error,
    },

    /// Non-fatal issue.
    Warning {
        /// Warning text.
        message: String,
    },

    /// The pipeline selected a new clock.
    NewClock {
        /// Name of the selected clock.
        clock: String,
    },

    /// A source started streaming.
    StreamStart,

    /// End of stream.
    Eos,

    /// Application-defined message.
    Application {
        /// Message name.
        name: String,
        /// Opaque payload.
        payload: Vec<u8>,
    },
}

/// A message on the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    source: String,
    seqnum: u64,
    kind: MessageKind,
}

impl Message {
    /// Create a message from `source` with a fresh sequence number.
    pub fn new(source: impl Into<String>, kind: MessageKind) -> Self {
        Self {
            source: source.into(),
            seqnum: NEXT_SEQNUM.fetch_add(1, Ordering::Relaxed),
            kind,
        }
    }

    /// Create a state-changed message.
    pub fn state_changed(
        source: impl Into<String>,
        old: State,
        new: State,
        pending: Option<State>,
    ) -> Self {
        Self::new(source, MessageKind::StateChanged { old, new, pending })
    }

    /// Create an error message.
    pub fn error(source: impl Into<String>, error: Error) -> Self {
        Self::new(source, MessageKind::Error { error })
    }

    /// Name of the element that posted the message.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Monotonic sequence number assigned at creation.
    pub fn seqnum(&self) -> u64 {
        self.seqnum
    }

    /// The payload.
    pub fn kind(&self) -> &MessageKind {
        &self.kind
    }

    /// Consume the message, returning its payload.
    pub fn into_kind(self) -> MessageKind {
        self.kind
    }

    /// The message's type bit.
    pub fn message_type(&self) -> MessageType {
        match self.kind {
            MessageKind::StateChanged { .. } => MessageType::STATE_CHANGED,
            MessageKind::AsyncStart => MessageType::ASYNC_START,
            MessageKind::AsyncDone => MessageType::ASYNC_DONE,
            MessageKind::Error { .. } => MessageType::ERROR,
            MessageKind::Warning { .. } => MessageType::WARNING,
            MessageKind::NewClock { .. } => MessageType::NEW_CLOCK,
            MessageKind::StreamStart => MessageType::STREAM_START,
            MessageKind::Eos => MessageType::EOS,
            MessageKind::Application { .. } => MessageType::APPLICATION,
        }
    }

    /// Whether the message type is in `mask`.
    pub fn matches(&self, mask: MessageType) -> bool {
        mask.contains(self.message_type())
    }

    /// `(old, new, pending)` if this is a state-changed message.
    pub fn parse_state_changed(&self) -> Option<(State, State, Option<State>)> {
        match self.kind {
            MessageKind::StateChanged { old, new, pending } => Some((old, new, pending)),
            _ => None,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            MessageKind::StateChanged { old, new, pending } => match pending {
                Some(p) => write!(f, "{}: {} -> {} (pending {})", self.source, old, new, p),
                None => write!(f, "{}: {} -> {}", self.source, old, new),
            },
            MessageKind::AsyncStart => write!(f, "{}: async-start", self.source),
            MessageKind::AsyncDone => write!(f, "{}: async-done", self.source),
            MessageKind::Error { error } => write!(f, "Error in {}: {}", self.source, error),
            MessageKind::Warning { message } => write!(f, "Warning in {}: {}", self.source, message),
            MessageKind::NewClock { clock } => write!(f, "{}: new clock {}", self.source, clock),
            MessageKind::StreamStart => write!(f, "{}: stream-start", self.source),
            MessageKind::Eos => write!(f, "{}: EOS", self.source),
            MessageKind::Application { name, payload } => write!(
                f,
                "{}: application message '{}' ({} bytes)",
                self.source,
                name,
                payload.len()
            ),
        }
    }
}

/// Bit mask over message types, used to filter bus reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MessageType(u32);

impl MessageType {
    /// Matches nothing.
    pub const NONE: Self = Self(0);
    /// State-changed messages.
    pub const STATE_CHANGED: Self = Self(1 << 0);
    /// Async-start messages.
    pub const ASYNC_START: Self = Self(1 << 1);
    /// Async-done messages.
    pub const ASYNC_DONE: Self = Self(1 << 2);
    /// Error messages.
    pub const ERROR: Self = Self(1 << 3);
    /// Warning messages.
    pub const WARNING: Self = Self(1 << 4);
    /// New-clock messages.
    pub const NEW_CLOCK: Self = Self(1 << 5);
    /// Stream-start messages.
    pub const STREAM_START: Self = Self(1 << 6);
    /// End-of-stream messages.
    pub const EOS: Self = Self(1 << 7);
    /// Application messages.
    pub const APPLICATION: Self = Self(1 << 8);
    /// Matches every type.
    pub const ANY: Self = Self(u32::MAX);

    /// Raw bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }
}

impl BitOr for MessageType {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for MessageType {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_matching() {
        let msg = Message::state_changed("sink", State::Ready, State::Paused, None);
        assert!(msg.matches(MessageType::STATE_CHANGED));
        assert!(msg.matches(MessageType::STATE_CHANGED | MessageType::ERROR));
        assert!(msg.matches(MessageType::ANY));
        assert!(!msg.matches(MessageType::ERROR));
        assert!(!msg.matches(MessageType::NONE));
    }

    #[test]
    fn test_seqnums_increase() {
        let a = Message::new("a", MessageKind::Eos);
        let b = Message::new("b", MessageKind::Eos);
        assert!(b.seqnum() > a.seqnum());
    }

    #[test]
    fn test_parse_state_changed() {
        let msg = Message::state_changed("src", State::Paused, State::Playing, None);
        assert_eq!(
            msg.parse_state_changed(),
            Some((State::Paused, State::Playing, None))
        );
        assert_eq!(Message::new("src", MessageKind::Eos).parse_state_changed(), None);
    }

    #[test]
    fn test_message_display() {
        let msg = Message::state_changed("sink", State::Ready, State::Paused, Some(State::Playing));
        assert_eq!(format!("{}", msg), "sink: READY -> PAUSED (pending PLAYING)");

        let msg = Message::error("src", Error::Resource("busy".into()));
        assert_eq!(format!("{}", msg), "Error in src: resource error: busy");
    }
}
