//! Tracing integration for state changes.

use crate::state::{State, StateChange, StateChangeReturn};
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::{Level, Span, span};

const BIN_SPANS: u8 = 1 << 0;
const ELEMENT_SPANS: u8 = 1 << 1;

static SPAN_MASK: AtomicU8 = AtomicU8::new(BIN_SPANS | ELEMENT_SPANS);

/// Which spans the state machine opens.
///
/// Process-wide; takes effect for steps started after [`install`](Self::install).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TracingConfig {
    /// Open a span around each bin walk.
    pub bin_spans: bool,
    /// Open a span around each element step.
    pub element_spans: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::all()
    }
}

impl TracingConfig {
    /// Every span.
    pub fn all() -> Self {
        Self {
            bin_spans: true,
            element_spans: true,
        }
    }

    /// Bin spans only.
    pub fn minimal() -> Self {
        Self {
            bin_spans: true,
            element_spans: false,
        }
    }

    /// No spans.
    pub fn none() -> Self {
        Self {
            bin_spans: false,
            element_spans: false,
        }
    }

    /// Make this the active configuration.
    pub fn install(self) {
        let mut mask = 0;
        if self.bin_spans {
            mask |= BIN_SPANS;
        }
        if self.element_spans {
            mask |= ELEMENT_SPANS;
        }
        SPAN_MASK.store(mask, Ordering::Relaxed);
    }

    /// The active configuration.
    pub fn current() -> Self {
        let mask = SPAN_MASK.load(Ordering::Relaxed);
        Self {
            bin_spans: mask & BIN_SPANS != 0,
            element_spans: mask & ELEMENT_SPANS != 0,
        }
    }
}

/// Span covering one state change step of an element.
#[inline]
pub fn span_state_change(element: &str, transition: StateChange) -> Span {
    if SPAN_MASK.load(Ordering::Relaxed) & ELEMENT_SPANS == 0 {
        return Span::none();
    }
    span!(
        Level::DEBUG,
        "state_change",
        element = %element,
        transition = %transition
    )
}

/// Span covering a bin walking its children.
#[inline]
pub fn span_bin_walk(bin: &str, transition: StateChange) -> Span {
    if SPAN_MASK.load(Ordering::Relaxed) & BIN_SPANS == 0 {
        return Span::none();
    }
    span!(Level::DEBUG, "bin_walk", bin = %bin, transition = %transition)
}

/// Log the return of a step.
#[inline]
pub fn trace_state_change(element: &str, transition: StateChange, result: StateChangeReturn) {
    tracing::debug!(
        element = %element,
        transition = %transition,
        result = %result,
        "state change"
    );
}

/// Log the commit of an asynchronous transition.
#[inline]
pub fn trace_async_done(element: &str, state: State) {
    tracing::debug!(element = %element, state = %state, "async state change done");
}

/// Log an element losing its state.
#[inline]
pub fn trace_lost_state(element: &str, state: State) {
    tracing::info!(element = %element, state = %state, "element lost state");
}
