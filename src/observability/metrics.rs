//! Metrics collection using metrics-rs.

use crate::state::{StateChange, StateChangeReturn};
use metrics::{Histogram, Unit, counter, gauge, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

const STATE_CHANGES: &str = "parallax_state_changes";
const STATE_CHANGE_FAILURES: &str = "parallax_state_change_failures";
const STATE_CHANGE_TIME_NS: &str = "parallax_state_change_time_ns";
const BUS_MESSAGES_POSTED: &str = "parallax_bus_messages_posted";
const BUS_QUEUE_DEPTH: &str = "parallax_bus_queue_depth";

/// Initialize metrics descriptions.
///
/// Call once at application startup, before installing an exporter.
/// Subsequent calls are no-ops.
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(
        STATE_CHANGES,
        Unit::Count,
        "State change steps applied, by element, transition and result"
    );
    metrics::describe_counter!(
        STATE_CHANGE_FAILURES,
        Unit::Count,
        "State change steps that returned FAILURE"
    );
    metrics::describe_histogram!(
        STATE_CHANGE_TIME_NS,
        Unit::Nanoseconds,
        "Time spent in the synchronous part of a state change step"
    );
    metrics::describe_counter!(
        BUS_MESSAGES_POSTED,
        Unit::Count,
        "Messages queued on a bus"
    );
    metrics::describe_gauge!(
        BUS_QUEUE_DEPTH,
        Unit::Count,
        "Messages waiting on a bus"
    );
}

/// Record the return of one state change step.
#[inline]
pub fn record_state_change(element: &str, transition: StateChange, result: StateChangeReturn) {
    counter!(
        STATE_CHANGES,
        "element" => element.to_string(),
        "transition" => transition.to_string(),
        "result" => result.to_string()
    )
    .increment(1);
    if result.is_failure() {
        counter!(STATE_CHANGE_FAILURES, "element" => element.to_string()).increment(1);
    }
}

/// Record a message queued on a bus.
#[inline]
pub fn record_bus_message_posted(bus: &str) {
    counter!(BUS_MESSAGES_POSTED, "bus" => bus.to_string()).increment(1);
}

/// Record the number of messages waiting on a bus.
#[inline]
pub fn record_bus_queue_depth(bus: &str, depth: usize) {
    gauge!(BUS_QUEUE_DEPTH, "bus" => bus.to_string()).set(depth as f64);
}

/// Metrics handles for one element, with labels resolved once.
#[derive(Clone)]
pub struct ElementMetrics {
    element: String,
    step_time: Histogram,
}

impl ElementMetrics {
    /// Create the handles for `element`.
    pub fn new(element: &str) -> Self {
        Self {
            element: element.to_string(),
            step_time: histogram!(STATE_CHANGE_TIME_NS, "element" => element.to_string()),
        }
    }

    /// Record a step result.
    #[inline]
    pub fn record_step(&self, transition: StateChange, result: StateChangeReturn) {
        record_state_change(&self.element, transition, result);
    }

    /// Start a timer that records the step time on drop.
    pub fn start_timer(&self) -> TimerGuard<'_> {
        TimerGuard {
            start: Instant::now(),
            metrics: self,
        }
    }

    /// The element name.
    pub fn element(&self) -> &str {
        &self.element
    }
}

/// Guard that records the step time when dropped.
pub struct TimerGuard<'a> {
    start: Instant,
    metrics: &'a ElementMetrics,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.metrics
            .step_time
            .record(self.start.elapsed().as_nanos() as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics() {
        init_metrics();
        init_metrics();
    }

    #[test]
    fn test_element_metrics() {
        let metrics = ElementMetrics::new("sink");
        metrics.record_step(StateChange::ReadyToPaused, StateChangeReturn::Async);
        metrics.record_step(StateChange::NullToReady, StateChangeReturn::Failure);
        {
            let _timer = metrics.start_timer();
        }
        assert_eq!(metrics.element(), "sink");
    }

    #[test]
    fn test_global_recording_functions() {
        // No recorder installed: all of these are no-ops.
        record_state_change("src", StateChange::PausedToPlaying, StateChangeReturn::Success);
        record_bus_message_posted("bus");
        record_bus_queue_depth("bus", 4);
    }
}
