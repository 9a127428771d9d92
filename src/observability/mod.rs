//! Observability: metrics and tracing for the state machine.
//!
//! ## Metrics
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `parallax_state_changes` | Counter | Steps applied (labels: element, transition, result) |
//! | `parallax_state_change_failures` | Counter | Steps that returned FAILURE |
//! | `parallax_state_change_time_ns` | Histogram | Synchronous time per step |
//! | `parallax_bus_messages_posted` | Counter | Messages queued on a bus |
//! | `parallax_bus_queue_depth` | Gauge | Messages waiting on a bus |
//!
//! ## Tracing
//!
//! Every step logs `element`, `transition` and `result` fields at DEBUG.
//! Spans are opened per step and per bin walk, as selected by
//! [`TracingConfig`].
//!
//! ```rust
//! use parallax_state::observability::init_metrics;
//!
//! // Describe the metrics once at startup, then install any exporter.
//! init_metrics();
//! ```

mod metrics;
mod tracing_support;

pub use metrics::{
    ElementMetrics, TimerGuard, init_metrics, record_bus_message_posted, record_bus_queue_depth,
    record_state_change,
};
pub use tracing_support::{
    TracingConfig, span_bin_walk, span_state_change, trace_async_done, trace_lost_state,
    trace_state_change,
};
