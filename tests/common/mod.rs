//! Helpers shared by the integration tests.

#![allow(dead_code)]

use parallax_state::bus::Bus;
use parallax_state::state::State;

/// A state-changed message reduced to comparable fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub source: String,
    pub old: State,
    pub new: State,
    pub pending: Option<State>,
}

/// Drain the bus, keeping the state-changed messages.
pub fn drain_state_changes(bus: &Bus) -> Vec<Change> {
    let mut changes = Vec::new();
    while let Some(msg) = bus.pop() {
        if let Some((old, new, pending)) = msg.parse_state_changed() {
            changes.push(Change {
                source: msg.source().to_string(),
                old,
                new,
                pending,
            });
        }
    }
    changes
}

/// Sources of the messages for one `old -> new` step, in bus order.
pub fn sources_for(changes: &[Change], old: State, new: State) -> Vec<String> {
    changes
        .iter()
        .filter(|c| c.old == old && c.new == new)
        .map(|c| c.source.clone())
        .collect()
}

/// Install a test subscriber once; `RUST_LOG` selects the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
