//! Container lifecycle rules.
//!
//! The host agent owns the `state` field and reports it as free text, so the
//! control plane never rejects a report. Unexpected transitions are logged.
//!
//! # State Machine
//!
//! ```text
//!     ┌─────────┐     ┌──────────┐     ┌─────────┐
//!     │ UNKNOWN │────▶│ CREATING │────▶│ RUNNING │◀─────┐
//!     └─────────┘     └──────────┘     └────┬────┘      │
//!          ▲               ▲                │ (stop)    │ (start)
//!          │               │ (re_create)    ▼           │
//!     ┌────┴────┐          │           ┌─────────┐      │
//!     │ QUEUED  │          └───────────│ STOPPED │──────┘
//!     └─────────┘                      └────┬────┘
//!                                           │
//!                                           ▼
//!                                      ┌─────────┐
//!                                      │ DESTROY │ (terminal)
//!                                      └─────────┘
//! ```
//!
//! `re_create` sends any non-terminal container back to `CREATING`.

use corral_core::ContainerState;
use corral_store::{Container, Props};
use serde_json::Value;

/// Check if a reported transition follows the state machine.
///
/// Advisory only: callers log a warning for an unexpected transition and
/// still apply the reported state, since the host is the source of truth
/// for what is actually running. Repeating the current state is always valid. Unrecognized runtime states
/// are accepted in both directions.
#[must_use]
pub fn is_valid_transition(from: &ContainerState, to: &ContainerState) -> bool {
    use ContainerState::{Creating, Destroy, Other, Queued, Running, Stopped, Stopping, Unknown};

    if from == to {
        return true;
    }
    match (from, to) {
        (Destroy, _) => false,
        (Other(_), _) | (_, Other(_) | Destroy | Creating) => true,
        (Queued, Unknown)
        | (Unknown | Queued, Running | Stopped)
        | (Creating, Running | Stopped)
        | (Running, Stopping | Stopped)
        | (Stopping, Stopped | Running)
        | (Stopped, Running) => true,
        _ => false,
    }
}

/// Read the `state` field of an update payload, if present.
#[must_use]
pub fn requested_state(update: &Props) -> Option<ContainerState> {
    match update.get("state") {
        Some(Value::String(s)) => Some(ContainerState::from(s.clone())),
        _ => None,
    }
}

/// Returns true if the update asks to destroy a one-shot container, in which
/// case the container is deleted instead of updated.
#[must_use]
pub fn should_destroy(current: &Container, update: &Props) -> bool {
    current.one_shot && requested_state(update).is_some_and(|s| s.is_terminal())
}

/// Clear `re_create` once the agent reports a newer `date_created`.
///
/// The agent reports `date_created` after it has rebuilt a container, and a
/// strictly newer value acknowledges the recreation.
pub fn acknowledge_recreate(current: &Container, update: &mut Props) {
    let reported = update.get("date_created").and_then(Value::as_i64);
    if let Some(reported) = reported {
        if reported > current.date_created.unwrap_or(0) {
            update.insert("re_create".to_string(), Value::Bool(false));
        }
    }
}
