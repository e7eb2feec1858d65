//! Shared transition and operation validation.
//!
//! One validation function serves every kind, parameterized by the kind's
//! allowed-operation table. The tables live next to their drivers; this
//! module owns only the mechanics and the error shape.

use super::states::{LifecycleState, Operation};
use crate::error::IllegalStateError;
use tracing::trace;

/// Allowed-operation table: for each state, the operations that are legal
/// while the instance is in it. Any (state, operation) pair not present is
/// illegal and raises `IllegalStateError`.
pub type OperationTable<S> = &'static [(S, &'static [Operation])];

/// Check that `operation` is legal in `state` per the kind's table.
pub fn guard_operation<S: LifecycleState>(
    state: S,
    operation: Operation,
    table: OperationTable<S>,
) -> Result<(), IllegalStateError> {
    let allowed = table
        .iter()
        .find(|(s, _)| *s == state)
        .map(|(_, ops)| ops.contains(&operation))
        .unwrap_or(false);
    if allowed {
        Ok(())
    } else {
        Err(IllegalStateError::Operation {
            current: state.to_string(),
            operation: operation.to_string(),
        })
    }
}

/// Look up the permitted-operation slice for a state; used to build
/// callback contexts. Unlisted states permit nothing.
pub fn permitted_operations<S: LifecycleState>(
    state: S,
    table: OperationTable<S>,
) -> &'static [Operation] {
    table
        .iter()
        .find(|(s, _)| *s == state)
        .map(|(_, ops)| *ops)
        .unwrap_or(&[])
}

/// Transition `current` from `from` to `to`, failing if the instance is not
/// in `from`. The error names both the current and the attempted state.
pub fn transition<S: LifecycleState>(
    current: &mut S,
    from: S,
    to: S,
) -> Result<(), IllegalStateError> {
    if *current != from {
        return Err(IllegalStateError::Transition {
            current: current.to_string(),
            attempted: to.to_string(),
        });
    }
    trace!(from = %from, to = %to, "lifecycle transition");
    *current = to;
    Ok(())
}

/// Transition to the terminal state. Idempotent: a record that is already
/// destroyed stays destroyed and the call reports whether this was the
/// first destruction.
pub fn transition_to_destroyed<S: LifecycleState>(current: &mut S) -> bool {
    if current.is_destroyed() {
        return false;
    }
    trace!(from = %*current, to = %S::destroyed(), "lifecycle transition (terminal)");
    *current = S::destroyed();
    true
}
