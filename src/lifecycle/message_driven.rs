//! Message-driven driver: pooled like stateless, but with no client views,
//! so the self-reference accessor is never legal.

use super::pooled::{PooledLifecycle, PooledRuntime};
use super::states::{MessageDrivenState, Operation};
use super::transitions::OperationTable;

pub const MESSAGE_DRIVEN_OPERATIONS: OperationTable<MessageDrivenState> = &[
    (MessageDrivenState::PreCreate, &[Operation::LifecycleCallback]),
    (
        MessageDrivenState::Creating,
        &[
            Operation::LifecycleCallback,
            Operation::GetCallerPrincipal,
            Operation::GetTimerService,
            Operation::TimerAccess,
        ],
    ),
    (MessageDrivenState::Pooled, &[]),
    (
        MessageDrivenState::InMethod,
        &[
            Operation::BusinessCall,
            Operation::GetCallerPrincipal,
            Operation::GetTimerService,
            Operation::GetRollbackOnly,
            Operation::SetRollbackOnly,
            Operation::TimerAccess,
            Operation::TxDemarcation,
        ],
    ),
    (MessageDrivenState::Destroyed, &[]),
];

impl PooledLifecycle for MessageDrivenState {
    const OPERATIONS: OperationTable<Self> = MESSAGE_DRIVEN_OPERATIONS;

    fn creating() -> Self {
        Self::Creating
    }

    fn pooled() -> Self {
        Self::Pooled
    }

    fn in_method() -> Self {
        Self::InMethod
    }
}

pub type MessageDrivenRuntime = PooledRuntime<MessageDrivenState>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::transitions::guard_operation;

    #[test]
    fn test_self_reference_is_never_legal() {
        for state in [
            MessageDrivenState::PreCreate,
            MessageDrivenState::Creating,
            MessageDrivenState::Pooled,
            MessageDrivenState::InMethod,
            MessageDrivenState::Destroyed,
        ] {
            assert!(
                guard_operation(state, Operation::GetSelfReference, MESSAGE_DRIVEN_OPERATIONS)
                    .is_err(),
                "self reference must be illegal in {state}"
            );
        }
    }

    #[test]
    fn test_in_method_allows_rollback_voting() {
        assert!(guard_operation(
            MessageDrivenState::InMethod,
            Operation::SetRollbackOnly,
            MESSAGE_DRIVEN_OPERATIONS
        )
        .is_ok());
    }
}
