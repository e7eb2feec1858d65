//! Stateless session driver: a pooled, reusable instance per call.

use super::pooled::{PooledLifecycle, PooledRuntime};
use super::states::{Operation, StatelessState};
use super::transitions::OperationTable;

/// Allowed operations per state. Context lookups open up during
/// post-construct; transaction voting waits until a business method runs.
pub const STATELESS_OPERATIONS: OperationTable<StatelessState> = &[
    (StatelessState::PreCreate, &[Operation::LifecycleCallback]),
    (
        StatelessState::Creating,
        &[
            Operation::LifecycleCallback,
            Operation::GetCallerPrincipal,
            Operation::GetTimerService,
            Operation::GetSelfReference,
            Operation::TimerAccess,
        ],
    ),
    (StatelessState::Pooled, &[]),
    (
        StatelessState::InMethod,
        &[
            Operation::BusinessCall,
            Operation::GetCallerPrincipal,
            Operation::GetTimerService,
            Operation::GetRollbackOnly,
            Operation::SetRollbackOnly,
            Operation::GetSelfReference,
            Operation::TimerAccess,
            Operation::TxDemarcation,
        ],
    ),
    (StatelessState::Destroyed, &[]),
];

impl PooledLifecycle for StatelessState {
    const OPERATIONS: OperationTable<Self> = STATELESS_OPERATIONS;

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

pub type StatelessRuntime = PooledRuntime<StatelessState>;
