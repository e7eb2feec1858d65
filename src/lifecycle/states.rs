//! Per-kind lifecycle state definitions.
//!
//! Each component kind gets its own state enumeration rather than a shared
//! class hierarchy; the legality of operations and transitions is expressed
//! as per-kind tables consumed by the shared validation functions in
//! `transitions`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Operations guarded by the per-state allowed-operation tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// A business or timeout method executing against the instance.
    BusinessCall,
    /// Injection, post-construct, or pre-destroy callback.
    LifecycleCallback,
    GetCallerPrincipal,
    GetTimerService,
    GetRollbackOnly,
    SetRollbackOnly,
    GetSelfReference,
    TimerAccess,
    /// Bean-managed transaction demarcation.
    TxDemarcation,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BusinessCall => write!(f, "business_call"),
            Self::LifecycleCallback => write!(f, "lifecycle_callback"),
            Self::GetCallerPrincipal => write!(f, "get_caller_principal"),
            Self::GetTimerService => write!(f, "get_timer_service"),
            Self::GetRollbackOnly => write!(f, "get_rollback_only"),
            Self::SetRollbackOnly => write!(f, "set_rollback_only"),
            Self::GetSelfReference => write!(f, "get_self_reference"),
            Self::TimerAccess => write!(f, "timer_access"),
            Self::TxDemarcation => write!(f, "tx_demarcation"),
        }
    }
}

/// Common surface of every kind-specific state enum, letting the shared
/// transition validator and the instance record stay kind-agnostic.
pub trait LifecycleState:
    Copy + PartialEq + Eq + fmt::Display + fmt::Debug + Send + Sync + 'static
{
    /// Initial state of a freshly constructed record.
    fn initial() -> Self;

    /// Terminal state; all further lifecycle calls become no-ops.
    fn destroyed() -> Self;

    fn is_destroyed(&self) -> bool {
        *self == Self::destroyed()
    }
}

/// Stateless session instances: pooled and reusable, not bound to any
/// caller between method calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatelessState {
    PreCreate,
    Creating,
    Pooled,
    InMethod,
    Destroyed,
}

impl LifecycleState for StatelessState {
    fn initial() -> Self {
        Self::PreCreate
    }

    fn destroyed() -> Self {
        Self::Destroyed
    }
}

impl fmt::Display for StatelessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreCreate => write!(f, "PRE_CREATE"),
            Self::Creating => write!(f, "CREATING"),
            Self::Pooled => write!(f, "POOLED"),
            Self::InMethod => write!(f, "IN_METHOD"),
            Self::Destroyed => write!(f, "DESTROYED"),
        }
    }
}

/// Stateful session instances: conversational, bound to one logical caller
/// identity, never pooled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatefulState {
    PreCreate,
    Creating,
    MethodReady,
    InMethod,
    Removing,
    Destroyed,
}

impl LifecycleState for StatefulState {
    fn initial() -> Self {
        Self::PreCreate
    }

    fn destroyed() -> Self {
        Self::Destroyed
    }
}

impl fmt::Display for StatefulState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreCreate => write!(f, "PRE_CREATE"),
            Self::Creating => write!(f, "CREATING"),
            Self::MethodReady => write!(f, "METHOD_READY"),
            Self::InMethod => write!(f, "IN_METHOD"),
            Self::Removing => write!(f, "REMOVING"),
            Self::Destroyed => write!(f, "DESTROYED"),
        }
    }
}

/// Singleton instances: exactly one live instance, shared by all concurrent
/// callers under the lock discipline of the locking engine. There is no
/// IN_METHOD state because concurrent READ callers run simultaneously; the
/// instance stays METHOD_READY from post-construct until PRE_DESTROY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SingletonState {
    PreCreate,
    Creating,
    MethodReady,
    PreDestroy,
    Destroyed,
}

impl LifecycleState for SingletonState {
    fn initial() -> Self {
        Self::PreCreate
    }

    fn destroyed() -> Self {
        Self::Destroyed
    }
}

impl fmt::Display for SingletonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreCreate => write!(f, "PRE_CREATE"),
            Self::Creating => write!(f, "CREATING"),
            Self::MethodReady => write!(f, "METHOD_READY"),
            Self::PreDestroy => write!(f, "PRE_DESTROY"),
            Self::Destroyed => write!(f, "DESTROYED"),
        }
    }
}

/// Message-driven endpoints: pooled like stateless, but with no client
/// views, so the caller-facing context accessors are narrower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageDrivenState {
    PreCreate,
    Creating,
    Pooled,
    InMethod,
    Destroyed,
}

impl LifecycleState for MessageDrivenState {
    fn initial() -> Self {
        Self::PreCreate
    }

    fn destroyed() -> Self {
        Self::Destroyed
    }
}

impl fmt::Display for MessageDrivenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreCreate => write!(f, "PRE_CREATE"),
            Self::Creating => write!(f, "CREATING"),
            Self::Pooled => write!(f, "POOLED"),
            Self::InMethod => write!(f, "IN_METHOD"),
            Self::Destroyed => write!(f, "DESTROYED"),
        }
    }
}
