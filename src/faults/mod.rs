//! # Exception Mapping
//!
//! Classifies every failure raised during an invocation as application-level
//! or system-level, decides the transaction outcome, and produces the
//! exception the caller actually sees for its channel (local or remote).
//! Mapping runs at most once per invocation context; re-entry returns the
//! previously mapped result unchanged.

mod mapping;

pub use mapping::{Fault, MappingStrategy};

use crate::error::SystemFault;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// What a business method (or lifecycle callback) raises. `error_type` is
/// the declared application error type name; `unchecked` separates declared
/// failures from runtime ones; `channel_transport` marks errors that belong
/// to the transport layer and are therefore never eligible for declarative
/// application-exception reclassification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{error_type}: {message}")]
pub struct BusinessError {
    pub error_type: String,
    pub message: String,
    pub unchecked: bool,
    pub channel_transport: bool,
    pub cause: Option<SystemFault>,
}

impl BusinessError {
    /// A declared (checked) application error.
    pub fn checked(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            unchecked: false,
            channel_transport: false,
            cause: None,
        }
    }

    /// An undeclared runtime error.
    pub fn unchecked(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            unchecked: true,
            channel_transport: false,
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: SystemFault) -> Self {
        self.cause = Some(cause);
        self
    }

    pub fn transport(mut self) -> Self {
        self.channel_transport = true;
        self
    }

    /// The underlying fault chain, synthesized from the error itself when no
    /// explicit cause was attached.
    pub fn as_system_fault(&self) -> SystemFault {
        match &self.cause {
            Some(cause) => {
                SystemFault::caused_by(format!("{}: {}", self.error_type, self.message), cause.clone())
            }
            None => SystemFault::new(format!("{}: {}", self.error_type, self.message)),
        }
    }
}

/// Classification outcome: application failures propagate verbatim and are
/// never logged by the kernel; system failures are logged, captured, and
/// force rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    Application,
    System,
}

/// Declarative application-exception registration: a runtime error type the
/// module declares to be application-level, optionally still forcing
/// rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppExceptionRule {
    pub error_type: String,
    pub rollback: bool,
}

impl AppExceptionRule {
    pub fn new(error_type: impl Into<String>, rollback: bool) -> Self {
        Self {
            error_type: error_type.into(),
            rollback,
        }
    }
}

/// The exception the caller sees, per channel. The `origin` carried by the
/// wrapper families is the root cause's display chain, so the visible
/// failure names the true failure point rather than the mapping layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisibleException {
    /// Application failure, propagated as raised.
    Application { error_type: String, message: String },
    /// Local-channel wrapper for a system failure.
    LocalGeneral { message: String, origin: String },
    /// Remote-channel wrapper for a system failure, optionally nesting the
    /// cause chain for the caller to inspect.
    RemoteGeneral {
        message: String,
        origin: String,
        nested: Option<SystemFault>,
    },
    /// Local-channel signal that the caller's inherited transaction has been
    /// marked for rollback.
    LocalTransactionRolledBack { message: String, origin: String },
    /// Remote-channel equivalent of [`Self::LocalTransactionRolledBack`].
    RemoteTransactionRolledBack { message: String, origin: String },
    /// The target instance could not be found or activated.
    NoSuchInstance { message: String, remote: bool },
    /// Lock not acquired (timeout, loopback upgrade, or deadlock avoidance),
    /// or reentrant call denied; the method body never ran.
    ConcurrentAccess { message: String, remote: bool },
}

impl VisibleException {
    pub fn local_general(message: impl Into<String>, origin: impl Into<String>) -> Self {
        Self::LocalGeneral {
            message: message.into(),
            origin: origin.into(),
        }
    }

    /// Whether this is a transport-level (remote channel) exception form.
    pub fn is_remote(&self) -> bool {
        match self {
            Self::Application { .. } | Self::LocalGeneral { .. } | Self::LocalTransactionRolledBack { .. } => false,
            Self::RemoteGeneral { .. } | Self::RemoteTransactionRolledBack { .. } => true,
            Self::NoSuchInstance { remote, .. } | Self::ConcurrentAccess { remote, .. } => *remote,
        }
    }
}

impl fmt::Display for VisibleException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Application { error_type, message } => write!(f, "{error_type}: {message}"),
            Self::LocalGeneral { message, origin } => {
                write!(f, "component exception: {message} (origin: {origin})")
            }
            Self::RemoteGeneral { message, origin, .. } => {
                write!(f, "remote exception: {message} (origin: {origin})")
            }
            Self::LocalTransactionRolledBack { message, origin } => {
                write!(f, "transaction rolled back: {message} (origin: {origin})")
            }
            Self::RemoteTransactionRolledBack { message, origin } => {
                write!(f, "remote transaction rolled back: {message} (origin: {origin})")
            }
            Self::NoSuchInstance { message, .. } => write!(f, "no such instance: {message}"),
            Self::ConcurrentAccess { message, .. } => write!(f, "concurrent access denied: {message}"),
        }
    }
}

/// The complete mapping decision for one invocation: classification, whether
/// rollback was marked, whether the failure was logged, and the exception
/// surfaced to the caller. Recorded on the invocation context so repeated
/// mapping passes return the same result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedFault {
    pub kind: FaultKind,
    pub rollback_marked: bool,
    pub logged: bool,
    pub visible: VisibleException,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_error_fault_chain() {
        let plain = BusinessError::unchecked("NullPointer", "boom");
        assert_eq!(plain.as_system_fault().message, "NullPointer: boom");
        assert!(plain.as_system_fault().cause.is_none());

        let chained = BusinessError::unchecked("WrapperFailure", "outer")
            .with_cause(SystemFault::new("disk on fire"));
        assert_eq!(chained.as_system_fault().root_cause().message, "disk on fire");
    }

    #[test]
    fn test_visible_exception_channel() {
        assert!(!VisibleException::local_general("m", "o").is_remote());
        assert!(VisibleException::RemoteGeneral {
            message: "m".into(),
            origin: "o".into(),
            nested: None,
        }
        .is_remote());
        assert!(VisibleException::NoSuchInstance {
            message: "gone".into(),
            remote: true,
        }
        .is_remote());
    }
}
