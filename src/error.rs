//! # Structured Error Taxonomy
//!
//! Every failure the kernel can surface falls into one of six categories with
//! distinct retry/propagation semantics:
//!
//! - [`FormatError`] — malformed identity or timer encoding; fatal to the
//!   single decode, never degraded into "no key"
//! - [`NotInstalledError`] — component or method no longer resolvable; often
//!   transient across redeploy, callers may retry
//! - [`IllegalStateError`] — operation invalid for the current lifecycle
//!   state; a contract violation, never retried and never suppressed
//! - [`ConcurrentAccessTimeoutError`] — lock not acquired within budget,
//!   including the deadlock-avoidance short-circuit; caller-visible
//! - application-level failures, carried by `faults::BusinessError`
//! - [`SystemFault`] — everything else; logged, forces rollback

use std::fmt;
use thiserror::Error;

/// Malformed identity or timer encoding. Always fatal to the decode that
/// raised it; never treated as a recoverable condition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// The fixed magic/version header did not match. Raised before any other
    /// byte is interpreted; an invalid header is never a silent fallback.
    #[error("not a recognized identity: bad header {found:02x?}")]
    BadHeader { found: Vec<u8> },

    /// A length-prefixed field claimed more bytes than remain. When the
    /// byte-order-reversed reading of the length would have fit, that value
    /// is reported to aid diagnosis of cross-platform corruption.
    #[error("truncated field: {claimed} bytes claimed, {available} available{}",
            .reversed_hint.map(|r| format!(" (byte-order-reversed length would be {r})")).unwrap_or_default())]
    Truncated {
        claimed: u64,
        available: u64,
        reversed_hint: Option<u64>,
    },

    /// The kind tag did not denote any component kind this kernel knows.
    #[error("unsupported component kind tag: 0x{0:02x}")]
    UnsupportedKind(u8),

    /// The key-type tag did not denote any supported key encoding.
    #[error("unsupported key-type tag: 0x{0:02x}")]
    UnsupportedKeyTag(u8),

    /// A persisted record carried a version this reader does not implement.
    #[error("unsupported record version: {0}")]
    UnsupportedVersion(u16),

    /// A field decoded but its content was invalid (bad UTF-8, empty name,
    /// unparseable schedule expression, malformed payload).
    #[error("malformed encoding: {0}")]
    Malformed(String),
}

/// The named component (or, for automatic timers, its target method) is not
/// currently installed. Common across hot redeploy; deliberately distinct
/// from [`FormatError`] so callers can treat it as transient.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("component not installed: {name}{}", .method.as_ref().map(|m| format!(" (method {m})")).unwrap_or_default())]
pub struct NotInstalledError {
    pub name: String,
    pub method: Option<String>,
}

impl NotInstalledError {
    pub fn component(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method: None,
        }
    }

    pub fn method(name: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method: Some(method.into()),
        }
    }
}

/// An operation was attempted in a lifecycle state that forbids it, or a
/// state transition was requested from a state it is not legal in. The
/// message always names both the current and the attempted state or
/// operation so the contract violation is visible during development.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IllegalStateError {
    #[error("illegal transition from {current} to {attempted}")]
    Transition { current: String, attempted: String },

    #[error("operation {operation} not allowed in state {current}")]
    Operation { current: String, operation: String },

    /// Concurrent re-entry was detected on a non-reentrant instance before
    /// the method body ran.
    #[error("reentrant call denied on non-reentrant instance in state {current}")]
    Reentrancy { current: String },
}

/// Lock type requested for a business or timeout method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockType {
    Read,
    Write,
}

impl fmt::Display for LockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "READ"),
            Self::Write => write!(f, "WRITE"),
        }
    }
}

/// The instance lock could not be acquired within the invocation's access
/// timeout budget. Never retried internally; surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConcurrentAccessTimeoutError {
    #[error("unable to acquire {lock_type} lock for {method} within {timeout_millis}ms")]
    Timeout {
        lock_type: LockType,
        method: String,
        timeout_millis: i64,
    },

    /// The calling thread already holds READ on this instance and asked for
    /// WRITE: the classic reader/writer upgrade deadlock. Fails immediately,
    /// never blocks.
    #[error("lock upgrade via loopback call not permitted: {method} requested WRITE while holding READ")]
    LoopbackUpgrade { method: String },

    /// The timer deadlock probe tripped: a concurrent timer enumeration holds
    /// (or is about to hold) the store-level lock this callback's transaction
    /// needs, while we hold the store lock it needs.
    #[error("deadlock detected: timeout method {method} abandoned {lock_type} lock wait after {probe_millis}ms probe while a timer enumeration is in progress")]
    DeadlockAvoided {
        lock_type: LockType,
        method: String,
        probe_millis: u64,
    },
}

/// Unclassified failure: logged, reported to diagnostics, and forces
/// rollback of the active transaction. The cause chain is preserved so the
/// externally visible failure points at the true origin.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}{}", .cause.as_ref().map(|c| format!("; caused by: {c}")).unwrap_or_default())]
pub struct SystemFault {
    pub message: String,
    pub cause: Option<Box<SystemFault>>,
}

impl SystemFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    pub fn caused_by(message: impl Into<String>, cause: SystemFault) -> Self {
        Self {
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    /// The innermost cause in the chain; used when overwriting a mapped
    /// exception's origin so it names the true failure point.
    pub fn root_cause(&self) -> &SystemFault {
        let mut fault = self;
        while let Some(cause) = fault.cause.as_deref() {
            fault = cause;
        }
        fault
    }
}

/// Aggregate kernel error. Subsystems return their own categories; this enum
/// is the single channel callers match on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    NotInstalled(#[from] NotInstalledError),

    #[error(transparent)]
    IllegalState(#[from] IllegalStateError),

    #[error(transparent)]
    ConcurrentAccessTimeout(#[from] ConcurrentAccessTimeoutError),

    #[error(transparent)]
    System(#[from] SystemFault),
}

pub type Result<T> = std::result::Result<T, KernelError>;
