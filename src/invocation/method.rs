//! Per-method invocation metadata.

use crate::error::LockType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Channel a call arrives through. The channel selects the exception
/// mapping family and, for timers, enables the deadlock-avoidance probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodChannel {
    Local,
    Remote,
    Timer,
}

impl fmt::Display for MethodChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
            Self::Timer => write!(f, "timer"),
        }
    }
}

/// Container-managed transaction attribute of a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionAttribute {
    Required,
    RequiresNew,
    Supports,
    NotSupported,
    Mandatory,
    Never,
}

impl TransactionAttribute {
    /// Whether the container begins a transaction for this method when none
    /// is active.
    pub fn begins_transaction(self) -> bool {
        matches!(self, Self::Required | Self::RequiresNew)
    }
}

/// How long an invocation may wait to begin. The timeout only governs the
/// wait for the instance lock or pool capacity; it never interrupts a
/// method that is already running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessTimeout {
    /// Wait indefinitely (`-1` in external metadata).
    Indefinite,
    /// Fail immediately if unavailable (`0`).
    NoWait,
    /// Bounded wait in milliseconds.
    Millis(u64),
}

impl AccessTimeout {
    pub fn from_millis(millis: i64) -> Self {
        match millis {
            m if m < 0 => Self::Indefinite,
            0 => Self::NoWait,
            m => Self::Millis(m as u64),
        }
    }

    /// Millisecond form for diagnostics: `-1`, `0`, or the bound.
    pub fn as_millis(self) -> i64 {
        match self {
            Self::Indefinite => -1,
            Self::NoWait => 0,
            Self::Millis(m) => m as i64,
        }
    }

    pub fn bounded(self) -> Option<Duration> {
        match self {
            Self::Indefinite => None,
            Self::NoWait => Some(Duration::ZERO),
            Self::Millis(m) => Some(Duration::from_millis(m)),
        }
    }
}

/// Descriptor of a single exposed method: what the generated dispatch
/// wrapper knows about it at invocation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    /// Simple method name, unique per component in this kernel.
    pub name: String,
    /// Human-readable signature used in error messages and traces.
    pub signature: String,
    pub channel: MethodChannel,
    pub tx_attribute: TransactionAttribute,
    /// Lock discipline for shared (singleton) instances; ignored for other
    /// kinds and under bean-managed concurrency.
    pub lock_type: LockType,
    pub access_timeout: AccessTimeout,
}

impl MethodDescriptor {
    pub fn new(name: impl Into<String>, channel: MethodChannel) -> Self {
        let name = name.into();
        let signature = format!("{name}()");
        Self {
            name,
            signature,
            channel,
            tx_attribute: TransactionAttribute::Required,
            lock_type: LockType::Write,
            access_timeout: AccessTimeout::Indefinite,
        }
    }

    pub fn with_lock(mut self, lock_type: LockType) -> Self {
        self.lock_type = lock_type;
        self
    }

    pub fn with_access_timeout(mut self, timeout: AccessTimeout) -> Self {
        self.access_timeout = timeout;
        self
    }

    pub fn with_tx_attribute(mut self, attribute: TransactionAttribute) -> Self {
        self.tx_attribute = attribute;
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = signature.into();
        self
    }
}
