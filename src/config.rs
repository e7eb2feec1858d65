//! # Kernel Configuration
//!
//! Tuning knobs the embedding runtime hands to the kernel at construction.
//! Every field has a documented default; the struct is serde-friendly so an
//! embedder can deserialize it from whatever configuration source it owns.

use crate::constants::{defaults, platform};
use serde::{Deserialize, Serialize};

/// Byte-order-selecting platform the kernel writes encodings for. Decoders
/// always honor the platform advertised by the record being read, regardless
/// of this setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Distributed platforms; multi-byte length fields little-endian.
    Distributed,
    /// Legacy host platform; multi-byte length fields big-endian.
    Host,
}

impl Platform {
    pub fn code(self) -> u16 {
        match self {
            Self::Distributed => platform::DISTRIBUTED,
            Self::Host => platform::HOST,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            platform::DISTRIBUTED => Some(Self::Distributed),
            platform::HOST => Some(Self::Host),
            _ => None,
        }
    }

    /// True when multi-byte length fields are written big-endian.
    pub fn big_endian(self) -> bool {
        matches!(self, Self::Host)
    }
}

/// Kernel-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Platform whose byte order newly written encodings advertise.
    pub platform: Platform,

    /// Probe window in milliseconds for timer-triggered lock acquisition.
    /// A timer callback whose access timeout exceeds this first tries the
    /// lock for only this long; if that fails while a timer enumeration is
    /// in progress, the wait is abandoned as a detected deadlock.
    pub deadlock_probe_millis: u64,

    /// When true, a remote-channel system failure in a transaction begun by
    /// the failing method is wrapped in the generic remote failure type
    /// instead of the rolled-back-transaction type, so downstream unwrapping
    /// does not strip the root cause.
    pub nest_remote_causes: bool,

    /// Explicit override extending `nest_remote_causes` to transactions the
    /// failing method did not begin. A documented deviation from strict
    /// component-contract wording; off by default.
    pub nest_remote_causes_always: bool,

    /// Access timeout applied when a method descriptor does not carry one.
    /// `-1` waits indefinitely, `0` fails immediately, positive values are a
    /// bounded wait in milliseconds.
    pub default_access_timeout_millis: i64,

    /// Bound on concurrently creatable instances for pooled kinds that do
    /// not declare their own capacity.
    pub default_pool_capacity: usize,

    /// When true the kernel is draining: timer expirations fail fast without
    /// invoking callbacks and without marking the persisted task successful.
    pub shutting_down: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            platform: Platform::Distributed,
            deadlock_probe_millis: defaults::DEADLOCK_PROBE_MILLIS,
            nest_remote_causes: false,
            nest_remote_causes_always: false,
            default_access_timeout_millis: defaults::ACCESS_TIMEOUT_MILLIS,
            default_pool_capacity: defaults::POOL_CAPACITY,
            shutting_down: false,
        }
    }
}
