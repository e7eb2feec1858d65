//! # Shared-Instance Locking Engine
//!
//! One [`AccessLock`] guards each shared (singleton) instance under
//! container-managed concurrency. READ acquisitions run concurrently with
//! each other and exclusively with WRITE. Three behaviors beyond a plain
//! reader/writer lock carry the component contract:
//!
//! - a thread holding READ that requests WRITE fails immediately with the
//!   loopback-upgrade error rather than deadlocking in the upgrade;
//! - a thread already holding WRITE re-enters freely (reentrant grant);
//! - timer-triggered acquisitions probe briefly and abandon the wait if a
//!   concurrent timer enumeration is in progress, breaking the dual-resource
//!   deadlock between the kernel lock and the timer store's row lock.
//!
//! Bean-managed concurrency bypasses this engine entirely.

use crate::error::{ConcurrentAccessTimeoutError, LockType};
use crate::invocation::AccessTimeout;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Shared counter tracking threads inside the "enumerate all timers"
/// operation. The deadlock probe consults it: a timer callback that cannot
/// get its instance lock while an enumeration is running is in the textbook
/// dual-resource deadlock and must abandon the wait.
#[derive(Debug, Default)]
pub struct TimerEnumerationGuard(AtomicUsize);

impl TimerEnumerationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the enumeration; the returned token exits on drop.
    pub fn enter(self: &Arc<Self>) -> EnumerationToken {
        self.0.fetch_add(1, Ordering::SeqCst);
        EnumerationToken {
            guard: Arc::clone(self),
        }
    }

    pub fn in_progress(&self) -> bool {
        self.0.load(Ordering::SeqCst) > 0
    }
}

pub struct EnumerationToken {
    guard: Arc<TimerEnumerationGuard>,
}

impl Drop for EnumerationToken {
    fn drop(&mut self) {
        self.guard.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// One acquisition request, carrying everything the engine needs to decide
/// and to produce a useful error.
#[derive(Debug, Clone, Copy)]
pub struct AcquireRequest<'a> {
    pub lock_type: LockType,
    pub timeout: AccessTimeout,
    pub method_signature: &'a str,
    /// True when this invocation was triggered by a persistent timer; only
    /// then does the deadlock probe apply.
    pub timer_dispatch: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct HoldCounts {
    read: usize,
    write: usize,
}

/// Reader/writer lock with per-thread hold tracking and timed acquisition.
pub struct AccessLock {
    rw: RwLock<()>,
    fair: bool,
    holds: Mutex<HashMap<ThreadId, HoldCounts>>,
    enumeration_guard: Arc<TimerEnumerationGuard>,
    deadlock_probe: Duration,
}

impl AccessLock {
    pub fn new(
        fair: bool,
        deadlock_probe_millis: u64,
        enumeration_guard: Arc<TimerEnumerationGuard>,
    ) -> Self {
        Self {
            rw: RwLock::new(()),
            fair,
            holds: Mutex::new(HashMap::new()),
            enumeration_guard,
            deadlock_probe: Duration::from_millis(deadlock_probe_millis),
        }
    }

    /// Whether grant order approximates arrival order. The underlying lock's
    /// eventual-fairness policy provides the approximation either way; the
    /// flag is recorded configuration, surfaced for observability.
    pub fn fair(&self) -> bool {
        self.fair
    }

    pub fn enumeration_guard(&self) -> &Arc<TimerEnumerationGuard> {
        &self.enumeration_guard
    }

    fn current_holds(&self) -> HoldCounts {
        self.holds
            .lock()
            .get(&thread::current().id())
            .copied()
            .unwrap_or_default()
    }

    fn record_acquired(&self, lock_type: LockType) {
        let mut holds = self.holds.lock();
        let entry = holds.entry(thread::current().id()).or_default();
        match lock_type {
            LockType::Read => entry.read += 1,
            LockType::Write => entry.write += 1,
        }
    }

    fn record_released(&self, lock_type: LockType) {
        let mut holds = self.holds.lock();
        let tid = thread::current().id();
        if let Some(entry) = holds.get_mut(&tid) {
            match lock_type {
                LockType::Read => entry.read = entry.read.saturating_sub(1),
                LockType::Write => entry.write = entry.write.saturating_sub(1),
            }
            if entry.read == 0 && entry.write == 0 {
                holds.remove(&tid);
            }
        }
    }

    /// Acquire per the request. Every attempt is timed and traced,
    /// succeeding or not. The returned [`HeldLock`] releases on drop and
    /// records exactly what was acquired; reentrant grants release nothing.
    pub fn acquire(&self, request: AcquireRequest<'_>) -> Result<HeldLock<'_>, ConcurrentAccessTimeoutError> {
        let started = Instant::now();
        let result = self.acquire_inner(request, started);
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(held) => trace!(
                lock_type = %request.lock_type,
                method = request.method_signature,
                elapsed_ms,
                reentrant = matches!(held.kind, HeldKind::Reentrant),
                "lock acquired"
            ),
            Err(error) => debug!(
                lock_type = %request.lock_type,
                method = request.method_signature,
                elapsed_ms,
                error = %error,
                "lock acquisition failed"
            ),
        }
        result
    }

    fn acquire_inner(
        &self,
        request: AcquireRequest<'_>,
        started: Instant,
    ) -> Result<HeldLock<'_>, ConcurrentAccessTimeoutError> {
        let holds = self.current_holds();
        if holds.write > 0 {
            // Already exclusive on this thread; any further entry is a
            // reentrant grant with nothing to release.
            return Ok(HeldLock::reentrant(self));
        }
        if holds.read > 0 && request.lock_type == LockType::Write {
            return Err(ConcurrentAccessTimeoutError::LoopbackUpgrade {
                method: request.method_signature.to_string(),
            });
        }

        let mut budget = request.timeout.bounded();

        // Timer deadlock probe: try briefly, then check whether a timer
        // enumeration holds the other half of the dual-resource cycle.
        let probe_applies = request.timer_dispatch
            && budget.map_or(true, |b| b > self.deadlock_probe)
            && !self.deadlock_probe.is_zero();
        if probe_applies {
            if let Some(held) = self.try_acquire_for(request.lock_type, self.deadlock_probe) {
                return Ok(held);
            }
            if self.enumeration_guard.in_progress() {
                warn!(
                    lock_type = %request.lock_type,
                    method = request.method_signature,
                    probe_ms = self.deadlock_probe.as_millis() as u64,
                    "timer callback abandoning lock wait: timer enumeration in progress"
                );
                return Err(ConcurrentAccessTimeoutError::DeadlockAvoided {
                    lock_type: request.lock_type,
                    method: request.method_signature.to_string(),
                    probe_millis: self.deadlock_probe.as_millis() as u64,
                });
            }
            if let Some(b) = budget {
                budget = Some(b.saturating_sub(started.elapsed()));
            }
        }

        match budget {
            None => Ok(self.acquire_blocking(request.lock_type)),
            Some(remaining) => self
                .try_acquire_for(request.lock_type, remaining)
                .ok_or_else(|| ConcurrentAccessTimeoutError::Timeout {
                    lock_type: request.lock_type,
                    method: request.method_signature.to_string(),
                    timeout_millis: request.timeout.as_millis(),
                }),
        }
    }

    fn acquire_blocking(&self, lock_type: LockType) -> HeldLock<'_> {
        match lock_type {
            LockType::Read => {
                // Recursive read keeps a reader that re-enters from being
                // queued behind a waiting writer and deadlocking itself.
                let guard = self.rw.read_recursive();
                self.record_acquired(LockType::Read);
                HeldLock::read(self, guard)
            }
            LockType::Write => {
                let guard = self.rw.write();
                self.record_acquired(LockType::Write);
                HeldLock::write(self, guard)
            }
        }
    }

    fn try_acquire_for(&self, lock_type: LockType, window: Duration) -> Option<HeldLock<'_>> {
        match lock_type {
            LockType::Read => {
                let guard = if window.is_zero() {
                    self.rw.try_read_recursive()
                } else {
                    self.rw.try_read_recursive_for(window)
                }?;
                self.record_acquired(LockType::Read);
                Some(HeldLock::read(self, guard))
            }
            LockType::Write => {
                let guard = if window.is_zero() {
                    self.rw.try_write()
                } else {
                    self.rw.try_write_for(window)
                }?;
                self.record_acquired(LockType::Write);
                Some(HeldLock::write(self, guard))
            }
        }
    }
}

impl std::fmt::Debug for AccessLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessLock")
            .field("fair", &self.fair)
            .field("deadlock_probe", &self.deadlock_probe)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeldKind {
    Read,
    Write,
    Reentrant,
    /// Bean-managed concurrency: engine bypassed, nothing held.
    Bypass,
}

/// What an invocation actually holds; releases on drop. Unlock is driven by
/// this record, never inferred from the method descriptor, and only happens
/// when acquisition actually succeeded.
pub struct HeldLock<'a> {
    lock: Option<&'a AccessLock>,
    kind: HeldKind,
    read_guard: Option<RwLockReadGuard<'a, ()>>,
    write_guard: Option<RwLockWriteGuard<'a, ()>>,
}

impl<'a> HeldLock<'a> {
    fn read(lock: &'a AccessLock, guard: RwLockReadGuard<'a, ()>) -> Self {
        Self {
            lock: Some(lock),
            kind: HeldKind::Read,
            read_guard: Some(guard),
            write_guard: None,
        }
    }

    fn write(lock: &'a AccessLock, guard: RwLockWriteGuard<'a, ()>) -> Self {
        Self {
            lock: Some(lock),
            kind: HeldKind::Write,
            read_guard: None,
            write_guard: Some(guard),
        }
    }

    fn reentrant(lock: &'a AccessLock) -> Self {
        Self {
            lock: Some(lock),
            kind: HeldKind::Reentrant,
            read_guard: None,
            write_guard: None,
        }
    }

    /// The no-op hold used when the engine is bypassed (bean-managed
    /// concurrency) or the kind carries no lock at all.
    pub fn bypass() -> Self {
        Self {
            lock: None,
            kind: HeldKind::Bypass,
            read_guard: None,
            write_guard: None,
        }
    }

    /// The lock type actually acquired by this hold, if any.
    pub fn acquired(&self) -> Option<LockType> {
        match self.kind {
            HeldKind::Read => Some(LockType::Read),
            HeldKind::Write => Some(LockType::Write),
            HeldKind::Reentrant | HeldKind::Bypass => None,
        }
    }
}

impl std::fmt::Debug for HeldLock<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeldLock")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl Drop for HeldLock<'_> {
    fn drop(&mut self) {
        self.read_guard.take();
        self.write_guard.take();
        if let (Some(lock), Some(lock_type)) = (
            self.lock,
            match self.kind {
                HeldKind::Read => Some(LockType::Read),
                HeldKind::Write => Some(LockType::Write),
                _ => None,
            },
        ) {
            lock.record_released(lock_type);
        }
    }
}
