//! Bounded instance pool for the pooled kinds.
//!
//! The pool bounds how many instances may exist concurrently. A single
//! release or discard wakes one capacity waiter; a drain wakes all of them.
//! The wake always happens under the same mutex as `acquire`/`release`, so
//! a release or discard can never race a sleeping waiter into a lost wakeup.

use super::instance::InstanceRecord;
use super::states::LifecycleState;
use crate::error::ConcurrentAccessTimeoutError;
use crate::invocation::AccessTimeout;
use parking_lot::{Condvar, Mutex};
use std::time::Instant;
use tracing::trace;

/// Result of an acquisition attempt: a pooled idle instance, or permission
/// to create one (the outstanding counter is already incremented; the caller
/// must hand the created record back through [`InstancePool::release`] or
/// surrender the slot with [`InstancePool::forget`]).
pub enum PoolTicket<S: LifecycleState> {
    Free(InstanceRecord<S>),
    CreateGranted,
}

impl<S: LifecycleState> std::fmt::Debug for PoolTicket<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free(record) => f.debug_tuple("Free").field(record).finish(),
            Self::CreateGranted => write!(f, "CreateGranted"),
        }
    }
}

struct PoolInner<S: LifecycleState> {
    free: Vec<InstanceRecord<S>>,
    outstanding: usize,
}

pub struct InstancePool<S: LifecycleState> {
    inner: Mutex<PoolInner<S>>,
    available: Condvar,
    capacity: usize,
}

impl<S: LifecycleState> InstancePool<S> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "pool capacity must be positive");
        Self {
            inner: Mutex::new(PoolInner {
                free: Vec::new(),
                outstanding: 0,
            }),
            available: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn outstanding(&self) -> usize {
        self.inner.lock().outstanding
    }

    pub fn free_count(&self) -> usize {
        self.inner.lock().free.len()
    }

    /// Acquire an idle instance or a creation grant, waiting up to `timeout`
    /// for capacity.
    pub fn acquire(
        &self,
        method_signature: &str,
        timeout: AccessTimeout,
    ) -> Result<PoolTicket<S>, ConcurrentAccessTimeoutError> {
        let deadline = timeout.bounded().map(|d| Instant::now() + d);
        let mut inner = self.inner.lock();
        loop {
            if let Some(record) = inner.free.pop() {
                trace!(free = inner.free.len(), outstanding = inner.outstanding, "pool hit");
                return Ok(PoolTicket::Free(record));
            }
            if inner.outstanding < self.capacity {
                inner.outstanding += 1;
                trace!(outstanding = inner.outstanding, capacity = self.capacity, "pool create granted");
                return Ok(PoolTicket::CreateGranted);
            }
            match deadline {
                None => {
                    self.available.wait(&mut inner);
                }
                Some(deadline) => {
                    if Instant::now() >= deadline
                        || self.available.wait_until(&mut inner, deadline).timed_out()
                    {
                        return Err(ConcurrentAccessTimeoutError::Timeout {
                            lock_type: crate::error::LockType::Write,
                            method: method_signature.to_string(),
                            timeout_millis: timeout.as_millis(),
                        });
                    }
                }
            }
        }
    }

    /// Return an instance to the free list and wake one capacity waiter.
    pub fn release(&self, record: InstanceRecord<S>) {
        let mut inner = self.inner.lock();
        inner.free.push(record);
        self.available.notify_one();
    }

    /// Surrender an instance slot after destruction or discard (or a failed
    /// creation): decrements the outstanding counter and wakes exactly one
    /// waiter, under the same lock as `acquire`.
    pub fn forget(&self) {
        let mut inner = self.inner.lock();
        debug_assert!(inner.outstanding > 0, "forget without outstanding instance");
        inner.outstanding = inner.outstanding.saturating_sub(1);
        self.available.notify_one();
    }

    /// Remove every idle instance for destruction, surrendering their
    /// slots. In-flight instances surrender theirs on return-path discard.
    /// Every waiter is woken: the drain may have freed more than one slot.
    pub fn drain(&self) -> Vec<InstanceRecord<S>> {
        let mut inner = self.inner.lock();
        let drained: Vec<_> = inner.free.drain(..).collect();
        inner.outstanding = inner.outstanding.saturating_sub(drained.len());
        if !drained.is_empty() {
            self.available.notify_all();
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{ComponentIdentity, ComponentKind, ComponentName};
    use crate::lifecycle::states::StatelessState;
    use crate::test_support::CountingComponent;
    use std::sync::Arc;
    use std::time::Duration;

    fn record() -> InstanceRecord<StatelessState> {
        let identity = ComponentIdentity::instance(
            ComponentName::new("app", "mod", "Comp"),
            ComponentKind::Stateless,
            None,
        );
        InstanceRecord::new(identity, Box::new(CountingComponent::default()))
    }

    #[test]
    fn test_acquire_grants_creation_up_to_capacity() {
        let pool: InstancePool<StatelessState> = InstancePool::new(2);
        assert!(matches!(
            pool.acquire("m()", AccessTimeout::NoWait).unwrap(),
            PoolTicket::CreateGranted
        ));
        assert!(matches!(
            pool.acquire("m()", AccessTimeout::NoWait).unwrap(),
            PoolTicket::CreateGranted
        ));
        assert!(pool.acquire("m()", AccessTimeout::NoWait).is_err());
        assert_eq!(pool.outstanding(), 2);
    }

    #[test]
    fn test_release_prefers_pooled_instance() {
        let pool: InstancePool<StatelessState> = InstancePool::new(2);
        let PoolTicket::CreateGranted = pool.acquire("m()", AccessTimeout::NoWait).unwrap() else {
            panic!("expected creation grant");
        };
        pool.release(record());
        assert!(matches!(
            pool.acquire("m()", AccessTimeout::NoWait).unwrap(),
            PoolTicket::Free(_)
        ));
    }

    #[test]
    fn test_forget_wakes_blocked_waiter() {
        let pool: Arc<InstancePool<StatelessState>> = Arc::new(InstancePool::new(1));
        let PoolTicket::CreateGranted = pool.acquire("m()", AccessTimeout::NoWait).unwrap() else {
            panic!("expected creation grant");
        };

        let waiter = {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || pool.acquire("m()", AccessTimeout::Millis(2_000)))
        };
        std::thread::sleep(Duration::from_millis(50));
        pool.forget();
        let ticket = waiter.join().unwrap().unwrap();
        assert!(matches!(ticket, PoolTicket::CreateGranted));
    }

    #[test]
    fn test_bounded_wait_times_out() {
        let pool: Arc<InstancePool<StatelessState>> = Arc::new(InstancePool::new(1));
        let _granted = pool.acquire("m()", AccessTimeout::NoWait).unwrap();
        let started = Instant::now();
        let result = pool.acquire("busy()", AccessTimeout::Millis(100));
        assert!(result.is_err());
        assert!(started.elapsed() >= Duration::from_millis(100));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("busy()"));
        assert!(err.contains("100"));
    }

    #[test]
    fn test_drain_lets_every_freed_slot_be_reacquired() {
        let pool: Arc<InstancePool<StatelessState>> = Arc::new(InstancePool::new(2));
        for _ in 0..2 {
            let PoolTicket::CreateGranted = pool.acquire("m()", AccessTimeout::NoWait).unwrap()
            else {
                panic!("expected creation grant");
            };
        }

        let waiters: Vec<_> = (0..2)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || pool.acquire("m()", AccessTimeout::Millis(3_000)))
            })
            .collect();
        std::thread::sleep(Duration::from_millis(50));

        // Both instances come back idle and are drained away; both waiters
        // must get creation grants for the surrendered slots.
        pool.release(record());
        pool.release(record());
        pool.drain();
        for waiter in waiters {
            assert!(waiter.join().unwrap().is_ok());
        }
    }

    #[test]
    fn test_drain_empties_free_list() {
        let pool: InstancePool<StatelessState> = InstancePool::new(3);
        for _ in 0..2 {
            let PoolTicket::CreateGranted = pool.acquire("m()", AccessTimeout::NoWait).unwrap()
            else {
                panic!("expected creation grant");
            };
        }
        pool.release(record());
        pool.release(record());
        assert_eq!(pool.drain().len(), 2);
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.free_count(), 0);
    }
}
