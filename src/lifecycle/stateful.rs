//! Stateful session driver: one conversational instance per primary key,
//! never pooled, single caller at a time.
//!
//! The session slot is the serialization point: a call checks the instance
//! out of its slot and marks the slot busy with the calling thread. A
//! loopback call from the same thread is detected before any wait and denied
//! as a reentrancy conflict; a concurrent call from another thread waits for
//! the slot within the method's access-timeout budget.

use super::instance::{InstanceFactory, InstanceRecord};
use super::states::{Operation, StatefulState};
use super::transitions::{self, OperationTable};
use crate::error::{ConcurrentAccessTimeoutError, IllegalStateError, LockType, NotInstalledError};
use crate::faults::Fault;
use crate::identity::{ComponentIdentity, ComponentKind, ComponentName, PrimaryKey};
use crate::invocation::{CallbackContext, MethodDescriptor, TransactionControl};
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Instant;
use tracing::{debug, instrument};

pub const STATEFUL_OPERATIONS: OperationTable<StatefulState> = &[
    (StatefulState::PreCreate, &[Operation::LifecycleCallback]),
    (
        StatefulState::Creating,
        &[
            Operation::LifecycleCallback,
            Operation::GetCallerPrincipal,
            Operation::GetSelfReference,
        ],
    ),
    (StatefulState::MethodReady, &[]),
    (
        StatefulState::InMethod,
        &[
            Operation::BusinessCall,
            Operation::GetCallerPrincipal,
            Operation::GetRollbackOnly,
            Operation::SetRollbackOnly,
            Operation::GetSelfReference,
            Operation::TxDemarcation,
        ],
    ),
    (
        StatefulState::Removing,
        &[Operation::LifecycleCallback, Operation::GetCallerPrincipal],
    ),
    (StatefulState::Destroyed, &[]),
];

struct SlotInner {
    record: Option<InstanceRecord<StatefulState>>,
    busy: Option<ThreadId>,
    removed: bool,
}

struct SessionSlot {
    inner: Mutex<SlotInner>,
    available: Condvar,
}

/// Driver for one installed stateful component: the session map plus the
/// creation and removal flows.
pub struct StatefulRuntime {
    name: ComponentName,
    factory: InstanceFactory,
    sessions: DashMap<PrimaryKey, Arc<SessionSlot>>,
}

impl StatefulRuntime {
    pub fn new(name: ComponentName, factory: InstanceFactory) -> Self {
        Self {
            name,
            factory,
            sessions: DashMap::new(),
        }
    }

    pub fn name(&self) -> &ComponentName {
        &self.name
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn permitted(state: StatefulState) -> &'static [Operation] {
        transitions::permitted_operations(state, STATEFUL_OPERATIONS)
    }

    /// Create a session for `key`: inject in PRE_CREATE, post-construct in
    /// CREATING, then METHOD_READY. Creation failures discard the half-built
    /// instance without pre-destroy.
    #[instrument(skip_all, fields(component = %self.name, key = %key))]
    pub fn create_session(
        &self,
        key: PrimaryKey,
        tx: &dyn TransactionControl,
    ) -> Result<(), Fault> {
        if self.sessions.contains_key(&key) {
            return Err(Fault::System(crate::error::SystemFault::new(format!(
                "session {key} already exists for {}",
                self.name
            ))));
        }
        let identity =
            ComponentIdentity::instance(self.name.clone(), ComponentKind::Stateful, Some(key.clone()));
        let mut record = InstanceRecord::<StatefulState>::new(identity, (self.factory)());

        let state_name = record.state().to_string();
        let ctx = CallbackContext::new(&state_name, Self::permitted(record.state()), tx);
        if let Err(error) = record.instance().inject(&ctx) {
            record.discard();
            return Err(error.into());
        }
        record.transition(StatefulState::PreCreate, StatefulState::Creating)?;

        let state_name = record.state().to_string();
        let ctx = CallbackContext::new(&state_name, Self::permitted(record.state()), tx);
        if let Err(error) = record.instance().post_construct(&ctx) {
            record.discard();
            return Err(error.into());
        }
        record.transition(StatefulState::Creating, StatefulState::MethodReady)?;

        let slot = Arc::new(SessionSlot {
            inner: Mutex::new(SlotInner {
                record: Some(record),
                busy: None,
                removed: false,
            }),
            available: Condvar::new(),
        });
        match self.sessions.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                // Lost a creation race; the half-built loser is discarded.
                if let Some(mut record) = slot.inner.lock().record.take() {
                    record.discard();
                }
                Err(Fault::System(crate::error::SystemFault::new(format!(
                    "session {} already exists for {}",
                    entry.key(),
                    self.name
                ))))
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(slot);
                debug!("session created");
                Ok(())
            }
        }
    }

    fn slot(&self, key: &PrimaryKey) -> Result<Arc<SessionSlot>, Fault> {
        self.sessions
            .get(key)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Fault::NotFound(NotInstalledError::component(format!("{}#{key}", self.name))))
    }

    /// Check the session instance out for a call, moving it to IN_METHOD.
    #[instrument(skip_all, fields(component = %self.name, key = %key, method = %method.signature))]
    pub fn acquire(
        &self,
        key: &PrimaryKey,
        method: &MethodDescriptor,
    ) -> Result<InstanceRecord<StatefulState>, Fault> {
        let slot = self.slot(key)?;
        let deadline = method.access_timeout.bounded().map(|d| Instant::now() + d);
        let mut inner = slot.inner.lock();
        loop {
            if inner.removed {
                return Err(Fault::NotFound(NotInstalledError::component(format!(
                    "{}#{key}",
                    self.name
                ))));
            }
            if let Some(mut record) = inner.record.take() {
                inner.busy = Some(thread::current().id());
                drop(inner);
                record.transition(StatefulState::MethodReady, StatefulState::InMethod)?;
                return Ok(record);
            }
            // Loopback from the thread that already has the instance checked
            // out can never succeed; fail before waiting.
            if inner.busy == Some(thread::current().id()) {
                return Err(Fault::Reentrancy(IllegalStateError::Reentrancy {
                    current: StatefulState::InMethod.to_string(),
                }));
            }
            match deadline {
                None => {
                    slot.available.wait(&mut inner);
                }
                Some(deadline) => {
                    if Instant::now() >= deadline
                        || slot.available.wait_until(&mut inner, deadline).timed_out()
                    {
                        return Err(Fault::LockDenied(ConcurrentAccessTimeoutError::Timeout {
                            lock_type: LockType::Write,
                            method: method.signature.clone(),
                            timeout_millis: method.access_timeout.as_millis(),
                        }));
                    }
                }
            }
        }
    }

    /// Return the instance after a call. A failed call discards the whole
    /// session without callbacks; a clean call parks it METHOD_READY again.
    #[instrument(skip_all, fields(component = %self.name, key = %key, discard = discard))]
    pub fn release(&self, key: &PrimaryKey, mut record: InstanceRecord<StatefulState>, discard: bool) {
        let Ok(slot) = self.slot(key) else {
            record.discard();
            return;
        };
        if discard {
            record.discard();
            let mut inner = slot.inner.lock();
            inner.busy = None;
            inner.removed = true;
            slot.available.notify_all();
            drop(inner);
            self.sessions.remove(key);
            debug!("session discarded after failure");
            return;
        }
        let mut inner = slot.inner.lock();
        inner.busy = None;
        if record
            .transition(StatefulState::InMethod, StatefulState::MethodReady)
            .is_ok()
        {
            inner.record = Some(record);
            slot.available.notify_one();
        } else {
            record.discard();
            inner.removed = true;
            slot.available.notify_all();
            drop(inner);
            self.sessions.remove(key);
        }
    }

    /// Graceful remove: checks the instance out, passes through REMOVING,
    /// fires pre-destroy, and drops the session.
    #[instrument(skip_all, fields(component = %self.name, key = %key))]
    pub fn remove(
        &self,
        key: &PrimaryKey,
        method: &MethodDescriptor,
        tx: &dyn TransactionControl,
    ) -> Result<(), Fault> {
        let slot = self.slot(key)?;
        let mut record = self.acquire(key, method)?;
        record.transition(StatefulState::InMethod, StatefulState::Removing)?;

        let state_name = record.state().to_string();
        let ctx = CallbackContext::new(&state_name, Self::permitted(record.state()), tx);
        record.destroy(&ctx);

        let mut inner = slot.inner.lock();
        inner.busy = None;
        inner.removed = true;
        slot.available.notify_all();
        drop(inner);
        self.sessions.remove(key);
        debug!("session removed");
        Ok(())
    }

    /// Destroy every idle session gracefully; busy sessions are marked
    /// removed and destroyed by their release path.
    pub fn drain(&self, tx: &dyn TransactionControl) {
        let keys: Vec<PrimaryKey> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            let Ok(slot) = self.slot(&key) else { continue };
            let mut inner = slot.inner.lock();
            inner.removed = true;
            if let Some(mut record) = inner.record.take() {
                let _ = record.transition(StatefulState::MethodReady, StatefulState::Removing);
                let state_name = record.state().to_string();
                let ctx = CallbackContext::new(&state_name, Self::permitted(record.state()), tx);
                record.destroy(&ctx);
            }
            slot.available.notify_all();
            drop(inner);
            self.sessions.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::{AccessTimeout, MethodChannel, RecordingTransaction};
    use crate::test_support::CountingComponent;
    use std::time::Duration;

    fn runtime() -> (Arc<CountingComponent>, StatefulRuntime) {
        let component = Arc::new(CountingComponent::default());
        let template = Arc::clone(&component);
        let runtime = StatefulRuntime::new(
            ComponentName::new("app", "mod", "Cart"),
            Arc::new(move || Box::new(Arc::clone(&template))),
        );
        (component, runtime)
    }

    fn method(timeout: AccessTimeout) -> MethodDescriptor {
        MethodDescriptor::new("addItem", MethodChannel::Local).with_access_timeout(timeout)
    }

    #[test]
    fn test_create_acquire_release_cycle() {
        let (component, runtime) = runtime();
        let tx = RecordingTransaction::new();
        let key = PrimaryKey::from("session-1");
        runtime.create_session(key.clone(), &tx).unwrap();
        assert_eq!(component.post_construct_count(), 1);

        let record = runtime.acquire(&key, &method(AccessTimeout::NoWait)).unwrap();
        assert_eq!(record.state(), StatefulState::InMethod);
        runtime.release(&key, record, false);
        assert_eq!(runtime.session_count(), 1);
    }

    #[test]
    fn test_unknown_session_is_not_found() {
        let (_component, runtime) = runtime();
        let fault = runtime
            .acquire(&PrimaryKey::from("missing"), &method(AccessTimeout::NoWait))
            .unwrap_err();
        assert!(matches!(fault, Fault::NotFound(_)));
    }

    #[test]
    fn test_same_thread_reentry_is_denied_before_waiting() {
        let (_component, runtime) = runtime();
        let tx = RecordingTransaction::new();
        let key = PrimaryKey::from("session-1");
        runtime.create_session(key.clone(), &tx).unwrap();
        let record = runtime
            .acquire(&key, &method(AccessTimeout::Indefinite))
            .unwrap();

        let started = Instant::now();
        let fault = runtime
            .acquire(&key, &method(AccessTimeout::Indefinite))
            .unwrap_err();
        // Denied immediately, not after a wait.
        assert!(started.elapsed() < Duration::from_millis(100));
        assert!(matches!(fault, Fault::Reentrancy(_)));
        runtime.release(&key, record, false);
    }

    #[test]
    fn test_concurrent_caller_waits_then_times_out() {
        let (_component, runtime) = runtime();
        let runtime = Arc::new(runtime);
        let tx = RecordingTransaction::new();
        let key = PrimaryKey::from("session-1");
        runtime.create_session(key.clone(), &tx).unwrap();
        let record = runtime.acquire(&key, &method(AccessTimeout::NoWait)).unwrap();

        let contender = {
            let runtime = Arc::clone(&runtime);
            let key = key.clone();
            std::thread::spawn(move || runtime.acquire(&key, &method(AccessTimeout::Millis(100))))
        };
        let fault = contender.join().unwrap().unwrap_err();
        assert!(matches!(fault, Fault::LockDenied(_)));
        runtime.release(&key, record, false);
    }

    #[test]
    fn test_concurrent_caller_woken_by_release() {
        let (_component, runtime) = runtime();
        let runtime = Arc::new(runtime);
        let tx = RecordingTransaction::new();
        let key = PrimaryKey::from("session-1");
        runtime.create_session(key.clone(), &tx).unwrap();
        let record = runtime.acquire(&key, &method(AccessTimeout::NoWait)).unwrap();

        let contender = {
            let runtime = Arc::clone(&runtime);
            let key = key.clone();
            std::thread::spawn(move || runtime.acquire(&key, &method(AccessTimeout::Millis(2_000))))
        };
        std::thread::sleep(Duration::from_millis(50));
        runtime.release(&key, record, false);
        let record = contender.join().unwrap().unwrap();
        assert_eq!(record.state(), StatefulState::InMethod);
        runtime.release(&key, record, false);
    }

    #[test]
    fn test_remove_fires_pre_destroy_and_drops_session() {
        let (component, runtime) = runtime();
        let tx = RecordingTransaction::new();
        let key = PrimaryKey::from("session-1");
        runtime.create_session(key.clone(), &tx).unwrap();
        runtime
            .remove(&key, &method(AccessTimeout::NoWait), &tx)
            .unwrap();
        assert_eq!(component.pre_destroy_count(), 1);
        assert_eq!(runtime.session_count(), 0);
        assert!(runtime
            .acquire(&key, &method(AccessTimeout::NoWait))
            .is_err());
    }

    #[test]
    fn test_discard_after_failure_drops_session_without_callbacks() {
        let (component, runtime) = runtime();
        let tx = RecordingTransaction::new();
        let key = PrimaryKey::from("session-1");
        runtime.create_session(key.clone(), &tx).unwrap();
        let record = runtime.acquire(&key, &method(AccessTimeout::NoWait)).unwrap();
        runtime.release(&key, record, true);
        assert_eq!(component.pre_destroy_count(), 0);
        assert_eq!(runtime.session_count(), 0);
    }

    #[test]
    fn test_drain_destroys_idle_sessions() {
        let (component, runtime) = runtime();
        let tx = RecordingTransaction::new();
        runtime
            .create_session(PrimaryKey::from("a"), &tx)
            .unwrap();
        runtime
            .create_session(PrimaryKey::from("b"), &tx)
            .unwrap();
        runtime.drain(&tx);
        assert_eq!(component.pre_destroy_count(), 2);
        assert_eq!(runtime.session_count(), 0);
    }
}
