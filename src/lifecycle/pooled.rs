//! Shared driver for the pooled kinds (stateless, message-driven).
//!
//! Both kinds share one creation and release flow; they differ only in
//! their state enumeration and allowed-operation tables, supplied through
//! [`PooledLifecycle`].

use super::instance::{InstanceFactory, InstanceRecord};
use super::pool::{InstancePool, PoolTicket};
use super::states::{LifecycleState, Operation};
use super::transitions::{self, OperationTable};
use crate::faults::Fault;
use crate::identity::{ComponentIdentity, ComponentKind, ComponentName};
use crate::invocation::{CallbackContext, MethodDescriptor, TransactionControl};
use tracing::{debug, instrument, warn};

/// State-shape contract of a pooled kind: which states play the creating,
/// idle, and in-method roles, and the kind's allowed-operation table.
pub trait PooledLifecycle: LifecycleState {
    const OPERATIONS: OperationTable<Self>;

    fn creating() -> Self;
    fn pooled() -> Self;
    fn in_method() -> Self;
}

/// Driver for one installed component of a pooled kind. Instances are
/// exclusively owned between [`Self::acquire`] and [`Self::release`].
pub struct PooledRuntime<S: PooledLifecycle> {
    name: ComponentName,
    kind: ComponentKind,
    factory: InstanceFactory,
    pool: InstancePool<S>,
}

impl<S: PooledLifecycle> PooledRuntime<S> {
    pub fn new(
        name: ComponentName,
        kind: ComponentKind,
        factory: InstanceFactory,
        pool_capacity: usize,
    ) -> Self {
        Self {
            name,
            kind,
            factory,
            pool: InstancePool::new(pool_capacity),
        }
    }

    pub fn name(&self) -> &ComponentName {
        &self.name
    }

    pub fn pool(&self) -> &InstancePool<S> {
        &self.pool
    }

    /// Operations legal in `state`, for building callback contexts and
    /// guarding accessors.
    pub fn permitted(state: S) -> &'static [Operation] {
        transitions::permitted_operations(state, S::OPERATIONS)
    }

    /// Take an idle instance or create one, then move it into the in-method
    /// state. Creation failures surrender the pool slot and discard the
    /// half-built instance without callbacks.
    #[instrument(skip_all, fields(component = %self.name, method = %method.signature))]
    pub fn acquire(
        &self,
        method: &MethodDescriptor,
        tx: &dyn TransactionControl,
    ) -> Result<InstanceRecord<S>, Fault> {
        let ticket = self
            .pool
            .acquire(&method.signature, method.access_timeout)
            .map_err(Fault::from)?;
        let mut record = match ticket {
            PoolTicket::Free(record) => record,
            PoolTicket::CreateGranted => match self.create(tx) {
                Ok(record) => record,
                Err(fault) => {
                    self.pool.forget();
                    return Err(fault);
                }
            },
        };
        record.transition(S::pooled(), S::in_method())?;
        Ok(record)
    }

    fn create(&self, tx: &dyn TransactionControl) -> Result<InstanceRecord<S>, Fault> {
        let identity = ComponentIdentity::instance(self.name.clone(), self.kind, None);
        let mut record = InstanceRecord::<S>::new(identity, (self.factory)());

        let state_name = record.state().to_string();
        let ctx = CallbackContext::new(&state_name, Self::permitted(record.state()), tx);
        if let Err(error) = record.instance().inject(&ctx) {
            record.discard();
            return Err(error.into());
        }
        record.transition(S::initial(), S::creating())?;

        let state_name = record.state().to_string();
        let ctx = CallbackContext::new(&state_name, Self::permitted(record.state()), tx);
        if let Err(error) = record.instance().post_construct(&ctx) {
            record.discard();
            return Err(error.into());
        }
        record.transition(S::creating(), S::pooled())?;
        debug!(component = %self.name, "instance created");
        Ok(record)
    }

    /// Return an instance after a call. A failed call discards the instance
    /// (no callbacks) and surrenders its slot; a clean call pools it again.
    #[instrument(skip_all, fields(component = %self.name, discard = discard))]
    pub fn release(&self, mut record: InstanceRecord<S>, discard: bool) {
        if discard {
            record.discard();
            self.pool.forget();
            return;
        }
        match record.transition(S::in_method(), S::pooled()) {
            Ok(()) => self.pool.release(record),
            Err(error) => {
                warn!(component = %self.name, error = %error, "unexpected state on release; discarding");
                record.discard();
                self.pool.forget();
            }
        }
    }

    /// Destroy every idle instance gracefully. Called on uninstall;
    /// in-flight instances are discarded by their own release path.
    pub fn drain(&self, tx: &dyn TransactionControl) {
        let ctx = CallbackContext::new("PRE_DESTROY", &[Operation::LifecycleCallback], tx);
        for mut record in self.pool.drain() {
            record.destroy(&ctx);
        }
        debug!(component = %self.name, "pool drained");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::{AccessTimeout, MethodChannel, RecordingTransaction};
    use crate::lifecycle::states::StatelessState;
    use crate::lifecycle::stateless::StatelessRuntime;
    use crate::test_support::CountingComponent;
    use std::sync::Arc;

    fn runtime(capacity: usize) -> (Arc<CountingComponent>, StatelessRuntime) {
        let component = Arc::new(CountingComponent::default());
        let template = Arc::clone(&component);
        let runtime = PooledRuntime::new(
            ComponentName::new("app", "mod", "Echo"),
            ComponentKind::Stateless,
            Arc::new(move || Box::new(Arc::clone(&template))),
            capacity,
        );
        (component, runtime)
    }

    fn method() -> MethodDescriptor {
        MethodDescriptor::new("echo", MethodChannel::Local)
            .with_access_timeout(AccessTimeout::NoWait)
    }

    #[test]
    fn test_acquire_creates_and_runs_callbacks_in_order() {
        let (component, runtime) = runtime(2);
        let tx = RecordingTransaction::new();
        let record = runtime.acquire(&method(), &tx).unwrap();
        assert_eq!(component.inject_count(), 1);
        assert_eq!(component.post_construct_count(), 1);
        assert_eq!(record.state(), StatelessState::InMethod);
        runtime.release(record, false);
        assert_eq!(runtime.pool().free_count(), 1);
    }

    #[test]
    fn test_clean_release_reuses_instance() {
        let (component, runtime) = runtime(2);
        let tx = RecordingTransaction::new();
        let record = runtime.acquire(&method(), &tx).unwrap();
        runtime.release(record, false);
        let record = runtime.acquire(&method(), &tx).unwrap();
        runtime.release(record, false);
        // Second acquire reused the pooled instance.
        assert_eq!(component.post_construct_count(), 1);
    }

    #[test]
    fn test_failed_call_discards_without_callbacks() {
        let (component, runtime) = runtime(1);
        let tx = RecordingTransaction::new();
        let record = runtime.acquire(&method(), &tx).unwrap();
        runtime.release(record, true);
        assert_eq!(component.pre_destroy_count(), 0);
        assert_eq!(runtime.pool().free_count(), 0);
        // Slot surrendered, a new instance can be created.
        assert!(runtime.acquire(&method(), &tx).is_ok());
    }

    #[test]
    fn test_post_construct_failure_surrenders_slot() {
        let (component, runtime) = runtime(1);
        component.fail_post_construct();
        let tx = RecordingTransaction::new();
        let fault = runtime.acquire(&method(), &tx).unwrap_err();
        assert!(matches!(fault, Fault::Business(_)));
        assert_eq!(runtime.pool().outstanding(), 0);
        assert_eq!(component.pre_destroy_count(), 0);
    }

    #[test]
    fn test_drain_destroys_gracefully() {
        let (component, runtime) = runtime(2);
        let tx = RecordingTransaction::new();
        let record = runtime.acquire(&method(), &tx).unwrap();
        runtime.release(record, false);
        runtime.drain(&tx);
        assert_eq!(component.pre_destroy_count(), 1);
        assert_eq!(runtime.pool().free_count(), 0);
    }
}
