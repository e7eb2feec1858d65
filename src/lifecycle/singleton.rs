//! Singleton driver: exactly one shared instance, initialized lazily on
//! first use and guarded by the locking engine under container-managed
//! concurrency.
//!
//! Resource handles opened during a singleton call are tracked on the
//! invocation context, not the shared record; concurrent READ callers each
//! release their own at post-invoke.

use super::instance::{InstanceFactory, ManagedInstance};
use super::states::{Operation, SingletonState};
use super::transitions::{self, OperationTable};
use crate::error::NotInstalledError;
use crate::faults::Fault;
use crate::identity::{ComponentIdentity, ComponentKind, ComponentName};
use crate::invocation::{CallbackContext, MethodDescriptor, TransactionControl};
use crate::locking::{AccessLock, AcquireRequest, HeldLock, TimerEnumerationGuard};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

pub const SINGLETON_OPERATIONS: OperationTable<SingletonState> = &[
    (SingletonState::PreCreate, &[Operation::LifecycleCallback]),
    (
        SingletonState::Creating,
        &[
            Operation::LifecycleCallback,
            Operation::GetCallerPrincipal,
            Operation::GetTimerService,
            Operation::GetSelfReference,
            Operation::TimerAccess,
        ],
    ),
    (
        SingletonState::MethodReady,
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
    (
        SingletonState::PreDestroy,
        &[Operation::LifecycleCallback, Operation::GetCallerPrincipal],
    ),
    (SingletonState::Destroyed, &[]),
];

struct SharedState {
    state: SingletonState,
    instance: Option<Arc<dyn ManagedInstance>>,
}

/// Driver for one installed singleton component.
pub struct SingletonRuntime {
    identity: ComponentIdentity,
    factory: InstanceFactory,
    bean_managed_concurrency: bool,
    lock: AccessLock,
    shared: Mutex<SharedState>,
}

impl SingletonRuntime {
    pub fn new(
        name: ComponentName,
        factory: InstanceFactory,
        bean_managed_concurrency: bool,
        lock_fair: bool,
        deadlock_probe_millis: u64,
        enumeration_guard: Arc<TimerEnumerationGuard>,
    ) -> Self {
        Self {
            identity: ComponentIdentity::instance(name, ComponentKind::Singleton, None),
            factory,
            bean_managed_concurrency,
            lock: AccessLock::new(lock_fair, deadlock_probe_millis, enumeration_guard),
            shared: Mutex::new(SharedState {
                state: SingletonState::PreCreate,
                instance: None,
            }),
        }
    }

    pub fn identity(&self) -> &ComponentIdentity {
        &self.identity
    }

    pub fn state(&self) -> SingletonState {
        self.shared.lock().state
    }

    pub fn enumeration_guard(&self) -> &Arc<TimerEnumerationGuard> {
        self.lock.enumeration_guard()
    }

    pub fn permitted(state: SingletonState) -> &'static [Operation] {
        transitions::permitted_operations(state, SINGLETON_OPERATIONS)
    }

    /// Run the creation flow if this is the first use. A failed creation
    /// leaves the runtime destroyed; later callers see not-found rather
    /// than a retried construction.
    fn ensure_initialized(
        &self,
        tx: &dyn TransactionControl,
    ) -> Result<Arc<dyn ManagedInstance>, Fault> {
        let mut shared = self.shared.lock();
        match shared.state {
            SingletonState::MethodReady => {
                if let Some(instance) = shared.instance.as_ref() {
                    return Ok(Arc::clone(instance));
                }
                return Err(Fault::NotFound(NotInstalledError::component(
                    self.identity.to_string(),
                )));
            }
            SingletonState::PreCreate => {}
            _ => {
                return Err(Fault::NotFound(NotInstalledError::component(
                    self.identity.to_string(),
                )));
            }
        }

        let instance: Arc<dyn ManagedInstance> = Arc::from((self.factory)());
        let state_name = shared.state.to_string();
        let ctx = CallbackContext::new(&state_name, Self::permitted(shared.state), tx);
        if let Err(error) = instance.inject(&ctx) {
            shared.state = SingletonState::Destroyed;
            return Err(error.into());
        }
        transitions::transition(&mut shared.state, SingletonState::PreCreate, SingletonState::Creating)?;

        let state_name = shared.state.to_string();
        let ctx = CallbackContext::new(&state_name, Self::permitted(shared.state), tx);
        if let Err(error) = instance.post_construct(&ctx) {
            shared.state = SingletonState::Destroyed;
            return Err(error.into());
        }
        transitions::transition(&mut shared.state, SingletonState::Creating, SingletonState::MethodReady)?;

        shared.instance = Some(Arc::clone(&instance));
        debug!(identity = %self.identity, "singleton initialized");
        Ok(instance)
    }

    /// Begin a call: initialize on first use, then acquire the instance
    /// lock per the method's lock type and timeout. Bean-managed
    /// concurrency bypasses the lock entirely.
    #[instrument(skip_all, fields(identity = %self.identity, method = %method.signature))]
    pub fn begin_call(
        &self,
        method: &MethodDescriptor,
        timer_dispatch: bool,
        tx: &dyn TransactionControl,
    ) -> Result<(Arc<dyn ManagedInstance>, HeldLock<'_>), Fault> {
        let instance = self.ensure_initialized(tx)?;
        let held = if self.bean_managed_concurrency {
            HeldLock::bypass()
        } else {
            self.lock
                .acquire(AcquireRequest {
                    lock_type: method.lock_type,
                    timeout: method.access_timeout,
                    method_signature: &method.signature,
                    timer_dispatch,
                })
                .map_err(Fault::from)?
        };
        // The instance may have been destroyed while this caller waited.
        if self.shared.lock().state != SingletonState::MethodReady {
            return Err(Fault::NotFound(NotInstalledError::component(
                self.identity.to_string(),
            )));
        }
        Ok((instance, held))
    }

    /// Graceful destruction on uninstall: waits out in-flight calls by
    /// taking the write lock, passes through PRE_DESTROY, and fires the
    /// callback. Idempotent.
    #[instrument(skip_all, fields(identity = %self.identity))]
    pub fn destroy(&self, tx: &dyn TransactionControl) {
        let _exclusive = if self.bean_managed_concurrency {
            HeldLock::bypass()
        } else {
            match self.lock.acquire(AcquireRequest {
                lock_type: crate::error::LockType::Write,
                timeout: crate::invocation::AccessTimeout::Indefinite,
                method_signature: "destroy",
                timer_dispatch: false,
            }) {
                Ok(held) => held,
                Err(error) => {
                    warn!(identity = %self.identity, error = %error, "could not acquire write lock for destroy");
                    HeldLock::bypass()
                }
            }
        };
        let mut shared = self.shared.lock();
        if shared.state != SingletonState::MethodReady {
            shared.state = SingletonState::Destroyed;
            shared.instance = None;
            return;
        }
        shared.state = SingletonState::PreDestroy;
        let instance = shared.instance.take();
        let state_name = shared.state.to_string();
        let ctx = CallbackContext::new(&state_name, Self::permitted(shared.state), tx);
        if let Some(instance) = instance {
            if let Err(error) = instance.pre_destroy(&ctx) {
                warn!(identity = %self.identity, error = %error, "pre-destroy callback failed during destroy");
            }
        }
        shared.state = SingletonState::Destroyed;
        debug!(identity = %self.identity, "singleton destroyed");
    }
}
