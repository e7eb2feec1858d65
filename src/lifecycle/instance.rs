//! The managed-instance contract and per-instance record.

use super::states::{LifecycleState, Operation};
use super::transitions::{self, OperationTable};
use crate::error::IllegalStateError;
use crate::faults::BusinessError;
use crate::identity::ComponentIdentity;
use crate::invocation::{CallbackContext, InvocationContext, MethodDescriptor, ResourceHandle};
use serde_json::Value;
use tracing::{debug, warn};

/// Produces fresh component instances; supplied at install time and shared
/// by the owning driver.
pub type InstanceFactory = std::sync::Arc<dyn Fn() -> Box<dyn ManagedInstance> + Send + Sync>;

/// Contract a component implementation presents to the kernel. Lifecycle
/// callbacks default to no-ops; only the business dispatch is mandatory.
///
/// Methods take `&self`: the singleton kind shares one live instance across
/// concurrent callers, so implementations own their interior mutability and
/// the kernel owns the lock discipline.
pub trait ManagedInstance: Send + Sync {
    /// Dependency-resolution callback, run in PRE_CREATE.
    fn inject(&self, _ctx: &CallbackContext<'_>) -> Result<(), BusinessError> {
        Ok(())
    }

    /// Post-construct callback, run in CREATING.
    fn post_construct(&self, _ctx: &CallbackContext<'_>) -> Result<(), BusinessError> {
        Ok(())
    }

    /// Pre-destroy callback, run only on graceful destruction.
    fn pre_destroy(&self, _ctx: &CallbackContext<'_>) -> Result<(), BusinessError> {
        Ok(())
    }

    /// Business-method dispatch.
    fn invoke(
        &self,
        method: &MethodDescriptor,
        ctx: &mut InvocationContext,
        args: Value,
    ) -> Result<Value, BusinessError>;

    /// Timeout callback for persistent timers.
    fn on_timeout(&self, method: &MethodDescriptor) -> Result<(), BusinessError> {
        Err(BusinessError::unchecked(
            "MissingTimeoutMethod",
            format!("component declares no timeout method for {}", method.name),
        ))
    }
}

impl std::fmt::Debug for dyn ManagedInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn ManagedInstance")
    }
}

/// Shared handles to a component double as instances; lets tests observe a
/// component the kernel owns.
impl<T: ManagedInstance + ?Sized> ManagedInstance for std::sync::Arc<T> {
    fn inject(&self, ctx: &CallbackContext<'_>) -> Result<(), BusinessError> {
        (**self).inject(ctx)
    }

    fn post_construct(&self, ctx: &CallbackContext<'_>) -> Result<(), BusinessError> {
        (**self).post_construct(ctx)
    }

    fn pre_destroy(&self, ctx: &CallbackContext<'_>) -> Result<(), BusinessError> {
        (**self).pre_destroy(ctx)
    }

    fn invoke(
        &self,
        method: &MethodDescriptor,
        ctx: &mut InvocationContext,
        args: Value,
    ) -> Result<Value, BusinessError> {
        (**self).invoke(method, ctx, args)
    }

    fn on_timeout(&self, method: &MethodDescriptor) -> Result<(), BusinessError> {
        (**self).on_timeout(method)
    }
}

/// Mutable pairing of a live instance with its lifecycle state and scoped
/// resource bookkeeping. Exclusively owned by one caller between pool
/// acquisition and return (the shared singleton kind uses its own record
/// shape; see the singleton driver).
pub struct InstanceRecord<S: LifecycleState> {
    identity: ComponentIdentity,
    instance: Box<dyn ManagedInstance>,
    state: S,
    handles: Vec<ResourceHandle>,
    pre_destroy_fired: bool,
}

impl<S: LifecycleState> InstanceRecord<S> {
    pub fn new(identity: ComponentIdentity, instance: Box<dyn ManagedInstance>) -> Self {
        Self {
            identity,
            instance,
            state: S::initial(),
            handles: Vec::new(),
            pre_destroy_fired: false,
        }
    }

    pub fn identity(&self) -> &ComponentIdentity {
        &self.identity
    }

    pub fn state(&self) -> S {
        self.state
    }

    pub fn instance(&self) -> &dyn ManagedInstance {
        self.instance.as_ref()
    }

    pub fn guard(&self, operation: Operation, table: OperationTable<S>) -> Result<(), IllegalStateError> {
        transitions::guard_operation(self.state, operation, table)
    }

    pub fn transition(&mut self, from: S, to: S) -> Result<(), IllegalStateError> {
        transitions::transition(&mut self.state, from, to)
    }

    /// Handles opened during the current scope; released on destruction for
    /// single-owner kinds.
    pub fn open_handle(&mut self, handle: ResourceHandle) {
        self.handles.push(handle);
    }

    pub fn open_handle_count(&self) -> usize {
        self.handles.len()
    }

    fn release_handles(&mut self) {
        for handle in self.handles.drain(..) {
            debug!(identity = %self.identity, handle = %handle.description, "releasing resource handle");
        }
    }

    /// Graceful destruction: fires the pre-destroy callback exactly once,
    /// releases scoped resources even if the callback misbehaves, and ends
    /// in the terminal state. A second call is a silent no-op. Returns true
    /// on the call that performed the destruction.
    pub fn destroy(&mut self, ctx: &CallbackContext<'_>) -> bool {
        if self.state.is_destroyed() {
            return false;
        }
        if !self.pre_destroy_fired {
            self.pre_destroy_fired = true;
            if let Err(error) = self.instance.pre_destroy(ctx) {
                // Resource release must still complete; the callback failure
                // is reported but cannot block destruction.
                warn!(identity = %self.identity, error = %error, "pre-destroy callback failed during destroy");
            }
        }
        self.release_handles();
        transitions::transition_to_destroyed(&mut self.state)
    }

    /// Abrupt destruction after an error. Never invokes pre-destroy
    /// callbacks: the component contract guarantees callbacks only on
    /// graceful removal. Resources are still released and the record always
    /// reaches the terminal state. Idempotent.
    pub fn discard(&mut self) -> bool {
        if self.state.is_destroyed() {
            return false;
        }
        self.release_handles();
        let destroyed = transitions::transition_to_destroyed(&mut self.state);
        if destroyed {
            debug!(identity = %self.identity, "instance discarded");
        }
        destroyed
    }
}

impl<S: LifecycleState> std::fmt::Debug for InstanceRecord<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceRecord")
            .field("identity", &self.identity)
            .field("state", &self.state)
            .field("handles", &self.handles.len())
            .finish_non_exhaustive()
    }
}
