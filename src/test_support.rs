//! Test doubles shared by unit and integration tests.

use crate::faults::BusinessError;
use crate::invocation::{CallbackContext, InvocationContext, MethodDescriptor};
use crate::lifecycle::ManagedInstance;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Component double that counts every lifecycle callback and invocation, with
/// switches to make individual callbacks fail.
#[derive(Debug, Default)]
pub struct CountingComponent {
    inject: AtomicUsize,
    post_construct: AtomicUsize,
    pre_destroy: AtomicUsize,
    invocations: AtomicUsize,
    timeouts: AtomicUsize,
    fail_post_construct: AtomicBool,
    fail_pre_destroy: AtomicBool,
    next_invoke_error: Mutex<Option<BusinessError>>,
}

impl CountingComponent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject_count(&self) -> usize {
        self.inject.load(Ordering::SeqCst)
    }

    pub fn post_construct_count(&self) -> usize {
        self.post_construct.load(Ordering::SeqCst)
    }

    pub fn pre_destroy_count(&self) -> usize {
        self.pre_destroy.load(Ordering::SeqCst)
    }

    pub fn invoke_count(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    pub fn timeout_count(&self) -> usize {
        self.timeouts.load(Ordering::SeqCst)
    }

    pub fn fail_post_construct(&self) {
        self.fail_post_construct.store(true, Ordering::SeqCst);
    }

    pub fn fail_pre_destroy(&self) {
        self.fail_pre_destroy.store(true, Ordering::SeqCst);
    }

    /// Queue an error for the next business invocation; subsequent calls
    /// succeed again.
    pub fn fail_next_invoke(&self, error: BusinessError) {
        *self.next_invoke_error.lock() = Some(error);
    }
}

impl ManagedInstance for CountingComponent {
    fn inject(&self, _ctx: &CallbackContext<'_>) -> Result<(), BusinessError> {
        self.inject.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn post_construct(&self, _ctx: &CallbackContext<'_>) -> Result<(), BusinessError> {
        self.post_construct.fetch_add(1, Ordering::SeqCst);
        if self.fail_post_construct.load(Ordering::SeqCst) {
            Err(BusinessError::unchecked(
                "PostConstructFailure",
                "post-construct failed",
            ))
        } else {
            Ok(())
        }
    }

    fn pre_destroy(&self, _ctx: &CallbackContext<'_>) -> Result<(), BusinessError> {
        self.pre_destroy.fetch_add(1, Ordering::SeqCst);
        if self.fail_pre_destroy.load(Ordering::SeqCst) {
            Err(BusinessError::unchecked(
                "PreDestroyFailure",
                "pre-destroy failed",
            ))
        } else {
            Ok(())
        }
    }

    fn invoke(
        &self,
        method: &MethodDescriptor,
        _ctx: &mut InvocationContext,
        args: Value,
    ) -> Result<Value, BusinessError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.next_invoke_error.lock().take() {
            return Err(error);
        }
        Ok(json!({ "method": method.name, "args": args }))
    }

    fn on_timeout(&self, _method: &MethodDescriptor) -> Result<(), BusinessError> {
        self.timeouts.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.next_invoke_error.lock().take() {
            return Err(error);
        }
        Ok(())
    }
}
