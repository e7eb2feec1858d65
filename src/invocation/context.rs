//! Invocation and lifecycle-callback contexts, plus the narrow collaborator
//! traits the kernel consumes (transaction control, diagnostic capture).

use super::MethodDescriptor;
use crate::error::{IllegalStateError, LockType, SystemFault};
use crate::faults::MappedFault;
use crate::identity::ComponentIdentity;
use crate::lifecycle::Operation;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Transaction collaborator: begin/mark-rollback/commit only. The manager's
/// internals are out of scope; the kernel only demarcates and votes.
pub trait TransactionControl: Send + Sync {
    fn begin(&self);
    fn commit(&self);
    fn rollback(&self);
    fn mark_rollback_only(&self);
    fn is_rollback_only(&self) -> bool;
    fn is_active(&self) -> bool;
}

/// Recording transaction double for tests and embedders without a real
/// transaction manager.
#[derive(Debug, Default)]
pub struct RecordingTransaction {
    active: AtomicBool,
    rollback_only: AtomicBool,
    begins: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

impl RecordingTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begins(&self) -> usize {
        self.begins.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }
}

impl TransactionControl for RecordingTransaction {
    fn begin(&self) {
        self.begins.fetch_add(1, Ordering::SeqCst);
        self.active.store(true, Ordering::SeqCst);
        self.rollback_only.store(false, Ordering::SeqCst);
    }

    fn commit(&self) {
        self.commits.fetch_add(1, Ordering::SeqCst);
        self.active.store(false, Ordering::SeqCst);
    }

    fn rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.active.store(false, Ordering::SeqCst);
        self.rollback_only.store(false, Ordering::SeqCst);
    }

    fn mark_rollback_only(&self) {
        if self.active.load(Ordering::SeqCst) {
            self.rollback_only.store(true, Ordering::SeqCst);
        }
    }

    fn is_rollback_only(&self) -> bool {
        self.rollback_only.load(Ordering::SeqCst)
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Diagnostic-capture collaborator: receives every system-level failure once.
pub trait DiagnosticSink: Send + Sync {
    fn capture(&self, context: &str, fault: &SystemFault);
}

/// Sink that drops everything; the default for embedders that rely on the
/// tracing output alone.
#[derive(Debug, Default)]
pub struct NoopDiagnostics;

impl DiagnosticSink for NoopDiagnostics {
    fn capture(&self, _context: &str, _fault: &SystemFault) {}
}

/// Sink that records captures for assertions.
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    captured: Mutex<Vec<(String, SystemFault)>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn captured(&self) -> Vec<(String, SystemFault)> {
        self.captured.lock().clone()
    }

    pub fn capture_count(&self) -> usize {
        self.captured.lock().len()
    }
}

impl DiagnosticSink for RecordingDiagnostics {
    fn capture(&self, context: &str, fault: &SystemFault) {
        self.captured.lock().push((context.to_string(), fault.clone()));
    }
}

/// A resource handle (connection or similar) opened during a call. Tracked
/// per instance for single-owner kinds and per invocation for the shared
/// singleton kind, where concurrent callers cannot share one handle list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceHandle {
    pub id: Uuid,
    pub description: String,
}

impl ResourceHandle {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
        }
    }
}

/// Context handed to lifecycle callbacks (injection, post-construct,
/// pre-destroy). Accessors are guarded by the owning kind's
/// allowed-operation table for the lifecycle phase the callback runs in.
pub struct CallbackContext<'a> {
    state_name: &'a str,
    permitted: &'a [Operation],
    tx: &'a dyn TransactionControl,
    caller_principal: Option<&'a str>,
}

impl<'a> CallbackContext<'a> {
    pub fn new(
        state_name: &'a str,
        permitted: &'a [Operation],
        tx: &'a dyn TransactionControl,
    ) -> Self {
        Self {
            state_name,
            permitted,
            tx,
            caller_principal: None,
        }
    }

    pub fn with_caller_principal(mut self, principal: &'a str) -> Self {
        self.caller_principal = Some(principal);
        self
    }

    fn check(&self, operation: Operation) -> Result<(), IllegalStateError> {
        if self.permitted.contains(&operation) {
            Ok(())
        } else {
            Err(IllegalStateError::Operation {
                current: self.state_name.to_string(),
                operation: operation.to_string(),
            })
        }
    }

    pub fn caller_principal(&self) -> Result<Option<&str>, IllegalStateError> {
        self.check(Operation::GetCallerPrincipal)?;
        Ok(self.caller_principal)
    }

    pub fn timer_access(&self) -> Result<(), IllegalStateError> {
        self.check(Operation::TimerAccess)
    }

    pub fn self_reference(&self) -> Result<(), IllegalStateError> {
        self.check(Operation::GetSelfReference)
    }

    pub fn rollback_only(&self) -> Result<bool, IllegalStateError> {
        self.check(Operation::GetRollbackOnly)?;
        Ok(self.tx.is_rollback_only())
    }

    pub fn set_rollback_only(&self) -> Result<(), IllegalStateError> {
        self.check(Operation::SetRollbackOnly)?;
        self.tx.mark_rollback_only();
        Ok(())
    }
}

/// Per-call record threading through every collaborator during a single
/// invocation. Lifetime strictly bounded by one pre-invoke/post-invoke
/// pair; the kernel never parks a context in thread-local storage.
pub struct InvocationContext {
    identity: ComponentIdentity,
    method: MethodDescriptor,
    tx: Arc<dyn TransactionControl>,
    started: Instant,
    tx_begun_here: bool,
    lock_acquired: Option<LockType>,
    mapped: Option<MappedFault>,
    handles: Vec<ResourceHandle>,
    caller_principal: Option<String>,
}

impl InvocationContext {
    pub fn new(
        identity: ComponentIdentity,
        method: MethodDescriptor,
        tx: Arc<dyn TransactionControl>,
    ) -> Self {
        Self {
            identity,
            method,
            tx,
            started: Instant::now(),
            tx_begun_here: false,
            lock_acquired: None,
            mapped: None,
            handles: Vec::new(),
            caller_principal: None,
        }
    }

    pub fn identity(&self) -> &ComponentIdentity {
        &self.identity
    }

    pub fn method(&self) -> &MethodDescriptor {
        &self.method
    }

    pub fn transaction(&self) -> &dyn TransactionControl {
        self.tx.as_ref()
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.started.elapsed()
    }

    /// Recorded when the dispatcher begins a transaction on behalf of this
    /// method; drives both commit-on-success and the remote nested-cause
    /// wrapping rule.
    pub fn mark_tx_begun_here(&mut self) {
        self.tx_begun_here = true;
    }

    pub fn tx_begun_here(&self) -> bool {
        self.tx_begun_here
    }

    pub fn tx_active(&self) -> bool {
        self.tx.is_active()
    }

    /// Record which lock this invocation actually acquired. Release is
    /// driven by this record, never inferred from the descriptor.
    pub fn mark_lock_acquired(&mut self, lock_type: LockType) {
        self.lock_acquired = Some(lock_type);
    }

    pub fn lock_acquired(&self) -> Option<LockType> {
        self.lock_acquired
    }

    /// The previously mapped exception for this invocation, if mapping has
    /// already run. Mapping is idempotent per context.
    pub fn mapped_fault(&self) -> Option<&MappedFault> {
        self.mapped.as_ref()
    }

    pub fn record_mapped_fault(&mut self, fault: MappedFault) {
        if self.mapped.is_none() {
            self.mapped = Some(fault);
        }
    }

    pub fn open_handle(&mut self, handle: ResourceHandle) {
        self.handles.push(handle);
    }

    /// Drain the per-invocation handle list (shared-instance kinds release
    /// at post-invoke rather than at instance destruction).
    pub fn release_handles(&mut self) -> Vec<ResourceHandle> {
        std::mem::take(&mut self.handles)
    }

    pub fn set_caller_principal(&mut self, principal: impl Into<String>) {
        self.caller_principal = Some(principal.into());
    }

    pub fn caller_principal(&self) -> Option<&str> {
        self.caller_principal.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{ComponentKind, ComponentName};
    use crate::invocation::MethodChannel;

    fn context() -> InvocationContext {
        let identity = ComponentIdentity::instance(
            ComponentName::new("app", "mod", "Comp"),
            ComponentKind::Stateless,
            None,
        );
        InvocationContext::new(
            identity,
            MethodDescriptor::new("ping", MethodChannel::Local),
            Arc::new(RecordingTransaction::new()),
        )
    }

    #[test]
    fn test_mapped_fault_is_recorded_once() {
        use crate::faults::{FaultKind, VisibleException};
        let mut ctx = context();
        assert!(ctx.mapped_fault().is_none());
        ctx.record_mapped_fault(MappedFault {
            kind: FaultKind::System,
            rollback_marked: true,
            logged: true,
            visible: VisibleException::local_general("first", "first"),
        });
        ctx.record_mapped_fault(MappedFault {
            kind: FaultKind::Application,
            rollback_marked: false,
            logged: false,
            visible: VisibleException::local_general("second", "second"),
        });
        assert_eq!(ctx.mapped_fault().unwrap().kind, FaultKind::System);
    }

    #[test]
    fn test_callback_context_guards_accessors() {
        let tx = RecordingTransaction::new();
        let creating = CallbackContext::new(
            "CREATING",
            &[
                Operation::LifecycleCallback,
                Operation::GetCallerPrincipal,
                Operation::GetSelfReference,
                Operation::TimerAccess,
            ],
            &tx,
        );
        assert!(creating.caller_principal().is_ok());
        assert!(creating.set_rollback_only().is_err());
        assert!(creating.rollback_only().is_err());

        let pre_create = CallbackContext::new("PRE_CREATE", &[Operation::LifecycleCallback], &tx);
        assert!(pre_create.caller_principal().is_err());
        assert!(pre_create.timer_access().is_err());
        assert!(pre_create.self_reference().is_err());
    }

    #[test]
    fn test_handle_list_drains() {
        let mut ctx = context();
        ctx.open_handle(ResourceHandle::new("jdbc:conn-1"));
        ctx.open_handle(ResourceHandle::new("jdbc:conn-2"));
        assert_eq!(ctx.release_handles().len(), 2);
        assert!(ctx.release_handles().is_empty());
    }
}
