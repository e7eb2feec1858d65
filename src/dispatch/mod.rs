//! # Invoke-With-Mapping Dispatch
//!
//! The kernel facade: installs components, routes business calls through
//! the kind drivers with transaction demarcation and exception mapping, and
//! hosts the timer hooks the external scheduler drives. Callers see exactly
//! one mapped exception per invocation.

use crate::config::KernelConfig;
use crate::error::SystemFault;
use crate::faults::{Fault, MappedFault, MappingStrategy};
use crate::identity::{self, ComponentIdentity, ComponentKind, ComponentName, PrimaryKey};
use crate::invocation::{
    AccessTimeout, DiagnosticSink, InvocationContext, MethodChannel, MethodDescriptor,
    NoopDiagnostics, TransactionAttribute, TransactionControl,
};
use crate::lifecycle::{MessageDrivenRuntime, SingletonRuntime, StatefulRuntime, StatelessRuntime};
use crate::locking::TimerEnumerationGuard;
use crate::registry::{ComponentDescriptor, ComponentRegistry};
use crate::timers::{
    InMemoryTimerStore, PersistentTimerTask, StoredTimer, TimeoutDispatcher, TimerOutcome,
    TimerRunner, TimerStore, TimerTrigger,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

enum ComponentRuntime {
    Stateless(StatelessRuntime),
    Stateful(StatefulRuntime),
    Singleton(SingletonRuntime),
    MessageDriven(MessageDrivenRuntime),
}

/// The kernel: one per embedding runtime.
pub struct Kernel {
    config: KernelConfig,
    registry: Arc<ComponentRegistry>,
    runtimes: DashMap<ComponentName, Arc<ComponentRuntime>>,
    tx: Arc<dyn TransactionControl>,
    diagnostics: Arc<dyn DiagnosticSink>,
    timer_store: Arc<dyn TimerStore>,
    enumeration_guard: Arc<TimerEnumerationGuard>,
    shutting_down: AtomicBool,
}

impl Kernel {
    pub fn new(config: KernelConfig, tx: Arc<dyn TransactionControl>) -> Self {
        Self::with_collaborators(
            config,
            tx,
            Arc::new(NoopDiagnostics),
            Arc::new(InMemoryTimerStore::new()),
        )
    }

    pub fn with_collaborators(
        config: KernelConfig,
        tx: Arc<dyn TransactionControl>,
        diagnostics: Arc<dyn DiagnosticSink>,
        timer_store: Arc<dyn TimerStore>,
    ) -> Self {
        let shutting_down = AtomicBool::new(config.shutting_down);
        Self {
            config,
            registry: Arc::new(ComponentRegistry::new()),
            runtimes: DashMap::new(),
            tx,
            diagnostics,
            timer_store,
            enumeration_guard: Arc::new(TimerEnumerationGuard::new()),
            shutting_down,
        }
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Begin draining: timer expirations fail fast from here on.
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        info!("kernel shutdown begun");
    }

    // ------------------------------------------------------------------
    // install / uninstall

    /// Install a component and build its kind driver.
    pub fn install(&self, descriptor: ComponentDescriptor) -> crate::error::Result<()> {
        let runtime = match descriptor.kind {
            ComponentKind::Stateless => ComponentRuntime::Stateless(StatelessRuntime::new(
                descriptor.name.clone(),
                ComponentKind::Stateless,
                Arc::clone(&descriptor.factory),
                descriptor
                    .pool_capacity
                    .unwrap_or(self.config.default_pool_capacity),
            )),
            ComponentKind::MessageDriven => {
                ComponentRuntime::MessageDriven(MessageDrivenRuntime::new(
                    descriptor.name.clone(),
                    ComponentKind::MessageDriven,
                    Arc::clone(&descriptor.factory),
                    descriptor
                        .pool_capacity
                        .unwrap_or(self.config.default_pool_capacity),
                ))
            }
            ComponentKind::Stateful => ComponentRuntime::Stateful(StatefulRuntime::new(
                descriptor.name.clone(),
                Arc::clone(&descriptor.factory),
            )),
            ComponentKind::Singleton => ComponentRuntime::Singleton(SingletonRuntime::new(
                descriptor.name.clone(),
                Arc::clone(&descriptor.factory),
                descriptor.bean_managed_concurrency(),
                descriptor.lock_fair,
                self.config.deadlock_probe_millis,
                Arc::clone(&self.enumeration_guard),
            )),
            ComponentKind::Entity => {
                return Err(SystemFault::new(format!(
                    "entity component {} is not managed by this kernel",
                    descriptor.name
                ))
                .into());
            }
        };
        let name = descriptor.name.clone();
        self.registry.install(descriptor);
        self.runtimes.insert(name, Arc::new(runtime));
        Ok(())
    }

    /// Uninstall a component: idle instances are destroyed gracefully,
    /// in-flight ones are discarded by their own release paths. Persisted
    /// timers stay stored; their next expiration fails terminally.
    pub fn uninstall(&self, name: &ComponentName) {
        if let Some((_, runtime)) = self.runtimes.remove(name) {
            match runtime.as_ref() {
                ComponentRuntime::Stateless(r) => r.drain(self.tx.as_ref()),
                ComponentRuntime::MessageDriven(r) => r.drain(self.tx.as_ref()),
                ComponentRuntime::Stateful(r) => r.drain(self.tx.as_ref()),
                ComponentRuntime::Singleton(r) => r.destroy(self.tx.as_ref()),
            }
        }
        self.registry.uninstall(name);
    }

    fn runtime(&self, name: &ComponentName) -> Option<Arc<ComponentRuntime>> {
        self.runtimes.get(name).map(|e| Arc::clone(e.value()))
    }

    // ------------------------------------------------------------------
    // identity codec surface

    pub fn encode_identity(&self, identity: &ComponentIdentity) -> Vec<u8> {
        identity::encode(identity, self.config.platform)
    }

    pub fn decode_identity(&self, bytes: &[u8]) -> crate::error::Result<ComponentIdentity> {
        identity::decode(bytes, self.registry.as_ref())
    }

    // ------------------------------------------------------------------
    // invocation

    /// Descriptor with the kernel-wide default access timeout applied when
    /// the method declares none.
    fn effective(&self, method: &MethodDescriptor) -> MethodDescriptor {
        let mut method = method.clone();
        if method.access_timeout == AccessTimeout::Indefinite
            && self.config.default_access_timeout_millis >= 0
        {
            method.access_timeout =
                AccessTimeout::from_millis(self.config.default_access_timeout_millis);
        }
        method
    }

    fn strategy<'a>(&'a self, channel: MethodChannel, descriptor: Option<&'a ComponentDescriptor>) -> MappingStrategy<'a> {
        MappingStrategy::new(
            channel,
            descriptor.map_or(false, |d| d.module_versioned),
            descriptor.map_or(&[], |d| d.app_exceptions.as_slice()),
            self.config.nest_remote_causes,
            self.config.nest_remote_causes_always,
            self.diagnostics.as_ref(),
        )
    }

    /// Demarcate per the method's transaction attribute. Returns a fault
    /// for attribute violations; records begun-here on the context.
    fn begin_tx(
        &self,
        descriptor: &ComponentDescriptor,
        method: &MethodDescriptor,
        ctx: &mut InvocationContext,
    ) -> Result<(), Fault> {
        if descriptor.bean_managed_tx() {
            return Ok(());
        }
        match method.tx_attribute {
            TransactionAttribute::Mandatory if !self.tx.is_active() => Err(Fault::System(
                SystemFault::new(format!("{} requires an active transaction", method.signature)),
            )),
            TransactionAttribute::Never if self.tx.is_active() => Err(Fault::System(
                SystemFault::new(format!("{} must not run in a transaction", method.signature)),
            )),
            attribute if attribute.begins_transaction() && !self.tx.is_active() => {
                self.tx.begin();
                ctx.mark_tx_begun_here();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Complete a transaction this invocation began. A clean return commits
    /// unless rollback was voted; a mapped failure honors the mapping
    /// decision.
    fn complete_tx(&self, ctx: &InvocationContext, rollback: bool) {
        if !ctx.tx_begun_here() {
            return;
        }
        if rollback || self.tx.is_rollback_only() {
            self.tx.rollback();
        } else {
            self.tx.commit();
        }
    }

    /// Invoke `method_name` on the named component. Exactly one mapped
    /// exception per invocation; the visible failure points at the root
    /// cause.
    #[instrument(skip_all, fields(component = %name, method = method_name))]
    pub fn invoke(
        &self,
        name: &ComponentName,
        key: Option<&PrimaryKey>,
        method_name: &str,
        args: Value,
    ) -> Result<Value, MappedFault> {
        let Some(descriptor) = self.registry.get(name) else {
            return Err(self.map_unresolved(name, method_name));
        };
        let Some(method) = descriptor.method(method_name) else {
            let mut ctx = self.context_for(&descriptor, name, key, method_name);
            let fault = Fault::NotFound(crate::error::NotInstalledError::method(
                name.to_string(),
                method_name,
            ));
            return Err(self.strategy(MethodChannel::Local, Some(&descriptor)).map(&mut ctx, fault));
        };
        let method = self.effective(method);
        let identity = identity_for(name, descriptor.kind, key);
        let mut ctx = InvocationContext::new(identity, method.clone(), Arc::clone(&self.tx));

        if let Err(fault) = self.begin_tx(&descriptor, &method, &mut ctx) {
            let mapped = self.strategy(method.channel, Some(&descriptor)).map(&mut ctx, fault);
            self.complete_tx(&ctx, mapped.rollback_marked);
            return Err(mapped);
        }

        let result = self.dispatch(&descriptor, &method, key, &mut ctx, args);
        match result {
            Ok(value) => {
                for handle in ctx.release_handles() {
                    debug!(handle = %handle.description, "releasing invocation-scoped handle");
                }
                self.complete_tx(&ctx, false);
                Ok(value)
            }
            Err(fault) => {
                let mapped = self.strategy(method.channel, Some(&descriptor)).map(&mut ctx, fault);
                for handle in ctx.release_handles() {
                    debug!(handle = %handle.description, "releasing invocation-scoped handle");
                }
                self.complete_tx(&ctx, mapped.rollback_marked);
                Err(mapped)
            }
        }
    }

    fn context_for(
        &self,
        descriptor: &ComponentDescriptor,
        name: &ComponentName,
        key: Option<&PrimaryKey>,
        method_name: &str,
    ) -> InvocationContext {
        InvocationContext::new(
            identity_for(name, descriptor.kind, key),
            MethodDescriptor::new(method_name, MethodChannel::Local),
            Arc::clone(&self.tx),
        )
    }

    fn map_unresolved(&self, name: &ComponentName, method_name: &str) -> MappedFault {
        // No registration to consult; the synthesized context only carries
        // enough to name the failure.
        let mut ctx = InvocationContext::new(
            ComponentIdentity::instance(name.clone(), ComponentKind::Stateless, None),
            MethodDescriptor::new(method_name, MethodChannel::Local),
            Arc::clone(&self.tx),
        );
        self.strategy(MethodChannel::Local, None).map(
            &mut ctx,
            Fault::NotFound(crate::error::NotInstalledError::component(name.to_string())),
        )
    }

    /// Route through the kind driver: acquire, business call, release. A
    /// system-level failure discards the instance; application failures
    /// release it intact.
    fn dispatch(
        &self,
        descriptor: &ComponentDescriptor,
        method: &MethodDescriptor,
        key: Option<&PrimaryKey>,
        ctx: &mut InvocationContext,
        args: Value,
    ) -> Result<Value, Fault> {
        let runtime = self.runtime(&descriptor.name).ok_or_else(|| {
            Fault::NotFound(crate::error::NotInstalledError::component(
                descriptor.name.to_string(),
            ))
        })?;
        match runtime.as_ref() {
            ComponentRuntime::Stateless(r) => {
                let record = r.acquire(method, self.tx.as_ref())?;
                let result = record.instance().invoke(method, ctx, args);
                r.release(record, discards(&result, descriptor));
                result.map_err(Fault::from)
            }
            ComponentRuntime::MessageDriven(r) => {
                let record = r.acquire(method, self.tx.as_ref())?;
                let result = record.instance().invoke(method, ctx, args);
                r.release(record, discards(&result, descriptor));
                result.map_err(Fault::from)
            }
            ComponentRuntime::Stateful(r) => {
                let key = key.ok_or_else(|| {
                    Fault::System(SystemFault::new(format!(
                        "stateful component {} requires a session key",
                        descriptor.name
                    )))
                })?;
                let record = r.acquire(key, method)?;
                let result = record.instance().invoke(method, ctx, args);
                r.release(key, record, discards(&result, descriptor));
                result.map_err(Fault::from)
            }
            ComponentRuntime::Singleton(r) => {
                let (instance, held) = r.begin_call(method, false, self.tx.as_ref())?;
                if let Some(lock_type) = held.acquired() {
                    ctx.mark_lock_acquired(lock_type);
                }
                let result = instance.invoke(method, ctx, args);
                drop(held);
                // Shared instances survive system failures; only the call's
                // own resources are torn down (by the caller via the
                // context's handle list).
                result.map_err(Fault::from)
            }
        }
    }

    // ------------------------------------------------------------------
    // stateful session surface

    #[instrument(skip_all, fields(component = %name, key = %key))]
    pub fn create_session(&self, name: &ComponentName, key: PrimaryKey) -> Result<(), MappedFault> {
        let result = match self.runtime(name).as_deref() {
            Some(ComponentRuntime::Stateful(r)) => r.create_session(key, self.tx.as_ref()),
            _ => Err(Fault::NotFound(crate::error::NotInstalledError::component(
                name.to_string(),
            ))),
        };
        result.map_err(|fault| {
            let descriptor = self.registry.get(name);
            let mut ctx = InvocationContext::new(
                ComponentIdentity::instance(name.clone(), ComponentKind::Stateful, None),
                MethodDescriptor::new("create", MethodChannel::Local),
                Arc::clone(&self.tx),
            );
            self.strategy(MethodChannel::Local, descriptor.as_deref()).map(&mut ctx, fault)
        })
    }

    #[instrument(skip_all, fields(component = %name, key = %key))]
    pub fn remove_session(&self, name: &ComponentName, key: &PrimaryKey) -> Result<(), MappedFault> {
        let method = MethodDescriptor::new("remove", MethodChannel::Local);
        let result = match self.runtime(name).as_deref() {
            Some(ComponentRuntime::Stateful(r)) => r.remove(key, &self.effective(&method), self.tx.as_ref()),
            _ => Err(Fault::NotFound(crate::error::NotInstalledError::component(
                name.to_string(),
            ))),
        };
        result.map_err(|fault| {
            let descriptor = self.registry.get(name);
            let mut ctx = InvocationContext::new(
                identity_for(name, ComponentKind::Stateful, Some(key)),
                method,
                Arc::clone(&self.tx),
            );
            self.strategy(MethodChannel::Local, descriptor.as_deref()).map(&mut ctx, fault)
        })
    }

    // ------------------------------------------------------------------
    // timer surface

    /// Persist a timer after validating its owner is installed and, for
    /// automatic timers, that the method binding matches the deployment.
    pub fn create_timer(&self, task: PersistentTimerTask) -> crate::error::Result<Uuid> {
        if let TimerTrigger::Interval {
            interval_millis: Some(interval),
            ..
        } = &task.trigger
        {
            if *interval <= 0 {
                return Err(crate::error::FormatError::Malformed(format!(
                    "timer repeat interval must be positive: {interval}ms"
                ))
                .into());
            }
        }
        let descriptor = self.registry.get(task.owner.name()).ok_or_else(|| {
            crate::error::NotInstalledError::component(task.owner.name().to_string())
        })?;
        if let Some(auto) = &task.auto_method {
            let declared = descriptor.timer_method(auto.method_id).ok_or_else(|| {
                crate::error::NotInstalledError::method(
                    task.owner.name().to_string(),
                    auto.method_name.clone(),
                )
            })?;
            if declared.method_name != auto.method_name
                || declared.declaring_class != auto.declaring_class
            {
                return Err(crate::error::NotInstalledError::method(
                    task.owner.name().to_string(),
                    auto.method_name.clone(),
                )
                .into());
            }
        } else if !descriptor.supports_timers() {
            return Err(crate::error::NotInstalledError::component(format!(
                "{} declares no timeout methods",
                task.owner.name()
            ))
            .into());
        }
        let id = self.timer_store.create(task);
        debug!(timer = %id, "timer created");
        Ok(id)
    }

    pub fn cancel_timer(&self, id: Uuid) -> bool {
        let removed = self.timer_store.remove(id);
        if removed {
            debug!(timer = %id, "timer canceled");
        }
        removed
    }

    /// Enumerate a component's timers. The enumeration guard is held for
    /// the duration so timer callbacks waiting on an instance lock can
    /// detect the dual-resource deadlock and abandon their wait.
    pub fn timers_for(&self, name: &ComponentName) -> Vec<StoredTimer> {
        let _token = self.enumeration_guard.enter();
        self.timer_store.timers_for(name)
    }

    /// Drive one timer expiration. Retry policy belongs to the caller.
    pub fn run_timer(&self, id: Uuid, now: DateTime<Utc>) -> TimerOutcome {
        TimerRunner::new(&self.registry, self.timer_store.as_ref(), self).run(id, now)
    }
}

impl TimeoutDispatcher for Kernel {
    fn dispatch_timeout(
        &self,
        task: &PersistentTimerTask,
        method_name: &str,
        lock_row: &mut dyn FnMut() -> Result<(), Fault>,
    ) -> Result<(), Fault> {
        let name = task.owner.name();
        let descriptor = self.registry.get(name).ok_or_else(|| {
            Fault::NotFound(crate::error::NotInstalledError::component(name.to_string()))
        })?;
        let method = descriptor
            .method(method_name)
            .cloned()
            .unwrap_or_else(|| MethodDescriptor::new(method_name, MethodChannel::Timer));
        let method = self.effective(&method);
        let runtime = self.runtime(name).ok_or_else(|| {
            Fault::NotFound(crate::error::NotInstalledError::component(name.to_string()))
        })?;

        match runtime.as_ref() {
            ComponentRuntime::Singleton(r) => {
                // Instance lock first, store row lock second.
                let (instance, held) = r.begin_call(&method, true, self.tx.as_ref())?;
                lock_row()?;
                let result = instance.on_timeout(&method);
                drop(held);
                result.map_err(Fault::from)
            }
            ComponentRuntime::Stateless(r) => {
                let record = r.acquire(&method, self.tx.as_ref())?;
                if let Err(fault) = lock_row() {
                    r.release(record, false);
                    return Err(fault);
                }
                let result = record.instance().on_timeout(&method);
                let failed = result.is_err();
                r.release(record, failed);
                result.map_err(Fault::from)
            }
            ComponentRuntime::MessageDriven(r) => {
                let record = r.acquire(&method, self.tx.as_ref())?;
                if let Err(fault) = lock_row() {
                    r.release(record, false);
                    return Err(fault);
                }
                let result = record.instance().on_timeout(&method);
                let failed = result.is_err();
                r.release(record, failed);
                result.map_err(Fault::from)
            }
            ComponentRuntime::Stateful(_) => Err(Fault::System(SystemFault::new(format!(
                "stateful component {name} cannot own timers"
            )))),
        }
    }

    fn shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }
}

/// Keyless kinds never carry the caller-supplied key on their identity.
fn identity_for(
    name: &ComponentName,
    kind: ComponentKind,
    key: Option<&PrimaryKey>,
) -> ComponentIdentity {
    let key = if kind.is_keyless() { None } else { key.cloned() };
    ComponentIdentity::instance(name.clone(), kind, key)
}

fn discards(
    result: &Result<Value, crate::faults::BusinessError>,
    descriptor: &ComponentDescriptor,
) -> bool {
    match result {
        Ok(_) => false,
        Err(error) => {
            // Registered application exceptions and declared failures leave
            // the instance intact; everything else discards it.
            let registered = descriptor.module_versioned
                && descriptor
                    .app_exceptions
                    .iter()
                    .any(|rule| rule.error_type == error.error_type);
            if registered || !error.unchecked {
                false
            } else {
                warn!(error = %error, "discarding instance after system-level failure");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faults::{AppExceptionRule, BusinessError, FaultKind, VisibleException};
    use crate::invocation::RecordingTransaction;
    use crate::lifecycle::ManagedInstance;
    use crate::timers::AutoTimerMethod;
    use serde_json::json;

    fn name(component: &str) -> ComponentName {
        ComponentName::new("app", "mod", component)
    }

    fn shared_factory() -> (Arc<crate::test_support::CountingComponent>, crate::lifecycle::InstanceFactory) {
        let component = Arc::new(crate::test_support::CountingComponent::new());
        let held = Arc::clone(&component);
        let factory: crate::lifecycle::InstanceFactory =
            Arc::new(move || Box::new(Arc::clone(&held)) as Box<dyn ManagedInstance>);
        (component, factory)
    }

    fn kernel() -> (Kernel, Arc<RecordingTransaction>) {
        let tx = Arc::new(RecordingTransaction::new());
        let kernel = Kernel::new(KernelConfig::default(), Arc::clone(&tx) as Arc<dyn TransactionControl>);
        (kernel, tx)
    }

    fn echo_method() -> MethodDescriptor {
        MethodDescriptor::new("echo", MethodChannel::Local)
    }

    #[test]
    fn test_invoke_commits_container_started_transaction() {
        let (kernel, tx) = kernel();
        let (component, factory) = shared_factory();
        kernel
            .install(
                ComponentDescriptor::new(name("Echo"), ComponentKind::Stateless, factory)
                    .with_method(echo_method()),
            )
            .unwrap();

        let value = kernel
            .invoke(&name("Echo"), None, "echo", json!({"n": 1}))
            .unwrap();
        assert_eq!(value["method"], "echo");
        assert_eq!(component.invoke_count(), 1);
        assert_eq!(tx.begins(), 1);
        assert_eq!(tx.commits(), 1);
        assert_eq!(tx.rollbacks(), 0);
    }

    #[test]
    fn test_unknown_component_maps_to_no_such_instance() {
        let (kernel, tx) = kernel();
        let mapped = kernel
            .invoke(&name("Gone"), None, "echo", Value::Null)
            .unwrap_err();
        assert_eq!(mapped.kind, FaultKind::Application);
        assert!(!mapped.rollback_marked);
        assert!(matches!(
            mapped.visible,
            VisibleException::NoSuchInstance { remote: false, .. }
        ));
        assert_eq!(tx.begins(), 0);
    }

    #[test]
    fn test_unchecked_failure_rolls_back_and_discards_instance() {
        let (kernel, tx) = kernel();
        let (component, factory) = shared_factory();
        kernel
            .install(
                ComponentDescriptor::new(name("Echo"), ComponentKind::Stateless, factory)
                    .with_method(echo_method()),
            )
            .unwrap();

        component.fail_next_invoke(BusinessError::unchecked("Npe", "boom"));
        let mapped = kernel
            .invoke(&name("Echo"), None, "echo", Value::Null)
            .unwrap_err();
        assert_eq!(mapped.kind, FaultKind::System);
        assert!(mapped.rollback_marked);
        assert!(mapped.logged);
        assert_eq!(tx.rollbacks(), 1);
        assert_eq!(tx.commits(), 0);

        // The discarded instance never saw a graceful destruction callback.
        assert_eq!(component.pre_destroy_count(), 0);
    }

    #[test]
    fn test_registered_app_exception_keeps_instance_and_commits() {
        let (kernel, tx) = kernel();
        let (component, factory) = shared_factory();
        kernel
            .install(
                ComponentDescriptor::new(name("Quota"), ComponentKind::Stateless, factory)
                    .with_method(echo_method())
                    .with_app_exception(AppExceptionRule::new("QuotaExceeded", false)),
            )
            .unwrap();

        component.fail_next_invoke(BusinessError::unchecked("QuotaExceeded", "over quota"));
        let mapped = kernel
            .invoke(&name("Quota"), None, "echo", Value::Null)
            .unwrap_err();
        assert_eq!(mapped.kind, FaultKind::Application);
        assert!(!mapped.rollback_marked);
        assert_eq!(tx.commits(), 1);

        // Same live instance serves the next call.
        kernel
            .invoke(&name("Quota"), None, "echo", Value::Null)
            .unwrap();
        assert_eq!(component.invoke_count(), 2);
    }

    #[test]
    fn test_mandatory_without_transaction_is_mapped() {
        let (kernel, _tx) = kernel();
        let (_, factory) = shared_factory();
        kernel
            .install(
                ComponentDescriptor::new(name("Strict"), ComponentKind::Stateless, factory)
                    .with_method(
                        echo_method().with_tx_attribute(TransactionAttribute::Mandatory),
                    ),
            )
            .unwrap();

        let mapped = kernel
            .invoke(&name("Strict"), None, "echo", Value::Null)
            .unwrap_err();
        assert_eq!(mapped.kind, FaultKind::System);
        assert!(matches!(mapped.visible, VisibleException::LocalGeneral { .. }));
    }

    #[test]
    fn test_stateful_session_round_trip() {
        let (kernel, _tx) = kernel();
        let (component, factory) = shared_factory();
        kernel
            .install(
                ComponentDescriptor::new(name("Cart"), ComponentKind::Stateful, factory)
                    .with_method(echo_method()),
            )
            .unwrap();

        kernel.create_session(&name("Cart"), 7.into()).unwrap();
        let key = PrimaryKey::from(7);
        kernel
            .invoke(&name("Cart"), Some(&key), "echo", Value::Null)
            .unwrap();
        assert_eq!(component.invoke_count(), 1);

        kernel.remove_session(&name("Cart"), &key).unwrap();
        assert_eq!(component.pre_destroy_count(), 1);

        let mapped = kernel
            .invoke(&name("Cart"), Some(&key), "echo", Value::Null)
            .unwrap_err();
        assert!(matches!(
            mapped.visible,
            VisibleException::NoSuchInstance { .. }
        ));
    }

    #[test]
    fn test_uninstall_destroys_singleton_gracefully() {
        let (kernel, _tx) = kernel();
        let (component, factory) = shared_factory();
        kernel
            .install(
                ComponentDescriptor::new(name("Config"), ComponentKind::Singleton, factory)
                    .with_method(echo_method()),
            )
            .unwrap();

        kernel
            .invoke(&name("Config"), None, "echo", Value::Null)
            .unwrap();
        kernel.uninstall(&name("Config"));
        assert_eq!(component.pre_destroy_count(), 1);
        assert!(kernel.registry().is_empty());
    }

    #[test]
    fn test_entity_kind_is_rejected_at_install() {
        let (kernel, _tx) = kernel();
        let (_, factory) = shared_factory();
        let result = kernel.install(ComponentDescriptor::new(
            name("Ledger"),
            ComponentKind::Entity,
            factory,
        ));
        assert!(result.is_err());
        assert!(kernel.registry().is_empty());
    }

    #[test]
    fn test_timer_fires_on_singleton_and_auto_deletes() {
        let (kernel, _tx) = kernel();
        let (component, factory) = shared_factory();
        kernel
            .install(
                ComponentDescriptor::new(name("Clock"), ComponentKind::Singleton, factory)
                    .with_timer_method(AutoTimerMethod::new(1, "tick", "demo.ClockBean")),
            )
            .unwrap();

        let owner = ComponentIdentity::instance(name("Clock"), ComponentKind::Singleton, None);
        let task = crate::timers::PersistentTimerTask::interval(owner, 1_000, None)
            .with_auto_method(AutoTimerMethod::new(1, "tick", "demo.ClockBean"));
        let id = kernel.create_timer(task).unwrap();
        assert_eq!(kernel.timers_for(&name("Clock")).len(), 1);

        let outcome = kernel.run_timer(id, chrono::Utc::now());
        assert_eq!(outcome, crate::timers::TimerOutcome::Completed { next: None });
        assert_eq!(component.timeout_count(), 1);
        assert!(kernel.timers_for(&name("Clock")).is_empty());
    }

    #[test]
    fn test_create_timer_validates_method_binding() {
        let (kernel, _tx) = kernel();
        let (_, factory) = shared_factory();
        kernel
            .install(
                ComponentDescriptor::new(name("Clock"), ComponentKind::Singleton, factory)
                    .with_timer_method(AutoTimerMethod::new(1, "tick", "demo.ClockBean")),
            )
            .unwrap();

        let owner = ComponentIdentity::instance(name("Clock"), ComponentKind::Singleton, None);
        let task = crate::timers::PersistentTimerTask::interval(owner, 1_000, None)
            .with_auto_method(AutoTimerMethod::new(9, "tock", "demo.ClockBean"));
        assert!(kernel.create_timer(task).is_err());
    }

    #[test]
    fn test_create_timer_rejects_non_positive_interval() {
        let (kernel, _tx) = kernel();
        let (_, factory) = shared_factory();
        kernel
            .install(
                ComponentDescriptor::new(name("Clock"), ComponentKind::Singleton, factory)
                    .with_timer_method(AutoTimerMethod::new(1, "tick", "demo.ClockBean")),
            )
            .unwrap();

        let owner = ComponentIdentity::instance(name("Clock"), ComponentKind::Singleton, None);
        for interval in [0, -60_000] {
            let task = crate::timers::PersistentTimerTask::interval(
                owner.clone(),
                1_000,
                Some(interval),
            );
            assert!(matches!(
                kernel.create_timer(task),
                Err(crate::error::KernelError::Format(_))
            ));
        }
    }

    #[test]
    fn test_shutdown_skips_timer_expirations() {
        let (kernel, _tx) = kernel();
        let (component, factory) = shared_factory();
        kernel
            .install(
                ComponentDescriptor::new(name("Clock"), ComponentKind::Singleton, factory)
                    .with_timer_method(AutoTimerMethod::new(1, "tick", "demo.ClockBean")),
            )
            .unwrap();

        let owner = ComponentIdentity::instance(name("Clock"), ComponentKind::Singleton, None);
        let id = kernel
            .create_timer(crate::timers::PersistentTimerTask::interval(owner, 1_000, None))
            .unwrap();
        kernel.begin_shutdown();

        let outcome = kernel.run_timer(id, chrono::Utc::now());
        assert_eq!(outcome, crate::timers::TimerOutcome::SkippedShutdown);
        assert_eq!(component.timeout_count(), 0);
    }

    #[test]
    fn test_identity_round_trips_through_kernel_codec() {
        let (kernel, _tx) = kernel();
        let (_, factory) = shared_factory();
        kernel
            .install(ComponentDescriptor::new(
                name("Echo"),
                ComponentKind::Stateless,
                factory,
            ))
            .unwrap();

        let identity = ComponentIdentity::instance(name("Echo"), ComponentKind::Stateless, None)
            .with_module_versioned(true);
        let bytes = kernel.encode_identity(&identity);
        let decoded = kernel.decode_identity(&bytes).unwrap();
        assert_eq!(decoded, identity);
    }
}
