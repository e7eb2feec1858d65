//! # Installed-Component Registry
//!
//! Registration facts for every installed component: kind, management
//! modes, method descriptors, declared application exceptions, and the
//! instance factory. The registry is the decoder's resolver; resolution
//! failure across hot redeploy is an expected condition, not corruption.

use crate::faults::AppExceptionRule;
use crate::identity::{ComponentKind, ComponentName, ComponentResolver, ResolvedComponent};
use crate::invocation::MethodDescriptor;
use crate::lifecycle::InstanceFactory;
use crate::timers::AutoTimerMethod;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Who demarcates transactions for the component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionManagement {
    Container,
    Bean,
}

/// Who serializes access to a shared (singleton) instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyManagement {
    Container,
    Bean,
}

/// Everything the kernel knows about one installed component.
pub struct ComponentDescriptor {
    pub name: ComponentName,
    pub kind: ComponentKind,
    pub transaction_management: TransactionManagement,
    pub concurrency_management: ConcurrencyManagement,
    /// Module generation gate: versioned modules declare application
    /// exceptions and emit the versioned identity flag.
    pub module_versioned: bool,
    /// Pooled-kind capacity bound; `None` defers to the kernel-wide default.
    pub pool_capacity: Option<usize>,
    pub lock_fair: bool,
    pub app_exceptions: Vec<AppExceptionRule>,
    pub methods: HashMap<String, MethodDescriptor>,
    /// Automatic timer callbacks this component declares, by stable method
    /// id; used to validate persisted timer records across redeploy.
    pub timer_methods: Vec<AutoTimerMethod>,
    pub factory: InstanceFactory,
}

impl ComponentDescriptor {
    pub fn new(name: ComponentName, kind: ComponentKind, factory: InstanceFactory) -> Self {
        Self {
            name,
            kind,
            transaction_management: TransactionManagement::Container,
            concurrency_management: ConcurrencyManagement::Container,
            module_versioned: true,
            pool_capacity: None,
            lock_fair: false,
            app_exceptions: Vec::new(),
            methods: HashMap::new(),
            timer_methods: Vec::new(),
            factory,
        }
    }

    pub fn with_transaction_management(mut self, mode: TransactionManagement) -> Self {
        self.transaction_management = mode;
        self
    }

    pub fn with_concurrency_management(mut self, mode: ConcurrencyManagement) -> Self {
        self.concurrency_management = mode;
        self
    }

    pub fn with_module_versioned(mut self, versioned: bool) -> Self {
        self.module_versioned = versioned;
        self
    }

    pub fn with_pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = Some(capacity);
        self
    }

    pub fn with_lock_fair(mut self, fair: bool) -> Self {
        self.lock_fair = fair;
        self
    }

    pub fn with_app_exception(mut self, rule: AppExceptionRule) -> Self {
        self.app_exceptions.push(rule);
        self
    }

    pub fn with_method(mut self, method: MethodDescriptor) -> Self {
        self.methods.insert(method.name.clone(), method);
        self
    }

    pub fn with_timer_method(mut self, method: AutoTimerMethod) -> Self {
        self.timer_methods.push(method);
        self
    }

    pub fn bean_managed_tx(&self) -> bool {
        self.transaction_management == TransactionManagement::Bean
    }

    pub fn bean_managed_concurrency(&self) -> bool {
        self.concurrency_management == ConcurrencyManagement::Bean
    }

    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.get(name)
    }

    /// Whether this component declares any timeout callbacks at all.
    pub fn supports_timers(&self) -> bool {
        !self.timer_methods.is_empty()
    }

    pub fn timer_method(&self, method_id: u32) -> Option<&AutoTimerMethod> {
        self.timer_methods.iter().find(|m| m.method_id == method_id)
    }
}

impl std::fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("transaction_management", &self.transaction_management)
            .field("concurrency_management", &self.concurrency_management)
            .field("module_versioned", &self.module_versioned)
            .field("pool_capacity", &self.pool_capacity)
            .field("methods", &self.methods.keys())
            .finish_non_exhaustive()
    }
}

/// Concurrent name-to-descriptor map.
#[derive(Default)]
pub struct ComponentRegistry {
    components: DashMap<ComponentName, Arc<ComponentDescriptor>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component, replacing any previous registration of the
    /// same name (redeploy).
    pub fn install(&self, descriptor: ComponentDescriptor) -> Arc<ComponentDescriptor> {
        let descriptor = Arc::new(descriptor);
        info!(component = %descriptor.name, kind = %descriptor.kind, "component installed");
        self.components
            .insert(descriptor.name.clone(), Arc::clone(&descriptor));
        descriptor
    }

    pub fn uninstall(&self, name: &ComponentName) -> Option<Arc<ComponentDescriptor>> {
        let removed = self.components.remove(name).map(|(_, d)| d);
        if removed.is_some() {
            info!(component = %name, "component uninstalled");
        }
        removed
    }

    pub fn get(&self, name: &ComponentName) -> Option<Arc<ComponentDescriptor>> {
        self.components.get(name).map(|e| Arc::clone(e.value()))
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl ComponentResolver for ComponentRegistry {
    fn resolve_component(&self, name: &ComponentName) -> Option<ResolvedComponent> {
        self.get(name).map(|descriptor| ResolvedComponent {
            kind: descriptor.kind,
            bean_managed_tx: descriptor.bean_managed_tx(),
            module_versioned: descriptor.module_versioned,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::CountingComponent;

    fn descriptor(name: &str) -> ComponentDescriptor {
        ComponentDescriptor::new(
            ComponentName::new("app", "mod", name),
            ComponentKind::Stateless,
            Arc::new(|| Box::new(CountingComponent::default())),
        )
    }

    #[test]
    fn test_install_and_resolve() {
        let registry = ComponentRegistry::new();
        registry.install(
            descriptor("Echo").with_transaction_management(TransactionManagement::Bean),
        );

        let resolved = registry
            .resolve_component(&ComponentName::new("app", "mod", "Echo"))
            .unwrap();
        assert_eq!(resolved.kind, ComponentKind::Stateless);
        assert!(resolved.bean_managed_tx);
        assert!(resolved.module_versioned);
    }

    #[test]
    fn test_unknown_name_does_not_resolve() {
        let registry = ComponentRegistry::new();
        assert!(registry
            .resolve_component(&ComponentName::new("app", "mod", "Gone"))
            .is_none());
    }

    #[test]
    fn test_reinstall_replaces_registration() {
        let registry = ComponentRegistry::new();
        registry.install(descriptor("Echo"));
        registry.install(descriptor("Echo").with_module_versioned(false));
        assert_eq!(registry.len(), 1);
        let resolved = registry
            .resolve_component(&ComponentName::new("app", "mod", "Echo"))
            .unwrap();
        assert!(!resolved.module_versioned);
    }

    #[test]
    fn test_uninstall_removes_registration() {
        let registry = ComponentRegistry::new();
        registry.install(descriptor("Echo"));
        assert!(registry.uninstall(&ComponentName::new("app", "mod", "Echo")).is_some());
        assert!(registry.is_empty());
        assert!(registry.uninstall(&ComponentName::new("app", "mod", "Echo")).is_none());
    }

    #[test]
    fn test_timer_method_lookup() {
        let timer = AutoTimerMethod::new(7, "refreshCache", "com.example.CacheBean");
        let registry = ComponentRegistry::new();
        let descriptor = registry.install(descriptor("Cache").with_timer_method(timer));
        assert!(descriptor.supports_timers());
        assert_eq!(descriptor.timer_method(7).unwrap().method_name, "refreshCache");
        assert!(descriptor.timer_method(8).is_none());
    }
}
