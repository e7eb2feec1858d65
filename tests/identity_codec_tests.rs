//! Identity codec round-trip and corruption-handling tests through the
//! public API, including property-based coverage of the key forms.

use bean_kernel::config::Platform;
use bean_kernel::error::KernelError;
use bean_kernel::identity::{self, ComponentIdentity, ComponentKind, ComponentName, PrimaryKey};
use bean_kernel::lifecycle::ManagedInstance;
use bean_kernel::registry::{ComponentDescriptor, ComponentRegistry, TransactionManagement};
use bean_kernel::test_support::CountingComponent;
use proptest::prelude::*;
use std::sync::Arc;

fn installed(name: &ComponentName, kind: ComponentKind) -> ComponentRegistry {
    let registry = ComponentRegistry::new();
    registry.install(ComponentDescriptor::new(
        name.clone(),
        kind,
        Arc::new(|| Box::new(CountingComponent::default()) as Box<dyn ManagedInstance>),
    ));
    registry
}

fn round_trip(identity: &ComponentIdentity, platform: Platform) -> ComponentIdentity {
    let registry = installed(identity.name(), identity.kind());
    let bytes = identity::encode(identity, platform);
    identity::decode(&bytes, &registry).expect("decode")
}

#[test]
fn test_keyed_stateful_identity_round_trips_both_platforms() {
    let identity = ComponentIdentity::instance(
        ComponentName::new("shop", "checkout", "CartBean"),
        ComponentKind::Stateful,
        Some(PrimaryKey::from("session-9f2")),
    );
    for platform in [Platform::Distributed, Platform::Host] {
        assert_eq!(round_trip(&identity, platform), identity);
    }
}

#[test]
fn test_home_identity_round_trips() {
    let identity = ComponentIdentity::home(
        ComponentName::new("shop", "checkout", "CartBean"),
        ComponentKind::Stateful,
    );
    let decoded = round_trip(&identity, Platform::Distributed);
    assert!(decoded.is_home());
    assert_eq!(decoded.name(), identity.name());
}

#[test]
fn test_decoder_honors_writer_platform_not_reader_config() {
    let identity = ComponentIdentity::instance(
        ComponentName::new("shop", "checkout", "CartBean"),
        ComponentKind::Stateful,
        Some(PrimaryKey::from(1_000_000i64)),
    );
    let registry = installed(identity.name(), identity.kind());
    // Written big-endian; the decoder reads the platform from the header.
    let bytes = identity::encode(&identity, Platform::Host);
    let decoded = identity::decode(&bytes, &registry).expect("decode");
    assert_eq!(decoded, identity);
}

#[test]
fn test_unknown_component_is_not_installed_not_corrupt() {
    let identity = ComponentIdentity::instance(
        ComponentName::new("shop", "checkout", "GoneBean"),
        ComponentKind::Stateless,
        None,
    );
    let bytes = identity::encode(&identity, Platform::Distributed);
    let err = identity::decode(&bytes, &ComponentRegistry::new()).unwrap_err();
    assert!(matches!(err, KernelError::NotInstalled(_)));
}

#[test]
fn test_decoder_folds_registration_facts_into_identity() {
    let name = ComponentName::new("shop", "checkout", "AuditBean");
    let registry = ComponentRegistry::new();
    registry.install(
        ComponentDescriptor::new(
            name.clone(),
            ComponentKind::Singleton,
            Arc::new(|| Box::new(CountingComponent::default()) as Box<dyn ManagedInstance>),
        )
        .with_transaction_management(TransactionManagement::Bean),
    );

    let identity = ComponentIdentity::instance(name, ComponentKind::Singleton, None);
    let bytes = identity::encode(&identity, Platform::Distributed);
    let decoded = identity::decode(&bytes, &registry).expect("decode");
    assert!(decoded.bean_managed_tx());
    assert!(decoded.module_versioned());
}

#[test]
fn test_bad_header_is_rejected_before_anything_else() {
    let err = identity::decode(&[0x00, 0x01, 0x02], &ComponentRegistry::new()).unwrap_err();
    assert!(matches!(err, KernelError::Format(_)));
}

#[test]
fn test_truncated_encoding_is_a_format_error() {
    let identity = ComponentIdentity::instance(
        ComponentName::new("shop", "checkout", "CartBean"),
        ComponentKind::Stateful,
        Some(PrimaryKey::from("session-9f2")),
    );
    let registry = installed(identity.name(), identity.kind());
    let bytes = identity::encode(&identity, Platform::Distributed);
    let err = identity::decode(&bytes[..bytes.len() - 3], &registry).unwrap_err();
    assert!(matches!(err, KernelError::Format(_)));
}

fn key_strategy() -> impl Strategy<Value = PrimaryKey> {
    prop_oneof![
        any::<i32>().prop_map(PrimaryKey::Int32),
        any::<i64>().prop_map(PrimaryKey::Int64),
        "[a-zA-Z0-9_-]{1,40}".prop_map(PrimaryKey::Utf8),
        proptest::collection::vec(any::<u8>(), 0..64).prop_map(PrimaryKey::Bytes),
        proptest::collection::vec(any::<u8>(), 1..64).prop_map(PrimaryKey::Serialized),
    ]
}

fn name_strategy() -> impl Strategy<Value = ComponentName> {
    (
        "[a-zA-Z][a-zA-Z0-9]{0,20}",
        "[a-zA-Z][a-zA-Z0-9]{0,20}",
        "[a-zA-Z][a-zA-Z0-9]{0,20}",
    )
        .prop_map(|(app, module, component)| ComponentName::new(app, module, component))
}

proptest! {
    /// Property: every key form survives encode/decode on both platforms.
    #[test]
    fn identities_round_trip(name in name_strategy(), key in key_strategy(), host in any::<bool>()) {
        let identity = ComponentIdentity::instance(name, ComponentKind::Stateful, Some(key));
        let platform = if host { Platform::Host } else { Platform::Distributed };
        prop_assert_eq!(round_trip(&identity, platform), identity);
    }

    /// Property: equal identities produce identical bytes for a platform.
    #[test]
    fn equal_identities_encode_identically(name in name_strategy(), key in key_strategy()) {
        let a = ComponentIdentity::instance(name.clone(), ComponentKind::Stateful, Some(key.clone()));
        let b = ComponentIdentity::instance(name, ComponentKind::Stateful, Some(key));
        prop_assert_eq!(
            identity::encode(&a, Platform::Distributed),
            identity::encode(&b, Platform::Distributed)
        );
    }

    /// Property: decoding arbitrary bytes never panics.
    #[test]
    fn decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..128)) {
        let _ = identity::decode(&bytes, &ComponentRegistry::new());
    }
}
