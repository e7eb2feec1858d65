//! The compound component identity value.

use super::{ComponentName, PrimaryKey};
use crate::config::Platform;
use crate::constants::identity_wire;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

/// Component kinds the kernel manages. The factory (home) role is not a
/// kind: it is a flag on the identity, and a home identity resolves its kind
/// through the registry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Stateless,
    Stateful,
    Entity,
    MessageDriven,
    Singleton,
}

impl ComponentKind {
    /// Wire tag for an instance identity of this kind.
    pub fn wire_tag(self) -> u8 {
        match self {
            Self::Stateless => identity_wire::KIND_STATELESS,
            Self::Stateful => identity_wire::KIND_STATEFUL,
            Self::Entity => identity_wire::KIND_ENTITY,
            Self::MessageDriven => identity_wire::KIND_MESSAGE_DRIVEN,
            Self::Singleton => identity_wire::KIND_SINGLETON,
        }
    }

    pub fn from_wire_tag(tag: u8) -> Option<Self> {
        match tag {
            identity_wire::KIND_STATELESS => Some(Self::Stateless),
            identity_wire::KIND_STATEFUL => Some(Self::Stateful),
            identity_wire::KIND_ENTITY => Some(Self::Entity),
            identity_wire::KIND_MESSAGE_DRIVEN => Some(Self::MessageDriven),
            identity_wire::KIND_SINGLETON => Some(Self::Singleton),
            _ => None,
        }
    }

    /// Kinds that never carry a primary key: one logical instance per
    /// component (singleton) or anonymous interchangeable instances
    /// (stateless, message-driven).
    pub fn is_keyless(self) -> bool {
        matches!(
            self,
            Self::Stateless | Self::MessageDriven | Self::Singleton
        )
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stateless => write!(f, "stateless"),
            Self::Stateful => write!(f, "stateful"),
            Self::Entity => write!(f, "entity"),
            Self::MessageDriven => write!(f, "message_driven"),
            Self::Singleton => write!(f, "singleton"),
        }
    }
}

/// Immutable compound identity of a managed component: hierarchical name,
/// optional primary key, and the home/instance role flag. Created once per
/// logical identity and shared; the hash is precomputed at construction and
/// the binary encoding is cached after first use.
#[derive(Debug)]
pub struct ComponentIdentity {
    name: ComponentName,
    key: Option<PrimaryKey>,
    is_home: bool,
    kind: ComponentKind,
    bean_managed_tx: bool,
    module_versioned: bool,
    hash: u64,
    encoded: OnceLock<Vec<u8>>,
}

impl ComponentIdentity {
    /// Instance identity. Keyless kinds must not carry a key; keyed kinds
    /// may (stateful sessions and entities always do in practice).
    pub fn instance(
        name: ComponentName,
        kind: ComponentKind,
        key: Option<PrimaryKey>,
    ) -> Self {
        debug_assert!(
            !(kind.is_keyless() && key.is_some()),
            "keyless kind {kind} given a primary key"
        );
        Self::build(name, key, false, kind, false, false)
    }

    /// Factory (home) identity for the named component. On the wire the
    /// name rides in the key slot; structurally the identity is name + flag.
    pub fn home(name: ComponentName, kind: ComponentKind) -> Self {
        Self::build(name, None, true, kind, false, false)
    }

    pub fn with_bean_managed_tx(mut self, value: bool) -> Self {
        self.bean_managed_tx = value;
        self.encoded = OnceLock::new();
        self
    }

    pub fn with_module_versioned(mut self, value: bool) -> Self {
        self.module_versioned = value;
        self.encoded = OnceLock::new();
        self
    }

    fn build(
        name: ComponentName,
        key: Option<PrimaryKey>,
        is_home: bool,
        kind: ComponentKind,
        bean_managed_tx: bool,
        module_versioned: bool,
    ) -> Self {
        let hash = Self::compute_hash(&name, key.as_ref(), is_home);
        Self {
            name,
            key,
            is_home,
            kind,
            bean_managed_tx,
            module_versioned,
            hash,
            encoded: OnceLock::new(),
        }
    }

    /// hash(name) + hash(key, or 0 if absent) + (1 if home). Wrapping sums
    /// keep the contract stable across all key forms.
    fn compute_hash(name: &ComponentName, key: Option<&PrimaryKey>, is_home: bool) -> u64 {
        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        let name_hash = hasher.finish();

        let key_hash = match key {
            Some(key) => {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                hasher.finish()
            }
            None => 0,
        };

        name_hash
            .wrapping_add(key_hash)
            .wrapping_add(u64::from(is_home))
    }

    pub fn name(&self) -> &ComponentName {
        &self.name
    }

    pub fn key(&self) -> Option<&PrimaryKey> {
        self.key.as_ref()
    }

    pub fn is_home(&self) -> bool {
        self.is_home
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn bean_managed_tx(&self) -> bool {
        self.bean_managed_tx
    }

    pub fn module_versioned(&self) -> bool {
        self.module_versioned
    }

    pub fn cached_hash(&self) -> u64 {
        self.hash
    }

    /// The combined kind-and-flags tag byte of the binary encoding.
    pub fn wire_tag(&self) -> u8 {
        let kind_tag = if self.is_home {
            identity_wire::KIND_HOME
        } else {
            self.kind.wire_tag()
        };
        let mut tag = kind_tag;
        if self.bean_managed_tx {
            tag |= identity_wire::FLAG_BEAN_MANAGED_TX;
        }
        if self.module_versioned {
            tag |= identity_wire::FLAG_MODULE_VERSIONED;
        }
        tag
    }

    /// Cached binary projection; computed on first use for the platform of
    /// that first use. One kernel writes for exactly one platform, so the
    /// cache never needs to carry both orders.
    pub fn encoded_bytes(&self, platform: Platform) -> &[u8] {
        self.encoded
            .get_or_init(|| super::codec::encode_uncached(self, platform))
    }
}

impl Clone for ComponentIdentity {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            key: self.key.clone(),
            is_home: self.is_home,
            kind: self.kind,
            bean_managed_tx: self.bean_managed_tx,
            module_versioned: self.module_versioned,
            hash: self.hash,
            encoded: OnceLock::new(),
        }
    }
}

impl PartialEq for ComponentIdentity {
    fn eq(&self, other: &Self) -> bool {
        // Cached-hash mismatch is the fast path out.
        if self.hash != other.hash || self.is_home != other.is_home {
            return false;
        }
        if self.is_home {
            // Factory identities carry the name in the key slot on the wire;
            // comparing it covers the whole identity.
            return self.name == other.name;
        }
        self.name == other.name && self.key == other.key
    }
}

impl Eq for ComponentIdentity {}

impl Hash for ComponentIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Display for ComponentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = if self.is_home { "home" } else { "instance" };
        match &self.key {
            Some(key) => write!(f, "{}({}, key={})", role, self.name, key),
            None => write!(f, "{}({})", role, self.name),
        }
    }
}
