//! # Component Identity and Binary Codec
//!
//! A `ComponentIdentity` is the compound key everything else in the kernel
//! hangs off: a hierarchical container-scoped name, an optional primary key,
//! and a role flag distinguishing factory (home) identities from instance
//! identities. The codec projects an identity to and from a compact
//! versioned binary encoding used on the wire and at rest.

pub mod codec;
pub mod key;
pub mod name;

mod identity;

pub use codec::{decode, ByteReader, ByteWriter};
pub use identity::{ComponentIdentity, ComponentKind};
pub use key::PrimaryKey;
pub use name::ComponentName;

use crate::config::Platform;

/// Narrow view of the installed-component registry the decoder needs:
/// resolution of a decoded name to the component's registration facts.
/// Resolution failure is expected across hot redeploy and maps to
/// `NotInstalledError`, never to a corruption error.
pub trait ComponentResolver {
    fn resolve_component(&self, name: &ComponentName) -> Option<ResolvedComponent>;
}

/// Registration facts the decoder folds back into a decoded identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedComponent {
    pub kind: ComponentKind,
    pub bean_managed_tx: bool,
    pub module_versioned: bool,
}

/// Encode an identity for the given platform. Equal identities sharing the
/// same module-version capability produce identical bytes; the result is
/// cached on the identity after first use.
pub fn encode(identity: &ComponentIdentity, platform: Platform) -> Vec<u8> {
    identity.encoded_bytes(platform).to_vec()
}
