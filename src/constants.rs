//! # Wire Constants and Operational Defaults
//!
//! Fixed byte values of the identity and timer-task encodings, plus the
//! default operational boundaries of the kernel. The wire values are legacy
//! layouts shared with already-persisted data: they are compatibility
//! surface, not tunables.

/// Binary identity encoding (fixed legacy layout, big-endian unless the
/// platform code says otherwise):
///
/// ```text
/// offset 0..5   : magic + platform + version header (6 bytes)
/// offset 6      : kind tag | flag bits
/// offset 7..10  : name-block length (4 bytes, platform byte order)
/// offset 11..   : name-block bytes (UTF-8 hierarchical name)
/// next 1 byte   : key-type tag
/// remaining     : key payload per tag
/// ```
pub mod identity_wire {
    /// Two-byte eyecatcher opening every identity encoding.
    pub const EYECATCHER: [u8; 2] = [0xAC, 0xBE];

    /// Identity encoding version carried in header bytes 4..5.
    pub const VERSION: u16 = 0x0001;

    /// Full header length: eyecatcher + platform code + version.
    pub const HEADER_LEN: usize = 6;

    // Component kind tags (low nibble of the tag byte).
    pub const KIND_HOME: u8 = 0x00;
    pub const KIND_STATELESS: u8 = 0x01;
    pub const KIND_STATEFUL: u8 = 0x02;
    pub const KIND_ENTITY: u8 = 0x03;
    pub const KIND_MESSAGE_DRIVEN: u8 = 0x04;
    pub const KIND_SINGLETON: u8 = 0x05;

    // Flag bits combined into the tag byte.
    pub const FLAG_BEAN_MANAGED_TX: u8 = 0x10;
    pub const FLAG_MODULE_VERSIONED: u8 = 0x20;

    /// Mask extracting the kind from a combined tag byte.
    pub const KIND_MASK: u8 = 0x0F;

    // Key-type tags. Encoding priority on write is: generic-serialized
    // (fallback), int32, UTF-8 string, int64, byte array.
    pub const KEY_SERIALIZED: u8 = 0;
    pub const KEY_INT32: u8 = 1;
    pub const KEY_UTF8: u8 = 3;
    pub const KEY_INT64: u8 = 4;
    pub const KEY_BYTES: u8 = 8;

    /// Tag written when the identity carries no key (home and the stateless
    /// family).
    pub const KEY_ABSENT: u8 = 0xFF;
}

/// Persistent timer task record: fixed eyecatcher + 2-byte platform code +
/// 2-byte version, then the owner identity block, the opaque user-info
/// block, and a version-dependent tail.
pub mod timer_wire {
    /// Two-byte eyecatcher opening every persisted timer task.
    pub const EYECATCHER: [u8; 2] = [0x50, 0x54];

    /// Version 1 tail: raw 8-byte expiration + 8-byte repeat interval.
    pub const VERSION_INTERVAL: u16 = 1;

    /// Version 2 tail: parsed schedule + 4-byte method id + two
    /// length-prefixed validation strings. Written whenever a calendar
    /// schedule or automatic-timer metadata is present.
    pub const VERSION_SCHEDULE: u16 = 2;

    pub const HEADER_LEN: usize = 6;
}

/// Platform codes carried in header bytes 2..3 of both encodings. The code
/// selects the byte order of the 4-byte name-length field and of integer key
/// payloads: a historical interoperability shim that must be preserved
/// exactly, since already-persisted identities depend on it.
pub mod platform {
    /// Distributed platforms; multi-byte lengths little-endian.
    pub const DISTRIBUTED: u16 = 0x0001;

    /// Legacy host platform; multi-byte lengths big-endian.
    pub const HOST: u16 = 0x0002;
}

/// Operational defaults, overridable through `KernelConfig`.
pub mod defaults {
    /// Probe window (ms) a timer-triggered lock acquisition tries before
    /// consulting the deadlock-avoidance counter.
    pub const DEADLOCK_PROBE_MILLIS: u64 = 1_000;

    /// Default access timeout: wait indefinitely.
    pub const ACCESS_TIMEOUT_MILLIS: i64 = -1;

    /// Default bound on concurrently creatable pooled instances.
    pub const POOL_CAPACITY: usize = 50;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags_match_wire_contract() {
        assert_eq!(identity_wire::KIND_HOME, 0x00);
        assert_eq!(identity_wire::KIND_STATELESS, 0x01);
        assert_eq!(identity_wire::KIND_STATEFUL, 0x02);
        assert_eq!(identity_wire::KIND_ENTITY, 0x03);
        assert_eq!(identity_wire::KIND_MESSAGE_DRIVEN, 0x04);
        assert_eq!(identity_wire::KIND_SINGLETON, 0x05);
    }

    #[test]
    fn test_flag_bits_do_not_collide_with_kinds() {
        for kind in [
            identity_wire::KIND_HOME,
            identity_wire::KIND_STATELESS,
            identity_wire::KIND_STATEFUL,
            identity_wire::KIND_ENTITY,
            identity_wire::KIND_MESSAGE_DRIVEN,
            identity_wire::KIND_SINGLETON,
        ] {
            assert_eq!(kind & identity_wire::FLAG_BEAN_MANAGED_TX, 0);
            assert_eq!(kind & identity_wire::FLAG_MODULE_VERSIONED, 0);
        }
    }

    #[test]
    fn test_key_tags_match_wire_contract() {
        assert_eq!(identity_wire::KEY_SERIALIZED, 0);
        assert_eq!(identity_wire::KEY_INT32, 1);
        assert_eq!(identity_wire::KEY_UTF8, 3);
        assert_eq!(identity_wire::KEY_INT64, 4);
        assert_eq!(identity_wire::KEY_BYTES, 8);
    }
}
