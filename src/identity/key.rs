//! Primary key value forms.
//!
//! The codec distinguishes five tagged encodings chosen by value form:
//! optimized fixed layouts for 32-bit integers, 64-bit integers, UTF-8
//! strings, and raw byte arrays, with a generic serialized form as the
//! fallback for arbitrary key types.

use crate::constants::identity_wire;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A component instance's primary key. Absent for the stateless family
/// (stateless, singleton, message-driven).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
#[serde(rename_all = "snake_case")]
pub enum PrimaryKey {
    /// Generic serialized fallback for arbitrary key types; opaque bytes
    /// produced by the application's own serialization.
    Serialized(Vec<u8>),
    Int32(i32),
    Utf8(String),
    Int64(i64),
    Bytes(Vec<u8>),
}

impl PrimaryKey {
    /// Build the generic fallback form from any serde-serializable key.
    pub fn from_serializable<T: Serialize>(key: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::Serialized(serde_json::to_vec(key)?))
    }

    /// Wire tag for this key form.
    pub fn wire_tag(&self) -> u8 {
        match self {
            Self::Serialized(_) => identity_wire::KEY_SERIALIZED,
            Self::Int32(_) => identity_wire::KEY_INT32,
            Self::Utf8(_) => identity_wire::KEY_UTF8,
            Self::Int64(_) => identity_wire::KEY_INT64,
            Self::Bytes(_) => identity_wire::KEY_BYTES,
        }
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serialized(bytes) => write!(f, "serialized[{} bytes]", bytes.len()),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Utf8(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Bytes(bytes) => write!(f, "bytes[{} bytes]", bytes.len()),
        }
    }
}

impl From<i32> for PrimaryKey {
    fn from(value: i32) -> Self {
        Self::Int32(value)
    }
}

impl From<i64> for PrimaryKey {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<String> for PrimaryKey {
    fn from(value: String) -> Self {
        Self::Utf8(value)
    }
}

impl From<&str> for PrimaryKey {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_string())
    }
}

impl From<Vec<u8>> for PrimaryKey {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}
