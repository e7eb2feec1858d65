//! Byte-level identity codec.
//!
//! The layout is a fixed legacy format; see `constants::identity_wire`. The
//! byte order of the 4-byte name-length field and of integer key payloads
//! follows the platform code in the header. Decoders honor whatever platform
//! the record advertises, so identities persisted by either platform remain
//! readable. Do not "fix" this to a single order: it would break every
//! already-persisted identity.

use super::{ComponentIdentity, ComponentKind, ComponentName, ComponentResolver, PrimaryKey};
use crate::config::Platform;
use crate::constants::identity_wire as wire;
use crate::error::{FormatError, KernelError, NotInstalledError};
use tracing::trace;

/// Append-only encoder with platform-selected byte order for multi-byte
/// length and integer fields. Header eyecatcher/platform/version fields are
/// always big-endian; only the legacy length/integer fields follow the
/// platform quirk.
#[derive(Debug)]
pub struct ByteWriter {
    buf: Vec<u8>,
    big_endian: bool,
}

impl ByteWriter {
    pub fn new(platform: Platform) -> Self {
        Self {
            buf: Vec::with_capacity(64),
            big_endian: platform.big_endian(),
        }
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Header fields: always big-endian regardless of platform.
    pub fn put_u16_header(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_u32(&mut self, value: u32) {
        let bytes = if self.big_endian {
            value.to_be_bytes()
        } else {
            value.to_le_bytes()
        };
        self.buf.extend_from_slice(&bytes);
    }

    pub fn put_i32(&mut self, value: i32) {
        self.put_u32(value as u32);
    }

    pub fn put_u64(&mut self, value: u64) {
        let bytes = if self.big_endian {
            value.to_be_bytes()
        } else {
            value.to_le_bytes()
        };
        self.buf.extend_from_slice(&bytes);
    }

    pub fn put_i64(&mut self, value: i64) {
        self.put_u64(value as u64);
    }

    pub fn put_block(&mut self, bytes: &[u8]) {
        self.put_u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Bounds-checked reader mirroring [`ByteWriter`]. Every truncation error
/// reports both the claimed and the available length, and when the
/// byte-order-reversed reading of a length field would have fit, reports
/// that too: the most common corruption in practice is a record read with
/// the wrong platform assumption.
#[derive(Debug)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
    big_endian: bool,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8], platform: Platform) -> Self {
        Self {
            buf,
            pos: 0,
            big_endian: platform.big_endian(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], FormatError> {
        if len > self.remaining() {
            return Err(FormatError::Truncated {
                claimed: len as u64,
                available: self.remaining() as u64,
                reversed_hint: None,
            });
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.take(1)?[0])
    }

    /// Header fields: always big-endian regardless of platform.
    pub fn read_u16_header(&mut self) -> Result<u16, FormatError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, FormatError> {
        let bytes: [u8; 4] = self.take(4)?.try_into().unwrap();
        Ok(if self.big_endian {
            u32::from_be_bytes(bytes)
        } else {
            u32::from_le_bytes(bytes)
        })
    }

    pub fn read_i32(&mut self) -> Result<i32, FormatError> {
        self.read_u32().map(|v| v as i32)
    }

    pub fn read_u64(&mut self) -> Result<u64, FormatError> {
        let bytes: [u8; 8] = self.take(8)?.try_into().unwrap();
        Ok(if self.big_endian {
            u64::from_be_bytes(bytes)
        } else {
            u64::from_le_bytes(bytes)
        })
    }

    pub fn read_i64(&mut self) -> Result<i64, FormatError> {
        self.read_u64().map(|v| v as i64)
    }

    /// Read a 4-byte length prefix and that many bytes. A length exceeding
    /// the remaining buffer fails with the byte-order-reversed heuristic.
    pub fn read_block(&mut self) -> Result<&'a [u8], FormatError> {
        let claimed = self.read_u32()?;
        let available = self.remaining();
        if claimed as usize > available {
            let reversed = u64::from(claimed.swap_bytes());
            return Err(FormatError::Truncated {
                claimed: u64::from(claimed),
                available: available as u64,
                reversed_hint: (reversed <= available as u64).then_some(reversed),
            });
        }
        self.take(claimed as usize)
    }
}

/// Encode an identity without consulting its cache. Library users go through
/// `identity::encode`, which caches on the identity.
pub(super) fn encode_uncached(identity: &ComponentIdentity, platform: Platform) -> Vec<u8> {
    let mut writer = ByteWriter::new(platform);

    writer.put_u8(wire::EYECATCHER[0]);
    writer.put_u8(wire::EYECATCHER[1]);
    writer.put_u16_header(platform.code());
    writer.put_u16_header(wire::VERSION);
    writer.put_u8(identity.wire_tag());

    if identity.is_home() {
        // Factory identities carry the component name in the key slot; the
        // name block is empty.
        writer.put_block(&[]);
        writer.put_u8(wire::KEY_UTF8);
        writer.put_block(identity.name().to_string().as_bytes());
    } else {
        writer.put_block(identity.name().to_string().as_bytes());
        match identity.key() {
            Some(key) => encode_key(&mut writer, key),
            None => writer.put_u8(wire::KEY_ABSENT),
        }
    }

    writer.into_bytes()
}

fn encode_key(writer: &mut ByteWriter, key: &PrimaryKey) {
    writer.put_u8(key.wire_tag());
    match key {
        PrimaryKey::Serialized(bytes) => writer.put_block(bytes),
        PrimaryKey::Int32(v) => writer.put_i32(*v),
        PrimaryKey::Utf8(v) => writer.put_block(v.as_bytes()),
        PrimaryKey::Int64(v) => writer.put_i64(*v),
        PrimaryKey::Bytes(bytes) => writer.put_block(bytes),
    }
}

/// Decode a binary identity, resolving the component's registration through
/// the supplied resolver.
///
/// Failure taxonomy:
/// - header mismatch or truncation → [`FormatError`], fatal to this decode;
/// - unknown kind or key tag → [`FormatError`], fatal;
/// - a name that no longer resolves → [`NotInstalledError`], the expected
///   hot-redeploy case, deliberately distinct from corruption.
pub fn decode(
    bytes: &[u8],
    resolver: &dyn ComponentResolver,
) -> Result<ComponentIdentity, KernelError> {
    let platform = validate_header(bytes)?;
    let mut reader = ByteReader::new(&bytes[wire::HEADER_LEN..], platform);

    let tag = reader.read_u8().map_err(KernelError::Format)?;
    let kind_tag = tag & wire::KIND_MASK;
    let bean_managed_tx = tag & wire::FLAG_BEAN_MANAGED_TX != 0;
    let module_versioned = tag & wire::FLAG_MODULE_VERSIONED != 0;

    let (identity, resolved) = match kind_tag {
        wire::KIND_HOME => {
            let empty = reader.read_block().map_err(KernelError::Format)?;
            if !empty.is_empty() {
                return Err(FormatError::Malformed(format!(
                    "home identity carries a {}-byte name block; expected the name in the key slot",
                    empty.len()
                ))
                .into());
            }
            let key_tag = reader.read_u8().map_err(KernelError::Format)?;
            if key_tag != wire::KEY_UTF8 {
                return Err(FormatError::UnsupportedKeyTag(key_tag).into());
            }
            let name = read_name_bytes(reader.read_block().map_err(KernelError::Format)?)?;
            let resolved = resolve(resolver, &name)?;
            (ComponentIdentity::home(name, resolved.kind), resolved)
        }
        wire::KIND_STATEFUL | wire::KIND_ENTITY => {
            let name = read_name_bytes(reader.read_block().map_err(KernelError::Format)?)?;
            let resolved = resolve(resolver, &name)?;
            let kind = ComponentKind::from_wire_tag(kind_tag)
                .ok_or(FormatError::UnsupportedKind(kind_tag))?;
            let key = decode_key(&mut reader)?;
            (ComponentIdentity::instance(name, kind, key), resolved)
        }
        wire::KIND_STATELESS | wire::KIND_MESSAGE_DRIVEN | wire::KIND_SINGLETON => {
            let name = read_name_bytes(reader.read_block().map_err(KernelError::Format)?)?;
            let resolved = resolve(resolver, &name)?;
            let kind = ComponentKind::from_wire_tag(kind_tag)
                .ok_or(FormatError::UnsupportedKind(kind_tag))?;
            let key_tag = reader.read_u8().map_err(KernelError::Format)?;
            if key_tag != wire::KEY_ABSENT {
                return Err(FormatError::Malformed(format!(
                    "{kind} identity carries key tag 0x{key_tag:02x}; the stateless family is keyless"
                ))
                .into());
            }
            (ComponentIdentity::instance(name, kind, None), resolved)
        }
        unknown => return Err(FormatError::UnsupportedKind(unknown).into()),
    };

    // The wire flags are what the writer knew; the current registration is
    // authoritative after redeploy. Either source can set a flag.
    let identity = identity
        .with_bean_managed_tx(bean_managed_tx || resolved.bean_managed_tx)
        .with_module_versioned(module_versioned || resolved.module_versioned);

    trace!(identity = %identity, bytes = bytes.len(), "decoded component identity");
    Ok(identity)
}

/// Validate the fixed 6-byte header and return the platform it advertises.
/// Any mismatch is a hard failure; the decoder never guesses.
fn validate_header(bytes: &[u8]) -> Result<Platform, FormatError> {
    if bytes.len() < wire::HEADER_LEN {
        return Err(FormatError::BadHeader {
            found: bytes.to_vec(),
        });
    }
    let header = &bytes[..wire::HEADER_LEN];
    if header[0..2] != wire::EYECATCHER {
        return Err(FormatError::BadHeader {
            found: header.to_vec(),
        });
    }
    let platform_code = u16::from_be_bytes([header[2], header[3]]);
    let version = u16::from_be_bytes([header[4], header[5]]);
    let platform = Platform::from_code(platform_code).ok_or_else(|| FormatError::BadHeader {
        found: header.to_vec(),
    })?;
    if version != wire::VERSION {
        return Err(FormatError::BadHeader {
            found: header.to_vec(),
        });
    }
    Ok(platform)
}

fn read_name_bytes(bytes: &[u8]) -> Result<ComponentName, KernelError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| FormatError::Malformed(format!("name block is not UTF-8: {e}")))?;
    text.parse::<ComponentName>()
        .map_err(|e| FormatError::Malformed(e).into())
}

fn resolve(
    resolver: &dyn ComponentResolver,
    name: &ComponentName,
) -> Result<super::ResolvedComponent, KernelError> {
    resolver
        .resolve_component(name)
        .ok_or_else(|| NotInstalledError::component(name.to_string()).into())
}

fn decode_key(reader: &mut ByteReader<'_>) -> Result<Option<PrimaryKey>, KernelError> {
    let tag = reader.read_u8().map_err(KernelError::Format)?;
    let key = match tag {
        wire::KEY_ABSENT => None,
        wire::KEY_SERIALIZED => Some(PrimaryKey::Serialized(
            reader.read_block().map_err(KernelError::Format)?.to_vec(),
        )),
        wire::KEY_INT32 => Some(PrimaryKey::Int32(
            reader.read_i32().map_err(KernelError::Format)?,
        )),
        wire::KEY_UTF8 => {
            let bytes = reader.read_block().map_err(KernelError::Format)?;
            let text = std::str::from_utf8(bytes)
                .map_err(|e| FormatError::Malformed(format!("string key is not UTF-8: {e}")))?;
            Some(PrimaryKey::Utf8(text.to_string()))
        }
        wire::KEY_INT64 => Some(PrimaryKey::Int64(
            reader.read_i64().map_err(KernelError::Format)?,
        )),
        wire::KEY_BYTES => Some(PrimaryKey::Bytes(
            reader.read_block().map_err(KernelError::Format)?.to_vec(),
        )),
        unknown => return Err(FormatError::UnsupportedKeyTag(unknown).into()),
    };
    Ok(key)
}
