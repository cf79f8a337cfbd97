//! # Persistence Format
//!
//! Binary snapshot of a `MemoryStore`, used by the `file` backend.
//!
//! Format: Header (5 bytes) + postcard-serialized store.
//! - 4 bytes: Magic ("MASQ")
//! - 1 byte: Version
//!
//! Size and header are validated before the payload is decoded, so a
//! truncated or foreign file is rejected without allocating for it.

use crate::storage::MemoryStore;
use crate::{MasqError, primitives};

/// Maximum accepted snapshot size.
pub const MAX_PERSISTENCE_PAYLOAD_SIZE: usize = 1024 * 1024 * 1024; // 1 GB

/// Header length in bytes.
const HEADER_LEN: usize = 5;

// =============================================================================
// FILE HEADER
// =============================================================================

/// The persistence header precedes all store data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl PersistenceHeader {
    /// Create a new header with current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    pub fn validate(&self) -> Result<(), MasqError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(MasqError::SerializationError(
                "not a masq snapshot (bad magic bytes)".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(MasqError::SerializationError(format!(
                "unsupported snapshot version {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MasqError> {
        let Some(header) = bytes.get(..HEADER_LEN) else {
            return Err(MasqError::SerializationError(
                "snapshot header too short".to_string(),
            ));
        };
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&header[0..4]);
        Ok(Self {
            magic,
            version: header[4],
        })
    }
}

impl Default for PersistenceHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Serialize a store to bytes (header + payload).
pub fn store_to_bytes(store: &MemoryStore) -> Result<Vec<u8>, MasqError> {
    let payload =
        postcard::to_stdvec(store).map_err(|e| MasqError::SerializationError(e.to_string()))?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(&PersistenceHeader::new().to_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Deserialize a store from bytes.
pub fn store_from_bytes(bytes: &[u8]) -> Result<MemoryStore, MasqError> {
    if bytes.len() > MAX_PERSISTENCE_PAYLOAD_SIZE {
        return Err(MasqError::SerializationError(format!(
            "snapshot of {} bytes exceeds the {} byte limit",
            bytes.len(),
            MAX_PERSISTENCE_PAYLOAD_SIZE
        )));
    }
    PersistenceHeader::from_bytes(bytes)?.validate()?;

    let payload = bytes.get(HEADER_LEN..).unwrap_or_default();
    postcard::from_bytes(payload)
        .map_err(|e| MasqError::SerializationError(format!("corrupt snapshot: {e}")))
}

// =============================================================================
// TESTS
// =============================================================================
