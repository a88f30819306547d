//! Block announcements: candidate blocks reported by rovers.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;
use crate::types::{BlockHash, RoverId};

/// A candidate block reported by a rover.
///
/// The payload is carried through to the collection sink untouched. The gate
/// never looks inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockAnnouncement {
    /// Hash of the block on its foreign chain.
    pub hash: BlockHash,
    /// Height of the block on its foreign chain.
    pub height: u64,
    /// The rover that reported the block.
    pub rover: RoverId,
    /// Raw encoded block.
    pub payload: Bytes,
}

impl BlockAnnouncement {
    /// Create a new announcement.
    pub fn new(
        rover: impl Into<RoverId>,
        hash: impl Into<BlockHash>,
        height: u64,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            hash: hash.into(),
            height,
            rover: rover.into(),
            payload: payload.into(),
        }
    }

    /// Check the fields the gate relies on for routing.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.rover.is_empty() {
            return Err(ValidationError::EmptyField("rover"));
        }
        if self.hash.is_empty() {
            return Err(ValidationError::EmptyField("hash"));
        }
        Ok(())
    }

    /// Content fingerprint over every field.
    ///
    /// Two deliveries of the same block from the same rover share a
    /// fingerprint.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"rover-gate-announcement-v0:");
        hasher.update(self.rover.as_str().as_bytes());
        hasher.update(b":");
        hasher.update(self.hash.as_str().as_bytes());
        hasher.update(b":");
        hasher.update(&self.height.to_be_bytes());
        hasher.update(&self.payload);
        Fingerprint(*hasher.finalize().as_bytes())
    }
}

/// Blake3 fingerprint of an announcement.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub [u8; 32]);

impl Fingerprint {
    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl TryFrom<&[u8]> for Fingerprint {
    type Error = std::array::TryFromSliceError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; 32] = slice.try_into()?;
        Ok(Self(arr))
    }
}
