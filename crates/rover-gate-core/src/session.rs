//! What rovers report about themselves.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

/// Identifier issued to a rover each time it joins.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl SessionId {
    /// Create from a raw value.
    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({:016x})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// A rover's last reported sync status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Still catching up with its foreign chain.
    Syncing,
    /// At the tip of its foreign chain.
    Synced,
}

impl SyncStatus {
    /// Check if the rover is at the tip.
    pub fn is_synced(&self) -> bool {
        matches!(self, SyncStatus::Synced)
    }
}

impl From<bool> for SyncStatus {
    fn from(synced: bool) -> Self {
        if synced {
            SyncStatus::Synced
        } else {
            SyncStatus::Syncing
        }
    }
}

/// An inclusive range of foreign-chain heights a rover has covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRange {
    pub start: u64,
    pub end: u64,
}

impl BlockRange {
    /// Create a range, rejecting `start > end`.
    pub fn new(start: u64, end: u64) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::InvalidBlockRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Number of heights covered.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// A valid range always covers at least one height.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Check if a height falls inside the range.
    pub fn contains(&self, height: u64) -> bool {
        self.start <= height && height <= self.end
    }
}
