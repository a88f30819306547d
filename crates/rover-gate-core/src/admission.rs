//! The admission state machine shared with the miner.
//!
//! The miner writes one of three values to the mutex key; the gate only
//! reads it. `closed` and `open` are distinct phases of the miner's own
//! lifecycle (idle and just-released) but both mean nobody holds the lock.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// The miner's exclusive-hold flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdmissionState {
    /// No miner lock. Blocks may pass.
    Closed,
    /// Miner released its lock. Blocks may pass.
    Open,
    /// Miner is assembling a block. Blocks must be buffered.
    Pending,
}

impl AdmissionState {
    /// All states, for exhaustive iteration.
    pub const ALL: [AdmissionState; 3] = [
        AdmissionState::Closed,
        AdmissionState::Open,
        AdmissionState::Pending,
    ];

    /// The stored text form.
    pub fn as_str(&self) -> &'static str {
        match self {
            AdmissionState::Closed => "closed",
            AdmissionState::Open => "open",
            AdmissionState::Pending => "pending",
        }
    }

    /// Decode the stored byte form.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, CoreError> {
        let text = std::str::from_utf8(raw)
            .map_err(|e| CoreError::DecodingError(format!("admission state: {}", e)))?;
        text.parse()
    }
}

impl FromStr for AdmissionState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "closed" => Ok(AdmissionState::Closed),
            "open" => Ok(AdmissionState::Open),
            "pending" => Ok(AdmissionState::Pending),
            other => Err(CoreError::UnknownAdmissionState(other.to_string())),
        }
    }
}

impl fmt::Display for AdmissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do with an incoming block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    /// Forward to the collection sink now.
    Pass,
    /// Append to the durable buffer for later replay.
    Buffer,
}

/// Map an admission state to a decision.
pub fn decide(state: AdmissionState) -> Decision {
    match state {
        AdmissionState::Closed | AdmissionState::Open => Decision::Pass,
        AdmissionState::Pending => Decision::Buffer,
    }
}
