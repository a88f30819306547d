//! Wire messages of the collector service.
//!
//! Field names are camelCase on the wire. Hashes and payloads travel as hex
//! text.

use std::collections::BTreeSet;

use rover_gate_core::{
    BlockAnnouncement, BlockHash, BlockRange, RoverId, SessionId, SyncStatus, TxRef,
    ValidationError,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Message size limits.
pub mod limits {
    /// Max transactions in one settlement check.
    pub const MAX_POSSIBLE_TRANSACTIONS: usize = 10_000;
    /// Max decoded payload bytes in one block message.
    pub const MAX_PAYLOAD_BYTES: usize = 4 * 1024 * 1024;
}

/// Decode a JSON wire message.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ValidationError> {
    serde_json::from_slice(bytes).map_err(|e| ValidationError::Malformed(e.to_string()))
}

/// Encode a wire message as JSON.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, ValidationError> {
    serde_json::to_vec(message).map_err(|e| ValidationError::Malformed(e.to_string()))
}

/// A block as reported by a rover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockMessage {
    /// Name of the chain, which is also the reporting rover's name.
    pub blockchain: String,
    pub hash: String,
    #[serde(default)]
    pub previous_hash: String,
    pub height: u64,
    /// Block timestamp on its own chain (Unix ms).
    #[serde(default)]
    pub timestamp: u64,
    /// Raw block body, hex encoded. Passed through untouched.
    #[serde(default)]
    pub payload: String,
}

impl BlockMessage {
    /// Convert into an announcement for the intake pipeline.
    pub fn into_announcement(self) -> Result<BlockAnnouncement, ValidationError> {
        let payload = hex::decode(&self.payload).map_err(|e| ValidationError::InvalidHex {
            field: "payload",
            reason: e.to_string(),
        })?;
        if payload.len() > limits::MAX_PAYLOAD_BYTES {
            return Err(ValidationError::Malformed(format!(
                "payload of {} bytes exceeds {}",
                payload.len(),
                limits::MAX_PAYLOAD_BYTES
            )));
        }

        let announcement =
            BlockAnnouncement::new(self.blockchain, self.hash, self.height, payload);
        announcement.validate()?;
        Ok(announcement)
    }
}

/// `IsBeforeSettleHeight` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleTxCheckRequest {
    pub possible_transactions: Vec<String>,
    pub block_hash: String,
}

impl SettleTxCheckRequest {
    /// Check the request and return its candidate set and block hash.
    ///
    /// Candidates must be unique and non-empty.
    pub fn validate(&self) -> Result<(BTreeSet<TxRef>, BlockHash), ValidationError> {
        if self.block_hash.is_empty() {
            return Err(ValidationError::EmptyField("blockHash"));
        }
        if self.possible_transactions.len() > limits::MAX_POSSIBLE_TRANSACTIONS {
            return Err(ValidationError::Malformed(format!(
                "{} possible transactions exceeds {}",
                self.possible_transactions.len(),
                limits::MAX_POSSIBLE_TRANSACTIONS
            )));
        }

        let mut candidates = BTreeSet::new();
        for tx in &self.possible_transactions {
            if tx.is_empty() {
                return Err(ValidationError::EmptyField("possibleTransactions"));
            }
            if !candidates.insert(TxRef::from(tx.as_str())) {
                return Err(ValidationError::DuplicateReference(tx.clone()));
            }
        }

        Ok((candidates, BlockHash::from(self.block_hash.as_str())))
    }
}

/// `IsBeforeSettleHeight` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleTxCheckResponse {
    pub marked_transactions: Vec<String>,
}

impl From<BTreeSet<TxRef>> for SettleTxCheckResponse {
    fn from(settled: BTreeSet<TxRef>) -> Self {
        Self {
            marked_transactions: settled.into_iter().map(|tx| tx.as_str().to_owned()).collect(),
        }
    }
}

/// `Join` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub rover_name: String,
}

impl JoinRequest {
    pub fn rover(&self) -> Result<RoverId, ValidationError> {
        rover_id(&self.rover_name)
    }
}

/// `Join` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub rover_name: String,
    /// Session id as 16 hex digits.
    pub session_id: String,
    /// Unix ms.
    pub joined_at: i64,
}

impl JoinResponse {
    pub fn new(rover: &RoverId, session_id: SessionId, joined_at: i64) -> Self {
        Self {
            rover_name: rover.as_str().to_owned(),
            session_id: session_id.to_string(),
            joined_at,
        }
    }
}

/// `ReportSyncStatus` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoverSyncStatus {
    pub rover_name: String,
    /// `true` once the rover has caught up with its chain.
    pub status: bool,
}

impl RoverSyncStatus {
    pub fn parts(&self) -> Result<(RoverId, SyncStatus), ValidationError> {
        Ok((rover_id(&self.rover_name)?, SyncStatus::from(self.status)))
    }
}

/// `ReportBlockRange` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoverBlockRange {
    pub rover_name: String,
    pub lowest_height: u64,
    pub highest_height: u64,
}

impl RoverBlockRange {
    pub fn parts(&self) -> Result<(RoverId, BlockRange), ValidationError> {
        let range = BlockRange::new(self.lowest_height, self.highest_height)?;
        Ok((rover_id(&self.rover_name)?, range))
    }
}

/// `GetNrgSupply` response. The amount is a decimal string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetNrgSupplyResponse {
    pub amount: String,
}

impl From<u128> for GetNrgSupplyResponse {
    fn from(amount: u128) -> Self {
        Self {
            amount: amount.to_string(),
        }
    }
}

/// Empty acknowledgement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Null {}

fn rover_id(name: &str) -> Result<RoverId, ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyField("roverName"));
    }
    Ok(RoverId::from(name))
}
