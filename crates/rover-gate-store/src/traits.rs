//! Store trait: the abstract interface for everything the gate persists.
//!
//! The gate is storage-agnostic. Implementations include SQLite (primary)
//! and in-memory (for tests).

use async_trait::async_trait;
use rover_gate_core::{
    AdmissionState, BlockAnnouncement, BlockHash, ChainNamespace, Fingerprint, RoverId, TxRef,
    LATEST_BLOCK_KEY,
};

use crate::error::{Result, StoreError};

/// Result of appending an announcement to the block buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendResult {
    /// The announcement was appended at `seq`.
    Appended { seq: u64 },
    /// The same announcement is already buffered for this rover.
    AlreadyBuffered { seq: u64 },
}

impl AppendResult {
    /// Sequence number of the buffered entry, new or existing.
    pub fn seq(&self) -> u64 {
        match self {
            AppendResult::Appended { seq } | AppendResult::AlreadyBuffered { seq } => *seq,
        }
    }
}

/// An announcement held in the durable buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedBlock {
    /// Store-wide increasing sequence number. Orders blocks within a rover.
    pub seq: u64,
    /// The buffered announcement.
    pub announcement: BlockAnnouncement,
    /// Fingerprint used to detect re-delivery.
    pub fingerprint: Fingerprint,
    /// When the block was buffered (Unix ms).
    pub buffered_at: i64,
}

/// The Store trait: async interface for gate persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Key-Value Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Read a raw value.
    async fn get_value(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write a raw value, replacing any previous one.
    async fn put_value(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove a value. Removing a missing key is not an error.
    async fn delete_value(&self, key: &str) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Block Buffer Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Append an announcement to its rover's buffer.
    ///
    /// # Returns
    /// - `Appended` with the new sequence number.
    /// - `AlreadyBuffered` if an identical announcement from the same rover
    ///   is still waiting.
    async fn append_buffered(&self, announcement: &BlockAnnouncement) -> Result<AppendResult>;

    /// Oldest `limit` buffered blocks for a rover, ordered by seq.
    async fn peek_buffered(&self, rover: &RoverId, limit: usize) -> Result<Vec<BufferedBlock>>;

    /// Remove one buffered block after it has been replayed.
    async fn remove_buffered(&self, rover: &RoverId, seq: u64) -> Result<()>;

    /// Number of blocks buffered for a rover.
    async fn buffered_count(&self, rover: &RoverId) -> Result<usize>;

    /// Rovers with at least one buffered block, oldest first.
    async fn buffered_rovers(&self) -> Result<Vec<RoverId>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Settlement Ledger Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Record the height of a block hash. The first recorded height wins.
    async fn record_block(&self, hash: &BlockHash, height: u64) -> Result<()>;

    /// Height of a recorded block hash.
    async fn block_height(&self, hash: &BlockHash) -> Result<Option<u64>>;

    /// Start tracking an unsettled transaction that settles at `settles_at`.
    /// The first tracked settle height wins.
    async fn track_unsettled(&self, tx: &TxRef, settles_at: u64) -> Result<()>;

    /// Settle heights for the tracked subset of `txs`.
    async fn settle_heights(&self, txs: &[TxRef]) -> Result<Vec<(TxRef, u64)>>;
}

/// Typed access to the well-known keys shared with the miner.
pub trait StoreExt: Store {
    /// Read the miner's exclusive-hold flag. `None` if it was never written.
    fn admission_state(
        &self,
        namespace: &ChainNamespace,
    ) -> impl std::future::Future<Output = Result<Option<AdmissionState>>> + Send;

    /// Write the miner's exclusive-hold flag.
    fn set_admission_state(
        &self,
        namespace: &ChainNamespace,
        state: AdmissionState,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Height of the latest local block, read from [`LATEST_BLOCK_KEY`].
    /// `None` before the first block.
    fn latest_block_height(&self) -> impl std::future::Future<Output = Result<Option<u64>>> + Send;

    /// Record the height of the latest local block.
    fn set_latest_block_height(
        &self,
        height: u64,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

impl<S: Store + ?Sized> StoreExt for S {
    async fn admission_state(&self, namespace: &ChainNamespace) -> Result<Option<AdmissionState>> {
        let key = namespace.miner_mutex_key();
        match self.get_value(&key).await? {
            Some(raw) => AdmissionState::from_bytes(&raw)
                .map(Some)
                .map_err(|e| StoreError::InvalidData(format!("{}: {}", key, e))),
            None => Ok(None),
        }
    }

    async fn set_admission_state(
        &self,
        namespace: &ChainNamespace,
        state: AdmissionState,
    ) -> Result<()> {
        self.put_value(&namespace.miner_mutex_key(), state.as_str().as_bytes())
            .await
    }

    async fn latest_block_height(&self) -> Result<Option<u64>> {
        let key = LATEST_BLOCK_KEY;
        let Some(raw) = self.get_value(key).await? else {
            return Ok(None);
        };

        let text = std::str::from_utf8(&raw)
            .map_err(|e| StoreError::InvalidData(format!("{}: {}", key, e)))?;
        text.trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| StoreError::InvalidData(format!("{}: {}", key, e)))
    }

    async fn set_latest_block_height(&self, height: u64) -> Result<()> {
        self.put_value(LATEST_BLOCK_KEY, height.to_string().as_bytes())
            .await
    }
}
