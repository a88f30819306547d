//! Settlement checks against the unsettled-transaction ledger.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use rover_gate_core::{BlockHash, TxRef};
use rover_gate_store::Store;
use tracing::debug;

use crate::error::{GateError, Result};

/// A ledger that knows when transactions settle.
#[async_trait]
pub trait SettlementLedger: Send + Sync {
    /// Which of `candidates` are settled as of `block_hash`.
    ///
    /// An unknown block hash settles nothing.
    async fn settled_as_of(
        &self,
        candidates: &BTreeSet<TxRef>,
        block_hash: &BlockHash,
    ) -> Result<BTreeSet<TxRef>>;
}

#[async_trait]
impl<L: SettlementLedger + ?Sized> SettlementLedger for Arc<L> {
    async fn settled_as_of(
        &self,
        candidates: &BTreeSet<TxRef>,
        block_hash: &BlockHash,
    ) -> Result<BTreeSet<TxRef>> {
        (**self).settled_as_of(candidates, block_hash).await
    }
}

/// Ledger backed by the store's block heights and tracked transactions.
///
/// A transaction is settled as of a block once it is tracked and its settle
/// height is at or below that block's height.
pub struct StoreLedger<S: Store> {
    store: Arc<S>,
}

impl<S: Store> StoreLedger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Record a block so later checks can refer to it by hash.
    pub async fn record_block(&self, hash: &BlockHash, height: u64) -> Result<()> {
        Ok(self.store.record_block(hash, height).await?)
    }

    /// Track a transaction that settles at `settles_at`.
    pub async fn track(&self, tx: &TxRef, settles_at: u64) -> Result<()> {
        Ok(self.store.track_unsettled(tx, settles_at).await?)
    }
}

#[async_trait]
impl<S: Store> SettlementLedger for StoreLedger<S> {
    async fn settled_as_of(
        &self,
        candidates: &BTreeSet<TxRef>,
        block_hash: &BlockHash,
    ) -> Result<BTreeSet<TxRef>> {
        let height = match self.store.block_height(block_hash).await {
            Ok(Some(h)) => h,
            Ok(None) => return Ok(BTreeSet::new()),
            Err(e) => return Err(GateError::StateRead(e.to_string())),
        };

        let txs: Vec<TxRef> = candidates.iter().cloned().collect();
        let heights = self
            .store
            .settle_heights(&txs)
            .await
            .map_err(|e| GateError::StateRead(e.to_string()))?;

        Ok(heights
            .into_iter()
            .filter(|(_, settles_at)| *settles_at <= height)
            .map(|(tx, _)| tx)
            .collect())
    }
}

/// Classifies candidate transactions as settled or pending.
pub struct SettlementChecker<L: SettlementLedger> {
    ledger: L,
}

impl<L: SettlementLedger> SettlementChecker<L> {
    pub fn new(ledger: L) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// The settled subset of `candidates` as of `block_hash`.
    ///
    /// The result is always a subset of `candidates`. No lock is taken.
    pub async fn check_settlement(
        &self,
        candidates: &BTreeSet<TxRef>,
        block_hash: &BlockHash,
    ) -> Result<BTreeSet<TxRef>> {
        if candidates.is_empty() {
            return Ok(BTreeSet::new());
        }

        let settled = self.ledger.settled_as_of(candidates, block_hash).await?;
        let settled: BTreeSet<TxRef> = settled.intersection(candidates).cloned().collect();

        debug!(
            %block_hash,
            candidates = candidates.len(),
            settled = settled.len(),
            "settlement checked"
        );
        Ok(settled)
    }
}
