//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use rover_gate_core::{now_millis, BlockAnnouncement, BlockHash, RoverId, TxRef};

use crate::error::{Result, StoreError};
use crate::traits::{AppendResult, BufferedBlock, Store};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

struct MemoryStoreInner {
    /// Raw key-value entries.
    values: HashMap<String, Vec<u8>>,

    /// Per-rover buffers: rover -> seq -> block.
    buffers: HashMap<RoverId, BTreeMap<u64, BufferedBlock>>,

    /// Next buffer sequence number.
    next_seq: u64,

    /// Ledger: block hash -> height.
    block_heights: HashMap<BlockHash, u64>,

    /// Ledger: tx ref -> settle height.
    settle_heights: HashMap<TxRef, u64>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner {
                values: HashMap::new(),
                buffers: HashMap::new(),
                next_seq: 1,
                block_heights: HashMap::new(),
                settle_heights: HashMap::new(),
            }),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_value(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let inner = self.read()?;
        Ok(inner.values.get(key).cloned())
    }

    async fn put_value(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut inner = self.write()?;
        inner.values.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete_value(&self, key: &str) -> Result<()> {
        let mut inner = self.write()?;
        inner.values.remove(key);
        Ok(())
    }

    async fn append_buffered(&self, announcement: &BlockAnnouncement) -> Result<AppendResult> {
        let mut inner = self.write()?;
        let fingerprint = announcement.fingerprint();

        if let Some(existing) = inner
            .buffers
            .get(&announcement.rover)
            .and_then(|buf| buf.values().find(|b| b.fingerprint == fingerprint))
        {
            return Ok(AppendResult::AlreadyBuffered { seq: existing.seq });
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;

        inner
            .buffers
            .entry(announcement.rover.clone())
            .or_default()
            .insert(
                seq,
                BufferedBlock {
                    seq,
                    announcement: announcement.clone(),
                    fingerprint,
                    buffered_at: now_millis(),
                },
            );

        Ok(AppendResult::Appended { seq })
    }

    async fn peek_buffered(&self, rover: &RoverId, limit: usize) -> Result<Vec<BufferedBlock>> {
        let inner = self.read()?;
        Ok(inner
            .buffers
            .get(rover)
            .map(|buf| buf.values().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn remove_buffered(&self, rover: &RoverId, seq: u64) -> Result<()> {
        let mut inner = self.write()?;
        if let Some(buf) = inner.buffers.get_mut(rover) {
            buf.remove(&seq);
            if buf.is_empty() {
                inner.buffers.remove(rover);
            }
        }
        Ok(())
    }

    async fn buffered_count(&self, rover: &RoverId) -> Result<usize> {
        let inner = self.read()?;
        Ok(inner.buffers.get(rover).map(|buf| buf.len()).unwrap_or(0))
    }

    async fn buffered_rovers(&self) -> Result<Vec<RoverId>> {
        let inner = self.read()?;

        let mut oldest: Vec<(u64, RoverId)> = inner
            .buffers
            .iter()
            .filter_map(|(rover, buf)| buf.keys().next().map(|seq| (*seq, rover.clone())))
            .collect();

        oldest.sort_by_key(|(seq, _)| *seq);
        Ok(oldest.into_iter().map(|(_, rover)| rover).collect())
    }

    async fn record_block(&self, hash: &BlockHash, height: u64) -> Result<()> {
        let mut inner = self.write()?;
        inner.block_heights.entry(hash.clone()).or_insert(height);
        Ok(())
    }

    async fn block_height(&self, hash: &BlockHash) -> Result<Option<u64>> {
        let inner = self.read()?;
        Ok(inner.block_heights.get(hash).copied())
    }

    async fn track_unsettled(&self, tx: &TxRef, settles_at: u64) -> Result<()> {
        let mut inner = self.write()?;
        inner.settle_heights.entry(tx.clone()).or_insert(settles_at);
        Ok(())
    }

    async fn settle_heights(&self, txs: &[TxRef]) -> Result<Vec<(TxRef, u64)>> {
        let inner = self.read()?;
        Ok(txs
            .iter()
            .filter_map(|tx| inner.settle_heights.get(tx).map(|h| (tx.clone(), *h)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::StoreExt;
    use rover_gate_core::{AdmissionState, ChainNamespace};

    fn block(rover: &str, height: u64) -> BlockAnnouncement {
        BlockAnnouncement::new(
            rover,
            format!("{}-{}", rover, height),
            height,
            format!("payload {}", height).into_bytes(),
        )
    }

    #[tokio::test]
    async fn test_memory_store_buffer_fifo() {
        let store = MemoryStore::new();
        let rover = RoverId::from("eth");

        for h in 1..=3 {
            store.append_buffered(&block("eth", h)).await.unwrap();
        }

        let heights: Vec<u64> = store
            .peek_buffered(&rover, 10)
            .await
            .unwrap()
            .iter()
            .map(|b| b.announcement.height)
            .collect();
        assert_eq!(heights, vec![1, 2, 3]);
        assert_eq!(store.buffered_count(&rover).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_memory_store_append_idempotent() {
        let store = MemoryStore::new();
        let a = block("btc", 10);

        let r1 = store.append_buffered(&a).await.unwrap();
        let r2 = store.append_buffered(&a).await.unwrap();

        assert!(matches!(r1, AppendResult::Appended { .. }));
        assert_eq!(r2, AppendResult::AlreadyBuffered { seq: r1.seq() });
        assert_eq!(store.buffered_count(&a.rover).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_remove_clears_rover() {
        let store = MemoryStore::new();
        let seq = store.append_buffered(&block("lsk", 1)).await.unwrap().seq();
        store.append_buffered(&block("neo", 1)).await.unwrap();

        assert_eq!(
            store.buffered_rovers().await.unwrap(),
            vec![RoverId::from("lsk"), RoverId::from("neo")]
        );

        store.remove_buffered(&RoverId::from("lsk"), seq).await.unwrap();
        assert_eq!(
            store.buffered_rovers().await.unwrap(),
            vec![RoverId::from("neo")]
        );
    }

    #[tokio::test]
    async fn test_memory_store_ledger_first_write_wins() {
        let store = MemoryStore::new();
        let hash = BlockHash::from("0xaa");
        let tx = TxRef::from("tx1");

        store.record_block(&hash, 5).await.unwrap();
        store.record_block(&hash, 9).await.unwrap();
        assert_eq!(store.block_height(&hash).await.unwrap(), Some(5));

        store.track_unsettled(&tx, 12).await.unwrap();
        store.track_unsettled(&tx, 3).await.unwrap();
        let heights = store
            .settle_heights(&[tx.clone(), TxRef::from("unknown")])
            .await
            .unwrap();
        assert_eq!(heights, vec![(tx, 12)]);
    }

    #[tokio::test]
    async fn test_memory_store_typed_keys() {
        let store = MemoryStore::new();
        let ns = ChainNamespace::default();

        assert_eq!(store.admission_state(&ns).await.unwrap(), None);
        store
            .set_admission_state(&ns, AdmissionState::Open)
            .await
            .unwrap();
        assert_eq!(
            store.admission_state(&ns).await.unwrap(),
            Some(AdmissionState::Open)
        );

        store.put_value(&ns.miner_mutex_key(), b"bogus").await.unwrap();
        assert!(matches!(
            store.admission_state(&ns).await,
            Err(StoreError::InvalidData(_))
        ));

        store.set_latest_block_height(42).await.unwrap();
        assert_eq!(store.latest_block_height().await.unwrap(), Some(42));
        assert_eq!(
            store.get_value("bc.block.latest").await.unwrap(),
            Some(b"42".to_vec())
        );
    }
}
