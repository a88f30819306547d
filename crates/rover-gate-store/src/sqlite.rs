//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for the rover gate. It uses
//! rusqlite with bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use rover_gate_core::{now_millis, BlockAnnouncement, BlockHash, Fingerprint, RoverId, TxRef};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{AppendResult, BufferedBlock, Store};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Poisoned(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Blocking(e.to_string()))?
    }
}

fn encode_announcement(announcement: &BlockAnnouncement) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(announcement, &mut buf)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode_announcement(raw: &[u8]) -> Result<BlockAnnouncement> {
    ciborium::from_reader(raw).map_err(|e| StoreError::Serialization(e.to_string()))
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_value(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let key = key.to_string();

        self.run(move |conn| {
            conn.query_row(
                "SELECT value FROM kv WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn put_value(&self, key: &str, value: &[u8]) -> Result<()> {
        let key = key.to_string();
        let value = value.to_vec();

        self.run(move |conn| {
            conn.execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                                updated_at = excluded.updated_at",
                params![key, value, now_millis()],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete_value(&self, key: &str) -> Result<()> {
        let key = key.to_string();

        self.run(move |conn| {
            conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
            Ok(())
        })
        .await
    }

    async fn append_buffered(&self, announcement: &BlockAnnouncement) -> Result<AppendResult> {
        let rover = announcement.rover.as_str().to_string();
        let fingerprint = announcement.fingerprint();
        let encoded = encode_announcement(announcement)?;

        self.run(move |conn| {
            let existing: Option<i64> = conn
                .query_row(
                    "SELECT seq FROM block_buffer WHERE rover = ?1 AND fingerprint = ?2",
                    params![rover, fingerprint.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(seq) = existing {
                return Ok(AppendResult::AlreadyBuffered { seq: seq as u64 });
            }

            conn.execute(
                "INSERT INTO block_buffer (rover, fingerprint, announcement, buffered_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    rover,
                    fingerprint.as_bytes().as_slice(),
                    encoded,
                    now_millis()
                ],
            )?;

            Ok(AppendResult::Appended {
                seq: conn.last_insert_rowid() as u64,
            })
        })
        .await
    }

    async fn peek_buffered(&self, rover: &RoverId, limit: usize) -> Result<Vec<BufferedBlock>> {
        let rover = rover.as_str().to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows: Vec<(i64, Vec<u8>, Vec<u8>, i64)> = self
            .run(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT seq, fingerprint, announcement, buffered_at
                     FROM block_buffer WHERE rover = ?1
                     ORDER BY seq LIMIT ?2",
                )?;

                let rows = stmt
                    .query_map(params![rover, limit], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;

                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(seq, fingerprint, raw, buffered_at)| {
                let fingerprint = Fingerprint::try_from(fingerprint.as_slice()).map_err(|_| {
                    StoreError::InvalidData(format!("buffered block {} fingerprint", seq))
                })?;
                Ok(BufferedBlock {
                    seq: seq as u64,
                    announcement: decode_announcement(&raw)?,
                    fingerprint,
                    buffered_at,
                })
            })
            .collect()
    }

    async fn remove_buffered(&self, rover: &RoverId, seq: u64) -> Result<()> {
        let rover = rover.as_str().to_string();

        self.run(move |conn| {
            conn.execute(
                "DELETE FROM block_buffer WHERE rover = ?1 AND seq = ?2",
                params![rover, seq as i64],
            )?;
            Ok(())
        })
        .await
    }

    async fn buffered_count(&self, rover: &RoverId) -> Result<usize> {
        let rover = rover.as_str().to_string();

        self.run(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM block_buffer WHERE rover = ?1",
                params![rover],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }

    async fn buffered_rovers(&self) -> Result<Vec<RoverId>> {
        self.run(|conn| {
            let mut stmt = conn.prepare(
                "SELECT rover FROM block_buffer GROUP BY rover ORDER BY MIN(seq)",
            )?;

            let rovers = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .map(|r| r.map(RoverId::from))
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(rovers)
        })
        .await
    }

    async fn record_block(&self, hash: &BlockHash, height: u64) -> Result<()> {
        let hash = hash.as_str().to_string();

        self.run(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO ledger_blocks (block_hash, height, recorded_at)
                 VALUES (?1, ?2, ?3)",
                params![hash, height as i64, now_millis()],
            )?;
            Ok(())
        })
        .await
    }

    async fn block_height(&self, hash: &BlockHash) -> Result<Option<u64>> {
        let hash = hash.as_str().to_string();

        self.run(move |conn| {
            let height: Option<i64> = conn
                .query_row(
                    "SELECT height FROM ledger_blocks WHERE block_hash = ?1",
                    params![hash],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(height.map(|h| h as u64))
        })
        .await
    }

    async fn track_unsettled(&self, tx: &TxRef, settles_at: u64) -> Result<()> {
        let tx = tx.as_str().to_string();

        self.run(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO unsettled_txs (tx_ref, settles_at, tracked_at)
                 VALUES (?1, ?2, ?3)",
                params![tx, settles_at as i64, now_millis()],
            )?;
            Ok(())
        })
        .await
    }

    async fn settle_heights(&self, txs: &[TxRef]) -> Result<Vec<(TxRef, u64)>> {
        let txs = txs.to_vec();

        self.run(move |conn| {
            let mut stmt = conn.prepare("SELECT settles_at FROM unsettled_txs WHERE tx_ref = ?1")?;

            let mut found = Vec::new();
            for tx in txs {
                let height: Option<i64> = stmt
                    .query_row(params![tx.as_str()], |row| row.get(0))
                    .optional()?;
                if let Some(h) = height {
                    found.push((tx, h as u64));
                }
            }
            Ok(found)
        })
        .await
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
            format!("0x{:04x}", height),
            height,
            vec![height as u8; 4],
        )
    }

    #[tokio::test]
    async fn test_sqlite_buffer_roundtrip_fifo() {
        let store = SqliteStore::open_memory().unwrap();
        let rover = RoverId::from("eth");

        for h in [7, 3, 9] {
            store.append_buffered(&block("eth", h)).await.unwrap();
        }

        let buffered = store.peek_buffered(&rover, 2).await.unwrap();
        assert_eq!(buffered.len(), 2);
        assert_eq!(buffered[0].announcement, block("eth", 7));
        assert_eq!(buffered[1].announcement.height, 3);
        assert!(buffered[0].seq < buffered[1].seq);
        assert_eq!(buffered[0].fingerprint, block("eth", 7).fingerprint());

        store.remove_buffered(&rover, buffered[0].seq).await.unwrap();
        assert_eq!(store.buffered_count(&rover).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_sqlite_append_idempotent() {
        let store = SqliteStore::open_memory().unwrap();
        let a = block("btc", 1);

        let first = store.append_buffered(&a).await.unwrap();
        let second = store.append_buffered(&a).await.unwrap();
        assert_eq!(second, AppendResult::AlreadyBuffered { seq: first.seq() });

        // Same block from a different rover is a separate entry.
        let other = BlockAnnouncement { rover: RoverId::from("lsk"), ..a };
        assert!(matches!(
            store.append_buffered(&other).await.unwrap(),
            AppendResult::Appended { .. }
        ));
    }

    #[tokio::test]
    async fn test_sqlite_seq_not_reused_after_remove() {
        let store = SqliteStore::open_memory().unwrap();
        let rover = RoverId::from("neo");

        let s1 = store.append_buffered(&block("neo", 1)).await.unwrap().seq();
        store.remove_buffered(&rover, s1).await.unwrap();
        let s2 = store.append_buffered(&block("neo", 2)).await.unwrap().seq();
        assert!(s2 > s1);
    }

    #[tokio::test]
    async fn test_sqlite_buffered_rovers_oldest_first() {
        let store = SqliteStore::open_memory().unwrap();
        store.append_buffered(&block("wav", 1)).await.unwrap();
        store.append_buffered(&block("btc", 1)).await.unwrap();
        store.append_buffered(&block("wav", 2)).await.unwrap();

        assert_eq!(
            store.buffered_rovers().await.unwrap(),
            vec![RoverId::from("wav"), RoverId::from("btc")]
        );
    }

    #[tokio::test]
    async fn test_sqlite_kv_and_typed_keys() {
        let store = SqliteStore::open_memory().unwrap();
        let ns = ChainNamespace::new("bc");

        assert_eq!(store.get_value("missing").await.unwrap(), None);
        store
            .set_admission_state(&ns, AdmissionState::Pending)
            .await
            .unwrap();
        store
            .set_admission_state(&ns, AdmissionState::Closed)
            .await
            .unwrap();
        assert_eq!(
            store.admission_state(&ns).await.unwrap(),
            Some(AdmissionState::Closed)
        );

        store.delete_value(&ns.miner_mutex_key()).await.unwrap();
        assert_eq!(store.admission_state(&ns).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sqlite_ledger() {
        let store = SqliteStore::open_memory().unwrap();
        let hash = BlockHash::from("0xbeef");

        store.record_block(&hash, 100).await.unwrap();
        store.record_block(&hash, 1).await.unwrap();
        assert_eq!(store.block_height(&hash).await.unwrap(), Some(100));
        assert_eq!(store.block_height(&BlockHash::from("0x0")).await.unwrap(), None);

        store.track_unsettled(&TxRef::from("a"), 50).await.unwrap();
        store.track_unsettled(&TxRef::from("b"), 150).await.unwrap();
        let heights = store
            .settle_heights(&[TxRef::from("a"), TxRef::from("b"), TxRef::from("c")])
            .await
            .unwrap();
        assert_eq!(
            heights,
            vec![(TxRef::from("a"), 50), (TxRef::from("b"), 150)]
        );
    }

    #[tokio::test]
    async fn test_sqlite_buffer_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gate.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.append_buffered(&block("eth", 5)).await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let buffered = store.peek_buffered(&RoverId::from("eth"), 10).await.unwrap();
        assert_eq!(buffered.len(), 1);
        assert_eq!(buffered[0].announcement, block("eth", 5));
    }
}
