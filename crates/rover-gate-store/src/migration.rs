//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rover_gate_core::now_millis;
use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
        tracing::debug!(from = current, to = CURRENT_VERSION, "migrated gate schema");
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Shared key-value entries (miner mutex, latest block, ...)
        CREATE TABLE kv (
            key TEXT PRIMARY KEY,
            value BLOB NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Announcements held back while the miner has the lock
        CREATE TABLE block_buffer (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,  -- never reused, orders replay
            rover TEXT NOT NULL,
            fingerprint BLOB NOT NULL,             -- 32 bytes, Blake3
            announcement BLOB NOT NULL,            -- CBOR BlockAnnouncement
            buffered_at INTEGER NOT NULL,

            UNIQUE(rover, fingerprint)
        );

        -- Settlement ledger: heights of known blocks
        CREATE TABLE ledger_blocks (
            block_hash TEXT PRIMARY KEY,
            height INTEGER NOT NULL,
            recorded_at INTEGER NOT NULL
        );

        -- Settlement ledger: unsettled transactions and where they settle
        CREATE TABLE unsettled_txs (
            tx_ref TEXT PRIMARY KEY,
            settles_at INTEGER NOT NULL,
            tracked_at INTEGER NOT NULL
        );

        CREATE INDEX idx_block_buffer_rover_seq ON block_buffer(rover, seq);
        "#,
    )?;

    Ok(())
}
