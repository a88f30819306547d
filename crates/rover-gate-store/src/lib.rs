//! # Rover Gate Store
//!
//! Storage abstraction for the rover gate. Everything the gate shares with
//! other processes lives behind the [`Store`] trait: the key-value entries the
//! miner writes, the durable per-rover block buffer, and the unsettled
//! transaction ledger.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`StoreExt`] - Typed access to the mutex and latest-block keys
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`BufferedBlock`] - An announcement waiting for replay
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rover_gate_core::{AdmissionState, ChainNamespace};
//! use rover_gate_store::{SqliteStore, StoreExt};
//!
//! async fn example() {
//!     let store = SqliteStore::open("gate.db").unwrap();
//!     let ns = ChainNamespace::default();
//!
//!     store.set_admission_state(&ns, AdmissionState::Pending).await.unwrap();
//!     let state = store.admission_state(&ns).await.unwrap();
//!     assert_eq!(state, Some(AdmissionState::Pending));
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **FIFO per rover**: buffered blocks carry a store-wide increasing
//!   sequence number and are always read back in sequence order
//! - **Idempotent appends**: buffering the same announcement twice for a
//!   rover returns the existing sequence number
//! - **Append-only ledger**: the first recorded height for a block hash or
//!   settle height for a transaction wins

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{AppendResult, BufferedBlock, Store, StoreExt};
