//! # Rover Gate
//!
//! Server-side gate between rovers and the block collector.
//!
//! ## Overview
//!
//! Rovers watch foreign chains and stream the blocks they see. The gate:
//!
//! - **Admits blocks**: each block is forwarded to the collection sink or,
//!   while the miner holds its mutex, buffered durably and replayed later in
//!   per-rover order
//! - **Answers settlement checks**: which of a batch of transactions are
//!   settled as of a given block
//! - **Tracks rover sessions**: join, sync status, reported block range
//! - **Reports NRG supply** from the latest block height
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rover_gate::{CollectorService, GateConfig};
//! use rover_gate::intake::RecordingSink;
//! use rover_gate::messages::{BlockMessage, JoinRequest};
//!
//! async fn example() {
//!     let config = GateConfig::from_env().unwrap();
//!     let store = Arc::new(config.open_store().unwrap());
//!     let service = CollectorService::new(store, RecordingSink::new(), config);
//!
//!     service.join(JoinRequest { rover_name: "eth".into() }).await.unwrap();
//!
//!     let stream = service.open_block_stream();
//!     // stream.send(BlockMessage { .. }).await.unwrap();
//!     let report = stream.close().await.unwrap();
//!     println!("forwarded {} blocks", report.forwarded);
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `rover_gate::core` - Announcements, admission states, supply formula
//! - `rover_gate::store` - Storage abstraction and SQLite
//! - `rover_gate::intake` - Admission mutex, intake pipeline, registry

pub mod config;
pub mod error;
pub mod messages;
pub mod service;
pub mod settlement;
pub mod supply;

// Re-export component crates
pub use rover_gate_core as core;
pub use rover_gate_intake as intake;
pub use rover_gate_store as store;

pub use config::{ConfigError, GateConfig};
pub use error::{GateError, Result};
pub use service::{BlockStream, CollectorService};
pub use settlement::{SettlementChecker, SettlementLedger, StoreLedger};
pub use supply::SupplyReader;

pub use rover_gate_core::{
    AdmissionState, BlockAnnouncement, BlockHash, BlockRange, ChainNamespace, RoverId, SyncStatus,
    TxRef,
};
