//! # Rover Gate Core
//!
//! Pure primitives for the rover gate: block announcements, the admission
//! state machine, rover session descriptors and the NRG supply formula.
//!
//! This crate contains no storage and no networking.
//!
//! ## Key Types
//!
//! - [`BlockAnnouncement`] - A candidate block reported by a rover
//! - [`AdmissionState`] - The miner's exclusive-hold flag
//! - [`Decision`] - Whether a block passes or is buffered
//! - [`ChainNamespace`] - Scopes the mutex and latest-block keys
//! - [`SyncStatus`] / [`BlockRange`] - What rovers report about themselves

pub mod admission;
pub mod announcement;
pub mod error;
pub mod session;
pub mod supply;
pub mod time;
pub mod types;

pub use admission::{decide, AdmissionState, Decision};
pub use announcement::{BlockAnnouncement, Fingerprint};
pub use error::{CoreError, ValidationError};
pub use session::{BlockRange, SessionId, SyncStatus};
pub use supply::{nrg_supply, BASE_SUPPLY, EMISSION_PER_BLOCK};
pub use time::now_millis;
pub use types::{BlockHash, ChainNamespace, RoverId, TxRef, LATEST_BLOCK_KEY};
