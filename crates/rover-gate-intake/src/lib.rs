//! # Rover Gate Intake
//!
//! Admission of rover-reported blocks against the miner's mutex.
//!
//! ## Overview
//!
//! Every block a rover reports is admitted exactly once. The
//! [`AdmissionMutex`] reads the miner's flag right before the decision:
//!
//! - `closed` / `open`: the block is forwarded to the [`CollectionSink`],
//!   after any blocks already buffered for the same rover
//! - `pending` or unreadable: the block is appended to the durable buffer
//!   and replayed, in per-rover arrival order, once the miner lets go
//!
//! ## Flow
//!
//! ```text
//! rover stream ──> IntakePipeline::run_stream
//!                      │
//!                      ├─ AdmissionMutex::decide ──> AdmissionSource
//!                      │
//!                      ├─ pass ──> drain rover buffer ──> CollectionSink
//!                      └─ buffer ──> Store::append_buffered
//!
//! ReplayWorker ──(interval)──> IntakePipeline::replay ──> CollectionSink
//! ```
//!
//! The [`RoverRegistry`] tracks joined rovers and their reported sync state.
//! The pipeline can consult it to flag blocks from rovers that are still
//! syncing; it never rejects them.

pub mod admission;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod replay;
pub mod sink;

pub use admission::{AdmissionMutex, AdmissionSource, AdmissionVerdict, StoreAdmissionSource};
pub use error::{IntakeError, Result};
pub use pipeline::{
    BufferReason, IntakeConfig, IntakeOutcome, IntakePipeline, IntakeReport, ReplayReport,
    StreamEvent,
};
pub use registry::{ReportAck, RoverRegistry, RoverSession, SessionHandle, SessionPhase};
pub use replay::ReplayWorker;
pub use sink::{memory::ChannelSink, memory::RecordingSink, CollectionSink};
