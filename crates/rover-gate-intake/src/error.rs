//! Error types for the intake module.

use std::time::Duration;

use rover_gate_core::ValidationError;
use rover_gate_store::StoreError;
use thiserror::Error;

/// Errors that can occur while admitting blocks.
#[derive(Debug, Error)]
pub enum IntakeError {
    /// The admission state could not be read.
    #[error("admission state unavailable: {0}")]
    StateRead(String),

    /// The admission state read did not finish in time.
    #[error("admission state read timed out after {0:?}")]
    StateReadTimeout(Duration),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The collection sink refused a block.
    #[error("collection sink error: {0}")]
    Sink(String),

    /// The announcement is malformed.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Result type for intake operations.
pub type Result<T> = std::result::Result<T, IntakeError>;
