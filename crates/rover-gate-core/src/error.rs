//! Error types for the rover gate core.

use thiserror::Error;

/// Errors decoding core values from their stored or wire form.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown admission state: {0:?}")]
    UnknownAdmissionState(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Structural errors in requests. These are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("required field is empty: {0}")]
    EmptyField(&'static str),

    #[error("invalid block range: start {start} is above end {end}")]
    InvalidBlockRange { start: u64, end: u64 },

    #[error("duplicate transaction reference: {0}")]
    DuplicateReference(String),

    #[error("invalid hex in {field}: {reason}")]
    InvalidHex { field: &'static str, reason: String },

    #[error("malformed message: {0}")]
    Malformed(String),
}
