//! Error types for the gate.

use rover_gate_core::ValidationError;
use rover_gate_intake::IntakeError;
use rover_gate_store::StoreError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors returned by gate calls.
#[derive(Debug, Error)]
pub enum GateError {
    /// The inbound stream or its framing failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// Persisted state could not be read.
    #[error("state read error: {0}")]
    StateRead(String),

    /// A looked-up entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Validation error.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<IntakeError> for GateError {
    fn from(e: IntakeError) -> Self {
        match e {
            IntakeError::StateRead(_) | IntakeError::StateReadTimeout(_) => {
                GateError::StateRead(e.to_string())
            }
            IntakeError::Store(e) => GateError::Store(e),
            IntakeError::Validation(e) => GateError::Validation(e),
            IntakeError::Sink(msg) => GateError::Transport(msg),
        }
    }
}

/// Result type for gate operations.
pub type Result<T> = std::result::Result<T, GateError>;
