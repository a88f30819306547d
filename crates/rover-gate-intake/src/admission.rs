//! The admission mutex: reads the miner's flag and turns it into a decision.
//!
//! The flag is owned by the miner. The gate only reads it, through an
//! injected [`AdmissionSource`], and never caches it across announcements.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rover_gate_core::{decide, AdmissionState, ChainNamespace, Decision};
use rover_gate_store::{Store, StoreExt};
use tracing::warn;

use crate::error::{IntakeError, Result};

/// Source of the miner's exclusive-hold flag.
#[async_trait]
pub trait AdmissionSource: Send + Sync {
    /// Read the current admission state with a fresh round-trip.
    async fn read_admission_state(&self) -> Result<AdmissionState>;
}

#[async_trait]
impl<A: AdmissionSource + ?Sized> AdmissionSource for Arc<A> {
    async fn read_admission_state(&self) -> Result<AdmissionState> {
        (**self).read_admission_state().await
    }
}

/// Reads the flag from `<namespace>.miner.mutex` in the shared store.
///
/// A missing key means no miner has ever taken the lock and reads as
/// [`AdmissionState::Closed`].
pub struct StoreAdmissionSource<S: Store> {
    store: Arc<S>,
    namespace: ChainNamespace,
}

impl<S: Store> StoreAdmissionSource<S> {
    pub fn new(store: Arc<S>, namespace: ChainNamespace) -> Self {
        Self { store, namespace }
    }
}

#[async_trait]
impl<S: Store> AdmissionSource for StoreAdmissionSource<S> {
    async fn read_admission_state(&self) -> Result<AdmissionState> {
        match self.store.admission_state(&self.namespace).await {
            Ok(Some(state)) => Ok(state),
            Ok(None) => Ok(AdmissionState::Closed),
            Err(e) => Err(IntakeError::StateRead(e.to_string())),
        }
    }
}

/// Outcome of one admission decision.
#[derive(Debug)]
pub struct AdmissionVerdict {
    /// What to do with the block.
    pub decision: Decision,
    /// The state that was read, if gating is on and the read succeeded.
    pub state: Option<AdmissionState>,
    /// Why the state could not be read. Always paired with `Buffer`.
    pub error: Option<IntakeError>,
}

impl AdmissionVerdict {
    fn from_state(state: AdmissionState) -> Self {
        Self {
            decision: decide(state),
            state: Some(state),
            error: None,
        }
    }

    fn bypass() -> Self {
        Self {
            decision: Decision::Pass,
            state: None,
            error: None,
        }
    }

    fn unavailable(error: IntakeError) -> Self {
        Self {
            decision: Decision::Buffer,
            state: None,
            error: Some(error),
        }
    }

    /// Check if the block may be forwarded now.
    pub fn is_pass(&self) -> bool {
        self.decision == Decision::Pass
    }
}

/// The three-state gate in front of the collection sink.
pub struct AdmissionMutex<A: AdmissionSource> {
    source: A,
    gating_enabled: bool,
    read_timeout: Duration,
}

impl<A: AdmissionSource> AdmissionMutex<A> {
    /// Create a gate. With `gating_enabled` off every block passes and the
    /// source is never read.
    pub fn new(source: A, gating_enabled: bool, read_timeout: Duration) -> Self {
        Self {
            source,
            gating_enabled,
            read_timeout,
        }
    }

    /// Whether the mutex is consulted at all.
    pub fn gating_enabled(&self) -> bool {
        self.gating_enabled
    }

    /// Decide the fate of the next block.
    ///
    /// A failed or slow read buffers the block rather than forwarding it
    /// while the miner's hold is unknown.
    pub async fn decide(&self) -> AdmissionVerdict {
        if !self.gating_enabled {
            return AdmissionVerdict::bypass();
        }

        match tokio::time::timeout(self.read_timeout, self.source.read_admission_state()).await {
            Ok(Ok(state)) => AdmissionVerdict::from_state(state),
            Ok(Err(e)) => {
                warn!(error = %e, "admission state read failed, buffering");
                AdmissionVerdict::unavailable(e)
            }
            Err(_) => {
                warn!(timeout = ?self.read_timeout, "admission state read timed out, buffering");
                AdmissionVerdict::unavailable(IntakeError::StateReadTimeout(self.read_timeout))
            }
        }
    }
}
