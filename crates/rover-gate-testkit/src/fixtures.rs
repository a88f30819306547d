//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rover_gate::messages::BlockMessage;
use rover_gate::{CollectorService, GateConfig};
use rover_gate_core::{AdmissionState, BlockAnnouncement, ChainNamespace};
use rover_gate_intake::{AdmissionSource, IntakeError, RecordingSink};
use rover_gate_store::{MemoryStore, Result as StoreResult, StoreExt};

/// A memory store, a recording sink and the namespace they share.
pub struct TestFixture {
    pub store: Arc<MemoryStore>,
    pub sink: Arc<RecordingSink>,
    pub namespace: ChainNamespace,
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl TestFixture {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            sink: Arc::new(RecordingSink::new()),
            namespace: ChainNamespace::default(),
        }
    }

    /// A collector service over this fixture's store and sink.
    pub fn service(
        &self,
        mut config: GateConfig,
    ) -> CollectorService<MemoryStore, Arc<RecordingSink>> {
        config.namespace = self.namespace.clone();
        CollectorService::new(self.store.clone(), self.sink.clone(), config)
    }

    /// Write the miner mutex as the miner would.
    pub async fn set_state(&self, state: AdmissionState) -> StoreResult<()> {
        self.store.set_admission_state(&self.namespace, state).await
    }

    /// Write the latest local block height.
    pub async fn set_latest_height(&self, height: u64) -> StoreResult<()> {
        self.store.set_latest_block_height(height).await
    }

    /// An announcement with a hash derived from rover and height.
    pub fn announcement(&self, rover: &str, height: u64) -> BlockAnnouncement {
        BlockAnnouncement::new(
            rover,
            format!("{}-{:016x}", rover, height),
            height,
            height.to_be_bytes().to_vec(),
        )
    }

    /// The wire form of [`TestFixture::announcement`].
    pub fn block_message(&self, rover: &str, height: u64) -> BlockMessage {
        BlockMessage {
            blockchain: rover.to_owned(),
            hash: format!("{}-{:016x}", rover, height),
            previous_hash: format!("{}-{:016x}", rover, height.saturating_sub(1)),
            height,
            timestamp: 1_700_000_000_000 + height,
            payload: hex::encode(height.to_be_bytes()),
        }
    }

    /// Heights collected for one rover, in collection order.
    pub async fn collected_heights(&self, rover: &str) -> Vec<u64> {
        self.sink
            .collected()
            .await
            .iter()
            .filter(|a| a.rover.as_str() == rover)
            .map(|a| a.height)
            .collect()
    }
}

/// One scripted read of the admission state.
#[derive(Debug, Clone)]
pub enum ScriptedRead {
    State(AdmissionState),
    Fail(String),
}

/// An admission source that plays back a script, then repeats a fallback.
pub struct ScriptedAdmissionSource {
    script: Mutex<VecDeque<ScriptedRead>>,
    fallback: AdmissionState,
    reads: Mutex<usize>,
}

impl ScriptedAdmissionSource {
    pub fn new(script: impl IntoIterator<Item = ScriptedRead>, fallback: AdmissionState) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            reads: Mutex::new(0),
        }
    }

    /// Always answers `state`.
    pub fn fixed(state: AdmissionState) -> Self {
        Self::new([], state)
    }

    /// Number of reads so far.
    pub fn reads(&self) -> usize {
        *self.reads.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl AdmissionSource for ScriptedAdmissionSource {
    async fn read_admission_state(&self) -> Result<AdmissionState, IntakeError> {
        *self.reads.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match next {
            Some(ScriptedRead::State(state)) => Ok(state),
            Some(ScriptedRead::Fail(reason)) => Err(IntakeError::StateRead(reason)),
            None => Ok(self.fallback),
        }
    }
}
