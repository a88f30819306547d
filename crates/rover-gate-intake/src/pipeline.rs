//! Block intake pipeline.
//!
//! Applies the admission decision to each announcement and either forwards
//! it to the collection sink or appends it to the durable buffer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rover_gate_core::{BlockAnnouncement, Decision, RoverId};
use rover_gate_store::{AppendResult, Store};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::admission::{AdmissionMutex, AdmissionSource};
use crate::error::Result;
use crate::registry::RoverRegistry;
use crate::sink::CollectionSink;

/// Configuration for intake behavior.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    /// Consult the miner mutex. When off, every block passes.
    pub gating_enabled: bool,
    /// Upper bound on one admission state read.
    pub state_read_timeout: Duration,
    /// Buffered blocks per rover before the stream is throttled.
    pub max_buffered_per_rover: usize,
    /// How often held streams and the replay worker re-check the mutex.
    pub replay_interval: Duration,
    /// Buffered blocks read from the store per replay batch.
    pub replay_batch_size: usize,
    /// Flag blocks from rovers that are not synced.
    pub consult_standing: bool,
    /// Capacity of the channel feeding each inbound stream.
    pub stream_capacity: usize,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            gating_enabled: false,
            state_read_timeout: Duration::from_millis(500),
            max_buffered_per_rover: 1024,
            replay_interval: Duration::from_millis(250),
            replay_batch_size: 64,
            consult_standing: false,
            stream_capacity: 256,
        }
    }
}

/// One message observed on an inbound rover stream.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A block announcement.
    Block(BlockAnnouncement),
    /// The transport reported an error. The stream may keep delivering.
    TransportError(String),
    /// The transport reported a status change.
    Status(String),
}

/// Why a block went to the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferReason {
    /// The miner holds the mutex.
    MinerHold,
    /// The mutex could not be read.
    StateUnavailable,
    /// Older blocks from the same rover could not be replayed first.
    ReplayBlocked,
}

/// What happened to one announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeOutcome {
    /// Handed to the collection sink.
    Forwarded {
        /// Older buffered blocks from the same rover forwarded first.
        replayed: usize,
        /// Whether the rover was in good standing. Always true unless
        /// standing is consulted.
        in_good_standing: bool,
    },
    /// Appended to the durable buffer.
    Buffered {
        seq: u64,
        /// The identical announcement was already buffered.
        duplicate: bool,
        reason: BufferReason,
    },
    /// The stream closed while the rover was throttled. The block was
    /// never buffered.
    Dropped,
}

/// Summary of one inbound stream.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IntakeReport {
    /// Blocks forwarded on arrival.
    pub forwarded: usize,
    /// Blocks appended to the buffer.
    pub buffered: usize,
    /// Re-deliveries of blocks that were already buffered.
    pub duplicates: usize,
    /// Buffered blocks replayed ahead of a forwarded block.
    pub replayed: usize,
    /// Forwarded blocks from rovers not in good standing.
    pub deprioritized: usize,
    /// Blocks buffered because the mutex could not be read.
    pub state_read_errors: usize,
    /// Throttled blocks given up on because the stream closed.
    pub dropped: usize,
    /// Blocks that could be neither forwarded nor buffered.
    pub errors: usize,
    /// Transport errors observed on the stream.
    pub transport_errors: usize,
}

impl IntakeReport {
    fn record(&mut self, outcome: &IntakeOutcome) {
        match *outcome {
            IntakeOutcome::Forwarded {
                replayed,
                in_good_standing,
            } => {
                self.forwarded += 1;
                self.replayed += replayed;
                if !in_good_standing {
                    self.deprioritized += 1;
                }
            }
            IntakeOutcome::Buffered {
                duplicate, reason, ..
            } => {
                if duplicate {
                    self.duplicates += 1;
                } else {
                    self.buffered += 1;
                }
                if reason == BufferReason::StateUnavailable {
                    self.state_read_errors += 1;
                }
            }
            IntakeOutcome::Dropped => self.dropped += 1,
        }
    }
}

/// Result of a replay pass over all buffered rovers.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    /// Rovers whose buffers were drained.
    pub rovers_drained: usize,
    /// Blocks forwarded from the buffer.
    pub replayed: usize,
    /// The mutex was held (or unreadable) so the pass stopped early.
    pub held: bool,
}

/// The intake pipeline.
///
/// A per-rover lock is held from the admission read to the hand-off, so
/// blocks from one rover are decided and forwarded in arrival order even
/// when the rover has several streams open or a replay is running.
pub struct IntakePipeline<S: Store, A: AdmissionSource, K: CollectionSink> {
    store: Arc<S>,
    admission: AdmissionMutex<A>,
    sink: K,
    registry: Option<Arc<RoverRegistry>>,
    config: IntakeConfig,
    rover_locks: Mutex<HashMap<RoverId, Arc<Mutex<()>>>>,
}

impl<S: Store, A: AdmissionSource, K: CollectionSink> IntakePipeline<S, A, K> {
    /// Create a new pipeline.
    pub fn new(store: Arc<S>, source: A, sink: K, config: IntakeConfig) -> Self {
        let admission = AdmissionMutex::new(source, config.gating_enabled, config.state_read_timeout);
        Self {
            store,
            admission,
            sink,
            registry: None,
            config,
            rover_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Attach a registry to consult for rover standing.
    pub fn with_registry(mut self, registry: Arc<RoverRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Get the store reference.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Get the configuration.
    pub fn config(&self) -> &IntakeConfig {
        &self.config
    }

    /// Admit one announcement.
    ///
    /// Returns once the block has been forwarded or durably buffered. If the
    /// rover's buffer is full the call waits, re-reading the mutex every
    /// `replay_interval`, until the miner lets go.
    pub async fn on_block(&self, announcement: BlockAnnouncement) -> Result<IntakeOutcome> {
        self.admit(announcement, || false).await
    }

    /// Admit one announcement, giving up on a throttled block once
    /// `stream_closed` reports that its stream has gone away.
    async fn admit<F>(&self, announcement: BlockAnnouncement, stream_closed: F) -> Result<IntakeOutcome>
    where
        F: Fn() -> bool,
    {
        announcement.validate()?;

        let rover = announcement.rover.clone();
        let lock = self.rover_lock(&rover).await;
        let outcome = {
            let _guard = lock.lock().await;
            self.admit_locked(announcement, &rover, &stream_closed).await
        };
        self.release_rover_lock(&rover, lock).await;
        outcome
    }

    async fn admit_locked<F>(
        &self,
        announcement: BlockAnnouncement,
        rover: &RoverId,
        stream_closed: &F,
    ) -> Result<IntakeOutcome>
    where
        F: Fn() -> bool,
    {
        let mut throttled = false;
        loop {
            let verdict = self.admission.decide().await;

            if verdict.decision == Decision::Pass {
                let replayed = match self.drain_rover(rover).await {
                    Ok(n) => n,
                    Err(e) => {
                        warn!(%rover, error = %e, "replay before forward failed, buffering to keep order");
                        return self.buffer(&announcement, BufferReason::ReplayBlocked).await;
                    }
                };

                let in_good_standing = self.standing(rover).await;
                if !in_good_standing {
                    debug!(%rover, height = announcement.height, "forwarding block from rover not in good standing");
                }

                self.forward(announcement).await;
                return Ok(IntakeOutcome::Forwarded {
                    replayed,
                    in_good_standing,
                });
            }

            let reason = if verdict.error.is_some() {
                BufferReason::StateUnavailable
            } else {
                BufferReason::MinerHold
            };

            let buffered = self.store.buffered_count(rover).await?;
            if buffered < self.config.max_buffered_per_rover {
                return self.buffer(&announcement, reason).await;
            }

            if stream_closed() {
                warn!(%rover, height = announcement.height, "stream closed while throttled, dropping unbuffered block");
                return Ok(IntakeOutcome::Dropped);
            }
            if !throttled {
                warn!(%rover, buffered, "rover buffer full, holding stream until the miner releases");
                throttled = true;
            }
            tokio::time::sleep(self.config.replay_interval).await;
        }
    }

    /// Consume an inbound stream until its channel closes.
    ///
    /// Errors on one block are logged and do not stop the stream. Once every
    /// sender is gone, a block held back by a full buffer is dropped rather
    /// than waited on, so closing a throttled stream still returns.
    pub async fn run_stream(&self, mut events: mpsc::Receiver<StreamEvent>) -> IntakeReport {
        let mut report = IntakeReport::default();

        while let Some(event) = events.recv().await {
            match event {
                StreamEvent::Block(announcement) => {
                    let rover = announcement.rover.clone();
                    let height = announcement.height;
                    match self.admit(announcement, || events.is_closed()).await {
                        Ok(outcome) => {
                            debug!(%rover, height, ?outcome, "block admitted");
                            report.record(&outcome);
                        }
                        Err(e) => {
                            error!(%rover, height, error = %e, "failed to admit block");
                            report.errors += 1;
                        }
                    }
                }
                StreamEvent::TransportError(message) => {
                    error!(%message, "stream error while collecting blocks");
                    report.transport_errors += 1;
                }
                StreamEvent::Status(status) => {
                    debug!(%status, "stream status");
                }
            }
        }

        info!(
            forwarded = report.forwarded,
            buffered = report.buffered,
            replayed = report.replayed,
            dropped = report.dropped,
            errors = report.errors,
            "block stream closed"
        );
        report
    }

    /// Forward every buffered block whose rover may pass.
    ///
    /// The mutex is re-read for each rover, under that rover's lock, right
    /// before its buffer is drained.
    pub async fn replay(&self) -> Result<ReplayReport> {
        let mut report = ReplayReport::default();

        for rover in self.store.buffered_rovers().await? {
            let lock = self.rover_lock(&rover).await;
            let drained = {
                let _guard = lock.lock().await;
                if self.admission.decide().await.is_pass() {
                    self.drain_rover(&rover).await.map(Some)
                } else {
                    Ok(None)
                }
            };
            self.release_rover_lock(&rover, lock).await;

            let Some(replayed) = drained? else {
                report.held = true;
                break;
            };
            if replayed > 0 {
                debug!(%rover, replayed, "replayed buffered blocks");
                report.rovers_drained += 1;
                report.replayed += replayed;
            }
        }

        Ok(report)
    }

    /// Forward a rover's buffered blocks in order. Caller holds the rover lock.
    ///
    /// Each block leaves the buffer before it reaches the sink, so a failed
    /// removal never leads to a second delivery.
    async fn drain_rover(&self, rover: &RoverId) -> Result<usize> {
        let mut replayed = 0;
        loop {
            let batch = self
                .store
                .peek_buffered(rover, self.config.replay_batch_size)
                .await?;
            if batch.is_empty() {
                return Ok(replayed);
            }

            for block in batch {
                self.store.remove_buffered(rover, block.seq).await?;
                self.forward(block.announcement).await;
                replayed += 1;
            }
        }
    }

    async fn buffer(
        &self,
        announcement: &BlockAnnouncement,
        reason: BufferReason,
    ) -> Result<IntakeOutcome> {
        let (seq, duplicate) = match self.store.append_buffered(announcement).await? {
            AppendResult::Appended { seq } => (seq, false),
            AppendResult::AlreadyBuffered { seq } => (seq, true),
        };

        debug!(
            rover = %announcement.rover,
            height = announcement.height,
            seq,
            duplicate,
            ?reason,
            "block buffered"
        );
        Ok(IntakeOutcome::Buffered {
            seq,
            duplicate,
            reason,
        })
    }

    /// Hand a block to the sink. Sink failures are logged only.
    async fn forward(&self, announcement: BlockAnnouncement) {
        let rover = announcement.rover.clone();
        let height = announcement.height;
        if let Err(e) = self.sink.collect(announcement).await {
            warn!(%rover, height, error = %e, "collection sink rejected block");
        }
    }

    async fn standing(&self, rover: &RoverId) -> bool {
        match (&self.registry, self.config.consult_standing) {
            (Some(registry), true) => registry.is_in_good_standing(rover).await,
            _ => true,
        }
    }

    async fn rover_lock(&self, rover: &RoverId) -> Arc<Mutex<()>> {
        let mut locks = self.rover_locks.lock().await;
        locks.entry(rover.clone()).or_default().clone()
    }

    /// Drop a rover's lock entry once nobody else holds or waits on it.
    async fn release_rover_lock(&self, rover: &RoverId, lock: Arc<Mutex<()>>) {
        let mut locks = self.rover_locks.lock().await;
        // One reference in the map, one here.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(rover);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::StoreAdmissionSource;
    use crate::sink::memory::RecordingSink;
    use async_trait::async_trait;
    use rover_gate_core::{AdmissionState, BlockHash, ChainNamespace, SyncStatus, TxRef};
    use rover_gate_store::{BufferedBlock, MemoryStore, StoreError, StoreExt};
    use std::sync::atomic::{AtomicBool, Ordering};

    type TestPipeline =
        IntakePipeline<MemoryStore, StoreAdmissionSource<MemoryStore>, Arc<RecordingSink>>;

    struct Harness {
        store: Arc<MemoryStore>,
        sink: Arc<RecordingSink>,
        ns: ChainNamespace,
        pipeline: Arc<TestPipeline>,
    }

    impl Harness {
        fn new(config: IntakeConfig) -> Self {
            let store = Arc::new(MemoryStore::new());
            let sink = Arc::new(RecordingSink::new());
            let ns = ChainNamespace::default();
            let source = StoreAdmissionSource::new(store.clone(), ns.clone());
            let pipeline = Arc::new(IntakePipeline::new(store.clone(), source, sink.clone(), config));
            Self {
                store,
                sink,
                ns,
                pipeline,
            }
        }

        fn gated() -> Self {
            Self::new(IntakeConfig {
                gating_enabled: true,
                state_read_timeout: Duration::from_millis(200),
                replay_interval: Duration::from_millis(10),
                ..IntakeConfig::default()
            })
        }

        async fn set_state(&self, state: AdmissionState) {
            self.store.set_admission_state(&self.ns, state).await.unwrap();
        }

        async fn collected(&self, rover: &str) -> Vec<u64> {
            self.sink
                .collected()
                .await
                .iter()
                .filter(|a| a.rover.as_str() == rover)
                .map(|a| a.height)
                .collect()
        }
    }

    fn block(rover: &str, height: u64) -> BlockAnnouncement {
        BlockAnnouncement::new(rover, format!("{}:{}", rover, height), height, vec![1, 2, 3])
    }

    /// Memory store whose first buffered-block removal fails.
    struct FlakyRemoveStore {
        inner: MemoryStore,
        failed_once: AtomicBool,
    }

    impl FlakyRemoveStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                failed_once: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl Store for FlakyRemoveStore {
        async fn get_value(&self, key: &str) -> rover_gate_store::Result<Option<Vec<u8>>> {
            self.inner.get_value(key).await
        }

        async fn put_value(&self, key: &str, value: &[u8]) -> rover_gate_store::Result<()> {
            self.inner.put_value(key, value).await
        }

        async fn delete_value(&self, key: &str) -> rover_gate_store::Result<()> {
            self.inner.delete_value(key).await
        }

        async fn append_buffered(
            &self,
            announcement: &BlockAnnouncement,
        ) -> rover_gate_store::Result<AppendResult> {
            self.inner.append_buffered(announcement).await
        }

        async fn peek_buffered(
            &self,
            rover: &RoverId,
            limit: usize,
        ) -> rover_gate_store::Result<Vec<BufferedBlock>> {
            self.inner.peek_buffered(rover, limit).await
        }

        async fn remove_buffered(&self, rover: &RoverId, seq: u64) -> rover_gate_store::Result<()> {
            if !self.failed_once.swap(true, Ordering::SeqCst) {
                return Err(StoreError::InvalidData("disk went away".into()));
            }
            self.inner.remove_buffered(rover, seq).await
        }

        async fn buffered_count(&self, rover: &RoverId) -> rover_gate_store::Result<usize> {
            self.inner.buffered_count(rover).await
        }

        async fn buffered_rovers(&self) -> rover_gate_store::Result<Vec<RoverId>> {
            self.inner.buffered_rovers().await
        }

        async fn record_block(&self, hash: &BlockHash, height: u64) -> rover_gate_store::Result<()> {
            self.inner.record_block(hash, height).await
        }

        async fn block_height(&self, hash: &BlockHash) -> rover_gate_store::Result<Option<u64>> {
            self.inner.block_height(hash).await
        }

        async fn track_unsettled(&self, tx: &TxRef, settles_at: u64) -> rover_gate_store::Result<()> {
            self.inner.track_unsettled(tx, settles_at).await
        }

        async fn settle_heights(
            &self,
            txs: &[TxRef],
        ) -> rover_gate_store::Result<Vec<(TxRef, u64)>> {
            self.inner.settle_heights(txs).await
        }
    }

    #[tokio::test]
    async fn test_open_and_closed_forward_immediately() {
        let h = Harness::gated();

        h.set_state(AdmissionState::Closed).await;
        let o1 = h.pipeline.on_block(block("eth", 1)).await.unwrap();
        h.set_state(AdmissionState::Open).await;
        let o2 = h.pipeline.on_block(block("eth", 2)).await.unwrap();

        for outcome in [o1, o2] {
            assert_eq!(
                outcome,
                IntakeOutcome::Forwarded {
                    replayed: 0,
                    in_good_standing: true
                }
            );
        }
        assert_eq!(h.collected("eth").await, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_pending_buffers_and_does_not_forward() {
        let h = Harness::gated();
        h.set_state(AdmissionState::Pending).await;

        let outcome = h.pipeline.on_block(block("btc", 10)).await.unwrap();
        assert!(matches!(
            outcome,
            IntakeOutcome::Buffered {
                duplicate: false,
                reason: BufferReason::MinerHold,
                ..
            }
        ));
        assert!(h.sink.is_empty().await);
        assert_eq!(h.store.buffered_count(&RoverId::from("btc")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_mutex_key_passes() {
        let h = Harness::gated();
        let outcome = h.pipeline.on_block(block("lsk", 1)).await.unwrap();
        assert!(matches!(outcome, IntakeOutcome::Forwarded { .. }));
    }

    #[tokio::test]
    async fn test_unreadable_state_buffers() {
        let h = Harness::gated();
        h.store
            .put_value(&h.ns.miner_mutex_key(), b"???")
            .await
            .unwrap();

        let outcome = h.pipeline.on_block(block("neo", 1)).await.unwrap();
        assert!(matches!(
            outcome,
            IntakeOutcome::Buffered {
                reason: BufferReason::StateUnavailable,
                ..
            }
        ));
        assert!(h.sink.is_empty().await);
    }

    #[tokio::test]
    async fn test_gating_disabled_ignores_pending() {
        let h = Harness::new(IntakeConfig::default());
        h.set_state(AdmissionState::Pending).await;

        let outcome = h.pipeline.on_block(block("eth", 1)).await.unwrap();
        assert!(matches!(outcome, IntakeOutcome::Forwarded { .. }));
        assert_eq!(h.collected("eth").await, vec![1]);
    }

    #[tokio::test]
    async fn test_pass_replays_rover_buffer_first() {
        let h = Harness::gated();
        h.set_state(AdmissionState::Pending).await;
        h.pipeline.on_block(block("eth", 1)).await.unwrap();
        h.pipeline.on_block(block("eth", 2)).await.unwrap();
        h.pipeline.on_block(block("btc", 7)).await.unwrap();

        h.set_state(AdmissionState::Open).await;
        let outcome = h.pipeline.on_block(block("eth", 3)).await.unwrap();

        assert_eq!(
            outcome,
            IntakeOutcome::Forwarded {
                replayed: 2,
                in_good_standing: true
            }
        );
        assert_eq!(h.collected("eth").await, vec![1, 2, 3]);
        // Other rovers' buffers are left for the replay pass.
        assert!(h.collected("btc").await.is_empty());
    }

    #[tokio::test]
    async fn test_replay_preserves_per_rover_order() {
        let h = Harness::gated();
        h.set_state(AdmissionState::Pending).await;

        let arrivals = [("eth", 5), ("btc", 1), ("eth", 6), ("eth", 4), ("btc", 2), ("wav", 9)];
        for (rover, height) in arrivals {
            h.pipeline.on_block(block(rover, height)).await.unwrap();
        }

        let held = h.pipeline.replay().await.unwrap();
        assert!(held.held);
        assert_eq!(held.replayed, 0);

        h.set_state(AdmissionState::Closed).await;
        let report = h.pipeline.replay().await.unwrap();
        assert_eq!(report.replayed, 6);
        assert_eq!(report.rovers_drained, 3);
        assert!(!report.held);

        assert_eq!(h.collected("eth").await, vec![5, 6, 4]);
        assert_eq!(h.collected("btc").await, vec![1, 2]);
        assert_eq!(h.collected("wav").await, vec![9]);
        assert!(h.store.buffered_rovers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_while_buffered_is_forwarded_once() {
        let h = Harness::gated();
        h.set_state(AdmissionState::Pending).await;

        h.pipeline.on_block(block("eth", 1)).await.unwrap();
        let again = h.pipeline.on_block(block("eth", 1)).await.unwrap();
        assert!(matches!(
            again,
            IntakeOutcome::Buffered {
                duplicate: true,
                ..
            }
        ));

        h.set_state(AdmissionState::Open).await;
        h.pipeline.replay().await.unwrap();
        assert_eq!(h.collected("eth").await, vec![1]);
    }

    #[tokio::test]
    async fn test_full_buffer_holds_until_release() {
        let h = Harness::new(IntakeConfig {
            gating_enabled: true,
            max_buffered_per_rover: 2,
            replay_interval: Duration::from_millis(10),
            ..IntakeConfig::default()
        });
        h.set_state(AdmissionState::Pending).await;
        h.pipeline.on_block(block("eth", 1)).await.unwrap();
        h.pipeline.on_block(block("eth", 2)).await.unwrap();

        let pipeline = h.pipeline.clone();
        let held = tokio::spawn(async move { pipeline.on_block(block("eth", 3)).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!held.is_finished());
        assert_eq!(h.store.buffered_count(&RoverId::from("eth")).await.unwrap(), 2);

        h.set_state(AdmissionState::Open).await;
        let outcome = held.await.unwrap().unwrap();
        assert_eq!(
            outcome,
            IntakeOutcome::Forwarded {
                replayed: 2,
                in_good_standing: true
            }
        );
        assert_eq!(h.collected("eth").await, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_sink_failure_still_counts_as_forwarded() {
        let h = Harness::gated();
        h.sink.set_failing(true);

        let outcome = h.pipeline.on_block(block("eth", 1)).await.unwrap();
        assert!(matches!(outcome, IntakeOutcome::Forwarded { .. }));
        assert_eq!(h.sink.len().await, 1);
    }

    #[tokio::test]
    async fn test_malformed_announcement_rejected() {
        let h = Harness::gated();
        let result = h.pipeline.on_block(block("", 1)).await;
        assert!(matches!(result, Err(crate::IntakeError::Validation(_))));
        assert!(h.sink.is_empty().await);
    }

    #[tokio::test]
    async fn test_standing_flags_but_never_rejects() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(RecordingSink::new());
        let registry = Arc::new(RoverRegistry::new());
        let source = StoreAdmissionSource::new(store.clone(), ChainNamespace::default());
        let pipeline = IntakePipeline::new(
            store,
            source,
            sink.clone(),
            IntakeConfig {
                consult_standing: true,
                ..IntakeConfig::default()
            },
        )
        .with_registry(registry.clone());

        registry.join(RoverId::from("eth")).await;
        registry
            .report_sync_status(&RoverId::from("eth"), SyncStatus::Synced)
            .await;

        let synced = pipeline.on_block(block("eth", 1)).await.unwrap();
        let unknown = pipeline.on_block(block("btc", 1)).await.unwrap();

        assert_eq!(
            synced,
            IntakeOutcome::Forwarded {
                replayed: 0,
                in_good_standing: true
            }
        );
        assert_eq!(
            unknown,
            IntakeOutcome::Forwarded {
                replayed: 0,
                in_good_standing: false
            }
        );
        assert_eq!(sink.len().await, 2);
    }

    #[tokio::test]
    async fn test_run_stream_survives_errors() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let h = Harness::gated();
        h.set_state(AdmissionState::Pending).await;

        let (tx, rx) = mpsc::channel(16);
        let pipeline = h.pipeline.clone();
        let task = tokio::spawn(async move { pipeline.run_stream(rx).await });

        tx.send(StreamEvent::Block(block("eth", 1))).await.unwrap();
        tx.send(StreamEvent::TransportError("connection reset".into()))
            .await
            .unwrap();
        tx.send(StreamEvent::Block(block("", 2))).await.unwrap();
        tx.send(StreamEvent::Status("OK".into())).await.unwrap();
        tx.send(StreamEvent::Block(block("eth", 1))).await.unwrap();
        tx.send(StreamEvent::Block(block("eth", 3))).await.unwrap();
        drop(tx);

        let report = task.await.unwrap();
        assert_eq!(
            report,
            IntakeReport {
                buffered: 2,
                duplicates: 1,
                errors: 1,
                transport_errors: 1,
                ..IntakeReport::default()
            }
        );

        // Buffered blocks outlive the stream.
        h.set_state(AdmissionState::Open).await;
        h.pipeline.replay().await.unwrap();
        assert_eq!(h.collected("eth").await, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_closing_throttled_stream_drops_held_block() {
        let h = Harness::new(IntakeConfig {
            gating_enabled: true,
            max_buffered_per_rover: 1,
            replay_interval: Duration::from_millis(10),
            ..IntakeConfig::default()
        });
        h.set_state(AdmissionState::Pending).await;

        let (tx, rx) = mpsc::channel(16);
        let pipeline = h.pipeline.clone();
        let task = tokio::spawn(async move { pipeline.run_stream(rx).await });

        tx.send(StreamEvent::Block(block("eth", 1))).await.unwrap();
        tx.send(StreamEvent::Block(block("eth", 2))).await.unwrap();
        drop(tx);

        let report = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("throttled stream did not close")
            .unwrap();
        assert_eq!(
            report,
            IntakeReport {
                buffered: 1,
                dropped: 1,
                ..IntakeReport::default()
            }
        );
        assert_eq!(h.store.buffered_count(&RoverId::from("eth")).await.unwrap(), 1);
        assert!(h.sink.is_empty().await);

        // The rover is not left locked.
        h.set_state(AdmissionState::Open).await;
        let outcome = h.pipeline.on_block(block("eth", 3)).await.unwrap();
        assert!(matches!(outcome, IntakeOutcome::Forwarded { replayed: 1, .. }));
        assert_eq!(h.collected("eth").await, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_failed_remove_does_not_forward_twice() {
        let store = Arc::new(FlakyRemoveStore::new());
        let sink = Arc::new(RecordingSink::new());
        let ns = ChainNamespace::default();
        let source = StoreAdmissionSource::new(store.clone(), ns.clone());
        let pipeline = IntakePipeline::new(
            store.clone(),
            source,
            sink.clone(),
            IntakeConfig {
                gating_enabled: true,
                ..IntakeConfig::default()
            },
        );

        store.set_admission_state(&ns, AdmissionState::Pending).await.unwrap();
        pipeline.on_block(block("eth", 1)).await.unwrap();
        store.set_admission_state(&ns, AdmissionState::Open).await.unwrap();

        assert!(pipeline.replay().await.is_err());
        assert!(sink.is_empty().await);

        let report = pipeline.replay().await.unwrap();
        assert_eq!(report.replayed, 1);
        let heights: Vec<u64> = sink.collected().await.iter().map(|a| a.height).collect();
        assert_eq!(heights, vec![1]);
        assert_eq!(store.buffered_count(&RoverId::from("eth")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rover_locks_released_after_use() {
        let h = Harness::gated();
        h.pipeline.on_block(block("eth", 1)).await.unwrap();
        h.pipeline.on_block(block("btc", 1)).await.unwrap();
        assert!(h.pipeline.rover_locks.lock().await.is_empty());

        h.set_state(AdmissionState::Pending).await;
        for height in 2..5 {
            h.pipeline.on_block(block(&format!("r{}", height), height)).await.unwrap();
        }
        h.set_state(AdmissionState::Open).await;
        let report = h.pipeline.replay().await.unwrap();
        assert_eq!(report.rovers_drained, 3);
        assert!(h.pipeline.rover_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_waiting_rover_keeps_its_lock() {
        let h = Harness::new(IntakeConfig {
            gating_enabled: true,
            max_buffered_per_rover: 1,
            replay_interval: Duration::from_millis(10),
            ..IntakeConfig::default()
        });
        h.set_state(AdmissionState::Pending).await;
        h.pipeline.on_block(block("eth", 1)).await.unwrap();

        let pipeline = h.pipeline.clone();
        let held = tokio::spawn(async move { pipeline.on_block(block("eth", 2)).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.pipeline.rover_locks.lock().await.contains_key(&RoverId::from("eth")));

        h.set_state(AdmissionState::Open).await;
        held.await.unwrap().unwrap();
        assert!(h.pipeline.rover_locks.lock().await.is_empty());
        assert_eq!(h.collected("eth").await, vec![1, 2]);
    }
}
