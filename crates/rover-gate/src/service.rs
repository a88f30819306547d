//! The collector service: the calls rovers make against the gate.

use std::sync::Arc;

use rover_gate_core::RoverId;
use rover_gate_intake::{
    AdmissionSource, CollectionSink, IntakePipeline, IntakeReport, ReplayWorker, RoverRegistry,
    RoverSession, StoreAdmissionSource, StreamEvent,
};
use rover_gate_store::Store;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::GateConfig;
use crate::error::{GateError, Result};
use crate::messages::{
    BlockMessage, GetNrgSupplyResponse, JoinRequest, JoinResponse, Null, RoverBlockRange,
    RoverSyncStatus, SettleTxCheckRequest, SettleTxCheckResponse,
};
use crate::settlement::{SettlementChecker, SettlementLedger, StoreLedger};
use crate::supply::SupplyReader;

/// Collector service.
///
/// Owns the intake pipeline, the rover registry, the settlement checker and
/// the supply reader. Block streams and unary calls run concurrently.
pub struct CollectorService<S, K, A = StoreAdmissionSource<S>, L = StoreLedger<S>>
where
    S: Store,
    K: CollectionSink,
    A: AdmissionSource,
    L: SettlementLedger,
{
    pipeline: Arc<IntakePipeline<S, A, K>>,
    registry: Arc<RoverRegistry>,
    settlement: SettlementChecker<L>,
    supply: SupplyReader<S>,
    config: GateConfig,
}

impl<S: Store, K: CollectionSink> CollectorService<S, K> {
    /// Create a service that reads the miner mutex and the ledger from `store`.
    pub fn new(store: Arc<S>, sink: K, config: GateConfig) -> Self {
        let source = StoreAdmissionSource::new(store.clone(), config.namespace.clone());
        let ledger = StoreLedger::new(store.clone());
        Self::with_parts(store, source, sink, ledger, config)
    }
}

impl<S, K, A, L> CollectorService<S, K, A, L>
where
    S: Store,
    K: CollectionSink,
    A: AdmissionSource,
    L: SettlementLedger,
{
    /// Create a service with a custom admission source and ledger.
    pub fn with_parts(store: Arc<S>, source: A, sink: K, ledger: L, config: GateConfig) -> Self {
        let registry = Arc::new(RoverRegistry::new());
        let pipeline = IntakePipeline::new(store.clone(), source, sink, config.intake.clone())
            .with_registry(registry.clone());

        info!(
            namespace = %config.namespace,
            gating = config.intake.gating_enabled,
            "collector service ready"
        );

        Self {
            pipeline: Arc::new(pipeline),
            registry,
            settlement: SettlementChecker::new(ledger),
            supply: SupplyReader::new(store),
            config,
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<RoverRegistry> {
        &self.registry
    }

    pub fn pipeline(&self) -> &Arc<IntakePipeline<S, A, K>> {
        &self.pipeline
    }

    pub fn ledger(&self) -> &L {
        self.settlement.ledger()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Block Intake
    // ─────────────────────────────────────────────────────────────────────────

    /// `CollectBlock`: consume one inbound stream until it closes.
    pub async fn collect_block(&self, events: mpsc::Receiver<StreamEvent>) -> IntakeReport {
        self.pipeline.run_stream(events).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Settlement
    // ─────────────────────────────────────────────────────────────────────────

    /// `IsBeforeSettleHeight`: which candidates are settled as of the block.
    pub async fn is_before_settle_height(
        &self,
        request: SettleTxCheckRequest,
    ) -> Result<SettleTxCheckResponse> {
        let (candidates, block_hash) = request.validate()?;

        let settled = self
            .settlement
            .check_settlement(&candidates, &block_hash)
            .await?;
        Ok(SettleTxCheckResponse::from(settled))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Rover Sessions
    // ─────────────────────────────────────────────────────────────────────────

    /// `Join`: register a rover. Re-joining replaces the session.
    pub async fn join(&self, request: JoinRequest) -> Result<JoinResponse> {
        let rover = request.rover()?;
        let handle = self.registry.join(rover.clone()).await;
        Ok(JoinResponse::new(&rover, handle.session_id, handle.joined_at))
    }

    /// `ReportSyncStatus`. Reports from rovers that never joined are
    /// acknowledged and have no effect.
    pub async fn report_sync_status(&self, request: RoverSyncStatus) -> Result<Null> {
        let (rover, status) = request.parts()?;
        self.registry.report_sync_status(&rover, status).await;
        Ok(Null {})
    }

    /// `ReportBlockRange`. Same unjoined handling as sync status.
    pub async fn report_block_range(&self, request: RoverBlockRange) -> Result<Null> {
        let (rover, range) = request.parts()?;
        self.registry.report_block_range(&rover, range).await;
        Ok(Null {})
    }

    /// Drop a rover's session when its connection goes away.
    pub async fn leave(&self, rover_name: &str) -> Option<RoverSession> {
        self.registry.disconnect(&RoverId::from(rover_name)).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Supply
    // ─────────────────────────────────────────────────────────────────────────

    /// `GetNrgSupply`.
    pub async fn get_nrg_supply(&self) -> Result<GetNrgSupplyResponse> {
        Ok(GetNrgSupplyResponse::from(self.supply.current_supply().await?))
    }
}

impl<S, K, A, L> CollectorService<S, K, A, L>
where
    S: Store + 'static,
    K: CollectionSink + 'static,
    A: AdmissionSource + 'static,
    L: SettlementLedger,
{
    /// `CollectBlock` on a background task. Feed it through the returned
    /// [`BlockStream`].
    pub fn open_block_stream(&self) -> BlockStream {
        let (events, rx) = mpsc::channel(self.config.intake.stream_capacity);
        let pipeline = self.pipeline.clone();
        let task = tokio::spawn(async move { pipeline.run_stream(rx).await });
        BlockStream { events, task }
    }

    /// Start replaying buffered blocks on the configured interval.
    pub fn spawn_replay_worker(&self) -> ReplayWorker {
        ReplayWorker::spawn(self.pipeline.clone(), self.config.intake.replay_interval)
    }
}

/// The sending half of an inbound block stream.
///
/// Sends wait while the stream's channel is full.
pub struct BlockStream {
    events: mpsc::Sender<StreamEvent>,
    task: JoinHandle<IntakeReport>,
}

impl BlockStream {
    /// Send one block message.
    ///
    /// A malformed message is rejected here and the stream stays open.
    pub async fn send(&self, message: BlockMessage) -> Result<()> {
        let announcement = message.into_announcement().map_err(|e| {
            warn!(error = %e, "dropping malformed block message");
            GateError::Validation(e)
        })?;
        self.push(StreamEvent::Block(announcement)).await
    }

    /// Report a transport error. The stream stays open.
    pub async fn transport_error(&self, message: impl Into<String>) -> Result<()> {
        self.push(StreamEvent::TransportError(message.into())).await
    }

    /// Report a transport status change.
    pub async fn status(&self, status: impl Into<String>) -> Result<()> {
        self.push(StreamEvent::Status(status.into())).await
    }

    /// Close the stream and wait for the summary.
    ///
    /// A block still held back by a full rover buffer is dropped, not
    /// buffered, and counted in [`IntakeReport::dropped`].
    pub async fn close(self) -> Result<IntakeReport> {
        drop(self.events);
        self.task
            .await
            .map_err(|e| GateError::Transport(format!("block stream task failed: {}", e)))
    }

    async fn push(&self, event: StreamEvent) -> Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| GateError::Transport("block stream closed".into()))
    }
}
