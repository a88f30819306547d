//! Background replay of buffered blocks.

use std::sync::Arc;
use std::time::Duration;

use rover_gate_store::Store;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::admission::AdmissionSource;
use crate::pipeline::IntakePipeline;
use crate::sink::CollectionSink;

/// Periodically drains the block buffer once the miner releases the mutex.
pub struct ReplayWorker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ReplayWorker {
    /// Start replaying every `interval`.
    pub fn spawn<S, A, K>(pipeline: Arc<IntakePipeline<S, A, K>>, interval: Duration) -> Self
    where
        S: Store + 'static,
        A: AdmissionSource + 'static,
        K: CollectionSink + 'static,
    {
        let (shutdown, mut stop) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match pipeline.replay().await {
                            Ok(report) if report.replayed > 0 => {
                                info!(
                                    replayed = report.replayed,
                                    rovers = report.rovers_drained,
                                    "replayed buffered blocks"
                                );
                            }
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "replay pass failed"),
                        }
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }

            debug!("replay worker stopped");
        });

        Self { shutdown, handle }
    }

    /// Stop the worker and wait for the current pass to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "replay worker panicked");
        }
    }
}
