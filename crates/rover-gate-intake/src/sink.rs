//! Collection sink abstraction: where admitted blocks go.
//!
//! The sink is the downstream block-collection pipeline. The gate hands it
//! each admitted block once; what the sink does with it, and whether that
//! succeeds, is the sink's business.

use std::sync::Arc;

use async_trait::async_trait;
use rover_gate_core::BlockAnnouncement;

use crate::error::Result;

/// Consumer of admitted blocks.
#[async_trait]
pub trait CollectionSink: Send + Sync {
    /// Hand over one admitted block.
    async fn collect(&self, announcement: BlockAnnouncement) -> Result<()>;
}

#[async_trait]
impl<K: CollectionSink + ?Sized> CollectionSink for Arc<K> {
    async fn collect(&self, announcement: BlockAnnouncement) -> Result<()> {
        (**self).collect(announcement).await
    }
}

/// In-memory sinks for tests and local wiring.
pub mod memory {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::{mpsc, Mutex};

    use crate::error::IntakeError;

    /// Records every block it is handed.
    #[derive(Default)]
    pub struct RecordingSink {
        blocks: Mutex<Vec<BlockAnnouncement>>,
        failing: AtomicBool,
    }

    impl RecordingSink {
        /// Create an empty sink.
        pub fn new() -> Self {
            Self::default()
        }

        /// Blocks collected so far, in hand-over order.
        pub async fn collected(&self) -> Vec<BlockAnnouncement> {
            self.blocks.lock().await.clone()
        }

        /// Number of blocks collected so far.
        pub async fn len(&self) -> usize {
            self.blocks.lock().await.len()
        }

        /// Whether nothing has been collected yet.
        pub async fn is_empty(&self) -> bool {
            self.blocks.lock().await.is_empty()
        }

        /// Make `collect` report failure. Blocks are still recorded.
        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl CollectionSink for RecordingSink {
        async fn collect(&self, announcement: BlockAnnouncement) -> Result<()> {
            self.blocks.lock().await.push(announcement);
            if self.failing.load(Ordering::SeqCst) {
                return Err(IntakeError::Sink("sink marked failing".into()));
            }
            Ok(())
        }
    }

    /// Forwards blocks into a bounded channel.
    pub struct ChannelSink {
        sender: mpsc::Sender<BlockAnnouncement>,
    }

    impl ChannelSink {
        /// Create a sink and the receiving end of its channel.
        pub fn new(capacity: usize) -> (Self, mpsc::Receiver<BlockAnnouncement>) {
            let (sender, receiver) = mpsc::channel(capacity);
            (Self { sender }, receiver)
        }
    }

    #[async_trait]
    impl CollectionSink for ChannelSink {
        async fn collect(&self, announcement: BlockAnnouncement) -> Result<()> {
            self.sender
                .send(announcement)
                .await
                .map_err(|_| IntakeError::Sink("collector channel closed".into()))
        }
    }
}
