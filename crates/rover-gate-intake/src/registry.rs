//! Rover session registry.
//!
//! Tracks which rovers are joined and what they last reported. Sessions are
//! keyed by rover name and exist only in memory.
//!
//! ```text
//! unjoined ──join──> joined ──status──> syncing <──status──> synced
//!                       │                  │                   │
//!                       └──────────── disconnect ──────────────┘
//! ```
//!
//! Status and range reports for a rover that has not joined yet are
//! acknowledged and dropped. A rover may send its first status report on a
//! separate call that overtakes its join; the report is valid once the join
//! lands, and the next report will carry it again.

use std::collections::HashMap;

use rand::Rng;
use rover_gate_core::{now_millis, BlockRange, RoverId, SessionId, SyncStatus};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Where a joined session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Joined, no status reported yet.
    Joined,
    /// Last reported status was `syncing`.
    Syncing,
    /// Last reported status was `synced`.
    Synced,
}

/// A joined rover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoverSession {
    pub rover: RoverId,
    pub session_id: SessionId,
    /// When the rover joined (Unix ms).
    pub joined_at: i64,
    pub phase: SessionPhase,
    pub sync_status: Option<SyncStatus>,
    pub block_range: Option<BlockRange>,
    /// Last report or join (Unix ms).
    pub updated_at: i64,
}

impl RoverSession {
    /// Good standing means the rover last reported it is synced.
    pub fn in_good_standing(&self) -> bool {
        self.sync_status.map(|s| s.is_synced()).unwrap_or(false)
    }
}

/// Returned to a rover when it joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionHandle {
    pub session_id: SessionId,
    pub joined_at: i64,
}

/// Acknowledgement of a status or range report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportAck {
    /// The report updated a joined session.
    Applied,
    /// The rover has not joined; the report was dropped.
    Unjoined,
}

/// Registry of joined rovers.
#[derive(Default)]
pub struct RoverRegistry {
    sessions: RwLock<HashMap<RoverId, RoverSession>>,
}

impl RoverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a rover. Re-joining replaces the previous session.
    pub async fn join(&self, rover: RoverId) -> SessionHandle {
        let now = now_millis();
        let session_id = SessionId::from_u64(rand::thread_rng().gen());

        let previous = self.sessions.write().await.insert(
            rover.clone(),
            RoverSession {
                rover: rover.clone(),
                session_id,
                joined_at: now,
                phase: SessionPhase::Joined,
                sync_status: None,
                block_range: None,
                updated_at: now,
            },
        );

        match previous {
            Some(old) => info!(%rover, %session_id, replaced = %old.session_id, "rover re-joined"),
            None => info!(%rover, %session_id, "rover joined"),
        }

        SessionHandle {
            session_id,
            joined_at: now,
        }
    }

    /// Record a rover's sync status.
    pub async fn report_sync_status(&self, rover: &RoverId, status: SyncStatus) -> ReportAck {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(rover) else {
            debug!(%rover, ?status, "sync status from unjoined rover ignored");
            return ReportAck::Unjoined;
        };

        session.sync_status = Some(status);
        session.phase = match status {
            SyncStatus::Syncing => SessionPhase::Syncing,
            SyncStatus::Synced => SessionPhase::Synced,
        };
        session.updated_at = now_millis();
        debug!(%rover, ?status, "rover sync status");
        ReportAck::Applied
    }

    /// Record the block range a rover has covered.
    pub async fn report_block_range(&self, rover: &RoverId, range: BlockRange) -> ReportAck {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(rover) else {
            debug!(%rover, ?range, "block range from unjoined rover ignored");
            return ReportAck::Unjoined;
        };

        session.block_range = Some(range);
        session.updated_at = now_millis();
        debug!(%rover, start = range.start, end = range.end, "rover block range");
        ReportAck::Applied
    }

    /// Remove a rover's session. Returns it if it existed.
    pub async fn disconnect(&self, rover: &RoverId) -> Option<RoverSession> {
        let removed = self.sessions.write().await.remove(rover);
        if removed.is_some() {
            info!(%rover, "rover disconnected");
        }
        removed
    }

    /// Look up one session.
    pub async fn session(&self, rover: &RoverId) -> Option<RoverSession> {
        self.sessions.read().await.get(rover).cloned()
    }

    /// All joined sessions, ordered by rover name.
    pub async fn sessions(&self) -> Vec<RoverSession> {
        let mut all: Vec<RoverSession> = self.sessions.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.rover.cmp(&b.rover));
        all
    }

    /// Sessions whose last reported status is `synced`.
    pub async fn sessions_in_good_standing(&self) -> Vec<RoverSession> {
        let mut good: Vec<RoverSession> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.in_good_standing())
            .cloned()
            .collect();
        good.sort_by(|a, b| a.rover.cmp(&b.rover));
        good
    }

    /// Check one rover's standing. Unjoined rovers are not in good standing.
    pub async fn is_in_good_standing(&self, rover: &RoverId) -> bool {
        self.sessions
            .read()
            .await
            .get(rover)
            .map(|s| s.in_good_standing())
            .unwrap_or(false)
    }

    /// Number of joined rovers.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no rover is joined.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_join_then_status_cycle() {
        let registry = RoverRegistry::new();
        let eth = RoverId::from("eth");

        registry.join(eth.clone()).await;
        assert_eq!(
            registry.session(&eth).await.unwrap().phase,
            SessionPhase::Joined
        );

        assert_eq!(
            registry.report_sync_status(&eth, SyncStatus::Syncing).await,
            ReportAck::Applied
        );
        assert_eq!(
            registry.session(&eth).await.unwrap().phase,
            SessionPhase::Syncing
        );
        assert!(!registry.is_in_good_standing(&eth).await);

        registry.report_sync_status(&eth, SyncStatus::Synced).await;
        assert!(registry.is_in_good_standing(&eth).await);

        registry.report_sync_status(&eth, SyncStatus::Syncing).await;
        assert!(!registry.is_in_good_standing(&eth).await);
    }

    #[tokio::test]
    async fn test_unjoined_reports_are_acknowledged_without_effect() {
        let registry = RoverRegistry::new();
        let btc = RoverId::from("btc");

        assert_eq!(
            registry.report_sync_status(&btc, SyncStatus::Synced).await,
            ReportAck::Unjoined
        );
        assert_eq!(
            registry
                .report_block_range(&btc, BlockRange::new(1, 2).unwrap())
                .await,
            ReportAck::Unjoined
        );
        assert!(registry.is_empty().await);
        assert!(registry.session(&btc).await.is_none());
    }

    #[tokio::test]
    async fn test_block_range_recorded() {
        let registry = RoverRegistry::new();
        let lsk = RoverId::from("lsk");
        registry.join(lsk.clone()).await;

        let range = BlockRange::new(100, 250).unwrap();
        registry.report_block_range(&lsk, range).await;
        assert_eq!(registry.session(&lsk).await.unwrap().block_range, Some(range));
    }

    #[tokio::test]
    async fn test_rejoin_resets_session() {
        let registry = RoverRegistry::new();
        let neo = RoverId::from("neo");

        registry.join(neo.clone()).await;
        registry.report_sync_status(&neo, SyncStatus::Synced).await;

        let second = registry.join(neo.clone()).await;
        let session = registry.session(&neo).await.unwrap();
        assert_eq!(session.session_id, second.session_id);
        assert_eq!(session.phase, SessionPhase::Joined);
        assert!(session.sync_status.is_none());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_good_standing_and_disconnect() {
        let registry = RoverRegistry::new();
        for name in ["btc", "eth", "wav"] {
            registry.join(RoverId::from(name)).await;
        }
        registry
            .report_sync_status(&RoverId::from("wav"), SyncStatus::Synced)
            .await;
        registry
            .report_sync_status(&RoverId::from("btc"), SyncStatus::Synced)
            .await;

        let good: Vec<String> = registry
            .sessions_in_good_standing()
            .await
            .into_iter()
            .map(|s| s.rover.to_string())
            .collect();
        assert_eq!(good, vec!["btc", "wav"]);

        assert!(registry.disconnect(&RoverId::from("btc")).await.is_some());
        assert!(registry.disconnect(&RoverId::from("btc")).await.is_none());
        assert_eq!(registry.sessions_in_good_standing().await.len(), 1);
    }
}
