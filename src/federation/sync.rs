//! Cross-cluster registry synchronization
//!
//! Propagates module records between peer clusters with eventual
//! consistency: last-writer-wins by per-module logical clock, ties broken
//! by cluster id. Applying foreign state re-emits the corresponding local
//! events so subscribers observe federated changes identically to local
//! ones. The wire transport is a trait implemented by the embedder.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex as TokioMutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::FederationConfig;
use crate::event::bus::EventBus;
use crate::event::types::{Event, EventKind, REGISTRY_SOURCE};
use crate::federation::peer::{FederationPeer, PeerSyncState, SyncVector};
use crate::registry::store::{ModuleRegistry, RemoteApply};
use crate::registry::types::ModuleRecord;
use crate::utils::retry::{retry_async_with_backoff, RetryConfig};
use crate::utils::time::current_timestamp;

/// Federation errors
#[derive(Debug, Error)]
pub enum FederationError {
    #[error("sync with peer {0} timed out")]
    Timeout(String),

    #[error("peer {0} is unreachable")]
    PeerUnreachable(String),

    #[error("unknown peer: {0}")]
    UnknownPeer(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Wire transport between clusters
///
/// Concrete transports (HTTP, gRPC, message queue) live outside this crate;
/// tests wire registries together in-process.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Send locally-changed records to a peer
    async fn push_delta(
        &self,
        peer: &str,
        from_cluster: &str,
        records: Vec<ModuleRecord>,
    ) -> Result<(), FederationError>;

    /// Fetch records the peer has changed past the given vector
    async fn pull_delta(
        &self,
        peer: &str,
        since: &SyncVector,
    ) -> Result<Vec<ModuleRecord>, FederationError>;
}

/// Result of one sync round with a peer
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Records sent to the peer
    pub pushed: usize,
    /// Foreign records applied locally
    pub applied: usize,
}

/// Federation synchronizer for one local cluster
pub struct FederationSync {
    cluster_id: String,
    registry: Arc<ModuleRegistry>,
    bus: Arc<EventBus>,
    transport: Arc<dyn PeerTransport>,
    peers: TokioMutex<HashMap<String, FederationPeer>>,
    sync_interval: Duration,
    peer_timeout: Duration,
    unreachable_after: Duration,
    retry: RetryConfig,
}

impl FederationSync {
    /// Create a synchronizer bound to the local registry and bus
    pub fn new(
        registry: Arc<ModuleRegistry>,
        bus: Arc<EventBus>,
        transport: Arc<dyn PeerTransport>,
        config: &FederationConfig,
        cluster_id: impl Into<String>,
    ) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            registry,
            bus,
            transport,
            peers: TokioMutex::new(HashMap::new()),
            sync_interval: Duration::from_millis(config.sync_interval_ms),
            peer_timeout: Duration::from_millis(config.peer_timeout_ms),
            unreachable_after: Duration::from_secs(config.unreachable_after_secs),
            retry: RetryConfig::federation(config),
        }
    }

    /// Local cluster id
    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    /// Add a peer cluster
    pub async fn add_peer(&self, cluster_id: impl Into<String>) {
        let peer = FederationPeer::new(cluster_id, current_timestamp());
        info!(peer = %peer.cluster_id, "federation peer added");
        self.peers.lock().await.insert(peer.cluster_id.clone(), peer);
    }

    /// Current state of a peer
    pub async fn peer_state(&self, cluster_id: &str) -> Option<PeerSyncState> {
        self.peers
            .lock()
            .await
            .get(cluster_id)
            .map(|p| p.sync_state)
    }

    /// Drive the periodic sync loop until the task is aborted
    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.sync_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            self.sync_all().await;
        }
    }

    /// Sync every known peer once
    pub async fn sync_all(&self) {
        let peer_ids: Vec<String> = self.peers.lock().await.keys().cloned().collect();
        for peer_id in peer_ids {
            if let Err(e) = self.sync_peer(&peer_id, None).await {
                warn!(peer = %peer_id, "sync failed: {e}");
            }
        }
    }

    /// Run one push+pull round with a peer
    ///
    /// The whole round is bounded by `deadline` (defaulting to the
    /// configured peer timeout) and retried with exponential backoff and
    /// bounded jitter. A cancelled or failed round leaves local state
    /// unchanged and is safely retryable.
    pub async fn sync_peer(
        &self,
        peer_id: &str,
        deadline: Option<Duration>,
    ) -> Result<SyncStats, FederationError> {
        let since = {
            let peers = self.peers.lock().await;
            let peer = peers
                .get(peer_id)
                .ok_or_else(|| FederationError::UnknownPeer(peer_id.to_string()))?;
            peer.last_sync_vector.clone()
        };

        let timeout = deadline.unwrap_or(self.peer_timeout);
        let since_ref = &since;
        let attempt = || async move {
            match tokio::time::timeout(timeout, self.sync_round(peer_id, since_ref)).await {
                Ok(result) => result,
                Err(_) => Err(FederationError::Timeout(peer_id.to_string())),
            }
        };

        match retry_async_with_backoff(&self.retry, attempt).await {
            Ok((stats, acked)) => {
                self.mark_success(peer_id, acked).await;
                Ok(stats)
            }
            Err(e) => {
                self.mark_failure(peer_id).await;
                Err(e)
            }
        }
    }

    /// Single push+pull attempt; returns stats and the acknowledged vector
    async fn sync_round(
        &self,
        peer_id: &str,
        since: &SyncVector,
    ) -> Result<(SyncStats, SyncVector), FederationError> {
        let delta = self.collect_delta(since).await;
        let pushed = delta.len();

        let mut acked = since.clone();
        for record in &delta {
            let entry = acked.entry(record.name().to_string()).or_insert(0);
            *entry = (*entry).max(record.clock);
        }

        if pushed > 0 {
            debug!(peer = %peer_id, pushed, "pushing delta");
            self.transport
                .push_delta(peer_id, &self.cluster_id, delta)
                .await?;
        }

        let foreign = self.transport.pull_delta(peer_id, since).await?;
        for record in &foreign {
            let entry = acked.entry(record.name().to_string()).or_insert(0);
            *entry = (*entry).max(record.clock);
        }
        let applied = self.apply_delta(peer_id, foreign).await?;

        Ok((SyncStats { pushed, applied }, acked))
    }

    /// Records changed past the given vector, tombstones included
    pub async fn collect_delta(&self, since: &SyncVector) -> Vec<ModuleRecord> {
        self.registry
            .snapshot_with_tombstones()
            .await
            .into_iter()
            .filter(|record| record.clock > since.get(record.name()).copied().unwrap_or(0))
            .collect()
    }

    /// Apply records received from a peer, last-writer-wins
    ///
    /// Returns how many records actually changed local state. Each applied
    /// record re-emits the matching local event tagged with the origin
    /// cluster, so the mesh, health monitor, and subscribers all observe it.
    pub async fn apply_delta(
        &self,
        from_cluster: &str,
        records: Vec<ModuleRecord>,
    ) -> Result<usize, FederationError> {
        let mut applied = 0;
        for record in records {
            match self.registry.apply_remote(record, from_cluster).await {
                RemoteApply::Applied => applied += 1,
                RemoteApply::Ignored => {}
            }
        }
        if applied > 0 {
            debug!(from = %from_cluster, applied, "applied federation delta");
        }
        Ok(applied)
    }

    async fn mark_success(&self, peer_id: &str, acked: SyncVector) {
        let transition = {
            let mut peers = self.peers.lock().await;
            let Some(peer) = peers.get_mut(peer_id) else {
                return;
            };
            peer.last_sync_vector = acked;
            peer.consecutive_failures = 0;
            peer.last_success = current_timestamp();
            let was = peer.sync_state;
            peer.sync_state = PeerSyncState::Connected;
            (was != PeerSyncState::Connected).then_some(PeerSyncState::Connected)
        };
        if let Some(state) = transition {
            self.registry.set_origin_excluded(peer_id, false).await;
            self.emit_peer_state(peer_id, state).await;
        }
    }

    async fn mark_failure(&self, peer_id: &str) {
        let transition = {
            let mut peers = self.peers.lock().await;
            let Some(peer) = peers.get_mut(peer_id) else {
                return;
            };
            peer.consecutive_failures += 1;
            let silent_for = current_timestamp().saturating_sub(peer.last_success);
            let next = if silent_for >= self.unreachable_after.as_secs() {
                PeerSyncState::Unreachable
            } else {
                PeerSyncState::Degraded
            };
            let was = peer.sync_state;
            peer.sync_state = next;
            (was != next).then_some(next)
        };
        if let Some(state) = transition {
            if state == PeerSyncState::Unreachable {
                // Records from an unreachable origin drop out of discovery
                // until the peer resyncs.
                self.registry.set_origin_excluded(peer_id, true).await;
            }
            self.emit_peer_state(peer_id, state).await;
        }
    }

    async fn emit_peer_state(&self, peer_id: &str, state: PeerSyncState) {
        info!(peer = %peer_id, ?state, "peer sync state changed");
        let event = Event::local(
            REGISTRY_SOURCE,
            EventKind::PeerStateChanged {
                peer: peer_id.to_string(),
                state,
            },
        );
        if let Err(e) = self.bus.publish(event).await {
            warn!(peer = %peer_id, "failed to publish peer state: {e}");
        }
    }
}
