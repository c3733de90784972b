//! Federation peer state

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-module logical clock vector
pub type SyncVector = BTreeMap<String, u64>;

/// Peer connectivity state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerSyncState {
    /// Recent syncs succeeded
    Connected,
    /// Some syncs are failing, still retried
    Degraded,
    /// Sustained failure; excluded from discovery-by-federation until resync
    Unreachable,
}

/// A peer cluster this registry synchronizes with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationPeer {
    /// Remote cluster id
    pub cluster_id: String,
    /// Highest per-module clock acknowledged by the peer
    pub last_sync_vector: SyncVector,
    /// Connectivity state
    pub sync_state: PeerSyncState,
    /// Consecutive failed sync attempts
    pub consecutive_failures: u32,
    /// Unix timestamp of the last successful sync
    pub last_success: u64,
}

impl FederationPeer {
    /// Create a freshly-added peer
    pub fn new(cluster_id: impl Into<String>, now: u64) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            last_sync_vector: SyncVector::new(),
            sync_state: PeerSyncState::Connected,
            consecutive_failures: 0,
            last_success: now,
        }
    }
}
