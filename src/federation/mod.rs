//! Cross-cluster federation

pub mod peer;
pub mod sync;

pub use peer::{FederationPeer, PeerSyncState, SyncVector};
pub use sync::{FederationError, FederationSync, PeerTransport, SyncStats};
