//! Event model
//!
//! Closed, versioned event vocabulary shared by all subsystems. Payloads are
//! a tagged union so subscribers can match exhaustively instead of probing
//! opaque data.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::federation::peer::PeerSyncState;
use crate::health::monitor::HealthStatus;
use crate::registry::types::ModuleState;
use crate::utils::time::current_timestamp;

/// Source name used for events that are not scoped to a single module
pub const REGISTRY_SOURCE: &str = "Registry";

/// Event payloads, one fixed schema per type tag
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// A module was registered; `state` is its post-evaluation state
    ModuleRegistered {
        name: String,
        version: String,
        state: ModuleState,
    },
    /// A module record changed state
    ModuleUpdated { name: String, state: ModuleState },
    /// A module was unregistered (tombstoned)
    ModuleUnregistered { name: String },
    /// The service mesh was recomputed
    MeshRebuilt { satisfied: usize, pending: usize },
    /// The system-wide health aggregate changed
    HealthChanged { status: HealthStatus },
    /// Autoscaler wants more instances of a module
    ScaleUp { module: String, delta: u32 },
    /// Autoscaler wants fewer instances of a module
    ScaleDown { module: String, delta: u32 },
    /// The external orchestrator failed to act on a scaling decision
    ScalingActionFailed { module: String, reason: String },
    /// A subscriber queue was full and an event was dropped for it
    SubscriberOverflow { subscription: Uuid, kind: String },
    /// A federation peer changed sync state
    PeerStateChanged { peer: String, state: PeerSyncState },
}

impl EventKind {
    /// Dotted type tag used for subscription pattern matching
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::ModuleRegistered { .. } => "module.registered",
            EventKind::ModuleUpdated { .. } => "module.updated",
            EventKind::ModuleUnregistered { .. } => "module.unregistered",
            EventKind::MeshRebuilt { .. } => "mesh.rebuilt",
            EventKind::HealthChanged { .. } => "health.changed",
            EventKind::ScaleUp { .. } => "scaling.up",
            EventKind::ScaleDown { .. } => "scaling.down",
            EventKind::ScalingActionFailed { .. } => "scaling.action_failed",
            EventKind::SubscriberOverflow { .. } => "bus.subscriber_overflow",
            EventKind::PeerStateChanged { .. } => "federation.peer_state",
        }
    }
}

/// Delivery metadata attached to every event
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EventMetadata {
    /// How many times this event has been handed to a subscriber queue
    pub delivery_count: u32,
    /// Cluster the triggering write originated from; `None` for local writes
    pub origin_cluster: Option<String>,
}

/// A single event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Globally unique event id
    pub id: Uuid,
    /// Typed payload
    pub kind: EventKind,
    /// Module name, or [`REGISTRY_SOURCE`] for system-scoped events
    pub source: String,
    /// Unix timestamp at publish time
    pub timestamp: u64,
    /// Delivery metadata
    pub metadata: EventMetadata,
}

impl Event {
    /// Create an event originating from a local write
    pub fn local(source: impl Into<String>, kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            source: source.into(),
            timestamp: current_timestamp(),
            metadata: EventMetadata::default(),
        }
    }

    /// Create an event re-emitted for a federated write
    pub fn federated(source: impl Into<String>, kind: EventKind, origin_cluster: &str) -> Self {
        let mut event = Self::local(source, kind);
        event.metadata.origin_cluster = Some(origin_cluster.to_string());
        event
    }
}

/// Subscription pattern over event type tags
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPattern {
    /// Match every event
    Any,
    /// Match a dotted prefix, e.g. `module.*`
    Prefix(String),
    /// Match one type tag exactly
    Exact(String),
}

impl EventPattern {
    /// Parse a pattern string: `*`, `module.*`, or an exact type tag
    pub fn parse(pattern: &str) -> Self {
        if pattern == "*" {
            EventPattern::Any
        } else if let Some(prefix) = pattern.strip_suffix(".*") {
            EventPattern::Prefix(format!("{prefix}."))
        } else {
            EventPattern::Exact(pattern.to_string())
        }
    }

    /// Check a type tag against the pattern
    pub fn matches(&self, kind_name: &str) -> bool {
        match self {
            EventPattern::Any => true,
            EventPattern::Prefix(prefix) => kind_name.starts_with(prefix),
            EventPattern::Exact(exact) => kind_name == exact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_matching() {
        assert!(EventPattern::parse("*").matches("module.registered"));
        assert!(EventPattern::parse("module.*").matches("module.registered"));
        assert!(EventPattern::parse("module.*").matches("module.updated"));
        assert!(!EventPattern::parse("module.*").matches("scaling.up"));
        assert!(EventPattern::parse("scaling.up").matches("scaling.up"));
        assert!(!EventPattern::parse("scaling.up").matches("scaling.down"));
    }

    #[test]
    fn test_kind_names_are_dotted() {
        let kind = EventKind::ModuleRegistered {
            name: "ledger".to_string(),
            version: "1.0.0".to_string(),
            state: ModuleState::Ready,
        };
        assert_eq!(kind.name(), "module.registered");
    }
}
