//! Orchestron - Module orchestration engine
//!
//! This crate provides the registry core that lets independently developed
//! modules register themselves, declare dependencies, and be driven as one
//! system: safe initialization ordering, ordered event delivery with
//! backpressure, aggregate health monitoring, hysteresis-based autoscaling
//! decisions, and eventually-consistent state federation across clusters.
//!
//! ## Components
//!
//! 1. **ModuleRegistry**: authoritative store of module records
//! 2. **DependencyResolver**: initialization order and cycle detection
//! 3. **EventBus**: in-process publish/subscribe with bounded queues
//! 4. **ServiceMeshBuilder**: derived connectivity graph
//! 5. **HealthMonitor / AutoScaler**: periodic health fold and scaling loop
//! 6. **FederationSync**: last-writer-wins sync with peer clusters
//!
//! ## Design Principles
//!
//! 1. **No Globals**: the embedding process owns an [`Orchestrator`] value
//! 2. **Typed Events**: a closed vocabulary subscribers match exhaustively
//! 3. **Bounded Everything**: queues, history, metric windows, and waits
//! 4. **Pure Infrastructure**: module business logic stays outside

pub mod config;
pub mod event;
pub mod federation;
pub mod health;
pub mod mesh;
pub mod orchestrator;
pub mod registry;
pub mod storage;
pub mod utils;

// Re-export config types
pub use config::*;

// Re-export commonly used types
pub use event::{Event, EventBus, EventKind, EventPattern, Subscription};
pub use federation::{FederationSync, PeerSyncState, PeerTransport};
pub use health::{AutoScaler, HealthMonitor, HealthReport, HealthStatus, ScalingPolicy};
pub use mesh::{MeshSnapshot, ServiceMeshBuilder};
pub use orchestrator::Orchestrator;
pub use registry::{
    DependencyResolver, DiscoveryFilter, ModuleDescriptor, ModuleRecord, ModuleRegistry,
    ModuleState, RegistryError,
};
pub use storage::{MemoryStateStore, StateStore};

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_orchestrator_registration_flow() {
        let orchestrator = Orchestrator::new(OrchestratorConfig::default());
        let registry = orchestrator.registry();

        let outcome = registry
            .register(ModuleDescriptor::new("store", "1.0.0"), false)
            .await
            .unwrap();
        assert_eq!(outcome.state, ModuleState::Ready);

        let records = registry.discover(&DiscoveryFilter::default()).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name(), "store");
    }

    #[tokio::test]
    async fn test_orchestrator_state_roundtrip() {
        let orchestrator = Orchestrator::new(OrchestratorConfig::default());
        orchestrator
            .registry()
            .register(ModuleDescriptor::new("store", "1.0.0"), false)
            .await
            .unwrap();

        let store = MemoryStateStore::new();
        orchestrator.save_state(&store).await.unwrap();

        let restored = Orchestrator::new(OrchestratorConfig::default());
        assert_eq!(restored.load_state(&store).await.unwrap(), 1);
        assert!(restored.registry().get_record("store").await.is_some());
    }
}
