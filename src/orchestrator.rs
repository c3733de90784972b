//! Orchestrator lifecycle
//!
//! Owns the registry, event bus, health monitor, autoscaler, and federation
//! synchronizer, and drives their background tasks. There is no global
//! instance: the embedding process constructs one, starts it, and passes it
//! by reference to whatever needs it.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::OrchestratorConfig;
use crate::event::bus::EventBus;
use crate::federation::sync::{FederationSync, PeerTransport};
use crate::health::monitor::HealthMonitor;
use crate::health::scaler::{self, AutoScaler};
use crate::registry::manifest::OrchestrationManifest;
use crate::registry::resolver::DependencyResolver;
use crate::registry::store::ModuleRegistry;
use crate::registry::types::{ModuleRecord, RegistrationOutcome, RegistryError};
use crate::storage::StateStore;

const RECORDS_KEY: &str = "registry/records";

/// Top-level orchestration engine
pub struct Orchestrator {
    config: OrchestratorConfig,
    bus: Arc<EventBus>,
    registry: Arc<ModuleRegistry>,
    federation: Option<Arc<FederationSync>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Orchestrator {
    /// Create an orchestrator from configuration
    pub fn new(config: OrchestratorConfig) -> Self {
        let bus = Arc::new(EventBus::new(
            config.events.queue_capacity,
            config.events.history_capacity,
        ));
        let registry = Arc::new(ModuleRegistry::new(
            Arc::clone(&bus),
            config.registry.clone(),
            config.cluster_id.clone(),
        ));
        Self {
            config,
            bus,
            registry,
            federation: None,
            tasks: Vec::new(),
        }
    }

    /// Attach a federation transport, enabling peer synchronization
    pub fn with_transport(mut self, transport: Arc<dyn PeerTransport>) -> Self {
        let federation = FederationSync::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.bus),
            transport,
            &self.config.federation,
            self.config.cluster_id.clone(),
        );
        self.federation = Some(Arc::new(federation));
        self
    }

    /// Event bus handle
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Registry handle
    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// Federation handle, present once a transport is attached
    pub fn federation(&self) -> Option<&Arc<FederationSync>> {
        self.federation.as_ref()
    }

    /// Start background tasks: health sampling, autoscaling, federation
    /// sync, and tombstone purging
    pub async fn start(&mut self) -> anyhow::Result<()> {
        info!(cluster = %self.config.cluster_id, "starting orchestrator");

        let monitor = HealthMonitor::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.bus),
            &self.config.health,
        );
        self.tasks.push(tokio::spawn(monitor.run()));

        let autoscaler = AutoScaler::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.bus),
            &self.config.scaling,
        );
        self.tasks.push(tokio::spawn(autoscaler.run()));

        if let Some(federation) = &self.federation {
            self.tasks.push(tokio::spawn(Arc::clone(federation).run()));
        }

        let registry = Arc::clone(&self.registry);
        let sweep = Duration::from_secs((self.config.registry.tombstone_retention_secs / 2).max(1));
        self.tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                registry.purge_tombstones().await;
            }
        }));

        info!("orchestrator started");
        Ok(())
    }

    /// Register every module from a manifest, dependencies first
    ///
    /// The manifest is resolved as a whole before anything is registered,
    /// so a cyclic manifest fails atomically.
    pub async fn load_manifest(
        &self,
        manifest: OrchestrationManifest,
    ) -> Result<Vec<RegistrationOutcome>, RegistryError> {
        let descriptors = manifest.into_descriptors();
        let resolution = DependencyResolver::resolve(&descriptors)?;
        if !resolution.missing.is_empty() {
            warn!(missing = ?resolution.missing, "manifest declares dependencies on unregistered modules");
        }

        let mut by_name: std::collections::HashMap<String, _> = descriptors
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();

        let mut outcomes = Vec::new();
        for name in &resolution.load_order {
            let descriptor = by_name.remove(name).expect("resolved name came from input");
            outcomes.push(self.registry.register(descriptor, false).await?);
        }
        info!(count = outcomes.len(), "manifest loaded");
        Ok(outcomes)
    }

    /// Persist all records (tombstones included) for restart recovery
    pub async fn save_state(&self, store: &dyn StateStore) -> anyhow::Result<()> {
        let records = self.registry.snapshot_with_tombstones().await;
        let encoded = bincode::serialize(&records)?;
        store.save(RECORDS_KEY, &encoded)?;
        Ok(())
    }

    /// Restore records persisted by a previous run
    pub async fn load_state(&self, store: &dyn StateStore) -> anyhow::Result<usize> {
        let Some(encoded) = store.load(RECORDS_KEY)? else {
            return Ok(0);
        };
        let records: Vec<ModuleRecord> = bincode::deserialize(&encoded)?;
        let count = records.len();
        self.registry.restore_records(records).await;
        info!(count, "restored registry state");
        Ok(count)
    }

    /// Relay a provisioning failure reported by the external orchestrator
    pub async fn report_scaling_failure(&self, module: &str, reason: &str) {
        scaler::publish_action_failure(&self.bus, module, reason).await;
    }

    /// Stop background tasks and close the bus
    pub async fn shutdown(&mut self) {
        info!("shutting down orchestrator");
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.bus.close();
        info!("orchestrator shut down");
    }
}
