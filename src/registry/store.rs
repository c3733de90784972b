//! Module registry
//!
//! Authoritative store of module records. Writes are serialized behind a
//! single async lock; reads hand out snapshots so no caller ever holds a
//! live reference into registry state. Every committed mutation publishes
//! its event before the call returns success.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::RegistryConfig;
use crate::event::bus::EventBus;
use crate::event::types::{Event, EventKind, REGISTRY_SOURCE};
use crate::health::monitor::{HealthReport, HealthStatus};
use crate::mesh::{MeshSnapshot, ServiceMeshBuilder};
use crate::registry::resolver::{DependencyResolution, DependencyResolver};
use crate::registry::types::{
    InstanceHealth, ModuleDescriptor, ModuleRecord, ModuleState, RegistrationOutcome, RegistryError,
};
use crate::utils::time::current_timestamp;

/// Outcome of applying a record received from a federation peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteApply {
    /// The incoming record won and local state changed
    Applied,
    /// The local record was newer (or equal and winning the tie-break)
    Ignored,
}

/// Discovery filter; all set conditions are ANDed
#[derive(Debug, Clone, Default)]
pub struct DiscoveryFilter {
    /// Module must provide this capability tag
    pub capability: Option<String>,
    /// Module must claim this interface contract
    pub interface: Option<String>,
    /// Module must be in this lifecycle state
    pub state: Option<ModuleState>,
}

impl DiscoveryFilter {
    pub fn with_capability(mut self, tag: impl Into<String>) -> Self {
        self.capability = Some(tag.into());
        self
    }

    pub fn with_interface(mut self, name: impl Into<String>) -> Self {
        self.interface = Some(name.into());
        self
    }

    pub fn with_state(mut self, state: ModuleState) -> Self {
        self.state = Some(state);
        self
    }

    fn matches(&self, record: &ModuleRecord) -> bool {
        if let Some(capability) = &self.capability {
            if !record.descriptor.capabilities.contains(capability) {
                return false;
            }
        }
        if let Some(interface) = &self.interface {
            if !record.descriptor.interfaces.contains(interface) {
                return false;
            }
        }
        if let Some(state) = self.state {
            if record.state != state {
                return false;
            }
        }
        true
    }
}

struct RegistryInner {
    records: BTreeMap<String, ModuleRecord>,
    mesh: MeshSnapshot,
    health: HealthReport,
    /// Origin clusters currently excluded from discovery
    excluded_origins: HashSet<String>,
}

/// Module registry
pub struct ModuleRegistry {
    inner: Arc<RwLock<RegistryInner>>,
    bus: Arc<EventBus>,
    mesh_builder: ServiceMeshBuilder,
    config: RegistryConfig,
    cluster_id: String,
}

impl ModuleRegistry {
    /// Create an empty registry bound to an event bus
    pub fn new(bus: Arc<EventBus>, config: RegistryConfig, cluster_id: impl Into<String>) -> Self {
        let mesh_builder = ServiceMeshBuilder::new(config.interface_contracts.clone());
        Self {
            inner: Arc::new(RwLock::new(RegistryInner {
                records: BTreeMap::new(),
                mesh: MeshSnapshot::default(),
                health: HealthReport::default(),
                excluded_origins: HashSet::new(),
            })),
            bus,
            mesh_builder,
            config,
            cluster_id: cluster_id.into(),
        }
    }

    /// Register a module
    ///
    /// Fails with `RegistrationConflict` when the name is already present
    /// and `replace` is false, and with `CyclicDependency` when the
    /// addition would close a cycle; in both cases registry state is left
    /// untouched. On success the module settles into its evaluated state
    /// and `module.registered` is published before the call returns.
    pub async fn register(
        &self,
        descriptor: ModuleDescriptor,
        replace: bool,
    ) -> Result<RegistrationOutcome, RegistryError> {
        self.validate_descriptor(&descriptor)?;

        let (outcome, events) = {
            let mut inner = self.inner.write().await;

            let existing = inner.records.get(&descriptor.name);
            let replaced = match existing {
                Some(record) if !record.is_tombstone() => {
                    if !replace {
                        return Err(RegistryError::RegistrationConflict {
                            name: descriptor.name.clone(),
                            existing: record.descriptor.version.clone(),
                        });
                    }
                    true
                }
                // A tombstone may always be re-registered.
                Some(_) => true,
                None => false,
            };

            // Speculative resolution: validate that the addition keeps the
            // committed graph acyclic before touching any state.
            let mut graph: BTreeMap<String, Vec<String>> = inner
                .records
                .values()
                .filter(|r| !r.is_tombstone() && r.name() != descriptor.name)
                .map(|r| (r.name().to_string(), r.descriptor.dependencies.clone()))
                .collect();
            graph.insert(descriptor.name.clone(), descriptor.dependencies.clone());
            DependencyResolver::resolve_graph(&graph)?;

            let prior_clock = inner
                .records
                .get(&descriptor.name)
                .map(|r| r.clock)
                .unwrap_or(0);
            let name = descriptor.name.clone();
            let version = descriptor.version.clone();
            let mut record = ModuleRecord::new(descriptor, self.cluster_id.clone());
            record.clock = prior_clock + 1;
            inner.records.insert(name.clone(), record);

            let mut events = Vec::new();
            let changes = self.reevaluate(&mut inner);
            let state = inner.records[&name].state;
            events.push(Event::local(
                name.clone(),
                EventKind::ModuleRegistered {
                    name: name.clone(),
                    version,
                    state,
                },
            ));
            for (changed, new_state) in changes {
                if changed != name {
                    events.push(Event::local(
                        changed.clone(),
                        EventKind::ModuleUpdated {
                            name: changed,
                            state: new_state,
                        },
                    ));
                }
            }
            events.push(self.mesh_event(&inner));

            let outcome = RegistrationOutcome {
                record_id: inner.records[&name].record_id,
                replaced,
                state,
            };
            info!(module = %name, replaced, ?state, "module registered");
            (outcome, events)
        };

        self.publish_all(events).await;
        Ok(outcome)
    }

    /// Unregister a module, leaving a tombstone for federation convergence
    pub async fn unregister(&self, name: &str) -> Result<(), RegistryError> {
        let events = {
            let mut inner = self.inner.write().await;
            let record = inner
                .records
                .get_mut(name)
                .filter(|r| !r.is_tombstone())
                .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;

            record.state = ModuleState::Terminated;
            record.clock += 1;
            record.terminated_at = Some(current_timestamp());

            let mut events = vec![Event::local(
                name.to_string(),
                EventKind::ModuleUnregistered {
                    name: name.to_string(),
                },
            )];
            for (changed, new_state) in self.reevaluate(&mut inner) {
                events.push(Event::local(
                    changed.clone(),
                    EventKind::ModuleUpdated {
                        name: changed,
                        state: new_state,
                    },
                ));
            }
            events.push(self.mesh_event(&inner));
            info!(module = %name, "module unregistered");
            events
        };

        self.publish_all(events).await;
        Ok(())
    }

    /// Query modules matching a filter
    ///
    /// Returns cloned snapshots ordered by name ascending. Tombstones are
    /// only visible when explicitly filtered by `Terminated` state, and
    /// records from excluded federation origins are never returned.
    pub async fn discover(&self, filter: &DiscoveryFilter) -> Vec<ModuleRecord> {
        let inner = self.inner.read().await;
        inner
            .records
            .values()
            .filter(|r| {
                if r.is_tombstone() && filter.state != Some(ModuleState::Terminated) {
                    return false;
                }
                if inner.excluded_origins.contains(&r.origin_cluster) {
                    return false;
                }
                filter.matches(r)
            })
            .cloned()
            .collect()
    }

    /// Latest system health aggregate (read-only)
    pub async fn get_health(&self) -> HealthReport {
        self.inner.read().await.health.clone()
    }

    /// Current service mesh snapshot
    pub async fn mesh(&self) -> MeshSnapshot {
        self.inner.read().await.mesh.clone()
    }

    /// Snapshot of all live records
    pub async fn snapshot(&self) -> Vec<ModuleRecord> {
        let inner = self.inner.read().await;
        inner
            .records
            .values()
            .filter(|r| !r.is_tombstone())
            .cloned()
            .collect()
    }

    /// Snapshot including tombstones (federation delta source)
    pub async fn snapshot_with_tombstones(&self) -> Vec<ModuleRecord> {
        self.inner.read().await.records.values().cloned().collect()
    }

    /// Fetch one record by name
    pub async fn get_record(&self, name: &str) -> Option<ModuleRecord> {
        self.inner.read().await.records.get(name).cloned()
    }

    /// Compute the initialization order over the committed graph
    pub async fn resolve_order(&self) -> Result<DependencyResolution, RegistryError> {
        let inner = self.inner.read().await;
        let graph: BTreeMap<String, Vec<String>> = inner
            .records
            .values()
            .filter(|r| !r.is_tombstone())
            .map(|r| (r.name().to_string(), r.descriptor.dependencies.clone()))
            .collect();
        DependencyResolver::resolve_graph(&graph)
    }

    /// Ingest a self-reported instance health sample
    pub async fn report_instance_health(
        &self,
        module: &str,
        instance_id: &str,
        healthy: bool,
    ) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().await;
        let record = inner
            .records
            .get_mut(module)
            .filter(|r| !r.is_tombstone())
            .ok_or_else(|| RegistryError::NotFound(module.to_string()))?;
        let now = current_timestamp();
        record.instances.insert(
            instance_id.to_string(),
            InstanceHealth {
                instance_id: instance_id.to_string(),
                healthy,
                reported_at: now,
            },
        );
        record.last_health = Some(now);
        Ok(())
    }

    /// Append a metric sample to a module's bounded window
    pub async fn record_metric(&self, module: &str, value: f64) -> Result<(), RegistryError> {
        let window = self.config.metrics_window;
        let mut inner = self.inner.write().await;
        let record = inner
            .records
            .get_mut(module)
            .filter(|r| !r.is_tombstone())
            .ok_or_else(|| RegistryError::NotFound(module.to_string()))?;
        record.push_metric(value, window);
        Ok(())
    }

    /// Apply the health monitor's fold: per-module states plus the report
    ///
    /// Promotion back to `Ready` additionally requires every mesh edge of
    /// the module to be satisfied.
    pub async fn apply_health_fold(
        &self,
        statuses: &[(String, HealthStatus)],
        report: HealthReport,
    ) {
        let events = {
            let mut inner = self.inner.write().await;
            let mut events = Vec::new();
            for (name, status) in statuses {
                let satisfied = inner.mesh.is_fully_satisfied(name);
                let Some(record) = inner
                    .records
                    .get_mut(name)
                    .filter(|r| !r.is_tombstone())
                else {
                    continue;
                };
                let desired = match status {
                    HealthStatus::Healthy if satisfied => ModuleState::Ready,
                    _ => ModuleState::Degraded,
                };
                if record.state != desired
                    && ModuleState::can_transition(record.state, desired)
                {
                    record.state = desired;
                    record.clock += 1;
                    events.push(Event::local(
                        name.clone(),
                        EventKind::ModuleUpdated {
                            name: name.clone(),
                            state: desired,
                        },
                    ));
                }
            }
            inner.health = report;
            events
        };
        self.publish_all(events).await;
    }

    /// Adjust the autoscaler's desired instance count for a module
    pub async fn adjust_desired_instances(
        &self,
        module: &str,
        delta: i64,
    ) -> Result<u32, RegistryError> {
        let mut inner = self.inner.write().await;
        let record = inner
            .records
            .get_mut(module)
            .filter(|r| !r.is_tombstone())
            .ok_or_else(|| RegistryError::NotFound(module.to_string()))?;
        let desired = (record.desired_instances as i64 + delta).max(0) as u32;
        record.desired_instances = desired;
        Ok(desired)
    }

    /// Apply a record received from a federation peer
    ///
    /// Last-writer-wins by logical clock, ties broken by the writing
    /// cluster id, so both sides converge without negotiation. A winning
    /// record re-emits the matching local event tagged with the origin
    /// cluster.
    pub async fn apply_remote(&self, incoming: ModuleRecord, from_cluster: &str) -> RemoteApply {
        let events = {
            let mut inner = self.inner.write().await;
            let name = incoming.name().to_string();
            let wins = match inner.records.get(&name) {
                None => true,
                Some(local) => {
                    incoming.clock > local.clock
                        || (incoming.clock == local.clock
                            && incoming.origin_cluster > local.origin_cluster)
                }
            };
            if !wins {
                return RemoteApply::Ignored;
            }

            let was_present = inner
                .records
                .get(&name)
                .map(|r| !r.is_tombstone())
                .unwrap_or(false);
            let version = incoming.descriptor.version.clone();
            let state = incoming.state;
            inner.records.insert(name.clone(), incoming);

            let kind = if was_present || state == ModuleState::Terminated {
                EventKind::ModuleUpdated {
                    name: name.clone(),
                    state,
                }
            } else {
                EventKind::ModuleRegistered {
                    name: name.clone(),
                    version,
                    state,
                }
            };
            let mut events = vec![Event::federated(name.clone(), kind, from_cluster)];
            for (changed, new_state) in self.reevaluate(&mut inner) {
                if changed != name {
                    events.push(Event::federated(
                        changed.clone(),
                        EventKind::ModuleUpdated {
                            name: changed,
                            state: new_state,
                        },
                        from_cluster,
                    ));
                }
            }
            events.push(self.mesh_event(&inner));
            debug!(module = %name, from = %from_cluster, "applied federated record");
            events
        };

        self.publish_all(events).await;
        RemoteApply::Applied
    }

    /// Exclude or re-admit records from a federation origin in discovery
    pub async fn set_origin_excluded(&self, cluster_id: &str, excluded: bool) {
        let mut inner = self.inner.write().await;
        if excluded {
            inner.excluded_origins.insert(cluster_id.to_string());
        } else {
            inner.excluded_origins.remove(cluster_id);
        }
    }

    /// Drop tombstones older than the configured retention window
    pub async fn purge_tombstones(&self) -> usize {
        let retention = self.config.tombstone_retention_secs;
        let cutoff = current_timestamp().saturating_sub(retention);
        let mut inner = self.inner.write().await;
        let before = inner.records.len();
        inner.records.retain(|_, record| {
            !record.is_tombstone() || record.terminated_at.map(|t| t > cutoff).unwrap_or(true)
        });
        let purged = before - inner.records.len();
        if purged > 0 {
            debug!(purged, "purged expired tombstones");
        }
        purged
    }

    /// Replace all records wholesale (restart recovery path)
    pub async fn restore_records(&self, records: Vec<ModuleRecord>) {
        let mut inner = self.inner.write().await;
        inner.records = records
            .into_iter()
            .map(|r| (r.name().to_string(), r))
            .collect();
        let snapshot: Vec<ModuleRecord> = inner.records.values().cloned().collect();
        inner.mesh = self.mesh_builder.rebuild(&snapshot);
    }

    /// Rebuild the mesh and settle every module's lifecycle state
    ///
    /// A module is `Ready` only when all its edges are satisfied and its
    /// own health checks pass; a module with no instance reports yet passes
    /// by default. Returns the state changes applied.
    fn reevaluate(&self, inner: &mut RegistryInner) -> Vec<(String, ModuleState)> {
        let snapshot: Vec<ModuleRecord> = inner.records.values().cloned().collect();
        inner.mesh = self.mesh_builder.rebuild(&snapshot);

        let mut changes = Vec::new();
        for record in inner.records.values_mut() {
            if record.is_tombstone() {
                continue;
            }
            let satisfied = inner.mesh.is_fully_satisfied(record.name());
            let healthy = record.instances_healthy().unwrap_or(true);
            let desired = if satisfied && healthy {
                ModuleState::Ready
            } else {
                ModuleState::Degraded
            };
            if record.state != desired && ModuleState::can_transition(record.state, desired) {
                record.state = desired;
                record.clock += 1;
                changes.push((record.name().to_string(), desired));
            }
        }
        changes
    }

    fn mesh_event(&self, inner: &RegistryInner) -> Event {
        let (satisfied, pending) = inner.mesh.edge_counts();
        Event::local(REGISTRY_SOURCE, EventKind::MeshRebuilt { satisfied, pending })
    }

    fn validate_descriptor(&self, descriptor: &ModuleDescriptor) -> Result<(), RegistryError> {
        if descriptor.name.trim().is_empty() {
            return Err(RegistryError::InvalidDescriptor(
                "module name cannot be empty".to_string(),
            ));
        }
        if descriptor.version.trim().is_empty() {
            return Err(RegistryError::InvalidDescriptor(
                "module version cannot be empty".to_string(),
            ));
        }
        if descriptor
            .dependencies
            .iter()
            .any(|d| d == &descriptor.name)
        {
            return Err(RegistryError::InvalidDescriptor(format!(
                "module {} cannot depend on itself",
                descriptor.name
            )));
        }
        let mut seen = HashSet::new();
        for dep in &descriptor.dependencies {
            if !seen.insert(dep.as_str()) {
                return Err(RegistryError::InvalidDescriptor(format!(
                    "duplicate dependency declaration: {dep}"
                )));
            }
        }

        // Closed-vocabulary checks only apply when a vocabulary is
        // configured; an empty vocabulary leaves the tag space open.
        if !self.config.capability_vocabulary.is_empty() {
            for tag in &descriptor.capabilities {
                if !self.config.capability_vocabulary.contains(tag) {
                    return Err(RegistryError::InvalidDescriptor(format!(
                        "unknown capability tag: {tag}"
                    )));
                }
            }
        }
        if !self.config.interface_vocabulary.is_empty() {
            for interface in descriptor.interfaces.iter().chain(descriptor.requires.iter()) {
                if !self.config.interface_vocabulary.contains(interface) {
                    return Err(RegistryError::InvalidDescriptor(format!(
                        "unknown interface contract: {interface}"
                    )));
                }
            }
        }
        Ok(())
    }

    async fn publish_all(&self, events: Vec<Event>) {
        for event in events {
            if let Err(e) = self.bus.publish(event).await {
                warn!("failed to publish registry event: {e}");
            }
        }
    }
}
