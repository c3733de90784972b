//! Service mesh derivation
//!
//! Derives the connectivity graph (who may call whom) from declared
//! dependencies and interface/capability matching. The mesh is recomputed
//! whenever the registry changes; it is a derived snapshot, never stored
//! state.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::registry::types::{ModuleRecord, ModuleState};
use crate::utils::time::current_timestamp;

/// How an edge was derived
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeVia {
    /// Explicit dependency declaration
    Dependency,
    /// Required interface satisfied through the provider's capabilities
    Interface(String),
}

/// Whether the edge target currently exists and is callable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeStatus {
    Satisfied,
    Pending,
}

/// One directed mesh edge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshEdge {
    /// Calling module
    pub from: String,
    /// Target module; `None` while no provider exists for a required interface
    pub to: Option<String>,
    /// Derivation of the edge
    pub via: EdgeVia,
    /// Current status
    pub status: EdgeStatus,
}

/// Immutable mesh snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeshSnapshot {
    pub edges: Vec<MeshEdge>,
    pub generated_at: u64,
}

impl MeshSnapshot {
    /// Edges originating from the given module
    pub fn edges_from<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MeshEdge> {
        self.edges.iter().filter(move |e| e.from == name)
    }

    /// True when every edge originating from the module is satisfied
    pub fn is_fully_satisfied(&self, name: &str) -> bool {
        self.edges_from(name).all(|e| e.status == EdgeStatus::Satisfied)
    }

    /// Count of (satisfied, pending) edges
    pub fn edge_counts(&self) -> (usize, usize) {
        let satisfied = self
            .edges
            .iter()
            .filter(|e| e.status == EdgeStatus::Satisfied)
            .count();
        (satisfied, self.edges.len() - satisfied)
    }
}

/// Service mesh builder
///
/// Interface contracts map an interface name to the capability tags a
/// provider must carry; a module satisfies an interface only if it both
/// claims the interface and holds every contract tag.
pub struct ServiceMeshBuilder {
    interface_contracts: HashMap<String, Vec<String>>,
}

impl ServiceMeshBuilder {
    /// Create a builder with an explicit contract table
    pub fn new(interface_contracts: HashMap<String, Vec<String>>) -> Self {
        Self { interface_contracts }
    }

    /// Contract-compliance check for one interface name
    pub fn interface_satisfied_by(&self, interface: &str, record: &ModuleRecord) -> bool {
        if !record.descriptor.interfaces.contains(interface) {
            return false;
        }
        match self.interface_contracts.get(interface) {
            Some(required) => required
                .iter()
                .all(|tag| record.descriptor.capabilities.contains(tag)),
            // No contract registered: the claim alone is accepted.
            None => true,
        }
    }

    /// Recompute the full mesh from a registry snapshot
    ///
    /// An unsatisfied dependency never fails the build; the edge is recorded
    /// as pending and the dependent module is left for the registry to mark
    /// `Degraded`. Tombstoned modules neither originate nor satisfy edges.
    pub fn rebuild(&self, records: &[ModuleRecord]) -> MeshSnapshot {
        let live: HashMap<&str, &ModuleRecord> = records
            .iter()
            .filter(|r| r.state != ModuleState::Terminated)
            .map(|r| (r.name(), r))
            .collect();
        let live_names: BTreeSet<&str> = live.keys().copied().collect();

        let mut edges = Vec::new();
        for record in records {
            if record.state == ModuleState::Terminated {
                continue;
            }

            for dep in &record.descriptor.dependencies {
                let status = if live_names.contains(dep.as_str()) {
                    EdgeStatus::Satisfied
                } else {
                    EdgeStatus::Pending
                };
                edges.push(MeshEdge {
                    from: record.name().to_string(),
                    to: Some(dep.clone()),
                    via: EdgeVia::Dependency,
                    status,
                });
            }

            for interface in &record.descriptor.requires {
                // Deterministic provider choice: smallest name wins.
                let provider = live_names
                    .iter()
                    .filter(|name| **name != record.name())
                    .find(|name| self.interface_satisfied_by(interface, live[**name]));
                match provider {
                    Some(provider) => edges.push(MeshEdge {
                        from: record.name().to_string(),
                        to: Some(provider.to_string()),
                        via: EdgeVia::Interface(interface.clone()),
                        status: EdgeStatus::Satisfied,
                    }),
                    None => edges.push(MeshEdge {
                        from: record.name().to_string(),
                        to: None,
                        via: EdgeVia::Interface(interface.clone()),
                        status: EdgeStatus::Pending,
                    }),
                }
            }
        }

        MeshSnapshot {
            edges,
            generated_at: current_timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::types::ModuleDescriptor;

    fn record(descriptor: ModuleDescriptor) -> ModuleRecord {
        let mut r = ModuleRecord::new(descriptor, "local".to_string());
        r.state = ModuleState::Ready;
        r
    }

    #[test]
    fn test_dependency_edges() {
        let builder = ServiceMeshBuilder::new(HashMap::new());
        let records = vec![
            record(ModuleDescriptor::new("a", "1.0.0").with_dependency("b")),
            record(ModuleDescriptor::new("b", "1.0.0")),
        ];
        let mesh = builder.rebuild(&records);
        assert_eq!(mesh.edges.len(), 1);
        assert_eq!(mesh.edges[0].to.as_deref(), Some("b"));
        assert_eq!(mesh.edges[0].status, EdgeStatus::Satisfied);
        assert!(mesh.is_fully_satisfied("a"));
    }

    #[test]
    fn test_missing_dependency_is_pending() {
        let builder = ServiceMeshBuilder::new(HashMap::new());
        let records = vec![record(
            ModuleDescriptor::new("a", "1.0.0").with_dependency("ghost"),
        )];
        let mesh = builder.rebuild(&records);
        assert_eq!(mesh.edges[0].status, EdgeStatus::Pending);
        assert!(!mesh.is_fully_satisfied("a"));
    }

    #[test]
    fn test_interface_contract_requires_capabilities() {
        let contracts = HashMap::from([(
            "store.api".to_string(),
            vec!["kv.read".to_string(), "kv.write".to_string()],
        )]);
        let builder = ServiceMeshBuilder::new(contracts);

        let claims_only = record(ModuleDescriptor::new("half", "1.0.0").with_interface("store.api"));
        assert!(!builder.interface_satisfied_by("store.api", &claims_only));

        let full = record(
            ModuleDescriptor::new("store", "1.0.0")
                .with_interface("store.api")
                .with_capability("kv.read")
                .with_capability("kv.write"),
        );
        assert!(builder.interface_satisfied_by("store.api", &full));

        let consumer = record(ModuleDescriptor::new("app", "1.0.0").with_required_interface("store.api"));
        let mesh = builder.rebuild(&[consumer, full.clone(), claims_only]);
        let edge = mesh.edges_from("app").next().unwrap();
        assert_eq!(edge.to.as_deref(), Some("store"));
        assert_eq!(edge.status, EdgeStatus::Satisfied);
    }
}
