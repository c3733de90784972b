//! Core registry types
//!
//! Descriptors, records, lifecycle states, and registry errors.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use thiserror::Error;
use uuid::Uuid;

use crate::health::scaler::ScalingPolicy;
use crate::utils::time::current_timestamp;

/// Module lifecycle state
///
/// Transitions are monotonic except for `Ready ⇄ Degraded`:
/// `Uninitialized → Ready/Degraded → Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleState {
    /// Registered but not yet evaluated
    Uninitialized,
    /// All dependency edges satisfied and health checks pass
    Ready,
    /// Missing dependencies or failing health checks
    Degraded,
    /// Unregistered; retained as a tombstone for federation convergence
    Terminated,
}

impl ModuleState {
    /// Check whether a transition between two states is permitted
    pub fn can_transition(from: ModuleState, to: ModuleState) -> bool {
        use ModuleState::*;
        match (from, to) {
            (Uninitialized, Ready) | (Uninitialized, Degraded) | (Uninitialized, Terminated) => {
                true
            }
            (Ready, Degraded) | (Degraded, Ready) => true,
            (Ready, Terminated) | (Degraded, Terminated) => true,
            _ => false,
        }
    }
}

/// Declared criticality, used to weight a module in the system-wide health fold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Criticality {
    Low,
    #[default]
    Normal,
    High,
}

/// Immutable module declaration supplied by the caller at registration time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// Module name (unique identifier within a registry instance)
    pub name: String,
    /// Module version (semantic versioning)
    pub version: String,
    /// Names of modules this module depends on (ordered, duplicates rejected)
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Capability tags this module provides
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    /// Interface contracts this module claims to satisfy
    #[serde(default)]
    pub interfaces: BTreeSet<String>,
    /// Interface contracts this module requires from some other module
    #[serde(default)]
    pub requires: BTreeSet<String>,
    /// Weight of this module in the system health aggregate
    #[serde(default)]
    pub criticality: Criticality,
    /// Optional autoscaling policy for this module
    #[serde(default)]
    pub scaling: Option<ScalingPolicy>,
}

impl ModuleDescriptor {
    /// Create a minimal descriptor with the given name and version
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            dependencies: Vec::new(),
            capabilities: BTreeSet::new(),
            interfaces: BTreeSet::new(),
            requires: BTreeSet::new(),
            criticality: Criticality::Normal,
            scaling: None,
        }
    }

    /// Add a dependency on another module
    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }

    /// Add a provided capability tag
    pub fn with_capability(mut self, tag: impl Into<String>) -> Self {
        self.capabilities.insert(tag.into());
        self
    }

    /// Add a satisfied interface contract
    pub fn with_interface(mut self, name: impl Into<String>) -> Self {
        self.interfaces.insert(name.into());
        self
    }

    /// Add a required interface contract
    pub fn with_required_interface(mut self, name: impl Into<String>) -> Self {
        self.requires.insert(name.into());
        self
    }

    /// Set criticality
    pub fn with_criticality(mut self, criticality: Criticality) -> Self {
        self.criticality = criticality;
        self
    }

    /// Attach an autoscaling policy
    pub fn with_scaling(mut self, policy: ScalingPolicy) -> Self {
        self.scaling = Some(policy);
        self
    }
}

/// Health report for a single module instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceHealth {
    /// Instance identifier (assigned by the external orchestrator)
    pub instance_id: String,
    /// Whether the instance reported itself healthy
    pub healthy: bool,
    /// Unix timestamp of the report
    pub reported_at: u64,
}

/// Single numeric metric sample
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MetricSample {
    pub value: f64,
    pub recorded_at: u64,
}

/// Mutable registry entry wrapping a descriptor
///
/// Created on registration, mutated only by the registry and the health
/// monitor, destroyed on tombstone purge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleRecord {
    /// Registry-assigned record id
    pub record_id: Uuid,
    /// The registered descriptor
    pub descriptor: ModuleDescriptor,
    /// Current lifecycle state
    pub state: ModuleState,
    /// Per-module logical clock; incremented on every local mutation
    pub clock: u64,
    /// Cluster that last wrote this record
    pub origin_cluster: String,
    /// Timestamp of the most recent instance health report
    pub last_health: Option<u64>,
    /// Per-instance health reports, keyed by instance id
    pub instances: HashMap<String, InstanceHealth>,
    /// Bounded window of metric samples (oldest first)
    pub metrics: VecDeque<MetricSample>,
    /// Instance count the autoscaler currently wants
    pub desired_instances: u32,
    /// Set when the record became a tombstone
    pub terminated_at: Option<u64>,
}

impl ModuleRecord {
    /// Create a fresh record for a newly registered descriptor
    pub fn new(descriptor: ModuleDescriptor, origin_cluster: String) -> Self {
        let desired = descriptor
            .scaling
            .as_ref()
            .map(|p| p.min_instances)
            .unwrap_or(1);
        Self {
            record_id: Uuid::new_v4(),
            descriptor,
            state: ModuleState::Uninitialized,
            clock: 1,
            origin_cluster,
            last_health: None,
            instances: HashMap::new(),
            metrics: VecDeque::new(),
            desired_instances: desired,
            terminated_at: None,
        }
    }

    /// Module name shorthand
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Whether this record is a tombstone
    pub fn is_tombstone(&self) -> bool {
        self.state == ModuleState::Terminated
    }

    /// Push a metric sample, evicting the oldest beyond `window`
    pub fn push_metric(&mut self, value: f64, window: usize) {
        self.metrics.push_back(MetricSample {
            value,
            recorded_at: current_timestamp(),
        });
        while self.metrics.len() > window {
            self.metrics.pop_front();
        }
    }

    /// Majority-of-instances health fold
    ///
    /// Returns `None` when no instance has reported yet.
    pub fn instances_healthy(&self) -> Option<bool> {
        if self.instances.is_empty() {
            return None;
        }
        let healthy = self.instances.values().filter(|i| i.healthy).count();
        Some(healthy * 2 > self.instances.len())
    }
}

/// Outcome of a successful registration
#[derive(Debug, Clone)]
pub struct RegistrationOutcome {
    /// Registry-assigned record id
    pub record_id: Uuid,
    /// True when an existing registration was replaced
    pub replaced: bool,
    /// State the module settled in after mesh evaluation
    pub state: ModuleState,
}

/// Registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("module {name} already registered with version {existing}")]
    RegistrationConflict { name: String, existing: String },

    #[error("cyclic dependency among modules: {members:?}")]
    CyclicDependency { members: Vec<String> },

    #[error("module not found: {0}")]
    NotFound(String),

    #[error("invalid module descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("invalid module manifest: {0}")]
    InvalidManifest(String),
}
