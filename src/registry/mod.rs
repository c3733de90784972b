//! Module registry
//!
//! Handles module registration, discovery, manifest parsing, and dependency
//! resolution.

pub mod manifest;
pub mod resolver;
pub mod store;
pub mod types;

pub use manifest::OrchestrationManifest;
pub use resolver::{DependencyResolution, DependencyResolver};
pub use store::{DiscoveryFilter, ModuleRegistry, RemoteApply};
pub use types::{
    Criticality, InstanceHealth, MetricSample, ModuleDescriptor, ModuleRecord, ModuleState,
    RegistrationOutcome, RegistryError,
};
