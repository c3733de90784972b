//! Shared test fixtures
#![allow(dead_code)]

use std::sync::Arc;

use orchestron::config::{OrchestratorConfig, RegistryConfig};
use orchestron::event::EventBus;
use orchestron::registry::{ModuleDescriptor, ModuleRegistry};

/// Build a bus and registry pair with the given registry config
pub fn registry_with_config(config: RegistryConfig, cluster_id: &str) -> (Arc<EventBus>, Arc<ModuleRegistry>) {
    let defaults = OrchestratorConfig::default();
    let bus = Arc::new(EventBus::new(
        defaults.events.queue_capacity,
        defaults.events.history_capacity,
    ));
    let registry = Arc::new(ModuleRegistry::new(Arc::clone(&bus), config, cluster_id));
    (bus, registry)
}

/// Build a bus and registry pair with default configuration
pub fn test_registry() -> (Arc<EventBus>, Arc<ModuleRegistry>) {
    registry_with_config(RegistryConfig::default(), "local")
}

/// Descriptor with the given dependencies, version 1.0.0
pub fn descriptor(name: &str, deps: &[&str]) -> ModuleDescriptor {
    let mut d = ModuleDescriptor::new(name, "1.0.0");
    for dep in deps {
        d = d.with_dependency(*dep);
    }
    d
}
