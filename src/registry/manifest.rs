//! Module manifest parsing and validation
//!
//! A manifest is the load-time list of module descriptors an embedding
//! process registers at startup; discovery stays a pure registry query.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::registry::types::{ModuleDescriptor, RegistryError};

/// Load-time module manifest (TOML structure)
///
/// ```toml
/// [[module]]
/// name = "store"
/// version = "1.2.0"
/// capabilities = ["kv.read", "kv.write"]
/// interfaces = ["store.api"]
///
/// [[module]]
/// name = "ledger"
/// version = "0.4.1"
/// dependencies = ["store"]
/// requires = ["store.api"]
/// criticality = "high"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationManifest {
    /// Declared modules, in manifest order
    #[serde(default, rename = "module")]
    pub modules: Vec<ModuleDescriptor>,
}

impl OrchestrationManifest {
    /// Load and validate a manifest from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RegistryError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            RegistryError::InvalidManifest(format!("failed to read manifest file: {e}"))
        })?;
        Self::from_str(&contents)
    }

    /// Parse and validate a manifest from TOML text
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, RegistryError> {
        let manifest: OrchestrationManifest = toml::from_str(contents).map_err(|e| {
            RegistryError::InvalidManifest(format!("failed to parse manifest TOML: {e}"))
        })?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<(), RegistryError> {
        let mut seen = HashSet::new();
        for module in &self.modules {
            if module.name.trim().is_empty() {
                return Err(RegistryError::InvalidManifest(
                    "module name cannot be empty".to_string(),
                ));
            }
            if module.version.trim().is_empty() {
                return Err(RegistryError::InvalidManifest(format!(
                    "module {} is missing a version",
                    module.name
                )));
            }
            if !seen.insert(module.name.as_str()) {
                return Err(RegistryError::InvalidManifest(format!(
                    "duplicate module declaration: {}",
                    module.name
                )));
            }
        }
        Ok(())
    }

    /// Consume the manifest, yielding its descriptors
    pub fn into_descriptors(self) -> Vec<ModuleDescriptor> {
        self.modules
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_manifest() {
        let manifest = OrchestrationManifest::from_str(
            r#"
            [[module]]
            name = "store"
            version = "1.2.0"
            capabilities = ["kv.read"]
            interfaces = ["store.api"]

            [[module]]
            name = "ledger"
            version = "0.4.1"
            dependencies = ["store"]
            requires = ["store.api"]
            criticality = "high"

            [module.scaling]
            min_instances = 2
            scale_up_threshold = 75.0
            "#,
        )
        .unwrap();

        assert_eq!(manifest.modules.len(), 2);
        let ledger = &manifest.modules[1];
        assert_eq!(ledger.dependencies, vec!["store"]);
        let scaling = ledger.scaling.as_ref().unwrap();
        assert_eq!(scaling.min_instances, 2);
        assert_eq!(scaling.scale_up_threshold, 75.0);
        // Omitted policy fields fall back to defaults.
        assert_eq!(scaling.cooldown_samples, 3);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = OrchestrationManifest::from_str(
            r#"
            [[module]]
            name = "store"
            version = "1.0.0"

            [[module]]
            name = "store"
            version = "2.0.0"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidManifest(_)));
    }
}
