//! State persistence contract
//!
//! The core keeps no durable state of its own; an embedder may persist
//! module records and sync vectors through this key-value contract for
//! restart recovery.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Mutex;

/// Key-value state store abstraction
///
/// Implemented by whatever store the embedding process uses (an embedded
/// database, a file, a remote KV service).
pub trait StateStore: Send + Sync {
    /// Persist a named blob
    fn save(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Load a named blob; `None` when the key has never been saved
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;
}

/// In-memory store, useful for tests and ephemeral deployments
#[derive(Default)]
pub struct MemoryStateStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn save(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries
            .lock()
            .expect("state store lock poisoned")
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .entries
            .lock()
            .expect("state store lock poisoned")
            .get(key)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let store = MemoryStateStore::new();
        assert!(store.load("missing").unwrap().is_none());
        store.save("records", b"payload").unwrap();
        assert_eq!(store.load("records").unwrap().unwrap(), b"payload");
    }
}
