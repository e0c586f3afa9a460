//! Cloud store registry for resolving a backend from configuration.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use nivelver_common::{Error, Result};

use crate::cloud::CloudStore;

/// Factory function type for creating cloud stores.
pub type CloudFactory = Box<dyn Fn(Value) -> Result<Arc<dyn CloudStore>> + Send + Sync>;

/// Registry of cloud store factories, keyed by backend name.
pub struct CloudRegistry {
    factories: HashMap<String, CloudFactory>,
}

impl CloudRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a backend factory.
    ///
    /// # Errors
    /// - Returns error if name is already registered
    pub fn register(&mut self, name: impl Into<String>, factory: CloudFactory) -> Result<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(Error::AlreadyExists(format!(
                "Cloud store '{}' is already registered",
                name
            )));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Build a cloud store by backend name and configuration.
    ///
    /// # Errors
    /// - Backend not registered
    /// - Configuration invalid for the backend
    pub fn resolve(&self, name: &str, config: Value) -> Result<Arc<dyn CloudStore>> {
        let factory = self.factories.get(name).ok_or_else(|| {
            Error::NotFound(format!("Cloud store '{}' is not registered", name))
        })?;
        factory(config)
    }

    /// Registered backend names, sorted.
    pub fn backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn has_backend(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl Default for CloudRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a registry with the built-in backends.
pub fn create_default_registry() -> CloudRegistry {
    let mut factories: HashMap<String, CloudFactory> = HashMap::new();
    factories.insert(
        "memory".to_string(),
        Box::new(|_config| Ok(Arc::new(crate::memory::MemoryCloudStore::new()))),
    );
    factories.insert(
        "firestore".to_string(),
        Box::new(crate::firestore::create_firestore_store),
    );
    CloudRegistry { factories }
}
