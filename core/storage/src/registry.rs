//! Backend registry for resolving storage by name.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use drivestore_common::{Error, Result};

use crate::storage::Storage;

/// Factory function type for creating storage backends.
pub type StorageFactory = Box<dyn Fn(Value) -> Result<Arc<dyn Storage>> + Send + Sync>;

/// Registry for storage backend factories.
///
/// Lets a host application pick a backend by name and hand it its
/// configuration as a JSON value.
pub struct StorageRegistry {
    factories: HashMap<String, StorageFactory>,
}

impl StorageRegistry {
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
    pub fn register(&mut self, name: impl Into<String>, factory: StorageFactory) -> Result<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(Error::AlreadyExists(format!(
                "Storage backend '{}' is already registered",
                name
            )));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Resolve a backend by name and configuration.
    ///
    /// # Errors
    /// - Backend not registered
    /// - Configuration invalid for the backend
    pub fn resolve(&self, name: &str, config: Value) -> Result<Arc<dyn Storage>> {
        let factory = self.factories.get(name).ok_or_else(|| {
            Error::NotFound(format!("Storage backend '{}' is not registered", name))
        })?;
        factory(config)
    }

    /// Get list of registered backend names, sorted.
    pub fn backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a backend is registered.
    pub fn has_backend(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl Default for StorageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a registry with the built-in backends.
pub fn create_default_registry() -> StorageRegistry {
    let mut factories: HashMap<String, StorageFactory> = HashMap::new();

    factories.insert(
        "memory".to_string(),
        Box::new(|_config| Ok(Arc::new(crate::memory::MemoryStorage::new()))),
    );
    factories.insert(
        "gdrive".to_string(),
        Box::new(crate::gdrive::create_gdrive_storage),
    );

    StorageRegistry { factories }
}
