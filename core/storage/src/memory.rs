//! In-memory storage backend for testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;

use drivestore_common::{Error, Result};

use crate::storage::{Listing, Storage};

/// In-memory storage entry.
#[derive(Debug, Clone)]
struct Entry {
    data: Vec<u8>,
    modified: DateTime<Utc>,
    accessed: DateTime<Utc>,
}

/// In-memory storage backend.
///
/// Useful for testing host applications against the `Storage` contract.
/// Names are `/`-separated keys; directories exist implicitly as prefixes
/// of stored names. All data is lost on drop.
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStorage {
    /// Create a new empty memory backend.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn normalize(name: &str) -> Result<String> {
        let key = name.trim_matches('/');
        if key.is_empty() {
            return Err(Error::InvalidInput("Name cannot be empty".to_string()));
        }
        if key.split('/').any(|c| c.is_empty() || c == "." || c == "..") {
            return Err(Error::InvalidInput(format!("Invalid name: {}", name)));
        }
        Ok(key.to_string())
    }

    async fn with_entry<T>(&self, name: &str, f: impl FnOnce(&Entry) -> T) -> Result<T> {
        let key = Self::normalize(name)?;
        let entries = self.entries.read().await;
        entries
            .get(&key)
            .map(f)
            .ok_or_else(|| Error::NotFound(format!("File not found: {}", name)))
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let key = Self::normalize(name)?;
        Ok(self.entries.read().await.contains_key(&key))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let key = Self::normalize(name)?;
        self.entries
            .write()
            .await
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("File not found: {}", name)))
    }

    async fn size(&self, name: &str) -> Result<Option<u64>> {
        self.with_entry(name, |e| Some(e.data.len() as u64)).await
    }

    async fn modified_time(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
        self.with_entry(name, |e| Some(e.modified)).await
    }

    async fn accessed_time(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
        self.with_entry(name, |e| Some(e.accessed)).await
    }

    async fn url(&self, name: &str) -> Result<Option<String>> {
        let key = Self::normalize(name)?;
        self.with_entry(name, |_| Some(format!("memory://{}", key)))
            .await
    }

    async fn open(&self, name: &str) -> Result<Vec<u8>> {
        let key = Self::normalize(name)?;
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(&key)
            .ok_or_else(|| Error::NotFound(format!("File not found: {}", name)))?;
        entry.accessed = Utc::now();
        Ok(entry.data.clone())
    }

    async fn save(&self, name: &str, data: Vec<u8>) -> Result<String> {
        let key = Self::normalize(name)?;
        let mut entries = self.entries.write().await;

        // A stored file cannot also act as a directory prefix, and vice versa.
        let dir_prefix = format!("{}/", key);
        if entries.keys().any(|k| k.starts_with(&dir_prefix)) {
            return Err(Error::AlreadyExists(format!(
                "Directory exists at: {}",
                name
            )));
        }
        let mut parent = key.as_str();
        while let Some((p, _)) = parent.rsplit_once('/') {
            if entries.contains_key(p) {
                return Err(Error::InvalidInput(format!("Parent is a file: {}", p)));
            }
            parent = p;
        }

        let now = Utc::now();
        entries.insert(
            key.clone(),
            Entry {
                data,
                modified: now,
                accessed: now,
            },
        );
        Ok(key)
    }

    async fn listdir(&self, path: &str) -> Result<Listing> {
        let base = path.trim_matches('/');
        let prefix = if base.is_empty() {
            String::new()
        } else {
            format!("{}/", base)
        };

        let entries = self.entries.read().await;
        if !base.is_empty() && entries.contains_key(base) {
            return Err(Error::InvalidInput(format!("Not a directory: {}", path)));
        }

        let mut directories = BTreeSet::new();
        let mut files = BTreeSet::new();
        for key in entries.keys() {
            let Some(relative) = key.strip_prefix(&prefix) else {
                continue;
            };
            match relative.split_once('/') {
                Some((dir, _)) => {
                    directories.insert(dir.to_string());
                }
                None => {
                    files.insert(relative.to_string());
                }
            }
        }

        if !base.is_empty() && directories.is_empty() && files.is_empty() {
            return Err(Error::NotFound(format!("Directory not found: {}", path)));
        }

        Ok(Listing {
            directories: directories.into_iter().collect(),
            files: files.into_iter().collect(),
        })
    }
}
