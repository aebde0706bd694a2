//! Storage trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use drivestore_common::Result;

/// Result of listing a storage path: immediate child directories and files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    /// Names of child directories.
    pub directories: Vec<String>,
    /// Names of child files.
    pub files: Vec<String>,
}

/// Generic named-blob storage interface.
///
/// Names are backend-specific: the Google Drive backend treats them as Drive
/// file IDs, the memory backend as `/`-separated keys. Metadata getters
/// return `Ok(None)` when the backend has no value for that attribute.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Get the backend name (e.g., "gdrive", "memory").
    fn name(&self) -> &str;

    /// Check whether `name` is currently retrievable.
    async fn exists(&self, name: &str) -> Result<bool>;

    /// Delete the blob stored under `name`.
    ///
    /// # Errors
    /// - Not found
    /// - Remote rejection of the request
    async fn delete(&self, name: &str) -> Result<()>;

    /// Size in bytes, if the backend knows it.
    async fn size(&self, name: &str) -> Result<Option<u64>>;

    /// Last modification time.
    async fn modified_time(&self, name: &str) -> Result<Option<DateTime<Utc>>>;

    /// Last access time.
    async fn accessed_time(&self, name: &str) -> Result<Option<DateTime<Utc>>>;

    /// A link that serves the blob's content.
    async fn url(&self, name: &str) -> Result<Option<String>>;

    /// Read the complete content of `name`.
    async fn open(&self, name: &str) -> Result<Vec<u8>>;

    /// Store `data` under `name`, returning the name it was stored as.
    async fn save(&self, name: &str, data: Vec<u8>) -> Result<String>;

    /// List the immediate children of `path`.
    async fn listdir(&self, path: &str) -> Result<Listing>;
}
