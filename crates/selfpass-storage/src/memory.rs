//! In-memory storage backend.
//!
//! Keeps every document in a `BTreeMap` behind a `RwLock`. Nothing survives
//! a restart, which makes it the right backend for tests and for throwaway
//! instances started with `SELFPASS_STORAGE=memory`.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{StorageBackend, StorageError};

/// An in-memory storage backend backed by a sorted map.
///
/// Clones share the same underlying map.
///
/// # Examples
///
/// ```
/// # use selfpass_storage::{MemoryBackend, StorageBackend};
/// # #[tokio::main]
/// # async fn main() {
/// let backend = MemoryBackend::new();
/// backend.put("config/selfpass.xml", b"<PwmConfiguration/>").await.unwrap();
/// assert!(backend.exists("config/selfpass.xml").await.unwrap());
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    entries: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryBackend {
    /// Create a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend pre-populated with the given documents.
    #[must_use]
    pub fn with_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<u8>)>,
        K: Into<String>,
    {
        let map = entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self {
            entries: Arc::new(RwLock::new(map)),
        }
    }
}

#[async_trait::async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey {
                key: String::new(),
                reason: "key must not be empty".to_owned(),
            });
        }
        self.entries
            .write()
            .await
            .insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.to_owned()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.entries.read().await.contains_key(key))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_document_is_none() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.get("config/selfpass.xml").await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_replaces_previous_document() {
        let backend = MemoryBackend::new();
        backend.put("config/selfpass.xml", b"v1").await.unwrap();
        backend.put("config/selfpass.xml", b"v2").await.unwrap();
        assert_eq!(
            backend.get("config/selfpass.xml").await.unwrap(),
            Some(b"v2".to_vec())
        );
    }

    #[tokio::test]
    async fn empty_key_is_rejected() {
        let backend = MemoryBackend::new();
        let result = backend.put("", b"x").await;
        assert!(matches!(result, Err(StorageError::InvalidKey { .. })));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let backend = MemoryBackend::new();
        backend.put("config/a.xml", b"1").await.unwrap();
        backend.delete("config/a.xml").await.unwrap();
        backend.delete("config/a.xml").await.unwrap();
        assert!(!backend.exists("config/a.xml").await.unwrap());
    }

    #[tokio::test]
    async fn list_only_returns_prefixed_keys() {
        let backend = MemoryBackend::with_entries([
            ("config/selfpass.xml", b"1".to_vec()),
            ("config/backup/1.xml", b"2".to_vec()),
            ("logs/today", b"3".to_vec()),
        ]);
        let keys = backend.list("config/").await.unwrap();
        assert_eq!(keys, vec!["config/backup/1.xml", "config/selfpass.xml"]);
    }

    #[tokio::test]
    async fn clones_share_entries() {
        let backend = MemoryBackend::new();
        let other = backend.clone();
        backend.put("k", b"v").await.unwrap();
        assert_eq!(other.get("k").await.unwrap(), Some(b"v".to_vec()));
    }
}
