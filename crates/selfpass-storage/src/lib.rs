//! Storage backend abstraction for `selfpass`.
//!
//! This crate defines the [`StorageBackend`] trait: a plain key-value
//! interface that knows nothing about settings or XML. The
//! server serializes the configuration document with `selfpass-core` and
//! hands the bytes to a backend.
//!
//! Two implementations are provided:
//!
//! - [`FileBackend`]: production default, one file per key under a root directory
//! - [`MemoryBackend`]: in-memory, for testing and throwaway instances

mod error;
mod file;
mod memory;

pub use error::{StorageError, StorageOp};
pub use file::FileBackend;
pub use memory::MemoryBackend;

/// Byte store addressed by `/`-separated keys such as `config/selfpass.xml`.
///
/// One backend instance is shared by every request task.
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// The bytes stored under `key`, or `None`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the underlying backend fails.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Write `value` under `key`, replacing what was there.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the underlying backend fails.
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Delete a key. Deleting a non-existent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the underlying backend fails.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// List all keys that start with the given prefix, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the underlying backend fails.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Whether `key` holds a value. Defaults to a full [`get`](StorageBackend::get).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the underlying backend fails.
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.get(key).await?.is_some())
    }
}
