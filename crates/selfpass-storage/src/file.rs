//! Filesystem storage backend, the production default.
//!
//! Each key maps to one file below a root directory; `/` in the key becomes
//! a directory separator. Writes land in a sibling temp file that is renamed
//! over the target, so a crash mid-write never leaves a truncated
//! configuration document behind.

use std::path::{Component, Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::{StorageBackend, StorageError, StorageOp};

/// Suffix used for in-flight writes. Keys ending with it are hidden from `list`.
const TEMP_SUFFIX: &str = ".tmp-write";

/// A storage backend that keeps one file per key.
///
/// # Examples
///
/// ```no_run
/// # use selfpass_storage::FileBackend;
/// let backend = FileBackend::open("/var/lib/selfpass").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    /// Open (and create if missing) a storage root directory.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the directory cannot be created or
    /// the path exists but is not a directory.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref();
        std::fs::create_dir_all(root).map_err(|e| StorageError::Open {
            path: root.display().to_string(),
            reason: e.to_string(),
        })?;
        if !root.is_dir() {
            return Err(StorageError::Open {
                path: root.display().to_string(),
                reason: "not a directory".to_owned(),
            });
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Return the root directory of this backend.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a path below the root, rejecting anything that could
    /// escape it.
    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        let invalid = |reason: &str| StorageError::InvalidKey {
            key: key.to_owned(),
            reason: reason.to_owned(),
        };

        if key.is_empty() {
            return Err(invalid("key must not be empty"));
        }
        if key.ends_with(TEMP_SUFFIX) {
            return Err(invalid("reserved suffix"));
        }

        let relative = Path::new(key);
        for component in relative.components() {
            match component {
                Component::Normal(_) => {}
                Component::CurDir
                | Component::ParentDir
                | Component::RootDir
                | Component::Prefix(_) => {
                    return Err(invalid("key must be a relative path without '.' or '..'"));
                }
            }
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait::async_trait]
impl StorageBackend for FileBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(StorageOp::Read, key)(e)),
        }
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        let write_err = |e: std::io::Error| StorageError::io(StorageOp::Write, key)(e);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let mut temp = path.clone().into_os_string();
        temp.push(TEMP_SUFFIX);
        let temp = PathBuf::from(temp);

        let mut file = tokio::fs::File::create(&temp).await.map_err(write_err)?;
        file.write_all(value).await.map_err(write_err)?;
        file.sync_all().await.map_err(write_err)?;
        drop(file);

        tokio::fs::rename(&temp, &path).await.map_err(write_err)?;
        debug!(key, bytes = value.len(), "document written");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(StorageOp::Delete, key)(e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let root = self.root.clone();

        let keys = tokio::task::spawn_blocking(move || walk_keys(&root))
            .await
            .map_err(std::io::Error::other)
            .and_then(|walked| walked)
            .map_err(StorageError::io(StorageOp::List, prefix))?;

        let mut matching: Vec<String> = keys
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect();
        matching.sort();
        Ok(matching)
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.resolve(key)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(StorageError::io(StorageOp::Read, key))
    }
}

/// Collect every stored key below `root`, using `/` as separator.
fn walk_keys(root: &Path) -> std::io::Result<Vec<String>> {
    let mut keys = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                pending.push(path);
                continue;
            }
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if !key.ends_with(TEMP_SUFFIX) {
                keys.push(key);
            }
        }
    }
    Ok(keys)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn backend() -> (tempfile::TempDir, FileBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        (dir, backend)
    }

    #[tokio::test]
    async fn put_get_roundtrip_creates_directories() {
        let (_dir, backend) = backend();
        backend
            .put("config/selfpass.xml", b"<PwmConfiguration/>")
            .await
            .unwrap();
        let val = backend.get("config/selfpass.xml").await.unwrap();
        assert_eq!(val, Some(b"<PwmConfiguration/>".to_vec()));
        assert!(backend.root().join("config").is_dir());
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let (_dir, backend) = backend();
        assert_eq!(backend.get("config/none.xml").await.unwrap(), None);
        assert!(!backend.exists("config/none.xml").await.unwrap());
    }

    #[tokio::test]
    async fn parent_segments_are_rejected() {
        let (_dir, backend) = backend();
        let result = backend.put("../escape", b"x").await;
        assert!(matches!(result, Err(StorageError::InvalidKey { .. })));
        let result = backend.get("/etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey { .. })));
    }

    #[tokio::test]
    async fn overwrite_leaves_no_temp_file() {
        let (_dir, backend) = backend();
        backend.put("config/selfpass.xml", b"one").await.unwrap();
        backend.put("config/selfpass.xml", b"two").await.unwrap();
        let keys = backend.list("").await.unwrap();
        assert_eq!(keys, vec!["config/selfpass.xml"]);
    }

    #[tokio::test]
    async fn list_filters_by_prefix_and_sorts() {
        let (_dir, backend) = backend();
        backend.put("config/b.xml", b"1").await.unwrap();
        backend.put("config/a.xml", b"2").await.unwrap();
        backend.put("other/c", b"3").await.unwrap();
        let keys = backend.list("config/").await.unwrap();
        assert_eq!(keys, vec!["config/a.xml", "config/b.xml"]);
    }

    #[tokio::test]
    async fn delete_missing_key_is_ok() {
        let (_dir, backend) = backend();
        backend.delete("config/gone.xml").await.unwrap();
    }
}
