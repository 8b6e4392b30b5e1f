use std::fmt;

/// The backend operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOp {
    Read,
    Write,
    Delete,
    List,
}

impl fmt::Display for StorageOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Delete => "delete",
            Self::List => "list",
        })
    }
}

/// Errors returned by a [`StorageBackend`](crate::StorageBackend).
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The storage root could not be created or is not a directory.
    #[error("storage root '{path}' is unusable: {reason}")]
    Open { path: String, reason: String },

    /// An I/O failure while operating on `key` (the prefix, for `List`).
    #[error("{op} of '{key}' failed")]
    Io {
        op: StorageOp,
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// Empty keys, absolute paths, and `.`/`..` segments are rejected.
    #[error("key '{key}' rejected: {reason}")]
    InvalidKey { key: String, reason: String },
}

impl StorageError {
    pub(crate) fn io(op: StorageOp, key: &str) -> impl FnOnce(std::io::Error) -> Self {
        move |source| Self::Io {
            op,
            key: key.to_owned(),
            source,
        }
    }
}
