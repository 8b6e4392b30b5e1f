//! Server configuration for `selfpass`.
//!
//! Process-level settings come from `SELFPASS_*` environment variables with
//! defaults. Application settings live in the stored configuration document.

use std::net::SocketAddr;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Storage backend type.
    pub storage_backend: StorageBackendType,
    /// Storage key of the configuration document.
    pub config_key: String,
    /// Log level filter (e.g., `info`, `debug`, `warn`).
    pub log_level: String,
    /// Passphrase for the key that encrypts secrets in the configuration.
    /// When unset, the key is derived from the document's creation time.
    pub security_key: Option<String>,
    /// Idle session scan interval in seconds.
    pub session_scan_interval_secs: u64,
    /// JSON file of accounts for the in-memory user directory.
    pub users_file: Option<String>,
}

/// Supported storage backend types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackendType {
    /// In-memory (development only, data lost on restart).
    Memory,
    /// One file per key under a directory.
    File { path: String },
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PORT`: port to bind on, all interfaces
    /// - `SELFPASS_BIND_ADDR`: full bind address (overrides `PORT`, default: `127.0.0.1:8080`)
    /// - `SELFPASS_STORAGE`: `memory` or `file` (default: `file`)
    /// - `SELFPASS_STORAGE_PATH`: directory for the file backend (default: `./data`)
    /// - `SELFPASS_CONFIG_KEY`: storage key of the document (default: `config/selfpass.xml`)
    /// - `SELFPASS_LOG_LEVEL`: log filter (default: `info`)
    /// - `SELFPASS_SECURITY_KEY`: secret-encryption passphrase (optional)
    /// - `SELFPASS_SESSION_SCAN_INTERVAL`: seconds between idle session scans (default: `60`)
    /// - `SELFPASS_USERS_FILE`: JSON array of accounts to load (optional)
    #[must_use]
    pub fn from_env() -> Self {
        let bind_addr = if let Ok(addr) = std::env::var("SELFPASS_BIND_ADDR") {
            addr.parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8080)))
        } else if let Ok(port_str) = std::env::var("PORT") {
            let port: u16 = port_str.parse().unwrap_or(8080);
            SocketAddr::from(([0, 0, 0, 0], port))
        } else {
            SocketAddr::from(([127, 0, 0, 1], 8080))
        };

        let storage_path =
            std::env::var("SELFPASS_STORAGE_PATH").unwrap_or_else(|_| "./data".to_owned());

        let storage_backend = match std::env::var("SELFPASS_STORAGE")
            .unwrap_or_else(|_| "file".to_owned())
            .to_lowercase()
            .as_str()
        {
            "memory" => StorageBackendType::Memory,
            _ => StorageBackendType::File { path: storage_path },
        };

        let config_key = std::env::var("SELFPASS_CONFIG_KEY")
            .unwrap_or_else(|_| crate::state::DEFAULT_CONFIG_KEY.to_owned());

        let log_level = std::env::var("SELFPASS_LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());

        let security_key = std::env::var("SELFPASS_SECURITY_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty());

        let session_scan_interval_secs = std::env::var("SELFPASS_SESSION_SCAN_INTERVAL")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|v| *v > 0)
            .unwrap_or(60);

        let users_file = std::env::var("SELFPASS_USERS_FILE")
            .ok()
            .filter(|v| !v.trim().is_empty());

        Self {
            bind_addr,
            storage_backend,
            config_key,
            log_level,
            security_key,
            session_scan_interval_secs,
            users_file,
        }
    }
}
