//! Shared application state for the `selfpass` server.
//!
//! A single [`AppState`] is constructed at startup and shared across all
//! filters and handlers via `Arc`. It owns the configuration document, the
//! settings snapshot derived from it, sessions, intruder records, and the
//! user directory.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use selfpass_core::error::ConfigError;
use selfpass_core::stored_config::creation_time_key;
use selfpass_core::{EncodingMode, SecurityKey, StoredConfiguration};
use selfpass_storage::StorageBackend;

use crate::directory::UserDirectory;
use crate::error::AppError;
use crate::intruder::IntruderTracker;
use crate::runtime::RuntimeSettings;
use crate::session::SessionStore;

/// Storage key of the configuration document.
pub const DEFAULT_CONFIG_KEY: &str = "config/selfpass.xml";

/// Shared application state passed to all filters and handlers.
pub struct AppState {
    config: RwLock<StoredConfiguration>,
    runtime: RwLock<Arc<RuntimeSettings>>,
    /// Backend holding the configuration document.
    pub storage: Arc<dyn StorageBackend>,
    /// Storage key of the configuration document.
    pub config_key: String,
    pub sessions: SessionStore,
    pub intruder: IntruderTracker,
    pub directory: Arc<dyn UserDirectory>,
    /// Why the configuration failed to load, in error mode.
    pub load_error: Option<String>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config_key", &self.config_key)
            .field("load_error", &self.load_error)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Wrap an already parsed configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the settings snapshot cannot be built.
    pub fn new(
        config: StoredConfiguration,
        storage: Arc<dyn StorageBackend>,
        config_key: impl Into<String>,
        directory: Arc<dyn UserDirectory>,
    ) -> Result<Self, ConfigError> {
        Self::build(config, storage, config_key.into(), directory, None)
    }

    fn build(
        config: StoredConfiguration,
        storage: Arc<dyn StorageBackend>,
        config_key: String,
        directory: Arc<dyn UserDirectory>,
        load_error: Option<String>,
    ) -> Result<Self, ConfigError> {
        let runtime = RuntimeSettings::from_config(&config, load_error.is_some())?;
        Ok(Self {
            config: RwLock::new(config),
            runtime: RwLock::new(Arc::new(runtime)),
            storage,
            config_key,
            sessions: SessionStore::new(),
            intruder: IntruderTracker::new(),
            directory,
            load_error,
        })
    }

    /// Read the configuration document from storage.
    ///
    /// A missing document starts a new, empty configuration. A document that
    /// cannot be read puts the application in error mode instead of failing,
    /// so the health endpoint can still report the cause.
    ///
    /// Secrets are decoded with `passphrase` when given, otherwise with a key
    /// derived from the document's creation time.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails or key derivation fails.
    pub async fn load(
        storage: Arc<dyn StorageBackend>,
        config_key: impl Into<String>,
        passphrase: Option<&str>,
        directory: Arc<dyn UserDirectory>,
    ) -> anyhow::Result<Self> {
        let config_key = config_key.into();
        let fixed_key = passphrase.map(SecurityKey::from_passphrase).transpose()?;

        let Some(bytes) = storage.get(&config_key).await? else {
            let now = Utc::now();
            let key = match fixed_key {
                Some(key) => key,
                None => creation_time_key(now)?,
            };
            tracing::info!(key = %config_key, "no configuration document found, starting new configuration");
            let config = StoredConfiguration::new_empty_at(key, now);
            return Ok(Self::build(config, storage, config_key, directory, None)?);
        };

        let parsed = String::from_utf8(bytes)
            .map_err(|e| ConfigError::InvalidDocument {
                reason: format!("document is not utf-8: {e}"),
            })
            .and_then(|xml| {
                let key = match fixed_key.clone() {
                    Some(key) => key,
                    None => {
                        let created = StoredConfiguration::read_create_time(&xml)?.ok_or_else(|| {
                            ConfigError::InvalidDocument {
                                reason: "document has no createTime and no security key is configured"
                                    .to_owned(),
                            }
                        })?;
                        creation_time_key(created).map_err(|e| ConfigError::InvalidDocument {
                            reason: e.to_string(),
                        })?
                    }
                };
                StoredConfiguration::from_xml(&xml, key)
            });

        match parsed {
            Ok(config) => {
                tracing::info!(key = %config_key, "configuration loaded");
                Ok(Self::build(config, storage, config_key, directory, None)?)
            }
            Err(e) => {
                tracing::error!(key = %config_key, error = %e, "configuration failed to load, entering error mode");
                let key = fixed_key.unwrap_or_else(SecurityKey::generate);
                let config = StoredConfiguration::new_empty(key);
                Ok(Self::build(
                    config,
                    storage,
                    config_key,
                    directory,
                    Some(e.to_string()),
                )?)
            }
        }
    }

    /// Current settings snapshot.
    pub async fn runtime(&self) -> Arc<RuntimeSettings> {
        Arc::clone(&*self.runtime.read().await)
    }

    /// Run `f` with read access to the configuration.
    pub async fn read_config<T>(&self, f: impl FnOnce(&StoredConfiguration) -> T) -> T {
        f(&*self.config.read().await)
    }

    /// Apply `f` to a copy of the configuration, persist it, then publish it.
    ///
    /// Nothing changes if `f` fails or the document cannot be stored.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, or [`AppError::Internal`] if persisting fails.
    pub async fn update_config<T>(
        &self,
        f: impl FnOnce(&mut StoredConfiguration) -> Result<T, ConfigError>,
    ) -> Result<T, AppError> {
        if self.load_error.is_some() {
            return Err(AppError::ApplicationUnavailable(
                "configuration failed to load and cannot be modified".to_owned(),
            ));
        }

        let mut config = self.config.write().await;
        let mut draft = config.clone();
        let result = f(&mut draft)?;

        let runtime = RuntimeSettings::from_config(&draft, false)?;
        let xml = draft.to_xml(EncodingMode::Encoded)?;
        self.storage.put(&self.config_key, xml.as_bytes()).await?;

        *config = draft;
        *self.runtime.write().await = Arc::new(runtime);
        tracing::info!(key = %self.config_key, "configuration saved");
        Ok(result)
    }
}
