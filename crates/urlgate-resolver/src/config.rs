//! Engine configuration.
//!
//! Configuration is read from an optional TOML file with `URLGATE__`
//! environment overrides (see [`loader::load_config`]). Every field has a
//! default, so an empty file yields a working in-memory engine.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;
use urlgate_core::{ClientGroups, PatternRecord};

use crate::error::ConfigError;
use crate::observability;

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// HTTP endpoint serving the pattern records.
    pub pattern_source_url: Option<String>,

    /// Inline pattern records, used when no source URL is configured.
    pub patterns: Vec<PatternRecord>,

    /// Bound on a single fetch of the pattern source.
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,

    /// Resolution TTL for patterns whose cache policy names none.
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,

    /// Age after which a persisted registry snapshot is refetched.
    #[serde(with = "humantime_serde")]
    pub snapshot_ttl: Duration,

    /// Soft capacity of the persisted resolution cache.
    pub cache_capacity: usize,

    /// Share of persisted entries evicted when the cache is full.
    pub eviction_fraction: f64,

    /// Interval of the expired-entry sweep. Zero disables the sweeper.
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,

    /// Namespace for every persisted key.
    pub key_prefix: String,

    /// Static client to group membership table.
    pub client_groups: HashMap<String, Vec<String>>,

    /// Persisted store settings.
    pub storage: StorageConfig,

    /// Tracing filter applied when the engine is built, e.g. `info` or
    /// `urlgate_resolver=debug`. Takes effect once
    /// [`init_tracing`](crate::observability::init_tracing) has run.
    pub log_level: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pattern_source_url: None,
            patterns: Vec::new(),
            fetch_timeout: Duration::from_secs(10),
            default_ttl: Duration::from_secs(5 * 60),
            snapshot_ttl: Duration::from_secs(60 * 60),
            cache_capacity: 100,
            eviction_fraction: 0.25,
            sweep_interval: Duration::from_secs(60),
            key_prefix: "urlgate:".to_string(),
            client_groups: HashMap::new(),
            storage: StorageConfig::default(),
            log_level: None,
        }
    }
}

impl EngineConfig {
    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] describing the first violated rule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_capacity == 0 {
            return Err(ConfigError::validation("cache_capacity must be > 0"));
        }
        if !(self.eviction_fraction > 0.0 && self.eviction_fraction <= 1.0) {
            return Err(ConfigError::validation(
                "eviction_fraction must be within (0, 1]",
            ));
        }
        if self.key_prefix.is_empty() {
            return Err(ConfigError::validation("key_prefix must not be empty"));
        }
        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::validation("fetch_timeout must be > 0"));
        }
        if let Some(raw) = &self.pattern_source_url {
            let url = Url::parse(raw).map_err(|e| {
                ConfigError::validation(format!("pattern_source_url is not a valid URL: {e}"))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ConfigError::validation(
                    "pattern_source_url must use http or https",
                ));
            }
        }
        if self.storage.backend == StorageBackend::File && self.storage.path.is_none() {
            return Err(ConfigError::validation(
                "storage.path is required for the file backend",
            ));
        }
        if self.storage.max_entries == Some(0) {
            return Err(ConfigError::validation("storage.max_entries must be > 0"));
        }
        if let Some(level) = &self.log_level {
            observability::parse_filter(level)?;
        }
        Ok(())
    }

    /// The configured client group table.
    #[must_use]
    pub fn client_groups(&self) -> ClientGroups {
        ClientGroups::from(self.client_groups.clone())
    }

    /// Whether the periodic sweeper should run.
    #[must_use]
    pub fn sweeper_enabled(&self) -> bool {
        !self.sweep_interval.is_zero()
    }
}

/// Persisted store backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Volatile in-process store.
    #[default]
    Memory,
    /// Single JSON document on disk.
    File,
}

/// Persisted store settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Which backend to use.
    pub backend: StorageBackend,

    /// Path of the store file (file backend only).
    pub path: Option<PathBuf>,

    /// Hard entry quota enforced by the store itself.
    pub max_entries: Option<usize>,
}

pub mod loader {
    use std::path::Path;

    use config::{Config, Environment, File, FileFormat};

    use super::EngineConfig;
    use crate::error::ConfigError;

    /// Loads configuration from `path` (if it exists) and the environment.
    ///
    /// Without a path, `urlgate.toml` in the working directory is used when
    /// present. Environment variables override file values, e.g.
    /// `URLGATE__CACHE_CAPACITY=500` or `URLGATE__STORAGE__BACKEND=file`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] if a source cannot be read or
    /// deserialized and [`ConfigError::Validation`] if the result is invalid.
    pub fn load_config(path: Option<&Path>) -> Result<EngineConfig, ConfigError> {
        let mut builder = Config::builder();
        let file = path.unwrap_or_else(|| Path::new("urlgate.toml"));
        if file.exists() {
            builder = builder.add_source(File::from(file));
        }
        builder = builder.add_source(
            Environment::with_prefix("URLGATE")
                .try_parsing(true)
                .separator("__"),
        );

        finish(builder)
    }

    /// Loads configuration from a TOML string, without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] if the document cannot be parsed and
    /// [`ConfigError::Validation`] if the result is invalid.
    pub fn load_config_from_toml(toml: &str) -> Result<EngineConfig, ConfigError> {
        finish(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    fn finish(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<EngineConfig, ConfigError> {
        let cfg = builder
            .build()
            .map_err(|e| ConfigError::Load(format!("config build error: {e}")))?;
        let merged: EngineConfig = cfg
            .try_deserialize()
            .map_err(|e| ConfigError::Load(format!("config deserialize error: {e}")))?;
        merged.validate()?;
        Ok(merged)
    }
}
