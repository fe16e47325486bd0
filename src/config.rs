//! Configuration file handling.
//!
//! This module handles loading `.streamify.toml`, merging CLI overrides on
//! top of it, and validating the result before any batch work starts.

use crate::error::BatchError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = ".streamify.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Object storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Local directories.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Object key layout inside the bucket.
    #[serde(default)]
    pub layout: LayoutConfig,

    /// Aggregation settings.
    #[serde(default)]
    pub aggregation: AggregationConfig,
}

/// Which object store implementation backs the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Google Cloud Storage (default)
    #[default]
    Gcs,
    /// A directory on local disk
    Local,
}

/// Object storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage backend.
    #[serde(default)]
    pub backend: Backend,

    /// Target bucket. Required.
    #[serde(default)]
    pub bucket: String,

    /// Directory holding buckets when the local backend is used.
    #[serde(default = "default_local_root")]
    pub local_root: PathBuf,

    /// Base URL of the GCS JSON API.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            bucket: String::new(),
            local_root: default_local_root(),
            endpoint: default_endpoint(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_local_root() -> PathBuf {
    PathBuf::from(".streamify-buckets")
}

fn default_endpoint() -> String {
    "https://storage.googleapis.com".to_string()
}

fn default_timeout() -> u64 {
    60
}

/// Local directories used by the job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory the producer writes raw events into.
    #[serde(default = "default_pending_dir")]
    pub pending_dir: PathBuf,

    /// Scratch directory for the summary before upload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staging_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            pending_dir: default_pending_dir(),
            staging_dir: None,
        }
    }
}

fn default_pending_dir() -> PathBuf {
    PathBuf::from("/data/raw_logs")
}

/// Object key prefixes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Prefix for summary artifacts.
    #[serde(default = "default_processed_prefix")]
    pub processed_prefix: String,

    /// Prefix for archived raw records.
    #[serde(default = "default_archive_prefix")]
    pub archive_prefix: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            processed_prefix: default_processed_prefix(),
            archive_prefix: default_archive_prefix(),
        }
    }
}

fn default_processed_prefix() -> String {
    "processed".to_string()
}

fn default_archive_prefix() -> String {
    "archive".to_string()
}

/// Aggregation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Event field counted per distinct value.
    #[serde(default = "default_entity_field")]
    pub entity_field: String,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            entity_field: default_entity_field(),
        }
    }
}

fn default_entity_field() -> String {
    "video_id".to_string()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_optional(Path::new(CONFIG_FILE_NAME))
    }

    /// Load `path` if it exists. A file that exists but does not parse is an error.
    pub fn load_optional(path: &Path) -> Result<Option<Self>> {
        if path.exists() {
            Ok(Some(Self::load(path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments (and their environment fallbacks) take precedence over
    /// config file settings, but only when they were actually provided.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref bucket) = args.bucket {
            self.storage.bucket = bucket.clone();
        }
        if let Some(backend) = args.backend {
            self.storage.backend = backend;
        }
        if let Some(ref root) = args.local_root {
            self.storage.local_root = root.clone();
        }
        if let Some(timeout) = args.timeout {
            self.storage.timeout_seconds = timeout;
        }

        if let Some(ref dir) = args.pending_dir {
            self.paths.pending_dir = dir.clone();
        }
        if let Some(ref dir) = args.staging_dir {
            self.paths.staging_dir = Some(dir.clone());
        }

        if let Some(ref field) = args.entity_field {
            self.aggregation.entity_field = field.clone();
        }
    }

    /// Check required settings. Runs before any batch work.
    pub fn validate(&self) -> std::result::Result<(), BatchError> {
        if self.storage.bucket.trim().is_empty() {
            return Err(BatchError::config(
                "storage bucket is not set (use --bucket, GCS_BUCKET or [storage].bucket)",
            ));
        }

        if self.storage.backend == Backend::Gcs {
            if !self.storage.endpoint.starts_with("http://")
                && !self.storage.endpoint.starts_with("https://")
            {
                return Err(BatchError::config(
                    "storage endpoint must start with 'http://' or 'https://'",
                ));
            }
            if self.storage.timeout_seconds == 0 {
                return Err(BatchError::config("storage timeout must be at least 1 second"));
            }
        }

        for (name, prefix) in [
            ("processed_prefix", &self.layout.processed_prefix),
            ("archive_prefix", &self.layout.archive_prefix),
        ] {
            if prefix.is_empty() || prefix.starts_with('/') || prefix.ends_with('/') {
                return Err(BatchError::config(format!(
                    "layout.{} must be non-empty without leading or trailing '/'",
                    name
                )));
            }
        }

        if self.layout.processed_prefix == self.layout.archive_prefix {
            return Err(BatchError::config(
                "processed and archive prefixes must differ",
            ));
        }

        if self.aggregation.entity_field.trim().is_empty() {
            return Err(BatchError::config("aggregation.entity_field must not be empty"));
        }

        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
