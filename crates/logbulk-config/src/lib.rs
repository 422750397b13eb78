// logbulk-config - Layered configuration for the logbulk server
//
// Supports configuration from multiple sources:
// 1. Environment variables (highest priority)
// 2. Config file path from LOGBULK_CONFIG env var
// 3. Config file contents from LOGBULK_CONFIG_CONTENT env var
// 4. Default config file locations (./config.toml, ./.logbulk.toml)
// 5. Built-in defaults (lowest priority)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

mod env_overrides;
mod sources;
mod validation;

pub use env_overrides::{EnvSource, ENV_PREFIX};

/// Main runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub insert: InsertConfig,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// HTTP listener and logging
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9428".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Unsupported log format: {}. Supported: text, json", s),
        }
    }
}

/// Bulk insert limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InsertConfig {
    /// Longest accepted action or document line.
    pub max_line_size_bytes: usize,
    /// Streams allowed in a physical read at once; 0 picks twice the CPU count.
    pub max_concurrent_inserts: usize,
    pub max_queue_duration_secs: u64,
}

impl InsertConfig {
    pub fn max_queue_duration(&self) -> Duration {
        Duration::from_secs(self.max_queue_duration_secs)
    }

    /// Configured concurrency, or `None` when it should be derived from the host.
    pub fn concurrency(&self) -> Option<usize> {
        (self.max_concurrent_inserts > 0).then_some(self.max_concurrent_inserts)
    }
}

impl Default for InsertConfig {
    fn default() -> Self {
        Self {
            max_line_size_bytes: 256 * 1024,
            max_concurrent_inserts: 0,
            max_queue_duration_secs: 60,
        }
    }
}

/// Batch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub max_rows: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { max_rows: 10_000 }
    }
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs: Option<FsConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3Config>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Fs,
            fs: Some(FsConfig::default()),
            s3: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Fs,
    S3,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Fs => write!(f, "fs"),
            StorageBackend::S3 => write!(f, "s3"),
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "fs" | "filesystem" => Ok(StorageBackend::Fs),
            "s3" | "aws" => Ok(StorageBackend::S3),
            _ => anyhow::bail!("Unsupported storage backend: {}. Supported: fs, s3", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsConfig {
    pub path: String,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            path: "./data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl RuntimeConfig {
    /// Load configuration from all sources with priority
    pub fn load() -> Result<Self> {
        sources::load_config()
    }

    /// Load configuration from a specific file path (for CLI usage).
    pub fn load_from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        sources::load_from_file_path(path)
    }

    /// Load configuration with graceful fallback to defaults.
    /// Does not fail if a config file is unreadable - uses defaults instead.
    pub fn load_or_default() -> Result<Self> {
        sources::load_or_default()
    }

    /// Merge another config into this one (used for TOML layering).
    pub fn merge(&mut self, other: RuntimeConfig) {
        self.server = other.server;
        self.insert = other.insert;
        self.batch = other.batch;
        self.storage = other.storage;
    }

    /// Apply environment overrides from a custom source.
    pub fn apply_env_overrides_from<E: EnvSource>(&mut self, env: &E) -> Result<()> {
        env_overrides::apply_env_overrides(self, env)
    }

    /// Build a configuration from optional inline TOML plus overrides supplied
    /// by an `EnvSource`, without touching the filesystem or process env.
    pub fn load_with_env<E: EnvSource>(inline_config: Option<&str>, env: &E) -> Result<Self> {
        let mut config = RuntimeConfig::default();

        if let Some(inline) = inline_config {
            let file_config: RuntimeConfig =
                toml::from_str(inline).context("Failed to parse inline config content")?;
            config.merge(file_config);
        }

        config.apply_env_overrides_from(env)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_backend_from_str() {
        assert_eq!("fs".parse::<StorageBackend>().unwrap(), StorageBackend::Fs);
        assert_eq!("S3".parse::<StorageBackend>().unwrap(), StorageBackend::S3);
        assert_eq!(
            "filesystem".parse::<StorageBackend>().unwrap(),
            StorageBackend::Fs
        );
        assert!("r2".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_default_configs() {
        let config = RuntimeConfig::default();
        assert_eq!(config.server.listen_addr, "0.0.0.0:9428");
        assert_eq!(config.server.log_format, LogFormat::Text);
        assert_eq!(config.insert.max_line_size_bytes, 262_144);
        assert_eq!(config.insert.concurrency(), None);
        assert_eq!(config.insert.max_queue_duration(), Duration::from_secs(60));
        assert_eq!(config.batch.max_rows, 10_000);
        assert_eq!(config.storage.backend, StorageBackend::Fs);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: RuntimeConfig = toml::from_str(
            r#"
            [insert]
            max_concurrent_inserts = 8

            [storage]
            backend = "s3"
            [storage.s3]
            bucket = "logs"
            region = "eu-west-1"
            "#,
        )
        .unwrap();

        assert_eq!(config.insert.concurrency(), Some(8));
        assert_eq!(config.insert.max_line_size_bytes, 256 * 1024);
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.storage.backend, StorageBackend::S3);
        assert_eq!(config.storage.s3.unwrap().bucket, "logs");
    }
}
