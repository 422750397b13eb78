// Initialization utilities for server mode
//
// Storage backend and logging/tracing setup

use anyhow::{anyhow, Context, Result};
use logbulk_config::{LogFormat, RuntimeConfig, StorageBackend};
use opendal::Operator;
use tracing::info;

/// Build the OpenDAL operator for the configured storage backend
pub(crate) fn init_storage(config: &RuntimeConfig) -> Result<Operator> {
    info!(
        "Initializing storage backend: {}",
        config.storage.backend
    );

    let operator = match config.storage.backend {
        StorageBackend::Fs => {
            let fs = config
                .storage
                .fs
                .as_ref()
                .ok_or_else(|| anyhow!("fs config required for filesystem backend"))?;
            info!("Using filesystem storage at: {}", fs.path);

            let fs_builder = opendal::services::Fs::default().root(&fs.path);
            Operator::new(fs_builder)
                .context("Failed to create filesystem operator")?
                .finish()
        }
        StorageBackend::S3 => {
            let s3 = config
                .storage
                .s3
                .as_ref()
                .ok_or_else(|| anyhow!("s3 config required for S3 backend"))?;
            info!(
                "Using S3 storage: bucket={}, region={}",
                s3.bucket, s3.region
            );

            let mut s3_builder = opendal::services::S3::default()
                .bucket(&s3.bucket)
                .region(&s3.region);

            if let Some(endpoint) = &s3.endpoint {
                s3_builder = s3_builder.endpoint(endpoint);
            }

            Operator::new(s3_builder)
                .context("Failed to create S3 operator")?
                .finish()
        }
    };

    Ok(operator)
}

/// Initialize tracing/logging from RuntimeConfig
pub fn init_tracing(config: &RuntimeConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let server = &config.server;

    // Parse log level from config
    let env_filter =
        EnvFilter::try_new(&server.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    // Try to set the global subscriber; ignore error if already set (idempotent)
    let _ = match server.log_format {
        LogFormat::Json => {
            tracing::subscriber::set_global_default(registry.with(fmt::layer().json()))
        }
        LogFormat::Text => tracing::subscriber::set_global_default(registry.with(fmt::layer())),
    };
}
