// Configuration validation
//
// Validates that required fields are present and values are sensible

use crate::*;
use anyhow::{anyhow, bail, Result};
use tracing::warn;

const MAX_LINE_SIZE_LIMIT: usize = 64 * 1024 * 1024;
const LARGE_LINE_SIZE: usize = 16 * 1024 * 1024;

pub fn validate_config(config: &RuntimeConfig) -> Result<()> {
    validate_server_config(&config.server)?;
    validate_insert_config(&config.insert)?;
    validate_batch_config(&config.batch)?;
    validate_storage_config(&config.storage)?;
    Ok(())
}

fn validate_server_config(config: &ServerConfig) -> Result<()> {
    if config.listen_addr.is_empty() {
        bail!("server.listen_addr must not be empty");
    }

    // Basic validation that it looks like an address
    match config.listen_addr.rsplit_once(':') {
        Some((_, port)) if port.parse::<u16>().is_ok() => Ok(()),
        _ => bail!("server.listen_addr must be in format 'host:port'"),
    }
}

fn validate_insert_config(config: &InsertConfig) -> Result<()> {
    if config.max_line_size_bytes == 0 {
        bail!("insert.max_line_size_bytes must be greater than 0");
    }

    if config.max_line_size_bytes > MAX_LINE_SIZE_LIMIT {
        bail!(
            "insert.max_line_size_bytes must not exceed {} bytes",
            MAX_LINE_SIZE_LIMIT
        );
    }

    // Every in-flight request holds one line buffer of this size
    if config.max_line_size_bytes > LARGE_LINE_SIZE {
        warn!(
            max_line_size_bytes = config.max_line_size_bytes,
            "insert.max_line_size_bytes is very large; may cause memory issues"
        );
    }

    if config.max_queue_duration_secs == 0 {
        bail!("insert.max_queue_duration_secs must be greater than 0");
    }

    Ok(())
}

fn validate_batch_config(config: &BatchConfig) -> Result<()> {
    if config.max_rows == 0 {
        bail!("batch.max_rows must be greater than 0");
    }

    if config.max_rows > 1_000_000 {
        warn!(
            max_rows = config.max_rows,
            "batch.max_rows is very large; may cause memory issues"
        );
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<()> {
    match config.backend {
        StorageBackend::Fs => {
            let fs = config
                .fs
                .as_ref()
                .ok_or_else(|| anyhow!("fs storage backend requires 'fs' configuration"))?;

            if fs.path.is_empty() {
                bail!("storage.fs.path must not be empty");
            }
        }
        StorageBackend::S3 => {
            let s3 = config
                .s3
                .as_ref()
                .ok_or_else(|| anyhow!("s3 storage backend requires 's3' configuration"))?;

            if s3.bucket.is_empty() {
                bail!("storage.s3.bucket is required for S3 backend");
            }

            if s3.region.is_empty() {
                bail!("storage.s3.region is required for S3 backend");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_insert_config() {
        assert!(validate_insert_config(&InsertConfig::default()).is_ok());

        let zero = InsertConfig {
            max_line_size_bytes: 0,
            ..Default::default()
        };
        assert!(validate_insert_config(&zero).is_err());

        let huge = InsertConfig {
            max_line_size_bytes: MAX_LINE_SIZE_LIMIT + 1,
            ..Default::default()
        };
        assert!(validate_insert_config(&huge).is_err());

        let large = InsertConfig {
            max_line_size_bytes: 32 * 1024 * 1024,
            ..Default::default()
        };
        assert!(validate_insert_config(&large).is_ok());

        let no_queue = InsertConfig {
            max_queue_duration_secs: 0,
            ..Default::default()
        };
        assert!(validate_insert_config(&no_queue).is_err());
    }

    #[test]
    fn test_validate_server_config() {
        let mut server = ServerConfig::default();
        assert!(validate_server_config(&server).is_ok());

        server.listen_addr = "[::1]:9428".to_string();
        assert!(validate_server_config(&server).is_ok());

        server.listen_addr = "localhost".to_string();
        assert!(validate_server_config(&server).is_err());

        server.listen_addr = "localhost:http".to_string();
        assert!(validate_server_config(&server).is_err());

        server.listen_addr = String::new();
        assert!(validate_server_config(&server).is_err());
    }

    #[test]
    fn test_validate_storage_config() {
        let s3_config = StorageConfig {
            backend: StorageBackend::S3,
            fs: None,
            s3: Some(S3Config {
                bucket: "test-bucket".to_string(),
                region: "us-east-1".to_string(),
                endpoint: None,
            }),
        };
        assert!(validate_storage_config(&s3_config).is_ok());

        let missing_section = StorageConfig {
            backend: StorageBackend::S3,
            fs: Some(FsConfig::default()),
            s3: None,
        };
        assert!(validate_storage_config(&missing_section).is_err());

        let invalid_s3 = StorageConfig {
            backend: StorageBackend::S3,
            fs: None,
            s3: Some(S3Config {
                bucket: String::new(),
                region: "us-east-1".to_string(),
                endpoint: None,
            }),
        };
        assert!(validate_storage_config(&invalid_s3).is_err());
    }
}
