use super::{FsConfig, LogFormat, RuntimeConfig, S3Config, StorageBackend};
use anyhow::{anyhow, Context, Result};

pub const ENV_PREFIX: &str = "LOGBULK_";

/// Abstraction over environment-variable lookups so tests and embedders can
/// supply their own source of overrides.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;

    /// Get an environment variable WITHOUT the LOGBULK_ prefix.
    /// Used for AWS standard variables (AWS_REGION, AWS_ENDPOINT_URL).
    fn get_raw(&self, key: &str) -> Option<String>;
}

/// Apply environment-variable overrides (highest priority) to the runtime config.
pub fn apply_env_overrides<E: EnvSource>(config: &mut RuntimeConfig, env: &E) -> Result<()> {
    // Server
    if let Some(addr) = env.get("LISTEN_ADDR") {
        config.server.listen_addr = addr;
    }
    if let Some(level) = env.get("LOG_LEVEL") {
        config.server.log_level = level;
    }
    if let Some(format) = env.get("LOG_FORMAT") {
        config.server.log_format = format
            .parse::<LogFormat>()
            .context("Invalid LOGBULK_LOG_FORMAT value")?;
    }

    // Insert limits
    if let Some(val) = get_env_usize(env, "MAX_LINE_SIZE_BYTES")? {
        config.insert.max_line_size_bytes = val;
    }
    if let Some(val) = get_env_usize(env, "MAX_CONCURRENT_INSERTS")? {
        config.insert.max_concurrent_inserts = val;
    }
    if let Some(val) = get_env_u64(env, "MAX_QUEUE_DURATION_SECS")? {
        config.insert.max_queue_duration_secs = val;
    }

    // Batching
    if let Some(val) = get_env_usize(env, "BATCH_MAX_ROWS")? {
        config.batch.max_rows = val;
    }

    // Storage backend
    if let Some(backend) = env.get("STORAGE_BACKEND") {
        config.storage.backend = backend
            .parse::<StorageBackend>()
            .context("Invalid LOGBULK_STORAGE_BACKEND value")?;
    }
    if let Some(path) = env.get("STORAGE_PATH") {
        config.storage.fs.get_or_insert_with(FsConfig::default).path = path;
    }

    // S3 storage, falling back to the AWS standard variables
    if let Some(bucket) = env.get("S3_BUCKET") {
        ensure_s3(config).bucket = bucket;
    }
    if let Some(region) = env.get("S3_REGION").or_else(|| env.get_raw("AWS_REGION")) {
        ensure_s3(config).region = region;
    }
    if let Some(endpoint) = env
        .get("S3_ENDPOINT")
        .or_else(|| env.get_raw("AWS_ENDPOINT_URL"))
    {
        ensure_s3(config).endpoint = Some(endpoint);
    }

    Ok(())
}

fn ensure_s3(config: &mut RuntimeConfig) -> &mut S3Config {
    config.storage.s3.get_or_insert_with(S3Config::default)
}

fn get_env_usize<E: EnvSource>(env: &E, key: &str) -> Result<Option<usize>> {
    env.get(key)
        .map(|val| {
            val.parse::<usize>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))
        })
        .transpose()
}

fn get_env_u64<E: EnvSource>(env: &E, key: &str) -> Result<Option<u64>> {
    env.get(key)
        .map(|val| {
            val.parse::<u64>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))
        })
        .transpose()
}
