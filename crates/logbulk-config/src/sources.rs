// Configuration source loading.
//
// Priority order:
// 1. Environment variables (LOGBULK_* prefix)
// 2. Config file path from LOGBULK_CONFIG
// 3. Inline config content from LOGBULK_CONFIG_CONTENT
// 4. Default config files (./config.toml, ./.logbulk.toml)
// 5. Built-in defaults

use crate::env_overrides::{self, EnvSource, ENV_PREFIX};
use crate::RuntimeConfig;
use anyhow::{Context, Result};
use std::env;
use std::path::Path;

const DEFAULT_CONFIG_FILES: &[&str] = &["./config.toml", "./.logbulk.toml"];

pub fn load_config() -> Result<RuntimeConfig> {
    let mut config = RuntimeConfig::default();

    if let Some(file_config) = load_from_file()? {
        config.merge(file_config);
    }

    env_overrides::apply_env_overrides(&mut config, &StdEnvSource)?;
    config.validate()?;
    Ok(config)
}

fn load_from_file() -> Result<Option<RuntimeConfig>> {
    if let Ok(path) = env::var(format!("{}CONFIG", ENV_PREFIX)) {
        return read_config_file(Path::new(&path)).map(Some);
    }

    if let Ok(content) = env::var(format!("{}CONFIG_CONTENT", ENV_PREFIX)) {
        let config: RuntimeConfig = toml::from_str(&content)
            .context("Failed to parse inline config from LOGBULK_CONFIG_CONTENT")?;
        return Ok(Some(config));
    }

    for path in DEFAULT_CONFIG_FILES {
        let path = Path::new(path);
        if path.exists() {
            return read_config_file(path).map(Some);
        }
    }

    Ok(None)
}

fn read_config_file(path: &Path) -> Result<RuntimeConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Load configuration from a specific file path (for CLI --config flag).
/// Returns error if file doesn't exist or can't be parsed.
/// Environment overrides still apply on top of the file.
pub fn load_from_file_path(path: impl AsRef<Path>) -> Result<RuntimeConfig> {
    let file_config = read_config_file(path.as_ref())?;

    let mut config = RuntimeConfig::default();
    config.merge(file_config);

    env_overrides::apply_env_overrides(&mut config, &StdEnvSource)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration with graceful fallback to defaults.
pub fn load_or_default() -> Result<RuntimeConfig> {
    let mut config = RuntimeConfig::default();

    match load_from_file() {
        Ok(Some(file_config)) => config.merge(file_config),
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "ignoring unreadable config file, using defaults"),
    }

    env_overrides::apply_env_overrides(&mut config, &StdEnvSource)?;
    config.validate()?;
    Ok(config)
}

struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(format!("{}{}", ENV_PREFIX, key)).ok()
    }

    fn get_raw(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageBackend;
    use std::io::Write;

    #[test]
    fn reads_explicit_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[batch]\nmax_rows = 500\n\n[storage]\nbackend = \"fs\"\n[storage.fs]\npath = \"/var/lib/logbulk\""
        )
        .unwrap();

        let config = read_config_file(file.path()).unwrap();
        assert_eq!(config.batch.max_rows, 500);
        assert_eq!(config.storage.backend, StorageBackend::Fs);
        assert_eq!(config.storage.fs.unwrap().path, "/var/lib/logbulk");
    }

    #[test]
    fn missing_file_is_reported_with_path() {
        let err = read_config_file(Path::new("/nonexistent/logbulk.toml")).unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/logbulk.toml"));
    }
}
