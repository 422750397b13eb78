use anyhow::{Context, Result};
use clap::Parser;
use logbulk_config::{RuntimeConfig, StorageBackend};
use std::path::PathBuf;
use tracing::info;

/// Elasticsearch bulk-compatible log ingestion server
#[derive(Parser)]
#[command(name = "logbulk")]
#[command(version)]
#[command(about = "Elasticsearch bulk-compatible log ingestion server", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// HTTP listen port (overrides config file)
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Output directory for log files (filesystem backend only)
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    // Step 1: Load base configuration
    let mut config = if let Some(config_path) = &cli.config {
        RuntimeConfig::load_from_path(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        RuntimeConfig::load_or_default().context("Failed to load configuration")?
    };

    // Step 2: Apply CLI overrides (highest priority)
    apply_cli_overrides(&mut config, &cli)?;
    config
        .validate()
        .context("Invalid configuration after CLI overrides")?;

    // Step 3: Initialize tracing early so validation logs show up
    // Note: run_with_config will also call init_tracing, but that's idempotent
    logbulk::init_tracing(&config);

    // Step 4: Make sure the output directory is usable before accepting traffic
    prepare_output_dir(&config)?;

    display_startup_info(&config);

    logbulk::run_with_config(config).await
}

fn apply_cli_overrides(config: &mut RuntimeConfig, cli: &Cli) -> Result<()> {
    if let Some(port) = cli.port {
        config.server.listen_addr = format!("0.0.0.0:{}", port);
    }

    // Override output directory (only valid for fs backend)
    if let Some(output) = &cli.output {
        if config.storage.backend != StorageBackend::Fs {
            anyhow::bail!(
                "--output flag only works with filesystem backend, but backend is '{}'.\n\
                Either remove --output flag or set backend to 'fs' in config file.",
                config.storage.backend
            );
        }

        let fs_config = config.storage.fs.get_or_insert_with(Default::default);
        fs_config.path = output.to_string_lossy().to_string();
    }

    if let Some(level) = &cli.log_level {
        config.server.log_level = level.clone();
    }

    Ok(())
}

fn display_startup_info(config: &RuntimeConfig) {
    info!("╭─────────────────────────────────────────────────");
    info!("│ logbulk v{}", env!("CARGO_PKG_VERSION"));
    info!("├─────────────────────────────────────────────────");
    info!("│ Listen address: http://{}", config.server.listen_addr);
    info!("│ Storage backend: {}", config.storage.backend);

    match config.storage.backend {
        StorageBackend::Fs => {
            if let Some(fs) = &config.storage.fs {
                info!("│ Output directory: {}", fs.path);
            }
        }
        StorageBackend::S3 => {
            if let Some(s3) = &config.storage.s3 {
                info!("│ S3 bucket: {}", s3.bucket);
                info!("│ S3 region: {}", s3.region);
            }
        }
    }

    info!("│ Log level: {}", config.server.log_level);
    info!(
        "│ Max line size: {} KiB",
        config.insert.max_line_size_bytes / 1024
    );
    match config.insert.concurrency() {
        Some(n) => info!("│ Max concurrent inserts: {}", n),
        None => info!("│ Max concurrent inserts: 2 x CPU cores"),
    }
    info!("│ Batch max rows: {}", config.batch.max_rows);
    info!("╰─────────────────────────────────────────────────");
}

fn prepare_output_dir(config: &RuntimeConfig) -> Result<()> {
    use std::fs;

    if config.storage.backend != StorageBackend::Fs {
        return Ok(());
    }

    let fs_config = config
        .storage
        .fs
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("filesystem backend requires storage.fs configuration"))?;

    let output_path = PathBuf::from(&fs_config.path);

    if !output_path.exists() {
        info!("Creating output directory: {}", fs_config.path);
        fs::create_dir_all(&output_path)
            .with_context(|| format!("Failed to create output directory: {}", fs_config.path))?;
    }

    // Validate writability by creating a test file
    let test_file = output_path.join(".logbulk-write-test");
    fs::write(&test_file, b"test").with_context(|| {
        format!(
            "Output directory '{}' is not writable. Check permissions.",
            fs_config.path
        )
    })?;
    fs::remove_file(&test_file).context("Failed to remove test file")?;
    info!("Output directory validated: {}", fs_config.path);

    Ok(())
}
