// Server mode - Elasticsearch bulk-compatible HTTP ingestion
//
// Features:
// - Axum HTTP server (HTTP/1.1, HTTP/2)
// - Streaming bulk decoding on blocking workers with bounded memory
// - Filesystem and S3 storage via OpenDAL
// - Structured logging with tracing
// - Graceful shutdown

use anyhow::{Context, Result};
use axum::{
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use logbulk_config::RuntimeConfig;
use logbulk_core::{BulkIngestor, ConcurrencyLimiter, IngestMetrics, IngestSettings, RowStorage};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

mod handlers;
mod init;
pub mod writer;

use handlers::{
    handle_bulk, handle_license, handle_root, handle_root_head, handle_stub, health_check,
    ready_check,
};
pub use init::init_tracing;
use init::init_storage;
use writer::ObjectStoreWriter;

/// Path prefix of the Elasticsearch-compatible API
pub const ELASTICSEARCH_PREFIX: &str = "/insert/elasticsearch";

/// Application state shared across all requests
#[derive(Clone)]
pub struct AppState {
    pub ingestor: Arc<BulkIngestor>,
}

/// Error type that implements IntoResponse
pub(crate) struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!(status = %self.status, "Request error: {:#}", self.error);
        (
            self.status,
            Json(json!({
                "error": format!("{:#}", self.error),
            })),
        )
            .into_response()
    }
}

impl AppError {
    pub fn with_status(status: StatusCode, error: anyhow::Error) -> Self {
        Self { status, error }
    }

    pub fn bad_request<E>(error: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: error.into(),
        }
    }

    pub fn internal<E>(error: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: error.into(),
        }
    }
}

/// Build the bulk ingestor for a configuration and storage sink
pub fn build_ingestor(config: &RuntimeConfig, storage: Arc<dyn RowStorage>) -> BulkIngestor {
    let capacity = config
        .insert
        .concurrency()
        .unwrap_or_else(ConcurrencyLimiter::default_capacity);
    let limiter = ConcurrencyLimiter::new(capacity, config.insert.max_queue_duration());

    let settings = IngestSettings {
        max_line_size: config.insert.max_line_size_bytes,
        max_rows: config.batch.max_rows,
        ..Default::default()
    };

    BulkIngestor::new(
        settings,
        storage,
        Arc::new(limiter),
        Arc::new(IngestMetrics::new()),
    )
}

/// Router with the Elasticsearch API under [`ELASTICSEARCH_PREFIX`] plus health checks
pub fn build_router(state: AppState) -> Router {
    let es = |path: &str| format!("{}{}", ELASTICSEARCH_PREFIX, path);

    let elasticsearch: Router<AppState> = Router::new()
        .route(&es("/_bulk"), post(handle_bulk))
        .route(&es(""), get(handle_root).head(handle_root_head))
        .route(&es("/"), get(handle_root).head(handle_root_head))
        .route(&es("/_license"), get(handle_license))
        .route(&es("/_ilm/policy"), any(handle_stub))
        .route(&es("/_ilm/policy/*rest"), any(handle_stub))
        .route(&es("/_index_template"), any(handle_stub))
        .route(&es("/_index_template/*rest"), any(handle_stub))
        .route(&es("/_ingest"), any(handle_stub))
        .route(&es("/_ingest/*rest"), any(handle_stub))
        .route(&es("/_nodes"), any(handle_stub))
        .route(&es("/_nodes/*rest"), any(handle_stub))
        // Logstash refuses to talk to servers without this header
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-elastic-product"),
            HeaderValue::from_static("Elasticsearch"),
        ));

    Router::new()
        .merge(elasticsearch)
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}

/// Entry point for server mode (loads config automatically)
pub async fn run() -> Result<()> {
    let config = RuntimeConfig::load().context("Failed to load configuration")?;
    run_with_config(config).await
}

/// Entry point for server mode with pre-loaded configuration (for CLI usage)
pub async fn run_with_config(config: RuntimeConfig) -> Result<()> {
    init_tracing(&config);

    let addr = config.server.listen_addr.clone();

    let operator = init_storage(&config)?;
    let storage = ObjectStoreWriter::new(operator, tokio::runtime::Handle::current());
    let ingestor = build_ingestor(&config, Arc::new(storage));

    info!(
        "Bulk ingestion (max_line_size={} max_rows={} max_concurrent_inserts={} max_queue_duration={}s)",
        ingestor.settings().max_line_size,
        ingestor.settings().max_rows,
        ingestor.limiter().capacity(),
        config.insert.max_queue_duration_secs
    );

    let state = AppState {
        ingestor: Arc::new(ingestor),
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Elasticsearch bulk endpoint listening on http://{}", addr);
    info!("Routes:");
    info!(
        "  POST http://{}{}/_bulk - bulk log ingestion",
        addr, ELASTICSEARCH_PREFIX
    );
    info!("  GET  http://{}/health                    - Health check", addr);
    info!("  GET  http://{}/ready                     - Readiness check", addr);
    info!("Press Ctrl+C or send SIGTERM to stop");

    // Requests still in flight finish (and flush their rows) before serve returns
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Server shutdown complete");

    Ok(())
}
