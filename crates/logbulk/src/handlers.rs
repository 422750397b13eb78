// HTTP request handlers for server mode
//
// Implements the Elasticsearch bulk endpoint, the compatibility stubs that
// shippers probe before sending data, and health checks

use std::io;
use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, OriginalUri, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::TryStreamExt;
use logbulk_core::{BulkRequest, ContentEncoding, DebugTarget, LineOptions, TenantId};
use metrics::histogram;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::io::{StreamReader, SyncIoBridge};
use tracing::debug;

use crate::{AppError, AppState};

/// Query arguments accepted by `/_bulk`
#[derive(Debug, Default, Deserialize)]
pub(crate) struct BulkParams {
    #[serde(rename = "_time_field")]
    time_field: Option<String>,
    #[serde(rename = "_msg_field")]
    msg_field: Option<String>,
    #[serde(rename = "_stream_fields")]
    stream_fields: Option<String>,
    ignore_fields: Option<String>,
    debug: Option<String>,
}

/// POST /insert/elasticsearch/_bulk - bulk log ingestion endpoint
pub(crate) async fn handle_bulk(
    State(state): State<AppState>,
    Query(params): Query<BulkParams>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    OriginalUri(uri): OriginalUri,
    body: Body,
) -> Result<Response, AppError> {
    let tenant = TenantId::from_header_values(
        header_str(&headers, "AccountID"),
        header_str(&headers, "ProjectID"),
    )
    .map_err(AppError::bad_request)?;

    let encoding = ContentEncoding::from_header(header_str(&headers, header::CONTENT_ENCODING))
        .map_err(|e| AppError::with_status(StatusCode::UNSUPPORTED_MEDIA_TYPE, e.into()))?;

    let debug = parse_bool(params.debug.as_deref()).then(|| DebugTarget {
        remote_addr: connect_info
            .map(|ConnectInfo(addr)| addr.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        request_uri: uri.to_string(),
    });

    let request = BulkRequest {
        tenant,
        options: line_options(&params),
        stream_fields: parse_array(params.stream_fields.as_deref()),
        ignore_fields: parse_array(params.ignore_fields.as_deref()),
        encoding,
        debug,
    };

    debug!(
        tenant = %request.tenant,
        encoding = %request.encoding,
        debug = request.debug.is_some(),
        "Received bulk request"
    );

    // The body is consumed incrementally on a blocking worker; the bridge must
    // be created here, inside the runtime.
    let stream = body.into_data_stream().map_err(io::Error::other);
    let reader = SyncIoBridge::new(StreamReader::new(stream));

    let ingestor = state.ingestor.clone();
    let summary = tokio::task::spawn_blocking(move || ingestor.ingest(reader, &request))
        .await
        .map_err(|e| AppError::internal(anyhow::anyhow!("bulk worker failed: {}", e)))?
        .map_err(|e| AppError::with_status(StatusCode::SERVICE_UNAVAILABLE, e.into()))?;

    let took_ms = summary.took.as_millis() as u64;
    histogram!("bulk.request.duration_ms", took_ms as f64);

    Ok(bulk_response(summary.rows, took_ms).into_response())
}

/// `{"took":…,"errors":false,"items":[{"create":{"status":201}},…]}`
pub(crate) fn bulk_response(rows: usize, took_ms: u64) -> Json<Value> {
    let item = json!({"create": {"status": 201}});
    Json(json!({
        "took": took_ms,
        "errors": false,
        "items": vec![item; rows],
    }))
}

/// GET /insert/elasticsearch/ - ping used by shippers to discover the version
pub(crate) async fn handle_root() -> impl IntoResponse {
    Json(json!({"version": {"number": "8.8.0"}}))
}

/// HEAD /insert/elasticsearch/ - Logstash ping
pub(crate) async fn handle_root_head() -> impl IntoResponse {
    StatusCode::OK
}

/// GET /insert/elasticsearch/_license
pub(crate) async fn handle_license() -> impl IntoResponse {
    Json(json!({
        "license": {
            "uid": "cbff45e7-c553-41f7-ae4f-9205eabd80xx",
            "type": "oss",
            "status": "active",
            "expiry_date_in_millis": 4_000_000_000_000u64,
        }
    }))
}

/// ILM policy, index template, ingest pipeline and node discovery requests
pub(crate) async fn handle_stub() -> impl IntoResponse {
    Json(json!({}))
}

/// GET /health - Basic health check
pub(crate) async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "healthy"})))
}

/// GET /ready - Readiness check
pub(crate) async fn ready_check(State(state): State<AppState>) -> impl IntoResponse {
    let limiter = state.ingestor.limiter();
    (
        StatusCode::OK,
        Json(json!({
            "status": "ready",
            "inserts_in_flight": limiter.in_use(),
            "max_concurrent_inserts": limiter.capacity(),
        })),
    )
}

fn line_options(params: &BulkParams) -> LineOptions {
    let mut options = LineOptions::default();
    if let Some(time_field) = params.time_field.as_deref().filter(|s| !s.is_empty()) {
        options.time_field = time_field.to_string();
    }
    if let Some(msg_field) = &params.msg_field {
        options.msg_field = msg_field.clone();
    }
    options
}

fn header_str<K: header::AsHeaderName>(headers: &HeaderMap, name: K) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Absent, empty, `0`, `f`, `false` and `no` are false; anything else is true.
pub(crate) fn parse_bool(value: Option<&str>) -> bool {
    match value {
        None => false,
        Some(v) => !matches!(
            v.to_ascii_lowercase().as_str(),
            "" | "0" | "f" | "false" | "no"
        ),
    }
}

/// Comma-separated list; empty input yields an empty list.
pub(crate) fn parse_array(value: Option<&str>) -> Vec<String> {
    match value {
        None | Some("") => Vec::new(),
        Some(v) => v.split(',').map(str::to_string).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        assert!(!parse_bool(None));
        for falsy in ["", "0", "f", "false", "FALSE", "no"] {
            assert!(!parse_bool(Some(falsy)), "{falsy:?} should be false");
        }
        for truthy in ["1", "true", "yes", "on"] {
            assert!(parse_bool(Some(truthy)), "{truthy:?} should be true");
        }
    }

    #[test]
    fn test_parse_array() {
        assert!(parse_array(None).is_empty());
        assert!(parse_array(Some("")).is_empty());
        assert_eq!(parse_array(Some("host")), vec!["host"]);
        assert_eq!(parse_array(Some("host,app")), vec!["host", "app"]);
    }

    #[test]
    fn test_line_options_defaults() {
        let options = line_options(&BulkParams::default());
        assert_eq!(options.time_field, "_time");
        assert!(options.msg_field.is_empty());

        let options = line_options(&BulkParams {
            time_field: Some("@timestamp".into()),
            msg_field: Some("message".into()),
            ..Default::default()
        });
        assert_eq!(options.time_field, "@timestamp");
        assert_eq!(options.msg_field, "message");
    }

    #[test]
    fn test_bulk_response_has_one_item_per_row() {
        let Json(body) = bulk_response(3, 12);
        assert_eq!(body["took"], 12);
        assert_eq!(body["errors"], false);
        assert_eq!(body["items"].as_array().unwrap().len(), 3);
        assert_eq!(body["items"][0]["create"]["status"], 201);
    }
}
