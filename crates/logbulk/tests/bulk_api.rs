// HTTP-level tests for the Elasticsearch bulk API
//
// Drives the router in-process; rows land in MemoryStorage.

use std::io::Write;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use flate2::write::GzEncoder;
use flate2::Compression;
use logbulk::{build_ingestor, build_router, AppState};
use logbulk_config::RuntimeConfig;
use logbulk_core::{Field, MemoryStorage, TenantId};
use serde_json::Value;
use tower::ServiceExt;

fn app() -> (Router, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    let mut config = RuntimeConfig::default();
    config.batch.max_rows = 2;
    config.insert.max_concurrent_inserts = 4;
    let ingestor = build_ingestor(&config, storage.clone());
    let state = AppState {
        ingestor: Arc::new(ingestor),
    };
    (build_router(state), storage)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, headers, body)
}

fn bulk(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/x-ndjson")
        .body(body.into())
        .unwrap()
}

const THREE_ROWS: &str = concat!(
    "{\"create\":{}}\n",
    "{\"_time\":\"2024-01-15T10:00:00Z\",\"message\":\"one\",\"host\":\"a\"}\n",
    "\n",
    "{\"index\":{\"_index\":\"logs\"}}\n",
    "{\"_time\":\"2024-01-15T10:00:01Z\",\"message\":\"two\",\"host\":\"a\"}\n",
    "{\"create\":{}}\n",
    "{\"_time\":\"2024-01-15T10:00:02Z\",\"message\":\"three\",\"host\":\"b\"}\n",
);

#[tokio::test(flavor = "multi_thread")]
async fn bulk_request_is_acknowledged_and_stored() {
    let (app, storage) = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/insert/elasticsearch/_bulk?_msg_field=message&_stream_fields=host")
        .header("AccountID", "7")
        .header("ProjectID", "9")
        .body(Body::from(THREE_ROWS))
        .unwrap();

    let (status, headers, body) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-elastic-product"], "Elasticsearch");
    assert_eq!(body["errors"], false);
    assert!(body["took"].is_u64());
    assert_eq!(body["items"].as_array().unwrap().len(), 3);
    assert_eq!(body["items"][2]["create"]["status"], 201);

    // max_rows = 2: one full batch plus the final flush
    let batches = storage.batches();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].tenant, TenantId::new(7, 9));
    assert_eq!(batches[0].stream_fields, vec!["host".to_string()]);
    let rows = storage.rows();
    assert_eq!(rows[0].fields, vec![Field::new("_msg", "one"), Field::new("host", "a")]);
    assert_eq!(rows[2].timestamp_nanos, 1_705_312_802_000_000_000);
}

#[tokio::test(flavor = "multi_thread")]
async fn gzip_body_is_decompressed() {
    let (app, storage) = app();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(THREE_ROWS.as_bytes()).unwrap();
    let compressed = encoder.finish().unwrap();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/insert/elasticsearch/_bulk")
        .header("content-encoding", "gzip")
        .body(Body::from(compressed))
        .unwrap();
    let (status, _, body) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"].as_array().unwrap().len(), 3);
    assert_eq!(storage.total_rows(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn decode_error_still_acknowledges_decoded_rows() {
    let (app, storage) = app();
    let body = "{\"create\":{}}\n{\"_msg\":\"ok\"}\n{\"delete\":{}}\n{\"_msg\":\"never\"}\n";

    let (status, _, body) = send(app, bulk("/insert/elasticsearch/_bulk", body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert_eq!(storage.total_rows(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn debug_mode_drops_rows() {
    let (app, storage) = app();

    let (status, _, body) = send(
        app,
        bulk("/insert/elasticsearch/_bulk?debug=1", THREE_ROWS),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"].as_array().unwrap().len(), 3);
    assert_eq!(storage.flush_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_tenant_is_rejected() {
    let (app, storage) = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/insert/elasticsearch/_bulk")
        .header("AccountID", "not-a-number")
        .body(Body::from(THREE_ROWS))
        .unwrap();

    let (status, _, body) = send(app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("AccountID"));
    assert_eq!(storage.flush_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_encoding_is_rejected() {
    let (app, _) = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/insert/elasticsearch/_bulk")
        .header("content-encoding", "br")
        .body(Body::from(THREE_ROWS))
        .unwrap();

    let (status, _, _) = send(app, request).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test(flavor = "multi_thread")]
async fn compatibility_stubs() {
    let (app, _) = app();

    let get = |uri: &str| {
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    };

    let (status, headers, body) = send(app.clone(), get("/insert/elasticsearch/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-elastic-product"], "Elasticsearch");
    assert_eq!(body["version"]["number"], "8.8.0");

    let (_, _, body) = send(app.clone(), get("/insert/elasticsearch/_license")).await;
    assert_eq!(body["license"]["type"], "oss");

    for uri in [
        "/insert/elasticsearch/_ilm/policy/logs",
        "/insert/elasticsearch/_index_template/logs",
        "/insert/elasticsearch/_ingest/pipeline/p1",
        "/insert/elasticsearch/_nodes/http",
    ] {
        let (status, _, body) = send(app.clone(), get(uri)).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(body, serde_json::json!({}), "{uri}");
    }

    let head = Request::builder()
        .method(Method::HEAD)
        .uri("/insert/elasticsearch/")
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(app.clone(), head).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-elastic-product"], "Elasticsearch");
    assert_eq!(body, Value::Null);

    let (status, _, body) = send(app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}
