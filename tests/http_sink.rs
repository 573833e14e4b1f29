//! Wire format of the HTTP sink against a mock ingestion endpoint.

mod common;

use axum::body::Body;
use axum::http::Request;
use axum::routing::get;
use axum::Router;
use std::time::Duration;
use tower::ServiceExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

use synchrolog_axum::enrich::{Enrich, SynchrologEnricher};
use synchrolog_axum::http_sink::HttpSink;
use synchrolog_axum::record::LogRecord;
use synchrolog_axum::sink::TelemetrySink;
use synchrolog_axum::{init, InitOptions, Severity, SynchrologConfig};

use common::{split_request, start_ingestion_server};

fn payload_for(url: &str) -> synchrolog_axum::payload::TelemetryPayload {
    SynchrologEnricher::new(url, url)
        .enrich(LogRecord::new(Severity::Info, "hello"), None)
        .into_telemetry()
        .expect("payload")
}

#[tokio::test]
async fn posts_json_with_raw_basic_token() {
    let (addr, mut requests) = start_ingestion_server("200 OK").await;
    let url = format!("http://{}/v1/track-backend", addr);
    let sink = HttpSink::new("123", Duration::from_secs(2)).unwrap();

    sink.send(&payload_for(&url)).await.expect("accepted");

    let raw = tokio::time::timeout(Duration::from_secs(2), requests.recv())
        .await
        .unwrap()
        .unwrap();
    let (head, body) = split_request(&raw);
    assert!(head.starts_with("post /v1/track-backend http/1.1"));
    // The token follows `Basic` verbatim, without base64 encoding.
    assert!(head.lines().any(|line| line == "authorization: basic 123"));
    assert!(head.lines().any(|line| line == "content-type: application/json"));
    assert_eq!(body["event_type"], "log");
    assert_eq!(body["source"], "backend");
    assert_eq!(body["log"]["message"], "hello");
}

#[tokio::test]
async fn non_success_status_is_an_error() {
    let (addr, _requests) = start_ingestion_server("500 Internal Server Error").await;
    let sink = HttpSink::new("123", Duration::from_secs(2)).unwrap();

    let err = sink.send(&payload_for(&format!("http://{}/", addr))).await.unwrap_err();
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn unreachable_endpoint_is_an_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let sink = HttpSink::new("123", Duration::from_millis(500)).unwrap();
    assert!(sink.send(&payload_for(&format!("http://{}/", addr))).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn init_delivers_request_logs_to_the_endpoint() {
    let (addr, mut requests) = start_ingestion_server("200 OK").await;
    let config = SynchrologConfig::new("123")
        .with_log_url(format!("http://{}/v1/track-backend", addr))
        .with_error_url(format!("http://{}/v1/track-backend-error", addr));

    let app = Router::new().route(
        "/",
        get(|| async {
            tracing::info!(order_id = 7, "order placed");
            "ok"
        }),
    );
    let (app, layer) = init(app, &config, InitOptions::default().level(Severity::Info)).unwrap();
    let _guard = tracing::subscriber::set_default(Registry::default().with(layer));

    let req = Request::builder()
        .uri("/")
        .header("cookie", "synchrolog_anonymous_id=abc")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert!(response.status().is_success());

    let raw = tokio::time::timeout(Duration::from_secs(5), requests.recv())
        .await
        .expect("delivery within timeout")
        .unwrap();
    let (head, body) = split_request(&raw);
    assert!(head.starts_with("post /v1/track-backend http/1.1"));
    assert_eq!(body["anonymous_id"], "abc");
    assert_eq!(body["log"]["message"], "order placed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn delivery_failures_do_not_affect_the_response() {
    let (addr, _requests) = start_ingestion_server("503 Service Unavailable").await;
    let config = SynchrologConfig::new("123").with_log_url(format!("http://{}/", addr));

    let app = Router::new().route(
        "/",
        get(|| async {
            tracing::warn!("low stock");
            "ok"
        }),
    );
    let (app, layer) = init(app, &config, InitOptions::default()).unwrap();
    let stats = layer.stats();
    let _guard = tracing::subscriber::set_default(Registry::default().with(layer));

    let response = app.oneshot(Request::builder().uri("/").body(Body::empty()).unwrap()).await.unwrap();
    assert!(response.status().is_success());

    common::settled(&stats, 1).await;
    assert_eq!(stats.failed(), 1);
    assert_eq!(stats.delivered(), 0);
}
