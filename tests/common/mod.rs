//! Shared utilities for integration tests.

use async_trait::async_trait;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use axum::Router;
use synchrolog_axum::delivery::DeliveryStats;
use synchrolog_axum::payload::TelemetryPayload;
use synchrolog_axum::sink::TelemetrySink;
use synchrolog_axum::{init_with_sink, InitOptions, SynchrologConfig, SynchrologLayer};

/// A payload as the ingestion endpoint would have received it.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct Delivered {
    pub url: String,
    pub body: serde_json::Value,
}

/// Sink that records every payload instead of sending it.
#[derive(Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<Delivered>>,
}

impl RecordingSink {
    pub fn calls(&self) -> Vec<Delivered> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TelemetrySink for RecordingSink {
    async fn send(&self, payload: &TelemetryPayload) -> Result<(), Box<dyn Error + Send + Sync>> {
        let body = serde_json::to_value(payload.body())?;
        self.calls.lock().unwrap().push(Delivered {
            url: payload.destination_url().to_string(),
            body,
        });
        Ok(())
    }
}

/// Wire Synchrolog into `router` with token `123` and a recording sink.
#[allow(dead_code)]
pub fn instrumented(router: Router, options: InitOptions) -> (Router, SynchrologLayer, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let (router, layer) = init_with_sink(router, sink.clone(), &SynchrologConfig::new("123"), options)
        .expect("init synchrolog");
    (router, layer, sink)
}

/// Wait until `n` payloads reached a final state in the worker.
#[allow(dead_code)]
pub async fn settled(stats: &DeliveryStats, n: u64) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while stats.settled() < n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "expected {} settled deliveries, got {}", n, stats.settled());
}

/// Start a mock ingestion endpoint answering every request with `status`.
///
/// Each raw HTTP request (head and body) is forwarded on the returned channel.
#[allow(dead_code)]
pub async fn start_ingestion_server(status: &'static str) -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let raw = read_request(&mut socket).await;
                        let _ = tx.send(raw);
                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                            status
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, rx)
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let len = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + len {
                break;
            }
        }
    }

    String::from_utf8_lossy(&buf).into_owned()
}

/// Split a raw request into its lowercased head and its JSON body.
#[allow(dead_code)]
pub fn split_request(raw: &str) -> (String, serde_json::Value) {
    let (head, body) = raw.split_once("\r\n\r\n").expect("complete request");
    (head.to_lowercase(), serde_json::from_str(body).expect("json body"))
}
