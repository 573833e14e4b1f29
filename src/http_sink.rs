use crate::payload::TelemetryPayload;
use crate::sink::TelemetrySink;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use std::error::Error;
use std::time::Duration;

/// [`TelemetrySink`] posting JSON bodies to the Synchrolog ingestion API.
#[derive(Clone)]
pub struct HttpSink {
    client: Client,
    access_token: String,
}

impl HttpSink {
    /// Construct a sink authenticating with `access_token`.
    ///
    /// Every request is bounded by `timeout`, which also bounds how long an
    /// emitting thread can block in direct delivery mode.
    pub fn new(access_token: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            access_token: access_token.into(),
        })
    }

    /// The ingestion API expects the raw token after `Basic`, without the
    /// base64 `user:password` encoding of standard basic auth.
    fn authorization(&self) -> String {
        format!("Basic {}", self.access_token)
    }
}

#[async_trait]
impl TelemetrySink for HttpSink {
    async fn send(&self, payload: &TelemetryPayload) -> Result<(), Box<dyn Error + Send + Sync>> {
        let body = serde_json::to_vec(payload.body())?;
        let resp = self
            .client
            .post(payload.destination_url())
            .header(AUTHORIZATION, self.authorization())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
            Err(format!("Synchrolog ingestion failed with status {}: {}", status, text).into())
        }
    }
}
