use crate::payload::TelemetryPayload;
use async_trait::async_trait;
use std::error::Error;

/// Destination for enriched [`TelemetryPayload`]s.
///
/// The delivery stage calls `send` either from the background worker or
/// inline on the emitting thread, and swallows whatever it returns.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Deliver a single payload to `payload.destination_url()`.
    ///
    /// **Returns**
    /// - `Ok(())` if the endpoint accepted the payload.
    /// - `Err(..)` on network errors, timeouts or non-success statuses.
    ///   The failure is logged locally and the payload is discarded.
    async fn send(&self, payload: &TelemetryPayload) -> Result<(), Box<dyn Error + Send + Sync>>;
}
