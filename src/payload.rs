use serde::{Serialize, Serializer};

pub const EVENT_TYPE: &str = "log";
pub const SOURCE: &str = "backend";

/// A fully enriched telemetry event ready for delivery.
///
/// The destination URL travels with the payload but is not part of the
/// JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryPayload {
    destination_url: String,
    body: TelemetryBody,
}

impl TelemetryPayload {
    pub fn new(destination_url: impl Into<String>, body: TelemetryBody) -> Self {
        TelemetryPayload {
            destination_url: destination_url.into(),
            body,
        }
    }

    pub fn destination_url(&self) -> &str {
        &self.destination_url
    }

    pub fn body(&self) -> &TelemetryBody {
        &self.body
    }
}

/// JSON body posted to the ingestion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryBody {
    pub event_type: &'static str,
    pub timestamp: String,
    pub anonymous_id: String,
    pub user_id: Option<String>,
    pub source: &'static str,
    #[serde(flatten)]
    pub event: TelemetryEvent,
}

/// Either a plain log line or an error report; serialized under the `log`
/// or `error` key respectively.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryEvent {
    Log(LogEvent),
    Error(ErrorEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEvent {
    pub timestamp: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEvent {
    pub status: String,
    pub description: String,
    pub backtrace: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub file_name: String,
    /// Serialized as an empty string when no frame was selected.
    #[serde(serialize_with = "line_number_or_empty")]
    pub line_number: Option<u32>,
    /// Contents of `file_name`, empty when it could not be read.
    #[serde(rename = "file")]
    pub source_file_contents: String,
}

fn line_number_or_empty<S: Serializer>(line: &Option<u32>, serializer: S) -> Result<S::Ok, S::Error> {
    match line {
        Some(n) => serializer.serialize_u32(*n),
        None => serializer.serialize_str(""),
    }
}
