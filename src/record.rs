use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

use crate::exception::ExceptionInfo;
use crate::payload::TelemetryPayload;

/// Severity of a captured record, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        }
    }

    /// Severity of a `tracing` level. `TRACE` has no counterpart and is
    /// never captured.
    pub fn from_level(level: &tracing::Level) -> Option<Self> {
        match *level {
            tracing::Level::ERROR => Some(Severity::Error),
            tracing::Level::WARN => Some(Severity::Warning),
            tracing::Level::INFO => Some(Severity::Info),
            tracing::Level::DEBUG => Some(Severity::Debug),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A log record as seen by the enrichment pipeline.
///
/// Records are created by [`crate::layer::SynchrologLayer`] from `tracing`
/// events, or directly by callers that want to push something through a
/// [`crate::enrich::Pipeline`] by hand.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: Severity,
    pub target: String,
    pub message: String,
    /// Event fields other than `message` and the recorded error.
    pub fields: BTreeMap<String, serde_json::Value>,
    exception: Option<ExceptionInfo>,
    telemetry: Option<TelemetryPayload>,
}

impl LogRecord {
    pub fn new(level: Severity, message: impl Into<String>) -> Self {
        LogRecord {
            timestamp: Utc::now(),
            level,
            target: String::new(),
            message: message.into(),
            fields: BTreeMap::new(),
            exception: None,
            telemetry: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_fields(mut self, fields: BTreeMap<String, serde_json::Value>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_exception(mut self, exception: ExceptionInfo) -> Self {
        self.exception = Some(exception);
        self
    }

    pub fn with_telemetry(mut self, payload: TelemetryPayload) -> Self {
        self.telemetry = Some(payload);
        self
    }

    /// Drop the attached exception, keeping everything else.
    pub fn without_exception(mut self) -> Self {
        self.exception = None;
        self
    }

    pub fn exception(&self) -> Option<&ExceptionInfo> {
        self.exception.as_ref()
    }

    pub fn telemetry(&self) -> Option<&TelemetryPayload> {
        self.telemetry.as_ref()
    }

    pub fn into_telemetry(self) -> Option<TelemetryPayload> {
        self.telemetry
    }
}
