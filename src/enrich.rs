use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::sync::Arc;

use crate::context::RequestContext;
use crate::payload::{
    ErrorEvent, LogEvent, TelemetryBody, TelemetryEvent, TelemetryPayload, EVENT_TYPE, SOURCE,
};
use crate::record::{LogRecord, Severity};
use crate::traceback::FrameFilter;

/// Status reported for exceptions that carry none of their own.
pub const DEFAULT_ERROR_STATUS: u16 = 500;

/// One stage of a record-processing pipeline.
///
/// Stages receive the record together with the request context of the
/// event, if any, and return the (possibly modified) record. A stage must
/// not panic; it runs inside the logging call of the application.
pub trait Enrich: Send + Sync {
    fn enrich(&self, record: LogRecord, ctx: Option<&RequestContext>) -> LogRecord;
}

/// Ordered chain of [`Enrich`] stages owned by a single layer.
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Enrich>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Pipeline::default()
    }

    pub fn with_stage(mut self, stage: impl Enrich + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn run(&self, record: LogRecord, ctx: Option<&RequestContext>) -> LogRecord {
        self.stages
            .iter()
            .fold(record, |record, stage| stage.enrich(record, ctx))
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline").field("stages", &self.stages.len()).finish()
    }
}

/// Builds the Synchrolog telemetry payload for a record.
#[derive(Debug, Clone)]
pub struct SynchrologEnricher {
    log_url: String,
    error_url: String,
    frame_filter: FrameFilter,
    capture_outside_requests: bool,
}

impl SynchrologEnricher {
    pub fn new(log_url: impl Into<String>, error_url: impl Into<String>) -> Self {
        SynchrologEnricher {
            log_url: log_url.into(),
            error_url: error_url.into(),
            frame_filter: FrameFilter::default(),
            capture_outside_requests: true,
        }
    }

    pub fn with_frame_filter(mut self, filter: FrameFilter) -> Self {
        self.frame_filter = filter;
        self
    }

    /// When `false`, records emitted outside any request span are left
    /// without a payload and therefore never delivered.
    pub fn capture_outside_requests(mut self, capture: bool) -> Self {
        self.capture_outside_requests = capture;
        self
    }

    pub fn payload(&self, record: &LogRecord, ctx: Option<&RequestContext>) -> TelemetryPayload {
        let timestamp = iso_timestamp(record.timestamp);
        let anonymous_id = ctx
            .and_then(|c| c.anonymous_id.clone())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let user_id = ctx.and_then(|c| c.user_id.clone());

        let exception = match record.exception() {
            Some(exception) if record.level >= Severity::Error => exception,
            _ => {
                let body = TelemetryBody {
                    event_type: EVENT_TYPE,
                    timestamp: timestamp.clone(),
                    anonymous_id,
                    user_id,
                    source: SOURCE,
                    event: TelemetryEvent::Log(LogEvent {
                        timestamp,
                        message: record.message.clone(),
                    }),
                };
                return TelemetryPayload::new(self.log_url.clone(), body);
            }
        };

        let frame = self.frame_filter.select(&exception.traceback);
        let file_name = frame
            .and_then(|f| f.file_name.clone())
            .unwrap_or_default();
        let source_file_contents = if file_name.is_empty() {
            String::new()
        } else {
            std::fs::read_to_string(&file_name).unwrap_or_default()
        };

        let error = ErrorEvent {
            status: exception.status.unwrap_or(DEFAULT_ERROR_STATUS).to_string(),
            description: record.message.clone(),
            backtrace: exception.traceback.text().to_string(),
            ip_address: ctx.and_then(|c| c.ip_address.clone()),
            user_agent: ctx.and_then(|c| c.user_agent.clone()),
            file_name,
            line_number: frame.and_then(|f| f.line_number),
            source_file_contents,
        };

        let body = TelemetryBody {
            event_type: EVENT_TYPE,
            timestamp,
            anonymous_id,
            user_id,
            source: SOURCE,
            event: TelemetryEvent::Error(error),
        };
        TelemetryPayload::new(self.error_url.clone(), body)
    }
}

impl Enrich for SynchrologEnricher {
    fn enrich(&self, record: LogRecord, ctx: Option<&RequestContext>) -> LogRecord {
        if ctx.is_none() && !self.capture_outside_requests {
            return record;
        }

        let payload = self.payload(&record, ctx);
        let handled_status = record.exception().and_then(|e| e.status).is_some();
        let record = record.with_telemetry(payload);

        // The status already describes the failure; keep the stack out of
        // later stages.
        if handled_status {
            record.without_exception()
        } else {
            record
        }
    }
}

pub(crate) fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}
