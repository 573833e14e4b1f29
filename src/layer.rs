use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use crate::context::{RequestContext, RequestContextVisitor, REQUEST_SPAN};
use crate::delivery::{Delivery, DeliveryStats, DIAGNOSTICS_TARGET};
use crate::enrich::Pipeline;
use crate::exception::ExceptionInfo;
use crate::record::{LogRecord, Severity};
use crate::sink::TelemetrySink;

/// Targets whose events are never captured: this crate's diagnostics and
/// the HTTP client stack used for delivery.
pub const IGNORED_TARGETS: &[&str] = &[
    DIAGNOSTICS_TARGET,
    "hyper",
    "hyper_util",
    "reqwest",
    "h2",
    "rustls",
];

/// `tracing_subscriber` layer that turns events into [`LogRecord`]s, runs
/// them through an enrichment [`Pipeline`] and hands the result to the
/// delivery stage.
///
/// Request context is recovered from the closest enclosing
/// `synchrolog_request` span (see [`RequestContext::span`]). In queued mode
/// the emitting thread only pushes onto an unbounded channel; a single
/// background task performs the network I/O.
pub struct SynchrologLayer {
    pipeline: Pipeline,
    delivery: Delivery,
    threshold: Severity,
    stats: Arc<DeliveryStats>,
}

impl SynchrologLayer {
    /// Create a queued layer and spawn its delivery worker on `handle`.
    pub fn queued(
        handle: &Handle,
        sink: Arc<dyn TelemetrySink>,
        pipeline: Pipeline,
        threshold: Severity,
    ) -> (Self, JoinHandle<()>) {
        let stats = Arc::new(DeliveryStats::default());
        let (delivery, worker) = Delivery::queued(handle, sink, Arc::clone(&stats));
        let layer = SynchrologLayer {
            pipeline,
            delivery,
            threshold,
            stats,
        };
        (layer, worker)
    }

    /// Create a layer that sends inline on the emitting thread.
    pub fn direct(sink: Arc<dyn TelemetrySink>, pipeline: Pipeline, threshold: Severity) -> Self {
        SynchrologLayer {
            pipeline,
            delivery: Delivery::Direct(sink),
            threshold,
            stats: Arc::new(DeliveryStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<DeliveryStats> {
        Arc::clone(&self.stats)
    }

    pub fn threshold(&self) -> Severity {
        self.threshold
    }

    fn is_ignored(target: &str) -> bool {
        IGNORED_TARGETS.iter().any(|ignored| {
            target == *ignored
                || target
                    .strip_prefix(ignored)
                    .is_some_and(|rest| rest.starts_with("::"))
        })
    }
}

impl<S> Layer<S> for SynchrologLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        if attrs.metadata().name() != REQUEST_SPAN {
            return;
        }
        let Some(span) = ctx.span(id) else {
            return;
        };

        let mut request = RequestContext::default();
        attrs.record(&mut RequestContextVisitor(&mut request));
        // Several synchrolog layers may share one registry.
        span.extensions_mut().replace(request);
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut extensions = span.extensions_mut();
        if let Some(request) = extensions.get_mut::<RequestContext>() {
            values.record(&mut RequestContextVisitor(request));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let meta = event.metadata();
        let Some(level) = Severity::from_level(meta.level()) else {
            return;
        };
        if level < self.threshold || Self::is_ignored(meta.target()) {
            return;
        }

        let mut fields = BTreeMap::new();
        let mut message: Option<String> = None;
        let mut exception: Option<ExceptionInfo> = None;

        let mut visitor = FieldVisitor {
            fields: &mut fields,
            message: &mut message,
            exception: &mut exception,
        };
        event.record(&mut visitor);

        let request = ctx.event_scope(event).and_then(|scope| {
            scope
                .from_root()
                .filter_map(|span| span.extensions().get::<RequestContext>().cloned())
                .last()
        });

        let mut record = LogRecord::new(level, message.unwrap_or_default())
            .with_target(meta.target())
            .with_fields(fields);
        if let Some(exception) = exception {
            record = record.with_exception(exception);
        }

        let record = self.pipeline.run(record, request.as_ref());
        if record.telemetry().is_none() {
            return;
        }

        self.stats.inc_captured();
        self.delivery.dispatch(record, &self.stats);
    }
}

/// Collects the message, the first recorded error and the remaining event
/// fields.
pub struct FieldVisitor<'a> {
    pub fields: &'a mut BTreeMap<String, serde_json::Value>,
    pub message: &'a mut Option<String>,
    pub exception: &'a mut Option<ExceptionInfo>,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), serde_json::Value::String(value.to_string()));
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn Error + 'static)) {
        if self.exception.is_none() {
            *self.exception = Some(ExceptionInfo::from_error(value));
        }
        self.fields.insert(field.name().to_string(), serde_json::Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.fields.insert(field.name().to_string(), serde_json::Value::String(format!("{:?}", value)));
        }
    }
}
