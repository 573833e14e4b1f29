use crate::config::{ConfigError, SynchrologConfig};
use crate::enrich::{Pipeline, SynchrologEnricher};
use crate::http_sink::HttpSink;
use crate::layer::SynchrologLayer;
use crate::middleware::instrument_router;
use crate::record::Severity;
use crate::sink::TelemetrySink;
use crate::traceback::FrameFilter;
use axum::Router;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Options for wiring Synchrolog into an application.
///
/// **Fields**
/// - `use_queue`: deliver from a background task through an unbounded
///   queue (`true`) or inline on the logging thread (`false`). See
///   [`InitOptions::use_queue`] for how inline delivery behaves per runtime.
/// - `level`: minimal severity that is forwarded. `TRACE` events are never
///   forwarded; `DEBUG` is the lowest level that can be.
/// - `enable_stdout`: only used by [`init_tracing_with_options`]; adds a
///   `fmt` layer so events are also printed to the console.
/// - `capture_outside_requests`: forward events emitted outside any
///   request (startup, background jobs).
/// - `frame_filter`: decides which stack frame is reported as the error
///   origin.
/// - `stages`: extra enrichment stages, run before the Synchrolog stage.
#[derive(Clone, Debug)]
pub struct InitOptions {
    pub use_queue: bool,
    pub level: Severity,
    pub enable_stdout: bool,
    pub capture_outside_requests: bool,
    pub frame_filter: FrameFilter,
    pub stages: Pipeline,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            use_queue: true,
            level: Severity::Warning,
            enable_stdout: true,
            capture_outside_requests: true,
            frame_filter: FrameFilter::default(),
            stages: Pipeline::new(),
        }
    }
}

impl InitOptions {
    /// Choose between queued and inline delivery.
    ///
    /// Inline delivery blocks the logging thread until the send completes
    /// (bounded by the client timeout) on a multi-thread runtime, and on a
    /// thread without a runtime. A current-thread runtime cannot block, so
    /// there the send is spawned as a detached task: the event is not
    /// delivered by the time the log call returns, and it is lost if the
    /// runtime shuts down first.
    pub fn use_queue(mut self, use_queue: bool) -> Self {
        self.use_queue = use_queue;
        self
    }

    /// Minimal severity that is forwarded. `tracing`'s `TRACE` level maps
    /// to no severity and is always dropped.
    pub fn level(mut self, level: Severity) -> Self {
        self.level = level;
        self
    }
}

/// Error returned when Synchrolog cannot be initialized.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("queued delivery requires a running Tokio runtime")]
    NoRuntime,

    #[error("failed to install global subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Wire Synchrolog into `router` using the HTTP sink.
///
/// **Returns**
/// - the router with the time route and the request middleware applied to
///   every route registered so far;
/// - the [`SynchrologLayer`] to compose into the application's subscriber.
///
/// Nothing is spawned when the configuration is invalid.
pub fn init<S>(
    router: Router<S>,
    config: &SynchrologConfig,
    options: InitOptions,
) -> Result<(Router<S>, SynchrologLayer), InitError>
where
    S: Clone + Send + Sync + 'static,
{
    config.validate()?;
    let sink = HttpSink::new(config.access_token.clone(), config.timeout)?;
    init_with_sink(router, Arc::new(sink), config, options)
}

/// Like [`init`], with a caller-provided [`TelemetrySink`].
pub fn init_with_sink<S>(
    router: Router<S>,
    sink: Arc<dyn TelemetrySink>,
    config: &SynchrologConfig,
    options: InitOptions,
) -> Result<(Router<S>, SynchrologLayer), InitError>
where
    S: Clone + Send + Sync + 'static,
{
    config.validate()?;

    let enricher = SynchrologEnricher::new(config.log_url.clone(), config.error_url.clone())
        .with_frame_filter(options.frame_filter)
        .capture_outside_requests(options.capture_outside_requests);
    let pipeline = options.stages.with_stage(enricher);

    let layer = if options.use_queue {
        let handle = Handle::try_current().map_err(|_| InitError::NoRuntime)?;
        // The worker lives as long as the layer holds the queue sender.
        let (layer, _worker) = SynchrologLayer::queued(&handle, sink, pipeline, options.level);
        layer
    } else {
        SynchrologLayer::direct(sink, pipeline, options.level)
    };

    tracing::debug!(
        target: crate::delivery::DIAGNOSTICS_TARGET,
        queued = options.use_queue,
        level = %options.level,
        "synchrolog initialized"
    );

    Ok((instrument_router(router), layer))
}

/// Initialize Synchrolog and install it in the global `tracing` subscriber.
///
/// **Effects**
///
/// Installs a [`Registry`] combined with the [`SynchrologLayer`] (and a
/// `fmt` layer when `enable_stdout` is set) as the global default, so all
/// `tracing` events in the process are observed.
pub fn init_tracing_with_options<S>(
    router: Router<S>,
    config: &SynchrologConfig,
    options: InitOptions,
) -> Result<Router<S>, InitError>
where
    S: Clone + Send + Sync + 'static,
{
    let enable_stdout = options.enable_stdout;
    let (router, layer) = init(router, config, options)?;

    // Two branches keep the subscriber types concrete.
    if enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(router)
}

/// Initialize with [`InitOptions::default`]: queued delivery of events at
/// `WARNING` and above.
pub fn init_tracing<S>(router: Router<S>, config: &SynchrologConfig) -> Result<Router<S>, InitError>
where
    S: Clone + Send + Sync + 'static,
{
    init_tracing_with_options(router, config, InitOptions::default())
}
