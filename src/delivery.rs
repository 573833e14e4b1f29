use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::{Builder, Handle, RuntimeFlavor};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::record::LogRecord;
use crate::sink::TelemetrySink;

/// Target of this crate's own diagnostics. Events on it are never captured
/// by [`crate::layer::SynchrologLayer`].
pub const DIAGNOSTICS_TARGET: &str = "synchrolog::diagnostics";

/// Counters shared by the layer and the delivery worker.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    captured: AtomicU64,
    enqueued: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl DeliveryStats {
    /// Records that passed the level threshold and the enrichment pipeline
    /// with a payload attached.
    pub fn captured(&self) -> u64 {
        self.captured.load(Ordering::Relaxed)
    }

    /// Records pushed onto the queue (async mode only).
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Payloads accepted by the sink.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Payloads the sink rejected or could not send.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Payloads discarded before any send attempt: malformed, or the
    /// worker is gone.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Payloads that reached a final state.
    pub fn settled(&self) -> u64 {
        self.delivered() + self.failed() + self.dropped()
    }

    pub(crate) fn inc_captured(&self) {
        self.captured.fetch_add(1, Ordering::Relaxed);
    }
}

/// How enriched records reach the sink.
pub(crate) enum Delivery {
    /// Unbounded FIFO drained by a single background worker.
    Queue(mpsc::UnboundedSender<LogRecord>),
    /// The emitting thread sends inline.
    Direct(Arc<dyn TelemetrySink>),
}

impl Delivery {
    /// Spawn the background worker on `handle` and return the queue feeding it.
    pub(crate) fn queued(
        handle: &Handle,
        sink: Arc<dyn TelemetrySink>,
        stats: Arc<DeliveryStats>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel::<LogRecord>();
        let worker = handle.spawn(run_worker(sink, rx, stats));
        (Delivery::Queue(tx), worker)
    }

    pub(crate) fn dispatch(&self, record: LogRecord, stats: &Arc<DeliveryStats>) {
        if record.telemetry().is_none() {
            return;
        }

        match self {
            Delivery::Queue(tx) => {
                if tx.send(record).is_ok() {
                    stats.enqueued.fetch_add(1, Ordering::Relaxed);
                } else {
                    stats.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(target: DIAGNOSTICS_TARGET, "telemetry worker stopped, dropping record");
                }
            }
            Delivery::Direct(sink) => deliver_inline(sink, record, stats),
        }
    }
}

async fn run_worker(
    sink: Arc<dyn TelemetrySink>,
    mut rx: mpsc::UnboundedReceiver<LogRecord>,
    stats: Arc<DeliveryStats>,
) {
    while let Some(record) = rx.recv().await {
        deliver(&*sink, &record, &stats).await;
    }
    tracing::debug!(target: DIAGNOSTICS_TARGET, "telemetry queue closed, worker exiting");
}

/// Blocking delivery from synchronous code.
///
/// A current-thread runtime cannot be blocked from within, so there the
/// send is spawned instead.
fn deliver_inline(sink: &Arc<dyn TelemetrySink>, record: LogRecord, stats: &Arc<DeliveryStats>) {
    match Handle::try_current() {
        Ok(handle) => match handle.runtime_flavor() {
            RuntimeFlavor::CurrentThread => {
                let sink = Arc::clone(sink);
                let stats = Arc::clone(stats);
                handle.spawn(async move { deliver(&*sink, &record, &stats).await });
            }
            _ => tokio::task::block_in_place(|| handle.block_on(deliver(&**sink, &record, stats))),
        },
        Err(_) => match Builder::new_current_thread().enable_all().build() {
            Ok(rt) => rt.block_on(deliver(&**sink, &record, stats)),
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(target: DIAGNOSTICS_TARGET, error = %e, "cannot build runtime for telemetry delivery");
            }
        },
    }
}

/// Send the record's payload once. Never fails; outcomes only move the
/// counters and emit a diagnostic event.
pub async fn deliver(sink: &dyn TelemetrySink, record: &LogRecord, stats: &DeliveryStats) {
    let Some(payload) = record.telemetry() else {
        return;
    };

    if payload.destination_url().is_empty() {
        stats.dropped.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(target: DIAGNOSTICS_TARGET, "telemetry payload has no destination, dropping");
        return;
    }

    match sink.send(payload).await {
        Ok(()) => {
            stats.delivered.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                target: DIAGNOSTICS_TARGET,
                error = %e,
                destination = payload.destination_url(),
                "telemetry delivery failed"
            );
        }
    }
}
