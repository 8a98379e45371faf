//! Report Handler - runs the proximity pipeline for each incoming report.
//!
//! This module is the integration layer between the pure engines
//! (geodesy, window, pairwise distances, proximity evaluation) and the
//! boundary collaborators (clock, record sink, stream emitter).
//!
//! # Pipeline
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ReportHandler                          │
//! │                                                             │
//! │  report ─► persist raw ─► to_cartesian ─► persist cartesian │
//! │                                │                            │
//! │                                ▼                            │
//! │                        ActiveWindow::upsert                 │
//! │                                │                            │
//! │                                ▼                            │
//! │              PairwiseIter ─► ProximityEvaluator             │
//! │                                │                            │
//! │                                ▼                            │
//! │           persist proximity ─► warn on alert ─► emit tuple  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reports are handled strictly one at a time. Sink and emitter failures
//! are logged and counted, never fatal.

use dronewatch_env::{
    format_stamp, CartesianRecord, EnvError, RawReport, RecordSink, ReportSource, SourceEvent,
    StreamEmitter, WatchContext,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use crate::config::{ConfigError, WatchConfig};
use crate::distance::{DistanceRecord, PairwiseIter};
use crate::geodesy;
use crate::proximity::ProximityEvaluator;
use crate::window::{ActiveWindow, Position, WindowError};

/// Why a handler could not be built.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Invalid handler configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to create window: {0}")]
    Window(#[from] WindowError),
}

#[derive(Debug, Error, PartialEq)]
pub enum PipelineError {
    #[error("Non-finite Cartesian position for {uid} (alt={altitude}, lat={latitude}, lon={longitude})")]
    NonFinitePosition {
        uid: String,
        altitude: f64,
        latitude: f64,
        longitude: f64,
    },
}

/// Running counters for one handler (or the sum over a pool).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerStats {
    /// Reports that reached the handler
    pub reports: u64,

    /// Payloads rejected by the source before reaching the handler
    pub rejected: u64,

    /// Reports aborted mid-pipeline
    pub pipeline_failures: u64,

    /// Failed sink writes
    pub persist_failures: u64,

    /// Failed downstream emits
    pub emit_failures: u64,

    pub evictions: u64,
    pub pairs_evaluated: u64,
    pub alerts: u64,
}

impl HandlerStats {
    /// Adds another set of counters into this one.
    pub fn merge(&mut self, other: &HandlerStats) {
        self.reports += other.reports;
        self.rejected += other.rejected;
        self.pipeline_failures += other.pipeline_failures;
        self.persist_failures += other.persist_failures;
        self.emit_failures += other.emit_failures;
        self.evictions += other.evictions;
        self.pairs_evaluated += other.pairs_evaluated;
        self.alerts += other.alerts;
    }
}

/// What handling one report produced.
#[derive(Debug, Clone)]
pub struct ReportOutcome {
    pub uid: String,

    /// Drone pushed out of the window to make room, if any
    pub evicted: Option<Arc<str>>,

    /// Pairs evaluated (and persisted/emitted) for this report
    pub pairs: usize,

    /// Pairs below the threshold
    pub alerts: Vec<DistanceRecord>,

    /// Window size after the upsert
    pub window_len: usize,
}

/// Anything that accepts decoded reports one at a time.
pub trait Dispatch {
    fn dispatch(&mut self, report: &RawReport) -> Result<ReportOutcome, PipelineError>;

    /// Called for payloads the source rejected before decoding succeeded.
    fn reject(&mut self, error: &EnvError);
}

/// Drives `source` until it closes, feeding every report to `dispatcher`.
///
/// Malformed payloads and pipeline failures are logged and skipped; idle
/// polls simply poll again.
pub async fn run_source<D, S>(dispatcher: &mut D, source: &mut S, poll_timeout: Duration)
where
    D: Dispatch + ?Sized,
    S: ReportSource + ?Sized,
{
    loop {
        match source.next_event(poll_timeout).await {
            SourceEvent::Report(report) => {
                if let Err(e) = dispatcher.dispatch(&report) {
                    error!(uid = %report.uid, error = %e, "Report processing aborted");
                }
            }
            SourceEvent::Malformed(e) => {
                warn!(error = %e, "Discarding inbound payload");
                dispatcher.reject(&e);
            }
            SourceEvent::Idle => {
                trace!("Source idle");
            }
            SourceEvent::Closed => {
                info!("Report source closed");
                break;
            }
        }
    }
}

/// One processing session: owns the active window and the evaluator.
///
/// Generic over the clock, sink and emitter so the same handler runs in
/// production (system clock, sled, stdout) or simulation (virtual clock,
/// memory store, collecting emitter).
pub struct ReportHandler<Ctx, Sink, Out>
where
    Ctx: WatchContext,
    Sink: RecordSink,
    Out: StreamEmitter,
{
    /// Clock for record timestamps
    pub context: Arc<Ctx>,

    /// Raw / Cartesian / proximity persistence
    pub sink: Arc<Sink>,

    /// Downstream tuple stream
    pub emitter: Arc<Out>,

    /// Label used in log events (worker name)
    pub label: String,

    window: ActiveWindow,
    evaluator: ProximityEvaluator,
    stats: HandlerStats,
}

impl<Ctx, Sink, Out> ReportHandler<Ctx, Sink, Out>
where
    Ctx: WatchContext,
    Sink: RecordSink,
    Out: StreamEmitter,
{
    /// Creates a handler with an empty window sized from `config`.
    ///
    /// `config` is validated first, so a zero capacity or a negative or
    /// non-finite threshold fails here rather than silently never alerting.
    pub fn new(
        context: Arc<Ctx>,
        sink: Arc<Sink>,
        emitter: Arc<Out>,
        config: &WatchConfig,
    ) -> Result<Self, HandlerError> {
        config.validate()?;

        Ok(Self {
            context,
            sink,
            emitter,
            label: "dronewatch".to_string(),
            window: ActiveWindow::new(config.window_capacity)?,
            evaluator: ProximityEvaluator::new(config.proximity_threshold_m),
            stats: HandlerStats::default(),
        })
    }

    /// Sets the label used in log events.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn window(&self) -> &ActiveWindow {
        &self.window
    }

    pub fn stats(&self) -> &HandlerStats {
        &self.stats
    }

    pub fn threshold(&self) -> f64 {
        self.evaluator.threshold()
    }

    /// Processes one report to completion.
    ///
    /// A conversion that yields a non-finite position aborts the report
    /// before the window is touched.
    pub fn handle(&mut self, report: &RawReport) -> Result<ReportOutcome, PipelineError> {
        self.stats.reports += 1;
        debug!(worker = %self.label, uid = %report.uid, region = %report.region, "Received report");

        let row_key = report.row_key();
        let written = self.sink.put_raw(&report.to_raw_record());
        note_persist(&mut self.stats, "raw", &row_key, written);

        let latitude = report.latitude.to_radians();
        let longitude = report.longitude.to_radians();
        let point = geodesy::to_cartesian(report.altitude, latitude, longitude);
        if !point.is_finite() {
            self.stats.pipeline_failures += 1;
            return Err(PipelineError::NonFinitePosition {
                uid: report.uid.clone(),
                altitude: report.altitude,
                latitude: report.latitude,
                longitude: report.longitude,
            });
        }

        let cartesian = CartesianRecord {
            uid: report.uid.clone(),
            dronetime: report.dronetime.clone(),
            carttime: format_stamp(&self.context.utc_now()),
            x: point.x(),
            y: point.y(),
            z: point.z(),
            r: point.r,
        };
        let written = self.sink.put_cartesian(&cartesian);
        note_persist(&mut self.stats, "cartesian", &row_key, written);

        let position = Position::new(
            report.uid.as_str(),
            point,
            report.altitude,
            latitude,
            longitude,
            report.dronetime.as_str(),
        );
        let evicted = self.window.upsert(position);
        if let Some(id) = &evicted {
            self.stats.evictions += 1;
            debug!(worker = %self.label, evicted = %id, "Window full; evicted oldest drone");
        }

        let computed_at = self.context.utc_now();
        let snapshot = self.window.snapshot();
        trace!(worker = %self.label, window = snapshot.len(), "Recomputing pairwise distances");

        let mut pairs = 0;
        let mut alerts = Vec::new();
        for record in PairwiseIter::new(&snapshot, computed_at) {
            let evaluated = self.evaluator.annotate(record);
            let record = evaluated.record;
            pairs += 1;

            let row = record.to_proximity_record();
            let written = self.sink.put_proximity(&row);
            note_persist(&mut self.stats, "proximity", &row.key(), written);

            if evaluated.is_alert {
                warn!(
                    "Drones {}, {} are {} meters apart!",
                    record.id_i, record.id_j, record.dr
                );
                self.stats.alerts += 1;
            }

            if let Err(e) = self.emitter.emit(record.to_tuple()) {
                self.stats.emit_failures += 1;
                error!(pair = %format!("{}/{}", record.id_i, record.id_j), error = %e, "Emit failed");
            }

            if evaluated.is_alert {
                alerts.push(record);
            }
        }
        self.stats.pairs_evaluated += pairs as u64;

        Ok(ReportOutcome {
            uid: report.uid.clone(),
            evicted,
            pairs,
            alerts,
            window_len: self.window.len(),
        })
    }

    /// Drives `source` until it closes and returns the final counters.
    pub async fn run<S>(&mut self, source: &mut S, poll_timeout: Duration) -> HandlerStats
    where
        S: ReportSource + ?Sized,
    {
        run_source(self, source, poll_timeout).await;
        self.stats.clone()
    }
}

impl<Ctx, Sink, Out> Dispatch for ReportHandler<Ctx, Sink, Out>
where
    Ctx: WatchContext,
    Sink: RecordSink,
    Out: StreamEmitter,
{
    fn dispatch(&mut self, report: &RawReport) -> Result<ReportOutcome, PipelineError> {
        self.handle(report)
    }

    fn reject(&mut self, _error: &EnvError) {
        self.stats.rejected += 1;
    }
}

fn note_persist(stats: &mut HandlerStats, table: &str, key: &str, result: Result<(), EnvError>) {
    if let Err(e) = result {
        stats.persist_failures += 1;
        error!(table, key, error = %e, "Failed to persist record");
    }
}
