//! Handler pool - field-grouped partitioning across independent handlers.
//!
//! Each worker owns its own [`ReportHandler`] and therefore its own active
//! window. A report is routed by its identifier, so a drone always lands on
//! the same worker and drones routed to different workers are never paired.

use dronewatch_env::{
    EnvError, FieldGrouping, RawReport, RecordSink, ReportSource, StreamEmitter, WatchContext,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::WatchConfig;
use crate::handler::{
    run_source, Dispatch, HandlerError, HandlerStats, PipelineError, ReportHandler, ReportOutcome,
};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Invalid worker count: {0}")]
    Grouping(#[from] EnvError),

    #[error("Failed to create worker: {0}")]
    Handler(#[from] HandlerError),
}

pub struct HandlerPool<Ctx, Sink, Out>
where
    Ctx: WatchContext,
    Sink: RecordSink,
    Out: StreamEmitter,
{
    grouping: FieldGrouping,
    handlers: Vec<ReportHandler<Ctx, Sink, Out>>,
    rejected: u64,
}

impl<Ctx, Sink, Out> HandlerPool<Ctx, Sink, Out>
where
    Ctx: WatchContext,
    Sink: RecordSink,
    Out: StreamEmitter,
{
    /// Creates `workers` handlers sharing the clock, sink and emitter.
    pub fn new(
        workers: usize,
        context: Arc<Ctx>,
        sink: Arc<Sink>,
        emitter: Arc<Out>,
        config: &WatchConfig,
    ) -> Result<Self, PoolError> {
        let grouping = FieldGrouping::new(workers)?;
        let handlers = (0..workers)
            .map(|w| {
                ReportHandler::new(context.clone(), sink.clone(), emitter.clone(), config)
                    .map(|h| h.with_label(format!("worker-{}", w)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            workers,
            capacity = config.window_capacity,
            threshold_m = config.proximity_threshold_m,
            "Handler pool ready"
        );

        Ok(Self {
            grouping,
            handlers,
            rejected: 0,
        })
    }

    pub fn workers(&self) -> usize {
        self.handlers.len()
    }

    /// Worker index `uid` is routed to.
    pub fn route(&self, uid: &str) -> usize {
        self.grouping.route(uid)
    }

    pub fn handler(&self, worker: usize) -> Option<&ReportHandler<Ctx, Sink, Out>> {
        self.handlers.get(worker)
    }

    /// Routes `report` to its worker and processes it there.
    pub fn handle(&mut self, report: &RawReport) -> Result<ReportOutcome, PipelineError> {
        let worker = self.grouping.route(&report.uid);
        self.handlers[worker].handle(report)
    }

    /// Counters summed over every worker.
    pub fn stats(&self) -> HandlerStats {
        let mut total = HandlerStats {
            rejected: self.rejected,
            ..HandlerStats::default()
        };
        for handler in &self.handlers {
            total.merge(handler.stats());
        }
        total
    }

    /// Drives `source` until it closes and returns the summed counters.
    pub async fn run<S>(&mut self, source: &mut S, poll_timeout: Duration) -> HandlerStats
    where
        S: ReportSource + ?Sized,
    {
        run_source(self, source, poll_timeout).await;
        self.stats()
    }
}

impl<Ctx, Sink, Out> Dispatch for HandlerPool<Ctx, Sink, Out>
where
    Ctx: WatchContext,
    Sink: RecordSink,
    Out: StreamEmitter,
{
    fn dispatch(&mut self, report: &RawReport) -> Result<ReportOutcome, PipelineError> {
        self.handle(report)
    }

    fn reject(&mut self, _error: &EnvError) {
        self.rejected += 1;
    }
}
