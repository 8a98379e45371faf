//! Replay mode: JSON-lines reports in, proximity tuples out.
//!
//! Reads one report per line from a file (or stdin), runs them through a
//! [`HandlerPool`] backed by the sled store, and writes every proximity
//! tuple as a JSON line to a file (or stdout).

use dronewatch_core::{ConfigError, HandlerPool, HandlerStats, PoolError, SledRecordStore, WatchConfig};
use dronewatch_env::{EnvError, JsonLinesEmitter, LineSource, TokioContext};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufRead, BufReader};
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to open store: {0}")]
    Store(#[source] EnvError),

    #[error("Failed to start workers: {0}")]
    Pool(#[from] PoolError),

    #[error("Failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where replay reads from and writes to.
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    /// Input file; `None` or `-` reads stdin
    pub input: Option<PathBuf>,

    /// Output file; `None` writes stdout
    pub output: Option<PathBuf>,

    /// Number of field-grouped handler instances
    pub workers: usize,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            input: None,
            output: None,
            workers: 1,
        }
    }
}

/// Counters and table sizes at the end of a replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    pub stats: HandlerStats,
    pub raw_rows: usize,
    pub cart_rows: usize,
    pub prox_rows: usize,
}

/// Runs a full replay session.
pub async fn replay(config: &WatchConfig, options: &ReplayOptions) -> Result<ReplaySummary, ReplayError> {
    config.validate()?;

    let store = Arc::new(
        SledRecordStore::open(&config.store.path, &config.store).map_err(ReplayError::Store)?,
    );
    let emitter = Arc::new(JsonLinesEmitter::new(open_output(options)?));
    let mut pool = HandlerPool::new(
        options.workers,
        TokioContext::shared(),
        store.clone(),
        emitter.clone(),
        config,
    )?;

    let mut source = LineSource::new(open_input(options).await?);

    info!(
        store = %config.store.path.display(),
        workers = options.workers,
        "Replaying reports"
    );
    let stats = pool.run(&mut source, config.poll_timeout()).await;

    if let Err(e) = emitter.flush() {
        error!(error = %e, "Output flush failed");
    }
    match store.flush() {
        Ok(bytes) => debug!(bytes, "Store flushed"),
        Err(e) => error!(error = %e, "Store flush failed"),
    }

    let summary = ReplaySummary {
        raw_rows: store.raw_len(),
        cart_rows: store.cart_len(),
        prox_rows: store.prox_len(),
        stats,
    };

    info!(
        reports = summary.stats.reports,
        rejected = summary.stats.rejected,
        pairs = summary.stats.pairs_evaluated,
        alerts = summary.stats.alerts,
        evictions = summary.stats.evictions,
        prox_rows = summary.prox_rows,
        "Replay complete"
    );

    Ok(summary)
}

async fn open_input(options: &ReplayOptions) -> Result<Box<dyn AsyncBufRead + Unpin + Send>, ReplayError> {
    match &options.input {
        Some(path) if path.as_os_str() != "-" => {
            let file = tokio::fs::File::open(path)
                .await
                .map_err(|source| ReplayError::Io {
                    path: path.clone(),
                    source,
                })?;
            Ok(Box::new(BufReader::new(file)))
        }
        _ => Ok(Box::new(BufReader::new(tokio::io::stdin()))),
    }
}

fn open_output(options: &ReplayOptions) -> Result<Box<dyn Write + Send>, ReplayError> {
    match &options.output {
        Some(path) => {
            let file = std::fs::File::create(path).map_err(|source| ReplayError::Io {
                path: path.clone(),
                source,
            })?;
            Ok(Box::new(std::io::BufWriter::new(file)))
        }
        None => Ok(Box::new(std::io::stdout())),
    }
}
