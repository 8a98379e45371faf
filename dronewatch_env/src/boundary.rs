//! Collaborator contracts around the proximity core.
//!
//! ```text
//!  ReportSource ──> ReportHandler ──> RecordSink   (raw / cartesian / proximity)
//!                        │
//!                        └──────────> StreamEmitter (one tuple per pair)
//! ```

use async_trait::async_trait;
use serde::Serialize;
use std::io::Write;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::error::EnvError;
use crate::types::{CartesianRecord, ProximityRecord, ProximityTuple, RawRecord, RawReport};

/// What a single poll of a [`ReportSource`] produced.
#[derive(Debug)]
pub enum SourceEvent {
    /// A decoded, well-formed report
    Report(RawReport),

    /// A payload arrived but was rejected before reaching the handler
    Malformed(EnvError),

    /// The poll timeout elapsed with nothing to deliver
    Idle,

    /// The source is exhausted or shut down
    Closed,
}

/// Delivers decoded reports one at a time.
///
/// # Implementations
///
/// - `ChannelSource`: raw payloads over a tokio channel
/// - `LineSource`: newline-delimited JSON over any async reader
#[async_trait]
pub trait ReportSource: Send {
    /// Waits up to `timeout` for the next event.
    async fn next_event(&mut self, timeout: Duration) -> SourceEvent;
}

/// Persists raw, Cartesian and proximity rows.
///
/// Writes are fire-and-forget from the handler's point of view: an `Err` is
/// logged and counted, never retried.
pub trait RecordSink: Send + Sync {
    /// Writes a raw row keyed by `uid + dronetime`.
    fn put_raw(&self, record: &RawRecord) -> Result<(), EnvError>;

    /// Writes a Cartesian row keyed by `uid + dronetime`.
    fn put_cartesian(&self, record: &CartesianRecord) -> Result<(), EnvError>;

    /// Writes a proximity row keyed by `uid0 + uid1 + datetime`.
    fn put_proximity(&self, record: &ProximityRecord) -> Result<(), EnvError>;
}

/// Receives one tuple per evaluated pair.
pub trait StreamEmitter: Send + Sync {
    fn emit(&self, tuple: ProximityTuple) -> Result<(), EnvError>;
}

/// Writes each tuple as one JSON document per line.
pub struct JsonLinesEmitter<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesEmitter<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    /// Flushes the underlying writer.
    pub fn flush(&self) -> Result<(), EnvError> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        out.flush().map_err(|e| EnvError::emit(e.to_string()))
    }

    /// Consumes the emitter and returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> StreamEmitter for JsonLinesEmitter<W> {
    fn emit(&self, tuple: ProximityTuple) -> Result<(), EnvError> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        write_json_line(&mut *out, &tuple)
    }
}

fn write_json_line<W: Write, T: Serialize>(out: &mut W, value: &T) -> Result<(), EnvError> {
    serde_json::to_writer(&mut *out, value).map_err(|e| EnvError::emit(e.to_string()))?;
    out.write_all(b"\n").map_err(|e| EnvError::emit(e.to_string()))
}

/// Keeps every emitted tuple in memory (tests and simulation).
#[derive(Default)]
pub struct CollectingEmitter {
    tuples: Mutex<Vec<ProximityTuple>>,
}

impl CollectingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns everything emitted so far.
    pub fn drain(&self) -> Vec<ProximityTuple> {
        std::mem::take(&mut *self.tuples.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.tuples.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StreamEmitter for CollectingEmitter {
    fn emit(&self, tuple: ProximityTuple) -> Result<(), EnvError> {
        self.tuples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tuple);
        Ok(())
    }
}

/// Field grouping: routes every report for a given `uid` to the same worker.
///
/// Each worker owns an independent window, so two drones routed to
/// different workers are never compared. The hash is FNV-1a over the
/// identifier bytes, which is stable across processes and builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldGrouping {
    workers: usize,
}

impl FieldGrouping {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    /// Creates a grouping over `workers` instances (must be at least one).
    pub fn new(workers: usize) -> Result<Self, EnvError> {
        if workers == 0 {
            return Err(EnvError::InvalidArgument(
                "field grouping needs at least one worker".to_string(),
            ));
        }
        Ok(Self { workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Returns the worker index in `0..workers` that owns `uid`.
    pub fn route(&self, uid: &str) -> usize {
        let hash = uid.bytes().fold(Self::FNV_OFFSET, |h, b| {
            (h ^ u64::from(b)).wrapping_mul(Self::FNV_PRIME)
        });
        (hash % self.workers as u64) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuple(uid0: &str, uid1: &str, proximity: f64) -> ProximityTuple {
        ProximityTuple {
            datetime: "20240101000000000000".to_string(),
            uid0: uid0.to_string(),
            uid1: uid1.to_string(),
            proximity,
        }
    }

    #[test]
    fn test_json_lines_emitter_one_line_per_tuple() {
        let emitter = JsonLinesEmitter::new(Vec::new());
        emitter.emit(tuple("a", "b", 12.5)).unwrap();
        emitter.emit(tuple("a", "c", 99.0)).unwrap();

        let text = String::from_utf8(emitter.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: ProximityTuple = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first, tuple("a", "b", 12.5));
    }

    #[test]
    fn test_collecting_emitter_drain() {
        let emitter = CollectingEmitter::new();
        emitter.emit(tuple("a", "b", 1.0)).unwrap();
        assert_eq!(emitter.len(), 1);

        let drained = emitter.drain();
        assert_eq!(drained.len(), 1);
        assert!(emitter.is_empty());
    }

    #[test]
    fn test_field_grouping_rejects_zero_workers() {
        assert!(matches!(
            FieldGrouping::new(0),
            Err(EnvError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_field_grouping_is_stable_and_in_range() {
        let grouping = FieldGrouping::new(4).unwrap();

        for i in 0..200 {
            let uid = format!("drone-{}", i);
            let worker = grouping.route(&uid);
            assert!(worker < 4);
            assert_eq!(worker, grouping.route(&uid));
        }
    }

    #[test]
    fn test_field_grouping_spreads_identifiers() {
        let grouping = FieldGrouping::new(2).unwrap();
        let on_zero = (0..100)
            .filter(|i| grouping.route(&format!("drone-{}", i)) == 0)
            .count();

        assert!(on_zero > 0 && on_zero < 100);
    }

    #[test]
    fn test_single_worker_takes_everything() {
        let grouping = FieldGrouping::new(1).unwrap();
        assert_eq!(grouping.route("anything"), 0);
        assert_eq!(grouping.route(""), 0);
    }
}
