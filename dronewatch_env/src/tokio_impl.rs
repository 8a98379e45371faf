//! Production implementations backed by Tokio.

use crate::boundary::{ReportSource, SourceEvent, StreamEmitter};
use crate::error::EnvError;
use crate::types::{ProximityTuple, RawReport};
use crate::WatchContext;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::sync::mpsc;
use tracing::warn;

/// Production context backed by the system clock.
pub struct TokioContext {
    /// Start time for monotonic duration calculations
    start: Instant,
}

impl TokioContext {
    /// Creates a new TokioContext.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Creates an Arc-wrapped context for sharing across handlers.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchContext for TokioContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
}

fn decode_event(payload: &[u8]) -> SourceEvent {
    match RawReport::decode(payload) {
        Ok(report) => SourceEvent::Report(report),
        Err(e) => SourceEvent::Malformed(e),
    }
}

/// Report source fed with raw payloads over a tokio channel.
///
/// The channel plays the role of the message-bus consumer: whoever holds
/// the sender pushes undecoded bytes, and decoding happens here so that
/// malformed payloads never reach the handler.
pub struct ChannelSource {
    rx: mpsc::Receiver<Vec<u8>>,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self { rx }
    }

    /// Creates a bounded channel and returns the sender with its source.
    pub fn channel(buffer: usize) -> (mpsc::Sender<Vec<u8>>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl ReportSource for ChannelSource {
    async fn next_event(&mut self, timeout: Duration) -> SourceEvent {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Err(_) => SourceEvent::Idle,
            Ok(None) => SourceEvent::Closed,
            Ok(Some(payload)) => decode_event(&payload),
        }
    }
}

/// Report source reading newline-delimited JSON from an async reader.
///
/// Blank lines are skipped. A read error ends the stream.
pub struct LineSource<R> {
    lines: Lines<R>,
}

impl<R: AsyncBufRead + Unpin + Send> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> ReportSource for LineSource<R> {
    async fn next_event(&mut self, timeout: Duration) -> SourceEvent {
        let lines = &mut self.lines;
        let read = async {
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    other => return other,
                }
            }
        };

        match tokio::time::timeout(timeout, read).await {
            Err(_) => SourceEvent::Idle,
            Ok(Ok(None)) => SourceEvent::Closed,
            Ok(Ok(Some(line))) => decode_event(line.as_bytes()),
            Ok(Err(e)) => {
                warn!(error = %e, "Report stream read failed; closing source");
                SourceEvent::Closed
            }
        }
    }
}

/// Emits tuples into an unbounded tokio channel (never blocks).
pub struct ChannelEmitter {
    tx: mpsc::UnboundedSender<ProximityTuple>,
}

impl ChannelEmitter {
    pub fn new(tx: mpsc::UnboundedSender<ProximityTuple>) -> Self {
        Self { tx }
    }

    /// Creates the emitter together with the downstream receiver.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProximityTuple>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl StreamEmitter for ChannelEmitter {
    fn emit(&self, tuple: ProximityTuple) -> Result<(), EnvError> {
        self.tx
            .send(tuple)
            .map_err(|_| EnvError::emit("downstream channel closed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    const REPORT: &str = r#"{"uid":"a1","dronetime":"t0","region":"sf","altitude":100.0,"latitude":37.0,"longitude":-122.0}"#;

    #[tokio::test]
    async fn test_tokio_context_time() {
        let ctx = TokioContext::new();
        let t1 = ctx.now();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let t2 = ctx.now();

        assert!(t2 > t1);
        assert!(t2 - t1 >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_channel_source_events() {
        let (tx, mut source) = ChannelSource::channel(8);
        tx.send(REPORT.as_bytes().to_vec()).await.unwrap();
        tx.send(b"{\"status\":\"ok\"}".to_vec()).await.unwrap();

        let timeout = Duration::from_millis(50);
        assert!(matches!(source.next_event(timeout).await, SourceEvent::Report(r) if r.uid == "a1"));
        assert!(matches!(
            source.next_event(timeout).await,
            SourceEvent::Malformed(EnvError::NotAReport)
        ));
        assert!(matches!(source.next_event(timeout).await, SourceEvent::Idle));

        drop(tx);
        assert!(matches!(source.next_event(timeout).await, SourceEvent::Closed));
    }

    #[tokio::test]
    async fn test_line_source_skips_blank_lines() {
        let input = format!("{}\n\n   \n{{\"uid\": 5}}\n", REPORT);
        let mut source = LineSource::new(BufReader::new(input.as_bytes()));
        let timeout = Duration::from_millis(50);

        assert!(matches!(source.next_event(timeout).await, SourceEvent::Report(_)));
        assert!(matches!(
            source.next_event(timeout).await,
            SourceEvent::Malformed(EnvError::MalformedReport(_))
        ));
        assert!(matches!(source.next_event(timeout).await, SourceEvent::Closed));
    }

    #[tokio::test]
    async fn test_channel_emitter_delivers_and_reports_closed() {
        let (emitter, mut rx) = ChannelEmitter::channel();
        let tuple = ProximityTuple {
            datetime: "t".into(),
            uid0: "a".into(),
            uid1: "b".into(),
            proximity: 42.0,
        };

        emitter.emit(tuple.clone()).unwrap();
        assert_eq!(rx.recv().await, Some(tuple.clone()));

        drop(rx);
        assert!(matches!(emitter.emit(tuple), Err(EnvError::EmitError(_))));
    }
}
