//! DroneWatch Environment Abstraction Layer
//!
//! This crate holds everything the proximity core talks to but does not
//! own: the clock, the inbound report stream, the record store and the
//! downstream tuple stream.
//!
//! # Core Concept: Collaborators at the Boundary
//!
//! The core processes one report at a time, synchronously. Everything else
//! is reached through a trait:
//! - Time (`WatchContext::system_time()`)
//! - Inbound reports (`ReportSource::next_event()`)
//! - Persistence (`RecordSink::put_*()`)
//! - Downstream tuples (`StreamEmitter::emit()`)
//!
//! Swapping the clock for a virtual one makes every record a handler writes
//! reproducible.
//!
//! # Example
//!
//! ```ignore
//! use dronewatch_env::{ChannelSource, ReportSource, SourceEvent};
//!
//! let (tx, mut source) = ChannelSource::channel(1024);
//! loop {
//!     match source.next_event(Duration::from_secs(1)).await {
//!         SourceEvent::Report(report) => handle(report),
//!         SourceEvent::Malformed(e) => warn!("rejected: {}", e),
//!         SourceEvent::Idle => continue,
//!         SourceEvent::Closed => break,
//!     }
//! }
//! ```

mod boundary;
mod context;
mod error;
mod tokio_impl;
mod types;

pub use boundary::{
    CollectingEmitter, FieldGrouping, JsonLinesEmitter, RecordSink, ReportSource, SourceEvent,
    StreamEmitter,
};
pub use context::{format_stamp, WatchContext, DTFMT};
pub use error::EnvError;
pub use tokio_impl::{ChannelEmitter, ChannelSource, LineSource, TokioContext};
pub use types::{CartesianRecord, ProximityRecord, ProximityTuple, RawRecord, RawReport};
