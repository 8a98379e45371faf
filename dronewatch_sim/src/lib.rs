//! DroneWatch replay and deterministic fleet simulation
//!
//! Two ways of driving the proximity pipeline end to end:
//! - **Replay**: JSON-lines reports from a file or stdin, sled persistence,
//!   proximity tuples as JSON lines on stdout
//! - **Simulation**: a seeded fleet on a virtual clock, fed through the same
//!   handler and checked against ground truth
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ScenarioRunner                         │
//! │                                                             │
//! │  ┌─────────────┐   reports    ┌──────────────────────────┐  │
//! │  │ FleetOracle │─────────────►│      ReportHandler       │  │
//! │  │ (ChaCha8)   │              │  MemoryStore + Collector │  │
//! │  └──────┬──────┘              └────────────┬─────────────┘  │
//! │         │ ground truth                     │ tuples, alerts │
//! │         ▼                                  ▼                │
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │          ScenarioResult  /  SimExport frames          │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use dronewatch_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::NearMiss);
//! assert!(result.passed);
//! ```

mod context;
mod exporter;
mod oracle;
pub mod replay;
mod runner;
pub mod scenarios;

pub use context::SimContext;
pub use exporter::{AlertFrame, DronePosition, SimEvent, SimExport, SimFrame};
pub use oracle::{FleetOracle, SimDrone};
pub use replay::{replay, ReplayError, ReplayOptions, ReplaySummary};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
