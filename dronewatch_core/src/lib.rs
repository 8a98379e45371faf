//! DroneWatch Core - streaming proximity detection for drone fleets
//!
//! Every incoming position report is converted to an Earth-centred
//! Cartesian frame, placed in a bounded window of recently seen drones, and
//! compared against every other drone in that window:
//! 1. **Geodesy**: altitude/latitude/longitude on an oblate spheroid to (x, y, z)
//! 2. **Active window**: capacity-bounded, recency-ordered, O(1) eviction
//! 3. **Pairwise engine**: full upper-triangle recompute per report
//! 4. **Proximity evaluation**: pairs strictly closer than the threshold alert

pub mod config;
pub mod distance;
pub mod geodesy;
pub mod handler;
pub mod pool;
pub mod proximity;
pub mod store;
pub mod window;

// Re-export key types for convenience
pub use config::{ConfigError, StoreConfig, WatchConfig};
pub use distance::{compute_all, DistanceRecord, PairwiseIter};
pub use geodesy::{to_cartesian, GeocentricPoint};
pub use handler::{HandlerError, HandlerStats, PipelineError, ReportHandler, ReportOutcome};
pub use pool::{HandlerPool, PoolError};
pub use proximity::{Evaluated, ProximityEvaluator};
pub use store::{MemoryStore, SledRecordStore};
pub use window::{ActiveWindow, Position, WindowError};
