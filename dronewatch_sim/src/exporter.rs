//! JSON exporter for external visualization.
//!
//! Exports simulation frames (true drone positions, alerts, window events)
//! as a single JSON document.

use dronewatch_core::{DistanceRecord, HandlerStats};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::oracle::SimDrone;

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Simulation time in seconds
    pub time_sec: f64,

    /// Ground truth drone positions
    pub drones: Vec<DronePosition>,

    /// Alerts raised since the previous frame
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub alerts: Vec<AlertFrame>,

    /// Events (evictions, aborted reports)
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub events: Vec<SimEvent>,
}

/// Position of a drone, geodetic and Cartesian.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DronePosition {
    pub uid: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<&SimDrone> for DronePosition {
    fn from(drone: &SimDrone) -> Self {
        let point = drone.position();
        Self {
            uid: drone.uid.clone(),
            latitude: drone.latitude,
            longitude: drone.longitude,
            altitude: drone.altitude,
            x: point.x(),
            y: point.y(),
            z: point.z(),
        }
    }
}

/// An alerting pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertFrame {
    pub uid0: String,
    pub uid1: String,
    pub dr: f64,
}

impl From<&DistanceRecord> for AlertFrame {
    fn from(record: &DistanceRecord) -> Self {
        Self {
            uid0: record.id_i.to_string(),
            uid1: record.id_j.to_string(),
            dr: record.dr,
        }
    }
}

/// Simulation event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimEvent {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Handler counters at the end of the run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<HandlerStats>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
            stats: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>, stats: HandlerStats) {
        self.passed = passed;
        self.failure_reason = failure_reason;
        self.stats = Some(stats);
    }

    /// Total alerts across all frames.
    pub fn alert_count(&self) -> usize {
        self.frames.iter().map(|f| f.alerts.len()).sum()
    }

    /// Writes to a JSON file.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use dronewatch_core::geodesy::EQUATORIAL_RADIUS_M;
    use nalgebra::Vector3;

    fn drone() -> SimDrone {
        SimDrone {
            uid: "d1".to_string(),
            region: "r".to_string(),
            latitude: 0.0,
            longitude: 0.0,
            altitude: 0.0,
            velocity: Vector3::zeros(),
        }
    }

    #[test]
    fn test_drone_position_from_sim_drone() {
        let position = DronePosition::from(&drone());
        assert_eq!(position.uid, "d1");
        assert_relative_eq!(position.x, EQUATORIAL_RADIUS_M, epsilon = 1e-6);
        assert_eq!(position.z, 0.0);
    }

    #[test]
    fn test_export_tracks_duration_and_alerts() {
        let mut export = SimExport::new("near_miss", 42);
        export.add_frame(SimFrame {
            time_sec: 0.5,
            drones: vec![DronePosition::from(&drone())],
            alerts: vec![],
            events: vec![],
        });
        export.add_frame(SimFrame {
            time_sec: 1.0,
            drones: vec![],
            alerts: vec![AlertFrame {
                uid0: "a".into(),
                uid1: "b".into(),
                dr: 12.0,
            }],
            events: vec![],
        });
        export.finalize(true, None, HandlerStats::default());

        assert_eq!(export.duration_sec, 1.0);
        assert_eq!(export.alert_count(), 1);

        let json = serde_json::to_value(&export).unwrap();
        assert_eq!(json["scenario"], "near_miss");
        assert!(json["frames"][0].get("alerts").is_none());
        assert_eq!(json["frames"][1]["alerts"][0]["dr"], 12.0);
    }

    #[test]
    fn test_write_to_file() {
        let path = std::env::temp_dir().join(format!("dronewatch-export-{}.json", uuid::Uuid::new_v4()));
        let export = SimExport::new("antipodal", 7);
        export.write_to_file(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: SimExport = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.seed, 7);
        std::fs::remove_file(&path).unwrap();
    }
}
