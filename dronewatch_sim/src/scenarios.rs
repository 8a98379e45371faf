//! Fleet simulation scenarios.

use serde::{Deserialize, Serialize};

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    /// Two drones converge head-on; an alert must fire for that pair
    NearMiss,

    /// More drones than window capacity; evicted drones must never be paired
    Crowd,

    /// Two drones on opposite sides of the equator
    Antipodal,

    /// Fleet spread kilometres apart; no alert may fire
    Dispersed,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::NearMiss,
            ScenarioId::Crowd,
            ScenarioId::Antipodal,
            ScenarioId::Dispersed,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::NearMiss => "near_miss",
            ScenarioId::Crowd => "crowd",
            ScenarioId::Antipodal => "antipodal",
            ScenarioId::Dispersed => "dispersed",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::NearMiss => "2 drones 800m apart closing at 40m/s with 5m vertical offset",
            ScenarioId::Crowd => "12 drones through a 5-slot window, verify eviction ordering",
            ScenarioId::Antipodal => "2 drones at lon 0 and lon 180 on the equator, no noise",
            ScenarioId::Dispersed => "20 drones on a 2km grid drifting slowly, verify zero alerts",
        }
    }

    /// Simulated seconds a scenario needs to reach its interesting state.
    pub fn default_duration_secs(&self) -> f64 {
        match self {
            ScenarioId::NearMiss => 30.0,
            ScenarioId::Crowd => 5.0,
            ScenarioId::Antipodal => 3.0,
            ScenarioId::Dispersed => 30.0,
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "near_miss" | "nearmiss" | "near-miss" => Ok(ScenarioId::NearMiss),
            "crowd" => Ok(ScenarioId::Crowd),
            "antipodal" => Ok(ScenarioId::Antipodal),
            "dispersed" => Ok(ScenarioId::Dispersed),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
