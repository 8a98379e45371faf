//! Record types exchanged with the DroneWatch collaborators.

use crate::error::EnvError;
use serde::{Deserialize, Deserializer, Serialize};

/// A geodetic position report as delivered by the inbound source.
///
/// Latitude and longitude are in degrees, altitude in meters above sea
/// level. `dronetime` is the capture time as stamped by the drone and is
/// treated as an opaque string (it only participates in row keys).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReport {
    pub uid: String,
    #[serde(deserialize_with = "string_or_number")]
    pub dronetime: String,
    pub region: String,
    pub altitude: f64,
    pub latitude: f64,
    pub longitude: f64,
}

impl RawReport {
    /// Decodes one JSON payload into a report.
    ///
    /// # Returns
    /// * `Err(EnvError::NotAReport)` - the payload never mentions `uid`
    /// * `Err(EnvError::MalformedReport)` - bad UTF-8, bad JSON, missing or
    ///   mistyped fields, empty `uid`, or non-finite numbers
    pub fn decode(payload: &[u8]) -> Result<Self, EnvError> {
        let text = std::str::from_utf8(payload).map_err(EnvError::malformed)?;
        if !text.contains("uid") {
            return Err(EnvError::NotAReport);
        }

        let report: RawReport = serde_json::from_str(text).map_err(EnvError::malformed)?;
        report.validate()?;
        Ok(report)
    }

    fn validate(&self) -> Result<(), EnvError> {
        if self.uid.is_empty() {
            return Err(EnvError::malformed("empty uid"));
        }
        for (field, value) in [
            ("altitude", self.altitude),
            ("latitude", self.latitude),
            ("longitude", self.longitude),
        ] {
            if !value.is_finite() {
                return Err(EnvError::malformed(format!("{} is not finite", field)));
            }
        }
        Ok(())
    }

    /// Row key shared by the raw and Cartesian tables: `uid + dronetime`.
    pub fn row_key(&self) -> String {
        format!("{}{}", self.uid, self.dronetime)
    }

    /// The raw-table projection of this report.
    pub fn to_raw_record(&self) -> RawRecord {
        RawRecord {
            uid: self.uid.clone(),
            dronetime: self.dronetime.clone(),
            altitude: self.altitude,
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// Producers stamp `dronetime` either as a formatted string or as a number.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "dronetime must be a string or number, got {}",
            other
        ))),
    }
}

/// Raw table row, keyed by `uid + dronetime`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub uid: String,
    pub dronetime: String,
    pub altitude: f64,
    pub latitude: f64,
    pub longitude: f64,
}

impl RawRecord {
    pub fn key(&self) -> String {
        format!("{}{}", self.uid, self.dronetime)
    }
}

/// Cartesian table row, keyed by `uid + dronetime`.
///
/// `carttime` is when the conversion ran, in the compact `DTFMT` layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartesianRecord {
    pub uid: String,
    pub dronetime: String,
    pub carttime: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub r: f64,
}

impl CartesianRecord {
    pub fn key(&self) -> String {
        format!("{}{}", self.uid, self.dronetime)
    }
}

/// Proximity table row, keyed by `uid0 + uid1 + datetime`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProximityRecord {
    pub uid0: String,
    pub uid1: String,
    pub datetime: String,
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
    pub dr: f64,
}

impl ProximityRecord {
    pub fn key(&self) -> String {
        format!("{}{}{}", self.uid0, self.uid1, self.datetime)
    }
}

/// One tuple per evaluated pair, handed to the downstream stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProximityTuple {
    pub datetime: String,
    pub uid0: String,
    pub uid1: String,
    pub proximity: f64,
}
