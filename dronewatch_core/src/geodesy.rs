//! Geodetic to Earth-centered Cartesian conversion
//!
//! The Earth is modelled as an oblate spheroid: the distance from the
//! center to sea level shrinks from the equatorial radius at the equator
//! to the polar radius at the poles. Altitude is added on top of that
//! local sea-level radius and the result is projected onto x/y/z axes with
//! the origin at the Earth's center.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Equatorial radius in meters
pub const EQUATORIAL_RADIUS_M: f64 = 6378137.0;

/// Polar radius in meters
pub const POLAR_RADIUS_M: f64 = 6356752.3;

/// An Earth-centered point together with its distance from the center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeocentricPoint {
    /// [x, y, z] in meters
    pub xyz: Vector3<f64>,

    /// Distance from the Earth's center (sea-level radius + altitude)
    pub r: f64,
}

impl GeocentricPoint {
    pub fn x(&self) -> f64 {
        self.xyz.x
    }

    pub fn y(&self) -> f64 {
        self.xyz.y
    }

    pub fn z(&self) -> f64 {
        self.xyz.z
    }

    /// True when every component is a finite number.
    pub fn is_finite(&self) -> bool {
        self.r.is_finite() && self.xyz.iter().all(|c| c.is_finite())
    }
}

/// Distance from the Earth's center to sea level at `latitude` (radians).
///
/// Polar form of the meridian ellipse:
/// ```text
/// r(φ) = Re·Rp / sqrt((Rp·cos φ)² + (Re·sin φ)²)
/// ```
/// giving `Re` at the equator and `Rp` at either pole.
pub fn sea_level_radius(latitude: f64) -> f64 {
    let (sin_lat, cos_lat) = latitude.sin_cos();
    let k = (EQUATORIAL_RADIUS_M * POLAR_RADIUS_M).powi(2);
    let denom = (POLAR_RADIUS_M * cos_lat).powi(2) + (EQUATORIAL_RADIUS_M * sin_lat).powi(2);
    (k / denom).sqrt()
}

/// Converts altitude (meters) and latitude/longitude (radians) to an
/// Earth-centered Cartesian point.
///
/// Negative altitudes are accepted. NaN or out-of-range inputs are not
/// rejected; they propagate into the result (see [`GeocentricPoint::is_finite`]).
pub fn to_cartesian(altitude: f64, latitude: f64, longitude: f64) -> GeocentricPoint {
    let r = altitude + sea_level_radius(latitude);
    let (sin_lat, cos_lat) = latitude.sin_cos();
    let (sin_lon, cos_lon) = longitude.sin_cos();

    GeocentricPoint {
        xyz: Vector3::new(r * cos_lat * cos_lon, r * cos_lat * sin_lon, r * sin_lat),
        r,
    }
}
