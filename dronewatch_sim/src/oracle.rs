//! Ground truth oracle for fleet simulation.
//!
//! The oracle owns the true state of every simulated drone:
//! - Geodetic position (degrees, meters) and local velocity (east/north/up)
//! - Constant-velocity kinematics over the spheroid
//! - Report generation with Gaussian GPS noise

use dronewatch_core::geodesy::{self, GeocentricPoint};
use dronewatch_env::RawReport;
use nalgebra::Vector3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal, NormalError};
use serde::{Deserialize, Serialize};

/// Default GPS noise standard deviation (meters)
pub const DEFAULT_POSITION_NOISE_M: f64 = 0.5;

/// A ground truth drone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimDrone {
    pub uid: String,

    /// Geographic region label carried on every report
    pub region: String,

    /// Degrees
    pub latitude: f64,

    /// Degrees, wrapped to [-180, 180)
    pub longitude: f64,

    /// Meters above sea level
    pub altitude: f64,

    /// Velocity [east, north, up] in m/s
    pub velocity: Vector3<f64>,
}

impl SimDrone {
    /// True Earth-centred position.
    pub fn position(&self) -> GeocentricPoint {
        geodesy::to_cartesian(
            self.altitude,
            self.latitude.to_radians(),
            self.longitude.to_radians(),
        )
    }

    /// Distance from the centre used to turn meters into angles.
    fn local_radius(&self) -> f64 {
        geodesy::sea_level_radius(self.latitude.to_radians()) + self.altitude
    }
}

/// The oracle - maintains ground truth and generates position reports.
pub struct FleetOracle {
    physics_seed: u64,

    /// RNG for identifiers, noise and random placement
    rng: ChaCha8Rng,

    drones: Vec<SimDrone>,

    /// Current simulation time (seconds)
    current_time: f64,

    /// `None` disables noise entirely
    noise: Option<Normal<f64>>,
}

impl FleetOracle {
    /// Creates a new oracle with the given physics seed.
    pub fn new(physics_seed: u64) -> Self {
        Self {
            physics_seed,
            rng: ChaCha8Rng::seed_from_u64(physics_seed),
            drones: Vec::new(),
            current_time: 0.0,
            noise: Normal::new(0.0, DEFAULT_POSITION_NOISE_M).ok(),
        }
    }

    pub fn seed(&self) -> u64 {
        self.physics_seed
    }

    /// Sets the GPS noise standard deviation in meters. Zero disables noise.
    ///
    /// Negative or non-finite values are rejected with `BadVariance`.
    pub fn set_position_noise(&mut self, std_dev: f64) -> Result<(), NormalError> {
        if std_dev < 0.0 || !std_dev.is_finite() {
            return Err(NormalError::BadVariance);
        }
        self.noise = if std_dev == 0.0 {
            None
        } else {
            Some(Normal::new(0.0, std_dev)?)
        };
        Ok(())
    }

    /// Spawns a drone and returns its identifier.
    pub fn spawn_drone(
        &mut self,
        latitude: f64,
        longitude: f64,
        altitude: f64,
        velocity: Vector3<f64>,
        region: &str,
    ) -> String {
        let uid = uuid::Builder::from_random_bytes(self.rng.gen())
            .into_uuid()
            .to_string();

        self.drones.push(SimDrone {
            uid: uid.clone(),
            region: region.to_string(),
            latitude,
            longitude: wrap_longitude(longitude),
            altitude,
            velocity,
        });

        uid
    }

    /// Spawns a drone at `(east, north)` meters from an origin, with `up` meters of altitude.
    pub fn spawn_offset(
        &mut self,
        origin: (f64, f64),
        east_north_up: Vector3<f64>,
        velocity: Vector3<f64>,
        region: &str,
    ) -> String {
        let (latitude, longitude) = offset_degrees(origin.0, origin.1, east_north_up.x, east_north_up.y);
        self.spawn_drone(latitude, longitude, east_north_up.z, velocity, region)
    }

    /// Uniform random velocity with each horizontal component in `[-max, max]` m/s.
    pub fn random_velocity(&mut self, max_speed: f64) -> Vector3<f64> {
        if max_speed <= 0.0 {
            return Vector3::zeros();
        }
        Vector3::new(
            self.rng.gen_range(-max_speed..=max_speed),
            self.rng.gen_range(-max_speed..=max_speed),
            0.0,
        )
    }

    /// Advances kinematics by dt seconds.
    pub fn step(&mut self, dt: f64) {
        self.current_time += dt;

        for drone in &mut self.drones {
            let r = drone.local_radius();
            let north = drone.velocity.y * dt;
            let east = drone.velocity.x * dt;

            drone.latitude += (north / r).to_degrees();
            let cos_lat = drone.latitude.to_radians().cos();
            if cos_lat.abs() > 1e-9 {
                drone.longitude = wrap_longitude(drone.longitude + (east / (r * cos_lat)).to_degrees());
            }
            drone.altitude += drone.velocity.z * dt;
        }
    }

    /// Returns the current simulation time.
    pub fn time(&self) -> f64 {
        self.current_time
    }

    pub fn drones(&self) -> &[SimDrone] {
        &self.drones
    }

    pub fn drone(&self, uid: &str) -> Option<&SimDrone> {
        self.drones.iter().find(|d| d.uid == uid)
    }

    /// True straight-line separation between two drones.
    pub fn true_distance(&self, a: &str, b: &str) -> Option<f64> {
        let a = self.drone(a)?.position();
        let b = self.drone(b)?.position();
        Some((a.xyz - b.xyz).norm())
    }

    /// Smallest true separation over every pair in the fleet.
    pub fn min_separation(&self) -> Option<f64> {
        let points: Vec<GeocentricPoint> = self.drones.iter().map(SimDrone::position).collect();
        let mut best: Option<f64> = None;
        for i in 0..points.len() {
            for j in (i + 1)..points.len() {
                let d = (points[i].xyz - points[j].xyz).norm();
                best = Some(best.map_or(d, |b: f64| b.min(d)));
            }
        }
        best
    }

    /// Generates one noisy report for a drone.
    pub fn generate_report(&mut self, index: usize, dronetime: &str) -> Option<RawReport> {
        let drone = self.drones.get(index)?;
        let (mut latitude, mut longitude, mut altitude) =
            (drone.latitude, drone.longitude, drone.altitude);

        if let Some(normal) = self.noise.as_ref() {
            let east = normal.sample(&mut self.rng);
            let north = normal.sample(&mut self.rng);
            let up = normal.sample(&mut self.rng);
            (latitude, longitude) = offset_degrees(latitude, longitude, east, north);
            altitude += up;
        }

        Some(RawReport {
            uid: drone.uid.clone(),
            dronetime: dronetime.to_string(),
            region: drone.region.clone(),
            altitude,
            latitude,
            longitude,
        })
    }

    /// Generates reports for every drone, in spawn order.
    pub fn generate_reports(&mut self, dronetime: &str) -> Vec<RawReport> {
        (0..self.drones.len())
            .filter_map(|i| self.generate_report(i, dronetime))
            .collect()
    }
}

/// Moves a geodetic point by `east`/`north` meters along the surface.
pub fn offset_degrees(latitude: f64, longitude: f64, east: f64, north: f64) -> (f64, f64) {
    let r = geodesy::sea_level_radius(latitude.to_radians());
    let lat = latitude + (north / r).to_degrees();
    let cos_lat = lat.to_radians().cos();
    let lon = if cos_lat.abs() > 1e-9 {
        longitude + (east / (r * cos_lat)).to_degrees()
    } else {
        longitude
    };
    (lat, wrap_longitude(lon))
}

fn wrap_longitude(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_spawn_drone() {
        let mut oracle = FleetOracle::new(42);
        let uid = oracle.spawn_drone(37.0, -122.0, 120.0, Vector3::zeros(), "bay");

        let drone = oracle.drone(&uid).unwrap();
        assert_eq!(drone.latitude, 37.0);
        assert_eq!(drone.region, "bay");
        assert_eq!(uid.len(), 36);
    }

    #[test]
    fn test_step_moves_north() {
        let mut oracle = FleetOracle::new(42);
        let uid = oracle.spawn_drone(0.0, 0.0, 0.0, Vector3::new(0.0, 20.0, 1.0), "eq");
        let start = oracle.drone(&uid).unwrap().position();

        oracle.step(1.0);

        let drone = oracle.drone(&uid).unwrap();
        assert!(drone.latitude > 0.0);
        assert_relative_eq!(drone.altitude, 1.0);
        let moved = (drone.position().xyz - start.xyz).norm();
        assert_relative_eq!(moved, (20.0f64.powi(2) + 1.0).sqrt(), epsilon = 0.01);
        assert_relative_eq!(oracle.time(), 1.0);
    }

    #[test]
    fn test_offset_spawn_distance() {
        let mut oracle = FleetOracle::new(7);
        let origin = (45.0, 10.0);
        let a = oracle.spawn_offset(origin, Vector3::new(0.0, 0.0, 100.0), Vector3::zeros(), "r");
        let b = oracle.spawn_offset(origin, Vector3::new(300.0, 400.0, 100.0), Vector3::zeros(), "r");

        assert_relative_eq!(oracle.true_distance(&a, &b).unwrap(), 500.0, epsilon = 1.0);
        assert_relative_eq!(oracle.min_separation().unwrap(), 500.0, epsilon = 1.0);
    }

    #[test]
    fn test_zero_noise_reports_truth() {
        let mut oracle = FleetOracle::new(42);
        oracle.set_position_noise(0.0).unwrap();
        oracle.spawn_drone(12.5, 99.0, 300.0, Vector3::zeros(), "r");

        let reports = oracle.generate_reports("20240101000000000000");
        assert_eq!(reports.len(), 1);
        assert_eq!(
            (reports[0].latitude, reports[0].longitude, reports[0].altitude),
            (12.5, 99.0, 300.0)
        );
        assert_eq!(reports[0].dronetime, "20240101000000000000");
    }

    #[test]
    fn test_invalid_noise_rejected() {
        let mut oracle = FleetOracle::new(42);
        assert!(matches!(oracle.set_position_noise(-1.0), Err(NormalError::BadVariance)));
        assert!(oracle.set_position_noise(f64::NAN).is_err());
        assert!(oracle.set_position_noise(f64::INFINITY).is_err());

        // the previous setting survives a rejected update
        oracle.set_position_noise(0.0).unwrap();
        assert!(oracle.set_position_noise(-0.5).is_err());
        oracle.spawn_drone(1.0, 2.0, 3.0, Vector3::zeros(), "r");
        let reports = oracle.generate_reports("t");
        assert_eq!((reports[0].latitude, reports[0].longitude), (1.0, 2.0));
    }

    #[test]
    fn test_longitude_wraps() {
        assert_relative_eq!(wrap_longitude(190.0), -170.0);
        assert_relative_eq!(wrap_longitude(-181.0), 179.0);
        assert_relative_eq!(wrap_longitude(180.0), -180.0);
    }

    proptest! {
        #[test]
        fn prop_same_seed_same_reports(seed in any::<u64>()) {
            let mut a = FleetOracle::new(seed);
            let mut b = FleetOracle::new(seed);
            for oracle in [&mut a, &mut b] {
                oracle.spawn_drone(10.0, 20.0, 50.0, Vector3::new(3.0, -2.0, 0.0), "r");
                oracle.spawn_drone(10.1, 20.1, 60.0, Vector3::zeros(), "r");
                oracle.step(0.5);
            }

            let ra = a.generate_reports("t");
            let rb = b.generate_reports("t");
            prop_assert_eq!(ra, rb);
        }
    }
}
