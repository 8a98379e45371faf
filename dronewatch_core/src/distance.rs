//! Pairwise distance engine
//!
//! Enumerates every unordered pair of an ordered snapshot exactly once,
//! outer index `i` in `0..n-1`, inner index `j` in `i+1..n`:
//!
//! ```text
//!        j→  0    1    2    3
//!  i=0       ·   k=0  k=1  k=2
//!  i=1            ·   k=3  k=4
//!  i=2                 ·   k=5
//! ```
//!
//! The full upper triangle is recomputed from scratch on every report.

use chrono::{DateTime, Utc};
use dronewatch_env::{format_stamp, ProximityRecord, ProximityTuple};
use nalgebra::Vector3;
use std::sync::Arc;

use crate::window::Position;

/// Separation between two drones at one computation time.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceRecord {
    /// The drone earlier in window order
    pub id_i: Arc<str>,

    /// The drone later in window order
    pub id_j: Arc<str>,

    /// Per-axis deltas `p_i - p_j` in meters
    pub delta: Vector3<f64>,

    /// Euclidean distance in meters
    pub dr: f64,

    pub computed_at: DateTime<Utc>,
}

impl DistanceRecord {
    /// Computes the separation of `a` from `b`.
    pub fn between(a: &Position, b: &Position, computed_at: DateTime<Utc>) -> Self {
        let delta = a.point.xyz - b.point.xyz;
        Self {
            id_i: Arc::clone(&a.id),
            id_j: Arc::clone(&b.id),
            dr: delta.norm(),
            delta,
            computed_at,
        }
    }

    pub fn dx(&self) -> f64 {
        self.delta.x
    }

    pub fn dy(&self) -> f64 {
        self.delta.y
    }

    pub fn dz(&self) -> f64 {
        self.delta.z
    }

    /// Whether this pair involves `id`.
    pub fn involves(&self, id: &str) -> bool {
        &*self.id_i == id || &*self.id_j == id
    }

    /// Proximity-table row for this pair.
    pub fn to_proximity_record(&self) -> ProximityRecord {
        ProximityRecord {
            uid0: self.id_i.to_string(),
            uid1: self.id_j.to_string(),
            datetime: format_stamp(&self.computed_at),
            dx: self.delta.x,
            dy: self.delta.y,
            dz: self.delta.z,
            dr: self.dr,
        }
    }

    /// Downstream tuple for this pair.
    pub fn to_tuple(&self) -> ProximityTuple {
        ProximityTuple {
            datetime: format_stamp(&self.computed_at),
            uid0: self.id_i.to_string(),
            uid1: self.id_j.to_string(),
            proximity: self.dr,
        }
    }
}

/// Lazily yields the `n(n-1)/2` records of an ordered snapshot.
pub struct PairwiseIter<'a> {
    positions: &'a [&'a Position],
    i: usize,
    j: usize,
    remaining: usize,
    computed_at: DateTime<Utc>,
}

impl<'a> PairwiseIter<'a> {
    pub fn new(positions: &'a [&'a Position], computed_at: DateTime<Utc>) -> Self {
        Self {
            positions,
            i: 0,
            j: 1,
            remaining: pair_count(positions.len()),
            computed_at,
        }
    }
}

impl Iterator for PairwiseIter<'_> {
    type Item = DistanceRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let record = DistanceRecord::between(
            self.positions[self.i],
            self.positions[self.j],
            self.computed_at,
        );

        self.remaining -= 1;
        self.j += 1;
        if self.j == self.positions.len() {
            self.i += 1;
            self.j = self.i + 1;
        }

        Some(record)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for PairwiseIter<'_> {}

/// Number of unordered pairs among `n` drones.
pub fn pair_count(n: usize) -> usize {
    n * n.saturating_sub(1) / 2
}

/// Computes every pairwise record for an ordered snapshot.
///
/// Fewer than two positions yields an empty result.
pub fn compute_all(positions: &[&Position], computed_at: DateTime<Utc>) -> Vec<DistanceRecord> {
    PairwiseIter::new(positions, computed_at).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geodesy::{to_cartesian, GeocentricPoint};
    use approx::assert_relative_eq;

    fn at(id: &str, x: f64, y: f64, z: f64) -> Position {
        let point = GeocentricPoint {
            xyz: Vector3::new(x, y, z),
            r: (x * x + y * y + z * z).sqrt(),
        };
        Position::new(id, point, 0.0, 0.0, 0.0, "t")
    }

    fn line(n: usize) -> Vec<Position> {
        (0..n).map(|k| at(&format!("d{}", k), k as f64 * 10.0, 0.0, 0.0)).collect()
    }

    #[test]
    fn test_pair_counts() {
        for n in 0..12 {
            let positions = line(n);
            let refs: Vec<&Position> = positions.iter().collect();
            let records = compute_all(&refs, Utc::now());

            assert_eq!(records.len(), n * n.saturating_sub(1) / 2);
            assert_eq!(PairwiseIter::new(&refs, Utc::now()).len(), records.len());
        }
    }

    #[test]
    fn test_fewer_than_two_is_empty() {
        assert!(compute_all(&[], Utc::now()).is_empty());

        let single = at("solo", 1.0, 2.0, 3.0);
        assert!(compute_all(&[&single], Utc::now()).is_empty());
    }

    #[test]
    fn test_enumeration_order() {
        let positions = line(4);
        let refs: Vec<&Position> = positions.iter().collect();
        let order: Vec<(String, String)> = compute_all(&refs, Utc::now())
            .iter()
            .map(|r| (r.id_i.to_string(), r.id_j.to_string()))
            .collect();

        let expected: Vec<(String, String)> = [
            ("d0", "d1"),
            ("d0", "d2"),
            ("d0", "d3"),
            ("d1", "d2"),
            ("d1", "d3"),
            ("d2", "d3"),
        ]
        .iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect();

        assert_eq!(order, expected);
    }

    #[test]
    fn test_deltas_and_distance() {
        let a = at("a", 3.0, 4.0, 12.0);
        let b = at("b", 0.0, 0.0, 0.0);
        let record = DistanceRecord::between(&a, &b, Utc::now());

        assert_eq!((record.dx(), record.dy(), record.dz()), (3.0, 4.0, 12.0));
        assert_relative_eq!(record.dr, 13.0);
    }

    #[test]
    fn test_symmetric_and_non_negative() {
        let a = at("a", 1.5, -7.0, 2.0);
        let b = at("b", -4.0, 3.0, 9.5);
        let now = Utc::now();

        let ab = DistanceRecord::between(&a, &b, now);
        let ba = DistanceRecord::between(&b, &a, now);
        assert_eq!(ab.dr, ba.dr);
        assert!(ab.dr >= 0.0);
        assert_eq!(ab.delta, -ba.delta);
    }

    #[test]
    fn test_identical_positions_have_zero_distance() {
        let p = to_cartesian(120.0, 0.6, -2.1);
        let a = Position::new("a", p, 120.0, 0.6, -2.1, "t");
        let b = Position::new("b", p, 120.0, 0.6, -2.1, "t");

        let records = compute_all(&[&a, &b], Utc::now());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].dr, 0.0);
    }

    #[test]
    fn test_boundary_projections_share_timestamp() {
        let a = at("a", 0.0, 0.0, 0.0);
        let b = at("b", 0.0, 0.0, 50.0);
        let record = DistanceRecord::between(&a, &b, Utc::now());

        let row = record.to_proximity_record();
        let tuple = record.to_tuple();
        assert_eq!(row.datetime, tuple.datetime);
        assert_eq!(row.key(), format!("ab{}", row.datetime));
        assert_eq!(tuple.proximity, 50.0);
        assert_eq!(row.dz, -50.0);
        assert!(record.involves("a") && record.involves("b") && !record.involves("c"));
    }
}
