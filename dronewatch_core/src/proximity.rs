//! Proximity evaluation: annotates each pair with an alert flag.

use serde::{Deserialize, Serialize};

use crate::distance::DistanceRecord;

/// Default alert threshold in meters
pub const DEFAULT_THRESHOLD_M: f64 = 100.0;

/// A distance record plus whether it breaches the threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluated {
    pub record: DistanceRecord,
    pub is_alert: bool,
}

/// Flags pairs closer than a fixed threshold.
///
/// The evaluator never filters: every record comes back out, annotated.
/// A NaN distance is never an alert.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProximityEvaluator {
    threshold_m: f64,
}

impl Default for ProximityEvaluator {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD_M)
    }
}

impl ProximityEvaluator {
    pub fn new(threshold_m: f64) -> Self {
        Self { threshold_m }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold_m
    }

    /// Strictly below the threshold. Equal is not an alert.
    pub fn is_alert(&self, dr: f64) -> bool {
        dr < self.threshold_m
    }

    pub fn annotate(&self, record: DistanceRecord) -> Evaluated {
        let is_alert = self.is_alert(record.dr);
        Evaluated { record, is_alert }
    }

    /// Annotates every record, preserving order.
    pub fn evaluate<I>(&self, records: I) -> Vec<Evaluated>
    where
        I: IntoIterator<Item = DistanceRecord>,
    {
        records.into_iter().map(|r| self.annotate(r)).collect()
    }
}

/// Convenience form of [`ProximityEvaluator::evaluate`].
pub fn evaluate(records: Vec<DistanceRecord>, threshold_m: f64) -> Vec<Evaluated> {
    ProximityEvaluator::new(threshold_m).evaluate(records)
}
