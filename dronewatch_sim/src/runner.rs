//! Scenario runner - drives a simulated fleet through a real ReportHandler.

use dronewatch_core::distance::pair_count;
use dronewatch_core::geodesy::EQUATORIAL_RADIUS_M;
use dronewatch_core::{HandlerStats, MemoryStore, ReportHandler, WatchConfig};
use dronewatch_env::{format_stamp, CollectingEmitter, RawReport, WatchContext};
use nalgebra::Vector3;
use serde::Serialize;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::context::SimContext;
use crate::exporter::{AlertFrame, DronePosition, SimEvent, SimExport, SimFrame};
use crate::oracle::FleetOracle;
use crate::scenarios::ScenarioId;

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Number of drones in the fleet at the end
    pub final_drone_count: usize,

    /// Failure message if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScenarioMetrics {
    /// Reports fed to the handler
    pub reports: u64,

    pub pairs_evaluated: u64,
    pub tuples_emitted: u64,
    pub alerts: u64,
    pub evictions: u64,
    pub pipeline_failures: u64,

    /// Largest window observed after any report
    pub max_window_len: usize,

    /// Tuples that referenced the drone evicted by the same report
    pub stale_pairs: u64,

    /// Reports whose tuple count differed from n(n-1)/2
    pub pair_count_mismatches: u64,

    /// Smallest separation the handler reported
    pub min_reported_separation_m: Option<f64>,

    /// Largest separation the handler reported
    pub max_reported_separation_m: Option<f64>,

    /// Smallest ground-truth separation over the run
    pub min_true_separation_m: Option<f64>,
}

impl ScenarioMetrics {
    fn observe_reported(&mut self, dr: f64) {
        self.min_reported_separation_m = Some(self.min_reported_separation_m.map_or(dr, |m| m.min(dr)));
        self.max_reported_separation_m = Some(self.max_reported_separation_m.map_or(dr, |m| m.max(dr)));
    }

    fn observe_true(&mut self, dr: Option<f64>) {
        if let Some(dr) = dr {
            self.min_true_separation_m = Some(self.min_true_separation_m.map_or(dr, |m| m.min(dr)));
        }
    }

    fn absorb(&mut self, stats: &HandlerStats) {
        self.pairs_evaluated = stats.pairs_evaluated;
        self.alerts = stats.alerts;
        self.evictions = stats.evictions;
        self.pipeline_failures = stats.pipeline_failures;
    }
}

type SimHandler = ReportHandler<SimContext, MemoryStore, CollectingEmitter>;

/// One scenario in flight: virtual clock, fleet, handler and bookkeeping.
struct Session {
    context: Arc<SimContext>,
    oracle: FleetOracle,
    handler: SimHandler,
    emitter: Arc<CollectingEmitter>,
    metrics: ScenarioMetrics,
    alert_pairs: Vec<(String, String)>,
    export: Option<SimExport>,
    pending_alerts: Vec<AlertFrame>,
    pending_events: Vec<SimEvent>,
}

impl Session {
    fn new(scenario: ScenarioId, seed: u64, config: &WatchConfig, export: bool) -> Result<Self, String> {
        let context = SimContext::shared(seed);
        let oracle = FleetOracle::new(context.physics_seed());
        let emitter = Arc::new(CollectingEmitter::new());
        let handler = ReportHandler::new(
            context.clone(),
            Arc::new(MemoryStore::new()),
            emitter.clone(),
            config,
        )
        .map_err(|e| e.to_string())?
        .with_label(scenario.name());

        Ok(Self {
            context,
            oracle,
            handler,
            emitter,
            metrics: ScenarioMetrics::default(),
            alert_pairs: Vec::new(),
            export: export.then(|| SimExport::new(scenario.name(), seed)),
            pending_alerts: Vec::new(),
            pending_events: Vec::new(),
        })
    }

    /// Advances the world by `dt` and feeds one report per drone.
    fn tick(&mut self, dt: f64) {
        self.oracle.step(dt);
        self.context.advance_time(Duration::from_secs_f64(dt));

        let dronetime = format_stamp(&self.context.utc_now());
        for report in self.oracle.generate_reports(&dronetime) {
            self.ingest(&report);
        }
        self.metrics.observe_true(self.oracle.min_separation());
    }

    fn ingest(&mut self, report: &RawReport) {
        self.metrics.reports += 1;

        let outcome = match self.handler.handle(report) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Simulated report aborted");
                self.pending_events.push(SimEvent {
                    message: e.to_string(),
                    level: Some("warn".to_string()),
                });
                return;
            }
        };

        let tuples = self.emitter.drain();
        self.metrics.tuples_emitted += tuples.len() as u64;
        self.metrics.max_window_len = self.metrics.max_window_len.max(outcome.window_len);

        if tuples.len() != pair_count(outcome.window_len) {
            self.metrics.pair_count_mismatches += 1;
        }

        if let Some(evicted) = &outcome.evicted {
            let evicted: &str = evicted;
            if tuples.iter().any(|t| t.uid0 == evicted || t.uid1 == evicted) {
                self.metrics.stale_pairs += 1;
            }
            self.pending_events.push(SimEvent {
                message: format!("{} evicted by {}", evicted, outcome.uid),
                level: None,
            });
        }

        for tuple in &tuples {
            self.metrics.observe_reported(tuple.proximity);
        }

        for alert in &outcome.alerts {
            self.pending_alerts.push(AlertFrame::from(alert));
            self.alert_pairs
                .push((alert.id_i.to_string(), alert.id_j.to_string()));
        }
    }

    /// Records the current state as an export frame, if exporting.
    fn frame(&mut self) {
        let Some(export) = self.export.as_mut() else {
            self.pending_alerts.clear();
            self.pending_events.clear();
            return;
        };

        export.add_frame(SimFrame {
            time_sec: self.oracle.time(),
            drones: self.oracle.drones().iter().map(DronePosition::from).collect(),
            alerts: std::mem::take(&mut self.pending_alerts),
            events: std::mem::take(&mut self.pending_events),
        });
    }

    fn finish(
        mut self,
        scenario: ScenarioId,
        seed: u64,
        total_ticks: u64,
        failure_reason: Option<String>,
    ) -> (ScenarioResult, Option<SimExport>) {
        let stats = self.handler.stats().clone();
        self.metrics.absorb(&stats);

        let passed = failure_reason.is_none();
        if let Some(export) = self.export.as_mut() {
            export.finalize(passed, failure_reason.clone(), stats);
        }

        let result = ScenarioResult {
            scenario,
            seed,
            passed,
            total_ticks,
            final_time_secs: self.oracle.time(),
            final_drone_count: self.oracle.drones().len(),
            failure_reason,
            metrics: self.metrics,
        };
        (result, self.export)
    }
}

/// Runs fleet scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Tick rate in Hz (every drone reports once per tick)
    tick_rate_hz: u32,

    /// Overrides each scenario's default duration
    max_duration_secs: Option<f64>,

    /// Ticks between export frames
    export_interval: u64,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            tick_rate_hz: 2,
            max_duration_secs: None,
            export_interval: 2,
        }
    }

    /// Sets the tick rate.
    pub fn with_tick_rate(mut self, hz: u32) -> Self {
        self.tick_rate_hz = hz.max(1);
        self
    }

    /// Sets the maximum duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = Some(secs);
        self
    }

    /// Sets the number of ticks between export frames.
    pub fn with_export_interval(mut self, ticks: u64) -> Self {
        self.export_interval = ticks.max(1);
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.execute(scenario, false).0
    }

    /// Runs a scenario and also returns its frame-by-frame export.
    pub fn run_with_export(&self, scenario: ScenarioId) -> (ScenarioResult, SimExport) {
        let (result, export) = self.execute(scenario, true);
        let export = export.unwrap_or_else(|| SimExport::new(scenario.name(), self.seed));
        (result, export)
    }

    fn execute(&self, scenario: ScenarioId, export: bool) -> (ScenarioResult, Option<SimExport>) {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);
        debug!("  {}", scenario.description());

        match scenario {
            ScenarioId::NearMiss => self.run_near_miss(export),
            ScenarioId::Crowd => self.run_crowd(export),
            ScenarioId::Antipodal => self.run_antipodal(export),
            ScenarioId::Dispersed => self.run_dispersed(export),
        }
    }

    fn dt(&self) -> f64 {
        1.0 / self.tick_rate_hz as f64
    }

    fn target_ticks(&self, scenario: ScenarioId) -> u64 {
        let duration = self
            .max_duration_secs
            .unwrap_or_else(|| scenario.default_duration_secs());
        (duration * self.tick_rate_hz as f64).round().max(1.0) as u64
    }

    fn setup_failure(&self, scenario: ScenarioId, reason: impl Display) -> (ScenarioResult, Option<SimExport>) {
        warn!("{} setup failed: {}", scenario.name(), reason);
        let result = ScenarioResult {
            scenario,
            seed: self.seed,
            passed: false,
            total_ticks: 0,
            final_time_secs: 0.0,
            final_drone_count: 0,
            failure_reason: Some(format!("Setup failed: {}", reason)),
            metrics: ScenarioMetrics::default(),
        };
        (result, None)
    }

    fn drive(&self, session: &mut Session, target_ticks: u64) {
        let dt = self.dt();
        for tick in 0..target_ticks {
            session.tick(dt);

            if tick % self.export_interval == 0 || tick + 1 == target_ticks {
                session.frame();
            }

            if tick % self.tick_rate_hz as u64 == 0 {
                debug!(
                    "  t={:.1}s | window={} | pairs={} | alerts={}",
                    session.oracle.time(),
                    session.handler.window().len(),
                    session.handler.stats().pairs_evaluated,
                    session.handler.stats().alerts
                );
            }
        }
    }

    /// Two drones converge head-on along a parallel with a 5 m vertical
    /// offset. Closest approach is at t=20s.
    fn run_near_miss(&self, export: bool) -> (ScenarioResult, Option<SimExport>) {
        let scenario = ScenarioId::NearMiss;
        let config = WatchConfig::default();
        let mut session = match Session::new(scenario, self.seed, &config, export) {
            Ok(session) => session,
            Err(e) => return self.setup_failure(scenario, e),
        };

        let origin = (37.0, -122.0);
        let west = session.oracle.spawn_offset(
            origin,
            Vector3::new(-400.0, 0.0, 120.0),
            Vector3::new(20.0, 0.0, 0.0),
            "bay",
        );
        let east = session.oracle.spawn_offset(
            origin,
            Vector3::new(400.0, 0.0, 125.0),
            Vector3::new(-20.0, 0.0, 0.0),
            "bay",
        );

        let target_ticks = self.target_ticks(scenario);
        self.drive(&mut session, target_ticks);

        let metrics = &session.metrics;
        let threshold = config.proximity_threshold_m;
        let involves_both = |pair: &(String, String)| {
            (pair.0 == west && pair.1 == east) || (pair.0 == east && pair.1 == west)
        };

        let failure = if session.alert_pairs.is_empty() {
            Some(format!(
                "No alert raised; closest true approach {:.1}m",
                metrics.min_true_separation_m.unwrap_or(f64::INFINITY)
            ))
        } else if !session.alert_pairs.iter().all(involves_both) {
            Some("Alert raised for an unexpected pair".to_string())
        } else if metrics.min_true_separation_m.map_or(true, |d| d >= threshold) {
            Some("Alert raised but drones never came within threshold".to_string())
        } else if metrics.pair_count_mismatches > 0 {
            Some(format!(
                "{} reports emitted the wrong number of pairs",
                metrics.pair_count_mismatches
            ))
        } else {
            None
        };

        info!(
            "✓ NearMiss complete: {} alerts, closest true approach {:.1}m",
            session.alert_pairs.len(),
            metrics.min_true_separation_m.unwrap_or(f64::NAN)
        );

        session.finish(scenario, self.seed, target_ticks, failure)
    }

    /// Twelve stationary drones report round-robin through a 5-slot window,
    /// so every report after warm-up evicts.
    fn run_crowd(&self, export: bool) -> (ScenarioResult, Option<SimExport>) {
        let scenario = ScenarioId::Crowd;
        let capacity = 5;
        let config = WatchConfig {
            window_capacity: capacity,
            ..WatchConfig::default()
        };
        let mut session = match Session::new(scenario, self.seed, &config, export) {
            Ok(session) => session,
            Err(e) => return self.setup_failure(scenario, e),
        };

        let origin = (51.5, -0.1);
        for row in 0..3 {
            for col in 0..4 {
                session.oracle.spawn_offset(
                    origin,
                    Vector3::new(col as f64 * 1000.0, row as f64 * 1000.0, 90.0),
                    Vector3::zeros(),
                    "london",
                );
            }
        }

        let target_ticks = self.target_ticks(scenario);
        self.drive(&mut session, target_ticks);

        let evictions = session.handler.stats().evictions;
        let metrics = &session.metrics;
        let failure = if evictions == 0 {
            Some("No evictions despite fleet exceeding capacity".to_string())
        } else if metrics.stale_pairs > 0 {
            Some(format!("{} reports paired an evicted drone", metrics.stale_pairs))
        } else if metrics.max_window_len > capacity {
            Some(format!(
                "Window grew to {} (capacity {})",
                metrics.max_window_len, capacity
            ))
        } else if metrics.pair_count_mismatches > 0 {
            Some(format!(
                "{} reports emitted the wrong number of pairs",
                metrics.pair_count_mismatches
            ))
        } else {
            None
        };

        info!(
            "✓ Crowd complete: {} reports, {} evictions, max window {}",
            metrics.reports, evictions, metrics.max_window_len
        );

        session.finish(scenario, self.seed, target_ticks, failure)
    }

    /// Two noiseless drones on opposite sides of the equator.
    fn run_antipodal(&self, export: bool) -> (ScenarioResult, Option<SimExport>) {
        let scenario = ScenarioId::Antipodal;
        let config = WatchConfig::default();
        let mut session = match Session::new(scenario, self.seed, &config, export) {
            Ok(session) => session,
            Err(e) => return self.setup_failure(scenario, e),
        };
        if let Err(e) = session.oracle.set_position_noise(0.0) {
            return self.setup_failure(scenario, e);
        }

        session.oracle.spawn_drone(0.0, 0.0, 0.0, Vector3::zeros(), "atlantic");
        session.oracle.spawn_drone(0.0, 180.0, 0.0, Vector3::zeros(), "pacific");

        let target_ticks = self.target_ticks(scenario);
        self.drive(&mut session, target_ticks);

        let expected = 2.0 * EQUATORIAL_RADIUS_M;
        let metrics = &session.metrics;
        let within = |d: Option<f64>| d.map_or(false, |d| (d - expected).abs() < 1e-3);

        let failure = if metrics.tuples_emitted == 0 {
            Some("No pairs evaluated".to_string())
        } else if !within(metrics.min_reported_separation_m) || !within(metrics.max_reported_separation_m) {
            Some(format!(
                "Separation {:?}..{:?} differs from {:.3}m",
                metrics.min_reported_separation_m, metrics.max_reported_separation_m, expected
            ))
        } else if !session.alert_pairs.is_empty() {
            Some("Alert raised for antipodal drones".to_string())
        } else {
            None
        };

        info!(
            "✓ Antipodal complete: separation {:.3}m",
            metrics.max_reported_separation_m.unwrap_or(f64::NAN)
        );

        session.finish(scenario, self.seed, target_ticks, failure)
    }

    /// Twenty drones on a 2 km grid drifting at up to 5 m/s.
    fn run_dispersed(&self, export: bool) -> (ScenarioResult, Option<SimExport>) {
        let scenario = ScenarioId::Dispersed;
        let config = WatchConfig::default();
        let mut session = match Session::new(scenario, self.seed, &config, export) {
            Ok(session) => session,
            Err(e) => return self.setup_failure(scenario, e),
        };

        let origin = (-33.9, 151.2);
        for row in 0..4 {
            for col in 0..5 {
                let velocity = session.oracle.random_velocity(5.0);
                session.oracle.spawn_offset(
                    origin,
                    Vector3::new(col as f64 * 2000.0, row as f64 * 2000.0, 100.0),
                    velocity,
                    "sydney",
                );
            }
        }

        let target_ticks = self.target_ticks(scenario);
        self.drive(&mut session, target_ticks);

        let metrics = &session.metrics;
        let failure = if !session.alert_pairs.is_empty() {
            Some(format!(
                "{} alerts raised; closest reported {:.1}m",
                session.alert_pairs.len(),
                metrics.min_reported_separation_m.unwrap_or(f64::NAN)
            ))
        } else if metrics.pair_count_mismatches > 0 {
            Some(format!(
                "{} reports emitted the wrong number of pairs",
                metrics.pair_count_mismatches
            ))
        } else {
            None
        };

        info!(
            "✓ Dispersed complete: {} pairs, closest reported {:.1}m",
            metrics.tuples_emitted,
            metrics.min_reported_separation_m.unwrap_or(f64::NAN)
        );

        session.finish(scenario, self.seed, target_ticks, failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_near_miss_scenario() {
        let result = ScenarioRunner::new(42).run(ScenarioId::NearMiss);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.alerts > 0);
        assert!(result.metrics.min_true_separation_m.unwrap() < 10.0);
        assert_eq!(result.final_drone_count, 2);
    }

    #[test]
    fn test_near_miss_too_short_fails() {
        let result = ScenarioRunner::new(42)
            .with_duration(5.0)
            .run(ScenarioId::NearMiss);

        assert!(!result.passed);
        assert_eq!(result.metrics.alerts, 0);
        assert!(result.failure_reason.unwrap().contains("No alert"));
    }

    #[test]
    fn test_crowd_scenario() {
        let result = ScenarioRunner::new(42).run(ScenarioId::Crowd);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.evictions > 0);
        assert_eq!(result.metrics.stale_pairs, 0);
        assert_eq!(result.metrics.max_window_len, 5);
        // every report after the first five evicts someone
        assert_eq!(result.metrics.evictions, result.metrics.reports - 5);
    }

    #[test]
    fn test_antipodal_scenario() {
        let result = ScenarioRunner::new(42).run(ScenarioId::Antipodal);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.alerts, 0);
        let dr = result.metrics.max_reported_separation_m.unwrap();
        assert!((dr - 2.0 * EQUATORIAL_RADIUS_M).abs() < 1e-3);
    }

    #[test]
    fn test_dispersed_scenario() {
        let result = ScenarioRunner::new(42).run(ScenarioId::Dispersed);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.alerts, 0);
        assert!(result.metrics.min_reported_separation_m.unwrap() > 1000.0);
        assert_eq!(result.final_drone_count, 20);
    }

    #[test]
    fn test_same_seed_same_metrics() {
        let a = ScenarioRunner::new(7).with_duration(3.0).run(ScenarioId::Dispersed);
        let b = ScenarioRunner::new(7).with_duration(3.0).run(ScenarioId::Dispersed);

        assert_eq!(a.metrics, b.metrics);
        assert_eq!(a.total_ticks, 6);
    }

    #[test]
    fn test_export_captures_alerts() {
        let (result, export) = ScenarioRunner::new(42).run_with_export(ScenarioId::NearMiss);

        assert!(result.passed);
        assert!(export.passed);
        assert_eq!(export.scenario, "near_miss");
        assert!(!export.frames.is_empty());
        assert_eq!(export.alert_count() as u64, result.metrics.alerts);
        assert_eq!(export.stats.as_ref().unwrap().alerts, result.metrics.alerts);
        assert_eq!(export.duration_sec, result.final_time_secs);
    }
}
