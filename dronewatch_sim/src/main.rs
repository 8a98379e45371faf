//! DroneWatch CLI
//!
//! Replay a JSON-lines report stream through the proximity pipeline, or run
//! deterministic fleet scenarios against it.

use clap::{Args, Parser, Subcommand};
use dronewatch_core::WatchConfig;
use dronewatch_sim::scenarios::ScenarioId;
use dronewatch_sim::{replay, ReplayOptions, ScenarioResult, ScenarioRunner};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// DroneWatch proximity detection
#[derive(Parser, Debug)]
#[command(name = "dronewatch")]
#[command(about = "Streaming proximity detection for drone position reports", long_about = None)]
struct Cli {
    /// Verbose output (ignored when RUST_LOG is set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay JSON-lines reports and write proximity tuples as JSON lines
    Replay(ReplayArgs),

    /// Run deterministic fleet scenarios
    Simulate(SimulateArgs),
}

/// Pipeline settings for replay; flags override the config file.
#[derive(Args, Debug)]
struct WatchArgs {
    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum drones tracked at once
    #[arg(long)]
    window_capacity: Option<usize>,

    /// Alert threshold in meters
    #[arg(long)]
    threshold: Option<f64>,

    /// Source poll timeout in seconds
    #[arg(long)]
    poll_timeout: Option<f64>,

    /// Store directory
    #[arg(long)]
    store: Option<PathBuf>,
}

impl WatchArgs {
    fn load(&self) -> Result<WatchConfig, dronewatch_core::ConfigError> {
        let mut config = match &self.config {
            Some(path) => WatchConfig::from_json_file(path)?,
            None => WatchConfig::default(),
        };

        if let Some(capacity) = self.window_capacity {
            config.window_capacity = capacity;
        }
        if let Some(threshold) = self.threshold {
            config.proximity_threshold_m = threshold;
        }
        if let Some(timeout) = self.poll_timeout {
            config.poll_timeout_secs = timeout;
        }
        if let Some(store) = &self.store {
            config.store.path = store.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(Args, Debug)]
struct ReplayArgs {
    #[command(flatten)]
    watch: WatchArgs,

    /// Report file, one JSON document per line ("-" or omitted = stdin)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Tuple output file (omitted = stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Field-grouped handler instances
    #[arg(short, long, default_value = "1")]
    workers: usize,
}

#[derive(Args, Debug)]
struct SimulateArgs {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (near_miss, crowd, antipodal, dispersed, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Simulation duration in seconds (default: per scenario)
    #[arg(short, long)]
    duration: Option<f64>,

    /// Reports per drone per simulated second
    #[arg(long, default_value = "2")]
    tick_rate: u32,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export simulation frames to a JSON file
    #[arg(long)]
    export: Option<PathBuf>,
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Replay(args) => run_replay(args).await,
        Command::Simulate(args) => run_simulate(args),
    }
}

async fn run_replay(args: ReplayArgs) -> ExitCode {
    let config = match args.watch.load() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("DroneWatch v{}", env!("CARGO_PKG_VERSION"));
    info!(
        capacity = config.window_capacity,
        threshold_m = config.proximity_threshold_m,
        "Session configured"
    );

    let options = ReplayOptions {
        input: args.input,
        output: args.output,
        workers: args.workers,
    };

    match replay(&config, &options).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_simulate(args: SimulateArgs) -> ExitCode {
    if !args.json {
        info!("DroneWatch fleet simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match args.scenario.parse() {
            Ok(scenario) => vec![scenario],
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!("Available scenarios: near_miss, crowd, antipodal, dispersed, all");
                return ExitCode::FAILURE;
            }
        }
    };

    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    let runner_for = |seed: u64| {
        let runner = ScenarioRunner::new(seed).with_tick_rate(args.tick_rate);
        match args.duration {
            Some(secs) => runner.with_duration(secs),
            None => runner,
        }
    };

    // --export runs exactly one scenario once
    if let Some(export_path) = &args.export {
        if scenarios.len() > 1 {
            eprintln!("Error: --export only supports a single scenario, not 'all'");
            return ExitCode::FAILURE;
        }

        let (result, export) = runner_for(base_seed).run_with_export(scenarios[0]);
        if let Err(e) = export.write_to_file(export_path) {
            error!("Failed to write export: {:?}", e);
            return ExitCode::FAILURE;
        }
        info!("Exported {} frames to {}", export.frames.len(), export_path.display());

        report_result(&result);
        return if result.passed {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        };
    }

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = runner_for(seed);

        for scenario in &scenarios {
            let result = runner.run(*scenario);
            if !args.json {
                report_result(&result);
            }
            all_results.push(result);
        }
    }

    let total = all_results.len();
    let failed: Vec<&ScenarioResult> = all_results.iter().filter(|r| !r.passed).collect();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed.len(),
            "failed": failed.len(),
            "results": all_results,
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Failed to encode summary: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed.is_empty() {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed.len(), total);
            for result in &failed {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    if failed.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn report_result(result: &ScenarioResult) {
    if result.passed {
        info!(
            "✓ {} (seed={}) PASSED | reports={} pairs={} alerts={} evictions={}",
            result.scenario.name(),
            result.seed,
            result.metrics.reports,
            result.metrics.pairs_evaluated,
            result.metrics.alerts,
            result.metrics.evictions
        );
    } else {
        error!(
            "✗ {} (seed={}) FAILED: {}",
            result.scenario.name(),
            result.seed,
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
    }
}
