use std::path::PathBuf;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use evsim_config::EvsimConfig;
use evsim_core::{SchedulerKind, SimError, Simulator, SimulatorStats, TimeUnit, VirtualTime};
use evsim_telemetry::{EventLogger, MetricsRecorder};
use tracing::{error, info};

use crate::error::CliError;
use crate::scenarios::{self, PingPongParams, StressParams, Verify};
use crate::trace::TraceRecorder;

#[derive(Parser)]
#[command(version, about = "Run reference scenarios on the evsim discrete-event engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Exponentially timed events, one cancellation and a teardown callback
    Sample(SampleArgs),
    /// Nodes bounce a token, each hop executing in the receiver's context
    PingPong(PingPongArgs),
    /// Random insertions with a share of them cancelled
    Stress(StressArgs),
}

/// Options shared by every scenario.
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Configuration file; defaults to `config/evsim.yaml` plus `EVSIM_*` variables
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Event queue backend (heap, map, list)
    #[arg(long)]
    pub scheduler: Option<SchedulerKind>,
    /// Stop the run at this many simulated seconds
    #[arg(long)]
    pub stop_at: Option<f64>,
    /// Fail unless the trace digest equals this hex string
    #[arg(long)]
    pub expect_digest: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct SampleArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct PingPongArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    #[arg(long, default_value_t = 4)]
    pub nodes: u32,
    #[arg(long, default_value_t = 3)]
    pub rounds: u32,
    /// One-way hop delay in microseconds
    #[arg(long, default_value_t = 250)]
    pub delay_us: i64,
}

#[derive(Args, Debug, Clone)]
pub struct StressArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    #[arg(long, default_value_t = 100_000)]
    pub events: usize,
    /// Fraction of scheduled events cancelled before they fire
    #[arg(long, default_value_t = 0.25)]
    pub cancel_ratio: f64,
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Outcome of one scenario run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub scenario: &'static str,
    pub final_time: VirtualTime,
    pub stats: SimulatorStats,
    pub pending: usize,
    pub trace_entries: u64,
    pub digest: String,
}

pub fn run_command(cli: Cli) -> Result<(), CliError> {
    let (common, seed) = match &cli.command {
        Commands::Sample(args) => (&args.common, args.seed),
        Commands::PingPong(args) => (&args.common, None),
        Commands::Stress(args) => (&args.common, args.seed),
    };
    let config = resolve_config(common, seed)?;
    EventLogger::try_init(&config.telemetry.log_level)?;
    let metrics = if config.telemetry.metrics {
        Some(MetricsRecorder::new()?)
    } else {
        None
    };

    let report = match &cli.command {
        Commands::Sample(_) => execute("sample", &config, metrics.as_ref(), |sim, trace| {
            scenarios::sample(sim, trace, config.simulator.seed)
        })?,
        Commands::PingPong(args) => {
            let params = PingPongParams {
                nodes: args.nodes,
                rounds: args.rounds,
                delay_us: args.delay_us,
            };
            execute("ping-pong", &config, metrics.as_ref(), |sim, trace| {
                scenarios::ping_pong(sim, trace, params)
            })?
        }
        Commands::Stress(args) => {
            let params = StressParams {
                events: args.events,
                cancel_ratio: args.cancel_ratio,
                seed: config.simulator.seed,
            };
            execute("stress", &config, metrics.as_ref(), |sim, trace| {
                scenarios::stress(sim, trace, params)
            })?
        }
    };

    print_report(&report);
    if let Some(metrics) = &metrics {
        print!("{}", metrics.gather_metrics()?);
    }
    check_digest(&report, common.expect_digest.as_deref())
}

/// Configuration file (or the default layering), then command-line overrides, validated
/// again as a whole.
pub fn resolve_config(common: &CommonArgs, seed: Option<u64>) -> Result<EvsimConfig, CliError> {
    let mut config = match &common.config {
        Some(path) => EvsimConfig::load_from_path(path)?,
        None => EvsimConfig::load()?,
    };
    if let Some(kind) = common.scheduler {
        config.simulator.scheduler = kind;
    }
    if let Some(stop_at) = common.stop_at {
        config.simulator.stop_at = Some(stop_at);
    }
    if let Some(seed) = seed {
        config.simulator.seed = seed;
    }
    config.check()?;
    Ok(config)
}

/// Builds an engine from `config`, lets `setup` populate it, runs it, applies the
/// scenario's post-run check and tears it down.
pub fn execute<F>(
    scenario: &'static str,
    config: &EvsimConfig,
    metrics: Option<&MetricsRecorder>,
    setup: F,
) -> Result<RunReport, CliError>
where
    F: FnOnce(&Simulator, &TraceRecorder) -> Result<Verify, CliError>,
{
    let sim = Simulator::new(config.simulator.engine_options());
    let trace = TraceRecorder::new();
    let verify = setup(&sim, &trace)?;
    let stop = config
        .simulator
        .stop_time(sim.resolution())
        .map_err(SimError::from)?;
    if let Some(stop) = stop {
        sim.try_stop_at(stop)?;
    }

    info!(scenario, scheduler = %config.simulator.scheduler, "running scenario");
    let started = Instant::now();
    sim.run();
    let wall = started.elapsed().as_secs_f64();

    let final_time = sim.now();
    let stats = sim.stats();
    let pending = sim.pending();
    EventLogger::log_run_summary(scenario, final_time, &stats);
    if let Some(metrics) = metrics {
        let seconds = sim.resolution().to_f64(final_time, TimeUnit::S);
        metrics.record_run(&stats, pending, seconds, wall);
    }

    verify(&sim)?;
    sim.destroy();

    Ok(RunReport {
        scenario,
        final_time,
        stats,
        pending,
        trace_entries: trace.entries(),
        digest: trace.digest(),
    })
}

fn print_report(report: &RunReport) {
    println!("scenario:   {}", report.scenario);
    println!("final time: {}", report.final_time);
    println!(
        "events:     scheduled={} executed={} cancelled={} removed={} pending={}",
        report.stats.scheduled,
        report.stats.executed,
        report.stats.cancelled,
        report.stats.removed,
        report.pending
    );
    println!("trace:      {} entries", report.trace_entries);
    println!("digest:     {}", report.digest);
}

fn check_digest(report: &RunReport, expected: Option<&str>) -> Result<(), CliError> {
    match expected {
        Some(expected) if !expected.eq_ignore_ascii_case(&report.digest) => {
            error!(expected, actual = %report.digest, "trace digest mismatch");
            Err(CliError::DigestMismatch {
                expected: expected.to_string(),
                actual: report.digest.clone(),
            })
        }
        _ => Ok(()),
    }
}
