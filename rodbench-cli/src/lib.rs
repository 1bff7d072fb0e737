#![warn(missing_docs)]
//! rodbench Orchestrator
//!
//! Drives one or more benchmark hosts over the control protocol, estimates
//! each benchmark's per-iteration cost net of fixed per-run overhead, and
//! recommends an iteration count for a fair measurement.
//!
//! ```text
//! rodbench ./target/release/examples/demo tcp://10.0.0.7:7878 -b Encode
//! ```
//!
//! Host handles are paths to host binaries (spawned with `--rod-serve`) or
//! `tcp://<addr>` for hosts serving the RPC binding. Only benchmarks that
//! every host registers are sampled.

pub mod client;
mod config;
mod planner;
mod report;
pub mod sampler;

pub use config::*;
pub use planner::{ExecutionPlan, PlannedBenchmark, build_plan};
pub use report::{
    Report, ReportMeta, ReportSummary, build_report, format_duration, format_human_output,
    format_json_output,
};

use anyhow::Context;
use clap::Parser;
use client::{ClientError, ConnectOptions, HostClient};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use regex::Regex;
use sampler::{Estimate, Strategy, StrategyKind};
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// rodbench CLI arguments
#[derive(Parser, Debug)]
#[command(name = "rodbench")]
#[command(
    author,
    version,
    about = "rodbench - overhead-corrected iteration counts for micro-benchmarks"
)]
pub struct Cli {
    /// Host binaries to spawn, or tcp://<addr> of RPC hosts
    #[arg(required = true, value_name = "HOSTS")]
    pub hosts: Vec<String>,

    /// Only sample benchmarks whose name matches this regex
    #[arg(short, long, default_value = ".")]
    pub bench: String,

    /// Echo every request and response on the host channels
    #[arg(short, long)]
    pub debug: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Sampling strategy
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyKind>,

    /// Trials per regime
    #[arg(long)]
    pub trials: Option<usize>,

    /// Second iteration count of the two-point strategy
    #[arg(long)]
    pub probe: Option<u64>,

    /// Largest acceptable overhead share of total time (e.g. 0.01)
    #[arg(long)]
    pub target: Option<f64>,

    /// Calibration budget of the regression strategy (e.g. "2s")
    #[arg(long)]
    pub calibration: Option<String>,

    /// Worker count for every run
    #[arg(long)]
    pub parallelism: Option<u32>,

    /// Report B/op and allocs/op for every run
    #[arg(long)]
    pub benchmem: bool,

    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Output file (stdout if not specified)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Hosts sampled concurrently (default: all)
    #[arg(long)]
    pub jobs: Option<usize>,

    /// Seed for the iteration schedule
    #[arg(long)]
    pub seed: Option<u64>,

    /// Configuration file (default: rod.toml found upwards from here)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// List the benchmarks every host registers, without sampling
    #[arg(long)]
    pub list: bool,
}

/// Run the rodbench CLI with arguments from the environment.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the rodbench CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    init_tracing(&cli);

    let config = resolve_config(&cli)?;
    let params = config.sampler.params()?;
    let filter = Regex::new(&cli.bench)
        .with_context(|| format!("invalid benchmark filter {:?}", cli.bench))?;

    let options = ConnectOptions {
        parallelism: config.host.parallelism,
        benchmem: config.host.benchmem,
        startup_timeout: config.startup_timeout()?,
    };
    let mut hosts = connect_hosts(&cli.hosts, &options)?;

    let mut listings = Vec::with_capacity(hosts.len());
    for host in hosts.iter_mut() {
        let entries = host.list().map_err(|e| fatal(host.label(), e))?;
        debug!(host = %host.label(), benchmarks = entries.len(), "listed");
        listings.push(entries);
    }
    let plan = build_plan(&listings, &filter);

    if cli.list {
        let mut stdout = std::io::stdout().lock();
        for name in plan.names() {
            writeln!(stdout, "{}", name)?;
        }
        close_hosts(&mut hosts);
        return Ok(());
    }

    if plan.is_empty() {
        warn!(filter = %cli.bench, "no benchmark matches on every host");
    }

    let strategy = config.sampler.strategy.build(params.clone());
    let jobs = cli.jobs.unwrap_or(hosts.len()).max(1);
    let pool = ThreadPoolBuilder::new()
        .num_threads(jobs)
        .thread_name(|i| format!("rodbench-host-{}", i))
        .build()
        .context("failed to build host thread pool")?;
    info!(
        benchmarks = plan.len(),
        hosts = hosts.len(),
        strategy = strategy.name(),
        "sampling"
    );

    let pb = if cli.debug {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(plan.len() as u64)
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let start_time = Instant::now();
    let mut results = Vec::with_capacity(plan.len() * hosts.len());
    for bench in &plan.benchmarks {
        pb.set_message(bench.name.clone());
        let estimates = estimate_on_hosts(&pool, strategy.as_ref(), &mut hosts, &bench.entries);
        for (host, estimate) in hosts.iter().zip(estimates) {
            match estimate {
                Ok(mut estimate) => {
                    estimate.benchmark.clone_from(&bench.name);
                    if let Some(failure) = &estimate.failure {
                        warn!(benchmark = %bench.name, host = %host.label(), "--- FAIL: {}", failure);
                    } else if let sampler::Recommendation::Unreliable { reason } =
                        &estimate.recommendation
                    {
                        warn!(benchmark = %bench.name, host = %host.label(), "unreliable: {}", reason);
                    }
                    results.push(estimate);
                }
                Err(e) if !e.is_fatal() => {
                    warn!(benchmark = %bench.name, host = %host.label(), "{}", e);
                    results.push(Estimate::failed(
                        &bench.name,
                        host.label(),
                        strategy.name(),
                        e.to_string(),
                        0,
                    ));
                }
                Err(e) => {
                    pb.finish_and_clear();
                    return Err(fatal(host.label(), e));
                }
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();
    close_hosts(&mut hosts);

    let total_duration_ms = start_time.elapsed().as_secs_f64() * 1000.0;
    let report = build_report(
        results,
        &cli.hosts,
        strategy.name(),
        params.target,
        total_duration_ms,
    );

    let output = match config.output.format {
        OutputFormat::Human => format_human_output(&report, config.output.show_trials),
        OutputFormat::Json => format_json_output(&report).context("failed to serialize report")?,
    };
    match &cli.output {
        Some(path) => {
            std::fs::write(path, &output)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), "report written");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(output.as_bytes())?;
            stdout.flush()?;
        }
    }

    Ok(())
}

fn init_tracing(cli: &Cli) {
    let mut directives = if cli.verbose || cli.debug {
        "rodbench=debug".to_string()
    } else {
        "rodbench=info".to_string()
    };
    if cli.debug {
        directives.push_str(",rodbench::wire=trace");
    }
    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(directives))
        .with_writer(std::io::stderr)
        .try_init();
}

/// Layer the configuration: defaults, then rod.toml, then flags.
fn resolve_config(cli: &Cli) -> anyhow::Result<RodConfig> {
    let config = match &cli.config {
        Some(path) => RodConfig::load(path)?,
        None => RodConfig::discover()?,
    };
    apply_overrides(cli, config)
}

fn apply_overrides(cli: &Cli, mut config: RodConfig) -> anyhow::Result<RodConfig> {
    let sampler = &mut config.sampler;
    if let Some(strategy) = cli.strategy {
        sampler.strategy = strategy;
    }
    if let Some(trials) = cli.trials {
        sampler.trials = trials;
    }
    if let Some(probe) = cli.probe {
        sampler.probe = probe;
    }
    if let Some(target) = cli.target {
        sampler.target = target;
    }
    if let Some(calibration) = &cli.calibration {
        sampler.calibration = calibration.clone();
    }
    if cli.seed.is_some() {
        sampler.seed = cli.seed;
    }
    if let Some(parallelism) = cli.parallelism {
        config.host.parallelism = parallelism;
    }
    if cli.benchmem {
        config.host.benchmem = true;
    }
    if let Some(format) = cli.format {
        config.output.format = format;
    }

    if config.host.parallelism == 0 {
        anyhow::bail!("parallelism must be at least 1");
    }
    Ok(config)
}

fn connect_hosts(
    handles: &[String],
    options: &ConnectOptions,
) -> anyhow::Result<Vec<Box<dyn HostClient>>> {
    let mut hosts = Vec::with_capacity(handles.len());
    for handle in handles {
        let host = client::connect(handle, options).map_err(|e| fatal(handle, e))?;
        info!(host = %handle, "connected");
        hosts.push(host);
    }
    Ok(hosts)
}

/// Estimate one benchmark on every host at once, one channel per thread.
fn estimate_on_hosts(
    pool: &rayon::ThreadPool,
    strategy: &dyn Strategy,
    hosts: &mut [Box<dyn HostClient>],
    entries: &[rodbench_ipc::BenchmarkEntry],
) -> Vec<Result<Estimate, ClientError>> {
    pool.install(|| {
        hosts
            .par_iter_mut()
            .zip(entries.par_iter())
            .map(|(host, entry)| strategy.estimate(host.as_mut(), entry))
            .collect()
    })
}

fn close_hosts(hosts: &mut [Box<dyn HostClient>]) {
    for host in hosts.iter_mut() {
        if let Err(e) = host.close() {
            warn!(host = %host.label(), "close failed: {}", e);
        }
    }
}

fn fatal(label: &str, e: ClientError) -> anyhow::Error {
    error!(host = %label, "{}", e);
    anyhow::Error::new(e).context(format!("host {} failed", label))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("rodbench").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_hosts_are_required() {
        let err = Cli::try_parse_from(["rodbench"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["./host"]);
        assert_eq!(cli.hosts, ["./host"]);
        assert_eq!(cli.bench, ".");
        assert!(!cli.debug && !cli.list && !cli.benchmem);
        assert!(cli.strategy.is_none());
    }

    #[test]
    fn test_flags_override_config() {
        let cli = parse(&[
            "./a",
            "tcp://127.0.0.1:7878",
            "-b",
            "^BenchmarkEncode$",
            "--strategy",
            "regression",
            "--trials",
            "7",
            "--target",
            "0.05",
            "--calibration",
            "250ms",
            "--parallelism",
            "4",
            "--benchmem",
            "--format",
            "json",
            "--seed",
            "3",
        ]);
        assert_eq!(cli.hosts.len(), 2);

        let mut file = RodConfig::default();
        file.sampler.trials = 50;
        file.sampler.probe = 8;
        let config = apply_overrides(&cli, file).unwrap();
        assert_eq!(config.sampler.strategy, StrategyKind::Regression);
        assert_eq!(config.sampler.trials, 7);
        assert_eq!(config.sampler.probe, 8);
        assert_eq!(config.sampler.calibration, "250ms");
        assert_eq!(config.sampler.seed, Some(3));
        assert_eq!(config.host.parallelism, 4);
        assert!(config.host.benchmem);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert_eq!(config.sampler.params().unwrap().target, 0.05);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let cli = parse(&["./a", "--config", "/nonexistent/rod.toml"]);
        assert!(resolve_config(&cli).is_err());
    }

    #[test]
    fn test_zero_parallelism_rejected() {
        let cli = parse(&["./a", "--parallelism", "0"]);
        assert!(apply_overrides(&cli, RodConfig::default()).is_err());
    }
}
