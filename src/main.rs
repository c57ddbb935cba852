use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use jobslot::config::{SchedulerConfig, SimulationConfig};
use jobslot::shutdown::install_shutdown_handler;
use jobslot::simulation::{run_simulation, SimulationReport};
use jobslot::{Priority, Scheduler};

#[derive(Parser, Debug)]
#[command(name = "jobslot")]
#[command(version)]
#[command(about = "A single-slot priority job scheduler")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run a synthetic load through the scheduler and report per-priority results
    Simulate(SimulateArgs),
}

#[derive(Parser, Debug)]
struct SimulateArgs {
    /// Number of jobs, spread evenly over the four priorities
    #[arg(long, default_value = "100")]
    jobs: usize,

    /// Shortest job body in milliseconds
    #[arg(long, default_value = "25")]
    min_duration_ms: u64,

    /// Longest job body in milliseconds
    #[arg(long, default_value = "100")]
    max_duration_ms: u64,

    /// Chance that any single attempt fails (0.0 - 1.0)
    #[arg(long, default_value = "0.1")]
    failure_rate: f64,

    /// Attempts allowed per job, including the first
    #[arg(long, default_value = "3")]
    max_attempts: u32,

    /// Per-attempt deadline in milliseconds (0 disables it)
    #[arg(long, default_value = "1000")]
    timeout_ms: u64,

    /// Fallback interval between pump ticks
    #[arg(long, default_value = "100")]
    pump_interval_ms: u64,

    /// Seed for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

impl SimulateArgs {
    fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::new(self.jobs.max(1)).with_pump_interval_ms(self.pump_interval_ms)
    }

    fn simulation_config(&self) -> SimulationConfig {
        SimulationConfig {
            jobs: self.jobs,
            min_duration_ms: self.min_duration_ms,
            max_duration_ms: self.max_duration_ms,
            failure_rate: self.failure_rate,
            max_attempts: self.max_attempts,
            timeout_ms: (self.timeout_ms > 0).then_some(self.timeout_ms),
            seed: self.seed,
            ..SimulationConfig::default()
        }
    }
}

fn print_table(report: &SimulationReport) {
    println!("Simulation Summary");
    println!("{}", "=".repeat(64));
    println!(
        "{:<10} {:>6} {:>10} {:>8} {:>10} {:>14}",
        "PRIORITY", "JOBS", "COMPLETED", "FAILED", "CANCELLED", "MEAN LATENCY"
    );
    println!("{}", "-".repeat(64));
    for priority in Priority::ALL {
        let Some(row) = report.per_priority.get(&priority) else {
            continue;
        };
        println!(
            "{:<10} {:>6} {:>10} {:>8} {:>10} {:>11.1} ms",
            priority, row.jobs, row.completed, row.failed, row.cancelled, row.mean_latency_ms
        );
    }
    println!("{}", "-".repeat(64));
    println!(
        "Total: {} submitted, {} terminal, {} attempts",
        report.submitted,
        report.terminal(),
        report.total_attempts
    );
    if report.interrupted {
        println!(
            "Interrupted: {} job(s) did not finish",
            report.unfinished
        );
    }
}

async fn run_simulate(args: SimulateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let sim_config = args.simulation_config();
    sim_config.validate()?;

    let scheduler = Scheduler::new(args.scheduler_config());
    let stop: CancellationToken = install_shutdown_handler(scheduler.clone());

    tracing::info!(
        jobs = sim_config.jobs,
        failure_rate = sim_config.failure_rate,
        max_attempts = sim_config.max_attempts,
        timeout_ms = ?sim_config.timeout_ms,
        "Starting simulation"
    );

    let report = run_simulation(&scheduler, &sim_config, stop).await?;
    scheduler.shutdown().await;

    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => print_table(&report),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Simulate(simulate_args) => run_simulate(simulate_args).await?,
    }

    Ok(())
}
