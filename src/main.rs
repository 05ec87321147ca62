use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use lockbench::{BatchConfig, Comparison, Latency, Report, SimulationConfig, Strategy};
use std::time::Duration;

#[derive(Parser)]
#[clap(author, version)]
#[clap(name = "lockbench")]
#[clap(about = "Compares map locking strategies under concurrent readers and writers", long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs every strategy for a fixed duration and reports reads/sec and writes/sec.
    Timed(TimedCommand),
    /// Runs one operation per thread and reports how long each strategy took.
    Batch(BatchCommand),
}

#[derive(Args)]
struct WorkloadArgs {
    #[clap(short, long, default_value_t = 1000, allow_negative_numbers = true)]
    readers: i64,

    #[clap(short, long, default_value_t = 10, allow_negative_numbers = true)]
    writers: i64,

    /// Strategies to run; every later one is compared against the first.
    #[clap(short, long = "strategy", default_values_t = [Strategy::Exclusive, Strategy::SharedRead])]
    strategies: Vec<Strategy>,

    #[clap(long, default_value_t = 10)]
    read_latency_ms: u64,

    #[clap(long, default_value_t = 50)]
    write_latency_ms: u64,

    #[clap(long, default_value_t = 0)]
    seed: u64,
}

impl WorkloadArgs {
    fn latency(&self) -> Latency {
        Latency::from_millis(self.read_latency_ms, self.write_latency_ms)
    }
}

#[derive(Args)]
struct TimedCommand {
    #[clap(flatten)]
    workload: WorkloadArgs,

    /// Run duration in seconds.
    #[clap(short, long, default_value_t = 5.0, allow_negative_numbers = true)]
    duration: f64,
}

#[derive(Args)]
struct BatchCommand {
    #[clap(flatten)]
    workload: WorkloadArgs,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Timed(timed) => run_timed(timed),
        Commands::Batch(batch) => run_batch(batch),
    }
}

fn run_timed(command: &TimedCommand) -> Result<()> {
    let args = &command.workload;
    // Negative or unrepresentable durations fall through to the zero-duration check.
    let duration = Duration::try_from_secs_f64(command.duration).unwrap_or(Duration::ZERO);
    let config = SimulationConfig::from_signed(args.readers, args.writers, duration)?
        .with_latency(args.latency())
        .with_seed(args.seed);

    println!(
        "Running simulations for {:?} with {} readers and {} writers...\n",
        config.duration(),
        config.readers(),
        config.writers()
    );

    let mut reports = Vec::with_capacity(args.strategies.len());
    for &strategy in &args.strategies {
        let report = lockbench::run(&config, strategy)?;
        println!("{report}\n");
        reports.push(report);
    }

    for (baseline, candidate) in pairs(&reports) {
        println!("{}\n", Comparison::new(baseline, candidate));
    }
    Ok(())
}

fn run_batch(command: &BatchCommand) -> Result<()> {
    let args = &command.workload;
    let config = BatchConfig::from_signed(args.readers, args.writers)?
        .with_latency(args.latency())
        .with_seed(args.seed);

    let mut reports = Vec::with_capacity(args.strategies.len());
    for &strategy in &args.strategies {
        println!("Running batch with {strategy}...");
        let report = lockbench::run_batch(&config, strategy)?;
        println!("{strategy} took: {:?}\n", report.throughput.duration);
        reports.push(report);
    }

    for (baseline, candidate) in pairs(&reports) {
        println!("{}", Comparison::new(baseline, candidate).overall());
    }
    Ok(())
}

/// The first report paired with each of the others.
fn pairs(reports: &[Report]) -> impl Iterator<Item = (&Report, &Report)> {
    reports
        .split_first()
        .into_iter()
        .flat_map(|(baseline, rest)| rest.iter().map(move |candidate| (baseline, candidate)))
}
