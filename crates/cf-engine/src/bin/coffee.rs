use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use crossbeam_channel::unbounded;
use tracing_subscriber::EnvFilter;

use cf_data::{load_run_config, save_run_config, CsvExporter, MultiSink, SummaryExporter};
use cf_engine::{Driver, RunEvent};
use cf_types::{BoundsSet, RawRunConfig};

#[derive(Parser, Debug)]
#[command(name = "coffee")]
#[command(version)]
#[command(about = "Optimize an objective computed by an external program", long_about = None)]
struct Cli {
    /// JSON run configuration; flags given alongside override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// shgo_sobol, shgo_simplicial, differential_evolution or dual_annealing
    #[arg(long)]
    algorithm: Option<String>,

    /// Program (plus fixed leading arguments) that evaluates the objective
    #[arg(long)]
    executable: Option<String>,

    /// CSV file for the sorted evaluation table
    #[arg(long, short = 'o')]
    output: Option<String>,

    #[arg(long)]
    tolerance: Option<String>,

    /// minimize or maximize
    #[arg(long)]
    direction: Option<String>,

    /// Parallel evaluations; anything but a positive integer means 1
    #[arg(long)]
    workers: Option<String>,

    /// Variable bound, repeatable
    #[arg(long = "bound", value_name = "NAME:LOWER:UPPER")]
    bounds: Vec<String>,

    #[arg(long)]
    samples: Option<usize>,

    #[arg(long)]
    iterations: Option<usize>,

    #[arg(long)]
    max_iterations: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Kill an evaluation that runs longer than this
    #[arg(long)]
    timeout_secs: Option<f64>,

    /// Also write a JSON run summary here
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Save the effective run configuration as JSON and exit
    #[arg(long)]
    write_config: Option<PathBuf>,
}

impl Cli {
    fn raw_config(&self) -> anyhow::Result<RawRunConfig> {
        let mut raw = match &self.config {
            Some(path) => load_run_config(path)?,
            None => RawRunConfig::default(),
        };

        if let Some(v) = &self.algorithm {
            raw.algorithm = v.clone();
        }
        if let Some(v) = &self.executable {
            raw.executable = v.clone();
        }
        if let Some(v) = &self.output {
            raw.output = v.clone();
        }
        if let Some(v) = &self.tolerance {
            raw.tolerance = v.clone();
        }
        if let Some(v) = &self.direction {
            raw.direction = v.clone();
        }
        if let Some(v) = &self.workers {
            raw.workers = v.clone();
        }
        if !self.bounds.is_empty() {
            raw.bounds = self
                .bounds
                .iter()
                .map(|spec| BoundsSet::parse_spec(spec))
                .collect::<Result<_, _>>()?;
        }
        raw.samples = self.samples.or(raw.samples);
        raw.iterations = self.iterations.or(raw.iterations);
        raw.max_iterations = self.max_iterations.or(raw.max_iterations);
        raw.seed = self.seed.or(raw.seed);
        raw.timeout_secs = self.timeout_secs.or(raw.timeout_secs);
        Ok(raw)
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let raw = cli.raw_config()?;
    if let Some(path) = &cli.write_config {
        save_run_config(&raw, path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("wrote run configuration to {}", path.display());
        return Ok(());
    }

    let config = raw.resolve().context("invalid run configuration")?;

    let mut sink = MultiSink::new().with(CsvExporter::new(&config.output_path));
    if let Some(path) = &cli.summary {
        sink = sink.with(SummaryExporter::new(path));
    }

    let (tx, rx) = unbounded();
    let mut driver = Driver::new(config).with_events(tx);
    let outcome = driver.run_and_export(&sink);

    for event in rx.try_iter() {
        match event {
            RunEvent::Completed(summary) => {
                println!(
                    "best {} = {} at {:?} ({} evaluations, {} recorded)",
                    summary.direction,
                    summary.best_value,
                    summary.best_x,
                    summary.nfev,
                    summary.recorded
                );
                if let Some(optima) = &summary.local_optima {
                    for (rank, optimum) in optima.iter().enumerate() {
                        println!("  local optimum {}: {} at {:?}", rank + 1, optimum.value, optimum.x);
                    }
                }
            }
            RunEvent::Failed { message, .. } => eprintln!("run failed: {message}"),
            RunEvent::Started { .. } => {}
        }
    }

    if let Err(e) = outcome {
        bail!("optimization run {} failed: {e}", driver.config().id);
    }
    println!("results written to {}", driver.config().output_path.display());
    Ok(())
}
