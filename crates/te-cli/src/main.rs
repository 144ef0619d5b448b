//! trigeff CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use te_core::Config;
use te_fit::{FitFunction, TurnOnFitter, builtin_studies, run_studies};
use te_hist::Accumulator;
use te_select::{EventBatch, HltProcessor, RegionTable};

mod report;

#[derive(Parser)]
#[command(name = "trigeff")]
#[command(about = "trigeff - Trigger turn-on efficiency measurement")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Select events from batch files and fill the analysis histograms
    Process {
        /// Primary dataset name recorded on every fill
        #[arg(long)]
        dataset: String,

        /// Analysis configuration (YAML). Defaults to the built-in thresholds.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Threads (0 = auto).
        #[arg(long, default_value = "0")]
        threads: usize,

        /// Output accumulator (JSON)
        #[arg(short, long)]
        output: PathBuf,

        /// Event batch files (JSON), one chunk each
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Merge accumulator files
    Merge {
        /// Output accumulator (JSON)
        #[arg(short, long)]
        output: PathBuf,

        /// Accumulator files to merge
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Run the built-in turn-on studies on a merged accumulator
    Turnons {
        /// Input accumulator (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Turn-on shape (erf or sigmoid)
        #[arg(long, default_value = "erf")]
        function: FitFunction,

        /// Output report (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Threads (0 = auto).
        #[arg(long, default_value = "0")]
        threads: usize,
    },

    /// Print the region table
    Regions,

    /// Inspect the analysis configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Print version information
    Version,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print a numeric threshold, e.g. `MUON.CUTS.TIGHT.ISO`
    Get {
        /// Dot-separated path (case-insensitive)
        path: String,

        /// Analysis configuration (YAML). Defaults to the built-in thresholds.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    match cli.command {
        Commands::Process { dataset, config, threads, output, inputs } => {
            cmd_process(&dataset, config.as_deref(), threads, &output, &inputs)
        }
        Commands::Merge { output, inputs } => cmd_merge(&output, &inputs),
        Commands::Turnons { input, function, output, threads } => {
            cmd_turnons(&input, function, output.as_deref(), threads)
        }
        Commands::Regions => cmd_regions(),
        Commands::Config { command: ConfigCommands::Get { path, config } } => {
            let cfg = load_config(config.as_deref())?;
            println!("{}", cfg.lookup(&path)?);
            Ok(())
        }
        Commands::Version => {
            println!("trigeff {}", te_core::VERSION);
            Ok(())
        }
    }
}

fn cmd_process(dataset: &str, config: Option<&Path>, threads: usize, output: &Path, inputs: &[PathBuf]) -> Result<()> {
    init_threads(threads);
    let processor = HltProcessor::new(load_config(config)?)?;
    let batches = inputs.par_iter().map(|p| read_json::<EventBatch>(p)).collect::<Result<Vec<_>>>()?;
    let events: usize = batches.iter().map(|b| b.n_events).sum();
    tracing::info!(dataset, chunks = batches.len(), events, "processing");

    let acc = processor.process_chunks(dataset, &batches)?;
    write_json(output, &acc)?;
    tracing::info!(path = %output.display(), histograms = acc.len(), "accumulator written");
    Ok(())
}

fn cmd_merge(output: &Path, inputs: &[PathBuf]) -> Result<()> {
    let parts = inputs.iter().map(|p| read_json::<Accumulator>(p)).collect::<Result<Vec<_>>>()?;
    let merged = Accumulator::merge_all(&parts)?;
    write_json(output, &merged)?;
    tracing::info!(inputs = parts.len(), path = %output.display(), "accumulators merged");
    Ok(())
}

fn cmd_turnons(input: &Path, function: FitFunction, output: Option<&Path>, threads: usize) -> Result<()> {
    init_threads(threads);
    let acc: Accumulator = read_json(input)?;
    let report = run_studies(&acc, &builtin_studies(), &TurnOnFitter::default(), function);
    tracing::info!(
        studies = report.studies.len(),
        skipped = report.skipped.len(),
        failed_fits = report.n_failed_fits(),
        "turn-on studies complete"
    );

    match output {
        Some(path) => {
            write_json(path, &report)?;
            print!("{}", report::summary(&report));
        }
        None => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

fn cmd_regions() -> Result<()> {
    let table = RegionTable::hlt_regions()?;
    print!("{}", report::region_table(&table));
    Ok(())
}

fn init_threads(threads: usize) {
    if threads > 0 {
        // Best-effort; if a global pool already exists, keep going.
        let _ = rayon::ThreadPoolBuilder::new().num_threads(threads).build_global();
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => {
            tracing::info!(path = %p.display(), "loading configuration");
            Config::load(p).with_context(|| format!("reading configuration {}", p.display()))
        }
        None => Ok(Config::default()),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    std::fs::write(path, serde_json::to_string_pretty(value)?)
        .with_context(|| format!("writing {}", path.display()))
}
