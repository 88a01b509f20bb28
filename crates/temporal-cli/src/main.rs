//! # temporal
//!
//! Command-line interface for the temporal intelligence pipeline. Loads a
//! JSON snapshot of keyed series plus feeds, runs the pipeline once and
//! prints the resulting records as JSON.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use temporal_facade::{
    Decomposer, ExternalFeeds, Forecaster, Generation, GenerationStore, HierarchyLink,
    InMemorySeriesStore, Pipeline, PipelineConfig, Point, SeriesKey, SeriesSource,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "temporal")]
#[command(about = "Temporal intelligence pipeline CLI", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply to missing keys
    #[arg(short, long, global = true, env = "TIP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every stage and print the generation
    Run {
        /// Snapshot document (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Print only one part of the generation
        #[arg(short, long, value_enum, default_value_t = Section::All)]
        section: Section,

        /// Output file (optional)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Forecast a single series
    Forecast {
        /// Snapshot document (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Geographic unit of the series
        #[arg(short, long)]
        unit: String,

        /// Metric of the series; required when the unit has several
        #[arg(short, long)]
        metric: Option<String>,

        /// Days ahead; defaults to the longest configured horizon
        #[arg(long)]
        horizon: Option<usize>,

        /// Output file (optional)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Section {
    All,
    Decompositions,
    Forecasts,
    Anomalies,
    Surges,
    Insights,
    Outcomes,
}

/// One series in the input document
#[derive(Debug, Deserialize)]
struct SeriesDocument {
    key: SeriesKey,
    points: Vec<Point>,
}

/// Input document: series, hierarchy edges and the external feeds
#[derive(Debug, Deserialize)]
struct SnapshotDocument {
    series: Vec<SeriesDocument>,
    #[serde(default)]
    hierarchy: Vec<HierarchyLink>,
    #[serde(flatten)]
    feeds: ExternalFeeds,
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let config = match path {
        Some(path) => PipelineConfig::from_path(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => PipelineConfig::default(),
    };
    let config = config
        .with_env_overrides()
        .context("Failed to apply TIP_* overrides")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Load the snapshot document into a fresh store
fn load_snapshot(path: &Path) -> Result<(InMemorySeriesStore, ExternalFeeds)> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let document: SnapshotDocument = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {:?}", path))?;

    let mut store = InMemorySeriesStore::new();
    for link in document.hierarchy {
        let edge = format!("{} -> {}", link.parent, link.child);
        store
            .link(link)
            .with_context(|| format!("Invalid hierarchy edge {}", edge))?;
    }
    for series in document.series {
        let key = series.key.clone();
        store
            .upsert_points(series.key, series.points)
            .with_context(|| format!("Invalid points for {}", key))?;
    }
    info!(
        series = store.len(),
        age_cohorts = document.feeds.age_cohorts.len(),
        coverage = document.feeds.coverage.len(),
        "snapshot loaded"
    );
    Ok((store, document.feeds))
}

/// Write JSON to file or stdout
fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, value).context("Failed to write JSON")?;
            writer.flush()?;
            info!(path = %path.display(), "results written");
        }
        None => {
            let stdout = std::io::stdout();
            let mut writer = stdout.lock();
            serde_json::to_writer_pretty(&mut writer, value).context("Failed to write JSON")?;
            writeln!(writer)?;
        }
    }
    Ok(())
}

fn write_section(generation: &Generation, section: Section, output: Option<&Path>) -> Result<()> {
    match section {
        Section::All => write_json(generation, output),
        Section::Decompositions => write_json(&generation.decompositions, output),
        Section::Forecasts => write_json(&generation.forecasts, output),
        Section::Anomalies => write_json(&generation.anomalies, output),
        Section::Surges => write_json(&generation.surges, output),
        Section::Insights => write_json(&generation.insights, output),
        Section::Outcomes => write_json(&generation.outcomes, output),
    }
}

/// Run command
fn run_pipeline(
    config: PipelineConfig,
    input: &Path,
    section: Section,
    output: Option<&Path>,
) -> Result<()> {
    let (store, feeds) = load_snapshot(input)?;
    let pipeline = Pipeline::new(config).context("Invalid configuration")?;
    let generations = GenerationStore::new();

    let generation = pipeline
        .run_and_publish(&store.snapshot(), &feeds, &generations)
        .context("Pipeline run failed")?;

    write_section(&generation, section, output)
}

/// Find the single key for `unit` (and `metric` when given)
fn resolve_key(source: &dyn SeriesSource, unit: &str, metric: Option<&str>) -> Result<SeriesKey> {
    let matches: Vec<SeriesKey> = source
        .keys()
        .into_iter()
        .filter(|k| k.unit == unit && metric.map_or(true, |m| k.metric == m))
        .collect();
    match matches.as_slice() {
        [key] => Ok(key.clone()),
        [] => bail!("No series for unit '{}'", unit),
        many => {
            let metrics: Vec<&str> = many.iter().map(|k| k.metric.as_str()).collect();
            bail!(
                "Unit '{}' has several metrics ({}); pass --metric",
                unit,
                metrics.join(", ")
            )
        }
    }
}

/// Forecast command
fn run_forecast(
    config: PipelineConfig,
    input: &Path,
    unit: &str,
    metric: Option<&str>,
    horizon: Option<usize>,
    output: Option<&Path>,
) -> Result<()> {
    let (store, _) = load_snapshot(input)?;
    let snapshot = store.snapshot();
    let key = resolve_key(&snapshot, unit, metric)?;
    let horizon = horizon.unwrap_or_else(|| config.forecast.max_horizon());
    if horizon == 0 {
        bail!("Horizon must be positive");
    }

    let pipeline = Pipeline::new(config).context("Invalid configuration")?;
    let series = snapshot
        .get_series(&key)
        .with_context(|| format!("Failed to read {}", key))?;
    let decomposition = pipeline.decomposer().decompose(&series).ok();
    let result = pipeline
        .forecaster()
        .forecast(&series, decomposition.as_ref(), horizon)
        .with_context(|| format!("Failed to forecast {}", key))?;

    info!(key = %key, method = ?result.method, status = ?result.status, "forecast complete");
    write_json(&result, output)
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            input,
            section,
            output,
        } => run_pipeline(config, &input, section, output.as_deref()),

        Commands::Forecast {
            input,
            unit,
            metric,
            horizon,
            output,
        } => run_forecast(
            config,
            &input,
            &unit,
            metric.as_deref(),
            horizon,
            output.as_deref(),
        ),

        Commands::Config => {
            let text = toml::to_string_pretty(&config).context("Failed to render config")?;
            print!("{}", text);
            Ok(())
        }
    }
}

fn main() {
    // Load .env file (optional - won't fail if missing)
    dotenvy::dotenv().ok();

    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "temporal=info,temporal_core=info".into()),
        )
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
