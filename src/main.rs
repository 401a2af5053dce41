//! CLI entry point for the drive_rater tool.
//!
//! Provides subcommands for scoring a telemetry batch from a CSV trace,
//! rolling a driver's day into a persisted daily aggregate, and
//! consolidating daily aggregates into a multi-day verdict.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use drive_rater::classifier::ModelRegistry;
use drive_rater::kinematics::GpsSample;
use drive_rater::oracle::{CachedOracle, NoFacilities, OverpassOracle, RiskZoneOracle};
use drive_rater::output::{append_record, print_json, print_pretty};
use drive_rater::pipeline::Pipeline;
use drive_rater::store::CsvStore;
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "drive_rater")]
#[command(about = "A tool to score driving behavior from GPS telematics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory containing trip_model.json and bulk_model.json
    #[arg(short, long, default_value = "models", global = true)]
    models: String,

    /// Root directory of the driver-partitioned trip store
    #[arg(short, long, default_value = "data", global = true)]
    data_dir: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a telemetry batch from a CSV trace (latitude,longitude,time_step)
    Score {
        /// Path to the CSV trace
        #[arg(value_name = "TRACE_CSV")]
        input: String,

        /// Driver the batch belongs to
        #[arg(short = 'D', long)]
        driver: String,

        /// Optional CSV journey log to append the verdict to
        #[arg(short, long)]
        output: Option<String>,

        /// Overpass interpreter URL for risk-zone lookups
        /// (falls back to OVERPASS_URL; offline without it)
        #[arg(long)]
        overpass_url: Option<String>,
    },
    /// Aggregate one driver's trips for a calendar date (UTC)
    Daily {
        #[arg(short = 'D', long)]
        driver: String,

        /// Date to aggregate, e.g. 2026-08-27
        #[arg(long)]
        date: NaiveDate,
    },
    /// Consolidate all of a driver's daily aggregates
    Consolidate {
        #[arg(short = 'D', long)]
        driver: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/drive_rater.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("drive_rater.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    // Model load failure is fatal: no traffic without valid models.
    let models = Arc::new(ModelRegistry::load(Path::new(&cli.models))?);
    let store = Arc::new(CsvStore::new(&cli.data_dir));

    match cli.command {
        Commands::Score {
            input,
            driver,
            output,
            overpass_url,
        } => {
            let samples = read_trace(&input)?;
            info!(samples = samples.len(), %driver, "Trace loaded");

            let oracle = build_oracle(overpass_url)?;
            let pipeline = Pipeline::new(store.clone(), store, oracle, models);

            let verdict = pipeline.record_telematics(&driver, samples).await?;
            print_pretty(&verdict);
            print_json(&verdict)?;

            if let Some(path) = output {
                append_record(&path, &verdict)?;
            }
        }
        Commands::Daily { driver, date } => {
            let pipeline = Pipeline::new(store.clone(), store, Arc::new(NoFacilities), models);
            let (start, end) = Pipeline::day_window(date);

            let daily = pipeline.compute_daily_aggregate(&driver, start, end)?;
            info!("{}", serde_json::to_string_pretty(&daily)?);
        }
        Commands::Consolidate { driver } => {
            let pipeline = Pipeline::new(store.clone(), store, Arc::new(NoFacilities), models);

            let consolidated = pipeline.compute_consolidated_aggregate(&driver)?;
            info!("{}", serde_json::to_string_pretty(&consolidated)?);
        }
    }

    Ok(())
}

/// Reads an ordered GPS trace from a CSV file.
fn read_trace(path: &str) -> Result<Vec<GpsSample>> {
    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("opening trace '{path}'"))?;

    let mut samples = Vec::new();
    for result in reader.deserialize() {
        let sample: GpsSample = result?;
        samples.push(sample);
    }
    Ok(samples)
}

/// Overpass-backed oracle with a per-cell cache when a URL is configured,
/// otherwise the offline no-facilities fallback.
fn build_oracle(url_flag: Option<String>) -> Result<Arc<dyn RiskZoneOracle>> {
    let url = url_flag.or_else(|| std::env::var("OVERPASS_URL").ok());

    match url {
        Some(url) => {
            info!(%url, "Risk-zone lookups enabled");
            Ok(Arc::new(CachedOracle::new(OverpassOracle::new(url)?)))
        }
        None => {
            info!("No Overpass URL configured, running without risk-zone context");
            Ok(Arc::new(NoFacilities))
        }
    }
}
