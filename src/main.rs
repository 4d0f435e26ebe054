//! Flightstats CLI
//!
//! Command-line interface for flight analytics:
//! - Load flight CSV files into the record store
//! - Aggregate late arrivals per airline over a date range
//! - Generate a default config file

use anyhow::Context;
use clap::{Parser, Subcommand};
use flightstats::aggregate::late_flights_by_airline;
use flightstats::config::{
    generate_default_config, Config, DefaultConfig, ExecutionMode, LoggingConfig,
};
use flightstats::ingest::IngestionLoader;
use flightstats::query::{DateRange, RangeQuery, RangeQueryPlanner};
use flightstats::report::{render, OutputFormat};
use flightstats::store::{FunctionCall, RecordStore, SqliteStore};
use flightstats::Aggregator;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "flightstats")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Flight analytics on a keyed record store")]
#[command(long_about = "Flightstats loads flight records, indexes them by date and reports\nthe share of late arrivals per airline for a date range.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: standard locations, then built-in defaults)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Record store directory
    #[arg(long, global = true)]
    pub data_dir: Option<String>,

    /// Namespace flight records live in
    #[arg(short, long, global = true)]
    pub namespace: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load a flight CSV file, or every file of a directory
    Load {
        /// File or directory
        path: PathBuf,
        /// Abort on the first malformed line
        #[arg(long)]
        strict: bool,
    },

    /// Report late arrivals per airline
    Aggregate {
        /// First day (yyyy-MM-dd)
        #[arg(short, long, default_value = "2012-01-15")]
        start: String,
        /// Last day, inclusive (yyyy-MM-dd)
        #[arg(short, long, default_value = "2012-01-15")]
        end: String,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Map records here instead of in the store
        #[arg(long)]
        client_side: bool,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        return write_default_config(output.as_deref());
    }

    let loaded = match &cli.config {
        Some(path) => DefaultConfig {
            config: Config::load_with_env(path)?,
            source: Some(path.clone()),
            rejected: Vec::new(),
        },
        None => Config::load_default(),
    };
    let mut config = loaded.config;
    if let Some(data_dir) = cli.data_dir {
        config.store.data_dir = data_dir;
    }
    if let Some(namespace) = cli.namespace {
        config.store.namespace = namespace;
    }

    init_logging(&config.logging)?;
    tracing::info!("Flightstats v{}", env!("CARGO_PKG_VERSION"));
    for e in &loaded.rejected {
        tracing::warn!("Skipped config file: {}", e);
    }
    match &loaded.source {
        Some(path) => tracing::info!("Loaded config from {:?}", path),
        None => tracing::info!("Using default config with environment overrides"),
    }

    let store = Arc::new(
        SqliteStore::open(&config.store)
            .with_context(|| format!("Failed to open store at {}", config.store.data_dir))?,
    );
    store.register_function(late_flights_by_airline(config.query.late_threshold_minutes))?;

    match cli.command {
        Commands::Load { path, strict } => {
            let mut ingest = config.ingest.clone();
            ingest.strict |= strict;

            let loader = IngestionLoader::new(store.clone(), &config.store, ingest);
            let summary = loader.load_path(&path).await?;
            tracing::info!("Load complete: {}", summary);

            for failure in &summary.failures {
                tracing::debug!(
                    "Rejected {} line {}: {}",
                    failure.source_name,
                    failure.line,
                    failure.error
                );
            }

            tracing::info!("Store stats: {}", store.stats()?);
        }

        Commands::Aggregate {
            start,
            end,
            format,
            client_side,
        } => {
            let dates = DateRange::parse(&start, &end)?;
            let mut query = RangeQuery::new()
                .namespace(&config.store.namespace)
                .set_name(&config.store.set_name)
                .index(&config.ingest.index_name)
                .bin(&config.ingest.index_bin)
                .dates(dates);

            let execution = if client_side {
                ExecutionMode::Client
            } else {
                config.query.execution
            };
            if execution == ExecutionMode::Server {
                query = query.aggregate(FunctionCall::new(
                    &config.query.module,
                    &config.query.function,
                ));
            }

            let planner = RangeQueryPlanner::new(store.clone());
            let handle = planner.execute(&query).await?;

            let aggregator =
                Aggregator::new(late_flights_by_airline(config.query.late_threshold_minutes));
            let result = aggregator
                .run_aggregation_with_timeout(handle, config.query.timeout())
                .await?;

            if result.is_empty() {
                tracing::info!("Nothing returned for {} to {}", start, end);
            }
            print!("{}", render(&result, format)?);
        }

        Commands::Config { .. } => {}
    }

    Ok(())
}

fn write_default_config(output: Option<&Path>) -> anyhow::Result<()> {
    let config = generate_default_config();

    match output {
        Some(path) => {
            // Create parent directory if needed
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &config)?;
            println!("Config written to {:?}", path);
        }
        None => {
            print!("{}", config);
        }
    }

    Ok(())
}

/// Logs go to stderr (or the configured file) so stdout carries the report
fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) => tracing_subscriber::EnvFilter::new(directives),
        Err(_) => tracing_subscriber::EnvFilter::new(format!("flightstats={}", config.level)),
    };

    let writer = match &config.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let (json, pretty) = if config.format == "json" {
        (
            Some(tracing_subscriber::fmt::layer().json().with_writer(writer)),
            None,
        )
    } else {
        (
            None,
            Some(tracing_subscriber::fmt::layer().with_writer(writer)),
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(pretty)
        .init();

    Ok(())
}
