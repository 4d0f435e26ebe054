//! # Flightstats
//!
//! Flight analytics over a keyed record store: load flight CSV files, index
//! them by flight date, and compute per-airline late-arrival statistics for
//! a date range with a streaming map/reduce aggregation.
//!
//! ## Modules
//!
//! - [`store`]: Keyed record store with numeric secondary indexes
//! - [`ingest`]: CSV parsing and bulk loading
//! - [`query`]: Date-range query construction and execution
//! - [`aggregate`]: Map/reduce functions and the streaming aggregator
//! - [`report`]: Text and JSON rendering of results
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use flightstats::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let store = Arc::new(SqliteStore::open(&config.store)?);
//!     store.register_function(late_flights_by_airline(15))?;
//!
//!     // Load a month of flights
//!     let loader = IngestionLoader::new(store.clone(), &config.store, config.ingest.clone());
//!     let summary = loader.load_path("flights/2012-01.csv".as_ref()).await?;
//!     println!("{}", summary);
//!
//!     // Late flights per airline on one day
//!     let query = RangeQuery::new()
//!         .namespace("test")
//!         .set_name("flights")
//!         .index("flight_date")
//!         .bin("fl_date")
//!         .dates(DateRange::parse("2012-01-15", "2012-01-15")?)
//!         .aggregate(FunctionCall::new("simple_aggregation", "late_flights_by_airline"));
//!
//!     let handle = RangeQueryPlanner::new(store.clone()).execute(&query).await?;
//!     let result = Aggregator::new(late_flights_by_airline(15))
//!         .run_aggregation(handle)
//!         .await?;
//!
//!     print!("{}", render_text(&result));
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod config;
pub mod ingest;
pub mod query;
pub mod report;
pub mod store;

// Re-export top-level types for convenience
pub use store::{
    FlightRecord, FunctionCall, IndexSpec, IndexState, IndexTask, Key, QueryHandle, RecordStore,
    SqliteStore, Statement, StoreError, StoreResult, StoreStats,
};

pub use ingest::{IngestError, IngestResult, IngestionLoader, LoadSummary, ParseFailure};

pub use query::{DateRange, QueryError, QueryResult, RangeQuery, RangeQueryPlanner};

pub use aggregate::{
    late_flights_by_airline, AggregateFunction, AggregateResult, Aggregator, GroupStats,
};

pub use report::{render, render_json, render_text, OutputFormat};

pub use config::{
    generate_default_config, Config, ConfigError, DefaultConfig, ExecutionMode, IngestConfig,
    LoggingConfig, QueryConfig, StoreConfig,
};
