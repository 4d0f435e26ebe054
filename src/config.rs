//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::aggregate::{DEFAULT_LATE_THRESHOLD_MINUTES, DEFAULT_MODULE, LATE_FLIGHTS_BY_AIRLINE};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Record store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default = "default_set_name")]
    pub set_name: String,

    /// Number of key partitions scanned independently
    #[serde(default = "default_partitions")]
    pub partitions: u32,

    /// Blocking threads used by one scan
    #[serde(default = "default_scan_workers")]
    pub scan_workers: usize,

    /// Rows fetched per lock acquisition
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Result items buffered between scan workers and the consumer
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_data_dir() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("flightstats").to_string_lossy().to_string())
        .unwrap_or_else(|| "./flightstats_data".to_string())
}

fn default_namespace() -> String {
    "test".to_string()
}

fn default_set_name() -> String {
    "flights".to_string()
}

fn default_partitions() -> u32 {
    32
}

fn default_scan_workers() -> usize {
    4
}

fn default_page_size() -> usize {
    256
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            namespace: default_namespace(),
            set_name: default_set_name(),
            partitions: default_partitions(),
            scan_workers: default_scan_workers(),
            page_size: default_page_size(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl StoreConfig {
    /// Data directory with a leading `~` expanded
    pub fn data_path(&self) -> PathBuf {
        match self.data_dir.strip_prefix("~/") {
            Some(rest) => dirs::home_dir()
                .map(|home| home.join(rest))
                .unwrap_or_else(|| PathBuf::from(&self.data_dir)),
            None => PathBuf::from(&self.data_dir),
        }
    }
}

/// Ingestion configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_index_name")]
    pub index_name: String,

    #[serde(default = "default_index_bin")]
    pub index_bin: String,

    /// Abort a load on the first malformed line
    #[serde(default)]
    pub strict: bool,

    #[serde(default = "default_index_timeout")]
    pub index_timeout_secs: u64,

    #[serde(default = "default_index_poll")]
    pub index_poll_ms: u64,
}

fn default_index_name() -> String {
    "flight_date".to_string()
}

fn default_index_bin() -> String {
    crate::store::bins::FL_DATE.to_string()
}

fn default_index_timeout() -> u64 {
    30
}

fn default_index_poll() -> u64 {
    100
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            index_name: default_index_name(),
            index_bin: default_index_bin(),
            strict: false,
            index_timeout_secs: default_index_timeout(),
            index_poll_ms: default_index_poll(),
        }
    }
}

impl IngestConfig {
    pub fn index_timeout(&self) -> Duration {
        Duration::from_secs(self.index_timeout_secs)
    }

    pub fn index_poll_interval(&self) -> Duration {
        Duration::from_millis(self.index_poll_ms.max(1))
    }
}

/// Where the map phase runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Store folds each partition and returns partial aggregates
    #[default]
    Server,
    /// Store returns raw records, the aggregator maps them
    Client,
}

/// Aggregation query configuration
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_module")]
    pub module: String,

    #[serde(default = "default_function")]
    pub function: String,

    #[serde(default = "default_late_threshold")]
    pub late_threshold_minutes: i64,

    #[serde(default = "default_query_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub execution: ExecutionMode,
}

fn default_module() -> String {
    DEFAULT_MODULE.to_string()
}

fn default_function() -> String {
    LATE_FLIGHTS_BY_AIRLINE.to_string()
}

fn default_late_threshold() -> i64 {
    DEFAULT_LATE_THRESHOLD_MINUTES
}

fn default_query_timeout() -> u64 {
    60
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            module: default_module(),
            function: default_function(),
            late_threshold_minutes: default_late_threshold(),
            timeout_secs: default_query_timeout(),
            execution: ExecutionMode::default(),
        }
    }
}

impl QueryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    ///
    /// Nothing is logged here: this runs before logging is set up, so the
    /// caller reports the outcome.
    pub fn load_default() -> DefaultConfig {
        let config_paths: Vec<PathBuf> = [
            dirs::config_dir().map(|p| p.join("flightstats").join("config.toml")),
            Some(PathBuf::from("/etc/flightstats/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ]
        .into_iter()
        .flatten()
        .collect();

        Self::load_first(&config_paths)
    }

    /// Load the first existing file of `paths` that parses
    pub fn load_first(paths: &[PathBuf]) -> DefaultConfig {
        let mut rejected = Vec::new();

        for path in paths {
            if !path.exists() {
                continue;
            }
            match Self::load_with_env(path) {
                Ok(config) => {
                    return DefaultConfig {
                        config,
                        source: Some(path.clone()),
                        rejected,
                    };
                }
                Err(e) => rejected.push(e),
            }
        }

        DefaultConfig {
            config: Self::from_env(),
            source: None,
            rejected,
        }
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(data_dir) = var("FLIGHTS_DATA_DIR") {
            self.store.data_dir = data_dir;
        }
        if let Some(namespace) = var("FLIGHTS_NAMESPACE") {
            self.store.namespace = namespace;
        }
        if let Some(strict) = var("FLIGHTS_STRICT") {
            if let Ok(strict) = strict.parse() {
                self.ingest.strict = strict;
            }
        }
        if let Some(level) = var("FLIGHTS_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("FLIGHTS_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Result of a default-location lookup
#[derive(Debug)]
pub struct DefaultConfig {
    pub config: Config,
    /// File the config came from, `None` for built-in defaults
    pub source: Option<PathBuf>,
    /// Files that exist but failed to load
    pub rejected: Vec<ConfigError>,
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Flightstats Configuration
#
# Environment variables override these settings:
# - FLIGHTS_DATA_DIR
# - FLIGHTS_NAMESPACE
# - FLIGHTS_STRICT
# - FLIGHTS_LOG_LEVEL
# - FLIGHTS_LOG_FORMAT

[store]
# Directory holding the record store database
data_dir = "~/.local/share/flightstats"

# Namespace and set flight records are written to
namespace = "test"
set_name = "flights"

# Key partitions scanned independently, and threads scanning them
partitions = 32
scan_workers = 4

# Rows read per page, and result items buffered ahead of the aggregator
page_size = 256
channel_capacity = 64

[ingest]
# Secondary index on the flight date
index_name = "flight_date"
index_bin = "fl_date"

# Abort a load on the first malformed line instead of skipping it
strict = false

# How long to wait for the index build (seconds), and how often to check (ms)
index_timeout_secs = 30
index_poll_ms = 100

[query]
# Aggregate function run by the store
module = "simple_aggregation"
function = "late_flights_by_airline"

# A flight is late when it arrives more than this many minutes after schedule
late_threshold_minutes = 15

# Abandon an aggregation after this many seconds
timeout_secs = 60

# server: the store folds partitions; client: records are folded here
execution = "server"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "/var/log/flightstats/flightstats.log"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_parses() {
        let config = Config::parse(&generate_default_config()).unwrap();
        assert_eq!(config.store.namespace, "test");
        assert_eq!(config.store.set_name, "flights");
        assert_eq!(config.store.partitions, 32);
        assert_eq!(config.ingest.index_name, "flight_date");
        assert_eq!(config.ingest.index_bin, "fl_date");
        assert!(!config.ingest.strict);
        assert_eq!(config.query.execution, ExecutionMode::Server);
        assert_eq!(config.query.late_threshold_minutes, 15);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = Config::parse(
            r#"
            [ingest]
            strict = true

            [query]
            execution = "client"
            timeout_secs = 5
            "#,
        )
        .unwrap();

        assert!(config.ingest.strict);
        assert_eq!(config.query.execution, ExecutionMode::Client);
        assert_eq!(config.query.timeout(), Duration::from_secs(5));
        assert_eq!(config.query.function, "late_flights_by_airline");
        assert_eq!(config.store.page_size, 256);
    }

    #[test]
    fn test_invalid_config() {
        assert!(Config::parse("[store]\npartitions = \"many\"").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/flightstats.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("FLIGHTS_DATA_DIR", "/tmp/flights"),
            ("FLIGHTS_NAMESPACE", "bar"),
            ("FLIGHTS_STRICT", "true"),
            ("FLIGHTS_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.store.data_dir, "/tmp/flights");
        assert_eq!(config.store.namespace, "bar");
        assert!(config.ingest.strict);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_first_reports_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.toml");
        let good = dir.path().join("good.toml");
        std::fs::write(&broken, "[store\npartitions = 3").unwrap();
        std::fs::write(&good, "[store]\npartitions = 3").unwrap();

        let paths = vec![dir.path().join("missing.toml"), broken, good.clone()];
        let loaded = Config::load_first(&paths);

        assert_eq!(loaded.source, Some(good));
        assert_eq!(loaded.config.store.partitions, 3);
        assert_eq!(loaded.rejected.len(), 1);
        assert!(matches!(loaded.rejected[0], ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_first_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "not toml at all = = =").unwrap();

        let loaded = Config::load_first(&[broken]);

        assert_eq!(loaded.source, None);
        assert_eq!(loaded.rejected.len(), 1);
        assert_eq!(loaded.config.store.set_name, "flights");
    }

    #[test]
    fn test_data_path() {
        let config = StoreConfig {
            data_dir: "/var/lib/flightstats".to_string(),
            ..StoreConfig::default()
        };
        assert_eq!(config.data_path(), PathBuf::from("/var/lib/flightstats"));
    }
}
