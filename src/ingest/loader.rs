//! Ingestion Loader
//!
//! Loads flight CSV files into the record store. The date index is created
//! (or found) and waited on before the first write, so queries issued after
//! a load never race the index build.

use crate::config::{IngestConfig, StoreConfig};
use crate::ingest::error::{FieldError, IngestError, IngestResult};
use crate::ingest::parser::parse_flight;
use crate::store::{IndexSpec, Key, RecordStore};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Rejected lines kept in a summary
const MAX_RECORDED_FAILURES: usize = 100;

/// A line skipped in lenient mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub source_name: String,
    pub line: u64,
    pub error: FieldError,
}

/// Outcome of a load
#[derive(Debug, Clone, Default)]
pub struct LoadSummary {
    /// Sources read to the end
    pub files: usize,
    /// Sources that could not be read
    pub files_failed: usize,
    pub loaded: u64,
    pub failed: u64,
    /// First rejected lines, at most 100
    pub failures: Vec<ParseFailure>,
}

impl LoadSummary {
    fn absorb(&mut self, other: LoadSummary) {
        self.files += other.files;
        self.files_failed += other.files_failed;
        self.loaded += other.loaded;
        self.failed += other.failed;
        for failure in other.failures {
            self.record_failure(failure);
        }
    }

    fn record_failure(&mut self, failure: ParseFailure) {
        if self.failures.len() < MAX_RECORDED_FAILURES {
            self.failures.push(failure);
        }
    }
}

impl fmt::Display for LoadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Files: {} ({} unreadable), Loaded: {}, Rejected: {}",
            self.files, self.files_failed, self.loaded, self.failed
        )
    }
}

/// Writes flight files into a record store
pub struct IngestionLoader {
    store: Arc<dyn RecordStore>,
    namespace: String,
    set_name: String,
    config: IngestConfig,
}

impl IngestionLoader {
    pub fn new(store: Arc<dyn RecordStore>, store_config: &StoreConfig, config: IngestConfig) -> Self {
        Self {
            store,
            namespace: store_config.namespace.clone(),
            set_name: store_config.set_name.clone(),
            config,
        }
    }

    /// Create the date index if needed and wait until it is ready
    pub async fn prepare_index(&self) -> IngestResult<()> {
        let spec = IndexSpec::numeric(
            &self.namespace,
            &self.set_name,
            &self.config.index_name,
            &self.config.index_bin,
        );

        let task = self.store.create_index(spec).await?;
        task.wait_till_complete(
            self.store.as_ref(),
            self.config.index_timeout(),
            self.config.index_poll_interval(),
        )
        .await?;

        tracing::info!("Index {} is ready", self.config.index_name);
        Ok(())
    }

    /// Load a file, or every non-hidden file of a directory
    pub async fn load_path(&self, path: &Path) -> IngestResult<LoadSummary> {
        if !path.exists() {
            return Err(IngestError::NotFound(path.to_path_buf()));
        }

        self.prepare_index().await?;

        if !path.is_dir() {
            return self.load_file(path).await;
        }

        let mut summary = LoadSummary::default();
        for file in source_files(path)? {
            match self.load_file(&file).await {
                Ok(file_summary) => summary.absorb(file_summary),
                Err(e) if e.is_source_error() && !self.config.strict => {
                    tracing::error!("Failed to upload {:?}: {}", file, e);
                    summary.files_failed += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(summary)
    }

    /// Load one file
    pub async fn load_file(&self, path: &Path) -> IngestResult<LoadSummary> {
        let file = std::fs::File::open(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.load_reader(&name, file).await
    }

    /// Load CSV text held in memory
    pub async fn load_str(&self, source_name: &str, data: &str) -> IngestResult<LoadSummary> {
        self.load_reader(source_name, data.as_bytes()).await
    }

    async fn load_reader<R: Read>(&self, source_name: &str, source: R) -> IngestResult<LoadSummary> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(source);

        let mut summary = LoadSummary {
            files: 1,
            ..LoadSummary::default()
        };

        for (idx, result) in reader.records().enumerate() {
            let fallback_line = idx as u64 + 1;

            let row = match result {
                Ok(row) => row,
                Err(e) => {
                    let line = e.position().map(|p| p.line()).unwrap_or(fallback_line);
                    self.reject(&mut summary, source_name, line, FieldError::Malformed(e.to_string()))?;
                    continue;
                }
            };
            let line = row.position().map(|p| p.line()).unwrap_or(fallback_line);

            let flight = match parse_flight(&row) {
                Ok(flight) => flight,
                Err(error) => {
                    self.reject(&mut summary, source_name, line, error)?;
                    continue;
                }
            };

            let key = Key::new(&self.namespace, &self.set_name, &flight.id);
            self.store.put(&key, &flight).await?;
            summary.loaded += 1;

            tracing::debug!(
                "Flight [ID={}, FL_DATE={}, CARRIER={}, FL_NUM={}]",
                flight.id,
                flight.fl_date,
                flight.carrier,
                flight.fl_num
            );
        }

        tracing::info!(
            "Successfully uploaded {} ({} loaded, {} rejected)",
            source_name,
            summary.loaded,
            summary.failed
        );
        Ok(summary)
    }

    /// Skip a bad line, or fail the load in strict mode
    fn reject(
        &self,
        summary: &mut LoadSummary,
        source_name: &str,
        line: u64,
        error: FieldError,
    ) -> IngestResult<()> {
        if self.config.strict {
            return Err(IngestError::Parse {
                source_name: source_name.to_string(),
                line,
                error,
            });
        }

        tracing::warn!("Skipping {} line {}: {}", source_name, line, error);
        summary.failed += 1;
        summary.record_failure(ParseFailure {
            source_name: source_name.to_string(),
            line,
            error,
        });
        Ok(())
    }
}

/// Regular files of a directory whose names do not start with a dot, by name
fn source_files(dir: &Path) -> IngestResult<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if hidden || !path.is_file() {
            continue;
        }
        files.push(path);
    }

    files.sort();
    Ok(files)
}
