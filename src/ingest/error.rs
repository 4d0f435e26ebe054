//! Ingestion error types

use crate::store::StoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Why a single line could not be turned into a flight record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("expected at least {expected} columns, found {found}")]
    MissingColumns { expected: usize, found: usize },

    #[error("{column} is empty")]
    Empty { column: &'static str },

    #[error("{column} is not an integer: '{value}'")]
    InvalidNumber { column: &'static str, value: String },

    #[error("{column} is out of range: {value}")]
    OutOfRange { column: &'static str, value: i64 },

    #[error("invalid flight date '{0}' (expected yyyy/MM/dd)")]
    InvalidDate(String),

    #[error("malformed line: {0}")]
    Malformed(String),
}

/// Errors that can occur while loading flight files
#[derive(Error, Debug)]
pub enum IngestError {
    /// A line failed to parse (strict mode only; lenient mode skips it)
    #[error("{source_name} line {line}: {error}")]
    Parse {
        source_name: String,
        line: u64,
        #[source]
        error: FieldError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Source not found: {0:?}")]
    NotFound(PathBuf),
}

impl IngestError {
    /// Errors confined to one source file
    pub fn is_source_error(&self) -> bool {
        matches!(self, IngestError::Io(_) | IngestError::Csv(_))
    }
}

/// Result type for ingestion
pub type IngestResult<T> = Result<T, IngestError>;
