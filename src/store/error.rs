//! Record store error types
//!
//! Defines all errors that can occur in the store layer.

use thiserror::Error;

/// Errors that can occur in the record store
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite rejected a statement
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Index is not defined on the namespace
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// Index exists but its build has not finished
    #[error("Index not ready: {0}")]
    IndexNotReady(String),

    /// Index does not cover the requested set or bin
    #[error("Index mismatch: {0}")]
    IndexMismatch(String),

    /// Waiting for an index build exceeded the deadline
    #[error("Timed out after {waited_ms}ms waiting for index {name}")]
    IndexTimeout { name: String, waited_ms: u64 },

    /// No aggregate function registered under this name
    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    /// Key is unusable (empty namespace, set or user key)
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Lock acquisition failed
    #[error("Lock error: {0}")]
    Lock(String),

    /// A scan worker stopped without finishing its partitions
    #[error("Scan worker failed: {0}")]
    ScanAborted(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
