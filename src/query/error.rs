//! Query error types
//!
//! Defines all error conditions that can occur while planning a range query
//! and folding its results.

use crate::store::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during query operations
#[derive(Error, Debug)]
pub enum QueryError {
    /// Query descriptor is incomplete or inconsistent
    #[error("Invalid query: {0}")]
    Construction(String),

    /// Index exists but is still being built
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    /// Store rejected or failed the query
    #[error("Remote execution failed: {0}")]
    RemoteExecution(#[source] StoreError),

    /// Result stream failed mid-iteration
    #[error("Stream failed: {0}")]
    Stream(#[source] StoreError),

    /// Aggregation did not finish in time
    #[error("Query timed out after {0:?}")]
    Timeout(Duration),
}

impl From<StoreError> for QueryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::IndexNotReady(name) => QueryError::IndexUnavailable(name),
            other => QueryError::RemoteExecution(other),
        }
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_mapping() {
        let err: QueryError = StoreError::IndexNotReady("flight_date".to_string()).into();
        assert!(matches!(err, QueryError::IndexUnavailable(ref n) if n == "flight_date"));

        let err: QueryError = StoreError::IndexNotFound("flight_date".to_string()).into();
        assert!(matches!(
            err,
            QueryError::RemoteExecution(StoreError::IndexNotFound(_))
        ));
        assert_eq!(
            err.to_string(),
            "Remote execution failed: Index not found: flight_date"
        );
    }
}
