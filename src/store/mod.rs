//! Flight Record Store
//!
//! This module provides the keyed record store the loader writes into and
//! the planner queries:
//!
//! - **types**: Core data structures (FlightRecord, Key, Statement)
//! - **index**: Numeric secondary indexes and their build lifecycle
//! - **stream**: Bounded, pull-based query result handle
//! - **engine**: SQLite-backed `RecordStore` implementation
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//!   FlightRecord → Key → partition → records + index_entries (one transaction)
//!
//! Read Path:
//!   Statement → index range per partition → decode → map/reduce → QueryHandle
//! ```

pub mod engine;
pub mod error;
pub mod index;
pub mod stream;
pub mod types;

pub use engine::{SqliteStore, StoreStats};
pub use error::{StoreError, StoreResult};
pub use index::{IndexSpec, IndexState, IndexTask};
pub use stream::{PartialAggregate, QueryHandle, ScanItem};
pub use types::{bins, day_timestamp, FlightRecord, FunctionCall, Key, RangeFilter, Statement};

use crate::aggregate::AggregateFunction;
use async_trait::async_trait;

/// Keyed record store with numeric secondary indexes
///
/// Components receive an explicitly owned handle (`Arc<dyn RecordStore>`).
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or replace a record and its index entries
    async fn put(&self, key: &Key, record: &FlightRecord) -> StoreResult<()>;

    /// Read a record back
    async fn get(&self, key: &Key) -> StoreResult<Option<FlightRecord>>;

    /// Define an index and start building it
    async fn create_index(&self, spec: IndexSpec) -> StoreResult<IndexTask>;

    /// Current build state of an index
    async fn index_state(&self, namespace: &str, name: &str) -> StoreResult<IndexState>;

    /// Make a map/reduce pair callable from statements
    fn register_function(&self, function: AggregateFunction) -> StoreResult<()>;

    /// Start a range scan
    ///
    /// Index and function problems are reported here, before any item is
    /// produced. Failures during the scan arrive through the handle.
    async fn query(&self, statement: Statement) -> StoreResult<QueryHandle>;
}
