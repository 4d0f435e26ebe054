//! Range queries
//!
//! - **planner**: `RangeQuery` builder and `RangeQueryPlanner`
//! - **error**: Query error types
//!
//! # Execution Pipeline
//!
//! ```text
//! RangeQuery → Statement (validated) → RecordStore::query → QueryHandle
//! ```
//!
//! The handle is consumed by [`crate::aggregate::Aggregator`].

mod error;
mod planner;

pub use error::{QueryError, QueryResult};
pub use planner::{DateRange, RangeQuery, RangeQueryPlanner, DATE_FORMAT};
