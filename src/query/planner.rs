//! Range Query Planner
//!
//! Builds a [`Statement`] from a [`RangeQuery`], validates it and submits it
//! to the record store.
//!
//! ```rust,ignore
//! let query = RangeQuery::new()
//!     .namespace("test")
//!     .set_name("flights")
//!     .index("flight_date")
//!     .bin("fl_date")
//!     .dates(DateRange::parse("2012-01-15", "2012-01-15")?)
//!     .aggregate(FunctionCall::new("simple_aggregation", "late_flights_by_airline"));
//!
//! let handle = planner.execute(&query).await?;
//! ```

use crate::query::error::{QueryError, QueryResult};
use crate::store::{
    day_timestamp, FunctionCall, QueryHandle, RangeFilter, RecordStore, Statement,
};
use chrono::NaiveDate;
use std::sync::Arc;

/// Date format accepted on the command line
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Inclusive range of calendar days
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// A single day
    pub fn day(date: NaiveDate) -> Self {
        Self::new(date, date)
    }

    /// Parse two `yyyy-MM-dd` dates
    pub fn parse(start: &str, end: &str) -> QueryResult<Self> {
        let parse = |s: &str| {
            NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
                .map_err(|e| QueryError::Construction(format!("invalid date '{}': {}", s, e)))
        };
        Ok(Self::new(parse(start)?, parse(end)?))
    }

    /// Unix timestamps of both days at 00:00 UTC
    pub fn timestamps(&self) -> (i64, i64) {
        (day_timestamp(self.start), day_timestamp(self.end))
    }
}

/// Builder for an index range query
#[derive(Debug, Clone, Default)]
pub struct RangeQuery {
    namespace: Option<String>,
    set_name: Option<String>,
    index_name: Option<String>,
    bin: Option<String>,
    range: Option<(i64, i64)>,
    aggregate: Option<FunctionCall>,
}

impl RangeQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn set_name(mut self, set_name: impl Into<String>) -> Self {
        self.set_name = Some(set_name.into());
        self
    }

    pub fn index(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = Some(index_name.into());
        self
    }

    pub fn bin(mut self, bin: impl Into<String>) -> Self {
        self.bin = Some(bin.into());
        self
    }

    /// Inclusive raw value range
    pub fn range(mut self, start: i64, end: i64) -> Self {
        self.range = Some((start, end));
        self
    }

    /// Inclusive day range on a date bin
    pub fn dates(self, dates: DateRange) -> Self {
        let (start, end) = dates.timestamps();
        self.range(start, end)
    }

    /// Run this function in the store instead of returning raw records
    pub fn aggregate(mut self, call: FunctionCall) -> Self {
        self.aggregate = Some(call);
        self
    }

    /// Validate and build the statement
    pub fn statement(&self) -> QueryResult<Statement> {
        fn required(field: &Option<String>, name: &str) -> QueryResult<String> {
            match field.as_deref().map(str::trim) {
                Some(value) if !value.is_empty() => Ok(value.to_string()),
                _ => Err(QueryError::Construction(format!("{} is not set", name))),
            }
        }

        let namespace = required(&self.namespace, "namespace")?;
        let set_name = required(&self.set_name, "set name")?;
        let index_name = required(&self.index_name, "index name")?;
        let bin = required(&self.bin, "bin")?;

        let (start, end) = self
            .range
            .ok_or_else(|| QueryError::Construction("range is not set".to_string()))?;
        if start > end {
            return Err(QueryError::Construction(format!(
                "range start {} is after end {}",
                start, end
            )));
        }

        if let Some(call) = &self.aggregate {
            if call.module.trim().is_empty() || call.function.trim().is_empty() {
                return Err(QueryError::Construction(format!(
                    "invalid aggregate function '{}'",
                    call
                )));
            }
        }

        Ok(Statement {
            namespace,
            set_name,
            index_name,
            filter: RangeFilter::new(bin, start, end),
            aggregate: self.aggregate.clone(),
        })
    }
}

/// Submits range queries to a record store
pub struct RangeQueryPlanner {
    store: Arc<dyn RecordStore>,
}

impl RangeQueryPlanner {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Validate the query and start it, returning its one-shot result handle
    pub async fn execute(&self, query: &RangeQuery) -> QueryResult<QueryHandle> {
        let statement = query.statement()?;

        tracing::info!(
            "Querying {}.{} on index {}: {} in [{}, {}]{}",
            statement.namespace,
            statement.set_name,
            statement.index_name,
            statement.filter.bin,
            statement.filter.start,
            statement.filter.end,
            statement
                .aggregate
                .as_ref()
                .map(|call| format!(" aggregated by {}", call))
                .unwrap_or_default()
        );

        let handle = self.store.query(statement).await?;
        Ok(handle)
    }
}
