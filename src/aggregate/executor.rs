//! Streaming Aggregator
//!
//! Drives a [`QueryHandle`] to exhaustion and folds what it yields into one
//! [`GroupAccumulator`]:
//!
//! ```text
//! ScanItem::Record  → map → reduce into accumulator
//! ScanItem::Partial → reduce each group into accumulator
//! end of stream     → finalize → AggregateResult
//! ```
//!
//! A run is all-or-nothing. Any stream error or timeout drops the
//! accumulator and the handle, which cancels the scan.

use crate::aggregate::accumulator::{AggregateResult, GroupAccumulator};
use crate::aggregate::function::AggregateFunction;
use crate::query::{QueryError, QueryResult};
use crate::store::{QueryHandle, ScanItem};
use futures_util::StreamExt;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Folds query results with a map/reduce pair
pub struct Aggregator {
    function: AggregateFunction,
}

impl Aggregator {
    /// Aggregator using `function` for raw records and for merging partials
    pub fn new(function: AggregateFunction) -> Self {
        Self { function }
    }

    /// Consume the whole stream and return the merged result
    pub async fn run_aggregation(&self, handle: QueryHandle) -> QueryResult<AggregateResult> {
        let query_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("aggregation", %query_id, function = %self.function.name);
        self.fold(handle).instrument(span).await
    }

    /// As [`Aggregator::run_aggregation`], abandoning the run after `timeout`
    pub async fn run_aggregation_with_timeout(
        &self,
        handle: QueryHandle,
        timeout: Duration,
    ) -> QueryResult<AggregateResult> {
        match tokio::time::timeout(timeout, self.run_aggregation(handle)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Aggregation abandoned after {:?}", timeout);
                Err(QueryError::Timeout(timeout))
            }
        }
    }

    async fn fold(&self, mut handle: QueryHandle) -> QueryResult<AggregateResult> {
        let start = Instant::now();
        let mut acc = GroupAccumulator::new(self.function.reduce);
        let mut records = 0u64;
        let mut partials = 0u64;

        while let Some(item) = handle.next().await {
            match item.map_err(QueryError::Stream)? {
                ScanItem::Record(record) => {
                    records += 1;
                    if let Some((key, contribution)) = self.function.map(&record) {
                        acc.add(key, contribution);
                    }
                }
                ScanItem::Partial(partial) => {
                    partials += 1;
                    tracing::debug!(
                        "Merging partition {} ({} groups)",
                        partial.partition,
                        partial.groups.len()
                    );
                    acc.merge_partial(partial);
                }
            }
        }

        let result = acc.finalize();
        tracing::info!(
            "Aggregated {} groups from {} records and {} partials in {}ms",
            result.len(),
            records,
            partials,
            start.elapsed().as_millis()
        );
        Ok(result)
    }
}
