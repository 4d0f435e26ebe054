//! Streaming aggregation
//!
//! - **function**: map/reduce pairs (`AggregateFunction`) and the built-in
//!   late-flights-by-airline function
//! - **accumulator**: `GroupAccumulator` and the finalized `AggregateResult`
//! - **executor**: `Aggregator`, which folds a query result stream
//!
//! # Example
//!
//! ```rust,ignore
//! let aggregator = Aggregator::new(late_flights_by_airline(15));
//! let handle = planner.execute(&query).await?;
//! let result = aggregator.run_aggregation(handle).await?;
//!
//! for (carrier, stats) in result.iter() {
//!     println!("{}: {} {} {}%", carrier, stats.total, stats.late, stats.percent);
//! }
//! ```

mod accumulator;
mod executor;
mod function;

pub use accumulator::{late_percent, AggregateResult, GroupAccumulator, GroupStats};
pub use executor::Aggregator;
pub use function::{
    late_flights_by_airline, AggregateFunction, Contribution, GroupKey, MapFn, ReduceFn,
    DEFAULT_LATE_THRESHOLD_MINUTES, DEFAULT_MODULE, LATE_FLIGHTS_BY_AIRLINE,
};
