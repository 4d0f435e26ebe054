//! Map/reduce function pairs
//!
//! An [`AggregateFunction`] is what the store runs per partition when a
//! statement names it: `map` turns one record into a keyed contribution,
//! `reduce` combines two contributions for the same key. `reduce` must be
//! associative and commutative; partitions are folded independently and
//! merged in arbitrary order.

use crate::store::FlightRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Module name under which the built-in functions are registered
pub const DEFAULT_MODULE: &str = "simple_aggregation";

/// Name of the late-flights-by-airline function
pub const LATE_FLIGHTS_BY_AIRLINE: &str = "late_flights_by_airline";

/// Default lateness threshold in minutes
pub const DEFAULT_LATE_THRESHOLD_MINUTES: i64 = 15;

/// Grouping dimension
pub type GroupKey = String;

/// Per-record mapping, `None` drops the record from the fold
pub type MapFn = Arc<dyn Fn(&FlightRecord) -> Option<(GroupKey, Contribution)> + Send + Sync>;

/// Combines two contributions for the same key
pub type ReduceFn = fn(Contribution, Contribution) -> Contribution;

/// Partial flight counts for one group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub total: u64,
    pub late: u64,
}

impl Contribution {
    /// Contribution of a single flight
    pub fn single(late: bool) -> Self {
        Self {
            total: 1,
            late: u64::from(late),
        }
    }

    /// Component-wise sum
    pub fn merge(self, other: Contribution) -> Contribution {
        Contribution {
            total: self.total.saturating_add(other.total),
            late: self.late.saturating_add(other.late),
        }
    }
}

/// A named map/reduce pair callable by the store
#[derive(Clone)]
pub struct AggregateFunction {
    pub module: String,
    pub name: String,
    pub map: MapFn,
    pub reduce: ReduceFn,
}

impl AggregateFunction {
    pub fn new(
        module: impl Into<String>,
        name: impl Into<String>,
        map: MapFn,
        reduce: ReduceFn,
    ) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
            map,
            reduce,
        }
    }

    /// Apply the map half to one record
    pub fn map(&self, record: &FlightRecord) -> Option<(GroupKey, Contribution)> {
        (self.map)(record)
    }

    /// Apply the reduce half to two contributions
    pub fn reduce(&self, a: Contribution, b: Contribution) -> Contribution {
        (self.reduce)(a, b)
    }
}

impl fmt::Debug for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateFunction")
            .field("module", &self.module)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Counts flights and late flights per carrier
///
/// A flight is late when its arrival delay exceeds `threshold_minutes`.
/// Flights without an actual arrival time count as on time.
pub fn late_flights_by_airline(threshold_minutes: i64) -> AggregateFunction {
    let map: MapFn = Arc::new(move |record: &FlightRecord| {
        let late = record
            .arrival_delay()
            .map(|delay| delay > threshold_minutes)
            .unwrap_or(false);
        Some((record.carrier.clone(), Contribution::single(late)))
    });

    AggregateFunction::new(
        DEFAULT_MODULE,
        LATE_FLIGHTS_BY_AIRLINE,
        map,
        Contribution::merge,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::fixtures::{date, flight};

    #[test]
    fn test_map_classifies_late_flights() {
        let function = late_flights_by_airline(15);

        let (key, c) = function
            .map(&flight("1", date(2012, 1, 15), "AA", Some(736)))
            .unwrap();
        assert_eq!(key, "AA");
        assert_eq!(c, Contribution { total: 1, late: 1 });

        // exactly at the threshold is not late
        let (_, c) = function
            .map(&flight("2", date(2012, 1, 15), "AA", Some(735)))
            .unwrap();
        assert_eq!(c.late, 0);

        let (_, c) = function
            .map(&flight("3", date(2012, 1, 15), "UA", None))
            .unwrap();
        assert_eq!(c, Contribution { total: 1, late: 0 });
    }

    #[test]
    fn test_reduce_sums_components() {
        let function = late_flights_by_airline(15);
        let a = Contribution { total: 3, late: 1 };
        let b = Contribution { total: 2, late: 2 };
        assert_eq!(function.reduce(a, b), Contribution { total: 5, late: 3 });
        assert_eq!(function.reduce(a, b), function.reduce(b, a));
    }

    #[test]
    fn test_reduce_is_associative() {
        let a = Contribution { total: 7, late: 2 };
        let b = Contribution { total: 1, late: 1 };
        let c = Contribution { total: 4, late: 0 };
        assert_eq!(a.merge(b).merge(c), a.merge(b.merge(c)));
    }

    #[test]
    fn test_merge_saturates() {
        let a = Contribution {
            total: u64::MAX,
            late: 1,
        };
        let merged = a.merge(Contribution::single(true));
        assert_eq!(merged.total, u64::MAX);
        assert_eq!(merged.late, 2);
    }
}
