//! Core data types for the flight record store
//!
//! - `FlightRecord`: one ingested flight row
//! - `Key`: namespace / set / user key address of a record
//! - `Statement`: an index range scan, optionally with an aggregate function call
//! - `bins`: names of the numeric bins an index can be built on

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Seconds in one day, the granularity of the flight date bin
pub const SECONDS_PER_DAY: i64 = 86_400;

const MINUTES_PER_DAY: i64 = 1_440;

/// Numeric bin names exposed by [`FlightRecord::numeric_bin`]
pub mod bins {
    pub const FL_DATE: &str = "fl_date";
    pub const YEAR: &str = "year";
    pub const DAY_OF_MONTH: &str = "day_of_month";
    pub const AIRLINE_ID: &str = "airline_id";
    pub const FL_NUM: &str = "fl_num";
    pub const ORI_AIRPORT_ID: &str = "ori_airport_id";
    pub const DEP_TIME: &str = "dep_time";
    pub const ARR_TIME: &str = "arr_time";
    pub const ELAPSED_TIME: &str = "elapsed_time";
    pub const AIR_TIME: &str = "air_time";
    pub const DISTANCE: &str = "distance";
    pub const ACTUAL_DEP_TIME: &str = "actual_dep_time";
    pub const ACTUAL_ARR_TIME: &str = "actual_arr_time";
}

/// A single flight
///
/// Times of day are minutes since midnight. `fl_date` is the Unix timestamp
/// (seconds) of the flight date at 00:00 UTC.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlightRecord {
    pub id: String,
    pub year: i64,
    pub day_of_month: i64,
    pub fl_date: i64,
    pub airline_id: i64,
    pub carrier: String,
    pub fl_num: i64,
    pub origin_airport_id: i64,
    pub origin: String,
    pub origin_city: String,
    pub origin_state: String,
    pub dest: String,
    pub dest_city: String,
    pub dest_state: String,
    pub dep_time: i64,
    pub arr_time: i64,
    pub elapsed_time: i64,
    pub air_time: i64,
    pub distance: i64,
    #[serde(default)]
    pub actual_dep_time: Option<i64>,
    #[serde(default)]
    pub actual_arr_time: Option<i64>,
}

impl FlightRecord {
    /// Value of a numeric bin, `None` for unknown bins or unset optional times
    pub fn numeric_bin(&self, bin: &str) -> Option<i64> {
        match bin {
            bins::FL_DATE => Some(self.fl_date),
            bins::YEAR => Some(self.year),
            bins::DAY_OF_MONTH => Some(self.day_of_month),
            bins::AIRLINE_ID => Some(self.airline_id),
            bins::FL_NUM => Some(self.fl_num),
            bins::ORI_AIRPORT_ID => Some(self.origin_airport_id),
            bins::DEP_TIME => Some(self.dep_time),
            bins::ARR_TIME => Some(self.arr_time),
            bins::ELAPSED_TIME => Some(self.elapsed_time),
            bins::AIR_TIME => Some(self.air_time),
            bins::DISTANCE => Some(self.distance),
            bins::ACTUAL_DEP_TIME => self.actual_dep_time,
            bins::ACTUAL_ARR_TIME => self.actual_arr_time,
            _ => None,
        }
    }

    /// Arrival delay in minutes, wrapped across midnight into `[-720, 720)`
    ///
    /// `None` when the actual arrival time is unknown.
    pub fn arrival_delay(&self) -> Option<i64> {
        let actual = self.actual_arr_time?;
        let delay = actual.wrapping_sub(self.arr_time).rem_euclid(MINUTES_PER_DAY);
        if delay >= MINUTES_PER_DAY / 2 {
            Some(delay - MINUTES_PER_DAY)
        } else {
            Some(delay)
        }
    }
}

/// Unix timestamp (seconds) of a calendar date at 00:00 UTC
pub fn day_timestamp(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

/// Address of a record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key {
    pub namespace: String,
    pub set_name: String,
    pub user_key: String,
}

impl Key {
    pub fn new(
        namespace: impl Into<String>,
        set_name: impl Into<String>,
        user_key: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            set_name: set_name.into(),
            user_key: user_key.into(),
        }
    }

    /// Partition owning this key
    pub fn partition(&self, partitions: u32) -> u32 {
        crc32fast::hash(self.user_key.as_bytes()) % partitions.max(1)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.namespace, self.set_name, self.user_key)
    }
}

/// Inclusive numeric range predicate on one bin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeFilter {
    pub bin: String,
    pub start: i64,
    pub end: i64,
}

impl RangeFilter {
    pub fn new(bin: impl Into<String>, start: i64, end: i64) -> Self {
        Self {
            bin: bin.into(),
            start,
            end,
        }
    }

    pub fn contains(&self, value: i64) -> bool {
        value >= self.start && value <= self.end
    }
}

/// Name of a registered aggregate function
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionCall {
    pub module: String,
    pub function: String,
}

impl FunctionCall {
    pub fn new(module: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            function: function.into(),
        }
    }
}

impl fmt::Display for FunctionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.function)
    }
}

/// A validated scan request submitted to the store
#[derive(Debug, Clone)]
pub struct Statement {
    pub namespace: String,
    pub set_name: String,
    pub index_name: String,
    pub filter: RangeFilter,
    /// Run this function server-side instead of returning raw records
    pub aggregate: Option<FunctionCall>,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// A flight with the given carrier, date and actual arrival
    pub fn flight(id: &str, date: NaiveDate, carrier: &str, actual_arr: Option<i64>) -> FlightRecord {
        FlightRecord {
            id: id.to_string(),
            year: 2012,
            day_of_month: 15,
            fl_date: day_timestamp(date),
            airline_id: 19805,
            carrier: carrier.to_string(),
            fl_num: 1,
            origin_airport_id: 12478,
            origin: "JFK".to_string(),
            origin_city: "New York".to_string(),
            origin_state: "NY".to_string(),
            dest: "LAX".to_string(),
            dest_city: "Los Angeles".to_string(),
            dest_state: "CA".to_string(),
            dep_time: 540,
            arr_time: 720,
            elapsed_time: 360,
            air_time: 330,
            distance: 2475,
            actual_dep_time: None,
            actual_arr_time: actual_arr,
        }
    }

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }
}
