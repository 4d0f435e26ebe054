//! Flight line parsing
//!
//! Column order (0-based):
//!
//! ```text
//!  0 id              7 origin airport id   14 scheduled departure
//!  1 year            8 origin              15 scheduled arrival
//!  2 day of month    9 origin city         16 elapsed time
//!  3 date yyyy/MM/dd 10 origin state       17 air time
//!  4 airline id      11 destination        18 distance
//!  5 carrier         12 destination city   19 actual departure (optional)
//!  6 flight number   13 destination state  20 actual arrival (optional)
//! ```

use crate::ingest::error::FieldError;
use crate::store::{day_timestamp, FlightRecord};
use chrono::NaiveDate;
use csv::StringRecord;

/// Columns every line must have
pub const REQUIRED_COLUMNS: usize = 19;

/// Format of the flight date column
pub const FLIGHT_DATE_FORMAT: &str = "%Y/%m/%d";

/// Largest clock time accepted in a time column
pub const MAX_CLOCK_TIME: i64 = 2400;

const ACTUAL_DEP_TIME: usize = 19;
const ACTUAL_ARR_TIME: usize = 20;

/// Parse one CSV row into a flight record
pub fn parse_flight(row: &StringRecord) -> Result<FlightRecord, FieldError> {
    if row.len() < REQUIRED_COLUMNS {
        return Err(FieldError::MissingColumns {
            expected: REQUIRED_COLUMNS,
            found: row.len(),
        });
    }

    let text = |idx: usize| row.get(idx).unwrap_or("").trim();
    let required = |idx: usize, column: &'static str| {
        let value = text(idx);
        if value.is_empty() {
            Err(FieldError::Empty { column })
        } else {
            Ok(value.to_string())
        }
    };
    let int = |idx: usize, column: &'static str| {
        let value = text(idx);
        value.parse::<i64>().map_err(|_| FieldError::InvalidNumber {
            column,
            value: value.to_string(),
        })
    };
    let clock = |idx: usize, column: &'static str| -> Result<i64, FieldError> {
        let value = int(idx, column)?;
        if (0..=MAX_CLOCK_TIME).contains(&value) {
            Ok(value)
        } else {
            Err(FieldError::OutOfRange { column, value })
        }
    };
    let optional_clock = |idx: usize, column: &'static str| match text(idx) {
        "" => Ok(None),
        _ => clock(idx, column).map(Some),
    };

    let date = NaiveDate::parse_from_str(text(3), FLIGHT_DATE_FORMAT)
        .map_err(|_| FieldError::InvalidDate(text(3).to_string()))?;

    Ok(FlightRecord {
        id: required(0, "id")?,
        year: int(1, "year")?,
        day_of_month: int(2, "day of month")?,
        fl_date: day_timestamp(date),
        airline_id: int(4, "airline id")?,
        carrier: required(5, "carrier")?,
        fl_num: int(6, "flight number")?,
        origin_airport_id: int(7, "origin airport id")?,
        origin: text(8).to_string(),
        origin_city: text(9).to_string(),
        origin_state: text(10).to_string(),
        dest: text(11).to_string(),
        dest_city: text(12).to_string(),
        dest_state: text(13).to_string(),
        dep_time: clock(14, "scheduled departure")?,
        arr_time: clock(15, "scheduled arrival")?,
        elapsed_time: int(16, "elapsed time")?,
        air_time: int(17, "air time")?,
        distance: int(18, "distance")?,
        actual_dep_time: optional_clock(ACTUAL_DEP_TIME, "actual departure")?,
        actual_arr_time: optional_clock(ACTUAL_ARR_TIME, "actual arrival")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(line: &str) -> StringRecord {
        StringRecord::from(line.split(',').collect::<Vec<_>>())
    }

    const LINE: &str =
        "42,2012,15,2012/01/15,19805,AA,1,12478,JFK,New York,NY,LAX,Los Angeles,CA,540,720,360,330,2475";

    #[test]
    fn test_parse_required_columns() {
        let flight = parse_flight(&row(LINE)).unwrap();

        assert_eq!(flight.id, "42");
        assert_eq!(flight.year, 2012);
        assert_eq!(flight.day_of_month, 15);
        assert_eq!(flight.fl_date, 1_326_585_600);
        assert_eq!(flight.carrier, "AA");
        assert_eq!(flight.origin, "JFK");
        assert_eq!(flight.dest_city, "Los Angeles");
        assert_eq!(flight.arr_time, 720);
        assert_eq!(flight.distance, 2475);
        assert_eq!(flight.actual_dep_time, None);
        assert_eq!(flight.actual_arr_time, None);
    }

    #[test]
    fn test_parse_optional_actual_times() {
        let flight = parse_flight(&row(&format!("{},545,741", LINE))).unwrap();
        assert_eq!(flight.actual_dep_time, Some(545));
        assert_eq!(flight.actual_arr_time, Some(741));
        assert_eq!(flight.arrival_delay(), Some(21));

        let flight = parse_flight(&row(&format!("{},,741", LINE))).unwrap();
        assert_eq!(flight.actual_dep_time, None);
        assert_eq!(flight.actual_arr_time, Some(741));
    }

    #[test]
    fn test_fields_are_trimmed() {
        let padded = " 42 , 2012,15, 2012/01/15 ,19805, AA ,1,12478,JFK,New York,NY,LAX,Los Angeles,CA, 540,720,360,330,2475 ";
        let flight = parse_flight(&row(padded)).unwrap();
        assert_eq!(flight.id, "42");
        assert_eq!(flight.carrier, "AA");
        assert_eq!(flight.dep_time, 540);
        assert_eq!(flight.distance, 2475);
    }

    #[test]
    fn test_non_numeric_field() {
        let line = LINE.replace(",2475", ",far");
        assert_eq!(
            parse_flight(&row(&line)),
            Err(FieldError::InvalidNumber {
                column: "distance",
                value: "far".to_string()
            })
        );
    }

    #[test]
    fn test_invalid_date() {
        let line = LINE.replace("2012/01/15", "2012/02/30");
        assert_eq!(
            parse_flight(&row(&line)),
            Err(FieldError::InvalidDate("2012/02/30".to_string()))
        );

        let line = LINE.replace("2012/01/15", "2012-01-15");
        assert!(matches!(
            parse_flight(&row(&line)),
            Err(FieldError::InvalidDate(_))
        ));
    }

    #[test]
    fn test_clock_times_out_of_range() {
        let line = LINE.replace(",540,720,", ",540,-5,");
        assert_eq!(
            parse_flight(&row(&line)),
            Err(FieldError::OutOfRange {
                column: "scheduled arrival",
                value: -5
            })
        );

        let line = format!("{},545,9223372036854775807", LINE);
        assert_eq!(
            parse_flight(&row(&line)),
            Err(FieldError::OutOfRange {
                column: "actual arrival",
                value: i64::MAX
            })
        );

        let line = format!("{},0,2400", LINE);
        let flight = parse_flight(&row(&line)).unwrap();
        assert_eq!(flight.actual_dep_time, Some(0));
        assert_eq!(flight.actual_arr_time, Some(2400));
    }

    #[test]
    fn test_missing_columns() {
        assert_eq!(
            parse_flight(&row("42,2012,15")),
            Err(FieldError::MissingColumns {
                expected: 19,
                found: 3
            })
        );
    }

    #[test]
    fn test_empty_id() {
        let line = LINE.replacen("42", "", 1);
        assert_eq!(
            parse_flight(&row(&line)),
            Err(FieldError::Empty { column: "id" })
        );
    }
}
