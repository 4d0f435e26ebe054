//! Flight file ingestion
//!
//! - **parser**: one CSV row → `FlightRecord`
//! - **loader**: files and directories → record store
//! - **error**: ingestion error types
//!
//! Malformed lines are skipped and reported in the [`LoadSummary`] unless
//! the loader runs in strict mode, where the first one aborts the load.

mod error;
mod loader;
mod parser;

pub use error::{FieldError, IngestError, IngestResult};
pub use loader::{IngestionLoader, LoadSummary, ParseFailure};
pub use parser::{parse_flight, FLIGHT_DATE_FORMAT, MAX_CLOCK_TIME, REQUIRED_COLUMNS};
