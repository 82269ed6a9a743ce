//! Telemetry normalization pipeline
//!
//! Raw records from a feed pass through three stages on the consumer
//! side, always in this order:
//! - parsing (`LineParser` / `TelemetryPayload`), which either yields a
//!   complete `Reading` or rejects the record outright,
//! - reconciliation (`reconcile_tds`), which blends the reported TDS
//!   with the EC-derived value under the current conversion factor,
//! - history buffering (`History`), fixed capacity, index aligned
//!   across metrics.
//!
//! Nothing in this module does I/O; the feeds produce raw records and
//! the export module writes buffered history out on demand.

mod export;
mod history;
mod parser;
mod reading;
mod reconcile;

pub use export::{write_csv, write_csv_path, CSV_HEADER};
pub use history::{
    History, HistoryRow, RingBuffer, UsageHistory, DEFAULT_CAPACITY, DEFAULT_USAGE_CAPACITY,
};
pub use parser::{LineParser, StatusNotice, TelemetryPayload};
pub use reading::{Reading, WaterLevel};
pub use reconcile::{reconcile_tds, ConversionFactor};
