//! Stationfeed GBFS - station information feed to CSV
//!
//! Reads the `data.stations` array of a GBFS `station_information` feed,
//! keeps small stations and delivers them as one CSV artifact, skipping the
//! download while the feed's ETag is unchanged.

pub mod config;
pub mod feed;
pub mod runner;
pub mod schema;
pub mod station;
pub mod stats;
pub mod transform;

// Re-exports
pub use config::Config;
pub use feed::{for_each_station, parse_stations};
pub use runner::{RefreshOutcome, Refresher};
pub use schema::{CSV_COLUMNS, SENTINEL, csv_header};
pub use station::{RawStation, StationRow};
pub use stats::RunStats;
pub use transform::FilterRenameStage;
