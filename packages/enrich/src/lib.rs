#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Enrichment stages for cleaned pothole work orders.
//!
//! Each stage is a pure function from the record set to per-record (or
//! per-date) values keyed by a stable identifier, never by row position:
//!
//! - [`spatial_join`]: neighborhood, block-group and nearest-street labels
//!   keyed by record id
//! - [`temporal`]: concurrent-open and same-day counts keyed by date
//! - [`lookup`]: left joins against census and weather reference tables

pub mod lookup;
pub mod spatial_join;
pub mod temporal;

use thiserror::Error;

/// Errors from loading reference tables.
#[derive(Debug, Error)]
pub enum EnrichError {
    /// CSV read failure.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A column the table was configured with is absent from the header.
    #[error("Lookup table '{table}' has no column '{column}'")]
    MissingColumn {
        /// Name of the reference table.
        table: String,
        /// Name of the missing column.
        column: String,
    },
}
