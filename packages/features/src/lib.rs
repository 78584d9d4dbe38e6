#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Feature table construction for pothole repair duration models.
//!
//! [`pipeline::FeaturePipeline`] drives the whole run: cleaning,
//! geocoding through an injected resolver, spatial joins, temporal
//! aggregation, reference lookups, derived features and target labels.
//! The result is one row per surviving record with an explicit missing
//! marker in every cell that has no data.

pub mod builder;
pub mod config;
pub mod derived;
pub mod export;
pub mod pipeline;
pub mod reference;
pub mod target;

use thiserror::Error;

pub use config::PipelineConfig;
pub use pipeline::{FeaturePipeline, PipelineOutput, ReferenceData};

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum FeatureError {
    /// The configuration is malformed or out of range.
    #[error("Invalid configuration: {message}")]
    Config {
        /// What is wrong with it.
        message: String,
    },

    /// Schema violation in the raw input.
    #[error(transparent)]
    Clean(#[from] pothole_clean::CleanError),

    /// The geocoding checkpoint could not be read or written.
    #[error(transparent)]
    Checkpoint(#[from] pothole_geocoder::checkpoint::CheckpointError),

    /// A geometry file is not a usable `GeoJSON` feature collection.
    #[error(transparent)]
    Spatial(#[from] pothole_spatial::SpatialError),

    /// A reference table could not be loaded.
    #[error(transparent)]
    Enrich(#[from] pothole_enrich::EnrichError),

    /// Required or selected columns that the table does not have.
    #[error("Unknown feature column(s): {}", names.join(", "))]
    UnknownColumns {
        /// The unknown names.
        names: Vec<String>,
    },

    /// CSV write failure.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
