//! Loading reference data from files.

use std::path::Path;

use chrono::NaiveDate;
use pothole_enrich::lookup::{LookupTable, normalize_geoid, read_weather};
use pothole_spatial::load::{load_regions, load_street_segments};
use pothole_spatial::{RegionIndex, StreetIndex};

use crate::FeatureError;
use crate::config::PipelineConfig;

/// Which region set a file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionSet {
    Neighborhoods,
    BlockGroups,
}

/// Loads a `GeoJSON` region file into an R-tree index, taking region ids
/// from the configured property.
///
/// # Errors
///
/// Returns [`FeatureError`] if the file cannot be read or is not a
/// `FeatureCollection`.
pub fn load_region_index(
    path: &Path,
    set: RegionSet,
    config: &PipelineConfig,
) -> Result<RegionIndex, FeatureError> {
    let id_property = match set {
        RegionSet::Neighborhoods => config.reference.neighborhood_id_property.as_deref(),
        RegionSet::BlockGroups => config.reference.block_group_id_property.as_deref(),
    };
    let text = std::fs::read_to_string(path)?;
    let regions = load_regions(&text, id_property)?;
    log::info!("{set:?}: {} regions from {}", regions.len(), path.display());
    Ok(RegionIndex::new(regions))
}

/// Loads the street network `GeoJSON` into an R-tree index.
///
/// # Errors
///
/// Returns [`FeatureError`] if the file cannot be read or is not a
/// `FeatureCollection`.
pub fn load_street_index(path: &Path, config: &PipelineConfig) -> Result<StreetIndex, FeatureError> {
    let text = std::fs::read_to_string(path)?;
    let segments = load_street_segments(&text, &config.reference.street_fields)?;
    Ok(StreetIndex::new(segments))
}

/// Loads a census CSV keyed by zero-padded block-group GEOID. The table is
/// named after the file stem.
///
/// # Errors
///
/// Returns [`FeatureError`] if the file cannot be read or lacks the key
/// column.
pub fn load_census_table(path: &Path, config: &PipelineConfig) -> Result<LookupTable<String>, FeatureError> {
    let name = table_name(path);
    let width = config.lookups.geoid_width;
    let file = std::fs::File::open(path)?;
    let table = LookupTable::from_csv_reader(
        &name,
        file,
        &config.reference.census_key_column,
        None,
        |raw| normalize_geoid(raw, width),
    )?;
    Ok(table)
}

/// Loads weather observations and aggregates them to daily means.
///
/// # Errors
///
/// Returns [`FeatureError`] if the file cannot be read or lacks a
/// configured column.
pub fn load_weather_table(path: &Path, config: &PipelineConfig) -> Result<LookupTable<NaiveDate>, FeatureError> {
    let file = std::fs::File::open(path)?;
    let table = read_weather(
        &table_name(path),
        file,
        &config.reference.weather_date_column,
        &config.reference.weather_columns,
    )?;
    Ok(table)
}

fn table_name(path: &Path) -> String {
    path.file_stem()
        .map_or_else(|| "lookup".to_string(), |stem| stem.to_string_lossy().into_owned())
}
