//! Assembly of the model-ready feature table.
//!
//! Every enrichment result arrives keyed by record id (or by date for the
//! temporal counts), so the builder never relies on row order. Columns are
//! declared once, with their type and provenance, and every row fills them
//! in the same order.

use std::collections::BTreeMap;

use chrono::Datelike as _;
use pothole_enrich::lookup::LookupJoin;
use pothole_enrich::temporal::DailyCounts;
use pothole_features_models::{
    Cell, CategoricalCell, ColumnSource, ColumnSpec, FeatureRow, FeatureTable, StageReport,
};
use pothole_record_models::{Record, STREET_ATTRIBUTE_NAMES, SpatialLabel, StreetMatch};

use crate::FeatureError;
use crate::config::PipelineConfig;
use crate::derived::{
    days_to_fiscal_year_end, landmark_column, landmark_distances, min_distance, quarter,
};
use crate::target::{below_cutoff, exceeds_threshold, percentile};

/// Everything the builder joins onto the cleaned records.
#[derive(Debug, Clone, Copy)]
pub struct FeatureInputs<'a> {
    /// Cleaned (and possibly geocoded) records.
    pub records: &'a [Record],
    pub neighborhoods: &'a BTreeMap<i64, SpatialLabel>,
    pub block_groups: &'a BTreeMap<i64, SpatialLabel>,
    pub streets: &'a BTreeMap<i64, StreetMatch>,
    /// Concurrent-open counts by start date.
    pub concurrent: &'a DailyCounts,
    /// Initiated-per-day counts by start date.
    pub daily: &'a DailyCounts,
    pub lookups: &'a [LookupJoin],
}

/// The built table plus its stage counts.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltTable {
    pub table: FeatureTable,
    pub report: StageReport,
    /// Duration cutoff used for the auxiliary label, in days.
    pub percentile_cutoff_days: Option<f64>,
}

/// Output columns in declaration order.
#[must_use]
pub fn feature_columns(config: &PipelineConfig, lookups: &[LookupJoin]) -> Vec<ColumnSpec> {
    let mut columns = vec![
        ColumnSpec::categorical("work_order_key", ColumnSource::Record),
        ColumnSpec::categorical("start_date", ColumnSource::Record),
        ColumnSpec::numeric("duration_days", ColumnSource::Record),
        ColumnSpec::numeric("duration_whole_days", ColumnSource::Record),
        ColumnSpec::numeric("latitude", ColumnSource::Geocode),
        ColumnSpec::numeric("longitude", ColumnSource::Geocode),
        ColumnSpec::categorical("resolved_address", ColumnSource::Geocode),
        ColumnSpec::categorical("neighborhood", ColumnSource::NeighborhoodJoin),
        ColumnSpec::categorical("block_group", ColumnSource::BlockGroupJoin),
    ];

    columns.extend(
        STREET_ATTRIBUTE_NAMES
            .iter()
            .map(|name| ColumnSpec::categorical(*name, ColumnSource::StreetJoin)),
    );
    columns.push(ColumnSpec::numeric("street_distance", ColumnSource::StreetJoin));

    columns.push(ColumnSpec::numeric("concurrent_open", ColumnSource::Temporal));
    columns.push(ColumnSpec::numeric("daily_initiated", ColumnSource::Temporal));

    for join in lookups {
        columns.extend(join.columns.iter().map(|column| {
            ColumnSpec::numeric(
                format!("{}_{column}", join.table),
                ColumnSource::Lookup(join.table.clone()),
            )
        }));
    }

    columns.extend(
        config
            .landmarks
            .iter()
            .map(|l| ColumnSpec::numeric(landmark_column(l), ColumnSource::Derived)),
    );
    columns.extend([
        ColumnSpec::numeric("min_landmark_dist", ColumnSource::Derived),
        ColumnSpec::categorical("init_quarter", ColumnSource::Derived),
        ColumnSpec::categorical("init_month", ColumnSource::Derived),
        ColumnSpec::numeric("days_to_fy_end", ColumnSource::Derived),
        ColumnSpec::numeric("exceeds_threshold", ColumnSource::Target),
        ColumnSpec::numeric("below_percentile", ColumnSource::Target),
    ]);

    columns
}

fn region_cell(label: Option<&SpatialLabel>) -> Cell {
    Cell::Categorical(match label {
        Some(SpatialLabel::Region(id)) => CategoricalCell::Value(id.clone()),
        Some(SpatialLabel::NotFound) => CategoricalCell::NotFound,
        Some(SpatialLabel::Unknown) | None => CategoricalCell::Missing,
    })
}

#[allow(clippy::cast_precision_loss)]
fn count_cell(value: i64) -> Cell {
    Cell::Numeric(Some(value as f64))
}

fn row_cells(
    record: &Record,
    inputs: &FeatureInputs<'_>,
    config: &PipelineConfig,
    cutoff_days: Option<f64>,
) -> Vec<Cell> {
    let id = record.object_id;
    let start = record.start_date();
    let duration_days = record.duration_days();
    let coordinates = record.coordinates;

    let mut cells = vec![
        Cell::Categorical(CategoricalCell::Value(record.work_order_key.clone())),
        Cell::Categorical(CategoricalCell::Value(start.to_string())),
        Cell::Numeric(Some(duration_days)),
        count_cell(record.duration_whole_days()),
        Cell::Numeric(coordinates.map(|c| c.latitude)),
        Cell::Numeric(coordinates.map(|c| c.longitude)),
        Cell::Categorical(CategoricalCell::from_option(record.resolved_address.as_deref())),
        region_cell(inputs.neighborhoods.get(&id)),
        region_cell(inputs.block_groups.get(&id)),
    ];

    let street = inputs.streets.get(&id);
    let attributes = street.and_then(StreetMatch::attributes);
    cells.extend(attributes.map_or_else(
        || vec![Cell::Categorical(CategoricalCell::Missing); STREET_ATTRIBUTE_NAMES.len()],
        |attributes| {
            attributes
                .named()
                .iter()
                .map(|(_, value)| Cell::Categorical(CategoricalCell::from_option(*value)))
                .collect()
        },
    ));
    cells.push(Cell::Numeric(match street {
        Some(StreetMatch::Matched { distance, .. }) => Some(*distance),
        _ => None,
    }));

    cells.push(count_cell(i64::from(inputs.concurrent.get(start))));
    cells.push(count_cell(i64::from(inputs.daily.get(start))));

    for join in inputs.lookups {
        cells.extend(join.values(id).into_iter().map(Cell::Numeric));
    }

    let distances = coordinates.map(|c| landmark_distances(c, &config.landmarks));
    match &distances {
        Some(distances) => cells.extend(distances.iter().map(|d| Cell::Numeric(Some(*d)))),
        None => cells.extend(config.landmarks.iter().map(|_| Cell::Numeric(None))),
    }
    cells.push(Cell::Numeric(distances.as_deref().and_then(min_distance)));

    cells.push(Cell::Categorical(CategoricalCell::Value(quarter(start).to_string())));
    cells.push(Cell::Categorical(CategoricalCell::Value(start.month().to_string())));
    cells.push(count_cell(days_to_fiscal_year_end(start, config.calendar)));

    cells.push(Cell::Numeric(Some(f64::from(exceeds_threshold(
        duration_days,
        config.target.threshold_days,
    )))));
    cells.push(Cell::Numeric(
        cutoff_days.map(|cutoff| f64::from(below_cutoff(duration_days, cutoff))),
    ));

    cells
}

/// Builds the feature table.
///
/// Rows missing any required feature are dropped and counted per feature.
/// The auxiliary percentile label uses the duration distribution of every
/// input record.
///
/// # Errors
///
/// Returns [`FeatureError::UnknownColumns`] if a required feature or an
/// output column does not exist.
pub fn build(inputs: &FeatureInputs<'_>, config: &PipelineConfig) -> Result<BuiltTable, FeatureError> {
    let columns = feature_columns(config, inputs.lookups);

    let required: Vec<(usize, &str)> = config
        .required_features
        .iter()
        .map(|name| {
            columns
                .iter()
                .position(|c| &c.name == name)
                .map(|i| (i, name.as_str()))
                .ok_or_else(|| name.clone())
        })
        .collect::<Result<_, _>>()
        .map_err(|name| FeatureError::UnknownColumns { names: vec![name] })?;

    let durations: Vec<f64> = inputs.records.iter().map(Record::duration_days).collect();
    let cutoff_days = percentile(&durations, config.target.percentile);
    if let Some(cutoff) = cutoff_days {
        log::info!(
            "Duration p{}: {cutoff:.3} days over {} records",
            config.target.percentile,
            durations.len()
        );
    }

    let mut rows = Vec::with_capacity(inputs.records.len());
    let mut dropped: BTreeMap<String, usize> = BTreeMap::new();

    for record in inputs.records {
        let cells = row_cells(record, inputs, config, cutoff_days);
        if let Some((_, feature)) = required.iter().find(|(i, _)| !cells[*i].is_present()) {
            log::debug!("Dropping record {}: missing {feature}", record.object_id);
            *dropped.entry(format!("missing_{feature}")).or_insert(0) += 1;
            continue;
        }
        rows.push(FeatureRow {
            object_id: record.object_id,
            cells,
        });
    }

    let mut report = StageReport::new("build", inputs.records.len(), rows.len());
    for (reason, count) in dropped {
        log::info!("Dropped {count} rows ({reason})");
        report = report.with_dropped(reason, count);
    }

    let mut table = FeatureTable { columns, rows };
    if let Some(selected) = &config.output_columns {
        table
            .select(selected)
            .map_err(|names| FeatureError::UnknownColumns { names })?;
    }

    log::info!(
        "Feature table: {} rows x {} columns",
        table.len(),
        table.columns.len()
    );

    Ok(BuiltTable {
        table,
        report,
        percentile_cutoff_days: cutoff_days,
    })
}
