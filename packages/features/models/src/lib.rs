#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Feature-table types: cells with explicit missing markers, column
//! provenance, and the per-stage run summary.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

/// Text written for a missing numeric cell.
pub const NUMERIC_MISSING: &str = "NaN";

/// A categorical value with two distinguishable missing states.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CategoricalCell {
    /// A concrete category.
    Value(String),
    /// The lookup ran and matched nothing (point outside every region).
    NotFound,
    /// No data to look up with (e.g. the record has no coordinates).
    Missing,
}

impl CategoricalCell {
    /// Wraps an optional value, mapping `None` to [`Self::Missing`].
    #[must_use]
    pub fn from_option(value: Option<&str>) -> Self {
        value.map_or(Self::Missing, |v| Self::Value(v.to_string()))
    }

    /// Whether the cell holds a concrete category.
    #[must_use]
    pub const fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    /// Encodes the cell for export. `NotFound` is the empty string;
    /// `Missing` becomes the `NO_<FEATURE>` category.
    #[must_use]
    pub fn encode(&self, feature: &str) -> String {
        match self {
            Self::Value(v) => v.clone(),
            Self::NotFound => String::new(),
            Self::Missing => missing_category(feature),
        }
    }
}

/// The explicit missing category for a feature: `NO_<FEATURE>`.
#[must_use]
pub fn missing_category(feature: &str) -> String {
    format!("NO_{}", feature.to_uppercase())
}

/// One cell of the feature table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    Numeric(Option<f64>),
    Categorical(CategoricalCell),
}

impl Cell {
    /// Whether the cell has a concrete value.
    #[must_use]
    pub const fn is_present(&self) -> bool {
        match self {
            Self::Numeric(v) => v.is_some(),
            Self::Categorical(c) => c.is_value(),
        }
    }

    /// Encodes the cell for export under the given column name.
    #[must_use]
    pub fn encode(&self, column: &str) -> String {
        match self {
            Self::Numeric(Some(v)) => v.to_string(),
            Self::Numeric(None) => NUMERIC_MISSING.to_string(),
            Self::Categorical(c) => c.encode(column),
        }
    }

    /// The numeric value, if this is a present numeric cell.
    #[must_use]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Numeric(v) => *v,
            Self::Categorical(_) => None,
        }
    }

    /// The category, if this is a present categorical cell.
    #[must_use]
    pub fn as_category(&self) -> Option<&str> {
        match self {
            Self::Categorical(CategoricalCell::Value(v)) => Some(v),
            _ => None,
        }
    }
}

/// Column type as consumed by modeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

/// The pipeline stage that produced a column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnSource {
    Record,
    Geocode,
    NeighborhoodJoin,
    BlockGroupJoin,
    StreetJoin,
    Temporal,
    /// A named external reference table.
    Lookup(String),
    Derived,
    Target,
}

impl fmt::Display for ColumnSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Record => f.write_str("record"),
            Self::Geocode => f.write_str("geocode"),
            Self::NeighborhoodJoin => f.write_str("neighborhood_join"),
            Self::BlockGroupJoin => f.write_str("block_group_join"),
            Self::StreetJoin => f.write_str("street_join"),
            Self::Temporal => f.write_str("temporal"),
            Self::Lookup(table) => write!(f, "lookup:{table}"),
            Self::Derived => f.write_str("derived"),
            Self::Target => f.write_str("target"),
        }
    }
}

/// Name, type and provenance of one output column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
    pub source: ColumnSource,
}

impl ColumnSpec {
    #[must_use]
    pub fn numeric(name: impl Into<String>, source: ColumnSource) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Numeric,
            source,
        }
    }

    #[must_use]
    pub fn categorical(name: impl Into<String>, source: ColumnSource) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Categorical,
            source,
        }
    }
}

/// One output row, keyed by record id. Cells align with the table's
/// columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub object_id: i64,
    pub cells: Vec<Cell>,
}

/// The model-ready feature table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    pub columns: Vec<ColumnSpec>,
    pub rows: Vec<FeatureRow>,
}

impl FeatureTable {
    /// Position of the named column.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// The cell for `object_id` in the named column.
    #[must_use]
    pub fn cell(&self, object_id: i64, column: &str) -> Option<&Cell> {
        let index = self.column_index(column)?;
        self.rows
            .iter()
            .find(|row| row.object_id == object_id)
            .and_then(|row| row.cells.get(index))
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keeps only the named columns, in the given order. Returns the
    /// names that do not exist instead of selecting anything.
    ///
    /// # Errors
    ///
    /// Returns the list of unknown column names.
    pub fn select(&mut self, names: &[String]) -> Result<(), Vec<String>> {
        let mut indexes = Vec::with_capacity(names.len());
        let mut unknown = Vec::new();
        for name in names {
            match self.column_index(name) {
                Some(i) => indexes.push(i),
                None => unknown.push(name.clone()),
            }
        }
        if !unknown.is_empty() {
            return Err(unknown);
        }

        self.columns = indexes.iter().map(|&i| self.columns[i].clone()).collect();
        for row in &mut self.rows {
            row.cells = indexes.iter().map(|&i| row.cells[i].clone()).collect();
        }
        Ok(())
    }
}

/// Input/output counts for one pipeline stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: String,
    pub input: usize,
    pub output: usize,
    /// Dropped records per reason.
    pub dropped: BTreeMap<String, usize>,
}

impl StageReport {
    #[must_use]
    pub fn new(stage: impl Into<String>, input: usize, output: usize) -> Self {
        Self {
            stage: stage.into(),
            input,
            output,
            dropped: BTreeMap::new(),
        }
    }

    /// Records a drop count; zero counts are ignored.
    #[must_use]
    pub fn with_dropped(mut self, reason: impl Into<String>, count: usize) -> Self {
        if count > 0 {
            *self.dropped.entry(reason.into()).or_insert(0) += count;
        }
        self
    }
}

/// Geocoding outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeocodeSummary {
    pub resolved: usize,
    pub permanent_failures: usize,
    pub deferred: usize,
    pub from_checkpoint: usize,
    pub quota_exhausted: bool,
}

/// Match/miss counts for one spatial join.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinSummary {
    pub matched: usize,
    pub not_found: usize,
    pub unknown: usize,
}

/// Everything counted during a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub stages: Vec<StageReport>,
    pub geocode: GeocodeSummary,
    /// Per join kind.
    pub joins: BTreeMap<String, JoinSummary>,
    /// Missed keys per lookup table.
    pub lookup_misses: BTreeMap<String, usize>,
    /// Threshold used for the auxiliary percentile label, in days.
    pub percentile_cutoff_days: Option<f64>,
}

impl RunSummary {
    /// The named stage's report.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == name)
    }

    /// Writes the summary to the log at `info`.
    pub fn log(&self) {
        log::info!("Run summary:");
        for stage in &self.stages {
            log::info!("  {}: {} -> {}", stage.stage, stage.input, stage.output);
            for (reason, count) in &stage.dropped {
                log::info!("    dropped {count} ({reason})");
            }
        }
        log::info!(
            "  geocode: {} resolved, {} failed, {} deferred, {} from checkpoint{}",
            self.geocode.resolved,
            self.geocode.permanent_failures,
            self.geocode.deferred,
            self.geocode.from_checkpoint,
            if self.geocode.quota_exhausted {
                " (quota exhausted)"
            } else {
                ""
            }
        );
        for (kind, join) in &self.joins {
            log::info!(
                "  {kind} join: {} matched, {} not found, {} unknown",
                join.matched,
                join.not_found,
                join.unknown
            );
        }
        for (table, missed) in &self.lookup_misses {
            log::info!("  lookup {table}: {missed} misses");
        }
    }
}
