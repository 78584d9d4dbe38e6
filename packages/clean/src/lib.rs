#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Input-boundary cleaning of raw pothole repair work orders.
//!
//! Turns raw export rows into canonical [`Record`]s through a chain of
//! independent filters:
//!
//! 1. parse mandatory fields (malformed rows are dropped and counted)
//! 2. keep only `COMPLETED` work orders
//! 3. keep only rows whose end is strictly after their start
//! 4. compute the duration and drop zero durations
//! 5. project onto the canonical field set
//!
//! Duplicate record identifiers abort the run: they mean the upstream
//! export broke its contract, not that one row is dirty.

pub mod parsing;
pub mod reader;

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr as _;

use chrono::{NaiveDateTime, TimeDelta};
use pothole_record_models::{RawRecord, Record, WorkOrderStatus};
use strum_macros::{AsRefStr, Display};
use thiserror::Error;

/// Errors that abort cleaning.
#[derive(Debug, Error)]
pub enum CleanError {
    /// One or more required columns are absent from the export header.
    #[error("Schema violation: missing required column(s): {columns}")]
    MissingColumns {
        /// Comma-separated list of the absent columns.
        columns: String,
    },

    /// Two rows share the same record identifier.
    #[error("Schema violation: duplicate record id {object_id}")]
    DuplicateRecordId {
        /// The repeated identifier.
        object_id: i64,
    },

    /// The CSV stream could not be read.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Why a row was dropped during cleaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum DropReason {
    /// Missing or unparseable identifier.
    MissingId,
    /// Missing or unparseable initiation timestamp.
    UnparseableStart,
    /// Missing or unparseable field-end timestamp.
    UnparseableEnd,
    /// Status other than `COMPLETED`.
    NotCompleted,
    /// End at or before start.
    EndNotAfterStart,
    /// Zero-length repair.
    ZeroDuration,
}

/// Per-run cleaning counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    /// Rows received.
    pub input: usize,
    /// Records that survived every filter.
    pub kept: usize,
    /// Dropped rows by reason.
    pub dropped: BTreeMap<DropReason, usize>,
}

impl CleanReport {
    fn drop(&mut self, reason: DropReason) {
        *self.dropped.entry(reason).or_insert(0) += 1;
    }

    /// Total rows dropped for any reason.
    #[must_use]
    pub fn total_dropped(&self) -> usize {
        self.dropped.values().sum()
    }
}

/// A row whose mandatory fields parsed, before the filter chain runs.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Parsed record identifier.
    pub object_id: i64,
    /// Work-order key, trimmed.
    pub work_order_key: String,
    /// Location text, trimmed.
    pub location: String,
    /// Address description, trimmed.
    pub address: String,
    /// `None` when the status is empty or not an exact known value.
    pub status: Option<WorkOrderStatus>,
    /// Interval start.
    pub initiated_at: NaiveDateTime,
    /// Optional field-start timestamp.
    pub field_start_at: Option<NaiveDateTime>,
    /// Interval end.
    pub field_end_at: NaiveDateTime,
    /// Set by [`with_duration`].
    pub duration: Option<TimeDelta>,
}

impl From<Record> for Candidate {
    fn from(record: Record) -> Self {
        Self {
            object_id: record.object_id,
            work_order_key: record.work_order_key,
            location: record.location,
            address: record.address,
            status: Some(WorkOrderStatus::Completed),
            initiated_at: record.initiated_at,
            field_start_at: record.field_start_at,
            field_end_at: record.field_end_at,
            duration: Some(record.duration),
        }
    }
}

/// Parses the mandatory fields of a raw row.
///
/// # Errors
///
/// Returns the [`DropReason`] describing the first malformed mandatory
/// field.
pub fn parse(raw: &RawRecord) -> Result<Candidate, DropReason> {
    let object_id = raw
        .object_id
        .as_deref()
        .and_then(parsing::parse_object_id)
        .ok_or(DropReason::MissingId)?;
    let initiated_at = raw
        .initiated_at
        .as_deref()
        .and_then(parsing::parse_timestamp)
        .ok_or(DropReason::UnparseableStart)?;
    let field_end_at = raw
        .field_end_at
        .as_deref()
        .and_then(parsing::parse_timestamp)
        .ok_or(DropReason::UnparseableEnd)?;

    Ok(Candidate {
        object_id,
        work_order_key: text(raw.work_order_key.as_deref()),
        location: text(raw.location.as_deref()),
        address: text(raw.address.as_deref()),
        status: raw
            .status
            .as_deref()
            .and_then(|s| WorkOrderStatus::from_str(s.trim()).ok()),
        initiated_at,
        field_start_at: raw
            .field_start_at
            .as_deref()
            .and_then(parsing::parse_timestamp),
        field_end_at,
        duration: None,
    })
}

fn text(value: Option<&str>) -> String {
    value.map(str::trim).unwrap_or_default().to_string()
}

/// Filter (a): the work order was completed.
#[must_use]
pub fn is_completed(candidate: &Candidate) -> bool {
    candidate.status == Some(WorkOrderStatus::Completed)
}

/// Filter (b): the field-end timestamp is strictly after initiation.
#[must_use]
pub fn ends_after_start(candidate: &Candidate) -> bool {
    candidate.initiated_at < candidate.field_end_at
}

/// Step (c): computes `duration = end - start`.
#[must_use]
pub fn with_duration(mut candidate: Candidate) -> Candidate {
    candidate.duration = Some(candidate.field_end_at - candidate.initiated_at);
    candidate
}

/// Filter (c): the computed duration is non-zero.
#[must_use]
pub fn has_nonzero_duration(candidate: &Candidate) -> bool {
    candidate.duration.is_some_and(|d| d != TimeDelta::zero())
}

/// Projects a candidate that passed every filter onto the canonical
/// field set. Returns `None` if the duration was never computed.
#[must_use]
pub fn project(candidate: Candidate) -> Option<Record> {
    Some(Record {
        object_id: candidate.object_id,
        work_order_key: candidate.work_order_key,
        location: candidate.location,
        address: candidate.address,
        initiated_at: candidate.initiated_at,
        field_start_at: candidate.field_start_at,
        field_end_at: candidate.field_end_at,
        duration: candidate.duration?,
        coordinates: None,
        resolved_address: None,
    })
}

/// Cleans raw export rows into canonical records.
///
/// Output order follows input order.
///
/// # Errors
///
/// Returns [`CleanError::DuplicateRecordId`] if two parseable rows share
/// an identifier.
pub fn clean(raw: &[RawRecord]) -> Result<(Vec<Record>, CleanReport), CleanError> {
    let mut report = CleanReport {
        input: raw.len(),
        ..CleanReport::default()
    };

    let mut candidates = Vec::with_capacity(raw.len());
    for row in raw {
        match parse(row) {
            Ok(candidate) => candidates.push(candidate),
            Err(reason) => {
                log::debug!("Dropping malformed row {:?}: {reason}", row.object_id);
                report.drop(reason);
            }
        }
    }

    let records = run_filters(candidates, &mut report)?;

    log::info!(
        "Cleaning: {} rows in, {} kept, {} dropped {:?}",
        report.input,
        report.kept,
        report.total_dropped(),
        report.dropped
    );

    Ok((records, report))
}

/// Re-runs the filter chain over already-canonical records.
///
/// Cleaning is idempotent, so for the output of [`clean`] this returns
/// the input unchanged.
///
/// # Errors
///
/// Returns [`CleanError::DuplicateRecordId`] if two records share an
/// identifier.
pub fn clean_records(records: Vec<Record>) -> Result<(Vec<Record>, CleanReport), CleanError> {
    let mut report = CleanReport {
        input: records.len(),
        ..CleanReport::default()
    };

    let candidates = records.into_iter().map(Candidate::from).collect();
    let records = run_filters(candidates, &mut report)?;
    Ok((records, report))
}

fn run_filters(
    candidates: Vec<Candidate>,
    report: &mut CleanReport,
) -> Result<Vec<Record>, CleanError> {
    let mut seen = BTreeSet::new();
    for candidate in &candidates {
        if !seen.insert(candidate.object_id) {
            return Err(CleanError::DuplicateRecordId {
                object_id: candidate.object_id,
            });
        }
    }

    let mut records = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if !is_completed(&candidate) {
            report.drop(DropReason::NotCompleted);
            continue;
        }
        if !ends_after_start(&candidate) {
            report.drop(DropReason::EndNotAfterStart);
            continue;
        }
        let candidate = with_duration(candidate);
        if !has_nonzero_duration(&candidate) {
            report.drop(DropReason::ZeroDuration);
            continue;
        }
        if let Some(record) = project(candidate) {
            records.push(record);
        }
    }

    report.kept = records.len();
    Ok(records)
}
