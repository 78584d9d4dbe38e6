#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Pothole repair work-order record types.
//!
//! This crate defines the raw ingestion row, the canonical cleaned
//! [`Record`], and the per-record labels produced by the spatial joins.
//! Every pipeline stage exchanges these types, keyed by the stable
//! [`Record::object_id`].

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Seconds in one calendar day.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Lifecycle status of a repair work order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkOrderStatus {
    /// Repair finished in the field
    Completed,
    /// Work order created, not yet dispatched
    Open,
    /// Crew dispatched, repair under way
    InProgress,
    /// Work order withdrawn
    Cancelled,
    /// Merged into another work order
    Duplicate,
}

/// One raw row from the municipal work-order export.
///
/// Every field is optional text; parsing and validation happen in the
/// cleaner so that malformed rows can be counted instead of aborting
/// deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Export-wide unique row identifier.
    #[serde(rename = "OBJECTID", default)]
    pub object_id: Option<String>,
    /// Work-order key assigned by the maintenance system.
    #[serde(rename = "WOKEY", default)]
    pub work_order_key: Option<String>,
    /// Free-text location description.
    #[serde(rename = "LOCATION", default)]
    pub location: Option<String>,
    /// Block-level address description used for geocoding.
    #[serde(rename = "ADDRDESC", default)]
    pub address: Option<String>,
    /// Work-order status (e.g. `"COMPLETED"`).
    #[serde(rename = "WO_STATUS", default)]
    pub status: Option<String>,
    /// Timestamp the work order was initiated.
    #[serde(rename = "INITDT", default)]
    pub initiated_at: Option<String>,
    /// Timestamp field work started.
    #[serde(rename = "FLDSTARTDT", default)]
    pub field_start_at: Option<String>,
    /// Timestamp field work ended.
    #[serde(rename = "FLDENDDT", default)]
    pub field_end_at: Option<String>,
}

/// Columns that must be present in a raw export for the run to proceed.
pub const REQUIRED_RAW_COLUMNS: &[&str] = &[
    "OBJECTID",
    "WOKEY",
    "LOCATION",
    "ADDRDESC",
    "WO_STATUS",
    "INITDT",
    "FLDSTARTDT",
    "FLDENDDT",
];

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl Coordinates {
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A cleaned, canonical repair work order.
///
/// Invariant: `field_end_at > initiated_at` and `duration > 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Stable record identifier, unique within a run.
    pub object_id: i64,
    /// Work-order key.
    pub work_order_key: String,
    /// Free-text location description.
    pub location: String,
    /// Block-level address description.
    pub address: String,
    /// When the work order was initiated (the interval start).
    pub initiated_at: NaiveDateTime,
    /// When field work started, if recorded.
    pub field_start_at: Option<NaiveDateTime>,
    /// When field work ended (the interval end).
    pub field_end_at: NaiveDateTime,
    /// `field_end_at - initiated_at`.
    pub duration: TimeDelta,
    /// Geocoded position, `None` until geocoding succeeds.
    pub coordinates: Option<Coordinates>,
    /// Normalized address returned by the geocoder.
    pub resolved_address: Option<String>,
}

impl Record {
    /// Calendar date the work order was initiated.
    #[must_use]
    pub fn start_date(&self) -> NaiveDate {
        self.initiated_at.date()
    }

    /// Duration in fractional days.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_days(&self) -> f64 {
        let seconds = self.duration.num_seconds() as f64
            + f64::from(self.duration.subsec_nanos()) / 1_000_000_000.0;
        seconds / SECONDS_PER_DAY as f64
    }

    /// Duration truncated to whole days.
    #[must_use]
    pub fn duration_whole_days(&self) -> i64 {
        self.duration.num_days()
    }

    /// Number of calendar days, starting at [`Self::start_date`], on which
    /// the repair counts as open.
    ///
    /// A date `D` is open when `start_date <= D < start_date + duration`,
    /// which for a positive duration covers `ceil(duration in days)` dates.
    #[must_use]
    pub fn open_days(&self) -> i64 {
        if self.duration <= TimeDelta::zero() {
            return 0;
        }
        let whole = self.duration.num_days();
        if self.duration > TimeDelta::days(whole) {
            whole + 1
        } else {
            whole
        }
    }
}

/// Result of a point-in-region join for one record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SpatialLabel {
    /// The record lies in the region with this identifier.
    Region(String),
    /// The record has coordinates but lies outside every region.
    NotFound,
    /// The record has no coordinates, so the join was not attempted.
    Unknown,
}

impl SpatialLabel {
    /// Returns the region identifier, if any.
    #[must_use]
    pub fn region(&self) -> Option<&str> {
        match self {
            Self::Region(id) => Some(id),
            Self::NotFound | Self::Unknown => None,
        }
    }
}

/// Categorical attributes copied from the nearest street segment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreetAttributes {
    /// Functional classification code.
    pub functional_code: Option<String>,
    /// Street (arterial) class.
    pub street_class: Option<String>,
    /// Segment type.
    pub segment_type: Option<String>,
    /// Divided / undivided roadway code.
    pub divided: Option<String>,
    /// Vehicle-use class.
    pub vehicle_use: Option<String>,
}

/// Feature names of the street attributes, in output order.
pub const STREET_ATTRIBUTE_NAMES: [&str; 5] = [
    "functional_code",
    "street_class",
    "segment_type",
    "divided",
    "vehicle_use",
];

impl StreetAttributes {
    /// Returns the attributes paired with their feature names, in
    /// [`STREET_ATTRIBUTE_NAMES`] order.
    #[must_use]
    pub fn named(&self) -> [(&'static str, Option<&str>); 5] {
        [
            (STREET_ATTRIBUTE_NAMES[0], self.functional_code.as_deref()),
            (STREET_ATTRIBUTE_NAMES[1], self.street_class.as_deref()),
            (STREET_ATTRIBUTE_NAMES[2], self.segment_type.as_deref()),
            (STREET_ATTRIBUTE_NAMES[3], self.divided.as_deref()),
            (STREET_ATTRIBUTE_NAMES[4], self.vehicle_use.as_deref()),
        ]
    }
}

/// Result of the nearest-street join for one record.
#[derive(Debug, Clone, PartialEq)]
pub enum StreetMatch {
    /// A segment was found within the distance bound.
    Matched {
        /// Identifier of the winning segment.
        segment_id: String,
        /// Attributes copied from the segment.
        attributes: StreetAttributes,
        /// Planar distance in the street network's native units.
        distance: f64,
    },
    /// No segment lies within the distance bound.
    NotFound,
    /// The record has no coordinates.
    Unknown,
}

impl StreetMatch {
    /// Attributes of the matched segment, if any.
    #[must_use]
    pub const fn attributes(&self) -> Option<&StreetAttributes> {
        match self {
            Self::Matched { attributes, .. } => Some(attributes),
            Self::NotFound | Self::Unknown => None,
        }
    }
}
