//! Point-in-region and nearest-street joins.
//!
//! Lookups fan out over a `rayon` pool. Indexes are immutable once built,
//! so no locking is needed; results are collected into maps keyed by
//! record id, so completion order is irrelevant.

use std::collections::BTreeMap;

use pothole_record_models::{Record, SpatialLabel, StreetMatch};
use pothole_spatial::{RegionLookup, SegmentLookup};
use rayon::prelude::*;
use strum_macros::{AsRefStr, Display};

/// Which region set a containment join runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum JoinKind {
    /// Point in neighborhood polygon.
    Neighborhood,
    /// Point in census block group.
    BlockGroup,
    /// Nearest street segment.
    Street,
}

/// Per-label counts for one join.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinCounts {
    /// Records assigned a region or segment.
    pub matched: usize,
    /// Records with coordinates that matched nothing.
    pub not_found: usize,
    /// Records without coordinates.
    pub unknown: usize,
}

impl JoinCounts {
    /// Tallies a set of region labels.
    #[must_use]
    pub fn from_labels<'a>(labels: impl IntoIterator<Item = &'a SpatialLabel>) -> Self {
        labels.into_iter().fold(Self::default(), |mut counts, label| {
            match label {
                SpatialLabel::Region(_) => counts.matched += 1,
                SpatialLabel::NotFound => counts.not_found += 1,
                SpatialLabel::Unknown => counts.unknown += 1,
            }
            counts
        })
    }

    /// Tallies a set of street matches.
    #[must_use]
    pub fn from_matches<'a>(matches: impl IntoIterator<Item = &'a StreetMatch>) -> Self {
        matches.into_iter().fold(Self::default(), |mut counts, m| {
            match m {
                StreetMatch::Matched { .. } => counts.matched += 1,
                StreetMatch::NotFound => counts.not_found += 1,
                StreetMatch::Unknown => counts.unknown += 1,
            }
            counts
        })
    }

    /// Total records joined.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.matched + self.not_found + self.unknown
    }
}

/// Labels every record with the region containing it.
///
/// Records without coordinates get [`SpatialLabel::Unknown`]; records
/// outside every region get [`SpatialLabel::NotFound`].
#[must_use]
pub fn join_regions(
    records: &[Record],
    index: &dyn RegionLookup,
    kind: JoinKind,
) -> BTreeMap<i64, SpatialLabel> {
    let labels: BTreeMap<i64, SpatialLabel> = records
        .par_iter()
        .map(|record| {
            let label = record
                .coordinates
                .map_or(SpatialLabel::Unknown, |c| {
                    index
                        .contains(c.longitude, c.latitude)
                        .map_or(SpatialLabel::NotFound, |id| SpatialLabel::Region(id.to_string()))
                });
            (record.object_id, label)
        })
        .collect();

    let counts = JoinCounts::from_labels(labels.values());
    log::info!(
        "{kind} join: {} matched, {} outside all regions, {} without coordinates",
        counts.matched,
        counts.not_found,
        counts.unknown
    );

    labels
}

/// Matches every record to its nearest street segment.
///
/// A segment farther than `max_distance` (in the network's native units)
/// is treated as no match. `None` disables the bound.
#[must_use]
pub fn join_streets(
    records: &[Record],
    index: &dyn SegmentLookup,
    max_distance: Option<f64>,
) -> BTreeMap<i64, StreetMatch> {
    let matches: BTreeMap<i64, StreetMatch> = records
        .par_iter()
        .map(|record| {
            let matched = record.coordinates.map_or(StreetMatch::Unknown, |c| {
                match index.nearest(c.longitude, c.latitude) {
                    Some(nearest) if max_distance.is_none_or(|bound| nearest.distance <= bound) => {
                        StreetMatch::Matched {
                            segment_id: nearest.segment_id.to_string(),
                            attributes: nearest.attributes.clone(),
                            distance: nearest.distance,
                        }
                    }
                    _ => StreetMatch::NotFound,
                }
            });
            (record.object_id, matched)
        })
        .collect();

    let counts = JoinCounts::from_matches(matches.values());
    log::info!(
        "{} join: {} matched, {} beyond distance bound, {} without coordinates",
        JoinKind::Street,
        counts.matched,
        counts.not_found,
        counts.unknown
    );

    matches
}
