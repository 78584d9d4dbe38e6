//! Nearest-segment indexes over the street network.
//!
//! Distances are planar, in the coordinate units of the loaded geometry.

use geo::{Distance as _, Euclidean, MultiLineString, Point};
use pothole_record_models::StreetAttributes;
use rstar::{AABB, PointDistance, RTree, RTreeObject};

use crate::{NearestSegment, SegmentLookup, StreetSegment, compute_envelope};

struct SegmentEntry {
    order: usize,
    id: String,
    attributes: StreetAttributes,
    envelope: AABB<[f64; 2]>,
    lines: MultiLineString<f64>,
}

impl RTreeObject for SegmentEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl PointDistance for SegmentEntry {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        distance_2_to_lines(&self.lines, *point)
    }
}

impl SegmentEntry {
    fn as_nearest(&self, distance_2: f64) -> NearestSegment<'_> {
        NearestSegment {
            segment_id: &self.id,
            attributes: &self.attributes,
            distance: distance_2.sqrt(),
        }
    }
}

/// R-tree backed nearest-segment index.
///
/// Candidates are visited in increasing distance; among candidates at
/// exactly the minimum distance the lowest input position wins, which
/// reproduces the first-minimum result of a sequential scan.
pub struct StreetIndex {
    tree: RTree<SegmentEntry>,
}

impl StreetIndex {
    #[must_use]
    pub fn new(segments: Vec<StreetSegment>) -> Self {
        let entries: Vec<SegmentEntry> = segments
            .into_iter()
            .enumerate()
            .map(|(order, segment)| SegmentEntry {
                order,
                envelope: compute_envelope(&segment.geometry),
                id: segment.id,
                attributes: segment.attributes,
                lines: segment.geometry,
            })
            .collect();

        let tree = RTree::bulk_load(entries);
        log::info!("Loaded {} street segments into spatial index", tree.size());

        Self { tree }
    }
}

impl SegmentLookup for StreetIndex {
    #[allow(clippy::float_cmp)]
    fn nearest(&self, lng: f64, lat: f64) -> Option<NearestSegment<'_>> {
        let mut candidates = self.tree.nearest_neighbor_iter_with_distance_2(&[lng, lat]);
        let (mut best, best_distance_2) = candidates.next()?;

        for (entry, distance_2) in candidates {
            if distance_2 != best_distance_2 {
                break;
            }
            if entry.order < best.order {
                best = entry;
            }
        }

        best_distance_2
            .is_finite()
            .then(|| best.as_nearest(best_distance_2))
    }

    fn len(&self) -> usize {
        self.tree.size()
    }
}

/// Exhaustive-scan segment lookup. Reference baseline for [`StreetIndex`].
pub struct NaiveStreetIndex {
    segments: Vec<StreetSegment>,
}

impl NaiveStreetIndex {
    #[must_use]
    pub const fn new(segments: Vec<StreetSegment>) -> Self {
        Self { segments }
    }
}

impl SegmentLookup for NaiveStreetIndex {
    fn nearest(&self, lng: f64, lat: f64) -> Option<NearestSegment<'_>> {
        let mut best: Option<(&StreetSegment, f64)> = None;
        for segment in &self.segments {
            let distance_2 = distance_2_to_lines(&segment.geometry, [lng, lat]);
            if best.is_none_or(|(_, current)| distance_2 < current) {
                best = Some((segment, distance_2));
            }
        }

        best.filter(|(_, distance_2)| distance_2.is_finite())
            .map(|(segment, distance_2)| NearestSegment {
                segment_id: &segment.id,
                attributes: &segment.attributes,
                distance: distance_2.sqrt(),
            })
    }

    fn len(&self) -> usize {
        self.segments.len()
    }
}

/// Squared planar distance from `point` to the closest part of `lines`.
/// Returns infinity for empty geometry.
fn distance_2_to_lines(lines: &MultiLineString<f64>, point: [f64; 2]) -> f64 {
    if lines.0.iter().all(|line| line.0.is_empty()) {
        return f64::INFINITY;
    }
    Euclidean
        .distance(&Point::new(point[0], point[1]), lines)
        .powi(2)
}
