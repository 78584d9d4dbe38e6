#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory spatial indexes for the pothole feature pipeline.
//!
//! Region sets (neighborhoods, census block groups) answer
//! point-in-polygon queries; the street network answers nearest-segment
//! queries. Both are exposed through the [`RegionLookup`] and
//! [`SegmentLookup`] traits so the R-tree indexes and the exhaustive-scan
//! baselines are interchangeable for callers.
//!
//! Indexes are built once and are read-only afterwards, so a single
//! instance can be shared across threads without locking.

pub mod load;
pub mod regions;
pub mod streets;

use geo::{BoundingRect, MultiLineString, MultiPolygon};
use pothole_record_models::StreetAttributes;
use rstar::AABB;
use thiserror::Error;

pub use regions::{NaiveRegionIndex, RegionIndex};
pub use streets::{NaiveStreetIndex, StreetIndex};

/// Errors from loading geometry sets.
#[derive(Debug, Error)]
pub enum SpatialError {
    /// The input is not valid `GeoJSON`.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] Box<geojson::Error>),

    /// The `GeoJSON` parsed but is not a `FeatureCollection`.
    #[error("Expected a GeoJSON FeatureCollection, found {found}")]
    NotFeatureCollection {
        /// The kind of `GeoJSON` object that was found.
        found: &'static str,
    },
}

/// A named polygon used for containment joins.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// Stable identifier (neighborhood name/index, block-group GEOID).
    pub id: String,
    /// Region outline.
    pub geometry: MultiPolygon<f64>,
}

/// A street-network segment with its categorical attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct StreetSegment {
    /// Stable segment identifier.
    pub id: String,
    /// Segment centerline.
    pub geometry: MultiLineString<f64>,
    /// Attributes copied onto records matched to this segment.
    pub attributes: StreetAttributes,
}

/// Point-in-polygon lookup over an ordered region set.
///
/// When regions overlap, the region that comes first in input order wins.
pub trait RegionLookup: Send + Sync {
    /// Returns the id of the first region (by input order) containing the
    /// point, or `None` if no region contains it.
    fn contains(&self, lng: f64, lat: f64) -> Option<&str>;

    /// Number of indexed regions.
    fn len(&self) -> usize;

    /// Whether the index holds no regions.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The segment closest to a query point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestSegment<'a> {
    /// Identifier of the segment.
    pub segment_id: &'a str,
    /// Attributes of the segment.
    pub attributes: &'a StreetAttributes,
    /// Planar distance from the query point, in the geometry's native units.
    pub distance: f64,
}

/// Nearest-segment lookup over an ordered segment set.
///
/// Ties go to the segment that comes first in input order.
pub trait SegmentLookup: Send + Sync {
    /// Returns the nearest segment, or `None` if the set is empty.
    fn nearest(&self, lng: f64, lat: f64) -> Option<NearestSegment<'_>>;

    /// Number of indexed segments.
    fn len(&self) -> usize;

    /// Whether the index holds no segments.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Compute the bounding box envelope for any geometry with a bounding rect.
fn compute_envelope<G>(geometry: &G) -> AABB<[f64; 2]>
where
    G: BoundingRect<f64, Output = Option<geo::Rect<f64>>>,
{
    geometry.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}

#[cfg(test)]
pub(crate) mod fixtures {
    use geo::{LineString, MultiLineString, MultiPolygon, Polygon};
    use pothole_record_models::StreetAttributes;

    use crate::{Region, StreetSegment};

    /// Axis-aligned square region spanning `[min_lng, max_lng] x [min_lat, max_lat]`.
    pub fn square(id: &str, min_lng: f64, min_lat: f64, max_lng: f64, max_lat: f64) -> Region {
        let exterior = LineString::from(vec![
            (min_lng, min_lat),
            (max_lng, min_lat),
            (max_lng, max_lat),
            (min_lng, max_lat),
            (min_lng, min_lat),
        ]);
        Region {
            id: id.to_string(),
            geometry: MultiPolygon(vec![Polygon::new(exterior, vec![])]),
        }
    }

    pub fn segment(id: &str, class: &str, coords: &[(f64, f64)]) -> StreetSegment {
        StreetSegment {
            id: id.to_string(),
            geometry: MultiLineString(vec![LineString::from(coords.to_vec())]),
            attributes: StreetAttributes {
                street_class: Some(class.to_string()),
                ..StreetAttributes::default()
            },
        }
    }
}
