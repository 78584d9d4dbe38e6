//! Point-in-polygon indexes over ordered region sets.

use geo::{Contains, MultiPolygon};
use rstar::{AABB, RTree, RTreeObject};

use crate::{Region, RegionLookup, compute_envelope};

/// A region polygon stored in the R-tree with its input position.
struct RegionEntry {
    order: usize,
    id: String,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for RegionEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// R-tree backed region index.
///
/// Bounding boxes filter candidates before the exact containment test.
/// Among containing candidates the lowest input position wins, which
/// reproduces the first-match result of a sequential scan.
pub struct RegionIndex {
    tree: RTree<RegionEntry>,
}

impl RegionIndex {
    /// Builds the index. Region order is significant for overlapping
    /// regions.
    #[must_use]
    pub fn new(regions: Vec<Region>) -> Self {
        let entries: Vec<RegionEntry> = regions
            .into_iter()
            .enumerate()
            .map(|(order, region)| RegionEntry {
                order,
                envelope: compute_envelope(&region.geometry),
                id: region.id,
                polygon: region.geometry,
            })
            .collect();

        let tree = RTree::bulk_load(entries);
        log::info!("Loaded {} regions into spatial index", tree.size());

        Self { tree }
    }
}

impl RegionLookup for RegionIndex {
    fn contains(&self, lng: f64, lat: f64) -> Option<&str> {
        let point = geo::Point::new(lng, lat);
        let query_env = AABB::from_point([lng, lat]);

        self.tree
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.polygon.contains(&point))
            .min_by_key(|entry| entry.order)
            .map(|entry| entry.id.as_str())
    }

    fn len(&self) -> usize {
        self.tree.size()
    }
}

/// Exhaustive-scan region lookup. Reference baseline for [`RegionIndex`].
pub struct NaiveRegionIndex {
    regions: Vec<Region>,
}

impl NaiveRegionIndex {
    #[must_use]
    pub const fn new(regions: Vec<Region>) -> Self {
        Self { regions }
    }
}

impl RegionLookup for NaiveRegionIndex {
    fn contains(&self, lng: f64, lat: f64) -> Option<&str> {
        let point = geo::Point::new(lng, lat);
        self.regions
            .iter()
            .find(|region| region.geometry.contains(&point))
            .map(|region| region.id.as_str())
    }

    fn len(&self) -> usize {
        self.regions.len()
    }
}
