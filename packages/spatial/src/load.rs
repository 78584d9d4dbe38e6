//! Builds region and street-segment sets from `GeoJSON` feature
//! collections.
//!
//! Features whose geometry is missing or of the wrong type are skipped
//! with a warning; they never abort the load.

use geo::{MultiLineString, MultiPolygon};
use geojson::{Feature, GeoJson, JsonValue};
use pothole_record_models::StreetAttributes;
use serde::{Deserialize, Serialize};

use crate::{Region, SpatialError, StreetSegment};

/// Property names holding each street attribute in the network file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreetAttributeFields {
    /// Segment identifier.
    pub id: String,
    /// Functional classification code.
    pub functional_code: String,
    /// Arterial class.
    pub street_class: String,
    /// Segment type.
    pub segment_type: String,
    /// Divided / undivided code.
    pub divided: String,
    /// Vehicle-use code.
    pub vehicle_use: String,
}

impl Default for StreetAttributeFields {
    fn default() -> Self {
        Self {
            id: "COMPKEY".to_string(),
            functional_code: "FCC".to_string(),
            street_class: "ARTCLASS".to_string(),
            segment_type: "SEGMENT_TYPE".to_string(),
            divided: "DIVIDED_CODE".to_string(),
            vehicle_use: "VEHICLE_USE_CODE".to_string(),
        }
    }
}

/// Loads a region set from a `FeatureCollection`.
///
/// The region id is read from `id_property`; when `id_property` is `None`,
/// or a feature lacks the property, the id is the feature's 1-based
/// position in the collection. Input order is preserved.
///
/// # Errors
///
/// Returns [`SpatialError`] if the text is not a `GeoJSON`
/// `FeatureCollection`.
pub fn load_regions(geojson_str: &str, id_property: Option<&str>) -> Result<Vec<Region>, SpatialError> {
    let features = parse_features(geojson_str)?;
    let mut regions = Vec::with_capacity(features.len());

    for (position, feature) in features.into_iter().enumerate() {
        let id = id_property
            .and_then(|name| property_text(&feature, name))
            .unwrap_or_else(|| (position + 1).to_string());

        let Some(geometry) = feature_multipolygon(feature) else {
            log::warn!("Skipping region {id}: missing or non-polygon geometry");
            continue;
        };

        regions.push(Region { id, geometry });
    }

    Ok(regions)
}

/// Loads the street network from a `FeatureCollection` of line features.
///
/// # Errors
///
/// Returns [`SpatialError`] if the text is not a `GeoJSON`
/// `FeatureCollection`.
pub fn load_street_segments(
    geojson_str: &str,
    fields: &StreetAttributeFields,
) -> Result<Vec<StreetSegment>, SpatialError> {
    let features = parse_features(geojson_str)?;
    let mut segments = Vec::with_capacity(features.len());

    for (position, feature) in features.into_iter().enumerate() {
        let id = property_text(&feature, &fields.id).unwrap_or_else(|| (position + 1).to_string());
        let attributes = StreetAttributes {
            functional_code: property_text(&feature, &fields.functional_code),
            street_class: property_text(&feature, &fields.street_class),
            segment_type: property_text(&feature, &fields.segment_type),
            divided: property_text(&feature, &fields.divided),
            vehicle_use: property_text(&feature, &fields.vehicle_use),
        };

        let Some(geometry) = feature_multilinestring(feature) else {
            log::warn!("Skipping street segment {id}: missing or non-line geometry");
            continue;
        };

        segments.push(StreetSegment {
            id,
            geometry,
            attributes,
        });
    }

    Ok(segments)
}

fn parse_features(geojson_str: &str) -> Result<Vec<Feature>, SpatialError> {
    let geojson: GeoJson = geojson_str.parse().map_err(Box::new)?;
    match geojson {
        GeoJson::FeatureCollection(collection) => Ok(collection.features),
        GeoJson::Feature(_) => Err(SpatialError::NotFeatureCollection { found: "Feature" }),
        GeoJson::Geometry(_) => Err(SpatialError::NotFeatureCollection { found: "Geometry" }),
    }
}

/// Reads a property as text. Numbers are rendered without quotes; null,
/// empty and whitespace-only values are treated as absent.
fn property_text(feature: &Feature, name: &str) -> Option<String> {
    let value = feature.property(name)?;
    let text = match value {
        JsonValue::Null => return None,
        JsonValue::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

fn feature_multipolygon(feature: Feature) -> Option<MultiPolygon<f64>> {
    let geo_geom: geo::Geometry<f64> = feature.geometry?.try_into().ok()?;
    match geo_geom {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

fn feature_multilinestring(feature: Feature) -> Option<MultiLineString<f64>> {
    let geo_geom: geo::Geometry<f64> = feature.geometry?.try_into().ok()?;
    match geo_geom {
        geo::Geometry::MultiLineString(mls) => Some(mls),
        geo::Geometry::LineString(ls) => Some(MultiLineString(vec![ls])),
        geo::Geometry::Line(line) => Some(MultiLineString(vec![line.into()])),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RegionIndex, RegionLookup as _, SegmentLookup as _, StreetIndex};

    const NEIGHBORHOODS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": { "S_HOOD": "Fremont" },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[-122.36, 47.64], [-122.34, 47.64], [-122.34, 47.66], [-122.36, 47.66], [-122.36, 47.64]]]
                }
            },
            {
                "type": "Feature",
                "properties": { "S_HOOD": null },
                "geometry": {
                    "type": "MultiPolygon",
                    "coordinates": [[[[-122.34, 47.64], [-122.32, 47.64], [-122.32, 47.66], [-122.34, 47.66], [-122.34, 47.64]]]]
                }
            },
            {
                "type": "Feature",
                "properties": { "S_HOOD": "Nowhere" },
                "geometry": { "type": "Point", "coordinates": [-122.3, 47.6] }
            }
        ]
    }"#;

    #[test]
    fn loads_named_regions_and_falls_back_to_position() {
        let regions = load_regions(NEIGHBORHOODS, Some("S_HOOD")).unwrap();
        let ids: Vec<&str> = regions.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["Fremont", "2"]);
    }

    #[test]
    fn unnamed_regions_are_numbered_from_one() {
        let regions = load_regions(NEIGHBORHOODS, None).unwrap();
        let index = RegionIndex::new(regions);
        assert_eq!(index.contains(-122.35, 47.65), Some("1"));
        assert_eq!(index.contains(-122.33, 47.65), Some("2"));
    }

    #[test]
    fn rejects_non_collections() {
        let point = r#"{ "type": "Point", "coordinates": [0.0, 0.0] }"#;
        assert!(matches!(
            load_regions(point, None),
            Err(SpatialError::NotFeatureCollection { found: "Geometry" })
        ));
        assert!(matches!(load_regions("not json", None), Err(SpatialError::GeoJson(_))));
    }

    #[test]
    fn loads_street_attributes_from_mapped_properties() {
        let network = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {
                    "COMPKEY": 1042,
                    "FCC": "A41",
                    "ARTCLASS": 2,
                    "SEGMENT_TYPE": "",
                    "DIVIDED_CODE": "UNDIVIDED"
                },
                "geometry": { "type": "LineString", "coordinates": [[-122.35, 47.6], [-122.34, 47.6]] }
            }]
        }"#;
        let segments = load_street_segments(network, &StreetAttributeFields::default()).unwrap();
        assert_eq!(segments.len(), 1);
        let segment = &segments[0];
        assert_eq!(segment.id, "1042");
        assert_eq!(segment.attributes.functional_code.as_deref(), Some("A41"));
        assert_eq!(segment.attributes.street_class.as_deref(), Some("2"));
        assert_eq!(segment.attributes.segment_type, None);
        assert_eq!(segment.attributes.vehicle_use, None);

        let index = StreetIndex::new(segments);
        assert_eq!(index.nearest(-122.345, 47.601).unwrap().segment_id, "1042");
    }
}
