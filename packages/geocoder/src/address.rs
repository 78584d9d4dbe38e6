//! Address cleaning and query construction for work-order addresses.
//!
//! Work orders describe locations at block level in several shapes:
//! - Block ranges: `"8500 BLOCK OF AURORA AVE N"`
//! - Plain addresses: `"1200 5TH AVE"`
//! - Intersections: `"N 45TH ST AND STONE WAY N"`, `"AURORA AVE N / N 85TH ST"`
//!
//! These are normalized, then suffixed with the city name to form the
//! free-form geocoder query.

use std::sync::LazyLock;

use regex::Regex;

/// Regex for "BLOCK OF" / "BLK OF" noise in addresses.
static BLOCK_OF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+(?:BLOCK|BLK)\s+OF\s+").expect("valid regex"));

/// Standalone "BLOCK" / "BLK" after a house number: "100 BLOCK", "100BLK".
static BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s*(?:BLOCK|BLK)\s+").expect("valid regex"));

/// Runs of whitespace.
static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Non-geocodable address patterns.
static SKIP_PATTERNS: &[&str] = &["UNKNOWN", "N/A", "NA", "NONE", "UNDETERMINED", "NO ADDRESS"];

/// Result of cleaning a work-order address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanedAddress {
    /// A street address suitable for geocoding.
    Street(String),
    /// An intersection of two streets.
    Intersection {
        /// First street.
        street1: String,
        /// Second street.
        street2: String,
    },
    /// The address is not geocodable (empty, unknown, garbage).
    NotGeocodable,
}

/// Cleans and normalizes a work-order address description.
#[must_use]
pub fn clean_address(raw: &str) -> CleanedAddress {
    let addr = WHITESPACE_RE
        .replace_all(raw.trim(), " ")
        .to_uppercase();

    if addr.is_empty() || SKIP_PATTERNS.iter().any(|p| addr == *p) {
        return CleanedAddress::NotGeocodable;
    }

    // Detect intersections: "A / B", "A & B", "A AND B"
    for sep in [" / ", "/", " & ", " AND "] {
        if let Some(idx) = addr.find(sep) {
            let street1 = addr[..idx].trim().to_string();
            let street2 = addr[idx + sep.len()..].trim().to_string();
            if !street1.is_empty() && !street2.is_empty() {
                return CleanedAddress::Intersection { street1, street2 };
            }
        }
    }

    // "8500 BLOCK OF AURORA AVE N" → "8500 AURORA AVE N"
    let addr = BLOCK_OF_RE.replace_all(&addr, " ").to_string();
    let addr = BLOCK_RE.replace(&addr, "$1 ").to_string();
    let addr = addr.trim().to_string();

    if addr.is_empty() {
        return CleanedAddress::NotGeocodable;
    }

    CleanedAddress::Street(addr)
}

/// Builds the free-form geocoder query for a raw address, appending the
/// city suffix. Returns `None` if the address is not geocodable.
#[must_use]
pub fn build_query(raw: &str, city_suffix: &str) -> Option<String> {
    let base = match clean_address(raw) {
        CleanedAddress::Street(street) => street,
        CleanedAddress::Intersection { street1, street2 } => format!("{street1} & {street2}"),
        CleanedAddress::NotGeocodable => return None,
    };

    let suffix = city_suffix.trim();
    if suffix.is_empty() {
        Some(base)
    } else {
        Some(format!("{base} {suffix}"))
    }
}

/// Whether the geocoder's matched address is one of the generic
/// city-level results (e.g. `"Seattle, WA, USA"`) that carry no
/// location information. Comparison ignores case and surrounding
/// whitespace.
#[must_use]
pub fn is_generic_result(matched_address: &str, generic: &[String]) -> bool {
    let matched = matched_address.trim();
    generic
        .iter()
        .any(|g| g.trim().eq_ignore_ascii_case(matched))
}
