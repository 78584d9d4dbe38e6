//! Scalar features derived from a single record.

use chrono::{Datelike as _, NaiveDate};
use geo::{Distance as _, Haversine, Point};
use pothole_record_models::Coordinates;

use crate::config::{CalendarConfig, Landmark};

fn point(c: Coordinates) -> Point<f64> {
    Point::new(c.longitude, c.latitude)
}

/// Great-circle distance between two points, in kilometres.
#[must_use]
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    Haversine.distance(point(a), point(b)) / 1000.0
}

/// Distance from `point` to each landmark, in landmark order.
#[must_use]
pub fn landmark_distances(point: Coordinates, landmarks: &[Landmark]) -> Vec<f64> {
    landmarks
        .iter()
        .map(|l| haversine_km(point, Coordinates::new(l.latitude, l.longitude)))
        .collect()
}

/// Smallest of `distances`, `None` when empty.
#[must_use]
pub fn min_distance(distances: &[f64]) -> Option<f64> {
    distances.iter().copied().reduce(f64::min)
}

/// Column name for the distance to a landmark.
#[must_use]
pub fn landmark_column(landmark: &Landmark) -> String {
    format!("{}_dist", landmark.name)
}

/// Calendar quarter (1-4).
#[must_use]
pub fn quarter(date: NaiveDate) -> u32 {
    date.month0() / 3 + 1
}

/// Days from `date` to the next fiscal-year end, zero on the end date
/// itself.
///
/// Falls back to the last day of the month when the configured day does
/// not exist in a given year (Feb 29).
#[must_use]
pub fn days_to_fiscal_year_end(date: NaiveDate, calendar: CalendarConfig) -> i64 {
    let end_in = |year: i32| {
        (1..=calendar.fiscal_year_end_day)
            .rev()
            .find_map(|day| NaiveDate::from_ymd_opt(year, calendar.fiscal_year_end_month, day))
    };

    let this_year = end_in(date.year()).filter(|end| *end >= date);
    this_year
        .or_else(|| end_in(date.year() + 1))
        .map_or(0, |end| (end - date).num_days())
}
