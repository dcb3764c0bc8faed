//! Great-circle distance
//!
//! Haversine on a spherical Earth. Accurate to well under 0.5% for the
//! walking-distance ranges the proximity rule cares about.

use crate::geo::Coordinate;

/// Mean Earth radius in meters
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Distance in meters between two coordinates
///
/// Symmetric, and exactly zero when `a == b`.
pub fn distance_meters(a: &Coordinate, b: &Coordinate) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let delta_phi = (b.latitude - a.latitude).to_radians();
    let delta_lambda = (b.longitude - a.longitude).to_radians();

    let h = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    // Rounding can push h just past 1 near the antipode
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Friends-list wording: `"85m away"` below a kilometer, `"1.4km away"` above
pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{}m away", meters.round() as i64)
    } else {
        format!("{:.1}km away", meters / 1000.0)
    }
}

/// Kilometers with two decimals, as used in proximity alerts
pub fn format_km(meters: f64) -> String {
    format!("{:.2}", meters / 1000.0)
}
