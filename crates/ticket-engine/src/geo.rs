//! Great-circle distance between coordinates
//!
//! Distances are computed with the haversine formula on a sphere of radius
//! [`EARTH_RADIUS_KM`]. Bad coordinates never fail: they come back as
//! [`UNREACHABLE_DISTANCE_KM`], which puts the provider at the end of any
//! distance ordering and gives it a proximity score of zero.

use crate::types::GeoPoint;

/// Mean Earth radius used by the haversine formula
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Distance reported for coordinates that cannot be measured.
///
/// Far larger than any real distance on Earth (about 20,000 km at most).
pub const UNREACHABLE_DISTANCE_KM: f64 = 999_999.0;

/// Distance in kilometers between two latitude/longitude pairs in degrees
pub fn distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    if !(lat1.is_finite() && lon1.is_finite() && lat2.is_finite() && lon2.is_finite()) {
        return UNREACHABLE_DISTANCE_KM;
    }

    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    // Rounding can push `a` just past 1 for antipodal points
    let a = ((d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2))
    .clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    let km = EARTH_RADIUS_KM * c;

    if km.is_finite() {
        km
    } else {
        UNREACHABLE_DISTANCE_KM
    }
}

/// Distance between two points, unreachable when either is missing
pub fn distance_between(from: Option<&GeoPoint>, to: &GeoPoint) -> f64 {
    match from {
        Some(from) => distance(from.latitude, from.longitude, to.latitude, to.longitude),
        None => UNREACHABLE_DISTANCE_KM,
    }
}
