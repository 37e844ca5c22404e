//! Haversine great-circle distance.
//!
//! Spherical Earth model. Good enough for urban-scale bus routes where
//! segments are a few hundred meters at most.

/// Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Calculate haversine distance between two (lat, lon) points in meters.
pub fn haversine_m(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lon1) = from;
    let (lat2, lon2) = to;

    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    // Rounding can push `a` a hair above 1 for near-antipodal points.
    let c = 2.0 * a.min(1.0).sqrt().asin();

    EARTH_RADIUS_M * c
}
