//! Compass bearing between two coordinates.

/// Initial great-circle bearing from `from` to `to`, in degrees clockwise
/// from true north, normalized to `[0, 360)`.
///
/// Coincident points have no direction; they yield 0.
pub fn bearing_deg(from: (f64, f64), to: (f64, f64)) -> f64 {
    if from == to {
        return 0.0;
    }

    let (lat1, lon1) = from;
    let (lat2, lon2) = to;

    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let y = delta_lon.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lon.cos();
    if x == 0.0 && y == 0.0 {
        return 0.0;
    }

    normalize_deg(y.atan2(x).to_degrees())
}

/// Wrap an angle in degrees into `[0, 360)`.
pub fn normalize_deg(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid of a tiny negative value rounds up to exactly 360.0
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}
