/// Great-circle distance helpers shared by the submission geofence check
/// and the auto-recommendation distance fallback.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance between two (lat, lng) pairs, in meters.
///
/// The inner square-root argument is clamped to [0, 1] so near-antipodal
/// and near-zero inputs stay numerically stable.
pub fn haversine_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lng2 - lng1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Rounded meter distance between a station and a place whose coordinates
/// arrive as decimal strings. Returns `None` when either coordinate is
/// unparsable, which callers treat as "unmeasurable" rather than an error.
pub fn distance_m(lat: f64, lng: f64, place_y: &str, place_x: &str) -> Option<i32> {
    let y: f64 = place_y.trim().parse().ok()?;
    let x: f64 = place_x.trim().parse().ok()?;
    Some(haversine_m(lat, lng, y, x).round() as i32)
}
