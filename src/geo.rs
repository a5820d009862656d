//! Great-circle distance between stop coordinates.

/// Earth radius used for air-distance calculations, kilometers.
pub const EARTH_RADIUS_KM: f64 = 6378.0;

/// Haversine distance in meters between two (lat, lon) points in degrees.
pub fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1 = lat1.to_radians();
    let lon1 = lon1.to_radians();
    let lat2 = lat2.to_radians();
    let lon2 = lon2.to_radians();

    let hav_a = ((lat2 - lat1) / 2.0).sin().powi(2);
    let hav_b = ((lon2 - lon1) / 2.0).sin().powi(2);
    let km = EARTH_RADIUS_KM * 2.0 * (hav_a + lat1.cos() * lat2.cos() * hav_b).sqrt().asin();

    km * 1000.0
}
