/// Latitude limit of the square Web Mercator world (degrees).
pub const WEB_MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

/// Wraps a longitude into `[-180, 180)`.
pub fn wrap_longitude(lng: f64) -> f64 {
    if !lng.is_finite() {
        return lng;
    }
    let wrapped = (lng + 180.0).rem_euclid(360.0) - 180.0;
    // rem_euclid can round up to exactly 360 for tiny negative inputs.
    if wrapped >= 180.0 { wrapped - 360.0 } else { wrapped }
}

/// Wraps a bearing into `(-180, 180]`, the convention map engines report.
pub fn wrap_bearing(bearing: f64) -> f64 {
    if !bearing.is_finite() {
        return bearing;
    }
    let b = bearing.rem_euclid(360.0);
    if b > 180.0 { b - 360.0 } else { b }
}

pub fn clamp_latitude(lat: f64, max_lat: f64) -> f64 {
    let max_lat = max_lat.abs().min(90.0);
    lat.clamp(-max_lat, max_lat)
}
