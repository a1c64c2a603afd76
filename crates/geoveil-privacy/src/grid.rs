//! Grid snapping
//!
//! A blurred coordinate is the centre of the grid cell the true coordinate
//! falls in. Re-querying from the same spot always yields the same point,
//! and points within one cell are indistinguishable.

/// Kilometres-per-degree factor used for latitude cells.
pub const LATITUDE_KM_PER_DEGREE: f64 = 32.39;

const EQUATOR_KM_PER_DEGREE: f64 = 111.27;
const SECONDS_PER_DEGREE: f64 = 3600.0;

/// Cell size in degrees for a given radius and kilometres-per-degree factor.
pub fn grid_size(radius: i32, km_per_degree: f64) -> f64 {
    (km_per_degree * f64::from(radius)) / SECONDS_PER_DEGREE
}

/// Longitude factor at `latitude`; grows toward the poles so cells keep a
/// roughly constant physical width.
pub fn longitude_km_per_degree(latitude: f64) -> f64 {
    SECONDS_PER_DEGREE / (latitude.to_radians().cos() * EQUATOR_KM_PER_DEGREE)
}

/// Snap `value` to the midpoint of its enclosing cell.
///
/// Values lying exactly on a cell boundary are returned unchanged. A cell
/// size that is zero, negative or not finite leaves the value alone.
pub fn snap(value: f64, grid: f64) -> f64 {
    if !(grid.is_finite() && grid > 0.0) {
        return value;
    }

    let cell = value / grid;
    let lower = cell.floor();
    let upper = cell.ceil();
    if lower == upper {
        return value;
    }

    (lower * grid + upper * grid) / 2.0
}

/// Blur a coordinate pair. Both axes are computed from the raw input.
///
/// Cells near the poles can reach past the valid range, so the result is
/// clamped to ±90° latitude and wrapped into [-180°, 180°) longitude.
pub fn blur_coordinates(latitude: f64, longitude: f64, radius: i32) -> (f64, f64) {
    if radius <= 0 {
        return (latitude, longitude);
    }

    let lon_grid = grid_size(radius, longitude_km_per_degree(latitude));
    let lat_grid = grid_size(radius, LATITUDE_KM_PER_DEGREE);

    let blurred_lat = snap(latitude, lat_grid).clamp(-90.0, 90.0);
    (blurred_lat, wrap_longitude(snap(longitude, lon_grid)))
}

fn wrap_longitude(longitude: f64) -> f64 {
    if !longitude.is_finite() || (-180.0..180.0).contains(&longitude) {
        return longitude;
    }
    (longitude + 180.0).rem_euclid(360.0) - 180.0
}
