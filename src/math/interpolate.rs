use ndarray::ArrayView2;
use num_traits::Float;

/// Generic linear interpolation between two values
pub fn lin_interp<T: Float>(v0: T, v1: T, fac: T) -> T {
    v0 + (v1 - v0) * fac
}

/// Generic bilinear interpolation between four corner values using two
/// interpolation factors
pub fn bilin_interp<T: Float>(f00: T, f01: T, f10: T, f11: T, fac_x: T, fac_y: T) -> T {
    let f_y0 = lin_interp(f00, f10, fac_x);
    let f_y1 = lin_interp(f01, f11, fac_x);
    lin_interp(f_y0, f_y1, fac_y)
}

/// Find the bracketing indices and weight for `target` in a monotonically
/// ascending coordinate array, clamping at both ends.
///
/// Clamping covers the latitude poles: the polar rows have no wraparound
/// neighbor, so interpolation there degrades to the boundary value.
pub fn bracket_clamped(coords: &[f64], target: f64) -> (usize, usize, f64) {
    debug_assert!(!coords.is_empty());

    if target <= coords[0] {
        return (0, 0, 0.0);
    }
    let last = coords.len() - 1;
    if target >= coords[last] {
        return (last, last, 0.0);
    }

    let mut left = 0;
    let mut right = last;
    while right - left > 1 {
        let mid = (left + right) / 2;
        if coords[mid] <= target {
            left = mid;
        } else {
            right = mid;
        }
    }

    let weight = (target - coords[left]) / (coords[right] - coords[left]);
    (left, right, weight)
}

/// Find the bracketing indices and weight for a longitude in an ascending
/// [0, 360) coordinate array, wrapping across the 0/360 seam.
///
/// Between the last grid column and the first one the angular gap is
/// measured mod 360 so a point at 359.9° interpolates between its true
/// neighbors instead of clamping to the grid edge.
pub fn bracket_longitude(lons: &[f64], target: f64) -> (usize, usize, f64) {
    debug_assert!(!lons.is_empty());
    let last = lons.len() - 1;

    if target < lons[0] || target >= lons[last] {
        // In the seam cell between lons[last] and lons[0] + 360
        let gap = 360.0 - lons[last] + lons[0];
        let offset = if target >= lons[last] {
            target - lons[last]
        } else {
            360.0 - lons[last] + target
        };
        return (last, 0, offset / gap);
    }

    bracket_clamped(lons, target)
}

/// Bilinearly interpolate a 2-D field laid out [lat, lon] at (lat, lon).
///
/// NaN corners (land points in ocean fields) are excluded and the
/// remaining weights renormalized; all four NaN yields NaN for the caller
/// to interpret.
pub fn bilinear_at(
    lats: &[f64],
    lons: &[f64],
    values: ArrayView2<'_, f64>,
    lat: f64,
    lon: f64,
) -> f64 {
    let (lat0, lat1, wlat) = bracket_clamped(lats, lat);
    let (lon0, lon1, wlon) = bracket_longitude(lons, lon);

    let corners = [
        (values[[lat0, lon0]], (1.0 - wlat) * (1.0 - wlon)),
        (values[[lat0, lon1]], (1.0 - wlat) * wlon),
        (values[[lat1, lon0]], wlat * (1.0 - wlon)),
        (values[[lat1, lon1]], wlat * wlon),
    ];

    let mut sum = 0.0;
    let mut weight_sum = 0.0;
    for (value, weight) in corners {
        if value.is_finite() {
            sum += value * weight;
            weight_sum += weight;
        }
    }

    if weight_sum > 0.0 {
        sum / weight_sum
    } else {
        f64::NAN
    }
}
