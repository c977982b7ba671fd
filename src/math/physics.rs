use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::Constants;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhysicsError {
    #[error("profile never cools {delta_c} degC below SST; mixed layer undefined")]
    NoMixedLayer { delta_c: f64 },

    #[error("profile is empty or has mismatched lengths")]
    EmptyProfile,

    #[error("non-finite input: {what}")]
    NonFiniteInput { what: &'static str },
}

/// Calculate distance between two geographic points (Haversine formula)
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64, earth_radius: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();

    let a =
        (dlat / 2.0).sin().powi(2) + lat1_rad.cos() * lat2_rad.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    earth_radius * c
}

/// Translation speed between two consecutive fixes of the same storm (m/s).
///
/// `None` when the elapsed time is not positive; the first fix of a storm
/// has no previous point and therefore no defined translation speed, an
/// explicit null rather than zero.
pub fn translation_speed(
    prev: (f64, f64, DateTime<Utc>),
    curr: (f64, f64, DateTime<Utc>),
    constants: &Constants,
) -> Option<f64> {
    let (lat1, lon1, t1) = prev;
    let (lat2, lon2, t2) = curr;
    let dt_s = (t2 - t1).num_seconds();
    if dt_s <= 0 {
        return None;
    }
    let dist_m = haversine_distance(lat1, lon1, lat2, lon2, constants.earth_radius);
    Some(dist_m / dt_s as f64)
}

/// Magnitude of the 200-850 hPa vector wind difference (m/s)
pub fn wind_shear(u200: f64, v200: f64, u850: f64, v850: f64) -> f64 {
    ((u200 - u850).powi(2) + (v200 - v850).powi(2)).sqrt()
}

/// Mixed layer depth: the depth at which ocean temperature first drops
/// `delta_c` below the SST, scanning the profile top-down (m).
///
/// The crossing depth is linearly interpolated between the bracketing
/// levels. A profile that never cools by `delta_c` over its full depth is
/// a warm-anomaly / shallow-column case and yields
/// [`PhysicsError::NoMixedLayer`], never a silent zero.
pub fn mixed_layer_depth(
    depths_m: &[f64],
    temps_c: &[f64],
    sst_c: f64,
    delta_c: f64,
) -> Result<f64, PhysicsError> {
    if depths_m.is_empty() || depths_m.len() != temps_c.len() {
        return Err(PhysicsError::EmptyProfile);
    }
    if !sst_c.is_finite() {
        return Err(PhysicsError::NonFiniteInput { what: "sst" });
    }

    let threshold = sst_c - delta_c;

    let mut prev: Option<(f64, f64)> = None;
    for (&z, &t) in depths_m.iter().zip(temps_c) {
        if !t.is_finite() {
            // Below the sea floor on regridded profiles; stop scanning.
            break;
        }
        if t <= threshold {
            let mld = match prev {
                Some((z0, t0)) if (t0 - t).abs() > f64::EPSILON => {
                    z0 + (z - z0) * (t0 - threshold) / (t0 - t)
                }
                _ => z,
            };
            return Ok(mld);
        }
        prev = Some((z, t));
    }

    Err(PhysicsError::NoMixedLayer { delta_c })
}

/// Thermal stratification: temperature gradient dT/dz over the interval
/// from the mixed layer base down to `mld + interval_m` (degC/m, negative
/// for the usual downward cooling).
pub fn thermal_stratification(
    depths_m: &[f64],
    temps_c: &[f64],
    mld_m: f64,
    interval_m: f64,
) -> Result<f64, PhysicsError> {
    let t_top = profile_value_at(depths_m, temps_c, mld_m)?;
    let t_bottom = profile_value_at(depths_m, temps_c, mld_m + interval_m)?;
    Ok((t_bottom - t_top) / interval_m)
}

/// Ocean heat content relative to the 26 degC isotherm, integrated from
/// the surface to `constants.ohc_depth_m` with the trapezoidal rule
/// (J/m²). Temperatures at or below the reference contribute nothing.
pub fn ocean_heat_content(depths_m: &[f64], temps_c: &[f64], constants: &Constants) -> f64 {
    let excess = |t: f64| (t - constants.ohc_ref_temp_c).max(0.0);

    let mut integral = 0.0;
    for window in depths_m
        .iter()
        .zip(temps_c)
        .filter(|(_, t)| t.is_finite())
        .collect::<Vec<_>>()
        .windows(2)
    {
        let (&z0, &t0) = window[0];
        let (&z1, &t1) = window[1];
        if z0 >= constants.ohc_depth_m {
            break;
        }
        let z1c = z1.min(constants.ohc_depth_m);
        // Clip the lower bound of the last layer at the integration depth
        let t1c = if z1 > constants.ohc_depth_m && (z1 - z0) > f64::EPSILON {
            t0 + (t1 - t0) * (z1c - z0) / (z1 - z0)
        } else {
            t1
        };
        integral += 0.5 * (excess(t0) + excess(t1c)) * (z1c - z0);
    }

    constants.rho_sea * constants.cp_sea * integral
}

/// Linear interpolation of a depth profile at an arbitrary depth
fn profile_value_at(depths_m: &[f64], temps_c: &[f64], z: f64) -> Result<f64, PhysicsError> {
    if depths_m.is_empty() || depths_m.len() != temps_c.len() {
        return Err(PhysicsError::EmptyProfile);
    }

    let valid: Vec<(f64, f64)> = depths_m
        .iter()
        .zip(temps_c)
        .take_while(|(_, t)| t.is_finite())
        .map(|(&z, &t)| (z, t))
        .collect();

    match valid.iter().position(|&(zi, _)| zi >= z) {
        Some(0) => Ok(valid[0].1),
        Some(i) => {
            let (z0, t0) = valid[i - 1];
            let (z1, t1) = valid[i];
            Ok(t0 + (t1 - t0) * (z - z0) / (z1 - z0))
        }
        None => {
            // Requested depth is below the deepest valid level
            valid
                .last()
                .map(|&(_, t)| t)
                .ok_or(PhysicsError::EmptyProfile)
        }
    }
}
