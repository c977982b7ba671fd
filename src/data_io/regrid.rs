use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use ndarray::Array3;
use tracing::debug;

use super::{NativeOceanGrid, OceanGrid};
use crate::math::physics::haversine_distance;

/// The regular lat/lon grid ocean fields are remapped onto
#[derive(Debug, Clone, PartialEq)]
pub struct TargetGrid {
    pub lats: Vec<f64>,
    pub lons: Vec<f64>,
}

impl TargetGrid {
    /// Global regular grid at `resolution_deg`, cell centers offset half a
    /// cell from the poles and the prime meridian.
    pub fn global(resolution_deg: f64) -> Self {
        let half = resolution_deg / 2.0;
        let n_lat = (180.0 / resolution_deg).round() as usize;
        let n_lon = (360.0 / resolution_deg).round() as usize;
        let lats = (0..n_lat)
            .map(|i| -90.0 + half + i as f64 * resolution_deg)
            .collect();
        let lons = (0..n_lon)
            .map(|i| half + i as f64 * resolution_deg)
            .collect();
        Self { lats, lons }
    }
}

/// Remapping weights from one curvilinear source grid onto a target grid:
/// for every target cell, up to four nearest source cells and their
/// normalized inverse-distance weights.
#[derive(Debug)]
pub struct RemapWeights {
    /// [target_lat * n_lon + target_lon] -> source flat indices
    neighbors: Vec<[usize; 4]>,
    weights: Vec<[f64; 4]>,
    src_shape: (usize, usize),
    tgt_shape: (usize, usize),
}

/// Cache key: the weight field depends only on the two grid geometries,
/// which for a fixed product never change across months.
type WeightKey = (usize, usize, usize, usize);

/// Compute-once weight cache shared across extraction workers.
///
/// Readers share the frozen result; a race between two first computations
/// resolves by single-writer-wins, and the duplicated computation is
/// idempotent, so no lock is held while computing.
#[derive(Debug, Default)]
pub struct WeightCache {
    inner: RwLock<HashMap<WeightKey, Arc<RemapWeights>>>,
}

impl WeightCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute(
        &self,
        native: &NativeOceanGrid,
        target: &TargetGrid,
    ) -> Arc<RemapWeights> {
        let (ny, nx) = native.lat2d.dim();
        let key = (ny, nx, target.lats.len(), target.lons.len());

        if let Some(weights) = self.inner.read().expect("weight cache poisoned").get(&key) {
            return Arc::clone(weights);
        }

        let computed = Arc::new(RemapWeights::compute(native, target));
        let mut guard = self.inner.write().expect("weight cache poisoned");
        Arc::clone(guard.entry(key).or_insert(computed))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }
}

impl RemapWeights {
    /// Build weights by bucketing source cells into 1-degree bins and, for
    /// every target cell, taking the four nearest source cells from the
    /// surrounding bins with inverse great-circle-distance weighting.
    pub fn compute(native: &NativeOceanGrid, target: &TargetGrid) -> Self {
        let (ny, nx) = native.lat2d.dim();
        let n_tgt = target.lats.len() * target.lons.len();

        // 1-degree buckets over the source cells
        let mut buckets: HashMap<(i32, i32), Vec<usize>> = HashMap::new();
        for y in 0..ny {
            for x in 0..nx {
                let key = bucket_of(native.lat2d[[y, x]], native.lon2d[[y, x]]);
                buckets.entry(key).or_default().push(y * nx + x);
            }
        }

        let mut neighbors = vec![[usize::MAX; 4]; n_tgt];
        let mut weights = vec![[0.0; 4]; n_tgt];

        for (ti, &tlat) in target.lats.iter().enumerate() {
            for (tj, &tlon) in target.lons.iter().enumerate() {
                let flat = ti * target.lons.len() + tj;
                let (blat, blon) = bucket_of(tlat, tlon);

                // Candidates from the 3x3 bucket neighborhood, wrapping in
                // longitude
                let mut best: Vec<(f64, usize)> = Vec::with_capacity(16);
                for dlat in -1..=1 {
                    for dlon in -1..=1 {
                        let key = (blat + dlat, (blon + dlon).rem_euclid(360));
                        if let Some(cells) = buckets.get(&key) {
                            for &cell in cells {
                                let (y, x) = (cell / nx, cell % nx);
                                let d = haversine_distance(
                                    tlat,
                                    tlon,
                                    native.lat2d[[y, x]],
                                    native.lon2d[[y, x]],
                                    6_371_000.0,
                                );
                                best.push((d, cell));
                            }
                        }
                    }
                }

                best.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
                best.truncate(4);
                if best.is_empty() {
                    continue; // left as usize::MAX sentinel -> NaN on apply
                }

                let mut weight_sum = 0.0;
                for (slot, &(d, cell)) in best.iter().enumerate() {
                    // Avoid division blowup for exact hits
                    let w = 1.0 / d.max(1.0);
                    neighbors[flat][slot] = cell;
                    weights[flat][slot] = w;
                    weight_sum += w;
                }
                for w in weights[flat].iter_mut() {
                    *w /= weight_sum;
                }
            }
        }

        debug!(
            src = ?(ny, nx),
            tgt = ?(target.lats.len(), target.lons.len()),
            "computed remap weights"
        );
        Self {
            neighbors,
            weights,
            src_shape: (ny, nx),
            tgt_shape: (target.lats.len(), target.lons.len()),
        }
    }
}

/// Apply cached weights to remap a native ocean field onto the target
/// grid. NaN source cells are skipped with weight renormalization; target
/// cells with no valid source stay NaN.
pub fn regrid_ocean(
    native: &NativeOceanGrid,
    target: &TargetGrid,
    cache: &WeightCache,
) -> OceanGrid {
    let weights = cache.get_or_compute(native, target);
    debug_assert_eq!(weights.src_shape, native.lat2d.dim());
    debug_assert_eq!(
        weights.tgt_shape,
        (target.lats.len(), target.lons.len())
    );

    let (nk, _, nx) = native.values.dim();
    let (tny, tnx) = weights.tgt_shape;
    let mut values = Array3::from_elem((nk, tny, tnx), f64::NAN);

    for k in 0..nk {
        for ti in 0..tny {
            for tj in 0..tnx {
                let flat = ti * tnx + tj;
                let mut sum = 0.0;
                let mut weight_sum = 0.0;
                for slot in 0..4 {
                    let cell = weights.neighbors[flat][slot];
                    if cell == usize::MAX {
                        continue;
                    }
                    let v = native.values[[k, cell / nx, cell % nx]];
                    if v.is_finite() {
                        sum += v * weights.weights[flat][slot];
                        weight_sum += weights.weights[flat][slot];
                    }
                }
                if weight_sum > 0.0 {
                    values[[k, ti, tj]] = sum / weight_sum;
                }
            }
        }
    }

    OceanGrid {
        meta: native.meta.clone(),
        lats: target.lats.clone(),
        lons: target.lons.clone(),
        depths_m: native.depths_m.clone(),
        values,
    }
}

fn bucket_of(lat: f64, lon: f64) -> (i32, i32) {
    (lat.floor() as i32, (lon.rem_euclid(360.0)).floor() as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::GridSource;
    use crate::data_io::GridMeta;
    use crate::time_utils::YearMonth;
    use ndarray::{Array2, Array3};

    /// Slightly rotated pseudo-curvilinear grid over a small region
    fn native_grid(value_fn: impl Fn(f64, f64, usize) -> f64) -> NativeOceanGrid {
        let (ny, nx, nk) = (20, 20, 3);
        let mut lat2d = Array2::zeros((ny, nx));
        let mut lon2d = Array2::zeros((ny, nx));
        let mut values = Array3::zeros((nk, ny, nx));
        for y in 0..ny {
            for x in 0..nx {
                let lat = 10.0 + y as f64 * 0.5 + x as f64 * 0.01;
                let lon = 280.0 + x as f64 * 0.5 + y as f64 * 0.01;
                lat2d[[y, x]] = lat;
                lon2d[[y, x]] = lon;
                for k in 0..nk {
                    values[[k, y, x]] = value_fn(lat, lon, k);
                }
            }
        }
        NativeOceanGrid {
            meta: GridMeta {
                variable: "votemper".to_string(),
                month: YearMonth::new(2000, 6),
                source: GridSource::Ocean,
            },
            lat2d,
            lon2d,
            depths_m: vec![0.5, 10.0, 50.0],
            values,
        }
    }

    fn small_target() -> TargetGrid {
        TargetGrid {
            lats: (0..10).map(|i| 12.0 + i as f64 * 0.5).collect(),
            lons: (0..10).map(|i| 282.0 + i as f64 * 0.5).collect(),
        }
    }

    #[test]
    fn test_global_target_shape() {
        let grid = TargetGrid::global(0.25);
        assert_eq!(grid.lats.len(), 720);
        assert_eq!(grid.lons.len(), 1440);
        assert!((grid.lats[0] - (-89.875)).abs() < 1e-9);
        assert!((grid.lons[0] - 0.125).abs() < 1e-9);
    }

    #[test]
    fn test_constant_field_remaps_to_constant() {
        let native = native_grid(|_, _, _| 25.0);
        let target = small_target();
        let cache = WeightCache::new();
        let grid = regrid_ocean(&native, &target, &cache);
        for &v in grid.values.iter() {
            assert!((v - 25.0).abs() < 1e-9, "value {}", v);
        }
    }

    #[test]
    fn test_linear_field_approximately_preserved() {
        let native = native_grid(|lat, _, _| lat);
        let target = small_target();
        let cache = WeightCache::new();
        let grid = regrid_ocean(&native, &target, &cache);
        for (i, &lat) in target.lats.iter().enumerate() {
            let v = grid.values[[0, i, 5]];
            assert!((v - lat).abs() < 0.3, "lat {} -> {}", lat, v);
        }
    }

    #[test]
    fn test_nan_sources_are_skipped() {
        // Land everywhere except a warm patch
        let native = native_grid(|lat, _, _| if lat < 15.0 { f64::NAN } else { 26.0 });
        let target = small_target();
        let cache = WeightCache::new();
        let grid = regrid_ocean(&native, &target, &cache);
        // Far inside the valid patch the value is exact
        let top = grid.values[[0, 9, 5]];
        assert!((top - 26.0).abs() < 1e-9);
    }

    #[test]
    fn test_weight_cache_computes_once_per_shape() {
        let native = native_grid(|_, _, _| 20.0);
        let target = small_target();
        let cache = WeightCache::new();
        let _ = regrid_ocean(&native, &target, &cache);
        let _ = regrid_ocean(&native, &target, &cache);
        assert_eq!(cache.len(), 1);
    }
}
