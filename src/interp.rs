//! Spatio-temporal interpolation of monthly reanalysis fields at TC
//! observation points.
//!
//! Values are produced by bracketing the observation time between the two
//! neighboring monthly midpoints, bilinear interpolation in space on each
//! grid, and linear interpolation in time. Monthly bracketing is a
//! deliberate fidelity/cost tradeoff: the large-scale environmental fields
//! feeding TC intensity vary on monthly timescales, so sub-monthly
//! structure is intentionally not modeled. Timestamps outside the
//! cataloged span fail explicitly; there is no extrapolation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::warn;

use crate::catalog::{Catalog, GridSource};
use crate::data_io::reader::{
    load_bathymetry_grid, load_native_ocean_grid, load_pressure_level_grid, load_surface_grid,
};
use crate::data_io::regrid::{regrid_ocean, TargetGrid, WeightCache};
use crate::data_io::{OceanGrid, PressureLevelGrid, ReaderError, StaticGrid, SurfaceGrid};
use crate::math::interpolate::{bilinear_at, lin_interp};
use crate::time_utils::{bracketing_months, YearMonth};

/// ERA5 short names used in the monthly files
pub const VAR_TEMPERATURE: &str = "t";
pub const VAR_U_WIND: &str = "u";
pub const VAR_V_WIND: &str = "v";
pub const VAR_SPECIFIC_HUMIDITY: &str = "q";
pub const VAR_RELATIVE_HUMIDITY: &str = "r";
pub const VAR_SURFACE_PRESSURE: &str = "sp";
pub const VAR_SST: &str = "sst";
/// ORAS5 potential temperature
pub const VAR_OCEAN_TEMPERATURE: &str = "votemper";

#[derive(Error, Debug)]
pub enum InterpError {
    #[error("timestamp {when} outside temporal coverage {first}..{last}")]
    OutOfTemporalCoverage {
        when: DateTime<Utc>,
        first: YearMonth,
        last: YearMonth,
    },

    #[error("month {month} missing from catalog for {source:?}")]
    MissingMonth { source: GridSource, month: YearMonth },

    #[error(transparent)]
    Reader(#[from] ReaderError),
}

/// A level-resolved interpolation result
#[derive(Debug, Clone)]
pub struct ProfileValues {
    pub levels_hpa: Vec<f64>,
    pub values: Vec<f64>,
}

/// An interpolated ocean temperature profile
#[derive(Debug, Clone)]
pub struct OceanProfile {
    pub depths_m: Vec<f64>,
    pub temps_c: Vec<f64>,
}

/// Per-run cache of loaded monthly grids.
///
/// File opens are serialized behind the map lock: the underlying NetCDF C
/// library is not proven thread-safe, and one load per distinct month is
/// cheap next to per-observation work. Lookups after a month is cached
/// share the frozen Arc without further I/O.
struct GridCache<T> {
    inner: Mutex<HashMap<(String, YearMonth), Arc<T>>>,
}

impl<T> GridCache<T> {
    fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    fn get_or_load<E>(
        &self,
        variable: &str,
        month: YearMonth,
        load: impl FnOnce() -> Result<T, E>,
    ) -> Result<Arc<T>, E> {
        let mut guard = self.inner.lock().expect("grid cache poisoned");
        if let Some(grid) = guard.get(&(variable.to_string(), month)) {
            return Ok(Arc::clone(grid));
        }
        let grid = Arc::new(load()?);
        guard.insert((variable.to_string(), month), Arc::clone(&grid));
        Ok(grid)
    }
}

pub struct Interpolator<'a> {
    catalog: &'a Catalog,
    target: TargetGrid,
    plev_cache: GridCache<PressureLevelGrid>,
    surface_cache: GridCache<SurfaceGrid>,
    /// `None` is cached for months without ocean coverage so the miss is
    /// not re-tested per observation
    ocean_cache: GridCache<Option<OceanGrid>>,
    weights: WeightCache,
    loads: AtomicUsize,
    bathymetry_path: Option<PathBuf>,
    /// Time-invariant; loaded at most once. Inner None records a failed or
    /// unconfigured load so it is not retried per observation.
    bathymetry: OnceLock<Option<Arc<StaticGrid>>>,
}

impl<'a> Interpolator<'a> {
    pub fn new(catalog: &'a Catalog, target_resolution_deg: f64) -> Self {
        Self {
            catalog,
            target: TargetGrid::global(target_resolution_deg),
            plev_cache: GridCache::new(),
            surface_cache: GridCache::new(),
            ocean_cache: GridCache::new(),
            weights: WeightCache::new(),
            loads: AtomicUsize::new(0),
            bathymetry_path: None,
            bathymetry: OnceLock::new(),
        }
    }

    pub fn with_bathymetry(mut self, path: Option<PathBuf>) -> Self {
        self.bathymetry_path = path;
        self
    }

    /// Ocean depth at the observation point, where a bathymetry grid is
    /// configured and readable. Bathymetry is auxiliary: a missing or
    /// unreadable grid leaves the column empty instead of failing samples.
    pub fn bathymetry(&self, lat: f64, lon: f64) -> Option<f64> {
        let grid = self
            .bathymetry
            .get_or_init(|| {
                let path = self.bathymetry_path.as_ref()?;
                self.loads.fetch_add(1, Ordering::Relaxed);
                match load_bathymetry_grid(path) {
                    Ok(grid) => Some(Arc::new(grid)),
                    Err(err) => {
                        warn!(error = %err, "bathymetry grid unreadable; column left empty");
                        None
                    }
                }
            })
            .as_ref()?;
        let value = bilinear_at(&grid.lats, &grid.lons, grid.values.view(), lat, lon);
        value.is_finite().then_some(value)
    }

    /// Number of grid files read so far; equals the number of distinct
    /// (variable, year, month) tuples touched thanks to the month cache.
    pub fn grid_loads(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    /// Bracketing months for `when`, failing when either falls outside
    /// the cataloged span
    pub fn bracket(&self, when: &DateTime<Utc>) -> Result<(YearMonth, YearMonth, f64), InterpError> {
        let (m0, m1, frac) = bracketing_months(when);
        let (first, last) = self.catalog.temporal_span();
        if !self.catalog.contains_month(m0) || !self.catalog.contains_month(m1) {
            return Err(InterpError::OutOfTemporalCoverage {
                when: *when,
                first,
                last,
            });
        }
        Ok((m0, m1, frac))
    }

    /// Interpolate a single-level variable at (lat, lon, when)
    pub fn surface_value(
        &self,
        variable: &str,
        lat: f64,
        lon: f64,
        when: &DateTime<Utc>,
    ) -> Result<f64, InterpError> {
        let (m0, m1, frac) = self.bracket(when)?;
        let g0 = self.surface_grid(variable, m0)?;
        let g1 = self.surface_grid(variable, m1)?;
        let v0 = bilinear_at(&g0.lats, &g0.lons, g0.values.view(), lat, lon);
        let v1 = bilinear_at(&g1.lats, &g1.lons, g1.values.view(), lat, lon);
        Ok(lin_interp(v0, v1, frac))
    }

    /// Interpolate a pressure-level variable at (lat, lon, when) across
    /// all 29 levels
    pub fn profile(
        &self,
        variable: &str,
        lat: f64,
        lon: f64,
        when: &DateTime<Utc>,
    ) -> Result<ProfileValues, InterpError> {
        let (m0, m1, frac) = self.bracket(when)?;
        let g0 = self.plev_grid(variable, m0)?;
        let g1 = self.plev_grid(variable, m1)?;

        let n = g0.levels_hpa.len();
        let mut values = Vec::with_capacity(n);
        for k in 0..n {
            let v0 = bilinear_at(
                &g0.lats,
                &g0.lons,
                g0.values.index_axis(ndarray::Axis(0), k),
                lat,
                lon,
            );
            let v1 = bilinear_at(
                &g1.lats,
                &g1.lons,
                g1.values.index_axis(ndarray::Axis(0), k),
                lat,
                lon,
            );
            values.push(lin_interp(v0, v1, frac));
        }

        Ok(ProfileValues {
            levels_hpa: g0.levels_hpa.clone(),
            values,
        })
    }

    /// Interpolated ocean temperature profile, or `None` when either
    /// bracketing month lacks ocean coverage
    pub fn ocean_profile(
        &self,
        lat: f64,
        lon: f64,
        when: &DateTime<Utc>,
    ) -> Result<Option<OceanProfile>, InterpError> {
        let (m0, m1, frac) = self.bracket(when)?;
        let g0 = self.ocean_grid(m0)?;
        let g1 = self.ocean_grid(m1)?;
        let (g0, g1) = match (g0.as_ref(), g1.as_ref()) {
            (Some(a), Some(b)) => (a, b),
            _ => return Ok(None),
        };

        let n = g0.depths_m.len().min(g1.depths_m.len());
        let mut temps = Vec::with_capacity(n);
        for k in 0..n {
            let v0 = bilinear_at(
                &g0.lats,
                &g0.lons,
                g0.values.index_axis(ndarray::Axis(0), k),
                lat,
                lon,
            );
            let v1 = bilinear_at(
                &g1.lats,
                &g1.lons,
                g1.values.index_axis(ndarray::Axis(0), k),
                lat,
                lon,
            );
            temps.push(lin_interp(v0, v1, frac));
        }

        Ok(Some(OceanProfile {
            depths_m: g0.depths_m[..n].to_vec(),
            temps_c: temps,
        }))
    }

    /// Ocean-reanalysis SST: the shallowest level of the interpolated
    /// profile, in Celsius. `None` when the point or month is uncovered.
    pub fn ocean_sst(
        &self,
        lat: f64,
        lon: f64,
        when: &DateTime<Utc>,
    ) -> Result<Option<f64>, InterpError> {
        Ok(self
            .ocean_profile(lat, lon, when)?
            .and_then(|p| p.temps_c.first().copied())
            .filter(|v| v.is_finite()))
    }

    fn surface_grid(&self, variable: &str, month: YearMonth) -> Result<Arc<SurfaceGrid>, InterpError> {
        let path = self
            .catalog
            .lookup(GridSource::AtmosphereSingleLevel, month)
            .ok_or(InterpError::MissingMonth {
                source: GridSource::AtmosphereSingleLevel,
                month,
            })?
            .to_path_buf();
        self.surface_cache.get_or_load(variable, month, || {
            self.loads.fetch_add(1, Ordering::Relaxed);
            load_surface_grid(&path, variable, month).map_err(InterpError::Reader)
        })
    }

    fn plev_grid(
        &self,
        variable: &str,
        month: YearMonth,
    ) -> Result<Arc<PressureLevelGrid>, InterpError> {
        let path = self
            .catalog
            .lookup(GridSource::AtmospherePressureLevels, month)
            .ok_or(InterpError::MissingMonth {
                source: GridSource::AtmospherePressureLevels,
                month,
            })?
            .to_path_buf();
        self.plev_cache.get_or_load(variable, month, || {
            self.loads.fetch_add(1, Ordering::Relaxed);
            load_pressure_level_grid(&path, variable, month).map_err(InterpError::Reader)
        })
    }

    fn ocean_grid(&self, month: YearMonth) -> Result<Arc<Option<OceanGrid>>, InterpError> {
        let path = self
            .catalog
            .lookup(GridSource::Ocean, month)
            .map(|p| p.to_path_buf());
        self.ocean_cache
            .get_or_load(VAR_OCEAN_TEMPERATURE, month, || {
                let Some(path) = path else {
                    return Ok(None);
                };
                self.loads.fetch_add(1, Ordering::Relaxed);
                let native = load_native_ocean_grid(&path, VAR_OCEAN_TEMPERATURE, month)
                    .map_err(InterpError::Reader)?;
                Ok(Some(regrid_ocean(&native, &self.target, &self.weights)))
            })
    }
}
