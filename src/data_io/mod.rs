pub mod reader;
pub mod regrid;
pub mod writer;

use std::path::PathBuf;

use ndarray::{Array2, Array3};
use thiserror::Error;

use crate::catalog::GridSource;
use crate::time_utils::YearMonth;

/// Errors from reading monthly grid files.
///
/// The orchestrator distinguishes conditions worth retrying (transient I/O)
/// from ones that are permanent for the month (absent variable, wrong grid
/// shape) via [`ReaderError::is_permanent`].
#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("grid file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("netcdf error reading {}: {reason}", path.display())]
    Netcdf { path: PathBuf, reason: String },

    #[error("variable '{name}' not found in {}", path.display())]
    MissingVariable { name: String, path: PathBuf },

    #[error("dimension '{name}' mismatch in {}: expected {expected}, got {got}", path.display())]
    DimensionMismatch {
        name: String,
        expected: usize,
        got: usize,
        path: PathBuf,
    },
}

impl ReaderError {
    /// True when retrying the same file cannot succeed (schema problems);
    /// false for I/O-level failures that may be transient.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ReaderError::MissingVariable { .. } | ReaderError::DimensionMismatch { .. }
        )
    }
}

/// Identity of one monthly grid
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GridMeta {
    pub variable: String,
    pub month: YearMonth,
    pub source: GridSource,
}

/// A time-invariant single-level field (bathymetry) on a regular grid
#[derive(Debug, Clone)]
pub struct StaticGrid {
    pub lats: Vec<f64>,
    pub lons: Vec<f64>,
    /// Values laid out [lat, lon]
    pub values: Array2<f64>,
}

/// A single-level monthly field on a regular lat/lon grid
#[derive(Debug, Clone)]
pub struct SurfaceGrid {
    pub meta: GridMeta,
    /// Latitudes, ascending (degrees north)
    pub lats: Vec<f64>,
    /// Longitudes, ascending in [0, 360)
    pub lons: Vec<f64>,
    /// Values laid out [lat, lon]
    pub values: Array2<f64>,
}

/// A pressure-level monthly field on a regular lat/lon grid
#[derive(Debug, Clone)]
pub struct PressureLevelGrid {
    pub meta: GridMeta,
    pub lats: Vec<f64>,
    pub lons: Vec<f64>,
    /// Pressure levels (hPa), descending from the surface
    pub levels_hpa: Vec<f64>,
    /// Values laid out [level, lat, lon]
    pub values: Array3<f64>,
}

/// A 3-D ocean temperature field after regridding to the regular target
/// grid. Land and below-floor cells are NaN.
#[derive(Debug, Clone)]
pub struct OceanGrid {
    pub meta: GridMeta,
    pub lats: Vec<f64>,
    pub lons: Vec<f64>,
    /// Depth levels (m), increasing downward
    pub depths_m: Vec<f64>,
    /// Values laid out [depth, lat, lon] in degC
    pub values: Array3<f64>,
}

/// Ocean temperature on the native curvilinear grid, before regridding
#[derive(Debug, Clone)]
pub struct NativeOceanGrid {
    pub meta: GridMeta,
    /// 2-D latitude of each native cell [y, x]
    pub lat2d: Array2<f64>,
    /// 2-D longitude of each native cell [y, x], normalized to [0, 360)
    pub lon2d: Array2<f64>,
    pub depths_m: Vec<f64>,
    /// Values laid out [depth, y, x] in degC, fill values masked to NaN
    pub values: Array3<f64>,
}
