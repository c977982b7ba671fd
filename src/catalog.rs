use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::time_utils::YearMonth;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("data root does not exist: {}", path.display())]
    DataRootMissing { path: PathBuf },

    #[error("no monthly grids found under {}", path.display())]
    Empty { path: PathBuf },

    #[error("{source:?} coverage incomplete for {start}..={end}: {} month(s) missing, first {first}", missing.len())]
    InsufficientCoverage {
        source: GridSource,
        start: i32,
        end: i32,
        missing: Vec<YearMonth>,
        first: YearMonth,
    },
}

/// Which reanalysis system a monthly grid file belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GridSource {
    /// Atmospheric fields on pressure levels (t, u, v, q, r)
    AtmospherePressureLevels,
    /// Atmospheric single-level fields (surface pressure, SST estimate)
    AtmosphereSingleLevel,
    /// Ocean 3-D temperature on the native curvilinear grid
    Ocean,
}

impl GridSource {
    /// Relative file path for one monthly grid under the data root,
    /// following the downloader's directory layout.
    fn relative_path(&self, ym: YearMonth) -> PathBuf {
        match self {
            GridSource::AtmospherePressureLevels => PathBuf::from(format!(
                "era5/pressure_levels/era5_monthly_plev_{}_{:02}.nc",
                ym.year, ym.month
            )),
            GridSource::AtmosphereSingleLevel => PathBuf::from(format!(
                "era5/single_level/era5_monthly_sl_{}_{:02}.nc",
                ym.year, ym.month
            )),
            GridSource::Ocean => PathBuf::from(format!(
                "oras5/oras5_monthly_{}_{:02}.nc",
                ym.year, ym.month
            )),
        }
    }
}

/// Immutable index of the monthly grids available on disk.
///
/// Built to completion before any extraction worker is spawned; lookups
/// afterwards are pure reads on a frozen map, so no locking is needed on
/// the extraction hot path.
#[derive(Debug)]
pub struct Catalog {
    entries: HashMap<(GridSource, YearMonth), PathBuf>,
    first_month: YearMonth,
    last_month: YearMonth,
}

impl Catalog {
    /// Scan the data tree for every month in the requested year range.
    ///
    /// Atmospheric coverage must be complete over the range: a gap there
    /// is a fatal startup error. Ocean files may be missing for individual
    /// months; affected samples fall back to the atmospheric SST estimate
    /// and carry no ocean-derived fields.
    pub fn build(data_root: &Path, start_year: i32, end_year: i32) -> Result<Self, CatalogError> {
        if !data_root.is_dir() {
            return Err(CatalogError::DataRootMissing {
                path: data_root.to_path_buf(),
            });
        }

        let mut entries = HashMap::new();
        let mut missing_plev = Vec::new();
        let mut missing_sl = Vec::new();
        let mut ocean_gaps = 0usize;

        for year in start_year..=end_year {
            for month in 1..=12 {
                let ym = YearMonth::new(year, month);
                for source in [
                    GridSource::AtmospherePressureLevels,
                    GridSource::AtmosphereSingleLevel,
                    GridSource::Ocean,
                ] {
                    let path = data_root.join(source.relative_path(ym));
                    if path.is_file() {
                        entries.insert((source, ym), path);
                    } else {
                        match source {
                            GridSource::AtmospherePressureLevels => missing_plev.push(ym),
                            GridSource::AtmosphereSingleLevel => missing_sl.push(ym),
                            GridSource::Ocean => ocean_gaps += 1,
                        }
                    }
                }
            }
        }

        if entries.is_empty() {
            return Err(CatalogError::Empty {
                path: data_root.to_path_buf(),
            });
        }

        for (source, missing) in [
            (GridSource::AtmospherePressureLevels, missing_plev),
            (GridSource::AtmosphereSingleLevel, missing_sl),
        ] {
            if let Some(&first) = missing.first() {
                return Err(CatalogError::InsufficientCoverage {
                    source,
                    start: start_year,
                    end: end_year,
                    missing,
                    first,
                });
            }
        }

        if ocean_gaps > 0 {
            warn!(
                months = ocean_gaps,
                "ocean reanalysis gaps; affected samples fall back to atmospheric SST"
            );
        }

        let first_month = YearMonth::new(start_year, 1);
        let last_month = YearMonth::new(end_year, 12);
        let catalog = Self {
            entries,
            first_month,
            last_month,
        };
        info!(
            plev = catalog.count(GridSource::AtmospherePressureLevels),
            single_level = catalog.count(GridSource::AtmosphereSingleLevel),
            ocean = catalog.count(GridSource::Ocean),
            span = %format!("{}..{}", first_month, last_month),
            "monthly data catalog built"
        );
        Ok(catalog)
    }

    /// Pure read; `None` means the month is absent for that source.
    pub fn lookup(&self, source: GridSource, ym: YearMonth) -> Option<&Path> {
        self.entries.get(&(source, ym)).map(PathBuf::as_path)
    }

    /// First and last cataloged months (inclusive)
    pub fn temporal_span(&self) -> (YearMonth, YearMonth) {
        (self.first_month, self.last_month)
    }

    /// True when both `ym`'s midpoint-bracketing neighbors can exist inside
    /// the cataloged span.
    pub fn contains_month(&self, ym: YearMonth) -> bool {
        ym >= self.first_month && ym <= self.last_month
    }

    pub fn count(&self, source: GridSource) -> usize {
        self.entries.keys().filter(|(s, _)| *s == source).count()
    }
}
