use std::path::Path;

use ndarray::{Array2, Array3};
use tracing::debug;

use super::{GridMeta, NativeOceanGrid, PressureLevelGrid, ReaderError, StaticGrid, SurfaceGrid};
use crate::catalog::GridSource;
use crate::config::PRESSURE_LEVEL_COUNT;
use crate::time_utils::YearMonth;
use crate::tracks::normalize_longitude;

/// Aliases accepted for the coordinate variables across reanalysis products
const LAT_ALIASES: &[&str] = &["latitude", "lat", "nav_lat"];
const LON_ALIASES: &[&str] = &["longitude", "lon", "nav_lon"];
const LEVEL_ALIASES: &[&str] = &["pressure_level", "level", "plev"];
const DEPTH_ALIASES: &[&str] = &["depth", "deptht", "lev"];

/// Values beyond this magnitude are treated as land/fill even when the file
/// carries no _FillValue attribute
const IMPLAUSIBLE_MAGNITUDE: f64 = 1.0e10;

fn open_file(path: &Path) -> Result<netcdf::File, ReaderError> {
    if !path.exists() {
        return Err(ReaderError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    netcdf::open(path).map_err(|e| ReaderError::Netcdf {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Read a 1-D f64 variable, trying each alias in order
fn read_1d_aliased(
    file: &netcdf::File,
    aliases: &[&str],
    path: &Path,
) -> Result<Vec<f64>, ReaderError> {
    for &alias in aliases {
        if let Some(var) = file.variable(alias) {
            return var.get_values::<f64, _>(..).map_err(|e| ReaderError::Netcdf {
                path: path.to_path_buf(),
                reason: e.to_string(),
            });
        }
    }
    Err(ReaderError::MissingVariable {
        name: aliases.first().copied().unwrap_or("unknown").to_string(),
        path: path.to_path_buf(),
    })
}

fn get_variable<'f>(
    file: &'f netcdf::File,
    name: &str,
    path: &Path,
) -> Result<netcdf::Variable<'f>, ReaderError> {
    file.variable(name).ok_or_else(|| ReaderError::MissingVariable {
        name: name.to_string(),
        path: path.to_path_buf(),
    })
}

fn find_aliased<'f>(
    file: &'f netcdf::File,
    aliases: &[&str],
    path: &Path,
) -> Result<netcdf::Variable<'f>, ReaderError> {
    aliases
        .iter()
        .find_map(|&alias| file.variable(alias))
        .ok_or_else(|| ReaderError::MissingVariable {
            name: aliases.first().copied().unwrap_or("unknown").to_string(),
            path: path.to_path_buf(),
        })
}

fn fill_value_of(var: &netcdf::Variable<'_>) -> Option<f64> {
    let attr = var
        .attribute_value("_FillValue")
        .or_else(|| var.attribute_value("missing_value"))?;
    match attr.ok()? {
        netcdf::AttributeValue::Float(v) => Some(v as f64),
        netcdf::AttributeValue::Double(v) => Some(v),
        netcdf::AttributeValue::Floats(v) => v.first().map(|&f| f as f64),
        netcdf::AttributeValue::Doubles(v) => v.first().copied(),
        _ => None,
    }
}

fn mask_fill(data: &mut [f64], fill: Option<f64>) {
    for value in data.iter_mut() {
        let is_fill = match fill {
            Some(f) => (*value - f).abs() <= f.abs() * 1e-6 + 1e-30,
            None => false,
        };
        if is_fill || value.abs() > IMPLAUSIBLE_MAGNITUDE {
            *value = f64::NAN;
        }
    }
}

/// Monthly files carry a single leading time record; tolerate it and check
/// the remaining dimensions against the coordinate lengths.
fn check_dims(
    var: &netcdf::Variable<'_>,
    expected: &[(&str, usize)],
    path: &Path,
) -> Result<(), ReaderError> {
    let dims: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
    let offset = if dims.len() == expected.len() + 1 && dims[0] == 1 {
        1
    } else {
        0
    };
    if dims.len() != expected.len() + offset {
        return Err(ReaderError::DimensionMismatch {
            name: format!("{} rank", var.name()),
            expected: expected.len(),
            got: dims.len(),
            path: path.to_path_buf(),
        });
    }
    for (i, &(name, want)) in expected.iter().enumerate() {
        let got = dims[i + offset];
        if got != want {
            return Err(ReaderError::DimensionMismatch {
                name: name.to_string(),
                expected: want,
                got,
                path: path.to_path_buf(),
            });
        }
    }
    Ok(())
}

/// Load one pressure-level variable for a month. The level set is the
/// fixed 29-level ERA5 grid; any other level count is a schema error.
pub fn load_pressure_level_grid(
    path: &Path,
    variable: &str,
    month: YearMonth,
) -> Result<PressureLevelGrid, ReaderError> {
    let file = open_file(path)?;

    let lats = ascending(read_1d_aliased(&file, LAT_ALIASES, path)?);
    let lons = read_1d_aliased(&file, LON_ALIASES, path)?
        .into_iter()
        .map(normalize_longitude)
        .collect::<Vec<_>>();
    let levels_raw = read_1d_aliased(&file, LEVEL_ALIASES, path)?;

    if levels_raw.len() != PRESSURE_LEVEL_COUNT {
        return Err(ReaderError::DimensionMismatch {
            name: "pressure_level".to_string(),
            expected: PRESSURE_LEVEL_COUNT,
            got: levels_raw.len(),
            path: path.to_path_buf(),
        });
    }

    let var = get_variable(&file, variable, path)?;
    check_dims(
        &var,
        &[
            ("pressure_level", levels_raw.len()),
            ("latitude", lats.order.len()),
            ("longitude", lons.len()),
        ],
        path,
    )?;

    let mut data = var.get_values::<f64, _>(..).map_err(|e| ReaderError::Netcdf {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    mask_fill(&mut data, fill_value_of(&var));

    let (nk, ny, nx) = (levels_raw.len(), lats.order.len(), lons.len());
    let raw = Array3::from_shape_vec((nk, ny, nx), data).map_err(|e| ReaderError::Netcdf {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    // Reorder to ascending latitude and surface-to-top levels
    let level_order = descending_order(&levels_raw);
    let mut values = Array3::zeros((nk, ny, nx));
    for (k_out, &k_in) in level_order.iter().enumerate() {
        for (y_out, &y_in) in lats.order.iter().enumerate() {
            for x in 0..nx {
                values[[k_out, y_out, x]] = raw[[k_in, y_in, x]];
            }
        }
    }
    let levels_hpa: Vec<f64> = level_order.iter().map(|&k| levels_raw[k]).collect();

    debug!(variable, %month, ?path, "loaded pressure-level grid");
    Ok(PressureLevelGrid {
        meta: GridMeta {
            variable: variable.to_string(),
            month,
            source: GridSource::AtmospherePressureLevels,
        },
        lats: lats.values,
        lons,
        levels_hpa,
        values,
    })
}

/// Load one single-level variable for a month
pub fn load_surface_grid(
    path: &Path,
    variable: &str,
    month: YearMonth,
) -> Result<SurfaceGrid, ReaderError> {
    let file = open_file(path)?;

    let lats = ascending(read_1d_aliased(&file, LAT_ALIASES, path)?);
    let lons = read_1d_aliased(&file, LON_ALIASES, path)?
        .into_iter()
        .map(normalize_longitude)
        .collect::<Vec<_>>();

    let var = get_variable(&file, variable, path)?;
    check_dims(
        &var,
        &[("latitude", lats.order.len()), ("longitude", lons.len())],
        path,
    )?;

    let mut data = var.get_values::<f64, _>(..).map_err(|e| ReaderError::Netcdf {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    mask_fill(&mut data, fill_value_of(&var));

    let (ny, nx) = (lats.order.len(), lons.len());
    let raw = Array2::from_shape_vec((ny, nx), data).map_err(|e| ReaderError::Netcdf {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut values = Array2::zeros((ny, nx));
    for (y_out, &y_in) in lats.order.iter().enumerate() {
        for x in 0..nx {
            values[[y_out, x]] = raw[[y_in, x]];
        }
    }

    debug!(variable, %month, ?path, "loaded surface grid");
    Ok(SurfaceGrid {
        meta: GridMeta {
            variable: variable.to_string(),
            month,
            source: GridSource::AtmosphereSingleLevel,
        },
        lats: lats.values,
        lons,
        values,
    })
}

/// Variable names found in bathymetry/topography products
const BATHYMETRY_ALIASES: &[&str] = &["z", "elevation", "bathymetry"];

/// Load a time-invariant bathymetry grid
pub fn load_bathymetry_grid(path: &Path) -> Result<StaticGrid, ReaderError> {
    let file = open_file(path)?;

    let lats = ascending(read_1d_aliased(&file, LAT_ALIASES, path)?);
    let lons = read_1d_aliased(&file, LON_ALIASES, path)?
        .into_iter()
        .map(normalize_longitude)
        .collect::<Vec<_>>();

    let var = find_aliased(&file, BATHYMETRY_ALIASES, path)?;
    check_dims(
        &var,
        &[("latitude", lats.order.len()), ("longitude", lons.len())],
        path,
    )?;

    let mut data = var.get_values::<f64, _>(..).map_err(|e| ReaderError::Netcdf {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    mask_fill(&mut data, fill_value_of(&var));

    let (ny, nx) = (lats.order.len(), lons.len());
    let raw = Array2::from_shape_vec((ny, nx), data).map_err(|e| ReaderError::Netcdf {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut values = Array2::zeros((ny, nx));
    for (y_out, &y_in) in lats.order.iter().enumerate() {
        for x in 0..nx {
            values[[y_out, x]] = raw[[y_in, x]];
        }
    }

    debug!(?path, "loaded bathymetry grid");
    Ok(StaticGrid {
        lats: lats.values,
        lons,
        values,
    })
}

/// Load the native curvilinear ocean temperature field for a month.
/// Fill values become NaN so land shows up as missing, not as huge numbers.
pub fn load_native_ocean_grid(
    path: &Path,
    variable: &str,
    month: YearMonth,
) -> Result<NativeOceanGrid, ReaderError> {
    let file = open_file(path)?;

    let depths_m = read_1d_aliased(&file, DEPTH_ALIASES, path)?;

    let lat_var = find_aliased(&file, LAT_ALIASES, path)?;
    let lon_var = find_aliased(&file, LON_ALIASES, path)?;

    let lat_dims: Vec<usize> = lat_var.dimensions().iter().map(|d| d.len()).collect();
    let (ny, nx) = match lat_dims.as_slice() {
        [ny, nx] => (*ny, *nx),
        _ => {
            return Err(ReaderError::DimensionMismatch {
                name: "nav_lat".to_string(),
                expected: 2,
                got: lat_dims.len(),
                path: path.to_path_buf(),
            })
        }
    };

    let lat_data = lat_var
        .get_values::<f64, _>(..)
        .map_err(|e| ReaderError::Netcdf {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    let lon_data = lon_var
        .get_values::<f64, _>(..)
        .map_err(|e| ReaderError::Netcdf {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let lat2d = Array2::from_shape_vec((ny, nx), lat_data).map_err(|e| ReaderError::Netcdf {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let lon2d = Array2::from_shape_vec(
        (ny, nx),
        lon_data.into_iter().map(normalize_longitude).collect(),
    )
    .map_err(|e| ReaderError::Netcdf {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let var = get_variable(&file, variable, path)?;
    check_dims(
        &var,
        &[("depth", depths_m.len()), ("y", ny), ("x", nx)],
        path,
    )?;

    let mut data = var.get_values::<f64, _>(..).map_err(|e| ReaderError::Netcdf {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    mask_fill(&mut data, fill_value_of(&var));

    let values =
        Array3::from_shape_vec((depths_m.len(), ny, nx), data).map_err(|e| {
            ReaderError::Netcdf {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;

    debug!(variable, %month, ?path, "loaded native ocean grid");
    Ok(NativeOceanGrid {
        meta: GridMeta {
            variable: variable.to_string(),
            month,
            source: GridSource::Ocean,
        },
        lat2d,
        lon2d,
        depths_m,
        values,
    })
}

struct AscendingAxis {
    values: Vec<f64>,
    /// For each output position, the input index it came from
    order: Vec<usize>,
}

/// ERA5 stores latitude north-to-south; interpolation wants it ascending
fn ascending(coords: Vec<f64>) -> AscendingAxis {
    let mut order: Vec<usize> = (0..coords.len()).collect();
    if coords.windows(2).any(|w| w[0] > w[1]) {
        order.sort_by(|&a, &b| coords[a].partial_cmp(&coords[b]).unwrap());
    }
    let values = order.iter().map(|&i| coords[i]).collect();
    AscendingAxis { values, order }
}

/// Indices that reorder pressure levels to descend from the surface
fn descending_order(levels: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..levels.len()).collect();
    order.sort_by(|&a, &b| levels[b].partial_cmp(&levels[a]).unwrap());
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascending_reverses_north_to_south() {
        let axis = ascending(vec![30.0, 20.0, 10.0]);
        assert_eq!(axis.values, vec![10.0, 20.0, 30.0]);
        assert_eq!(axis.order, vec![2, 1, 0]);
    }

    #[test]
    fn test_ascending_keeps_sorted_axis() {
        let axis = ascending(vec![10.0, 20.0, 30.0]);
        assert_eq!(axis.values, vec![10.0, 20.0, 30.0]);
        assert_eq!(axis.order, vec![0, 1, 2]);
    }

    #[test]
    fn test_descending_order_surface_first() {
        let order = descending_order(&[50.0, 1000.0, 500.0]);
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn test_mask_fill_flags_fill_and_huge() {
        let mut data = vec![1.0, 9.96921e36, -3.4e38, 2.0];
        mask_fill(&mut data, Some(9.96921e36));
        assert_eq!(data[0], 1.0);
        assert!(data[1].is_nan());
        assert!(data[2].is_nan());
        assert_eq!(data[3], 2.0);
    }

    #[test]
    fn test_missing_file_error_is_transient() {
        let err = open_file(Path::new("/nonexistent/grid.nc")).unwrap_err();
        assert!(matches!(err, ReaderError::FileNotFound { .. }));
        assert!(!err.is_permanent());
    }
}
