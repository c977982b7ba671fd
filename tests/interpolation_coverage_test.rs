mod common;

use std::path::Path;

use chrono::{TimeZone, Utc};
use tc_extract::catalog::Catalog;
use tc_extract::data_io::reader::load_pressure_level_grid;
use tc_extract::data_io::ReaderError;
use tc_extract::interp::{InterpError, Interpolator, VAR_SST, VAR_TEMPERATURE};
use tc_extract::time_utils::YearMonth;

fn global_lats() -> Vec<f64> {
    (-2..=2).map(|i| i as f64 * 5.0).collect()
}

fn global_lons() -> Vec<f64> {
    (0..72).map(|i| i as f64 * 5.0).collect()
}

/// Seed a year where the SST field is smooth across the 0/360 seam
fn seed_seam_year(root: &Path, year: i32) {
    for month in 1..=12 {
        common::write_plev_file(
            &root.join(format!(
                "era5/pressure_levels/era5_monthly_plev_{}_{:02}.nc",
                year, month
            )),
            &global_lats(),
            &global_lons(),
        );
        common::write_sl_file(
            &root.join(format!(
                "era5/single_level/era5_monthly_sl_{}_{:02}.nc",
                year, month
            )),
            &global_lats(),
            &global_lons(),
            |_, lon| 300.0 + 2.0 * lon.to_radians().cos(),
        );
    }
}

#[test]
fn interpolation_is_continuous_across_the_longitude_seam() {
    let dir = tempfile::tempdir().unwrap();
    seed_seam_year(dir.path(), 2005);
    let catalog = Catalog::build(dir.path(), 2005, 2005).unwrap();
    let interp = Interpolator::new(&catalog, 1.0);

    let when = Utc.with_ymd_and_hms(2005, 6, 20, 0, 0, 0).unwrap();
    let west = interp.surface_value(VAR_SST, 0.0, 359.9, &when).unwrap();
    let east = interp.surface_value(VAR_SST, 0.0, 0.1, &when).unwrap();

    // cos(lon) is smooth at the seam; the interpolated values must be too
    assert!(
        (west - east).abs() < 0.01,
        "seam discontinuity: {west} vs {east}"
    );
    assert!((west - 302.0).abs() < 0.1);
}

#[test]
fn values_inside_coverage_succeed_everywhere() {
    let dir = tempfile::tempdir().unwrap();
    seed_seam_year(dir.path(), 2005);
    let catalog = Catalog::build(dir.path(), 2005, 2005).unwrap();
    let interp = Interpolator::new(&catalog, 1.0);

    // From the first midpoint to the last, every timestamp resolves
    for (month, day) in [(1, 20), (3, 1), (6, 15), (9, 30), (12, 10)] {
        let when = Utc.with_ymd_and_hms(2005, month, day, 12, 0, 0).unwrap();
        let value = interp.surface_value(VAR_SST, 0.0, 180.0, &when).unwrap();
        assert!(value.is_finite(), "{month}-{day} -> {value}");
    }
}

#[test]
fn timestamps_outside_coverage_fail_explicitly() {
    let dir = tempfile::tempdir().unwrap();
    seed_seam_year(dir.path(), 2005);
    let catalog = Catalog::build(dir.path(), 2005, 2005).unwrap();
    let interp = Interpolator::new(&catalog, 1.0);

    // Before the first cataloged midpoint: would bracket December 2004
    let early = Utc.with_ymd_and_hms(2005, 1, 3, 0, 0, 0).unwrap();
    assert!(matches!(
        interp.surface_value(VAR_SST, 0.0, 180.0, &early),
        Err(InterpError::OutOfTemporalCoverage { .. })
    ));

    // After the last cataloged midpoint: would bracket January 2006
    let late = Utc.with_ymd_and_hms(2005, 12, 28, 0, 0, 0).unwrap();
    assert!(matches!(
        interp.profile(VAR_TEMPERATURE, 0.0, 180.0, &late),
        Err(InterpError::OutOfTemporalCoverage { .. })
    ));

    // A full month before the earliest cataloged month
    let before = Utc.with_ymd_and_hms(2004, 12, 5, 0, 0, 0).unwrap();
    assert!(matches!(
        interp.surface_value(VAR_SST, 0.0, 180.0, &before),
        Err(InterpError::OutOfTemporalCoverage { .. })
    ));
}

#[test]
fn profiles_carry_all_29_levels_in_order() {
    let dir = tempfile::tempdir().unwrap();
    seed_seam_year(dir.path(), 2005);
    let catalog = Catalog::build(dir.path(), 2005, 2005).unwrap();
    let interp = Interpolator::new(&catalog, 1.0);

    let when = Utc.with_ymd_and_hms(2005, 6, 20, 0, 0, 0).unwrap();
    let profile = interp.profile(VAR_TEMPERATURE, 0.0, 180.0, &when).unwrap();

    assert_eq!(profile.levels_hpa.len(), 29);
    assert_eq!(profile.values.len(), 29);
    assert_eq!(profile.levels_hpa[0], 1000.0);
    assert_eq!(profile.levels_hpa[28], 50.0);
    // Horizontally uniform field: interpolation reproduces the sounding
    for (value, expected) in profile.values.iter().zip(common::TEMPS_K.iter()) {
        assert!((value - expected).abs() < 1e-9);
    }
}

#[test]
fn wrong_level_count_is_a_schema_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad_levels.nc");

    // Hand-roll a file with only 3 pressure levels
    let mut file = netcdf::create(&path).unwrap();
    file.add_dimension("pressure_level", 3).unwrap();
    file.add_dimension("latitude", 2).unwrap();
    file.add_dimension("longitude", 2).unwrap();
    let mut var = file
        .add_variable::<f64>("pressure_level", &["pressure_level"])
        .unwrap();
    var.put_values(&[850.0, 500.0, 200.0], ..).unwrap();
    let mut var = file.add_variable::<f64>("latitude", &["latitude"]).unwrap();
    var.put_values(&[0.0, 1.0], ..).unwrap();
    let mut var = file
        .add_variable::<f64>("longitude", &["longitude"])
        .unwrap();
    var.put_values(&[0.0, 1.0], ..).unwrap();
    let mut var = file
        .add_variable::<f64>("t", &["pressure_level", "latitude", "longitude"])
        .unwrap();
    var.put_values(&[280.0; 12], ..).unwrap();
    drop(file);

    let err = load_pressure_level_grid(&path, "t", YearMonth::new(2005, 6)).unwrap_err();
    match err {
        ReaderError::DimensionMismatch { expected, got, .. } => {
            assert_eq!(expected, 29);
            assert_eq!(got, 3);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_permanent());
}

#[test]
fn missing_variable_is_a_schema_error() {
    let dir = tempfile::tempdir().unwrap();
    common::write_sl_file(&dir.path().join("sl.nc"), &[0.0, 1.0], &[0.0, 1.0], |_, _| {
        300.0
    });

    let err = load_pressure_level_grid(&dir.path().join("sl.nc"), "t", YearMonth::new(2005, 6))
        .unwrap_err();
    assert!(matches!(err, ReaderError::MissingVariable { .. }));
    assert!(err.is_permanent());
}
