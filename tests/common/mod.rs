//! Synthetic monthly-grid fixtures shared by the integration tests.
#![allow(dead_code)]

use std::path::Path;

/// The 29 extraction pressure levels, surface to top (hPa)
pub const LEVELS_HPA: [f64; 29] = [
    1000.0, 975.0, 950.0, 925.0, 900.0, 875.0, 850.0, 825.0, 800.0, 775.0, 750.0, 700.0, 650.0,
    600.0, 550.0, 500.0, 450.0, 400.0, 350.0, 300.0, 250.0, 225.0, 200.0, 175.0, 150.0, 125.0,
    100.0, 70.0, 50.0,
];

/// Warm tropical temperature (K) at each of the 29 levels
pub const TEMPS_K: [f64; 29] = [
    299.5, 298.0, 296.6, 295.2, 293.8, 292.4, 291.0, 289.6, 288.1, 286.6, 285.0, 281.7, 278.2,
    274.4, 270.3, 265.8, 260.8, 255.2, 248.8, 241.4, 232.7, 227.8, 222.4, 216.5, 210.0, 203.0,
    196.5, 199.0, 205.0,
];

/// Moist boundary layer drying aloft (kg/kg)
pub const HUMIDITY: [f64; 29] = [
    0.0180, 0.0165, 0.0150, 0.0136, 0.0122, 0.0109, 0.0097, 0.0086, 0.0076, 0.0066, 0.0057,
    0.0042, 0.0031, 0.0022, 0.0015, 0.0010, 6.5e-4, 4.0e-4, 2.3e-4, 1.2e-4, 5.5e-5, 3.5e-5,
    2.2e-5, 1.3e-5, 7.0e-6, 4.0e-6, 3.0e-6, 3.0e-6, 3.0e-6,
];

/// Zonal wind: westerly aloft so the 200-850 shear is sqrt(80) m/s
pub fn u_at(level_hpa: f64) -> f64 {
    if level_hpa >= 500.0 {
        5.0
    } else {
        13.0
    }
}

pub fn v_at(level_hpa: f64) -> f64 {
    if level_hpa >= 500.0 {
        0.0
    } else {
        4.0
    }
}

/// Ocean temperature profile: 29 degC at the surface cooling 0.05 degC/m
pub fn ocean_temp_at(depth_m: f64) -> f64 {
    29.0 - 0.05 * depth_m
}

pub const OCEAN_DEPTHS_M: [f64; 15] = [
    0.5, 5.0, 10.0, 15.0, 20.0, 25.0, 30.0, 40.0, 50.0, 60.0, 80.0, 100.0, 120.0, 150.0, 200.0,
];

/// Write one ERA5-style pressure-level file with t, q, u, v, r fields that
/// are horizontally uniform (so interpolated profiles are exact).
pub fn write_plev_file(path: &Path, lats: &[f64], lons: &[f64]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut file = netcdf::create(path).expect("create plev file");

    file.add_dimension("pressure_level", LEVELS_HPA.len())
        .unwrap();
    file.add_dimension("latitude", lats.len()).unwrap();
    file.add_dimension("longitude", lons.len()).unwrap();

    put_1d(&mut file, "pressure_level", &LEVELS_HPA);
    put_1d(&mut file, "latitude", lats);
    put_1d(&mut file, "longitude", lons);

    let n_cell = lats.len() * lons.len();
    let per_level = |f: &dyn Fn(usize) -> f64| -> Vec<f64> {
        let mut data = Vec::with_capacity(LEVELS_HPA.len() * n_cell);
        for (k, _) in LEVELS_HPA.iter().enumerate() {
            data.extend(std::iter::repeat(f(k)).take(n_cell));
        }
        data
    };

    put_3d(&mut file, "t", &per_level(&|k| TEMPS_K[k]));
    put_3d(&mut file, "q", &per_level(&|k| HUMIDITY[k]));
    put_3d(&mut file, "u", &per_level(&|k| u_at(LEVELS_HPA[k])));
    put_3d(&mut file, "v", &per_level(&|k| v_at(LEVELS_HPA[k])));
    put_3d(&mut file, "r", &per_level(&|_| 55.0));
}

/// Write one ERA5-style single-level file. `sst_fn(lat, lon)` supplies the
/// SST field in Kelvin; surface pressure is uniform 1010 hPa.
pub fn write_sl_file(path: &Path, lats: &[f64], lons: &[f64], sst_fn: impl Fn(f64, f64) -> f64) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut file = netcdf::create(path).expect("create sl file");

    file.add_dimension("latitude", lats.len()).unwrap();
    file.add_dimension("longitude", lons.len()).unwrap();

    put_1d(&mut file, "latitude", lats);
    put_1d(&mut file, "longitude", lons);

    let mut sp = Vec::with_capacity(lats.len() * lons.len());
    let mut sst = Vec::with_capacity(lats.len() * lons.len());
    for &lat in lats {
        for &lon in lons {
            sp.push(101_000.0);
            sst.push(sst_fn(lat, lon));
        }
    }

    put_2d(&mut file, "sp", &sp);
    put_2d(&mut file, "sst", &sst);
}

/// Write one ORAS5-style ocean file on a slightly sheared curvilinear grid
/// spanning [lat0, lat0+extent] x [lon0, lon0+extent].
pub fn write_ocean_file(path: &Path, lat0: f64, lon0: f64, extent: f64, n: usize) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut file = netcdf::create(path).expect("create ocean file");

    file.add_dimension("deptht", OCEAN_DEPTHS_M.len()).unwrap();
    file.add_dimension("y", n).unwrap();
    file.add_dimension("x", n).unwrap();

    put_1d_named(&mut file, "deptht", &["deptht"], &OCEAN_DEPTHS_M);

    let step = extent / (n - 1) as f64;
    let mut lat2d = Vec::with_capacity(n * n);
    let mut lon2d = Vec::with_capacity(n * n);
    for y in 0..n {
        for x in 0..n {
            lat2d.push(lat0 + y as f64 * step + x as f64 * 0.01);
            lon2d.push(lon0 + x as f64 * step + y as f64 * 0.01);
        }
    }
    put_1d_named(&mut file, "nav_lat", &["y", "x"], &lat2d);
    put_1d_named(&mut file, "nav_lon", &["y", "x"], &lon2d);

    let mut temps = Vec::with_capacity(OCEAN_DEPTHS_M.len() * n * n);
    for &depth in &OCEAN_DEPTHS_M {
        for _ in 0..(n * n) {
            temps.push(ocean_temp_at(depth));
        }
    }
    put_1d_named(&mut file, "votemper", &["deptht", "y", "x"], &temps);
}

/// Seed a full year of atmosphere (and optionally ocean) fixtures under
/// `root` with uniform SST `sst_k`.
pub fn seed_year(root: &Path, year: i32, lats: &[f64], lons: &[f64], sst_k: f64, ocean: bool) {
    for month in 1..=12 {
        write_plev_file(
            &root.join(format!(
                "era5/pressure_levels/era5_monthly_plev_{}_{:02}.nc",
                year, month
            )),
            lats,
            lons,
        );
        write_sl_file(
            &root.join(format!(
                "era5/single_level/era5_monthly_sl_{}_{:02}.nc",
                year, month
            )),
            lats,
            lons,
            |_, _| sst_k,
        );
        if ocean {
            write_ocean_file(
                &root.join(format!("oras5/oras5_monthly_{}_{:02}.nc", year, month)),
                lats[0],
                lons[0],
                lats[lats.len() - 1] - lats[0],
                24,
            );
        }
    }
}

/// Write a time-invariant bathymetry grid with a uniform depth
pub fn write_bathymetry_file(path: &Path, lats: &[f64], lons: &[f64], depth_m: f64) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut file = netcdf::create(path).expect("create bathymetry file");

    file.add_dimension("latitude", lats.len()).unwrap();
    file.add_dimension("longitude", lons.len()).unwrap();
    put_1d(&mut file, "latitude", lats);
    put_1d(&mut file, "longitude", lons);

    let z = vec![depth_m; lats.len() * lons.len()];
    put_2d(&mut file, "z", &z);
}

fn put_1d(file: &mut netcdf::FileMut, name: &str, data: &[f64]) {
    put_1d_named(file, name, &[name], data);
}

fn put_1d_named(file: &mut netcdf::FileMut, name: &str, dims: &[&str], data: &[f64]) {
    let mut var = file.add_variable::<f64>(name, dims).unwrap();
    var.put_values(data, ..).unwrap();
}

fn put_2d(file: &mut netcdf::FileMut, name: &str, data: &[f64]) {
    put_1d_named(file, name, &["latitude", "longitude"], data);
}

fn put_3d(file: &mut netcdf::FileMut, name: &str, data: &[f64]) {
    put_1d_named(
        file,
        name,
        &["pressure_level", "latitude", "longitude"],
        data,
    );
}
