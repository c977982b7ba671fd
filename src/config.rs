use std::path::PathBuf;
use std::sync::Arc;

use clap::ArgMatches;

use crate::tracks::Basin;

/// Physical constants used by the derived-quantity calculators
#[derive(Clone, Debug)]
pub struct Constants {
    /// Gravitational acceleration (m/s²)
    pub g: f64,
    /// Gas constant for dry air (J/(kg·K))
    pub r_dry: f64,
    /// Gas constant of water vapor (J/(kg·K))
    pub r_vapor: f64,
    /// Specific heat of dry air at constant pressure (J/(kg·K))
    pub cp_dry: f64,
    /// Specific heat of water vapor (J/(kg·K))
    pub cp_vapor: f64,
    /// Effective heat capacity of liquid water in the parcel cycle (J/(kg·K))
    pub c_liquid: f64,
    /// Latent heat of vaporization at 0 °C (J/kg)
    pub lv0: f64,
    /// Earth's radius (m)
    pub earth_radius: f64,
    /// Sea-water density for heat-content integration (kg/m³)
    pub rho_sea: f64,
    /// Sea-water specific heat (J/(kg·K))
    pub cp_sea: f64,
    /// Temperature drop below SST defining the mixed layer base (°C)
    pub mld_delta_c: f64,
    /// Depth interval below the mixed layer for the stratification gradient (m)
    pub stratification_interval_m: f64,
    /// Reference temperature for ocean heat content (°C)
    pub ohc_ref_temp_c: f64,
    /// Integration depth for ocean heat content (m)
    pub ohc_depth_m: f64,
}

impl Default for Constants {
    fn default() -> Self {
        Self {
            g: 9.81,
            r_dry: 287.04,
            r_vapor: 461.5,
            cp_dry: 1005.7,
            cp_vapor: 1870.0,
            c_liquid: 2500.0,
            lv0: 2.501e6,
            earth_radius: 6_371_000.0,
            rho_sea: 1025.0,
            cp_sea: 3990.0,
            mld_delta_c: 1.0,
            stratification_interval_m: 100.0,
            ohc_ref_temp_c: 26.0,
            ohc_depth_m: 100.0,
        }
    }
}

/// Convergence settings for the potential-intensity fixed-point iteration.
///
/// The tolerance and cap are stated here rather than inherited silently:
/// 0.5 hPa on the iterated minimum central pressure, 200 outer iterations.
#[derive(Clone, Debug)]
pub struct PiConfig {
    /// Ratio of enthalpy to momentum surface-exchange coefficients
    pub ck_over_cd: f64,
    /// Reduction factor from gradient wind to 10 m wind
    pub wind_reduction: f64,
    /// Convergence tolerance on minimum central pressure (hPa)
    pub pressure_tolerance_hpa: f64,
    /// Maximum outer fixed-point iterations before reporting non-convergence
    pub max_iterations: usize,
    /// Lower bound on physically plausible SST for the parcel cycle (°C)
    pub min_sst_c: f64,
}

impl Default for PiConfig {
    fn default() -> Self {
        Self {
            ck_over_cd: 0.9,
            wind_reduction: 0.8,
            pressure_tolerance_hpa: 0.5,
            max_iterations: 200,
            min_sst_c: 5.0,
        }
    }
}

/// What to do with a sample whose potential intensity falls outside the
/// physical range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PiBoundPolicy {
    /// Drop the row and record the reason
    Drop,
    /// Keep the row with its out-of-range flag set
    RetainFlagged,
}

impl PiBoundPolicy {
    pub fn from_str_arg(s: &str) -> Result<Self, String> {
        match s {
            "drop" => Ok(Self::Drop),
            "retain-flagged" => Ok(Self::RetainFlagged),
            other => Err(format!("invalid PI bound policy: {}", other)),
        }
    }
}

/// Number of pressure levels expected in every atmospheric profile
/// (1000-50 hPa). The PI calculator assumes this fixed level set.
pub const PRESSURE_LEVEL_COUNT: usize = 29;

/// The 29 ERA5 pressure levels used for profile extraction, in hPa,
/// ordered surface to top.
pub const PRESSURE_LEVELS_HPA: [f64; PRESSURE_LEVEL_COUNT] = [
    1000.0, 975.0, 950.0, 925.0, 900.0, 875.0, 850.0, 825.0, 800.0, 775.0, 750.0, 700.0, 650.0,
    600.0, 550.0, 500.0, 450.0, 400.0, 350.0, 300.0, 250.0, 225.0, 200.0, 175.0, 150.0, 125.0,
    100.0, 70.0, 50.0,
];

/// Physical bounds for a valid potential-intensity value (m/s)
pub const PI_VALID_RANGE_MS: (f64, f64) = (0.0, 90.0);

/// Run configuration for a basin extraction job
#[derive(Clone, Debug)]
pub struct Config {
    /// Physical constants
    pub constants: Constants,
    /// PI solver settings
    pub pi: PiConfig,

    /// Basin to extract
    pub basin: Basin,
    /// First year of the extraction window (inclusive)
    pub start_year: i32,
    /// Last year of the extraction window (inclusive)
    pub end_year: i32,
    /// Minimum sustained wind for an observation to be kept (m/s)
    pub min_wind_ms: f64,
    /// Worker pool size; 1 forces fully sequential extraction
    pub max_workers: usize,

    /// Root of the monthly reanalysis data tree
    pub data_root: PathBuf,
    /// Path to the best-track archive CSV
    pub tracks_path: PathBuf,
    /// Optional bathymetry grid (time-invariant); adds a depth column
    pub bathymetry_path: Option<PathBuf>,
    /// Output table path; derived from the basin code when absent
    pub output_path: Option<PathBuf>,

    /// Observation window for resumable partial runs
    pub chunk_start: Option<usize>,
    pub chunk_size: Option<usize>,

    /// Fraction of sample failures above which the whole run fails
    pub failure_rate_threshold: f64,
    /// Policy for PI values outside the physical range
    pub pi_bound_policy: PiBoundPolicy,
    /// Target regular grid resolution for ocean regridding (degrees)
    pub target_resolution_deg: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            constants: Constants::default(),
            pi: PiConfig::default(),
            basin: Basin::NA,
            start_year: 1980,
            end_year: 2020,
            min_wind_ms: 17.0,
            max_workers: 1,
            data_root: PathBuf::from("./data/monthly"),
            tracks_path: PathBuf::from("./data/tracks.csv"),
            bathymetry_path: None,
            output_path: None,
            chunk_start: None,
            chunk_size: None,
            failure_rate_threshold: 0.5,
            pi_bound_policy: PiBoundPolicy::Drop,
            target_resolution_deg: 0.25,
        }
    }
}

impl Config {
    /// Build a Config from the matches of the `extract` subcommand
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, String> {
        let basin: Basin = matches
            .get_one::<String>("basin")
            .unwrap()
            .parse()
            .map_err(|e: crate::tracks::TrackError| e.to_string())?;

        let start_year: i32 = parse_arg(matches, "start-year")?;
        let end_year: i32 = parse_arg(matches, "end-year")?;
        let min_wind_ms: f64 = parse_arg(matches, "min-wind-ms")?;
        let max_workers: usize = parse_arg(matches, "max-workers")?;
        let failure_rate_threshold: f64 = parse_arg(matches, "failure-rate-threshold")?;
        let target_resolution_deg: f64 = parse_arg(matches, "target-resolution")?;

        let chunk_start = match matches.get_one::<String>("chunk-start") {
            Some(v) => Some(v.parse().map_err(|_| "Invalid chunk start")?),
            None => None,
        };
        let chunk_size = match matches.get_one::<String>("chunk-size") {
            Some(v) => Some(v.parse().map_err(|_| "Invalid chunk size")?),
            None => None,
        };

        let pi_bound_policy =
            PiBoundPolicy::from_str_arg(matches.get_one::<String>("pi-bound-policy").unwrap())?;

        let config = Self {
            constants: Constants::default(),
            pi: PiConfig::default(),
            basin,
            start_year,
            end_year,
            min_wind_ms,
            max_workers,
            data_root: PathBuf::from(matches.get_one::<String>("data-root").unwrap()),
            tracks_path: PathBuf::from(matches.get_one::<String>("tracks").unwrap()),
            bathymetry_path: matches.get_one::<String>("bathymetry").map(PathBuf::from),
            output_path: matches.get_one::<String>("output").map(PathBuf::from),
            chunk_start,
            chunk_size,
            failure_rate_threshold,
            pi_bound_policy,
            target_resolution_deg,
        };

        config.validate()?;
        Ok(config)
    }

    /// Create an Arc<Config> for thread-safe sharing
    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Default output path for the basin table
    pub fn resolved_output_path(&self) -> PathBuf {
        self.output_path.clone().unwrap_or_else(|| {
            PathBuf::from(format!("tc_training_data_{}.csv", self.basin.code()))
        })
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.start_year > self.end_year {
            return Err(format!(
                "Start year {} is after end year {}",
                self.start_year, self.end_year
            ));
        }
        if self.min_wind_ms < 0.0 {
            return Err("Minimum wind speed must be non-negative".to_string());
        }
        if self.max_workers == 0 {
            return Err("Worker count must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.failure_rate_threshold) {
            return Err("Failure rate threshold must be within [0, 1]".to_string());
        }
        if self.target_resolution_deg <= 0.0 || self.target_resolution_deg > 5.0 {
            return Err("Target resolution must be within (0, 5] degrees".to_string());
        }
        if let Some(size) = self.chunk_size {
            if size == 0 {
                return Err("Chunk size must be positive".to_string());
            }
        }
        if !self.data_root.exists() {
            return Err(format!(
                "Data root does not exist: {}",
                self.data_root.display()
            ));
        }
        if !self.tracks_path.is_file() {
            return Err(format!(
                "Track archive not found: {}",
                self.tracks_path.display()
            ));
        }
        Ok(())
    }

    /// Create a Config for testing purposes (bypasses CLI parsing and path
    /// validation)
    pub fn for_testing(basin: Basin, start_year: i32, end_year: i32) -> Self {
        Self {
            basin,
            start_year,
            end_year,
            ..Self::default()
        }
    }
}

fn parse_arg<T: std::str::FromStr>(matches: &ArgMatches, name: &str) -> Result<T, String> {
    matches
        .get_one::<String>(name)
        .unwrap()
        .parse()
        .map_err(|_| format!("Invalid value for --{}", name))
}
