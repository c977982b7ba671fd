use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{PRESSURE_LEVEL_COUNT, PI_VALID_RANGE_MS};
use crate::tracks::TcObservation;

/// Which reanalysis supplied a sample's SST.
///
/// Downstream consumers rank ocean-reanalysis SST above the atmospheric
/// estimate, so provenance travels with the value instead of being
/// re-derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SstSource {
    #[serde(rename = "ocean_reanalysis")]
    OceanReanalysis,
    #[serde(rename = "atmospheric_reanalysis")]
    AtmosphericReanalysis,
}

/// An SST value tagged with the system it came from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SstValue {
    pub kelvin: f64,
    pub source: SstSource,
}

/// Reasons a single observation fails extraction.
///
/// These are sample-local: the orchestrator drops the row, records the
/// reason, and keeps going unless the aggregate rate crosses the
/// configured threshold.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SampleError {
    #[error("timestamp {when} outside temporal coverage {first}..{last}")]
    OutOfTemporalCoverage {
        when: DateTime<Utc>,
        first: String,
        last: String,
    },

    #[error("NaN in interpolated {variable} profile")]
    NanProfile { variable: String },

    #[error("profile has {got} levels, expected {expected}")]
    ProfileLength { expected: usize, got: usize },

    #[error("surface pressure unavailable at observation location")]
    MissingSurfacePressure,

    #[error("potential intensity input invalid: {reason}")]
    PiInputInvalid { reason: String },

    #[error("potential intensity non-convergent after {iterations} iterations")]
    PiNonConvergent { iterations: usize },

    #[error("potential intensity {value_ms:.1} m/s outside [{:.0}, {:.0}] m/s", PI_VALID_RANGE_MS.0, PI_VALID_RANGE_MS.1)]
    PiOutOfBounds { value_ms: f64 },

    #[error("mixed layer undefined: profile never cools below SST threshold")]
    MixedLayerUndefined,

    #[error("grid read failed: {reason}")]
    GridRead { reason: String },
}

impl SampleError {
    /// Stable label for failure-reason bookkeeping in the run summary
    pub fn reason_label(&self) -> &'static str {
        match self {
            SampleError::OutOfTemporalCoverage { .. } => "out_of_temporal_coverage",
            SampleError::NanProfile { .. } => "nan_profile",
            SampleError::ProfileLength { .. } => "profile_length",
            SampleError::MissingSurfacePressure => "missing_surface_pressure",
            SampleError::PiInputInvalid { .. } => "pi_input_invalid",
            SampleError::PiNonConvergent { .. } => "pi_non_convergent",
            SampleError::PiOutOfBounds { .. } => "pi_out_of_bounds",
            SampleError::MixedLayerUndefined => "mixed_layer_undefined",
            SampleError::GridRead { .. } => "grid_read",
        }
    }
}

/// One assembled row of the training table: the observation plus every
/// extracted and derived environmental field. Profiles keep the fixed
/// 29-level shape required by the PI calculator.
#[derive(Debug, Clone)]
pub struct EnvironmentalSample {
    pub observation: TcObservation,

    /// Temperature profile (K), surface to top
    pub temperature_k: Vec<f64>,
    /// Specific humidity profile (kg/kg)
    pub specific_humidity: Vec<f64>,
    /// Zonal wind profile (m/s)
    pub u_wind_ms: Vec<f64>,
    /// Meridional wind profile (m/s)
    pub v_wind_ms: Vec<f64>,
    /// Relative humidity at 600 hPa (%)
    pub relative_humidity_600: Option<f64>,

    /// Surface pressure (Pa)
    pub surface_pressure_pa: f64,
    /// SST with provenance; absent when neither reanalysis covers the point
    pub sst: Option<SstValue>,

    /// 200-850 hPa wind shear (m/s)
    pub wind_shear_ms: f64,
    /// Mixed layer depth (m); absent when no ocean profile covers the point
    pub mixed_layer_depth_m: Option<f64>,
    /// Thermal stratification below the mixed layer (degC/m)
    pub thermal_stratification: Option<f64>,
    /// Ocean heat content above the 26 degC isotherm (J/m^2)
    pub ocean_heat_content: Option<f64>,
    /// Potential intensity (m/s); absent when SST was unavailable
    pub potential_intensity_ms: Option<f64>,
    /// Set when the PI value fell outside the physical range and the
    /// retain-flagged policy kept the row
    pub pi_out_of_range: bool,
    /// Minimum central pressure from the PI cycle (hPa)
    pub pi_min_pressure_hpa: Option<f64>,
    /// Translation speed (m/s); None for the first fix of a storm
    pub translation_speed_ms: Option<f64>,
    /// Ocean depth at the observation point (m); absent without a
    /// configured bathymetry grid
    pub bathymetry_m: Option<f64>,
}

impl EnvironmentalSample {
    /// Enforce the fixed-level invariant at construction time
    pub fn check_profiles(&self) -> Result<(), SampleError> {
        for profile in [
            &self.temperature_k,
            &self.specific_humidity,
            &self.u_wind_ms,
            &self.v_wind_ms,
        ] {
            if profile.len() != PRESSURE_LEVEL_COUNT {
                return Err(SampleError::ProfileLength {
                    expected: PRESSURE_LEVEL_COUNT,
                    got: profile.len(),
                });
            }
        }
        Ok(())
    }
}

/// Flat CSV row of the training table. Profile variables are written at
/// the levels downstream models consume; the full profiles stay internal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableRow {
    pub storm_id: String,
    pub basin: String,
    pub time: String,
    pub lat: f64,
    pub lon: f64,
    pub max_wind_ms: f64,
    pub min_pressure_hpa: Option<f64>,

    pub sst_k: Option<f64>,
    pub sst_source: Option<SstSource>,
    pub surface_pressure_pa: f64,

    pub temperature_850: f64,
    pub temperature_600: f64,
    pub temperature_250: f64,
    pub temperature_200: f64,
    pub u_850: f64,
    pub v_850: f64,
    pub u_250: f64,
    pub v_250: f64,
    pub u_200: f64,
    pub v_200: f64,
    pub specific_humidity_850: f64,
    pub specific_humidity_600: f64,
    pub specific_humidity_200: f64,
    pub relative_humidity_600: Option<f64>,

    pub wind_shear_ms: f64,
    pub mixed_layer_depth_m: Option<f64>,
    pub thermal_stratification: Option<f64>,
    pub ocean_heat_content: Option<f64>,
    pub pi_vmax_ms: Option<f64>,
    pub pi_min_pressure_hpa: Option<f64>,
    pub pi_out_of_range: bool,
    pub translation_speed_ms: Option<f64>,
    pub bathymetry_m: Option<f64>,
}

impl TableRow {
    pub fn from_sample(sample: &EnvironmentalSample, levels_hpa: &[f64]) -> Self {
        let at = |profile: &[f64], level: f64| -> f64 {
            levels_hpa
                .iter()
                .position(|&p| (p - level).abs() < 0.5)
                .map(|i| profile[i])
                .unwrap_or(f64::NAN)
        };

        let obs = &sample.observation;
        Self {
            storm_id: obs.storm_id.clone(),
            basin: obs.basin.code().to_string(),
            time: obs.time.format("%Y-%m-%d %H:%M:%S").to_string(),
            lat: obs.lat,
            lon: obs.lon,
            max_wind_ms: obs.max_wind_ms,
            min_pressure_hpa: obs.min_pressure_hpa,
            sst_k: sample.sst.map(|s| s.kelvin),
            sst_source: sample.sst.map(|s| s.source),
            surface_pressure_pa: sample.surface_pressure_pa,
            temperature_850: at(&sample.temperature_k, 850.0),
            temperature_600: at(&sample.temperature_k, 600.0),
            temperature_250: at(&sample.temperature_k, 250.0),
            temperature_200: at(&sample.temperature_k, 200.0),
            u_850: at(&sample.u_wind_ms, 850.0),
            v_850: at(&sample.v_wind_ms, 850.0),
            u_250: at(&sample.u_wind_ms, 250.0),
            v_250: at(&sample.v_wind_ms, 250.0),
            u_200: at(&sample.u_wind_ms, 200.0),
            v_200: at(&sample.v_wind_ms, 200.0),
            specific_humidity_850: at(&sample.specific_humidity, 850.0),
            specific_humidity_600: at(&sample.specific_humidity, 600.0),
            specific_humidity_200: at(&sample.specific_humidity, 200.0),
            relative_humidity_600: sample.relative_humidity_600,
            wind_shear_ms: sample.wind_shear_ms,
            mixed_layer_depth_m: sample.mixed_layer_depth_m,
            thermal_stratification: sample.thermal_stratification,
            ocean_heat_content: sample.ocean_heat_content,
            pi_vmax_ms: sample.potential_intensity_ms,
            pi_min_pressure_hpa: sample.pi_min_pressure_hpa,
            pi_out_of_range: sample.pi_out_of_range,
            translation_speed_ms: sample.translation_speed_ms,
            bathymetry_m: sample.bathymetry_m,
        }
    }
}
