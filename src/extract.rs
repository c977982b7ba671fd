//! Basin extraction orchestrator: filters the best-track archive, groups
//! observations by month to amortize grid loads, fans the per-observation
//! work out to a bounded worker pool, and assembles the training table
//! with a structured run summary.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam_channel::unbounded;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::config::{Config, PiBoundPolicy, PI_VALID_RANGE_MS};
use crate::interp::{
    InterpError, Interpolator, VAR_RELATIVE_HUMIDITY, VAR_SPECIFIC_HUMIDITY, VAR_SST,
    VAR_SURFACE_PRESSURE, VAR_TEMPERATURE, VAR_U_WIND, VAR_V_WIND,
};
use crate::math::physics::{
    mixed_layer_depth, ocean_heat_content, thermal_stratification, translation_speed, wind_shear,
    PhysicsError,
};
use crate::math::pi::{potential_intensity, PiError, PiInputs};
use crate::sample::{EnvironmentalSample, SampleError, SstSource, SstValue, TableRow};
use crate::time_utils::YearMonth;
use crate::tracks::{load_tracks, TcObservation, TrackError};

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error(transparent)]
    Track(#[from] TrackError),

    #[error("sample failure rate {failed}/{attempted} exceeds threshold {threshold:.2}")]
    FailureRateExceeded {
        failed: usize,
        attempted: usize,
        threshold: f64,
    },
}

/// A whole-month failure covering every observation in that month's group
#[derive(Debug, Clone)]
pub struct BatchFailure {
    pub month: YearMonth,
    pub observations: usize,
    pub reason: String,
}

/// Structured account of one extraction run; always emitted alongside the
/// table so a partial result is never silent.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failures_by_reason: BTreeMap<String, usize>,
    pub batch_failures: Vec<BatchFailure>,
    pub distinct_months: usize,
    pub grid_loads: usize,
    pub cancelled: bool,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Extraction summary:")?;
        writeln!(f, "  Observations attempted: {}", self.attempted)?;
        writeln!(f, "  Succeeded: {}", self.succeeded)?;
        writeln!(f, "  Failed: {}", self.failed)?;
        if !self.failures_by_reason.is_empty() {
            writeln!(f, "  Failures by reason:")?;
            for (reason, count) in &self.failures_by_reason {
                writeln!(f, "    {}: {}", reason, count)?;
            }
        }
        for batch in &self.batch_failures {
            writeln!(
                f,
                "  Batch failure {}: {} observation(s): {}",
                batch.month, batch.observations, batch.reason
            )?;
        }
        writeln!(f, "  Distinct months: {}", self.distinct_months)?;
        writeln!(f, "  Grid loads: {}", self.grid_loads)?;
        if self.cancelled {
            writeln!(f, "  Run cancelled before completing dispatch")?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct ExtractionOutcome {
    pub rows: Vec<TableRow>,
    pub summary: RunSummary,
}

/// Run a basin extraction to completion
pub fn extract(config: &Config, catalog: &Catalog) -> Result<ExtractionOutcome, ExtractError> {
    extract_with_cancel(config, catalog, &AtomicBool::new(false))
}

/// Run a basin extraction, stopping dispatch of further month groups when
/// `cancel` becomes true. Already-aggregated rows are kept intact.
pub fn extract_with_cancel(
    config: &Config,
    catalog: &Catalog,
    cancel: &AtomicBool,
) -> Result<ExtractionOutcome, ExtractError> {
    let observations = load_tracks(
        &config.tracks_path,
        config.basin,
        config.start_year,
        config.end_year,
        config.min_wind_ms,
    )?;
    info!(
        basin = %config.basin,
        observations = observations.len(),
        "filtered best-track archive"
    );

    // Translation speed needs the previous fix of the same storm, so it is
    // derived on the chronologically sorted archive before any windowing
    // or grouping reorders it.
    let speeds = translation_speeds(&observations, config);

    let (observations, speeds) = apply_chunk_window(observations, speeds, config);

    let mut groups: BTreeMap<YearMonth, Vec<usize>> = BTreeMap::new();
    for (idx, obs) in observations.iter().enumerate() {
        groups.entry(YearMonth::of(&obs.time)).or_default().push(idx);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.max_workers)
        .build()
        .expect("failed to build worker pool");

    let interp = Interpolator::new(catalog, config.target_resolution_deg)
        .with_bathymetry(config.bathymetry_path.clone());
    let progress = ProgressMonitor::new(observations.len());

    let mut summary = RunSummary {
        distinct_months: groups.len(),
        ..RunSummary::default()
    };
    let mut keyed_rows: Vec<(String, String, TableRow)> = Vec::new();

    for (&month, indices) in &groups {
        if cancel.load(Ordering::Relaxed) {
            summary.cancelled = true;
            warn!(%month, "cancellation requested; stopping dispatch");
            break;
        }

        // Probe the month's grids once: an unreadable month is one batch
        // failure, not N per-row failures.
        if let Err(reason) = probe_month(&interp, &observations[indices[0]]) {
            summary.attempted += indices.len();
            summary.failed += indices.len();
            summary.batch_failures.push(BatchFailure {
                month,
                observations: indices.len(),
                reason: reason.clone(),
            });
            warn!(%month, observations = indices.len(), reason = %reason, "month unreadable");
            continue;
        }

        let (tx, rx) = unbounded::<(usize, Result<TableRow, SampleError>)>();
        pool.install(|| {
            indices.par_iter().for_each_with(tx, |tx, &idx| {
                let result = extract_sample(&observations[idx], speeds[idx], &interp, config);
                progress.increment();
                // Receiver outlives all senders; a send cannot fail
                let _ = tx.send((idx, result));
            });
        });

        for (idx, result) in rx.iter() {
            summary.attempted += 1;
            match result {
                Ok(row) => {
                    summary.succeeded += 1;
                    let obs = &observations[idx];
                    keyed_rows.push((obs.storm_id.clone(), row.time.clone(), row));
                }
                Err(err) => {
                    summary.failed += 1;
                    *summary
                        .failures_by_reason
                        .entry(err.reason_label().to_string())
                        .or_insert(0) += 1;
                    let obs = &observations[idx];
                    warn!(
                        storm = %obs.storm_id,
                        time = %obs.time,
                        error = %err,
                        "sample extraction failed"
                    );
                }
            }
        }
    }

    summary.grid_loads = interp.grid_loads();

    if summary.attempted > 0 {
        let rate = summary.failed as f64 / summary.attempted as f64;
        if rate > config.failure_rate_threshold {
            return Err(ExtractError::FailureRateExceeded {
                failed: summary.failed,
                attempted: summary.attempted,
                threshold: config.failure_rate_threshold,
            });
        }
    }

    // Deterministic output order regardless of worker completion order
    keyed_rows.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
    let rows = keyed_rows.into_iter().map(|(_, _, row)| row).collect();

    Ok(ExtractionOutcome { rows, summary })
}

/// Translation speed per observation from the previous fix of the same
/// storm; the first fix of each storm is an explicit None.
fn translation_speeds(observations: &[TcObservation], config: &Config) -> Vec<Option<f64>> {
    let mut speeds = Vec::with_capacity(observations.len());
    for (i, obs) in observations.iter().enumerate() {
        let speed = if i > 0 && observations[i - 1].storm_id == obs.storm_id {
            let prev = &observations[i - 1];
            translation_speed(
                (prev.lat, prev.lon, prev.time),
                (obs.lat, obs.lon, obs.time),
                &config.constants,
            )
        } else {
            None
        };
        speeds.push(speed);
    }
    speeds
}

fn apply_chunk_window(
    observations: Vec<TcObservation>,
    speeds: Vec<Option<f64>>,
    config: &Config,
) -> (Vec<TcObservation>, Vec<Option<f64>>) {
    let start = config.chunk_start.unwrap_or(0).min(observations.len());
    let end = match config.chunk_size {
        Some(size) => (start + size).min(observations.len()),
        None => observations.len(),
    };
    if start > 0 || end < observations.len() {
        info!(start, end, total = observations.len(), "resumable chunk window");
    }
    (
        observations[start..end].to_vec(),
        speeds[start..end].to_vec(),
    )
}

/// Load one representative grid pair for the observation's month so that a
/// wholly unreadable month surfaces as a single batch failure
fn probe_month(interp: &Interpolator<'_>, obs: &TcObservation) -> Result<(), String> {
    match interp.profile(VAR_TEMPERATURE, obs.lat, obs.lon, &obs.time) {
        Ok(_) => {}
        // Out-of-coverage is a per-sample condition, not a month failure
        Err(InterpError::OutOfTemporalCoverage { .. }) => return Ok(()),
        Err(err) => return Err(err.to_string()),
    }
    match interp.surface_value(VAR_SURFACE_PRESSURE, obs.lat, obs.lon, &obs.time) {
        Ok(_) => Ok(()),
        Err(InterpError::OutOfTemporalCoverage { .. }) => Ok(()),
        Err(err) => Err(err.to_string()),
    }
}

fn sample_error_from_interp(err: InterpError) -> SampleError {
    match err {
        InterpError::OutOfTemporalCoverage { when, first, last } => {
            SampleError::OutOfTemporalCoverage {
                when,
                first: first.to_string(),
                last: last.to_string(),
            }
        }
        other => SampleError::GridRead {
            reason: other.to_string(),
        },
    }
}

/// Extract one observation into a table row. All failures are
/// sample-local; the caller aggregates them without aborting the run.
fn extract_sample(
    obs: &TcObservation,
    translation_speed_ms: Option<f64>,
    interp: &Interpolator<'_>,
    config: &Config,
) -> Result<TableRow, SampleError> {
    let (lat, lon, when) = (obs.lat, obs.lon, &obs.time);

    let temperature = interp
        .profile(VAR_TEMPERATURE, lat, lon, when)
        .map_err(sample_error_from_interp)?;
    let humidity = interp
        .profile(VAR_SPECIFIC_HUMIDITY, lat, lon, when)
        .map_err(sample_error_from_interp)?;
    let u_wind = interp
        .profile(VAR_U_WIND, lat, lon, when)
        .map_err(sample_error_from_interp)?;
    let v_wind = interp
        .profile(VAR_V_WIND, lat, lon, when)
        .map_err(sample_error_from_interp)?;

    for (name, profile) in [
        (VAR_TEMPERATURE, &temperature),
        (VAR_SPECIFIC_HUMIDITY, &humidity),
        (VAR_U_WIND, &u_wind),
        (VAR_V_WIND, &v_wind),
    ] {
        if profile.values.iter().any(|v| !v.is_finite()) {
            return Err(SampleError::NanProfile {
                variable: name.to_string(),
            });
        }
    }

    // Relative humidity is carried for downstream models but is not
    // essential; products without it yield an empty column.
    let relative_humidity_600 = interp
        .profile(VAR_RELATIVE_HUMIDITY, lat, lon, when)
        .ok()
        .and_then(|p| value_at(&p.levels_hpa, &p.values, 600.0))
        .filter(|v| v.is_finite());

    let surface_pressure_pa = interp
        .surface_value(VAR_SURFACE_PRESSURE, lat, lon, when)
        .map_err(sample_error_from_interp)?;
    if !surface_pressure_pa.is_finite() {
        return Err(SampleError::MissingSurfacePressure);
    }

    // SST priority: ocean reanalysis first, atmospheric estimate second,
    // provenance recorded either way
    let sst = match interp.ocean_sst(lat, lon, when).map_err(sample_error_from_interp)? {
        Some(celsius) => Some(SstValue {
            kelvin: celsius + 273.15,
            source: SstSource::OceanReanalysis,
        }),
        None => {
            let kelvin = interp
                .surface_value(VAR_SST, lat, lon, when)
                .map_err(sample_error_from_interp)?;
            kelvin.is_finite().then_some(SstValue {
                kelvin,
                source: SstSource::AtmosphericReanalysis,
            })
        }
    };

    let levels = &temperature.levels_hpa;
    let u850 = value_at(levels, &u_wind.values, 850.0).unwrap_or(f64::NAN);
    let v850 = value_at(levels, &v_wind.values, 850.0).unwrap_or(f64::NAN);
    let u200 = value_at(levels, &u_wind.values, 200.0).unwrap_or(f64::NAN);
    let v200 = value_at(levels, &v_wind.values, 200.0).unwrap_or(f64::NAN);
    let wind_shear_ms = wind_shear(u200, v200, u850, v850);

    // Ocean-derived quantities, where an ocean profile covers the point
    let mut mixed_layer_depth_m = None;
    let mut stratification = None;
    let mut heat_content = None;
    if let (Some(profile), Some(sst_value)) = (
        interp
            .ocean_profile(lat, lon, when)
            .map_err(sample_error_from_interp)?,
        sst,
    ) {
        let has_surface = profile.temps_c.first().is_some_and(|t| t.is_finite());
        if has_surface {
            let sst_c = sst_value.kelvin - 273.15;
            match mixed_layer_depth(
                &profile.depths_m,
                &profile.temps_c,
                sst_c,
                config.constants.mld_delta_c,
            ) {
                Ok(mld) => {
                    mixed_layer_depth_m = Some(mld);
                    stratification = thermal_stratification(
                        &profile.depths_m,
                        &profile.temps_c,
                        mld,
                        config.constants.stratification_interval_m,
                    )
                    .ok();
                }
                Err(PhysicsError::NoMixedLayer { .. }) => {
                    return Err(SampleError::MixedLayerUndefined);
                }
                Err(_) => {}
            }
            heat_content = Some(ocean_heat_content(
                &profile.depths_m,
                &profile.temps_c,
                &config.constants,
            ));
        }
    }

    // Potential intensity when an SST is available; a missing SST leaves
    // the column empty for the cleaner rather than failing the row
    let mut potential_intensity_ms = None;
    let mut pi_min_pressure_hpa = None;
    let mut pi_out_of_range = false;
    if let Some(sst_value) = sst {
        let inputs = PiInputs {
            sst_k: sst_value.kelvin,
            surface_pressure_pa,
            pressure_levels_hpa: levels,
            temperature_k: &temperature.values,
            specific_humidity: &humidity.values,
        };
        match potential_intensity(&inputs, &config.pi, &config.constants) {
            Ok(output) => {
                let (lo, hi) = PI_VALID_RANGE_MS;
                if output.vmax_ms < lo || output.vmax_ms > hi {
                    match config.pi_bound_policy {
                        PiBoundPolicy::Drop => {
                            return Err(SampleError::PiOutOfBounds {
                                value_ms: output.vmax_ms,
                            });
                        }
                        PiBoundPolicy::RetainFlagged => {
                            warn!(
                                storm = %obs.storm_id,
                                vmax = output.vmax_ms,
                                "potential intensity outside physical range; retained flagged"
                            );
                            pi_out_of_range = true;
                        }
                    }
                }
                potential_intensity_ms = Some(output.vmax_ms);
                pi_min_pressure_hpa = Some(output.min_pressure_hpa);
            }
            Err(PiError::InputInvalid { reason }) => {
                return Err(SampleError::PiInputInvalid { reason });
            }
            Err(PiError::NonConvergent { iterations }) => {
                return Err(SampleError::PiNonConvergent { iterations });
            }
        }
    }

    let sample = EnvironmentalSample {
        observation: obs.clone(),
        temperature_k: temperature.values,
        specific_humidity: humidity.values,
        u_wind_ms: u_wind.values,
        v_wind_ms: v_wind.values,
        relative_humidity_600,
        surface_pressure_pa,
        sst,
        wind_shear_ms,
        mixed_layer_depth_m,
        thermal_stratification: stratification,
        ocean_heat_content: heat_content,
        potential_intensity_ms,
        pi_out_of_range,
        pi_min_pressure_hpa,
        translation_speed_ms,
        bathymetry_m: interp.bathymetry(lat, lon),
    };
    sample.check_profiles()?;

    Ok(TableRow::from_sample(&sample, levels))
}

fn value_at(levels_hpa: &[f64], values: &[f64], level: f64) -> Option<f64> {
    levels_hpa
        .iter()
        .position(|&p| (p - level).abs() < 0.5)
        .map(|i| values[i])
}

/// Coarse progress reporting from the worker pool
struct ProgressMonitor {
    total: usize,
    completed: AtomicUsize,
}

impl ProgressMonitor {
    fn new(total: usize) -> Self {
        Self {
            total,
            completed: AtomicUsize::new(0),
        }
    }

    fn increment(&self) {
        let completed = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        if completed % 500 == 0 || completed == self.total {
            info!(completed, total = self.total, "extraction progress");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracks::Basin;
    use chrono::{TimeZone, Timelike, Utc};

    fn obs(storm: &str, hour: u32, lat: f64, lon: f64) -> TcObservation {
        TcObservation {
            storm_id: storm.to_string(),
            basin: Basin::NA,
            time: Utc.with_ymd_and_hms(2005, 8, 1, hour, 0, 0).unwrap(),
            lat,
            lon,
            max_wind_ms: 25.0,
            min_pressure_hpa: None,
        }
    }

    #[test]
    fn test_translation_speeds_first_fix_is_none() {
        let config = Config::for_testing(Basin::NA, 2005, 2005);
        let observations = vec![
            obs("A", 0, 10.0, 280.0),
            obs("A", 6, 10.5, 281.0),
            obs("B", 0, 12.0, 290.0),
        ];
        let speeds = translation_speeds(&observations, &config);
        assert_eq!(speeds[0], None);
        assert!(speeds[1].unwrap() > 0.0);
        assert_eq!(speeds[2], None);
    }

    #[test]
    fn test_chunk_window_bounds() {
        let config = Config {
            chunk_start: Some(1),
            chunk_size: Some(1),
            ..Config::for_testing(Basin::NA, 2005, 2005)
        };
        let observations = vec![
            obs("A", 0, 10.0, 280.0),
            obs("A", 6, 10.5, 281.0),
            obs("A", 12, 11.0, 282.0),
        ];
        let speeds = translation_speeds(&observations, &config);
        let (windowed, speeds) = apply_chunk_window(observations, speeds, &config);
        assert_eq!(windowed.len(), 1);
        assert_eq!(windowed[0].time.hour(), 6);
        // The windowed fix keeps the speed derived from its true
        // predecessor in the full archive
        assert!(speeds[0].is_some());
    }

    #[test]
    fn test_chunk_window_clamps_past_end() {
        let config = Config {
            chunk_start: Some(10),
            chunk_size: Some(5),
            ..Config::for_testing(Basin::NA, 2005, 2005)
        };
        let observations = vec![obs("A", 0, 10.0, 280.0)];
        let speeds = translation_speeds(&observations, &config);
        let (windowed, _) = apply_chunk_window(observations, speeds, &config);
        assert!(windowed.is_empty());
    }

    #[test]
    fn test_summary_display_includes_reasons() {
        let mut summary = RunSummary {
            attempted: 10,
            succeeded: 8,
            failed: 2,
            ..RunSummary::default()
        };
        summary
            .failures_by_reason
            .insert("pi_non_convergent".to_string(), 2);
        let text = summary.to_string();
        assert!(text.contains("Succeeded: 8"));
        assert!(text.contains("pi_non_convergent: 2"));
    }
}
