//! Potential intensity after Bister & Emanuel (2002).
//!
//! A near-surface parcel is lifted reversibly (total water conserved) and
//! the CAPE difference between the saturated sea-surface parcel at the
//! radius of maximum winds and the ambient boundary-layer parcel, scaled
//! by the thermodynamic efficiency and the surface-exchange coefficient
//! ratio, gives the maximum wind speed. The minimum central pressure is
//! found by fixed-point iteration with an explicit convergence state
//! machine: only `Converged` yields a usable value.

use thiserror::Error;

use crate::config::{Constants, PiConfig};

const EPS: f64 = 0.622;
/// Newton tolerance for the per-level saturated-ascent temperature (K)
const LEVEL_TOLERANCE_K: f64 = 1e-3;
const LEVEL_MAX_ITERATIONS: usize = 500;
/// Below this central pressure the fixed point has run away and no
/// physical solution exists
const RUNAWAY_PRESSURE_HPA: f64 = 400.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PiError {
    #[error("invalid input for potential intensity: {reason}")]
    InputInvalid { reason: String },

    #[error("potential intensity did not converge within {iterations} iterations")]
    NonConvergent { iterations: usize },
}

/// Terminal and intermediate states of the fixed-point solver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PiSolverState {
    Initialized,
    Iterating { iteration: usize },
    Converged { iterations: usize },
    NonConvergent,
    InputInvalid,
}

/// Inputs to one PI evaluation. Profiles are ordered surface to top
/// (descending pressure) and must share the same fixed level count.
#[derive(Debug, Clone)]
pub struct PiInputs<'a> {
    /// Sea surface temperature (K)
    pub sst_k: f64,
    /// Sea-level / surface pressure (Pa)
    pub surface_pressure_pa: f64,
    /// Pressure levels (hPa), descending
    pub pressure_levels_hpa: &'a [f64],
    /// Temperature profile (K)
    pub temperature_k: &'a [f64],
    /// Specific humidity profile (kg/kg)
    pub specific_humidity: &'a [f64],
}

#[derive(Debug, Clone, Copy)]
pub struct PiOutput {
    /// Maximum sustained wind at 10 m (m/s)
    pub vmax_ms: f64,
    /// Minimum central pressure (hPa)
    pub min_pressure_hpa: f64,
    /// Outflow temperature (K)
    pub outflow_temp_k: f64,
}

/// Fixed-point solver for the minimum central pressure
pub struct PiSolver {
    config: PiConfig,
    constants: Constants,
    state: PiSolverState,
}

enum CapeFailure {
    InvalidParcel(&'static str),
    LevelNonConvergent,
}

struct CapeResult {
    cape: f64,
    outflow_temp_k: f64,
}

impl PiSolver {
    pub fn new(config: PiConfig, constants: Constants) -> Self {
        Self {
            config,
            constants,
            state: PiSolverState::Initialized,
        }
    }

    pub fn state(&self) -> PiSolverState {
        self.state
    }

    pub fn solve(&mut self, inputs: &PiInputs<'_>) -> Result<PiOutput, PiError> {
        if let Err(reason) = validate_inputs(inputs, &self.config) {
            self.state = PiSolverState::InputInvalid;
            return Err(PiError::InputInvalid { reason });
        }

        let sst_c = inputs.sst_k - 273.15;
        let msl_hpa = inputs.surface_pressure_pa / 100.0;
        let levels = inputs.pressure_levels_hpa;
        let temps = inputs.temperature_k;

        // Mixing ratio from specific humidity, and environmental virtual
        // temperature per level
        let mixing: Vec<f64> = inputs
            .specific_humidity
            .iter()
            .map(|&q| q / (1.0 - q))
            .collect();
        let tv_env: Vec<f64> = temps
            .iter()
            .zip(&mixing)
            .map(|(&t, &r)| virtual_temperature(t, r, r))
            .collect();

        // CAPE of the ambient boundary-layer parcel, fixed across iterations
        let cape_ambient = match self.cape(temps[0], mixing[0], levels[0], levels, &tv_env, temps) {
            Ok(result) => result.cape,
            Err(failure) => return Err(self.fail_from_cape(failure)),
        };

        let mut pm = 950.0_f64;
        for iteration in 1..=self.config.max_iterations {
            self.state = PiSolverState::Iterating { iteration };

            let pp = pm.min(1000.0);

            // Ambient parcel displaced to the radius of maximum winds
            let r1 = mixing[0];
            let p1 = levels[0];
            let rp_rmw = EPS * r1 * msl_hpa / (p1 * (EPS + r1) - r1 * msl_hpa);
            let rmw = match self.cape(temps[0], rp_rmw, pp, levels, &tv_env, temps) {
                Ok(result) => result,
                Err(failure) => return Err(self.fail_from_cape(failure)),
            };

            // Saturated sea-surface parcel at the radius of maximum winds
            let es_sst = saturation_vapor_pressure_hpa(sst_c);
            let rp_sat = EPS * es_sst / (pp - es_sst);
            let sat = match self.cape(inputs.sst_k, rp_sat, pp, levels, &tv_env, temps) {
                Ok(result) => result,
                Err(failure) => return Err(self.fail_from_cape(failure)),
            };

            // Dissipative-heating efficiency term
            let rat = inputs.sst_k / sat.outflow_temp_k;

            let tv_sst = virtual_temperature(inputs.sst_k, rp_sat, rp_sat);
            let tv_avg = 0.5 * (tv_env[0] + tv_sst);

            let cat = ((rmw.cape - cape_ambient)
                + 0.5 * self.config.ck_over_cd * rat * (sat.cape - rmw.cape))
                .max(0.0);
            let p_new = msl_hpa * (-cat / (self.constants.r_dry * tv_avg)).exp();

            if (p_new - pm).abs() <= self.config.pressure_tolerance_hpa {
                self.state = PiSolverState::Converged { iterations: iteration };
                let fac = (sat.cape - rmw.cape).max(0.0);
                let vmax = self.config.wind_reduction
                    * (self.config.ck_over_cd * rat * fac).sqrt();
                return Ok(PiOutput {
                    vmax_ms: vmax,
                    min_pressure_hpa: p_new,
                    outflow_temp_k: sat.outflow_temp_k,
                });
            }

            pm = 0.5 * (pm + p_new);
            if pm < RUNAWAY_PRESSURE_HPA {
                self.state = PiSolverState::NonConvergent;
                return Err(PiError::NonConvergent { iterations: iteration });
            }
        }

        self.state = PiSolverState::NonConvergent;
        Err(PiError::NonConvergent {
            iterations: self.config.max_iterations,
        })
    }

    fn fail_from_cape(&mut self, failure: CapeFailure) -> PiError {
        match failure {
            CapeFailure::InvalidParcel(reason) => {
                self.state = PiSolverState::InputInvalid;
                PiError::InputInvalid {
                    reason: reason.to_string(),
                }
            }
            CapeFailure::LevelNonConvergent => {
                self.state = PiSolverState::NonConvergent;
                PiError::NonConvergent {
                    iterations: LEVEL_MAX_ITERATIONS,
                }
            }
        }
    }

    /// CAPE of a parcel (tp, rp, pp) lifted reversibly against the
    /// environment, with the outflow temperature at the level of neutral
    /// buoyancy.
    fn cape(
        &self,
        tp_k: f64,
        rp: f64,
        pp_hpa: f64,
        levels: &[f64],
        tv_env: &[f64],
        temps: &[f64],
    ) -> Result<CapeResult, CapeFailure> {
        let c = &self.constants;

        if rp < 1e-6 {
            return Err(CapeFailure::InvalidParcel("parcel mixing ratio below 1e-6"));
        }
        if tp_k < 200.0 {
            return Err(CapeFailure::InvalidParcel("parcel temperature below 200 K"));
        }

        let tpc = tp_k - 273.15;
        let esp = saturation_vapor_pressure_hpa(tpc);
        let evp = rp * pp_hpa / (EPS + rp);
        let rh = (evp / esp).min(1.0);
        let alv = c.lv0 + (c.cp_vapor - c.c_liquid) * tpc;

        // Parcel entropy, conserved along the reversible ascent
        let entropy = (c.cp_dry + rp * c.c_liquid) * tp_k.ln() - c.r_dry * (pp_hpa - evp).ln()
            + alv * rp / tp_k
            - rp * c.r_vapor * rh.ln();

        // Lifted condensation level (Emanuel's empirical form)
        let chi = tp_k / (1669.0 - 122.0 * rh - tp_k);
        let plcl = pp_hpa * rh.powf(chi);

        let n = levels.len();
        let mut buoyancy = vec![0.0_f64; n];
        let first = levels
            .iter()
            .position(|&p| p <= pp_hpa)
            .unwrap_or(n);

        for j in first..n {
            let p = levels[j];
            if p >= plcl {
                // Dry adiabatic below the LCL
                let tg = tp_k * (p / pp_hpa).powf(c.r_dry / c.cp_dry);
                buoyancy[j] = virtual_temperature(tg, rp, rp) - tv_env[j];
            } else {
                // Saturated ascent: invert entropy conservation for the
                // parcel temperature by Newton iteration
                let tg = self.saturated_parcel_temperature(entropy, rp, p, temps[j])?;
                let es = saturation_vapor_pressure_hpa(tg - 273.15);
                let rg = EPS * es / (p - es);
                // Reversible: the parcel is weighed down by its total water
                buoyancy[j] = virtual_temperature(tg, rg, rp) - tv_env[j];
            }
        }

        // Level of neutral buoyancy: highest level still positively buoyant
        let inb = match (first..n).filter(|&j| buoyancy[j] > 0.0).next_back() {
            Some(j) => j,
            None => {
                return Ok(CapeResult {
                    cape: 0.0,
                    outflow_temp_k: temps[0],
                })
            }
        };

        let mut positive = 0.0;
        let mut negative = 0.0;
        for j in (first + 1)..=inb {
            let pfac = c.r_dry * (buoyancy[j] + buoyancy[j - 1]) * (levels[j - 1] - levels[j])
                / (levels[j] + levels[j - 1]);
            positive += pfac.max(0.0);
            negative += (-pfac).max(0.0);
        }
        // Segment from the parcel origin down to the first lifted level
        if first <= inb && pp_hpa > levels[first] {
            let pfac = c.r_dry * buoyancy[first] * (pp_hpa - levels[first])
                / (pp_hpa + levels[first]);
            positive += pfac.max(0.0);
            negative += (-pfac).max(0.0);
        }

        Ok(CapeResult {
            cape: (positive - negative).max(0.0),
            outflow_temp_k: temps[inb],
        })
    }

    /// Temperature of a saturated parcel with entropy `entropy` and total
    /// water `rp` at pressure `p_hpa`, starting from the environmental
    /// temperature as first guess.
    fn saturated_parcel_temperature(
        &self,
        entropy: f64,
        rp: f64,
        p_hpa: f64,
        t_first_guess_k: f64,
    ) -> Result<f64, CapeFailure> {
        let c = &self.constants;
        let mut tg = t_first_guess_k;

        for _ in 0..LEVEL_MAX_ITERATIONS {
            let tc = tg - 273.15;
            let es = saturation_vapor_pressure_hpa(tc);
            let rg = EPS * es / (p_hpa - es);
            let alv = c.lv0 + (c.cp_vapor - c.c_liquid) * tc;

            let sg = (c.cp_dry + rp * c.c_liquid) * tg.ln() - c.r_dry * (p_hpa - es).ln()
                + alv * rg / tg;
            let slope =
                (c.cp_dry + rp * c.c_liquid + alv * alv * rg / (c.r_vapor * tg * tg)) / tg;

            let step = (entropy - sg) / slope;
            tg += step;
            if step.abs() < LEVEL_TOLERANCE_K {
                return Ok(tg);
            }
        }

        Err(CapeFailure::LevelNonConvergent)
    }
}

/// One-shot convenience wrapper around [`PiSolver`]
pub fn potential_intensity(
    inputs: &PiInputs<'_>,
    config: &PiConfig,
    constants: &Constants,
) -> Result<PiOutput, PiError> {
    PiSolver::new(config.clone(), constants.clone()).solve(inputs)
}

fn validate_inputs(inputs: &PiInputs<'_>, config: &PiConfig) -> Result<(), String> {
    let n = inputs.pressure_levels_hpa.len();
    if n < 3 {
        return Err(format!("profile too short: {} levels", n));
    }
    if inputs.temperature_k.len() != n || inputs.specific_humidity.len() != n {
        return Err("profile length mismatch".to_string());
    }
    if !inputs.sst_k.is_finite() {
        return Err("SST is not finite".to_string());
    }
    if !inputs.surface_pressure_pa.is_finite() || inputs.surface_pressure_pa < 40_000.0 {
        return Err("surface pressure missing or implausible".to_string());
    }
    if inputs.sst_k - 273.15 < config.min_sst_c {
        return Err(format!(
            "SST {:.1} degC below the {:.1} degC parcel-cycle minimum",
            inputs.sst_k - 273.15,
            config.min_sst_c
        ));
    }
    for (name, profile) in [
        ("pressure", inputs.pressure_levels_hpa),
        ("temperature", inputs.temperature_k),
        ("specific humidity", inputs.specific_humidity),
    ] {
        if profile.iter().any(|v| !v.is_finite()) {
            return Err(format!("NaN in {} profile", name));
        }
    }
    for pair in inputs.pressure_levels_hpa.windows(2) {
        if pair[0] <= pair[1] {
            return Err("pressure levels must descend from the surface".to_string());
        }
    }
    Ok(())
}

fn saturation_vapor_pressure_hpa(t_c: f64) -> f64 {
    6.112 * (17.67 * t_c / (243.5 + t_c)).exp()
}

fn virtual_temperature(t_k: f64, r_vapor: f64, r_total: f64) -> f64 {
    t_k * (1.0 + r_vapor / EPS) / (1.0 + r_total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PRESSURE_LEVELS_HPA;

    /// A warm, conditionally unstable tropical maritime sounding on the
    /// fixed 29-level grid.
    fn tropical_sounding() -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let levels: Vec<f64> = PRESSURE_LEVELS_HPA.to_vec();
        let temps: Vec<f64> = vec![
            299.5, 298.0, 296.6, 295.2, 293.8, 292.4, 291.0, 289.6, 288.1, 286.6, 285.0, 281.7,
            278.2, 274.4, 270.3, 265.8, 260.8, 255.2, 248.8, 241.4, 232.7, 227.8, 222.4, 216.5,
            210.0, 203.0, 196.5, 199.0, 205.0,
        ];
        let humidity: Vec<f64> = vec![
            0.0180, 0.0165, 0.0150, 0.0136, 0.0122, 0.0109, 0.0097, 0.0086, 0.0076, 0.0066,
            0.0057, 0.0042, 0.0031, 0.0022, 0.0015, 0.0010, 6.5e-4, 4.0e-4, 2.3e-4, 1.2e-4,
            5.5e-5, 3.5e-5, 2.2e-5, 1.3e-5, 7.0e-6, 4.0e-6, 3.0e-6, 3.0e-6, 3.0e-6,
        ];
        (levels, temps, humidity)
    }

    fn solver() -> PiSolver {
        PiSolver::new(PiConfig::default(), Constants::default())
    }

    #[test]
    fn test_warm_sounding_converges_in_physical_range() {
        let (levels, temps, humidity) = tropical_sounding();
        let inputs = PiInputs {
            sst_k: 302.15,
            surface_pressure_pa: 101_000.0,
            pressure_levels_hpa: &levels,
            temperature_k: &temps,
            specific_humidity: &humidity,
        };

        let mut solver = solver();
        let output = solver.solve(&inputs).expect("should converge");

        assert!(matches!(solver.state(), PiSolverState::Converged { .. }));
        assert!(output.vmax_ms >= 0.0, "vmax = {}", output.vmax_ms);
        assert!(output.vmax_ms <= 90.0, "vmax = {}", output.vmax_ms);
        assert!(output.min_pressure_hpa > RUNAWAY_PRESSURE_HPA);
        assert!(output.min_pressure_hpa < 1015.0);
        // Outflow near the tropopause, far colder than the surface
        assert!(output.outflow_temp_k < 280.0);
    }

    #[test]
    fn test_iteration_cap_reports_non_convergence() {
        let (levels, temps, humidity) = tropical_sounding();
        let inputs = PiInputs {
            sst_k: 302.15,
            surface_pressure_pa: 101_000.0,
            pressure_levels_hpa: &levels,
            temperature_k: &temps,
            specific_humidity: &humidity,
        };

        let config = PiConfig {
            max_iterations: 1,
            ..PiConfig::default()
        };
        let mut solver = PiSolver::new(config, Constants::default());
        let err = solver.solve(&inputs).unwrap_err();
        assert!(matches!(err, PiError::NonConvergent { .. }));
        assert_eq!(solver.state(), PiSolverState::NonConvergent);
    }

    #[test]
    fn test_nan_profile_is_input_invalid() {
        let (levels, mut temps, humidity) = tropical_sounding();
        temps[10] = f64::NAN;
        let inputs = PiInputs {
            sst_k: 302.15,
            surface_pressure_pa: 101_000.0,
            pressure_levels_hpa: &levels,
            temperature_k: &temps,
            specific_humidity: &humidity,
        };

        let mut solver = solver();
        let err = solver.solve(&inputs).unwrap_err();
        assert!(matches!(err, PiError::InputInvalid { .. }));
        assert_eq!(solver.state(), PiSolverState::InputInvalid);
    }

    #[test]
    fn test_cold_sst_is_input_invalid() {
        let (levels, temps, humidity) = tropical_sounding();
        let inputs = PiInputs {
            sst_k: 275.15,
            surface_pressure_pa: 101_000.0,
            pressure_levels_hpa: &levels,
            temperature_k: &temps,
            specific_humidity: &humidity,
        };

        let mut solver = solver();
        assert!(matches!(
            solver.solve(&inputs),
            Err(PiError::InputInvalid { .. })
        ));
        assert_eq!(solver.state(), PiSolverState::InputInvalid);
    }

    #[test]
    fn test_profile_length_mismatch_is_input_invalid() {
        let (levels, temps, _) = tropical_sounding();
        let short_humidity = vec![0.01; 5];
        let inputs = PiInputs {
            sst_k: 302.15,
            surface_pressure_pa: 101_000.0,
            pressure_levels_hpa: &levels,
            temperature_k: &temps,
            specific_humidity: &short_humidity,
        };
        assert!(matches!(
            solver().solve(&inputs),
            Err(PiError::InputInvalid { .. })
        ));
    }

    #[test]
    fn test_stable_sounding_yields_near_zero_vmax() {
        // Strong inversion: environment much warmer than any lifted parcel
        let levels: Vec<f64> = PRESSURE_LEVELS_HPA.to_vec();
        let temps: Vec<f64> = levels.iter().map(|&p| 320.0 - (1000.0 - p) * 0.01).collect();
        let humidity: Vec<f64> = levels.iter().map(|_| 1.0e-4).collect();
        let inputs = PiInputs {
            sst_k: 284.15,
            surface_pressure_pa: 101_000.0,
            pressure_levels_hpa: &levels,
            temperature_k: &temps,
            specific_humidity: &humidity,
        };

        let config = PiConfig {
            min_sst_c: 5.0,
            ..PiConfig::default()
        };
        let mut solver = PiSolver::new(config, Constants::default());
        let output = solver.solve(&inputs).expect("stable case converges");
        assert!(output.vmax_ms < 5.0, "vmax = {}", output.vmax_ms);
        assert!((output.min_pressure_hpa - 1010.0).abs() < 20.0);
    }

    #[test]
    fn test_saturation_vapor_pressure_reference_points() {
        // ~6.1 hPa at 0 degC, ~42.4 hPa at 30 degC
        assert!((saturation_vapor_pressure_hpa(0.0) - 6.112).abs() < 1e-6);
        let e30 = saturation_vapor_pressure_hpa(30.0);
        assert!((41.0..44.0).contains(&e30), "e(30C) = {}", e30);
    }
}
