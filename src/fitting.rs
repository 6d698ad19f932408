//! Nonlinear fit of a measured PSD against the single-corner Lorentzian
//! model of a harmonically trapped Brownian particle,
//! `S(f) = D / (pi^2 * (fc^2 + f^2))`.
//!
//! The fit runs a damped Gauss-Newton (Levenberg-Marquardt) loop over the
//! log-parameters `(ln fc, ln D)`, which keeps both parameters positive by
//! construction. Residuals can be taken on a linear or logarithmic power
//! scale; the log scale weighs the pre-corner plateau and the 1/f^2 tail
//! evenly and is the default.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::TrapError;
use crate::physics::ensure_positive;
use crate::spectral::PsdEstimate;

/// Residual scale for the least-squares target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitScale {
    /// Minimize `ln S(f) - ln P`, which balances plateau and tail.
    Log,
    /// Minimize `S(f) - P`, which lets the plateau dominate.
    Linear,
}

/// Configuration of one Lorentzian fit.
///
/// Historical analysis revisions used different passbands (10-5000 Hz,
/// 2-8000 Hz, 1-2000 Hz); the band is configuration here rather than a
/// constant.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct FitConfig {
    /// Frequencies outside `[low, high]` (Hz) are excluded: below sits
    /// setup drift, above sits detection noise.
    pub passband: (f64, f64),
    pub scale: FitScale,
    /// Explicit `(fc0, D0)` starting point; when `None` the guess is
    /// derived from the data (plateau mean and a mid-band corner).
    pub initial_guess: Option<(f64, f64)>,
    pub max_iterations: usize,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            passband: (10.0, 5000.0),
            scale: FitScale::Log,
            initial_guess: None,
            max_iterations: 200,
        }
    }
}

/// Outcome flag of the optimizer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitStatus {
    Converged,
    /// The optimizer failed; the reported parameters are the initial guess.
    FellBack,
}

/// Fitted Lorentzian parameters.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct FitResult {
    /// Corner frequency fc (Hz), always positive.
    pub corner_frequency: f64,
    /// Diffusion-scale amplitude D (signal^2/s), always positive.
    pub diffusion: f64,
    pub status: FitStatus,
    pub iterations: usize,
}

impl FitResult {
    pub fn converged(&self) -> bool {
        self.status == FitStatus::Converged
    }
}

/// The Lorentzian PSD model `S(f) = D / (pi^2 * (fc^2 + f^2))`.
pub fn lorentzian(frequency: f64, corner_frequency: f64, diffusion: f64) -> f64 {
    diffusion / (PI * PI * (corner_frequency * corner_frequency + frequency * frequency))
}

/// Fit the Lorentzian model to a PSD estimate.
pub fn fit_lorentzian(psd: &PsdEstimate, config: &FitConfig) -> Result<FitResult, TrapError> {
    fit_lorentzian_points(&psd.frequencies, &psd.powers, config)
}

/// Fit the Lorentzian model to raw (frequency, power) arrays.
pub fn fit_lorentzian_points(
    frequencies: &[f64],
    powers: &[f64],
    config: &FitConfig,
) -> Result<FitResult, TrapError> {
    let (low, high) = config.passband;
    if !(low.is_finite() && high.is_finite()) || low >= high {
        return Err(TrapError::InvalidPassband { low, high });
    }

    // Passband restriction; log-scale residuals additionally need P > 0.
    let mut points: Vec<(f64, f64)> = Vec::new();
    for (&f, &p) in frequencies.iter().zip(powers) {
        if f < low || f > high || !p.is_finite() {
            continue;
        }
        if config.scale == FitScale::Log && p <= 0.0 {
            continue;
        }
        points.push((f, p));
    }
    if points.len() < 2 {
        return Err(TrapError::NotEnoughPoints {
            needed: 2,
            got: points.len(),
        });
    }

    let guess = match config.initial_guess {
        Some(guess) => guess,
        None => derive_guess(&points),
    };
    ensure_positive("initial corner frequency", guess.0)?;
    ensure_positive("initial diffusion", guess.1)?;

    match levenberg_marquardt(&points, guess, config) {
        Some((corner_frequency, diffusion, iterations)) => {
            debug!("lorentzian fit converged: fc={corner_frequency:.3} Hz after {iterations} it");
            Ok(FitResult {
                corner_frequency,
                diffusion,
                status: FitStatus::Converged,
                iterations,
            })
        }
        None => {
            warn!("lorentzian fit did not converge; falling back to the initial guess");
            Ok(FitResult {
                corner_frequency: guess.0,
                diffusion: guess.1,
                status: FitStatus::FellBack,
                iterations: config.max_iterations,
            })
        }
    }
}

/// Data-derived starting point: D0 from the pre-corner plateau (mean of the
/// lowest bins), fc0 a conservative mid-band constant.
fn derive_guess(points: &[(f64, f64)]) -> (f64, f64) {
    let plateau_bins = points.len().min(5);
    let plateau =
        points[..plateau_bins].iter().map(|&(_, p)| p).sum::<f64>() / plateau_bins as f64;
    let diffusion = if plateau > 0.0 { plateau } else { 1e-3 };
    (100.0, diffusion)
}

struct Quadratic {
    cost: f64,
    jtj: [[f64; 2]; 2],
    jtr: [f64; 2],
}

/// Cost, J^T J and J^T r at log-parameters `u = (ln fc, ln D)`.
fn evaluate(points: &[(f64, f64)], u: [f64; 2], scale: FitScale) -> Option<Quadratic> {
    let corner = u[0].exp();
    let corner_sq = corner * corner;
    let mut cost = 0.0;
    let mut jtj = [[0.0; 2]; 2];
    let mut jtr = [0.0; 2];
    for &(f, p) in points {
        let denom = corner_sq + f * f;
        let model = u[1].exp() / (PI * PI * denom);
        // d ln S / d ln fc; the ln D derivative is exactly 1.
        let dlog_dcorner = -2.0 * corner_sq / denom;
        let (residual, j0, j1) = match scale {
            FitScale::Log => (model.ln() - p.ln(), dlog_dcorner, 1.0),
            FitScale::Linear => (model - p, model * dlog_dcorner, model),
        };
        if !residual.is_finite() {
            return None;
        }
        cost += residual * residual;
        jtj[0][0] += j0 * j0;
        jtj[0][1] += j0 * j1;
        jtj[1][1] += j1 * j1;
        jtr[0] += j0 * residual;
        jtr[1] += j1 * residual;
    }
    jtj[1][0] = jtj[0][1];
    cost.is_finite().then_some(Quadratic { cost, jtj, jtr })
}

/// Damped Gauss-Newton loop in log-parameter space.
///
/// Returns `(fc, D, iterations)` on convergence, `None` on failure.
fn levenberg_marquardt(
    points: &[(f64, f64)],
    guess: (f64, f64),
    config: &FitConfig,
) -> Option<(f64, f64, usize)> {
    let mut u = [guess.0.ln(), guess.1.ln()];
    let mut current = evaluate(points, u, config.scale)?;
    let mut damping = 1e-3;

    for iteration in 1..=config.max_iterations {
        // Solve (J^T J + damping * diag(J^T J)) step = -J^T r.
        let a00 = current.jtj[0][0] * (1.0 + damping);
        let a11 = current.jtj[1][1] * (1.0 + damping);
        let a01 = current.jtj[0][1];
        let det = a00 * a11 - a01 * a01;
        if det.abs() < 1e-300 {
            damping *= 10.0;
            if damping > 1e12 {
                return None;
            }
            continue;
        }
        let step = [
            (-current.jtr[0] * a11 + current.jtr[1] * a01) / det,
            (-current.jtr[1] * a00 + current.jtr[0] * a01) / det,
        ];
        if step[0].abs().max(step[1].abs()) < 1e-10 {
            return Some((u[0].exp(), u[1].exp(), iteration));
        }

        let trial_u = [u[0] + step[0], u[1] + step[1]];
        match evaluate(points, trial_u, config.scale) {
            Some(trial) if trial.cost <= current.cost => {
                let relative_drop = (current.cost - trial.cost) / current.cost.max(1e-300);
                u = trial_u;
                current = trial;
                damping = (damping / 3.0).max(1e-12);
                if relative_drop < 1e-14 {
                    return Some((u[0].exp(), u[1].exp(), iteration));
                }
            }
            _ => {
                damping *= 10.0;
                if damping > 1e12 {
                    return None;
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_psd(corner: f64, diffusion: f64) -> (Vec<f64>, Vec<f64>) {
        let frequencies: Vec<f64> = (1..=4000).map(|k| 1.25 * k as f64).collect();
        let powers = frequencies
            .iter()
            .map(|&f| lorentzian(f, corner, diffusion))
            .collect();
        (frequencies, powers)
    }

    #[test]
    fn recovers_known_parameters_within_one_percent() {
        let (frequencies, powers) = synthetic_psd(120.0, 5e-4);
        let result =
            fit_lorentzian_points(&frequencies, &powers, &FitConfig::default()).unwrap();
        assert!(result.converged());
        assert!((result.corner_frequency - 120.0).abs() / 120.0 < 0.01);
        assert!((result.diffusion - 5e-4).abs() / 5e-4 < 0.01);
    }

    #[test]
    fn linear_scale_also_recovers_parameters() {
        let (frequencies, powers) = synthetic_psd(120.0, 5e-4);
        let config = FitConfig {
            scale: FitScale::Linear,
            initial_guess: Some((100.0, 1e-3)),
            ..FitConfig::default()
        };
        let result = fit_lorentzian_points(&frequencies, &powers, &config).unwrap();
        assert!(result.converged());
        assert!((result.corner_frequency - 120.0).abs() / 120.0 < 0.01);
    }

    #[test]
    fn alternative_passbands_are_plain_configuration() {
        let (frequencies, powers) = synthetic_psd(120.0, 5e-4);
        for passband in [(2.0, 8000.0), (1.0, 2000.0)] {
            let config = FitConfig {
                passband,
                ..FitConfig::default()
            };
            let result = fit_lorentzian_points(&frequencies, &powers, &config).unwrap();
            assert!((result.corner_frequency - 120.0).abs() / 120.0 < 0.01);
        }
    }

    #[test]
    fn too_few_passband_points_is_an_error() {
        let result = fit_lorentzian_points(&[50.0], &[1e-4], &FitConfig::default());
        assert!(matches!(
            result,
            Err(TrapError::NotEnoughPoints { needed: 2, got: 1 })
        ));
    }

    #[test]
    fn inverted_passband_is_rejected() {
        let (frequencies, powers) = synthetic_psd(120.0, 5e-4);
        let config = FitConfig {
            passband: (5000.0, 10.0),
            ..FitConfig::default()
        };
        assert!(matches!(
            fit_lorentzian_points(&frequencies, &powers, &config),
            Err(TrapError::InvalidPassband { .. })
        ));
    }

    #[test]
    fn nonpositive_guess_is_rejected() {
        let (frequencies, powers) = synthetic_psd(120.0, 5e-4);
        let config = FitConfig {
            initial_guess: Some((0.0, 1e-3)),
            ..FitConfig::default()
        };
        assert!(fit_lorentzian_points(&frequencies, &powers, &config).is_err());
    }

    #[test]
    fn fit_never_reports_nonpositive_parameters() {
        // Deliberately hostile data: constant power, no corner to find.
        let frequencies: Vec<f64> = (10..200).map(|k| k as f64).collect();
        let powers = vec![3e-7; frequencies.len()];
        let result =
            fit_lorentzian_points(&frequencies, &powers, &FitConfig::default()).unwrap();
        assert!(result.corner_frequency > 0.0);
        assert!(result.diffusion > 0.0);
    }
}
