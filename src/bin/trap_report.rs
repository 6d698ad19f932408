//! Self-contained demonstration: simulate a harmonically trapped bead with
//! the reference experiment's parameters, push the trajectory through the
//! spectral calibration chain and print the comparison as JSON.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::f64::consts::PI;

use optrap::{
    calibrate_axis, run_simulation, CalibrationConfig, ForceModel, PhysicalParams,
    PsdMethod, SimulationConfig, BOLTZMANN,
};

// Stiffness values of the reference calibration record (N/m).
const KAPPA_X: f64 = 52.707762e-9;
const KAPPA_Y: f64 = 74.882902e-9;

const STEPS: usize = 200_000;
const DT: f64 = 1e-5;

#[derive(Serialize)]
struct AxisReport {
    simulated_stiffness_n_per_m: f64,
    expected_corner_hz: f64,
    fitted_corner_hz: f64,
    recovered_stiffness_n_per_m: f64,
    recovered_stiffness_pn_per_um: f64,
    fit_converged: bool,
}

#[derive(Serialize)]
struct Report {
    steps: usize,
    dt: f64,
    temperature_k: f64,
    radius_m: f64,
    x: AxisReport,
    y: AxisReport,
}

fn main() -> Result<()> {
    env_logger::init();

    let params = PhysicalParams::default();
    let sim = SimulationConfig {
        steps: STEPS,
        dt: DT,
        drag: params.drag(),
        boltzmann: BOLTZMANN,
        temperature: params.temperature,
        force: ForceModel::Harmonic {
            k_x: KAPPA_X,
            k_y: KAPPA_Y,
        },
    };
    let mut rng = StdRng::seed_from_u64(7);
    let trajectory = run_simulation(&sim, &mut rng)?;

    let mut config = CalibrationConfig::new(1.0 / DT, params.radius);
    config.psd_method = PsdMethod::Averaged {
        segment_length: 4096,
    };

    let report = Report {
        steps: STEPS,
        dt: DT,
        temperature_k: params.temperature,
        radius_m: params.radius,
        x: axis_report(&trajectory.column(0).to_vec(), KAPPA_X, &params, &config)?,
        y: axis_report(&trajectory.column(1).to_vec(), KAPPA_Y, &params, &config)?,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn axis_report(
    series: &[f64],
    simulated_stiffness: f64,
    params: &PhysicalParams,
    config: &CalibrationConfig,
) -> Result<AxisReport> {
    let axis = calibrate_axis(series, config)?;
    Ok(AxisReport {
        simulated_stiffness_n_per_m: simulated_stiffness,
        expected_corner_hz: simulated_stiffness / (2.0 * PI * params.drag()),
        fitted_corner_hz: axis.fit.corner_frequency,
        recovered_stiffness_n_per_m: axis.stiffness.newtons_per_meter,
        recovered_stiffness_pn_per_um: axis.stiffness.piconewtons_per_micrometer,
        fit_converged: axis.fit.converged(),
    })
}
