//! Overdamped Langevin dynamics of a trapped microsphere, integrated with
//! the Euler-Maruyama scheme:
//!
//! `r[i] = r[i-1] + F(r[i-1])/gamma * dt + sqrt(2*kB*T/gamma*dt) * N(0,1)`
//!
//! The deterministic force is either the harmonic restoring force of an
//! ideal trap or a measured force map queried through its interpolated
//! fields. The integrator is strictly sequential in the step index; the
//! random source is injected by the caller so runs are reproducible.

use log::{debug, info};
use ndarray::Array2;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::error::TrapError;
use crate::field::InterpolatedField;
use crate::physics::ensure_positive;

/// How often the observer hook is consulted, in steps.
const OBSERVER_STRIDE: usize = 8192;

/// Deterministic force acting on the particle.
///
/// Exactly one model is active; the variant replaces the older convention
/// of passing two pairs of optional parameters and inferring the mode from
/// which pair happened to be present.
#[derive(Clone, Debug)]
pub enum ForceModel {
    /// Ideal trap, `F = -k * r` per axis (k in N/m).
    Harmonic { k_x: f64, k_y: f64 },
    /// Measured force map. `position_scale` converts the integrator's
    /// meters into the table's native position unit before each query
    /// (1e9 for a table sampled in nanometers). Outside the mapped region
    /// the force is zero and the particle diffuses freely.
    Field {
        force_x: InterpolatedField,
        force_y: InterpolatedField,
        position_scale: f64,
    },
}

/// Full description of one simulation run. All values are explicit; there
/// are no module-level defaults to mutate.
#[derive(Clone, Debug)]
pub struct SimulationConfig {
    /// Number of trajectory points, including the fixed origin point.
    pub steps: usize,
    /// Integration time step (s).
    pub dt: f64,
    /// Stokes drag coefficient gamma (N*s/m).
    pub drag: f64,
    /// Boltzmann constant (J/K); injected rather than baked in so test
    /// scenarios can rescale the thermal term.
    pub boltzmann: f64,
    /// Bath temperature (K). Zero is allowed and yields noise-free motion.
    pub temperature: f64,
    pub force: ForceModel,
}

impl SimulationConfig {
    fn validate(&self) -> Result<(), TrapError> {
        if self.steps == 0 {
            return Err(TrapError::InvalidStepCount);
        }
        if !self.dt.is_finite() || self.dt <= 0.0 {
            return Err(TrapError::InvalidTimeStep(self.dt));
        }
        ensure_positive("drag", self.drag)?;
        ensure_positive("boltzmann", self.boltzmann)?;
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(TrapError::InvalidParameter {
                name: "temperature",
                value: self.temperature,
            });
        }
        if let ForceModel::Field { position_scale, .. } = self.force {
            ensure_positive("position_scale", position_scale)?;
        }
        Ok(())
    }
}

/// Integrate one trajectory. Returns an `steps x 2` array of positions in
/// meters with row 0 pinned at the trap center.
pub fn run_simulation<R: Rng>(
    config: &SimulationConfig,
    rng: &mut R,
) -> Result<Array2<f64>, TrapError> {
    run_simulation_observed(config, rng, |_| true)
}

/// Same as [`run_simulation`], but consults `observer` every few thousand
/// steps with the current step index. Returning `false` aborts the run;
/// no partial trajectory is handed out.
pub fn run_simulation_observed<R, F>(
    config: &SimulationConfig,
    rng: &mut R,
    mut observer: F,
) -> Result<Array2<f64>, TrapError>
where
    R: Rng,
    F: FnMut(usize) -> bool,
{
    config.validate()?;
    let SimulationConfig {
        steps,
        dt,
        drag,
        boltzmann,
        temperature,
        ref force,
    } = *config;

    let noise_magnitude = (2.0 * boltzmann * temperature / drag * dt).sqrt();
    debug!("integrating {steps} steps, dt={dt:.2e}s, noise sigma={noise_magnitude:.3e} m");

    let mut trajectory = Array2::zeros((steps, 2));
    for i in 1..steps {
        let x_prev = trajectory[[i - 1, 0]];
        let y_prev = trajectory[[i - 1, 1]];

        let (force_x, force_y) = match force {
            ForceModel::Harmonic { k_x, k_y } => (-k_x * x_prev, -k_y * y_prev),
            ForceModel::Field {
                force_x,
                force_y,
                position_scale,
            } => {
                let qx = x_prev * position_scale;
                let qy = y_prev * position_scale;
                (force_x.value_at(qx, qy), force_y.value_at(qx, qy))
            }
        };

        let noise_x: f64 = rng.sample(StandardNormal);
        let noise_y: f64 = rng.sample(StandardNormal);
        trajectory[[i, 0]] = x_prev + force_x / drag * dt + noise_magnitude * noise_x;
        trajectory[[i, 1]] = y_prev + force_y / drag * dt + noise_magnitude * noise_y;

        if i % OBSERVER_STRIDE == 0 && !observer(i) {
            info!("simulation cancelled at step {i}/{steps}");
            return Err(TrapError::Cancelled { completed: i });
        }
    }
    Ok(trajectory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::ForceTable;
    use crate::physics::{PhysicalParams, BOLTZMANN};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn harmonic_config(steps: usize, temperature: f64) -> SimulationConfig {
        let params = PhysicalParams {
            temperature,
            ..PhysicalParams::default()
        };
        SimulationConfig {
            steps,
            dt: 1e-5,
            drag: params.drag(),
            boltzmann: BOLTZMANN,
            temperature,
            force: ForceModel::Harmonic {
                k_x: 5e-8,
                k_y: 5e-8,
            },
        }
    }

    #[test]
    fn trajectory_has_requested_length_and_starts_at_origin() {
        let mut rng = StdRng::seed_from_u64(1);
        let trajectory = run_simulation(&harmonic_config(4321, 300.0), &mut rng).unwrap();
        assert_eq!(trajectory.shape(), &[4321, 2]);
        assert_eq!(trajectory[[0, 0]], 0.0);
        assert_eq!(trajectory[[0, 1]], 0.0);
    }

    #[test]
    fn zero_temperature_trajectory_stays_at_the_trap_center() {
        let mut rng = StdRng::seed_from_u64(2);
        let trajectory = run_simulation(&harmonic_config(1000, 0.0), &mut rng).unwrap();
        assert!(trajectory.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn stationary_variance_matches_equipartition() {
        let config = harmonic_config(200_000, 300.0);
        let mut rng = StdRng::seed_from_u64(3);
        let trajectory = run_simulation(&config, &mut rng).unwrap();

        let n = trajectory.nrows() as f64;
        for axis in 0..2 {
            let column = trajectory.column(axis);
            let mean = column.sum() / n;
            let variance = column.iter().map(|&v| (v - mean) * (v - mean)).sum::<f64>() / n;
            let expected = BOLTZMANN * config.temperature / 5e-8;
            let relative = (variance - expected).abs() / expected;
            assert!(
                relative < 0.15,
                "axis {axis}: variance {variance:.3e} vs equipartition {expected:.3e}"
            );
        }
    }

    #[test]
    fn field_mode_reproduces_harmonic_motion_on_a_linear_map() {
        // A harmonic force sampled on a grid is linear, so barycentric
        // interpolation reproduces it exactly and the two modes must agree
        // step for step when fed the same random stream.
        let k = 5e-8_f64;
        let mut text = String::from("x_nm,y_nm,Fx,Fy\n");
        let nodes: Vec<f64> = (-5..=5).map(|i| i as f64 * 1000.0).collect();
        for &x_nm in &nodes {
            for &y_nm in &nodes {
                let fx = -k * x_nm * 1e-9;
                let fy = -k * y_nm * 1e-9;
                text.push_str(&format!("{x_nm},{y_nm},{fx:e},{fy:e}\n"));
            }
        }
        let table = ForceTable::from_text(&text).unwrap();

        let steps = 4096;
        let harmonic = harmonic_config(steps, 300.0);
        let field = SimulationConfig {
            force: ForceModel::Field {
                force_x: table.force_x(),
                force_y: table.force_y(),
                position_scale: 1e9,
            },
            ..harmonic.clone()
        };

        let mut rng_a = StdRng::seed_from_u64(4);
        let mut rng_b = StdRng::seed_from_u64(4);
        let reference = run_simulation(&harmonic, &mut rng_a).unwrap();
        let mapped = run_simulation(&field, &mut rng_b).unwrap();

        for (a, b) in reference.iter().zip(mapped.iter()) {
            assert!((a - b).abs() < 1e-12, "harmonic {a:e} vs field {b:e}");
        }
    }

    #[test]
    fn observer_can_cancel_the_run() {
        let mut rng = StdRng::seed_from_u64(5);
        let result = run_simulation_observed(&harmonic_config(100_000, 300.0), &mut rng, |_| false);
        assert!(matches!(result, Err(TrapError::Cancelled { .. })));
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut config = harmonic_config(0, 300.0);
        assert!(matches!(
            run_simulation(&config, &mut rng),
            Err(TrapError::InvalidStepCount)
        ));
        config.steps = 10;
        config.dt = -1.0;
        assert!(matches!(
            run_simulation(&config, &mut rng),
            Err(TrapError::InvalidTimeStep(_))
        ));
        config.dt = 1e-5;
        config.drag = 0.0;
        assert!(run_simulation(&config, &mut rng).is_err());
    }
}
