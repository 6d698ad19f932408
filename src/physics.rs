//! Physical constants, particle/medium parameters and the corner-frequency
//! to stiffness conversion.
//!
//! The stiffness route deliberately needs no volts-to-meters calibration:
//! the corner frequency together with the Stokes drag fixes the stiffness,
//! `k = 2*pi*gamma*f_c` with `gamma = 6*pi*eta*R`.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::TrapError;

/// Boltzmann constant (J/K).
pub const BOLTZMANN: f64 = 1.380649e-23;

/// Dynamic viscosity of water near room temperature (Pa*s).
///
/// Calibration always uses this textbook value rather than a
/// temperature-corrected one; the measured bath temperature only enters the
/// thermal noise term. See DESIGN.md for the rationale of keeping it.
pub const WATER_VISCOSITY: f64 = 0.89e-3;

/// Multiplier from N/m to the display unit pN/um.
pub const DISPLAY_STIFFNESS_SCALE: f64 = 1e6;

/// Bath and particle parameters for one experiment.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PhysicalParams {
    /// Bath temperature (K).
    pub temperature: f64,
    /// Microsphere radius (m).
    pub radius: f64,
    /// Dynamic viscosity of the surrounding fluid (Pa*s).
    pub viscosity: f64,
}

impl PhysicalParams {
    /// Stokes drag coefficient `gamma = 6*pi*eta*R` (N*s/m).
    pub fn drag(&self) -> f64 {
        stokes_drag(self.viscosity, self.radius)
    }

    /// Free diffusion coefficient `D = k_B*T/gamma` (m^2/s).
    pub fn diffusion(&self) -> f64 {
        BOLTZMANN * self.temperature / self.drag()
    }

    pub fn validate(&self) -> Result<(), TrapError> {
        ensure_positive("temperature", self.temperature)?;
        ensure_positive("radius", self.radius)?;
        ensure_positive("viscosity", self.viscosity)?;
        Ok(())
    }
}

impl Default for PhysicalParams {
    fn default() -> Self {
        // Reference values of the calibration record this crate was
        // validated against: water bath at 300 K, 1.25 um bead.
        Self {
            temperature: 300.0,
            radius: 1.25e-6,
            viscosity: WATER_VISCOSITY,
        }
    }
}

/// Trap stiffness in SI and in the human-scale display unit.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Stiffness {
    pub newtons_per_meter: f64,
    pub piconewtons_per_micrometer: f64,
}

/// Stokes drag for a sphere, `gamma = 6*pi*eta*R` (N*s/m).
pub fn stokes_drag(viscosity: f64, radius: f64) -> f64 {
    6.0 * PI * viscosity * radius
}

/// Convert a fitted corner frequency into trap stiffness.
///
/// `k = 2*pi*gamma*f_c`. All three inputs must be strictly positive.
pub fn compute_stiffness(
    corner_frequency: f64,
    viscosity: f64,
    radius: f64,
) -> Result<Stiffness, TrapError> {
    ensure_positive("corner_frequency", corner_frequency)?;
    ensure_positive("viscosity", viscosity)?;
    ensure_positive("radius", radius)?;

    let drag = stokes_drag(viscosity, radius);
    let newtons_per_meter = 2.0 * PI * drag * corner_frequency;
    Ok(Stiffness {
        newtons_per_meter,
        piconewtons_per_micrometer: newtons_per_meter * DISPLAY_STIFFNESS_SCALE,
    })
}

pub(crate) fn ensure_positive(name: &'static str, value: f64) -> Result<(), TrapError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(TrapError::InvalidParameter { name, value })
    }
}
