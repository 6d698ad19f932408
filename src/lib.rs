//! Thermal-motion modelling and spectral calibration for optically trapped
//! microspheres.
//!
//! Two cores, usable independently:
//!
//! - [`simulation`] integrates the overdamped Langevin equation under a
//!   harmonic trap or a measured force map ([`field`]).
//! - [`calibration`] turns a position time series into trap parameters:
//!   preprocessing ([`preprocess`]), PSD estimation ([`spectral`]),
//!   Lorentzian fitting ([`fitting`]) and the stiffness conversion
//!   ([`physics`]).
//!
//! The crate is a pure computation library: no windowing, plotting or file
//! dialogs, and no I/O beyond parsing text a caller hands in.

pub mod calibration;
pub mod error;
pub mod field;
pub mod fitting;
pub mod physics;
pub mod preprocess;
pub mod simulation;
pub mod spectral;

pub use calibration::{
    calibrate_axis, calibrate_xy, AxisCalibration, CalibrationConfig, CalibrationMeta,
    XyCalibration,
};
pub use error::TrapError;
pub use field::{load_force_table, ForceTable, InterpolatedField};
pub use fitting::{fit_lorentzian, lorentzian, FitConfig, FitResult, FitScale, FitStatus};
pub use physics::{
    compute_stiffness, stokes_drag, PhysicalParams, Stiffness, BOLTZMANN, WATER_VISCOSITY,
};
pub use preprocess::{parse_columns, proxy_positions, ProxySeries, RawChannels};
pub use simulation::{run_simulation, run_simulation_observed, ForceModel, SimulationConfig};
pub use spectral::{estimate_psd, PsdEstimate, PsdMethod};
