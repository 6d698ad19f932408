//! End-to-end spectral calibration: proxy series -> PSD -> Lorentzian fit
//! -> trap stiffness, plus the tolerant reader for the instrument's
//! key/value calibration block.
//!
//! Stiffness deliberately comes out of the corner frequency and a textbook
//! water viscosity alone; it needs no volts-to-meters conversion factor,
//! which is why the fit's amplitude parameter may stay in detector units.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::TrapError;
use crate::fitting::{fit_lorentzian, FitConfig, FitResult};
use crate::physics::{compute_stiffness, Stiffness, WATER_VISCOSITY};
use crate::preprocess::ProxySeries;
use crate::spectral::{estimate_psd, PsdEstimate, PsdMethod};

/// Metadata recovered from the calibration text block.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationMeta {
    /// Bath temperature (K).
    pub temperature: f64,
    /// Bead radius (m).
    pub radius: f64,
    /// Per-axis reference stiffness (N/m) when the block carries one.
    pub stiffness_x: Option<f64>,
    pub stiffness_y: Option<f64>,
}

impl Default for CalibrationMeta {
    fn default() -> Self {
        Self {
            temperature: 298.15,
            radius: 1.0e-6,
            stiffness_x: None,
            stiffness_y: None,
        }
    }
}

impl CalibrationMeta {
    /// Parse the instrument's calibration block.
    ///
    /// The block is a tab-separated header row containing the
    /// `Temperature (K)` label followed by a value row aligned to it; the
    /// radius column is in micrometers and the optional `kx`/`ky` columns
    /// in nN/m. Missing pieces fall back to defaults with a warning, the
    /// reader never fails.
    pub fn parse(text: &str) -> Self {
        let mut meta = Self::default();
        let lines: Vec<&str> = text.lines().collect();
        let Some(header_index) = lines.iter().position(|l| l.contains("Temperature (K)")) else {
            warn!("calibration block has no `Temperature (K)` header; using defaults");
            return meta;
        };
        let Some(value_line) = lines.get(header_index + 1) else {
            warn!("calibration block ends after its header; using defaults");
            return meta;
        };

        let labels: Vec<&str> = lines[header_index].split('\t').collect();
        let values: Vec<&str> = value_line.split('\t').collect();
        let mut matched_temperature = false;
        for (label, value) in labels.iter().zip(&values) {
            let Ok(value) = value.trim().parse::<f64>() else {
                continue;
            };
            if label.contains("Temperature") {
                meta.temperature = value;
                matched_temperature = true;
            } else if label.contains("Radius") {
                meta.radius = value * 1e-6;
            } else if label.contains("kx") {
                meta.stiffness_x = Some(value * 1e-9);
            } else if label.contains("ky") {
                meta.stiffness_y = Some(value * 1e-9);
            }
        }
        if !matched_temperature {
            // Older blocks label nothing; temperature and radius sit at
            // fixed positions in the value row.
            if let Some(value) = values.get(3).and_then(|v| v.trim().parse::<f64>().ok()) {
                meta.temperature = value;
            }
            if let Some(value) = values.get(4).and_then(|v| v.trim().parse::<f64>().ok()) {
                meta.radius = value * 1e-6;
            }
        }
        meta
    }
}

/// Everything the calibration pipeline needs for one run.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Acquisition rate of the proxy series (Hz).
    pub sample_rate: f64,
    pub psd_method: PsdMethod,
    pub fit: FitConfig,
    /// Fluid viscosity used for the drag (Pa*s).
    pub viscosity: f64,
    /// Bead radius (m).
    pub radius: f64,
}

impl CalibrationConfig {
    /// Defaults: averaged periodogram, 10-5000 Hz log-scale fit, water
    /// viscosity.
    pub fn new(sample_rate: f64, radius: f64) -> Self {
        Self {
            sample_rate,
            psd_method: PsdMethod::default(),
            fit: FitConfig::default(),
            viscosity: WATER_VISCOSITY,
            radius,
        }
    }
}

/// Calibration products for one axis.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AxisCalibration {
    pub psd: PsdEstimate,
    pub fit: FitResult,
    pub stiffness: Stiffness,
}

/// Calibration products for both axes of a run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct XyCalibration {
    pub x: AxisCalibration,
    pub y: AxisCalibration,
}

/// Run the spectral calibration chain on one centered series.
///
/// A fit that fails to converge still yields a result (the fallback guess,
/// flagged in `fit.status`) so batch runs keep producing output; structural
/// problems (too few points, bad parameters) surface as errors.
pub fn calibrate_axis(
    series: &[f64],
    config: &CalibrationConfig,
) -> Result<AxisCalibration, TrapError> {
    let psd = estimate_psd(series, config.sample_rate, config.psd_method)?;
    let fit = fit_lorentzian(&psd, &config.fit)?;
    let stiffness = compute_stiffness(fit.corner_frequency, config.viscosity, config.radius)?;
    info!(
        "axis calibrated: fc={:.1} Hz, k={:.3} pN/um{}",
        fit.corner_frequency,
        stiffness.piconewtons_per_micrometer,
        if fit.converged() { "" } else { " (fit fell back)" }
    );
    Ok(AxisCalibration {
        psd,
        fit,
        stiffness,
    })
}

/// Calibrate both axes of a proxy-position recording.
pub fn calibrate_xy(
    proxy: &ProxySeries,
    config: &CalibrationConfig,
) -> Result<XyCalibration, TrapError> {
    Ok(XyCalibration {
        x: calibrate_axis(&proxy.x, config)?,
        y: calibrate_axis(&proxy.y, config)?,
    })
}
