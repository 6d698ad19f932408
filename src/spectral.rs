//! One-sided power spectral density estimation for zero-mean series.
//!
//! Two interchangeable strategies:
//!
//! - [`PsdMethod::Averaged`]: Hann-windowed overlapping segments with
//!   per-bin averaging (Welch-style). Lower variance, coarser resolution;
//!   bin spacing `sample_rate / segment_length`.
//! - [`PsdMethod::Direct`]: a single transform over the whole series;
//!   power at bin k is `|X_k|^2 * dt / N`, folded one-sided. Bin spacing
//!   `sample_rate / N`.
//!
//! DC is discarded in both, so frequencies are strictly positive and
//! strictly increasing.

use log::warn;
use rustfft::{num_complex::Complex64, FftPlanner};
use serde::{Deserialize, Serialize};

use crate::error::TrapError;

/// PSD estimation strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PsdMethod {
    /// Averaged periodogram over Hann-windowed segments with 50% overlap.
    Averaged { segment_length: usize },
    /// Single full-length periodogram.
    Direct,
}

impl Default for PsdMethod {
    fn default() -> Self {
        PsdMethod::Averaged {
            segment_length: 1024,
        }
    }
}

/// One-sided PSD: parallel frequency (Hz) and power (signal^2/Hz) vectors.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PsdEstimate {
    pub frequencies: Vec<f64>,
    pub powers: Vec<f64>,
    pub sample_rate: f64,
}

impl PsdEstimate {
    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    /// Frequency/power pairs in acquisition order.
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.frequencies
            .iter()
            .copied()
            .zip(self.powers.iter().copied())
    }
}

/// Estimate the one-sided PSD of `series` sampled at `sample_rate` Hz.
pub fn estimate_psd(
    series: &[f64],
    sample_rate: f64,
    method: PsdMethod,
) -> Result<PsdEstimate, TrapError> {
    if !sample_rate.is_finite() || sample_rate <= 0.0 {
        return Err(TrapError::InvalidSampleRate);
    }
    if series.len() < 2 {
        return Err(TrapError::NotEnoughPoints {
            needed: 2,
            got: series.len(),
        });
    }
    match method {
        PsdMethod::Direct => direct_periodogram(series, sample_rate),
        PsdMethod::Averaged { segment_length } => {
            averaged_periodogram(series, sample_rate, segment_length)
        }
    }
}

fn direct_periodogram(series: &[f64], sample_rate: f64) -> Result<PsdEstimate, TrapError> {
    let n = series.len();
    let mut buffer: Vec<Complex64> = series.iter().map(|&v| Complex64::new(v, 0.0)).collect();
    FftPlanner::new().plan_fft_forward(n).process(&mut buffer);

    let norms: Vec<f64> = buffer.iter().map(|c| c.norm_sqr()).collect();
    let scale = 1.0 / (sample_rate * n as f64);
    let (frequencies, powers) = fold_one_sided(&norms, n, sample_rate, scale);
    Ok(PsdEstimate {
        frequencies,
        powers,
        sample_rate,
    })
}

fn averaged_periodogram(
    series: &[f64],
    sample_rate: f64,
    segment_length: usize,
) -> Result<PsdEstimate, TrapError> {
    if segment_length < 2 {
        return Err(TrapError::InvalidParameter {
            name: "segment_length",
            value: segment_length as f64,
        });
    }
    let mut segment = segment_length;
    if segment > series.len() {
        warn!(
            "segment length {segment} exceeds series length {}; using one full-length segment",
            series.len()
        );
        segment = series.len();
    }

    let window = hann(segment);
    let window_power: f64 = window.iter().map(|w| w * w).sum();
    let step = (segment / 2).max(1);
    let fft = FftPlanner::new().plan_fft_forward(segment);

    let mut accumulated = vec![0.0_f64; segment];
    let mut buffer = vec![Complex64::new(0.0, 0.0); segment];
    let mut segments = 0usize;
    let mut start = 0usize;
    while start + segment <= series.len() {
        let chunk = &series[start..start + segment];
        // Per-segment mean removal keeps residual drift out of the low bins.
        let mean = chunk.iter().sum::<f64>() / segment as f64;
        for ((slot, &value), w) in buffer.iter_mut().zip(chunk).zip(&window) {
            *slot = Complex64::new((value - mean) * w, 0.0);
        }
        fft.process(&mut buffer);
        for (acc, value) in accumulated.iter_mut().zip(&buffer) {
            *acc += value.norm_sqr();
        }
        segments += 1;
        start += step;
    }

    let scale = 1.0 / (sample_rate * window_power * segments as f64);
    let (frequencies, powers) = fold_one_sided(&accumulated, segment, sample_rate, scale);
    Ok(PsdEstimate {
        frequencies,
        powers,
        sample_rate,
    })
}

/// Fold a two-sided |X|^2 spectrum into one-sided (frequency, power) pairs.
///
/// Bin 0 is dropped; every bin except Nyquist is doubled to keep the total
/// power of the folded spectrum equal to the two-sided one.
fn fold_one_sided(
    norms: &[f64],
    n: usize,
    sample_rate: f64,
    scale: f64,
) -> (Vec<f64>, Vec<f64>) {
    let half = n / 2;
    let mut frequencies = Vec::with_capacity(half);
    let mut powers = Vec::with_capacity(half);
    for (k, &norm) in norms.iter().enumerate().take(half + 1).skip(1) {
        let mut power = norm * scale;
        let at_nyquist = n % 2 == 0 && k == half;
        if !at_nyquist {
            power *= 2.0;
        }
        frequencies.push(k as f64 * sample_rate / n as f64);
        powers.push(power);
    }
    (frequencies, powers)
}

/// Periodic Hann window.
fn hann(n: usize) -> Vec<f64> {
    use std::f64::consts::PI;
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / n as f64).cos()))
        .collect()
}
