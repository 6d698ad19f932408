//! Turns raw instrument channel readings into centered proxy-position
//! series ready for spectral estimation.
//!
//! The acquisition software writes each channel as columnar numeric text,
//! several columns per block; flattening row-major restores the original
//! acquisition order. Two detector layouts are supported:
//!
//! - `XySum`: quadrant-detector voltages, proxy position = channel / sum,
//!   then mean-centered.
//! - `Normalized`: channels already divided by the sum upstream, needing
//!   only mean-centering.

use log::debug;

use crate::error::TrapError;

/// Raw channel data for one run, before normalization.
#[derive(Clone, Debug)]
pub enum RawChannels {
    /// Three detector channels: x, y and the total-intensity sum.
    XySum {
        x: Vec<f64>,
        y: Vec<f64>,
        sum: Vec<f64>,
    },
    /// Two pre-normalized channels.
    Normalized { x: Vec<f64>, y: Vec<f64> },
}

/// Zero-mean proxy-position series for both axes, equal lengths.
#[derive(Clone, Debug)]
pub struct ProxySeries {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

/// Parse whitespace/tab-delimited numeric text into one flattened series.
///
/// Values are taken row by row, left to right, matching the order the
/// instrument wrote them.
pub fn parse_columns(text: &str) -> Result<Vec<f64>, TrapError> {
    let mut values = Vec::new();
    for (row, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        for (column, token) in line.split_whitespace().enumerate() {
            let value: f64 = token.parse().map_err(|_| TrapError::MalformedField {
                row: row + 1,
                column,
            })?;
            values.push(value);
        }
    }
    if values.is_empty() {
        return Err(TrapError::EmptyData);
    }
    Ok(values)
}

/// Convert raw channels into centered proxy positions.
///
/// All channels are first truncated to the shortest common length, then
/// normalized per layout, then each series has its own mean removed.
pub fn proxy_positions(input: RawChannels) -> Result<ProxySeries, TrapError> {
    let (mut x, mut y) = match input {
        RawChannels::XySum { mut x, mut y, sum } => {
            let len = x.len().min(y.len()).min(sum.len());
            if len == 0 {
                return Err(TrapError::EmptyData);
            }
            x.truncate(len);
            y.truncate(len);
            for (value, total) in x.iter_mut().zip(&sum) {
                *value /= total;
            }
            for (value, total) in y.iter_mut().zip(&sum) {
                *value /= total;
            }
            (x, y)
        }
        RawChannels::Normalized { mut x, mut y } => {
            let len = x.len().min(y.len());
            if len == 0 {
                return Err(TrapError::EmptyData);
            }
            x.truncate(len);
            y.truncate(len);
            (x, y)
        }
    };
    mean_center(&mut x);
    mean_center(&mut y);
    debug!("proxy series ready: {} samples per axis", x.len());
    Ok(ProxySeries { x, y })
}

/// Subtract the series mean in place.
pub fn mean_center(series: &mut [f64]) {
    if series.is_empty() {
        return;
    }
    let mean = series.iter().sum::<f64>() / series.len() as f64;
    for value in series.iter_mut() {
        *value -= mean;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mean(series: &[f64]) -> f64 {
        series.iter().sum::<f64>() / series.len() as f64
    }

    #[test]
    fn columns_flatten_in_acquisition_order() {
        let parsed = parse_columns("1.0\t2.0\t3.0\n4.0\t5.0\t6.0\n").unwrap();
        assert_eq!(parsed, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn bad_token_reports_location() {
        assert!(matches!(
            parse_columns("1.0\t2.0\nnope\t4.0\n"),
            Err(TrapError::MalformedField { row: 2, column: 0 })
        ));
    }

    #[test]
    fn xy_sum_layout_divides_then_centers() {
        let proxy = proxy_positions(RawChannels::XySum {
            x: vec![1.0, 2.0, 3.0, 4.0],
            y: vec![4.0, 3.0, 2.0, 1.0],
            sum: vec![2.0, 2.0, 2.0, 2.0],
        })
        .unwrap();
        // x/sum = [0.5, 1.0, 1.5, 2.0], mean 1.25
        assert!((proxy.x[0] - (-0.75)).abs() < 1e-15);
        assert!((proxy.x[3] - 0.75).abs() < 1e-15);
        assert!(mean(&proxy.x).abs() < 1e-15);
        assert!(mean(&proxy.y).abs() < 1e-15);
    }

    #[test]
    fn series_are_truncated_to_shortest() {
        let proxy = proxy_positions(RawChannels::XySum {
            x: vec![1.0; 10],
            y: vec![1.0; 7],
            sum: vec![2.0; 9],
        })
        .unwrap();
        assert_eq!(proxy.x.len(), 7);
        assert_eq!(proxy.y.len(), 7);
    }

    #[test]
    fn normalized_layout_only_centers() {
        let proxy = proxy_positions(RawChannels::Normalized {
            x: vec![1.0, 3.0],
            y: vec![-2.0, 0.0],
        })
        .unwrap();
        assert_eq!(proxy.x, vec![-1.0, 1.0]);
        assert_eq!(proxy.y, vec![-1.0, 1.0]);
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(
            proxy_positions(RawChannels::Normalized {
                x: vec![],
                y: vec![1.0]
            }),
            Err(TrapError::EmptyData)
        ));
        assert!(matches!(parse_columns("\n\n"), Err(TrapError::EmptyData)));
    }
}
