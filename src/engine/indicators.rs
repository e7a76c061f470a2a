//! Column Indicators
//!
//! Indicators are computed per column over the column midpoints (moving
//! averages, Bollinger bands) or the column extremes (Donchian channels,
//! parabolic SAR). Values before the warm-up period are `None`.

use serde::{Deserialize, Serialize};

use super::matrix::PnfMatrix;
use super::scale::BoxScale;

/// Named series aligned to the chart's columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSeries {
    pub label: String,
    pub values: Vec<Option<f64>>,
}

impl IndicatorSeries {
    fn new(label: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            label: label.into(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of the last column
    pub fn last(&self) -> Option<f64> {
        self.values.last().copied().flatten()
    }
}

/// Prices of the filled boxes of one column, low to high
fn column_prices(matrix: &PnfMatrix, scale: &BoxScale, column: usize) -> Vec<f64> {
    matrix
        .column(column)
        .enumerate()
        .filter(|(_, v)| *v != 0)
        .filter_map(|(row, _)| scale.get(row))
        .collect()
}

/// Middle box of every column; even heights average the two centre boxes,
/// geometrically on a logarithmic scale
pub fn column_midpoints(matrix: &PnfMatrix, scale: &BoxScale) -> Vec<f64> {
    let log = scale.spec().is_logarithmic();

    (0..matrix.columns())
        .map(|c| {
            let prices = column_prices(matrix, scale, c);
            let n = prices.len();
            if n == 0 {
                f64::NAN
            } else if n % 2 == 1 {
                prices[n / 2]
            } else {
                let (a, b) = (prices[n / 2 - 1], prices[n / 2]);
                if log {
                    ((a.ln() + b.ln()) / 2.0).exp()
                } else {
                    a + (b - a) / 2.0
                }
            }
        })
        .collect()
}

pub fn midpoints(values: &[f64]) -> IndicatorSeries {
    IndicatorSeries::new("Midpoints", values.iter().map(|&v| Some(v)).collect())
}

fn rolling<F>(values: &[f64], period: usize, f: F) -> Vec<Option<f64>>
where
    F: Fn(&[f64]) -> f64,
{
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    for (n, window) in values.windows(period).enumerate() {
        out[n + period - 1] = Some(f(window));
    }
    out
}

fn mean(window: &[f64]) -> f64 {
    window.iter().sum::<f64>() / window.len() as f64
}

/// Population standard deviation
fn std_dev(window: &[f64]) -> f64 {
    let m = mean(window);
    let var = window.iter().map(|v| (v - m).powi(2)).sum::<f64>() / window.len() as f64;
    var.sqrt()
}

pub fn sma(values: &[f64], period: usize) -> IndicatorSeries {
    IndicatorSeries::new(format!("SMA({})", period), rolling(values, period, mean))
}

/// Exponential average seeded with the simple average of the first `period` values
pub fn ema(values: &[f64], period: usize) -> IndicatorSeries {
    let mut out = vec![None; values.len()];
    if period > 0 && values.len() >= period {
        let k = 2.0 / (period as f64 + 1.0);
        let mut current = mean(&values[..period]);
        out[period - 1] = Some(current);
        for n in period..values.len() {
            current += k * (values[n] - current);
            out[n] = Some(current);
        }
    }
    IndicatorSeries::new(format!("EMA({})", period), out)
}

/// Upper and lower band at `factor` standard deviations around SMA(period)
pub fn bollinger(values: &[f64], period: usize, factor: f64) -> (IndicatorSeries, IndicatorSeries) {
    let label = format!("Bollinger({},{})", period, factor);
    let average = rolling(values, period, mean);
    let deviation = rolling(values, period, std_dev);

    let band = |sign: f64| -> Vec<Option<f64>> {
        average
            .iter()
            .zip(&deviation)
            .map(|(m, s)| Some((*m)? + sign * factor * (*s)?))
            .collect()
    };

    (
        IndicatorSeries::new(format!("{}-upper", label), band(1.0)),
        IndicatorSeries::new(format!("{}-lower", label), band(-1.0)),
    )
}

/// Highest and lowest box price of every column
fn column_extremes(matrix: &PnfMatrix, scale: &BoxScale) -> (Vec<f64>, Vec<f64>) {
    (0..matrix.columns())
        .map(|c| {
            let high = matrix.column_high(c).and_then(|r| scale.get(r)).unwrap_or(f64::NAN);
            let low = matrix.column_low(c).and_then(|r| scale.get(r)).unwrap_or(f64::NAN);
            (high, low)
        })
        .unzip()
}

/// Channel of the highest high and lowest low over `period` columns,
/// shifted right by `ignore` columns
pub fn donchian(
    matrix: &PnfMatrix,
    scale: &BoxScale,
    period: usize,
    ignore: usize,
) -> (IndicatorSeries, IndicatorSeries) {
    let label = format!("Donchian({},{})", period, ignore);
    let (highs, lows) = column_extremes(matrix, scale);

    let shift = |values: Vec<Option<f64>>| -> Vec<Option<f64>> {
        let n = values.len();
        std::iter::repeat(None)
            .take(ignore.min(n))
            .chain(values.into_iter().take(n.saturating_sub(ignore)))
            .collect()
    };

    let upper = rolling(&highs, period, |w| w.iter().copied().fold(f64::NEG_INFINITY, f64::max));
    let lower = rolling(&lows, period, |w| w.iter().copied().fold(f64::INFINITY, f64::min));

    (
        IndicatorSeries::new(format!("{}-upper", label), shift(upper)),
        IndicatorSeries::new(format!("{}-lower", label), shift(lower)),
    )
}

/// Parabolic stop and reverse over column extremes
///
/// Seeded long unless column 0 tops column 2. The acceleration grows by
/// `step` per new extreme up to `leap`. Values are signed by the active
/// trend: positive while long, negative while short.
pub fn psar(matrix: &PnfMatrix, scale: &BoxScale, step: f64, leap: f64) -> IndicatorSeries {
    let label = format!("pSAR({},{})", step, leap);
    let (high, low) = column_extremes(matrix, scale);
    let n = high.len();
    if n <= 2 {
        return IndicatorSeries::new(label, vec![None; n]);
    }

    let (mut sar, mut extreme, mut flag) = if high[0] > high[2] {
        (high[0], low[0], -1.0)
    } else {
        (low[0], high[0], 1.0)
    };
    let mut acceleration = step;
    let mut out = vec![Some(sar * flag)];

    for i in 1..n {
        let projected = sar + acceleration * (extreme - sar);
        let next_sar = if (flag > 0.0 && projected > low[i]) || (flag < 0.0 && projected < high[i]) {
            extreme
        } else {
            projected
        };

        let next_flag = if next_sar < high[i] {
            1.0
        } else if next_sar > low[i] {
            -1.0
        } else {
            flag
        };

        let next_extreme = if next_flag > 0.0 {
            extreme.max(high[i])
        } else {
            extreme.min(low[i])
        };

        acceleration = if next_flag != flag {
            step
        } else {
            let improved = (next_flag > 0.0 && next_extreme > extreme)
                || (next_flag < 0.0 && next_extreme < extreme);
            if improved {
                (acceleration + step).min(leap)
            } else {
                acceleration
            }
        };

        sar = next_sar;
        extreme = next_extreme;
        flag = next_flag;
        out.push(Some(sar * flag));
    }

    IndicatorSeries::new(label, out)
}
