//! Box scale construction
//!
//! One builder per scaling mode:
//! - `AbsoluteScale`: multiples of a fixed box size (ATR resolves to this)
//! - `LogarithmicScale`: constant percentage steps from a floor of 0.0001
//! - `ClassicScale`: the traditional tiered table repeated per decade

use serde::{Deserialize, Serialize};

use crate::config::{BoxSize, ChartConfig, Overscan};
use crate::error::{PnfError, Result};
use crate::series::NormalizedSeries;
use crate::types::Scaling;

/// Lowest price representable on a logarithmic scale
pub const LOG_SCALE_FLOOR: f64 = 0.0001;

/// Upper bound on scale size, guards against box sizes far too small for the range
const MAX_BOXES: usize = 5_000_000;

const EPS: f64 = 1e-9;

/// Builds the ordered price levels covering `[min, max]` plus overscan
pub trait ScaleBuilder {
    fn build(&self, min: f64, max: f64, overscan: Overscan) -> Result<Vec<f64>>;
}

/// Fixed price increment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AbsoluteScale {
    pub box_size: f64,
}

/// Fixed percentage increment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogarithmicScale {
    pub percent: f64,
}

/// Tiered table: 0.2f below 14, 0.5f below 29, f below 60 (relative units per decade)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassicScale {
    pub factor: f64,
}

/// Resolved scale parameters; ATR is turned into an absolute box size here
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ScaleSpec {
    Absolute { box_size: f64 },
    Logarithmic { percent: f64 },
    Classic { factor: f64 },
}

impl ScaleSpec {
    pub fn resolve(config: &ChartConfig, series: &NormalizedSeries) -> Result<ScaleSpec> {
        let value = match config.box_size {
            BoxSize::Value(v) => v,
            BoxSize::Total => 0.0,
        };

        match config.scaling {
            Scaling::Absolute => Ok(ScaleSpec::Absolute { box_size: value }),
            Scaling::Logarithmic => Ok(ScaleSpec::Logarithmic { percent: value }),
            Scaling::Classic => Ok(ScaleSpec::Classic { factor: value }),
            Scaling::AverageTrueRange => {
                let window = config.atr_window(series.len());
                let atr = average_true_range(series.high(), series.low(), series.close(), window);
                if atr.is_nan() || atr <= 0.0 {
                    return Err(PnfError::Configuration(
                        "average true range is zero, atr scaling needs price movement".to_string(),
                    ));
                }
                Ok(ScaleSpec::Absolute { box_size: atr })
            }
        }
    }

    /// The box size actually used (price units, percent, or classic factor)
    pub fn box_size(&self) -> f64 {
        match *self {
            ScaleSpec::Absolute { box_size } => box_size,
            ScaleSpec::Logarithmic { percent } => percent,
            ScaleSpec::Classic { factor } => factor,
        }
    }

    pub fn is_logarithmic(&self) -> bool {
        matches!(self, ScaleSpec::Logarithmic { .. })
    }

    fn builder(&self) -> Box<dyn ScaleBuilder> {
        match *self {
            ScaleSpec::Absolute { box_size } => Box::new(AbsoluteScale { box_size }),
            ScaleSpec::Logarithmic { percent } => Box::new(LogarithmicScale { percent }),
            ScaleSpec::Classic { factor } => Box::new(ClassicScale { factor }),
        }
    }
}

/// Average true range over the last `window` bars
///
/// True range of bar i is the largest of high-low, |high - previous close|
/// and |low - previous close|, so bar 0 never contributes.
pub fn average_true_range(high: &[f64], low: &[f64], close: &[f64], window: usize) -> f64 {
    let n = close.len().min(high.len()).min(low.len());
    if n < 2 || window == 0 {
        return 0.0;
    }
    let window = window.min(n - 1);

    let mut sum_tr = 0.0;
    for i in (n - window)..n {
        let prev_close = close[i - 1];
        let tr = (high[i] - low[i])
            .max((high[i] - prev_close).abs())
            .max((low[i] - prev_close).abs());
        sum_tr += tr;
    }

    sum_tr / window as f64
}

/// Decimal places of the shortest representation of `value`
fn decimals_of(value: f64) -> i32 {
    let repr = value.to_string();
    match repr.split_once('.') {
        Some((_, fraction)) => fraction.len().min(15) as i32,
        None => 0,
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn check_size(span: f64, step: f64) -> Result<()> {
    if span / step > MAX_BOXES as f64 {
        return Err(PnfError::Configuration(format!(
            "box size {} is too small for a price range of {}",
            step, span
        )));
    }
    Ok(())
}

impl ScaleBuilder for AbsoluteScale {
    fn build(&self, min: f64, max: f64, overscan: Overscan) -> Result<Vec<f64>> {
        let step = self.box_size;
        check_size(max - min, step)?;
        let decimals = decimals_of(step);

        // Non-negative data starts the grid at zero at the lowest
        let floor = min - (overscan.below as f64 + 1.0) * step;
        let mut k = if floor < 0.0 && min >= 0.0 {
            0
        } else {
            (floor / step + EPS).floor() as i64 + 1
        };

        let top = max + (overscan.above as f64 - 1.0) * step;
        let mut boxes = vec![round_to(k as f64 * step, decimals)];
        while boxes[boxes.len() - 1] <= top {
            k += 1;
            boxes.push(round_to(k as f64 * step, decimals));
        }

        Ok(boxes)
    }
}

fn round_log_bracket(value: f64) -> f64 {
    if value >= 100.0 {
        round_to(value, 2)
    } else if value >= 10.0 {
        round_to(value, 3)
    } else if value >= 1.0 {
        round_to(value, 4)
    } else if value >= 0.1 {
        round_to(value, 5)
    } else {
        value
    }
}

impl ScaleBuilder for LogarithmicScale {
    fn build(&self, min: f64, max: f64, overscan: Overscan) -> Result<Vec<f64>> {
        if min <= 0.0 {
            return Err(PnfError::Configuration(format!(
                "log scaling needs positive prices, lowest price is {}",
                min
            )));
        }

        let step = (1.0 + self.percent / 100.0).ln();
        let base = LOG_SCALE_FLOOR.ln();
        check_size(max.ln() - min.ln(), step)?;

        let floor = min.ln() - (overscan.below as f64 + 1.0) * step;
        let mut k = if floor < base {
            0
        } else {
            ((floor - base) / step + EPS).floor() as i64 + 1
        };

        let top = max.ln() + (overscan.above as f64 - 1.0) * step;
        let mut log_boxes = vec![base + k as f64 * step];
        while log_boxes[log_boxes.len() - 1] <= top {
            k += 1;
            log_boxes.push(base + k as f64 * step);
        }

        let round = self.percent >= 0.1;
        Ok(log_boxes
            .into_iter()
            .map(|b| {
                let value = b.exp();
                if round {
                    round_log_bracket(value)
                } else {
                    value
                }
            })
            .collect())
    }
}

impl ClassicScale {
    /// Relative levels of one decade, divided down to the 0.0006 decade
    fn decade(&self) -> Vec<f64> {
        let brackets = [(6.0, 14.0, 0.2), (14.0, 29.0, 0.5), (29.0, 60.0, 1.0)];
        let mut levels = Vec::new();
        for (start, end, unit) in brackets {
            let step = unit * self.factor;
            let mut i = 0;
            loop {
                let level = start + i as f64 * step;
                if level >= end - EPS {
                    break;
                }
                levels.push(round_to(level, 10) / 10_000.0);
                i += 1;
            }
        }
        levels
    }
}

impl ScaleBuilder for ClassicScale {
    fn build(&self, min: f64, max: f64, overscan: Overscan) -> Result<Vec<f64>> {
        if min < 0.0 {
            return Err(PnfError::Configuration(format!(
                "classic scaling needs non-negative prices, lowest price is {}",
                min
            )));
        }

        let decade = self.decade();
        let mut boxes = vec![0.0];
        boxes.extend(decade.iter().copied());

        let mut multiplier = 1.0;
        while boxes.len() <= overscan.above || boxes[boxes.len() - overscan.above - 1] < max {
            multiplier *= 10.0;
            if multiplier > 1e15 {
                return Err(PnfError::Configuration(format!(
                    "classic scale cannot reach price {}",
                    max
                )));
            }
            boxes.extend(decade.iter().map(|level| round_to(level * multiplier, 10)));
        }

        let tolerance = |price: f64| EPS * price.abs().max(1.0);
        let start = boxes
            .iter()
            .rposition(|&b| b <= min + tolerance(min))
            .unwrap_or(0)
            .saturating_sub(overscan.below);
        let first_above = boxes
            .iter()
            .position(|&b| b > max + tolerance(max))
            .unwrap_or(boxes.len());
        let end = (first_above + overscan.above).min(boxes.len());

        Ok(boxes[start..end].to_vec())
    }
}

/// Strictly increasing price levels; row r of the chart matrix is `values()[r]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxScale {
    boxes: Vec<f64>,
    spec: ScaleSpec,
}

impl BoxScale {
    pub fn build(spec: ScaleSpec, min: f64, max: f64, overscan: Overscan) -> Result<BoxScale> {
        let boxes = spec.builder().build(min, max, overscan)?;
        Ok(BoxScale { boxes, spec })
    }

    pub fn spec(&self) -> ScaleSpec {
        self.spec
    }

    pub fn values(&self) -> &[f64] {
        &self.boxes
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.boxes.get(index).copied()
    }

    /// Box at a signed index; beyond either end reads as +/- infinity
    pub fn at(&self, index: i64) -> f64 {
        if index < 0 {
            f64::NEG_INFINITY
        } else {
            self.boxes
                .get(index as usize)
                .copied()
                .unwrap_or(f64::INFINITY)
        }
    }

    /// Index of the first box at or above `price`
    pub fn first_at_or_above(&self, price: f64) -> Option<usize> {
        self.boxes.iter().position(|&b| b >= price)
    }

    /// Index of the last box at or below `price`
    pub fn last_at_or_below(&self, price: f64) -> Option<usize> {
        self.boxes.iter().rposition(|&b| b <= price)
    }

    /// Index of the box equal to `value` within floating-point tolerance
    pub fn position_of(&self, value: f64) -> Option<usize> {
        let tolerance = EPS * value.abs().max(1.0);
        self.boxes.iter().position(|&b| (b - value).abs() <= tolerance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strictly_increasing(boxes: &[f64]) -> bool {
        boxes.windows(2).all(|w| w[0] < w[1])
    }

    #[test]
    fn test_absolute_scale_starts_at_zero() {
        let scale = BoxScale::build(ScaleSpec::Absolute { box_size: 1.0 }, 1.0, 7.0, Overscan::default())
            .unwrap();
        assert_eq!(scale.get(0), Some(0.0));
        assert_eq!(scale.get(7), Some(7.0));
        // stops at the first box beyond max + 19 boxes
        assert_eq!(scale.values().last().copied(), Some(27.0));
        assert!(strictly_increasing(scale.values()));
    }

    #[test]
    fn test_absolute_scale_overscan_below() {
        let scale = BoxScale::build(ScaleSpec::Absolute { box_size: 0.5 }, 100.0, 110.0, Overscan::default())
            .unwrap();
        // first box above 100 - 21 * 0.5
        assert_eq!(scale.get(0), Some(90.0));
        assert!(scale.values().iter().any(|&b| b == 110.0));
        assert!(strictly_increasing(scale.values()));
    }

    #[test]
    fn test_absolute_scale_decimal_rounding() {
        let scale = BoxScale::build(ScaleSpec::Absolute { box_size: 0.1 }, 0.3, 1.0, Overscan::default())
            .unwrap();
        assert_eq!(scale.get(3), Some(0.3));
        assert_eq!(scale.position_of(0.7), Some(7));
    }

    #[test]
    fn test_log_scale_covers_range() {
        let scale = BoxScale::build(ScaleSpec::Logarithmic { percent: 1.0 }, 50.0, 150.0, Overscan::default())
            .unwrap();
        let boxes = scale.values();
        assert!(strictly_increasing(boxes));
        assert!(boxes[0] < 50.0);
        assert!(boxes[boxes.len() - 1] > 150.0);
        // neighbouring boxes are one percent apart, up to rounding
        let ratio = boxes[11] / boxes[10];
        assert!((ratio - 1.01).abs() < 1e-3);
    }

    #[test]
    fn test_log_scale_rejects_non_positive_prices() {
        let result = BoxScale::build(ScaleSpec::Logarithmic { percent: 1.0 }, 0.0, 10.0, Overscan::default());
        assert!(matches!(result, Err(PnfError::Configuration(_))));
    }

    #[test]
    fn test_classic_scale_table() {
        let scale = BoxScale::build(ScaleSpec::Classic { factor: 1.0 }, 8.0, 40.0, Overscan::default())
            .unwrap();
        let boxes = scale.values();
        assert!(strictly_increasing(boxes));
        assert!(boxes[0] <= 8.0);
        assert!(boxes[boxes.len() - 1] > 40.0);
        // 0.2 steps below 14, 0.5 steps below 29, 1.0 steps below 60
        assert!(scale.position_of(13.8).is_some());
        assert!(scale.position_of(28.5).is_some());
        assert!(scale.position_of(59.0).is_some());
        assert!(scale.position_of(13.9).is_none());
    }

    #[test]
    fn test_atr_total_is_mean_of_trailing_true_ranges() {
        let high: [f64; 10] = [11.0, 12.0, 12.5, 13.0, 12.0, 14.0, 15.0, 14.5, 16.0, 17.0];
        let low: [f64; 10] = [9.0, 10.5, 11.0, 11.5, 10.0, 12.5, 13.0, 13.0, 14.0, 15.5];
        let close: [f64; 10] = [10.0, 11.5, 12.0, 12.5, 11.0, 13.5, 14.5, 13.5, 15.5, 16.0];

        let mut expected = 0.0;
        for i in 1..10 {
            let tr = (high[i] - low[i])
                .max((high[i] - close[i - 1]).abs())
                .max((low[i] - close[i - 1]).abs());
            expected += tr;
        }
        expected /= 9.0;

        let atr = average_true_range(&high, &low, &close, 9);
        assert!((atr - expected).abs() < 1e-12);

        // last three bars only
        let tail = average_true_range(&high, &low, &close, 3);
        assert!((tail - (1.5 + 2.5 + 1.5) / 3.0).abs() < 1e-12);
    }
}
