//! Configuration for chart construction and the derived analyses
//!
//! - `ChartConfig`: method, reversal, scaling, box size and title
//! - `Overscan`: boxes added below/above the data range
//! - `TrendlineParams`, `SignalParams`, `CountParams`: analysis knobs

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{PnfError, Result};
use crate::types::{Method, Scaling};

/// Box sizes accepted by classic scaling
pub const CLASSIC_BOX_SIZES: [f64; 8] = [0.02, 0.05, 0.1, 0.25, 1.0 / 3.0, 0.5, 1.0, 2.0];

/// Smallest percentage step for logarithmic scaling
pub const MIN_LOG_BOX_SIZE: f64 = 0.01;

const CLASSIC_TOLERANCE: f64 = 1e-6;

/// Box size as given by the caller
///
/// For ATR scaling a `Value` is the number of trailing bars to average,
/// and `Total` averages over the whole series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoxSize {
    Value(f64),
    Total,
}

impl std::fmt::Display for BoxSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoxSize::Value(v) => write!(f, "{}", v),
            BoxSize::Total => write!(f, "total"),
        }
    }
}

impl FromStr for BoxSize {
    type Err = PnfError;

    /// Accepts a number, a fraction such as `1/3`, or `total`
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("total") {
            return Ok(BoxSize::Total);
        }

        let invalid = || PnfError::Configuration(format!("invalid box size '{}'", s));

        if let Some((num, den)) = s.split_once('/') {
            let num: f64 = num.trim().parse().map_err(|_| invalid())?;
            let den: f64 = den.trim().parse().map_err(|_| invalid())?;
            if den == 0.0 {
                return Err(invalid());
            }
            return Ok(BoxSize::Value(num / den));
        }

        s.parse::<f64>().map(BoxSize::Value).map_err(|_| invalid())
    }
}

/// Boxes added to the scale beyond the data range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Overscan {
    /// Boxes below the lowest price (default: 20)
    pub below: usize,
    /// Boxes above the highest price (default: 20)
    pub above: usize,
}

impl Default for Overscan {
    fn default() -> Self {
        Self {
            below: 20,
            above: 20,
        }
    }
}

/// Chart configuration supplied once at construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartConfig {
    /// Price fields driving the columns (default: close)
    pub method: Method,
    /// Boxes against the trend needed to open a new column (default: 3)
    pub reversal: u32,
    /// Box scale layout (default: absolute)
    pub scaling: Scaling,
    /// Box size, percent for log scaling, periods for ATR (default: 1)
    pub box_size: BoxSize,
    /// Optional suffix for the chart title
    #[serde(default)]
    pub title: Option<String>,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            method: Method::Close,
            reversal: 3,
            scaling: Scaling::Absolute,
            box_size: BoxSize::Value(1.0),
            title: None,
        }
    }
}

impl ChartConfig {
    pub fn new(method: Method, reversal: u32, scaling: Scaling, box_size: BoxSize) -> Self {
        Self {
            method,
            reversal,
            scaling,
            box_size,
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Check method/scaling/box size combinations that do not need the series
    pub fn validate(&self) -> Result<()> {
        if self.reversal == 0 {
            return Err(PnfError::Configuration(
                "reversal must be a positive number of boxes".to_string(),
            ));
        }

        match (self.scaling, self.box_size) {
            (Scaling::AverageTrueRange, BoxSize::Total) => Ok(()),
            (Scaling::AverageTrueRange, BoxSize::Value(periods)) => {
                if !periods.is_finite() || periods < 1.0 || periods.fract() != 0.0 {
                    return Err(PnfError::Configuration(format!(
                        "atr box size must be a positive integer number of periods or 'total', got {}",
                        periods
                    )));
                }
                Ok(())
            }
            (scaling, BoxSize::Total) => Err(PnfError::Configuration(format!(
                "box size 'total' is only valid for atr scaling, not {}",
                scaling
            ))),
            (Scaling::Classic, BoxSize::Value(size)) => {
                if CLASSIC_BOX_SIZES
                    .iter()
                    .any(|valid| (valid - size).abs() < CLASSIC_TOLERANCE)
                {
                    Ok(())
                } else {
                    Err(PnfError::Configuration(format!(
                        "classic scaling accepts box sizes 0.02, 0.05, 0.1, 0.25, 1/3, 0.5, 1, 2, got {}",
                        size
                    )))
                }
            }
            (Scaling::Logarithmic, BoxSize::Value(size)) => {
                if !size.is_finite() || size < MIN_LOG_BOX_SIZE {
                    return Err(PnfError::Configuration(format!(
                        "the smallest box size for log scaling is {}%, got {}",
                        MIN_LOG_BOX_SIZE, size
                    )));
                }
                Ok(())
            }
            (Scaling::Absolute, BoxSize::Value(size)) => {
                if !size.is_finite() || size <= 0.0 {
                    return Err(PnfError::Configuration(format!(
                        "box size must be greater than 0, got {}",
                        size
                    )));
                }
                Ok(())
            }
        }
    }

    /// Full validation against a series of `len` bars
    pub fn validate_for_length(&self, len: usize) -> Result<()> {
        self.validate()?;

        if self.scaling == Scaling::AverageTrueRange {
            let window = self.atr_window(len);
            if window == 0 || window + 1 > len {
                return Err(PnfError::Configuration(format!(
                    "atr window of {} bars needs at least {} bars, series has {}",
                    window,
                    window + 1,
                    len
                )));
            }
        }
        Ok(())
    }

    /// Number of true-range values averaged for ATR scaling
    pub fn atr_window(&self, len: usize) -> usize {
        match self.box_size {
            BoxSize::Total => len.saturating_sub(1),
            BoxSize::Value(periods) => periods as usize,
        }
    }

    /// Chart title, e.g. `Point & Figure (log|cl) 1% x 3 | AAPL`
    pub fn title(&self) -> String {
        let size = match self.scaling {
            Scaling::Logarithmic => format!("{}%", self.box_size),
            Scaling::Classic => format!("{}@50", self.box_size),
            Scaling::Absolute | Scaling::AverageTrueRange => self.box_size.to_string(),
        };

        let base = format!(
            "Point & Figure ({}|{}) {} x {}",
            self.scaling, self.method, size, self.reversal
        );

        match &self.title {
            Some(title) => format!("{} | {}", base, title),
            None => base,
        }
    }
}

/// How a trendline is stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrendlineMode {
    /// Stops at the first filled box it touches
    Strong,
    /// Stops only at a breakout in the opposite direction
    Weak,
}

impl TrendlineMode {
    pub fn minimum_length(self) -> usize {
        match self {
            TrendlineMode::Strong => 3,
            TrendlineMode::Weak => 4,
        }
    }
}

impl std::fmt::Display for TrendlineMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrendlineMode::Strong => write!(f, "strong"),
            TrendlineMode::Weak => write!(f, "weak"),
        }
    }
}

/// Parameters for trendline projection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrendlineParams {
    /// Minimum line length in columns (default: 4)
    pub length: usize,
    /// Stop rule (default: strong)
    pub mode: TrendlineMode,
}

impl Default for TrendlineParams {
    fn default() -> Self {
        Self {
            length: 4,
            mode: TrendlineMode::Strong,
        }
    }
}

/// Parameters for pattern recognition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct SignalParams {
    /// Triangles need exactly converging columns instead of +-1 box tolerance
    pub strict: bool,
}

/// Parameters for price-target counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CountParams {
    /// Minimum pattern width for horizontal counts, never below 5 (default: 5)
    pub min_length: usize,
}

impl Default for CountParams {
    fn default() -> Self {
        Self { min_length: 5 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ChartConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.title(), "Point & Figure (abs|cl) 1 x 3");
    }

    #[test]
    fn test_classic_box_size_outside_table() {
        let config = ChartConfig::new(Method::Close, 3, Scaling::Classic, BoxSize::Value(0.3));
        assert!(matches!(config.validate(), Err(PnfError::Configuration(_))));

        let third = ChartConfig::new(Method::Close, 3, Scaling::Classic, "1/3".parse().unwrap());
        assert!(third.validate().is_ok());
    }

    #[test]
    fn test_log_box_size_floor() {
        let config = ChartConfig::new(Method::Close, 3, Scaling::Logarithmic, BoxSize::Value(0.005));
        assert!(matches!(config.validate(), Err(PnfError::Configuration(_))));

        let config = ChartConfig::new(Method::Close, 3, Scaling::Logarithmic, BoxSize::Value(0.01));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_absolute_box_size_must_be_positive() {
        let config = ChartConfig::new(Method::Close, 3, Scaling::Absolute, BoxSize::Value(0.0));
        assert!(config.validate().is_err());
        let config = ChartConfig::new(Method::Close, 3, Scaling::Absolute, BoxSize::Total);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_atr_window_against_length() {
        let config = ChartConfig::new(Method::Close, 3, Scaling::AverageTrueRange, BoxSize::Value(14.0));
        assert!(config.validate_for_length(15).is_ok());
        assert!(matches!(
            config.validate_for_length(14),
            Err(PnfError::Configuration(_))
        ));

        let fractional = ChartConfig::new(Method::Close, 3, Scaling::AverageTrueRange, BoxSize::Value(2.5));
        assert!(fractional.validate().is_err());

        let total = ChartConfig::new(Method::Close, 3, Scaling::AverageTrueRange, BoxSize::Total);
        assert_eq!(total.atr_window(10), 9);
        assert!(total.validate_for_length(1).is_err());
    }

    #[test]
    fn test_zero_reversal_rejected() {
        let mut config = ChartConfig::default();
        config.reversal = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_titles() {
        let log = ChartConfig::new(Method::HighLow, 1, Scaling::Logarithmic, BoxSize::Value(2.0))
            .with_title("NQ");
        assert_eq!(log.title(), "Point & Figure (log|h/l) 2% x 1 | NQ");

        let cla = ChartConfig::new(Method::Close, 3, Scaling::Classic, BoxSize::Value(0.5));
        assert_eq!(cla.title(), "Point & Figure (cla|cl) 0.5@50 x 3");

        let atr = ChartConfig::new(Method::Close, 2, Scaling::AverageTrueRange, BoxSize::Total);
        assert_eq!(atr.title(), "Point & Figure (atr|cl) total x 2");
    }

    #[test]
    fn test_box_size_parsing() {
        assert_eq!("total".parse::<BoxSize>().unwrap(), BoxSize::Total);
        assert_eq!("0.25".parse::<BoxSize>().unwrap(), BoxSize::Value(0.25));
        assert!("abc".parse::<BoxSize>().is_err());
        assert!("1/0".parse::<BoxSize>().is_err());
    }
}
