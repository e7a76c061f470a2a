//! Shared enums for the charting engine
//!
//! - `Trend`: direction of a column, breakout or trendline
//! - `Method`: which price fields drive the column state machine
//! - `Scaling`: how the box scale is laid out

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::PnfError;

/// Direction of a column (X = bullish, O = bearish)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Trend {
    Bullish,
    Bearish,
}

impl Trend {
    /// Matrix cell value for this direction (+1 / -1)
    pub fn sign(self) -> i8 {
        match self {
            Trend::Bullish => 1,
            Trend::Bearish => -1,
        }
    }

    pub fn from_sign(sign: i8) -> Option<Trend> {
        match sign {
            1 => Some(Trend::Bullish),
            -1 => Some(Trend::Bearish),
            _ => None,
        }
    }

    pub fn opposite(self) -> Trend {
        match self {
            Trend::Bullish => Trend::Bearish,
            Trend::Bearish => Trend::Bullish,
        }
    }
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::Bullish => write!(f, "Bullish"),
            Trend::Bearish => write!(f, "Bearish"),
        }
    }
}

/// Price fields that feed the column state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    /// Close only
    #[serde(rename = "cl")]
    Close,
    /// High extends, low reverses (extension checked first)
    #[serde(rename = "h/l")]
    HighLow,
    /// Low reverses, high extends (reversal checked first)
    #[serde(rename = "l/h")]
    LowHigh,
    /// Close decides, high/low set the box
    #[serde(rename = "hlc")]
    HighLowClose,
    /// Each bar replayed as a 4-point zig-zag through open, high, low and close
    #[serde(rename = "ohlc")]
    OpenHighLowClose,
}

impl Method {
    pub fn code(self) -> &'static str {
        match self {
            Method::Close => "cl",
            Method::HighLow => "h/l",
            Method::LowHigh => "l/h",
            Method::HighLowClose => "hlc",
            Method::OpenHighLowClose => "ohlc",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Method {
    type Err = PnfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cl" => Ok(Method::Close),
            "h/l" => Ok(Method::HighLow),
            "l/h" => Ok(Method::LowHigh),
            "hlc" => Ok(Method::HighLowClose),
            "ohlc" => Ok(Method::OpenHighLowClose),
            other => Err(PnfError::Configuration(format!(
                "unknown method '{}', valid methods are cl, h/l, l/h, hlc, ohlc",
                other
            ))),
        }
    }
}

/// Layout of the box scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scaling {
    /// Fixed price increment
    #[serde(rename = "abs")]
    Absolute,
    /// Fixed percentage increment
    #[serde(rename = "log")]
    Logarithmic,
    /// Traditional tiered table
    #[serde(rename = "cla")]
    Classic,
    /// Fixed increment equal to the average true range
    #[serde(rename = "atr")]
    AverageTrueRange,
}

impl Scaling {
    pub fn code(self) -> &'static str {
        match self {
            Scaling::Absolute => "abs",
            Scaling::Logarithmic => "log",
            Scaling::Classic => "cla",
            Scaling::AverageTrueRange => "atr",
        }
    }
}

impl std::fmt::Display for Scaling {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Scaling {
    type Err = PnfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "abs" => Ok(Scaling::Absolute),
            "log" => Ok(Scaling::Logarithmic),
            "cla" => Ok(Scaling::Classic),
            "atr" => Ok(Scaling::AverageTrueRange),
            other => Err(PnfError::Configuration(format!(
                "unknown scaling '{}', valid scalings are abs, log, cla, atr",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trend_sign_round_trip() {
        assert_eq!(Trend::Bullish.sign(), 1);
        assert_eq!(Trend::Bearish.sign(), -1);
        assert_eq!(Trend::from_sign(-1), Some(Trend::Bearish));
        assert_eq!(Trend::from_sign(0), None);
        assert_eq!(Trend::Bullish.opposite(), Trend::Bearish);
    }

    #[test]
    fn test_method_codes() {
        assert_eq!("h/l".parse::<Method>().unwrap(), Method::HighLow);
        assert_eq!("OHLC".parse::<Method>().unwrap(), Method::OpenHighLowClose);
        assert!("hl".parse::<Method>().is_err());
        assert_eq!(Method::LowHigh.to_string(), "l/h");
    }

    #[test]
    fn test_scaling_codes() {
        assert_eq!("cla".parse::<Scaling>().unwrap(), Scaling::Classic);
        assert!(matches!(
            "linear".parse::<Scaling>(),
            Err(PnfError::Configuration(_))
        ));
        assert_eq!(
            serde_json::to_string(&Scaling::AverageTrueRange).unwrap(),
            "\"atr\""
        );
    }
}
