//! Error types for chart construction and analysis

use thiserror::Error;

/// Errors raised by the charting engine
///
/// All of them are deterministic: the same series and configuration always
/// fail the same way, so nothing here is worth retrying.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PnfError {
    /// Invalid method/scaling/box size combination, or an ATR window longer than the series
    #[error("Invalid chart configuration: {0}")]
    Configuration(String),

    /// Price never moved one box away from the first bar
    #[error("No trend could be established with this box size, choose a smaller box size")]
    NoTrend,

    /// Missing or unequal fields, empty series or non-finite prices
    #[error("Invalid time series: {0}")]
    Shape(String),

    /// The external trendline scan stopped making progress
    #[error("Trendline scan did not settle after {iterations} iterations")]
    TrendlineScan { iterations: usize },

    /// Writing the text rendering failed
    #[error("Failed to render chart: {0}")]
    Render(#[from] std::fmt::Error),
}

pub type Result<T> = std::result::Result<T, PnfError>;
