//! Charting Engine
//!
//! Components in dependency order:
//! - Box scale construction (absolute, logarithmic, classic, ATR)
//! - Trend state machine folding bars into column states
//! - Matrix projection of the states into an X/O grid
//! - Breakout detection over the grid
//! - Trendlines, pattern signals and price counts built on the breakouts
//! - Column indicators, bar-aligned buy/sell levels and signal scoring

pub mod scale;
pub mod trend;
pub mod matrix;
pub mod breakouts;
pub mod trendlines;
pub mod patterns;
pub mod counts;
pub mod indicators;
pub mod levels;
pub mod scoring;

// Re-export commonly used types
pub use scale::{average_true_range, BoxScale, ScaleSpec};
pub use trend::{fold_states, BarState, TrendStateMachine};
pub use matrix::{ColumnProfile, PnfMatrix};
pub use breakouts::{detect_breakouts, Breakout, BreakoutPattern};
pub use trendlines::{detect_trendlines, Bounded, Trendline, TrendlineKind};
pub use patterns::{detect_signals, PatternRecognizer, Signal, SignalBoard, SignalKind};
pub use counts::{detect_counts, Count, CountMethod};
pub use indicators::IndicatorSeries;
pub use scoring::{RatedSignal, ScoreChange, ScoreOutlook};

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::config::{ChartConfig, Overscan};
    use crate::series::{normalize, TimeSeries};
    use crate::types::Method;

    /// Close-method matrix on an absolute scale with box size 1; rows equal prices
    pub fn close_matrix(close: &[f64], reversal: u32) -> PnfMatrix {
        let series = TimeSeries::from_close(close.to_vec());
        let normalized = normalize(&series, &ChartConfig::default()).unwrap();
        let (min, max) = normalized.price_range(Method::Close);
        let scale = BoxScale::build(ScaleSpec::Absolute { box_size: 1.0 }, min, max, Overscan::default()).unwrap();
        let states = fold_states(&normalized, Method::Close, reversal, &scale).unwrap();
        PnfMatrix::from_states(&states, scale.len())
    }
}
