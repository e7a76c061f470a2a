//! Price Target Counts
//!
//! Projects price targets from breakouts against a box scale extended far
//! enough beyond the data for every projection to land on a box.
//!
//! Reversal > 1:
//! - vertical: height of the first column in the pattern times the reversal,
//!   measured from the box below (above) the pattern
//! - horizontal: width of a reversal pattern times the reversal
//!
//! Reversal = 1 (outer width of reversal patterns):
//! - base: measured from the most crowded row of the pattern
//! - signal: measured from the base of the breakout column
//!
//! Every count carries two risks (to the box below the previous column and
//! below the whole pattern) and the matching reward:risk ratios.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::breakouts::{Breakout, BreakoutPattern};
use super::matrix::PnfMatrix;
use super::scale::BoxScale;
use crate::config::{CountParams, Overscan};
use crate::error::Result;
use crate::types::Trend;

/// Smallest pattern width considered for horizontal counts
pub const MIN_COUNT_LENGTH: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CountMethod {
    Vertical,
    Horizontal,
    HorizontalBase,
    HorizontalSignal,
}

impl std::fmt::Display for CountMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CountMethod::Vertical => write!(f, "vertical"),
            CountMethod::Horizontal => write!(f, "horizontal"),
            CountMethod::HorizontalBase => write!(f, "horizontal (base)"),
            CountMethod::HorizontalSignal => write!(f, "horizontal (signal)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Count {
    pub trend: Trend,
    pub method: CountMethod,
    pub column: usize,
    pub row: usize,
    /// Price of the breakout box
    pub box_value: f64,
    pub anchor_column: usize,
    pub anchor_box: f64,
    /// Column height (vertical) or pattern width (horizontal) used for the projection
    pub length: usize,
    pub target: f64,
    pub reward: f64,
    pub risk1: f64,
    pub risk2: f64,
    /// Reward over `risk1`, absent when the risk is not positive
    pub ratio1: Option<f64>,
    pub ratio2: Option<f64>,
    /// Share of the pattern rectangle filled with boxes
    pub quality: f64,
    pub bar: Option<usize>,
}

/// Drops counts without a finite positive reward and repeats of the same
/// (method, length, column, row); a vertical and a horizontal count on one
/// box project different targets and are both kept
fn retain_distinct(raw: Vec<Count>) -> Vec<Count> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .filter(|c| c.reward > 0.0 && c.reward.is_finite())
        .filter(|c| seen.insert((c.method, c.length, c.column, c.row)))
        .collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn ratio(reward: f64, risk: f64) -> Option<f64> {
    (risk > 0.0 && risk.is_finite()).then(|| round2(reward / risk))
}

/// Filled share of a `width` x `height` block: a full P&F pattern fills one
/// row per column plus the first column
fn fill_quality(filled: usize, width: usize, height: usize) -> f64 {
    if height == 0 || width == 0 {
        return 0.0;
    }
    let possible = (width - 1) * (height - 1) + height;
    round2(filled as f64 / possible as f64)
}

/// Columns `from..=to` of the matrix
struct Window<'m> {
    matrix: &'m PnfMatrix,
    from: usize,
    to: usize,
}

impl<'m> Window<'m> {
    fn new(matrix: &'m PnfMatrix, column: usize, width: usize) -> Option<Self> {
        let from = (column + 1).checked_sub(width)?;
        Some(Self {
            matrix,
            from,
            to: column,
        })
    }

    fn width(&self) -> usize {
        self.to - self.from + 1
    }

    fn row_count(&self, row: usize) -> usize {
        (self.from..=self.to)
            .filter(|&c| self.matrix.get(row, c) != 0)
            .count()
    }

    fn lowest(&self) -> Option<usize> {
        (0..self.matrix.rows()).find(|&r| self.row_count(r) > 0)
    }

    fn highest(&self) -> Option<usize> {
        (0..self.matrix.rows()).rev().find(|&r| self.row_count(r) > 0)
    }

    /// Filled boxes in rows `rows`
    fn filled(&self, rows: std::ops::Range<usize>) -> usize {
        rows.map(|r| self.row_count(r)).sum()
    }

    /// Offset of the rightmost filled column in `row`
    fn last_filled_in(&self, row: usize) -> Option<usize> {
        (self.from..=self.to)
            .rev()
            .find(|&c| self.matrix.get(row, c) != 0)
            .map(|c| c - self.from)
    }
}

/// Breakout data shared by every count method
struct CountContext<'a> {
    matrix: &'a PnfMatrix,
    scale: &'a BoxScale,
    extended: &'a BoxScale,
    offset: i64,
    reversal: usize,
}

impl CountContext<'_> {
    fn price(&self, row: i64) -> Option<f64> {
        usize::try_from(row).ok().and_then(|r| self.scale.get(r))
    }

    /// Box of the extended scale `rows` rows from real row `anchor`
    fn target(&self, anchor: usize, rows: i64) -> Option<f64> {
        let index = (anchor as i64 + rows + self.offset).max(0);
        self.extended.get(index as usize)
    }

    #[allow(clippy::too_many_arguments)]
    fn count(
        &self,
        b: &Breakout,
        method: CountMethod,
        anchor_column: usize,
        anchor_row: usize,
        length: usize,
        target: f64,
        risk_rows: (i64, i64),
        quality: f64,
    ) -> Option<Count> {
        let box_value = self.price(b.row as i64)?;
        let anchor_box = self.price(anchor_row as i64)?;
        let (risk1_box, risk2_box) = (self.price(risk_rows.0)?, self.price(risk_rows.1)?);

        let (reward, risk1, risk2) = match b.trend {
            Trend::Bullish => (target - box_value, box_value - risk1_box, box_value - risk2_box),
            Trend::Bearish => (box_value - target, risk1_box - box_value, risk2_box - box_value),
        };

        Some(Count {
            trend: b.trend,
            method,
            column: b.column,
            row: b.row,
            box_value,
            anchor_column,
            anchor_box,
            length,
            target,
            reward,
            risk1,
            risk2,
            ratio1: ratio(reward, risk1),
            ratio2: ratio(reward, risk2),
            quality,
            bar: b.bar,
        })
    }

    fn vertical(&self, b: &Breakout) -> Option<Count> {
        let window = Window::new(self.matrix, b.column, b.width)?;
        let first = window.from;
        let length = self.matrix.column_height(first);
        let rev = (length * self.reversal) as i64;

        match b.trend {
            Trend::Bullish => {
                let low = window.lowest().filter(|&low| low < b.row)?;
                if self.matrix.get(low, first) != 1 || low == 0 {
                    return None;
                }
                let anchor = low - 1;
                let previous_low = self.matrix.column_low(b.column.checked_sub(1)?)? as i64;
                self.count(
                    b,
                    CountMethod::Vertical,
                    first,
                    anchor,
                    length,
                    self.target(anchor, rev)?,
                    (previous_low - 1, low as i64 - 1),
                    fill_quality(window.filled(low..b.row), window.width(), b.row - low),
                )
            }
            Trend::Bearish => {
                let high = window.highest().filter(|&high| high > b.row)?;
                if self.matrix.get(high, first) != -1 {
                    return None;
                }
                let anchor = high + 1;
                let previous_high = self.matrix.column_high(b.column.checked_sub(1)?)? as i64;
                self.count(
                    b,
                    CountMethod::Vertical,
                    first,
                    anchor,
                    length,
                    self.target(anchor, -rev)?,
                    (previous_high + 1, high as i64 + 1),
                    fill_quality(window.filled(b.row + 1..high + 1), window.width(), high - b.row),
                )
            }
        }
    }

    fn horizontal(&self, b: &Breakout) -> Option<Count> {
        let window = Window::new(self.matrix, b.column, b.width)?;
        let rev = (b.width * self.reversal) as i64;

        match b.trend {
            Trend::Bullish => {
                let low = window.lowest().filter(|&low| low < b.row)?;
                let previous_low = self.matrix.column_low(b.column.checked_sub(1)?)? as i64;
                self.count(
                    b,
                    CountMethod::Horizontal,
                    window.from + window.last_filled_in(low)?,
                    low,
                    b.width,
                    self.target(low, rev)?,
                    (previous_low - 1, low as i64 - 1),
                    fill_quality(window.filled(low..b.row), window.width(), b.row - low),
                )
            }
            Trend::Bearish => {
                let high = window.highest().filter(|&high| high > b.row)?;
                let previous_high = self.matrix.column_high(b.column.checked_sub(1)?)? as i64;
                self.count(
                    b,
                    CountMethod::Horizontal,
                    window.from + window.last_filled_in(high)?,
                    high,
                    b.width,
                    self.target(high, -rev)?,
                    (previous_high + 1, high as i64 + 1),
                    fill_quality(window.filled(b.row + 1..high + 1), window.width(), high - b.row),
                )
            }
        }
    }

    /// Single-box reversal count from the most crowded row of the pattern
    fn horizontal_base(&self, b: &Breakout) -> Option<Count> {
        let width = b.outer_width;
        let window = Window::new(self.matrix, b.column, width)?;
        let counts: Vec<usize> = (0..self.matrix.rows()).map(|r| window.row_count(r)).collect();
        let most = counts.iter().copied().max().filter(|&m| m > 0)?;
        let quality = round2(most as f64 / width as f64);

        match b.trend {
            Trend::Bullish => {
                let low = window.lowest()?;
                let anchor = counts.iter().position(|&c| c == most)?;
                self.count(
                    b,
                    CountMethod::HorizontalBase,
                    b.column,
                    anchor,
                    width,
                    self.target(anchor, width as i64)?,
                    (anchor as i64 - 1, low as i64 - 1),
                    quality,
                )
            }
            Trend::Bearish => {
                let high = window.highest()?;
                let anchor = counts.iter().rposition(|&c| c == most)?;
                self.count(
                    b,
                    CountMethod::HorizontalBase,
                    b.column,
                    anchor,
                    width,
                    self.target(anchor, -(width as i64))?,
                    (anchor as i64 + 1, high as i64 + 1),
                    quality,
                )
            }
        }
    }

    /// Single-box reversal count from the base of the breakout column
    fn horizontal_signal(&self, b: &Breakout) -> Option<Count> {
        let width = b.outer_width;
        let window = Window::new(self.matrix, b.column, width)?;

        match b.trend {
            Trend::Bullish => {
                let low = window.lowest()?;
                let anchor = self.matrix.column_low(b.column)?;
                self.count(
                    b,
                    CountMethod::HorizontalSignal,
                    b.column,
                    anchor,
                    width,
                    self.target(anchor, width as i64)?,
                    (anchor as i64 - 1, low as i64 - 1),
                    fill_quality(window.filled(low..b.row), width, b.row.saturating_sub(low)),
                )
            }
            Trend::Bearish => {
                let high = window.highest()?;
                let anchor = self.matrix.column_high(b.column)?;
                self.count(
                    b,
                    CountMethod::HorizontalSignal,
                    b.column,
                    anchor,
                    width,
                    self.target(anchor, -(width as i64))?,
                    (anchor as i64 + 1, high as i64 + 1),
                    fill_quality(window.filled(b.row + 1..high + 1), width, high.saturating_sub(b.row)),
                )
            }
        }
    }
}

/// Boxes the scale must extend by below and above for every projection
fn extension(matrix: &PnfMatrix, breakouts: &[Breakout], reversal: usize, min_length: usize) -> Overscan {
    let widest = |trend: Trend| {
        breakouts
            .iter()
            .filter(|b| b.trend == trend && b.pattern == BreakoutPattern::Reversal)
            .map(|b| b.outer_width)
            .fold(min_length, usize::max)
    };
    let tallest = (0..matrix.columns())
        .map(|c| matrix.column_height(c))
        .max()
        .unwrap_or(0);
    let vertical = 2 * reversal * tallest;

    Overscan {
        below: (widest(Trend::Bearish) * reversal).max(vertical),
        above: (widest(Trend::Bullish) * reversal).max(vertical),
    }
}

/// Price targets for the breakouts of a chart
///
/// `price_range` is the (min, max) the chart's box scale was built for.
pub fn detect_counts(
    matrix: &PnfMatrix,
    breakouts: &[Breakout],
    scale: &BoxScale,
    price_range: (f64, f64),
    reversal: u32,
    params: CountParams,
) -> Result<Vec<Count>> {
    let min_length = params.min_length.max(MIN_COUNT_LENGTH);
    let reversal = reversal as usize;
    if matrix.columns() == 0 || scale.is_empty() {
        return Ok(Vec::new());
    }

    let overscan = extension(matrix, breakouts, reversal, min_length);
    let extended = BoxScale::build(scale.spec(), price_range.0, price_range.1, overscan)?;
    let Some(offset) = scale.get(0).and_then(|first| extended.position_of(first)) else {
        warn!("Extended box scale does not contain the chart's first box, no counts");
        return Ok(Vec::new());
    };

    let context = CountContext {
        matrix,
        scale,
        extended: &extended,
        offset: offset as i64,
        reversal,
    };

    let reversals = || {
        breakouts
            .iter()
            .filter(|b| b.pattern == BreakoutPattern::Reversal)
    };

    let mut raw: Vec<Count> = Vec::new();
    if reversal > 1 {
        raw.extend(breakouts.iter().filter_map(|b| context.vertical(b)));
        raw.extend(
            reversals()
                .filter(|b| b.width >= min_length)
                .filter_map(|b| context.horizontal(b)),
        );
    } else {
        raw.extend(
            reversals()
                .filter(|b| b.outer_width >= min_length)
                .filter_map(|b| context.horizontal_base(b)),
        );
        raw.extend(
            reversals()
                .filter(|b| b.outer_width >= min_length)
                .filter_map(|b| context.horizontal_signal(b)),
        );
    }

    let counts = retain_distinct(raw);

    debug!("Projected {} counts against {} extended boxes", counts.len(), extended.len());
    Ok(counts)
}
