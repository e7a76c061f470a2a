//! Column State Machine
//!
//! Folds a price series into P&F column states:
//! 1. FIRST TREND - scan forward until price moves one box away from the first bar
//! 2. EXTEND - in an X column keep raising the box while price crosses the next box up
//!    (mirrored for O columns)
//! 3. REVERSE - once price retraces `reversal` boxes from the column extreme, flip the
//!    trend and open the next column
//!
//! The five methods only differ in which price field drives extension vs. reversal
//! and in which check runs first. Open-high-low-close replays each bar as a
//! 4-point zig-zag through the close-only step.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::scale::BoxScale;
use crate::error::{PnfError, Result};
use crate::series::NormalizedSeries;
use crate::types::{Method, Trend};

/// State recorded whenever the box or the trend changes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BarState {
    /// Index of the bar that produced this state
    pub bar: usize,
    /// Price of the current box
    pub box_value: f64,
    /// Row of the current box in the box scale
    pub box_index: usize,
    /// Column index, increments by one per reversal
    pub column: usize,
    pub trend: Trend,
    /// Boxes filled in the active column
    pub filled: usize,
}

/// Sequential column state over a box scale
#[derive(Debug, Clone)]
pub struct TrendStateMachine<'a> {
    scale: &'a BoxScale,
    reversal: i64,
    box_index: i64,
    column: usize,
    trend: Trend,
    filled: i64,
}

impl<'a> TrendStateMachine<'a> {
    /// Start a column at `box_index` with one filled box
    pub fn new(scale: &'a BoxScale, reversal: u32, box_index: usize, trend: Trend) -> Self {
        Self {
            scale,
            reversal: reversal as i64,
            box_index: box_index as i64,
            column: 0,
            trend,
            filled: 1,
        }
    }

    pub fn trend(&self) -> Trend {
        self.trend
    }

    pub fn box_index(&self) -> usize {
        self.box_index.max(0) as usize
    }

    pub fn column(&self) -> usize {
        self.column
    }

    /// Current state attributed to `bar`
    pub fn state(&self, bar: usize) -> BarState {
        let box_index = self.box_index();
        BarState {
            bar,
            box_value: self.scale.at(box_index as i64),
            box_index,
            column: self.column,
            trend: self.trend,
            filled: self.filled.max(0) as usize,
        }
    }

    /// Box `offset` rows away from the current one; off-scale reads as +/- infinity
    fn threshold(&self, offset: i64) -> f64 {
        self.scale.at(self.box_index + offset)
    }

    /// Price that extends the active column by at least one box
    pub fn extends(&self, price: f64) -> bool {
        match self.trend {
            Trend::Bullish => price >= self.threshold(1),
            Trend::Bearish => price <= self.threshold(-1),
        }
    }

    /// Price that reverses the active column
    pub fn reverses(&self, price: f64) -> bool {
        match self.trend {
            Trend::Bullish => price <= self.threshold(-self.reversal),
            Trend::Bearish => price >= self.threshold(self.reversal),
        }
    }

    fn extend(&mut self, price: f64) {
        let start = self.box_index;
        match self.trend {
            Trend::Bullish => {
                while price >= self.threshold(1) {
                    self.box_index += 1;
                }
                self.filled += self.box_index - start;
            }
            Trend::Bearish => {
                while price <= self.threshold(-1) {
                    self.box_index -= 1;
                }
                self.filled += start - self.box_index;
            }
        }
    }

    /// Flip the trend and move to the box reached by `price`
    pub fn reverse(&mut self, price: f64) {
        let prev_box = self.box_index;
        let prev_filled = self.filled;

        match self.trend {
            Trend::Bullish => {
                self.box_index = self
                    .scale
                    .first_at_or_above(price)
                    .map(|i| i as i64)
                    .unwrap_or(prev_box);
                self.filled = prev_box - self.box_index;
            }
            Trend::Bearish => {
                self.box_index = self
                    .scale
                    .last_at_or_below(price)
                    .map(|i| i as i64)
                    .unwrap_or(prev_box);
                self.filled = self.box_index - prev_box;
            }
        }
        self.trend = self.trend.opposite();
        self.column += 1;

        // One-step-back: a single-box column is folded into the reversal column
        if self.reversal == 1 && prev_filled == 1 {
            self.column -= 1;
            self.filled += 1;
        }
    }

    /// Close-only step: extend, then check for a reversal
    pub fn basic(&mut self, price: f64) {
        if self.extends(price) {
            self.extend(price);
        }
        if self.reverses(price) {
            self.reverse(price);
        }
    }
}

/// One bar (or zig-zag point) of input for a particular method
trait ColumnStepper {
    /// Number of steps to replay
    fn len(&self) -> usize;

    /// Prices used to find the first trend: (up side, down side)
    fn anchor(&self, i: usize) -> (f64, f64);

    fn step(&self, machine: &mut TrendStateMachine<'_>, i: usize);

    /// Bar that step `i` belongs to
    fn bar_of(&self, i: usize) -> usize {
        i
    }
}

struct CloseStepper<'s> {
    close: &'s [f64],
}

impl ColumnStepper for CloseStepper<'_> {
    fn len(&self) -> usize {
        self.close.len()
    }

    fn anchor(&self, i: usize) -> (f64, f64) {
        (self.close[i], self.close[i])
    }

    fn step(&self, machine: &mut TrendStateMachine<'_>, i: usize) {
        machine.basic(self.close[i]);
    }
}

/// High extends, low reverses; extension is checked first
struct HighLowStepper<'s> {
    high: &'s [f64],
    low: &'s [f64],
}

impl ColumnStepper for HighLowStepper<'_> {
    fn len(&self) -> usize {
        self.high.len()
    }

    fn anchor(&self, i: usize) -> (f64, f64) {
        (self.high[i], self.low[i])
    }

    fn step(&self, machine: &mut TrendStateMachine<'_>, i: usize) {
        let (with_trend, against) = match machine.trend() {
            Trend::Bullish => (self.high[i], self.low[i]),
            Trend::Bearish => (self.low[i], self.high[i]),
        };
        if machine.extends(with_trend) {
            machine.basic(with_trend);
        } else if machine.reverses(against) {
            machine.reverse(against);
        }
    }
}

/// Same fields as high-low but the reversal is checked first
struct LowHighStepper<'s> {
    high: &'s [f64],
    low: &'s [f64],
}

impl ColumnStepper for LowHighStepper<'_> {
    fn len(&self) -> usize {
        self.high.len()
    }

    fn anchor(&self, i: usize) -> (f64, f64) {
        (self.high[i], self.low[i])
    }

    fn step(&self, machine: &mut TrendStateMachine<'_>, i: usize) {
        let (with_trend, against) = match machine.trend() {
            Trend::Bullish => (self.high[i], self.low[i]),
            Trend::Bearish => (self.low[i], self.high[i]),
        };
        if machine.reverses(against) {
            machine.reverse(against);
        } else if machine.extends(with_trend) {
            machine.basic(with_trend);
        }
    }
}

/// Close decides between extension and reversal, high/low set the box reached
struct HighLowCloseStepper<'s> {
    high: &'s [f64],
    low: &'s [f64],
    close: &'s [f64],
}

impl ColumnStepper for HighLowCloseStepper<'_> {
    fn len(&self) -> usize {
        self.close.len()
    }

    fn anchor(&self, i: usize) -> (f64, f64) {
        (self.high[i], self.low[i])
    }

    fn step(&self, machine: &mut TrendStateMachine<'_>, i: usize) {
        let close = self.close[i];
        let (with_trend, against) = match machine.trend() {
            Trend::Bullish => (self.high[i], self.low[i]),
            Trend::Bearish => (self.low[i], self.high[i]),
        };
        if machine.extends(close) {
            machine.basic(with_trend);
        } else if machine.reverses(close) {
            machine.reverse(against);
        }
    }
}

/// Open-high-low-close bars replayed as 4 points each
struct ZigZagStepper {
    points: Vec<f64>,
}

impl ZigZagStepper {
    fn new(open: &[f64], high: &[f64], low: &[f64], close: &[f64]) -> Self {
        let mut points = Vec::with_capacity(close.len() * 4);
        for n in 0..close.len() {
            let (o, h, l, c) = (open[n], high[n], low[n], close[n]);
            if low_first(o, h, l, c, n.checked_sub(1).map(|p| close[p])) {
                points.extend_from_slice(&[o, l, h, c]);
            } else {
                points.extend_from_slice(&[o, h, l, c]);
            }
        }
        Self { points }
    }
}

/// Whether a bar visits its low before its high
///
/// Up bars go open-low-high-close, down bars open-high-low-close. Bars that
/// close at their open are decided by where the close sits in the range, and
/// a close exactly at mid-range follows the previous close.
fn low_first(open: f64, high: f64, low: f64, close: f64, prev_close: Option<f64>) -> bool {
    if close > open {
        return true;
    }
    if close < open {
        return false;
    }
    if close == low {
        return false;
    }
    if close == high {
        return true;
    }

    let mid = (high + low) / 2.0;
    if mid > close {
        false
    } else if mid < close {
        true
    } else {
        matches!(prev_close, Some(prev) if prev > close)
    }
}

impl ColumnStepper for ZigZagStepper {
    fn len(&self) -> usize {
        self.points.len()
    }

    fn anchor(&self, i: usize) -> (f64, f64) {
        (self.points[i], self.points[i])
    }

    fn step(&self, machine: &mut TrendStateMachine<'_>, i: usize) {
        machine.basic(self.points[i]);
    }

    fn bar_of(&self, i: usize) -> usize {
        i / 4
    }
}

fn stepper_for<'s>(series: &'s NormalizedSeries, method: Method) -> Box<dyn ColumnStepper + 's> {
    match method {
        Method::Close => Box::new(CloseStepper {
            close: series.close(),
        }),
        Method::HighLow => Box::new(HighLowStepper {
            high: series.high(),
            low: series.low(),
        }),
        Method::LowHigh => Box::new(LowHighStepper {
            high: series.high(),
            low: series.low(),
        }),
        Method::HighLowClose => Box::new(HighLowCloseStepper {
            high: series.high(),
            low: series.low(),
            close: series.close(),
        }),
        Method::OpenHighLowClose => Box::new(ZigZagStepper::new(
            series.open(),
            series.high(),
            series.low(),
            series.close(),
        )),
    }
}

/// First trend and the step index that established it
fn first_trend(stepper: &dyn ColumnStepper, scale: &BoxScale) -> Result<(usize, Trend, usize)> {
    if stepper.len() == 0 {
        return Err(PnfError::NoTrend);
    }

    let (up_price, down_price) = stepper.anchor(0);
    let up = scale.last_at_or_below(up_price).ok_or(PnfError::NoTrend)? as i64;
    let down = scale.last_at_or_below(down_price).ok_or(PnfError::NoTrend)? as i64;

    for k in 1..stepper.len() {
        let (high, low) = stepper.anchor(k);
        if high >= scale.at(up + 1) {
            return Ok((up as usize, Trend::Bullish, k));
        }
        if low <= scale.at(down - 1) {
            return Ok((down as usize, Trend::Bearish, k));
        }
    }

    Err(PnfError::NoTrend)
}

/// Fold the series into state-change records
///
/// The first record is the anchor state at bar 0; afterwards a record is
/// kept only when the box or the trend changes.
pub fn fold_states(
    series: &NormalizedSeries,
    method: Method,
    reversal: u32,
    scale: &BoxScale,
) -> Result<Vec<BarState>> {
    let stepper = stepper_for(series, method);
    let (anchor, trend, detected_at) = first_trend(stepper.as_ref(), scale)?;

    debug!(
        "First trend {} at box {} ({}), established at step {}",
        trend,
        anchor,
        scale.at(anchor as i64),
        detected_at
    );

    let mut machine = TrendStateMachine::new(scale, reversal, anchor, trend);
    let mut records = vec![machine.state(stepper.bar_of(0))];

    for i in detected_at..stepper.len() {
        let (prev_box, prev_trend) = (machine.box_index(), machine.trend());
        stepper.step(&mut machine, i);
        if machine.box_index() != prev_box || machine.trend() != prev_trend {
            records.push(machine.state(stepper.bar_of(i)));
        }
    }

    Ok(records)
}
