//! Signal Scoring
//!
//! Breakouts rated by how tight and how sloped their line is, a one-step
//! projection of the chart (the active column run to its next signal, or a
//! reversal column added) and a score from -3 to 3 for the latest signal.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::breakouts::{detect_breakouts, Breakout, BreakoutPattern};
use super::matrix::PnfMatrix;
use super::scale::BoxScale;
use crate::types::Trend;

/// A breakout that survived rating, at most one per box
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatedSignal {
    /// e.g. `B-con(2)s(0)s`: direction, pattern, hits, spread, then `s` if sloping and `t` if a trap
    pub label: String,
    pub trend: Trend,
    pub pattern: BreakoutPattern,
    pub column: usize,
    pub row: usize,
    pub hits: usize,
    /// Columns the line is wider than a tight multiple top/bottom, halved
    pub spread: usize,
    /// Lows rising into a bullish breakout, highs falling into a bearish one
    pub sloping: bool,
    /// The previous column already carried a signal
    pub trap: bool,
}

#[derive(Debug, Clone, Copy)]
struct Rating {
    value: i64,
    spread: usize,
    sloping: bool,
    trap: bool,
}

fn rate(matrix: &PnfMatrix, breakout: &Breakout) -> Rating {
    let spread_factor = 0.5 * breakout.width as f64 + 0.5 - breakout.hits as f64;
    let start = breakout
        .column
        .checked_sub(breakout.width)
        .filter(|&s| s > 0)
        .unwrap_or(1);
    let size = (breakout.column + 1).saturating_sub(start) as f64;

    let low = |c: usize| matrix.column_low(c).unwrap_or(0) as f64;
    let high = |c: usize| matrix.column_high(c).unwrap_or(0) as f64;
    let drift = match breakout.trend {
        Trend::Bullish => low(breakout.column) - low(start),
        Trend::Bearish => high(start) - high(breakout.column),
    };
    let sloping = drift >= size / 2.0 && drift <= size;
    let trend_factor = if sloping { breakout.hits as f64 - 1.0 } else { 0.0 };

    Rating {
        value: (breakout.hits as f64 + trend_factor - spread_factor).trunc() as i64,
        spread: if spread_factor > 0.0 { spread_factor.trunc() as usize } else { 0 },
        sloping,
        trap: false,
    }
}

fn label(breakout: &Breakout, rating: &Rating) -> String {
    let side = match breakout.trend {
        Trend::Bullish => "B",
        Trend::Bearish => "S",
    };
    let pattern: String = breakout.pattern.to_string().chars().take(3).collect();
    let mut label = format!("{}-{}({})s({})", side, pattern, breakout.hits, rating.spread);
    if rating.sloping {
        label.push('s');
    }
    if rating.trap {
        label.push('t');
    }
    label
}

/// Rated signals of the matrix in breakout order
///
/// Per box only the breakout with the most hits among the best-rated
/// positive ones is kept.
pub fn rated_signals(matrix: &PnfMatrix) -> Vec<RatedSignal> {
    let breakouts = detect_breakouts(matrix);
    let mut best: HashMap<(usize, usize), (i64, usize)> = HashMap::new();
    let mut signalled: HashSet<usize> = HashSet::new();
    let mut ratings = Vec::with_capacity(breakouts.len());

    for (n, breakout) in breakouts.iter().enumerate() {
        let first_in_column = n == 0 || breakouts[n - 1].column != breakout.column;
        let mut rating = rate(matrix, breakout);
        rating.trap = first_in_column && signalled.contains(&(breakout.column - 1));

        if rating.value > 0 {
            let slot = best.entry((breakout.row, breakout.column)).or_insert((0, 0));
            if rating.value >= slot.0 && slot.1 < breakout.hits {
                *slot = (rating.value, breakout.hits);
                signalled.insert(breakout.column);
            }
        }
        ratings.push(rating);
    }

    breakouts
        .iter()
        .zip(ratings)
        .filter(|(b, r)| r.value > 0 && best.get(&(b.row, b.column)) == Some(&(r.value, b.hits)))
        .map(|(b, r)| RatedSignal {
            label: label(b, &r),
            trend: b.trend,
            pattern: b.pattern,
            column: b.column,
            row: b.row,
            hits: b.hits,
            spread: r.spread,
            sloping: r.sloping,
            trap: r.trap,
        })
        .collect()
}

/// Last column, its trend and its low and high rows
fn last_column(matrix: &PnfMatrix) -> Option<(usize, Trend, usize, usize)> {
    let last = matrix.columns().checked_sub(1)?;
    let trend = matrix.column_trend(last).unwrap_or(Trend::Bearish);
    Some((last, trend, matrix.column_low(last)?, matrix.column_high(last)?))
}

fn signal_rows(matrix: &PnfMatrix, column: usize) -> Vec<usize> {
    rated_signals(matrix)
        .into_iter()
        .filter(|s| s.column == column)
        .map(|s| s.row)
        .collect()
}

/// The active column extended to its next signal beyond the current one
///
/// Returns the matrix unchanged when no further signal exists in the column.
pub fn forward_in_column(matrix: &PnfMatrix) -> PnfMatrix {
    let Some((last, trend, low, high)) = last_column(matrix) else {
        return matrix.clone();
    };

    let reference = match rated_signals(matrix).last() {
        Some(s) if s.column == last => s.row,
        _ => match trend {
            Trend::Bullish => high,
            Trend::Bearish => low,
        },
    };

    let mut projected = matrix.clone();
    match trend {
        Trend::Bullish => (low..matrix.rows()).for_each(|r| projected.set(r, last, 1)),
        Trend::Bearish => (0..low).for_each(|r| projected.set(r, last, -1)),
    }

    let rows = signal_rows(&projected, last);
    match trend {
        Trend::Bullish => match rows.into_iter().filter(|&r| r > reference).min() {
            Some(row) => (row + 1..matrix.rows()).for_each(|r| projected.set(r, last, 0)),
            None => return matrix.clone(),
        },
        Trend::Bearish => match rows.into_iter().filter(|&r| r < reference).max() {
            Some(row) => (0..row).for_each(|r| projected.set(r, last, 0)),
            None => return matrix.clone(),
        },
    }

    debug!("Projected column {} to its next signal", last);
    projected
}

/// The matrix with a reversal column added, run to its first signal
///
/// Without a signal the new column spans to the edge of the grid.
pub fn forward_next_column(matrix: &PnfMatrix) -> PnfMatrix {
    let Some((last, trend, low, high)) = last_column(matrix) else {
        return matrix.clone();
    };

    let next = last + 1;
    let mut projected = matrix.widened();
    match trend {
        Trend::Bullish => (0..high).for_each(|r| projected.set(r, next, -1)),
        Trend::Bearish => (low + 1..matrix.rows()).for_each(|r| projected.set(r, next, 1)),
    }

    let rows = signal_rows(&projected, next);
    match trend {
        Trend::Bullish => {
            if let Some(row) = rows.into_iter().max() {
                (0..row).for_each(|r| projected.set(r, next, 0));
            }
        }
        Trend::Bearish => {
            if let Some(row) = rows.into_iter().min() {
                (row + 1..matrix.rows()).for_each(|r| projected.set(r, next, 0));
            }
        }
    }

    projected
}

/// Signal the chart gives next if the active column reverses
pub fn next_reversal_signal(matrix: &PnfMatrix) -> Option<RatedSignal> {
    rated_signals(&forward_next_column(matrix)).pop()
}

/// Signal the chart gives next if the active column continues
pub fn next_continuation_signal(matrix: &PnfMatrix) -> Option<RatedSignal> {
    rated_signals(&forward_in_column(matrix)).pop()
}

/// Score of the latest signal
///
/// ±3 when it sits in the last column, ±2 in the column before, otherwise
/// ±1 following the last column's direction; 0 for an empty chart.
pub fn signal_score(matrix: &PnfMatrix) -> i8 {
    let Some(last) = matrix.columns().checked_sub(1) else {
        return 0;
    };
    let direction = |trend: Trend, strength: i8| match trend {
        Trend::Bullish => strength,
        Trend::Bearish => -strength,
    };

    match rated_signals(matrix).last() {
        Some(s) if s.column == last => direction(s.trend, 3),
        Some(s) if s.column + 1 == last => direction(s.trend, 2),
        _ => matrix.column_trend(last).map(|t| direction(t, 1)).unwrap_or(0),
    }
}

/// Price at which the score moves to `to`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreChange {
    pub to: i8,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreOutlook {
    pub score: i8,
    pub changes: Vec<ScoreChange>,
}

/// Current score and the prices that would change it
///
/// Levels come from the two projections: the reversal column (`added`) and
/// the active column run to its next signal (`completed`).
pub fn score_changes(matrix: &PnfMatrix, scale: &BoxScale, reversal: u32) -> ScoreOutlook {
    let score = signal_score(matrix);
    let reversal = reversal as usize;

    let added = forward_next_column(matrix);
    let added_column = added.columns().saturating_sub(1);
    let (added_low, added_high) = (added.column_low(added_column), added.column_high(added_column));

    let completed = forward_in_column(matrix);
    let completed_column = completed.columns().saturating_sub(1);
    let (done_low, done_high) = (
        completed.column_low(completed_column),
        completed.column_high(completed_column),
    );

    let at = |row: Option<usize>| row.and_then(|r| scale.get(r));
    let reversed_down = |row: Option<usize>| row.and_then(|r| (r + 1).checked_sub(reversal)).and_then(|r| scale.get(r));
    let reversed_up = |row: Option<usize>| row.and_then(|r| (r + reversal).checked_sub(1)).and_then(|r| scale.get(r));

    let targets = match score {
        3 => vec![(2, reversed_down(added_high)), (-3, at(added_low))],
        2 => vec![(3, at(added_high)), (1, reversed_up(added_low)), (-3, at(done_low))],
        1 => vec![(3, at(done_high)), (-1, reversed_down(added_high)), (-3, at(added_low))],
        -1 => vec![(3, at(added_high)), (1, reversed_up(added_low)), (-3, at(done_low))],
        -2 => vec![(3, at(done_high)), (-1, reversed_down(added_high)), (-3, at(added_low))],
        -3 => vec![(3, at(added_high)), (-2, reversed_up(added_low))],
        _ => Vec::new(),
    };

    ScoreOutlook {
        score,
        changes: targets
            .into_iter()
            .filter_map(|(to, price)| price.map(|price| ScoreChange { to, price }))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Overscan;
    use crate::engine::scale::ScaleSpec;
    use crate::engine::testing::close_matrix;

    fn price_scale() -> BoxScale {
        BoxScale::build(ScaleSpec::Absolute { box_size: 1.0 }, 1.0, 8.0, Overscan::default()).unwrap()
    }

    #[test]
    fn test_sloping_double_top_is_rated() {
        let signals = rated_signals(&close_matrix(&[5.0, 1.0, 6.0, 3.0, 7.0], 3));

        assert_eq!(
            signals,
            vec![RatedSignal {
                label: "B-con(2)s(0)s".to_string(),
                trend: Trend::Bullish,
                pattern: BreakoutPattern::Continuation,
                column: 3,
                row: 7,
                hits: 2,
                spread: 0,
                sloping: true,
                trap: false,
            }]
        );
    }

    #[test]
    fn test_reversal_column_stops_at_first_signal() {
        let matrix = close_matrix(&[5.0, 1.0, 6.0, 3.0, 7.0], 3);
        let projected = forward_next_column(&matrix);

        assert_eq!(projected.columns(), 5);
        assert_eq!(projected.column_trend(4), Some(Trend::Bearish));
        assert_eq!((projected.column_low(4), projected.column_high(4)), (Some(2), Some(6)));
        assert_eq!(projected.action(4, 4), None);

        let next = next_reversal_signal(&matrix).unwrap();
        // the double top one column back makes the breakdown a trap
        assert_eq!(next.label, "S-rev(2)s(0)t");
        assert_eq!((next.column, next.row), (4, 2));
    }

    #[test]
    fn test_continuation_without_further_signal_keeps_matrix() {
        let matrix = close_matrix(&[5.0, 1.0, 6.0, 3.0, 7.0], 3);
        assert_eq!(forward_in_column(&matrix), matrix);
        assert_eq!(next_continuation_signal(&matrix).map(|s| s.row), Some(7));
    }

    #[test]
    fn test_continuation_runs_to_next_breakdown() {
        let matrix = close_matrix(&[1.0, 5.0, 2.0, 7.0, 2.0], 3);
        let projected = forward_in_column(&matrix);

        assert_eq!((projected.column_low(3), projected.column_high(3)), (Some(1), Some(6)));

        let next = next_continuation_signal(&matrix).unwrap();
        assert_eq!(next.label, "S-rev(2)s(0)t");
        assert!(next.trap);
        assert!(!next.sloping);
    }

    #[test]
    fn test_scores() {
        assert_eq!(signal_score(&close_matrix(&[5.0, 1.0, 6.0, 3.0, 7.0], 3)), 3);
        assert_eq!(signal_score(&close_matrix(&[1.0, 5.0, 2.0, 7.0, 2.0], 3)), 2);
        // no breakout at all: follows the last column
        assert_eq!(signal_score(&close_matrix(&[1.0, 5.0, 2.0], 3)), -1);
        assert_eq!(signal_score(&PnfMatrix::new(4, 0)), 0);
    }

    #[test]
    fn test_score_change_levels_after_buy() {
        let matrix = close_matrix(&[5.0, 1.0, 6.0, 3.0, 7.0], 3);
        let outlook = score_changes(&matrix, &price_scale(), 3);

        assert_eq!(outlook.score, 3);
        assert_eq!(
            outlook.changes,
            vec![ScoreChange { to: 2, price: 4.0 }, ScoreChange { to: -3, price: 2.0 }]
        );
    }

    #[test]
    fn test_score_change_levels_one_column_after_buy() {
        let matrix = close_matrix(&[1.0, 5.0, 2.0, 7.0, 2.0], 3);
        let outlook = score_changes(&matrix, &price_scale(), 3);

        assert_eq!(outlook.score, 2);
        assert_eq!(
            outlook.changes,
            vec![
                ScoreChange { to: 3, price: 8.0 },
                ScoreChange { to: 1, price: 5.0 },
                ScoreChange { to: -3, price: 1.0 },
            ]
        );
    }

    #[test]
    fn test_spread_line_loses_rating() {
        let breakout = Breakout {
            trend: Trend::Bullish,
            pattern: BreakoutPattern::Resistance,
            column: 6,
            row: 6,
            hits: 2,
            width: 7,
            outer_width: 7,
            bar: None,
        };
        let matrix = close_matrix(&[1.0, 5.0, 2.0, 5.0, 2.0, 5.0, 2.0, 6.0], 3);
        let rating = rate(&matrix, &breakout);

        assert_eq!(rating.spread, 2);
        assert!(!rating.sloping);
        assert_eq!(rating.value, 0);
        assert_eq!(label(&breakout, &rating), "B-res(2)s(2)");
    }
}
