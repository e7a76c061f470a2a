//! Breakout Detection
//!
//! A breakout is a cell that takes the column's sign while the same row of the
//! previous column is empty. The line it breaks is the row just below (X) or
//! above (O): every same-signed column on that line after the last
//! opposite-signed one is a hit. At least two hits make a breakout.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::matrix::PnfMatrix;
use crate::types::Trend;

/// Shape of the line at its left end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BreakoutPattern {
    Resistance,
    Fulcrum,
    Reversal,
    Continuation,
}

impl std::fmt::Display for BreakoutPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakoutPattern::Resistance => write!(f, "resistance"),
            BreakoutPattern::Fulcrum => write!(f, "fulcrum"),
            BreakoutPattern::Reversal => write!(f, "reversal"),
            BreakoutPattern::Continuation => write!(f, "continuation"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakout {
    pub trend: Trend,
    pub pattern: BreakoutPattern,
    pub column: usize,
    /// Row of the breaking box
    pub row: usize,
    /// Columns on the broken line
    pub hits: usize,
    /// Columns from the first hit through the last hit
    pub width: usize,
    /// Columns from the nearest earlier filled box on the breakout row through the last hit
    pub outer_width: usize,
    /// Bar that filled the breaking box
    pub bar: Option<usize>,
}

/// Pattern from the signs at `(row, z - 1)` and `(row, z)`, bullish orientation
fn classify(before: i8, at: i8) -> BreakoutPattern {
    match (before, at) {
        (0, 1) | (1, 1) => BreakoutPattern::Resistance,
        (-1, -1) => BreakoutPattern::Fulcrum,
        (-1, 1) | (0, -1) | (1, -1) => BreakoutPattern::Reversal,
        _ => BreakoutPattern::Continuation,
    }
}

fn breakouts_at(matrix: &PnfMatrix, row: usize, column: usize, trend: Trend) -> Vec<Breakout> {
    let sign = trend.sign();
    let line_row = match trend {
        Trend::Bullish => row.checked_sub(1),
        Trend::Bearish => Some(row + 1).filter(|&r| r < matrix.rows()),
    };
    let Some(line_row) = line_row else {
        return Vec::new();
    };

    let line: Vec<i8> = (0..=column).map(|c| matrix.get(line_row, c)).collect();
    let start = line
        .iter()
        .rposition(|&v| v == -sign)
        .map(|i| i + 1)
        .unwrap_or(0);
    let hits: Vec<usize> = (start..=column).filter(|&c| line[c] == sign).collect();
    if hits.len() < 2 {
        return Vec::new();
    }

    let (first, last) = (hits[0], hits[hits.len() - 1]);
    let z = (0..column).rev().find(|&c| matrix.get(row, c) != 0);
    let outer_width = last - z.unwrap_or(0) + 1;

    // orient the signs so the table reads the same for both directions
    let oriented = |c: usize| matrix.get(row, c) * sign;
    let pattern = match z {
        Some(z) if z >= 1 => classify(oriented(z - 1), oriented(z)),
        _ if oriented(0) == -1 => BreakoutPattern::Reversal,
        _ => BreakoutPattern::Continuation,
    };

    let base = Breakout {
        trend,
        pattern,
        column,
        row,
        hits: hits.len(),
        width: last - first + 1,
        outer_width,
        bar: matrix.action(row, column),
    };

    let mut found = vec![base];
    // shorter lines nested in the long one
    for p in 1..hits.len() - 1 {
        found.push(Breakout {
            hits: hits.len() - p,
            width: last - hits[p] + 1,
            ..base
        });
    }
    found
}

/// All breakouts of the matrix sorted by (column, row, hits)
pub fn detect_breakouts(matrix: &PnfMatrix) -> Vec<Breakout> {
    let mut breakouts = Vec::new();

    for column in 1..matrix.columns() {
        for row in 0..matrix.rows() {
            let value = matrix.get(row, column);
            if value == 0 || matrix.get(row, column - 1) != 0 {
                continue;
            }
            if let Some(trend) = Trend::from_sign(value) {
                breakouts.extend(breakouts_at(matrix, row, column, trend));
            }
        }
    }

    breakouts.sort_by_key(|b| (b.column, b.row, b.hits));
    debug!("Detected {} breakouts", breakouts.len());
    breakouts
}
