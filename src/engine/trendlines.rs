//! Trendline Projection
//!
//! 45° support and resistance lines:
//! - a bearish resistance line starts one box above every X column and falls
//!   one box per column
//! - a bullish support line starts one box below every O column and rises
//!   one box per column
//!
//! Strong lines end at the first filled box they touch. Weak lines ignore
//! touches and only end at a breakout in the opposite direction. The chart is
//! padded with empty rows on both sides, `length - 1` empty columns and a final
//! column of filled boxes, so every walk terminates.
//!
//! A forward scan then follows the active (external) line and hands over to an
//! opposite line whenever one outlives it; all other lines are internal.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::breakouts::Breakout;
use super::matrix::PnfMatrix;
use crate::config::{TrendlineMode, TrendlineParams};
use crate::error::{PnfError, Result};
use crate::types::Trend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bounded {
    Internal,
    External,
}

impl std::fmt::Display for Bounded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bounded::Internal => write!(f, "internal"),
            Bounded::External => write!(f, "external"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrendlineKind {
    BullishSupport,
    BearishResistance,
}

impl TrendlineKind {
    pub fn trend(self) -> Trend {
        match self {
            TrendlineKind::BullishSupport => Trend::Bullish,
            TrendlineKind::BearishResistance => Trend::Bearish,
        }
    }
}

impl std::fmt::Display for TrendlineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrendlineKind::BullishSupport => write!(f, "bullish support"),
            TrendlineKind::BearishResistance => write!(f, "bearish resistance"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trendline {
    pub bounded: Bounded,
    pub kind: TrendlineKind,
    /// Columns covered by the line
    pub length: usize,
    /// Column the line starts in
    pub column: usize,
    /// Row of the first box of the line; may lie one box beyond the scale
    pub row: i64,
}

impl Trendline {
    /// Row of the line in `column`, if the line reaches it
    pub fn row_at(&self, column: usize) -> Option<i64> {
        let step = column.checked_sub(self.column)?;
        if step >= self.length {
            return None;
        }
        Some(match self.kind {
            TrendlineKind::BullishSupport => self.row + step as i64,
            TrendlineKind::BearishResistance => self.row - step as i64,
        })
    }
}

/// Signed line length stored at its start: negative for resistance, positive for support
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RawLine {
    row: i64,
    value: i64,
}

impl RawLine {
    fn steps(&self) -> usize {
        self.value.unsigned_abs() as usize
    }

    fn sign(&self) -> i8 {
        if self.value > 0 {
            1
        } else {
            -1
        }
    }
}

/// Chart with empty margins and a terminating column of filled boxes
struct PaddedGrid<'m> {
    matrix: &'m PnfMatrix,
    pad: i64,
    columns: usize,
    seed: Option<(i64, i8)>,
}

impl<'m> PaddedGrid<'m> {
    fn new(matrix: &'m PnfMatrix, length: usize) -> Self {
        let pad = (matrix.columns() + length + 1) as i64;

        // a lone box in the first column gets a neighbour so lines cannot slip past it
        let seed = if matrix.column_height(0) == 1 {
            match (matrix.column_trend(0), matrix.column_low(0)) {
                (Some(Trend::Bullish), Some(row)) => Some((row as i64 - 1 + pad, 1)),
                (Some(Trend::Bearish), Some(row)) => Some((row as i64 + 1 + pad, -1)),
                _ => None,
            }
        } else {
            None
        };

        Self {
            matrix,
            pad,
            columns: matrix.columns() + length,
            seed,
        }
    }

    fn get(&self, row: i64, column: usize) -> i8 {
        if column + 1 >= self.columns {
            return 1;
        }
        if column == 0 {
            if let Some((seed_row, sign)) = self.seed {
                if row == seed_row {
                    return sign;
                }
            }
        }
        let real = row - self.pad;
        if real < 0 {
            return 0;
        }
        self.matrix.get(real as usize, column)
    }

    /// Whether the line starting at `(row, column)` hits a filled box within `span` columns
    fn touches(&self, line: RawLine, column: usize, span: usize) -> bool {
        (0..span).any(|j| {
            let row = match line.sign() {
                1 => line.row + j as i64,
                _ => line.row - j as i64,
            };
            self.get(row, column + j) != 0
        })
    }
}

/// Breakout signs per column in padded rows
fn breakpoints(breakouts: &[Breakout], pad: i64, columns: usize) -> Vec<Vec<(i64, i8)>> {
    let mut points: Vec<Vec<(i64, i8)>> = vec![Vec::new(); columns];
    for b in breakouts {
        if let Some(column) = points.get_mut(b.column) {
            let cell = (b.row as i64 + pad, b.trend.sign());
            if !column.contains(&cell) {
                column.push(cell);
            }
        }
    }
    points
}

fn project_lines(
    grid: &PaddedGrid<'_>,
    breakouts: &[Breakout],
    mode: TrendlineMode,
    length: usize,
) -> Vec<Option<RawLine>> {
    let matrix = grid.matrix;
    let last = grid.columns - 1;
    let points = match mode {
        TrendlineMode::Weak => breakpoints(breakouts, grid.pad, grid.columns),
        TrendlineMode::Strong => Vec::new(),
    };
    let signed_sum = |column: usize, keep: &dyn Fn(i64) -> bool| -> i64 {
        points
            .get(column)
            .map(|cells| {
                cells
                    .iter()
                    .filter(|(row, _)| keep(*row))
                    .map(|(_, sign)| *sign as i64)
                    .sum()
            })
            .unwrap_or(0)
    };

    let mut lines = vec![None; grid.columns];
    for (n, slot) in lines.iter_mut().enumerate().take(matrix.columns()) {
        let Some(profile) = matrix.profile(n) else {
            continue;
        };

        let (start, sign) = match profile.trend {
            Trend::Bullish => (profile.high as i64 + 1 + grid.pad, -1i64),
            Trend::Bearish => (profile.low as i64 - 1 + grid.pad, 1i64),
        };

        let mut row = start;
        let mut column = n;
        loop {
            let stop = match mode {
                TrendlineMode::Strong => grid.get(row, column) != 0,
                TrendlineMode::Weak => {
                    column >= last
                        || if sign < 0 {
                            signed_sum(column, &|r| r >= row) > 0
                        } else {
                            signed_sum(column, &|r| r < row) < 0
                        }
                }
            };
            if stop {
                break;
            }
            column += 1;
            row += sign;
        }

        let steps = (column - n) as i64;
        if steps as usize >= length {
            *slot = Some(RawLine {
                row: start,
                value: sign * steps,
            });
        }
    }
    lines
}

/// Follow the external line through the chart
///
/// Returns the external flag per padded column. Lines enclosed by the
/// active line are cleared from `lines`.
fn scan_external(lines: &mut [Option<RawLine>], grid: &PaddedGrid<'_>, length: usize) -> Result<Vec<bool>> {
    let total = lines.len();
    let mut external = vec![false; total];

    let Some(mut column) = lines.iter().position(Option::is_some) else {
        return Ok(external);
    };
    let mut active = match lines[column] {
        Some(line) => line,
        None => return Ok(external),
    };
    external[column] = true;

    let cap = 4 * total + 4;
    let mut iterations = 0;
    let end = total.saturating_sub(length + 1);

    while column + active.steps() <= end {
        iterations += 1;
        if iterations > cap {
            return Err(PnfError::TrendlineScan { iterations: cap });
        }

        let span = active.steps();
        let width = span.min(total - column);

        // opposite lines in the window that run clear of filled boxes
        let opposing: Vec<(usize, RawLine)> = (0..width)
            .filter_map(|pos| lines[column + pos].map(|line| (pos, line)))
            .filter(|(_, line)| line.sign() != active.sign())
            .filter(|(pos, line)| !grid.touches(*line, column + pos, width - pos))
            .collect();

        if opposing.is_empty() {
            let next = (column + width..total).find(|&c| lines[c].is_some());
            let Some(next) = next.and_then(|c| lines[c].map(|line| (c, line))) else {
                break;
            };
            (column, active) = next;
            external[column] = true;
            continue;
        }

        let mut outliving: Option<(usize, usize)> = None;
        for (pos, line) in &opposing {
            let reach = pos + 1 + line.steps();
            if reach > width && outliving.map_or(true, |(_, best)| reach > best) {
                outliving = Some((*pos, reach));
            }
        }

        match outliving {
            Some((pos, _)) => {
                column += pos;
                if let Some(line) = lines[column] {
                    active = line;
                }
                external[column] = true;
            }
            None => {
                for slot in lines.iter_mut().take((column + span - 1).min(total)).skip(column + 1) {
                    *slot = None;
                }
            }
        }
    }

    debug!("External trendline scan settled after {} iterations", iterations);
    Ok(external)
}

/// Trendlines of the matrix sorted by (column, row)
///
/// Weak mode stops lines at the given breakouts; strong mode ignores them.
pub fn detect_trendlines(matrix: &PnfMatrix, breakouts: &[Breakout], params: TrendlineParams) -> Result<Vec<Trendline>> {
    let minimum = params.mode.minimum_length();
    let length = if params.length < minimum {
        warn!(
            "Trendline length {} is below the {} minimum, using {}",
            params.length, params.mode, minimum
        );
        minimum
    } else {
        params.length
    };

    if matrix.columns() == 0 {
        return Ok(Vec::new());
    }

    let grid = PaddedGrid::new(matrix, length);
    let mut lines = project_lines(&grid, breakouts, params.mode, length);
    let external = scan_external(&mut lines, &grid, length)?;

    let mut trendlines: Vec<Trendline> = lines
        .iter()
        .enumerate()
        .filter_map(|(column, line)| line.map(|line| (column, line)))
        .filter_map(|(column, line)| {
            let steps = line.steps();
            let reported = if steps + column >= matrix.columns() {
                (steps + 1).saturating_sub(length)
            } else {
                steps
            };
            if reported < minimum {
                return None;
            }
            Some(Trendline {
                bounded: if external[column] {
                    Bounded::External
                } else {
                    Bounded::Internal
                },
                kind: if line.value > 0 {
                    TrendlineKind::BullishSupport
                } else {
                    TrendlineKind::BearishResistance
                },
                length: reported,
                column,
                row: line.row - grid.pad,
            })
        })
        .collect();

    trendlines.sort_by_key(|t| (t.column, t.row));
    debug!("Detected {} trendlines ({} mode)", trendlines.len(), params.mode);
    Ok(trendlines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::breakouts::detect_breakouts;
    use crate::engine::testing::close_matrix;

    const DOWNTREND: [f64; 9] = [30.0, 20.0, 25.0, 17.0, 22.0, 14.0, 19.0, 11.0, 26.0];

    #[test]
    fn test_strong_resistance_lines() {
        let matrix = close_matrix(&DOWNTREND, 3);
        let lines = detect_trendlines(&matrix, &[], TrendlineParams::default()).unwrap();

        assert_eq!(
            lines,
            vec![
                Trendline {
                    bounded: Bounded::External,
                    kind: TrendlineKind::BearishResistance,
                    length: 6,
                    column: 1,
                    row: 26,
                },
                Trendline {
                    bounded: Bounded::Internal,
                    kind: TrendlineKind::BearishResistance,
                    length: 4,
                    column: 3,
                    row: 23,
                },
            ]
        );
    }

    #[test]
    fn test_row_at_follows_slope() {
        let line = Trendline {
            bounded: Bounded::External,
            kind: TrendlineKind::BearishResistance,
            length: 3,
            column: 2,
            row: 10,
        };
        assert_eq!(line.row_at(2), Some(10));
        assert_eq!(line.row_at(4), Some(8));
        assert_eq!(line.row_at(5), None);
        assert_eq!(line.row_at(1), None);
    }

    #[test]
    fn test_short_length_is_raised_to_minimum() {
        let matrix = close_matrix(&DOWNTREND, 3);
        let params = TrendlineParams {
            length: 1,
            mode: TrendlineMode::Strong,
        };
        let lines = detect_trendlines(&matrix, &[], params).unwrap();
        assert!(lines.iter().all(|l| l.length >= 3));
        assert!(!lines.is_empty());
    }

    #[test]
    fn test_weak_lines_respect_minimum() {
        let matrix = close_matrix(&DOWNTREND, 3);
        let breakouts = detect_breakouts(&matrix);
        let params = TrendlineParams {
            length: 4,
            mode: TrendlineMode::Weak,
        };
        let lines = detect_trendlines(&matrix, &breakouts, params).unwrap();

        assert!(lines.iter().all(|l| l.length >= 4));
        assert!(lines
            .windows(2)
            .all(|w| (w[0].column, w[0].row) <= (w[1].column, w[1].row)));
        // the first X column's line ends at the bullish breakouts in the last column
        assert_eq!(lines[0].column, 1);
        assert_eq!(lines[0].length, 6);
    }

    #[test]
    fn test_lines_beyond_the_chart_are_trimmed() {
        // every line runs into the right edge and is shortened below the minimum
        let matrix = close_matrix(&[1.0, 5.0, 2.0, 7.0, 2.0], 3);
        let lines = detect_trendlines(&matrix, &[], TrendlineParams::default()).unwrap();
        assert!(lines.is_empty());
    }
}
