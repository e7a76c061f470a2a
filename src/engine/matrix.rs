//! Matrix Projection
//!
//! Replays state-change records into a dense `[row, column]` grid of signs
//! (+1 = X, -1 = O, 0 = empty). Row `r` is box `r` of the box scale.
//! A parallel action index stores, per filled cell, the bar that filled it.

use serde::{Deserialize, Serialize};

use super::trend::BarState;
use crate::types::Trend;

/// Extremes of one column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub column: usize,
    pub trend: Trend,
    /// Highest filled row
    pub high: usize,
    /// Lowest filled row
    pub low: usize,
    /// Number of filled boxes
    pub height: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PnfMatrix {
    rows: usize,
    columns: usize,
    cells: Vec<i8>,
    actions: Vec<Option<usize>>,
}

impl PnfMatrix {
    /// Empty grid
    pub fn new(rows: usize, columns: usize) -> Self {
        Self {
            rows,
            columns,
            cells: vec![0; rows * columns],
            actions: vec![None; rows * columns],
        }
    }

    /// Build the grid from state-change records
    ///
    /// Between consecutive records the new column is filled over:
    /// - X continuation: previous box through new box
    /// - X to O reversal: new box up to, not including, the previous box
    /// - O continuation: new box through previous box
    /// - O to X reversal: one above the previous box through new box
    ///
    /// A one-step-back reversal stays in its column and covers both boxes.
    pub fn from_states(states: &[BarState], rows: usize) -> Self {
        let columns = states.last().map(|s| s.column + 1).unwrap_or(0);
        let mut matrix = Self::new(rows, columns);

        let Some(first) = states.first() else {
            return matrix;
        };
        matrix.mark(first.box_index, first.column, first.trend, first.bar);

        for pair in states.windows(2) {
            let (prev, cur) = (&pair[0], &pair[1]);
            let (lo, hi) = if prev.column == cur.column && prev.trend != cur.trend {
                (
                    prev.box_index.min(cur.box_index),
                    prev.box_index.max(cur.box_index),
                )
            } else {
                match (prev.trend, cur.trend) {
                    (Trend::Bullish, Trend::Bullish) => (prev.box_index, cur.box_index),
                    (Trend::Bullish, Trend::Bearish) => {
                        if prev.box_index == 0 {
                            continue;
                        }
                        (cur.box_index, prev.box_index - 1)
                    }
                    (Trend::Bearish, Trend::Bearish) => (cur.box_index, prev.box_index),
                    (Trend::Bearish, Trend::Bullish) => (prev.box_index + 1, cur.box_index),
                }
            };

            for row in lo..=hi {
                matrix.mark(row, cur.column, cur.trend, cur.bar);
            }
        }

        matrix
    }

    fn index(&self, row: usize, column: usize) -> usize {
        row * self.columns + column
    }

    fn mark(&mut self, row: usize, column: usize, trend: Trend, bar: usize) {
        if row < self.rows && column < self.columns {
            let i = self.index(row, column);
            self.cells[i] = trend.sign();
            self.actions[i] = Some(bar);
        }
    }

    /// Overwrite one cell; projected cells carry no bar
    pub fn set(&mut self, row: usize, column: usize, value: i8) {
        if row < self.rows && column < self.columns {
            let i = self.index(row, column);
            self.cells[i] = value.signum();
            self.actions[i] = None;
        }
    }

    /// Copy of the grid with one empty column appended
    pub fn widened(&self) -> Self {
        let mut wide = Self::new(self.rows, self.columns + 1);
        for row in 0..self.rows {
            for column in 0..self.columns {
                let (from, to) = (self.index(row, column), wide.index(row, column));
                wide.cells[to] = self.cells[from];
                wide.actions[to] = self.actions[from];
            }
        }
        wide
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Sign at `(row, column)`; 0 outside the grid
    pub fn get(&self, row: usize, column: usize) -> i8 {
        if row < self.rows && column < self.columns {
            self.cells[self.index(row, column)]
        } else {
            0
        }
    }

    /// Bar that last filled `(row, column)`
    pub fn action(&self, row: usize, column: usize) -> Option<usize> {
        if row < self.rows && column < self.columns {
            self.actions[self.index(row, column)]
        } else {
            None
        }
    }

    /// Rows `0..rows` of one column
    pub fn column(&self, column: usize) -> impl Iterator<Item = i8> + '_ {
        (0..self.rows).map(move |row| self.get(row, column))
    }

    /// Columns `0..columns` of one row
    pub fn row(&self, row: usize) -> impl Iterator<Item = i8> + '_ {
        (0..self.columns).map(move |column| self.get(row, column))
    }

    pub fn row_is_empty(&self, row: usize) -> bool {
        self.row(row).all(|v| v == 0)
    }

    pub fn column_trend(&self, column: usize) -> Option<Trend> {
        self.column(column).find(|&v| v != 0).and_then(Trend::from_sign)
    }

    /// Highest filled row of a column
    pub fn column_high(&self, column: usize) -> Option<usize> {
        (0..self.rows).rev().find(|&row| self.get(row, column) != 0)
    }

    /// Lowest filled row of a column
    pub fn column_low(&self, column: usize) -> Option<usize> {
        (0..self.rows).find(|&row| self.get(row, column) != 0)
    }

    pub fn column_height(&self, column: usize) -> usize {
        self.column(column).filter(|&v| v != 0).count()
    }

    pub fn profile(&self, column: usize) -> Option<ColumnProfile> {
        Some(ColumnProfile {
            column,
            trend: self.column_trend(column)?,
            high: self.column_high(column)?,
            low: self.column_low(column)?,
            height: self.column_height(column),
        })
    }

    /// Profiles of every column, left to right
    pub fn profiles(&self) -> Vec<ColumnProfile> {
        (0..self.columns).filter_map(|c| self.profile(c)).collect()
    }

    /// Rows of the lowest and highest filled cell anywhere in the grid
    pub fn filled_rows(&self) -> Option<(usize, usize)> {
        let low = (0..self.rows).find(|&r| !self.row_is_empty(r))?;
        let high = (0..self.rows).rev().find(|&r| !self.row_is_empty(r))?;
        Some((low, high))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(bar: usize, box_index: usize, column: usize, trend: Trend) -> BarState {
        BarState {
            bar,
            box_value: box_index as f64,
            box_index,
            column,
            trend,
            filled: 0,
        }
    }

    fn column_signs(matrix: &PnfMatrix, column: usize) -> Vec<(usize, i8)> {
        matrix
            .column(column)
            .enumerate()
            .filter(|(_, v)| *v != 0)
            .collect()
    }

    #[test]
    fn test_four_fill_cases() {
        let states = vec![
            state(0, 1, 0, Trend::Bullish),
            state(1, 5, 0, Trend::Bullish),
            state(2, 2, 1, Trend::Bearish),
            state(3, 7, 2, Trend::Bullish),
            state(4, 2, 3, Trend::Bearish),
        ];
        let matrix = PnfMatrix::from_states(&states, 10);

        assert_eq!(matrix.columns(), 4);
        assert_eq!(column_signs(&matrix, 0), (1..=5).map(|r| (r, 1)).collect::<Vec<_>>());
        assert_eq!(column_signs(&matrix, 1), (2..=4).map(|r| (r, -1)).collect::<Vec<_>>());
        assert_eq!(column_signs(&matrix, 2), (3..=7).map(|r| (r, 1)).collect::<Vec<_>>());
        assert_eq!(column_signs(&matrix, 3), (2..=6).map(|r| (r, -1)).collect::<Vec<_>>());

        assert_eq!(matrix.action(1, 0), Some(1));
        assert_eq!(matrix.action(3, 2), Some(3));
        assert_eq!(matrix.action(0, 0), None);
    }

    #[test]
    fn test_continuation_overwrites_anchor_action() {
        let states = vec![state(0, 4, 0, Trend::Bearish), state(1, 2, 0, Trend::Bearish)];
        let matrix = PnfMatrix::from_states(&states, 6);

        assert_eq!(matrix.action(2, 0), Some(1));
        assert_eq!(matrix.action(4, 0), Some(1));
        assert_eq!(column_signs(&matrix, 0), vec![(2, -1), (3, -1), (4, -1)]);
    }

    #[test]
    fn test_one_step_back_marks_single_sign() {
        let states = vec![
            state(0, 5, 0, Trend::Bullish),
            state(1, 6, 0, Trend::Bullish),
            state(2, 5, 1, Trend::Bearish),
            state(3, 6, 1, Trend::Bullish),
        ];
        let matrix = PnfMatrix::from_states(&states, 8);

        assert_eq!(matrix.columns(), 2);
        assert_eq!(column_signs(&matrix, 1), vec![(5, 1), (6, 1)]);
        assert_eq!(matrix.column_trend(1), Some(Trend::Bullish));
        assert_eq!(matrix.action(5, 1), Some(3));
    }

    #[test]
    fn test_profiles() {
        let states = vec![
            state(0, 1, 0, Trend::Bullish),
            state(1, 5, 0, Trend::Bullish),
            state(2, 2, 1, Trend::Bearish),
        ];
        let matrix = PnfMatrix::from_states(&states, 10);
        let profiles = matrix.profiles();

        assert_eq!(
            profiles[1],
            ColumnProfile {
                column: 1,
                trend: Trend::Bearish,
                high: 4,
                low: 2,
                height: 3,
            }
        );
        assert_eq!(matrix.filled_rows(), Some((1, 5)));
        assert!(matrix.row_is_empty(9));
        assert_eq!(matrix.get(50, 0), 0);
    }

    #[test]
    fn test_widened_keeps_cells_and_actions() {
        let states = vec![state(0, 1, 0, Trend::Bullish), state(1, 3, 0, Trend::Bullish)];
        let mut matrix = PnfMatrix::from_states(&states, 5).widened();

        assert_eq!(matrix.columns(), 2);
        assert_eq!(matrix.get(2, 0), 1);
        assert_eq!(matrix.action(3, 0), Some(1));
        assert_eq!(matrix.column_trend(1), None);

        matrix.set(2, 1, -5);
        assert_eq!(matrix.get(2, 1), -1);
        assert_eq!(matrix.action(2, 1), None);
        matrix.set(3, 0, 0);
        assert_eq!(matrix.column_high(0), Some(2));
    }
}
