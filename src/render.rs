//! Console rendering of a chart
//!
//! Price rows high to low with the box price on both sides, followed by
//! listings of external trendlines, breakouts and signals that fall in the
//! displayed columns.

use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::chart::PointFigureChart;
use crate::config::{SignalParams, TrendlineParams};
use crate::engine::{Bounded, PnfMatrix, Trendline};
use crate::error::Result;

/// What to print
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderOptions {
    /// Rightmost columns shown, 0 for all (default: 30)
    pub columns: usize,
    pub trendlines: bool,
    pub breakouts: bool,
    pub signals: bool,
    pub trendline_params: TrendlineParams,
    pub signal_params: SignalParams,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            columns: 30,
            trendlines: true,
            breakouts: true,
            signals: true,
            trendline_params: TrendlineParams::default(),
            signal_params: SignalParams::default(),
        }
    }
}

const GLYPH_BULL: char = 'X';
const GLYPH_BEAR: char = 'O';
const GLYPH_EMPTY: char = '.';
const GLYPH_LINE: char = '*';

/// Empty cells crossed by external trendlines, as (row, column)
fn line_cells(matrix: &PnfMatrix, lines: &[Trendline]) -> Vec<(usize, usize)> {
    let mut cells = Vec::new();
    for line in lines.iter().filter(|l| l.bounded == Bounded::External) {
        for column in line.column..(line.column + line.length).min(matrix.columns()) {
            let Some(row) = line.row_at(column).and_then(|r| usize::try_from(r).ok()) else {
                continue;
            };
            if row < matrix.rows() && matrix.get(row, column) == 0 {
                cells.push((row, column));
            }
        }
    }
    cells
}

fn glyph(value: i8) -> char {
    match value {
        1 => GLYPH_BULL,
        -1 => GLYPH_BEAR,
        _ => GLYPH_EMPTY,
    }
}

/// Render the chart as text
pub fn render(chart: &PointFigureChart, options: RenderOptions) -> Result<String> {
    let matrix = chart.matrix();
    let scale = chart.scale();
    let total = matrix.columns();
    let shown = if options.columns == 0 || options.columns >= total {
        total
    } else {
        options.columns
    };
    let first = total - shown;

    let lines = if options.trendlines {
        Some(chart.trendlines(options.trendline_params)?)
    } else {
        None
    };
    let marked = lines
        .as_deref()
        .map(|l| line_cells(matrix, l))
        .unwrap_or_default();

    let rows: Vec<usize> = (0..matrix.rows())
        .rev()
        .filter(|&r| (first..total).any(|c| matrix.get(r, c) != 0))
        .collect();
    let labels: Vec<String> = rows
        .iter()
        .map(|&r| scale.get(r).map(|p| p.to_string()).unwrap_or_default())
        .collect();
    let width = labels.iter().map(String::len).max().unwrap_or(0);

    let mut out = String::new();
    writeln!(out, "{}", chart.title())?;
    for (&row, label) in rows.iter().zip(&labels) {
        let cells: Vec<String> = (first..total)
            .map(|c| {
                if marked.contains(&(row, c)) {
                    GLYPH_LINE.to_string()
                } else {
                    glyph(matrix.get(row, c)).to_string()
                }
            })
            .collect();
        writeln!(out, "{:>width$}  {}  {}", label, cells.join(" "), label, width = width)?;
    }

    if let Some(lines) = lines.as_deref() {
        let external: Vec<&Trendline> = lines.iter().filter(|l| l.bounded == Bounded::External).collect();
        if let Some(last) = external.last() {
            writeln!(out, "\nExternal Trendlines ({} found):", external.len())?;
            for (i, line) in external.iter().enumerate() {
                writeln!(
                    out,
                    "  {}. {:22} | length: {:3} | col: {:3} | price: {}",
                    i + 1,
                    line.kind.to_string(),
                    line.length,
                    line.column,
                    scale.at(line.row)
                )?;
            }
            writeln!(out, "\nLast trendline: {} line of length {}", last.kind, last.length)?;
        }
    }

    if options.breakouts {
        let breakouts = chart.breakouts()?;
        let recent: Vec<_> = breakouts.iter().filter(|b| b.column >= first).collect();
        if !recent.is_empty() {
            writeln!(out, "\nBreakouts in displayed range ({} found):", recent.len())?;
            for (i, b) in recent.iter().enumerate() {
                writeln!(
                    out,
                    "  {}. {:8} {:12} | col: {:3} | price: {} | hits: {:2}",
                    i + 1,
                    b.trend.to_string(),
                    b.pattern.to_string(),
                    b.column,
                    scale.at(b.row as i64),
                    b.hits
                )?;
            }
        }
    }

    if options.signals {
        let signals = chart.signals(options.signal_params)?;
        let recent: Vec<_> = signals.iter().filter(|s| s.column >= first).collect();
        if !recent.is_empty() {
            writeln!(out, "\nSignals in displayed range ({} found):", recent.len())?;
            for (i, s) in recent.iter().enumerate() {
                writeln!(
                    out,
                    "  {}. {:32} | col: {:3} | price: {} | width: {:2}",
                    i + 1,
                    s.kind.label(),
                    s.column,
                    scale.at(s.row as i64),
                    s.width
                )?;
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChartConfig;
    use crate::series::TimeSeries;

    fn chart(close: &[f64]) -> PointFigureChart {
        PointFigureChart::new(&TimeSeries::from_close(close.to_vec()), ChartConfig::default()).unwrap()
    }

    #[test]
    fn test_grid_rows_high_to_low() {
        let chart = chart(&[1.0, 5.0, 2.0, 7.0, 2.0]);
        let text = render(&chart, RenderOptions::default()).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "Point & Figure (abs|cl) 1 x 3");
        assert_eq!(
            &lines[1..8],
            &[
                "7  . . X .  7",
                "6  . . X O  6",
                "5  X . X O  5",
                "4  X O X O  4",
                "3  X O X O  3",
                "2  X O . O  2",
                "1  X . . .  1",
            ]
        );
        assert!(text.contains("Breakouts in displayed range (1 found):"));
    }

    #[test]
    fn test_window_keeps_rightmost_columns() {
        let chart = chart(&[1.0, 5.0, 2.0, 7.0, 2.0]);
        let options = RenderOptions {
            columns: 2,
            trendlines: false,
            breakouts: false,
            signals: false,
            ..Default::default()
        };
        let text = render(&chart, options).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 7);
        assert_eq!(lines[1], "7  X .  7");
        assert_eq!(lines[6], "2  . O  2");
    }

    #[test]
    fn test_external_trendline_path_is_marked() {
        let chart = chart(&[30.0, 20.0, 25.0, 17.0, 22.0, 14.0, 19.0, 11.0, 26.0]);
        let text = render(&chart, RenderOptions::default()).unwrap();

        assert!(text.contains(&GLYPH_LINE.to_string()));
        assert!(text.contains("External Trendlines (1 found):"));
        assert!(text.contains("Last trendline: bearish resistance line of length 6"));
    }

    #[test]
    fn test_write_failures_surface_as_render_errors() {
        let err: crate::error::PnfError = std::fmt::Error.into();
        assert!(matches!(err, crate::error::PnfError::Render(_)));
        assert!(err.to_string().starts_with("Failed to render chart"));
    }
}
