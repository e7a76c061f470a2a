//! Bar-aligned buy/sell levels
//!
//! Multiple top buys and multiple bottom sells projected back onto the
//! input bars: the bar whose state first reached the breakout box carries
//! the breakout price, every other bar is empty.

use super::breakouts::Breakout;
use super::indicators::IndicatorSeries;
use super::scale::BoxScale;
use super::trend::BarState;
use crate::types::Trend;

/// Series label for a top buy with `multiple` hits (DTB, TTB, ...)
pub fn top_buy_label(multiple: usize) -> String {
    match multiple {
        2 => "DTB".to_string(),
        3 => "TTB".to_string(),
        4 => "QTB".to_string(),
        n => format!("MTB({})", n),
    }
}

/// Series label for a bottom sell with `multiple` hits (DBS, TBS, ...)
pub fn bottom_sell_label(multiple: usize) -> String {
    match multiple {
        2 => "DBS".to_string(),
        3 => "TBS".to_string(),
        4 => "QBS".to_string(),
        n => format!("MBS({})", n),
    }
}

/// Bars covered by each state: from its own bar up to the next state's bar
fn spans(states: &[BarState], bars: usize) -> Vec<std::ops::Range<usize>> {
    states
        .iter()
        .enumerate()
        .map(|(k, state)| {
            let next = states.get(k + 1).map(|s| s.bar).unwrap_or(bars);
            state.bar..next.max(state.bar + 1).min(bars)
        })
        .collect()
}

/// Breakouts with exactly `multiple` hits on a line no wider than `2 * multiple - 1`
pub fn multiple_levels(
    states: &[BarState],
    breakouts: &[Breakout],
    scale: &BoxScale,
    bars: usize,
    trend: Trend,
    multiple: usize,
) -> IndicatorSeries {
    let label = match trend {
        Trend::Bullish => top_buy_label(multiple),
        Trend::Bearish => bottom_sell_label(multiple),
    };
    let mut values = vec![None; bars];
    let max_width = (2 * multiple).saturating_sub(1);
    let spans = spans(states, bars);

    let matching = breakouts
        .iter()
        .filter(|b| b.trend == trend && b.hits == multiple && b.width <= max_width);

    for breakout in matching {
        let in_column = || states.iter().enumerate().filter(|(_, s)| s.column == breakout.column);
        let reached = in_column().find(|(_, s)| match trend {
            Trend::Bullish => s.box_index >= breakout.row,
            Trend::Bearish => s.box_index <= breakout.row,
        });
        let Some((_, first)) = reached else {
            continue;
        };
        let price = scale.get(breakout.row);

        for (k, _) in in_column().filter(|(_, s)| s.box_index == first.box_index) {
            for bar in spans[k].clone() {
                values[bar] = price;
            }
        }
    }

    IndicatorSeries { label, values }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChartConfig, Overscan};
    use crate::engine::breakouts::detect_breakouts;
    use crate::engine::matrix::PnfMatrix;
    use crate::engine::scale::ScaleSpec;
    use crate::engine::trend::fold_states;
    use crate::series::{normalize, TimeSeries};
    use crate::types::Method;

    fn levels(close: &[f64], trend: Trend, multiple: usize) -> IndicatorSeries {
        let series = TimeSeries::from_close(close.to_vec());
        let normalized = normalize(&series, &ChartConfig::default()).unwrap();
        let (min, max) = normalized.price_range(Method::Close);
        let scale = BoxScale::build(ScaleSpec::Absolute { box_size: 1.0 }, min, max, Overscan::default()).unwrap();
        let states = fold_states(&normalized, Method::Close, 3, &scale).unwrap();
        let matrix = PnfMatrix::from_states(&states, scale.len());
        let breakouts = detect_breakouts(&matrix);
        multiple_levels(&states, &breakouts, &scale, close.len(), trend, multiple)
    }

    #[test]
    fn test_double_top_buy() {
        let dtb = levels(&[8.0, 1.0, 5.0, 2.0, 7.0, 2.0], Trend::Bullish, 2);

        assert_eq!(dtb.label, "DTB");
        assert_eq!(dtb.values, vec![None, None, None, None, Some(6.0), None]);
    }

    #[test]
    fn test_double_bottom_sells() {
        let dbs = levels(&[10.0, 5.0, 8.0, 4.0, 7.0, 3.0], Trend::Bearish, 2);

        assert_eq!(dbs.label, "DBS");
        assert_eq!(dbs.values, vec![None, None, None, Some(4.0), None, Some(3.0)]);
    }

    #[test]
    fn test_triple_top_uses_nested_line() {
        let close = [1.0, 5.0, 2.0, 5.0, 2.0, 5.0, 2.0, 6.0];
        let ttb = levels(&close, Trend::Bullish, 3);
        let dtb = levels(&close, Trend::Bullish, 2);

        assert_eq!(ttb.label, "TTB");
        assert_eq!(ttb.values[7], Some(6.0));
        assert_eq!(ttb.values.iter().flatten().count(), 1);
        assert_eq!(dtb.values[7], Some(6.0));
        assert_eq!(levels(&close, Trend::Bullish, 4).values[7], Some(6.0));
        assert!(levels(&close, Trend::Bullish, 5).values.iter().all(Option::is_none));
    }

    #[test]
    fn test_no_sells_on_rising_chart() {
        let tbs = levels(&[8.0, 1.0, 5.0, 2.0, 7.0, 2.0], Trend::Bearish, 3);
        assert_eq!(tbs.label, "TBS");
        assert!(tbs.values.iter().all(Option::is_none));
    }

    #[test]
    fn test_labels() {
        assert_eq!(top_buy_label(4), "QTB");
        assert_eq!(bottom_sell_label(5), "MBS(5)");
    }
}
