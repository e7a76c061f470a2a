//! Point & Figure chart
//!
//! Scale, states and matrix are built eagerly at construction. Breakouts,
//! trendlines, signals, counts, indicators and buy/sell levels are computed
//! on first access and memoised in an [`AnalysisCache`], which may be shared between charts.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cache::{fingerprint, AnalysisCache, Cacheable};
use crate::config::{ChartConfig, CountParams, Overscan, SignalParams, TrendlineParams};
use crate::engine::{indicators, levels, scoring};
use crate::engine::{
    detect_breakouts, detect_counts, detect_signals, detect_trendlines, fold_states, BarState, BoxScale,
    Breakout, ColumnProfile, Count, IndicatorSeries, PnfMatrix, RatedSignal, ScaleSpec, ScoreOutlook, Signal,
    Trendline,
};
use crate::error::Result;
use crate::series::{normalize, NormalizedSeries, TimeSeries};
use crate::types::Trend;

/// Price levels that would complete the next double top / double bottom
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NextSignal {
    pub buy: Option<f64>,
    pub sell: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct PointFigureChart {
    config: ChartConfig,
    series: NormalizedSeries,
    spec: ScaleSpec,
    scale: BoxScale,
    states: Vec<BarState>,
    matrix: PnfMatrix,
    fingerprint: Option<String>,
    cache: Arc<AnalysisCache>,
}

impl PointFigureChart {
    /// Build a chart with its own analysis cache
    pub fn new(series: &TimeSeries, config: ChartConfig) -> Result<Self> {
        Self::with_cache(series, config, AnalysisCache::shared())
    }

    /// Build a chart memoising its analyses in `cache`
    pub fn with_cache(series: &TimeSeries, config: ChartConfig, cache: Arc<AnalysisCache>) -> Result<Self> {
        let series = normalize(series, &config)?;
        let spec = ScaleSpec::resolve(&config, &series)?;
        let (min, max) = series.price_range(config.method);
        let scale = BoxScale::build(spec, min, max, Overscan::default())?;
        let states = fold_states(&series, config.method, config.reversal, &scale)?;
        let matrix = PnfMatrix::from_states(&states, scale.len());
        let fingerprint = fingerprint(&(&config, scale.values(), &matrix));

        info!(
            "Built {}: {} bars, {} boxes, {} columns",
            config.title(),
            series.len(),
            scale.len(),
            matrix.columns()
        );

        Ok(Self {
            config,
            series,
            spec,
            scale,
            states,
            matrix,
            fingerprint,
            cache,
        })
    }

    pub fn config(&self) -> &ChartConfig {
        &self.config
    }

    pub fn series(&self) -> &NormalizedSeries {
        &self.series
    }

    /// Scale parameters after ATR resolution
    pub fn scale_spec(&self) -> ScaleSpec {
        self.spec
    }

    pub fn scale(&self) -> &BoxScale {
        &self.scale
    }

    pub fn states(&self) -> &[BarState] {
        &self.states
    }

    pub fn matrix(&self) -> &PnfMatrix {
        &self.matrix
    }

    pub fn title(&self) -> String {
        self.config.title()
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    pub fn profiles(&self) -> Vec<ColumnProfile> {
        self.matrix.profiles()
    }

    fn cached<T, F>(&self, analysis: &str, compute: F) -> Result<Arc<T>>
    where
        T: Cacheable,
        F: FnOnce() -> Result<T>,
    {
        match &self.fingerprint {
            Some(fp) => self.cache.get_or_compute(fp, analysis, compute),
            None => compute().map(Arc::new),
        }
    }

    pub fn breakouts(&self) -> Result<Arc<Vec<Breakout>>> {
        self.cached("breakouts", || Ok(detect_breakouts(&self.matrix)))
    }

    pub fn trendlines(&self, params: TrendlineParams) -> Result<Arc<Vec<Trendline>>> {
        let analysis = format!("trendlines({},{})", params.length, params.mode);
        self.cached(&analysis, || {
            let breakouts = self.breakouts()?;
            let lines = detect_trendlines(&self.matrix, &breakouts, params)?;
            info!("{} trendlines", lines.len());
            Ok(lines)
        })
    }

    pub fn signals(&self, params: SignalParams) -> Result<Arc<Vec<Signal>>> {
        let analysis = format!("signals(strict={})", params.strict);
        self.cached(&analysis, || {
            let breakouts = self.breakouts()?;
            let signals = detect_signals(&self.matrix, &breakouts, self.config.reversal, params);
            info!("{} signals", signals.len());
            Ok(signals)
        })
    }

    pub fn counts(&self, params: CountParams) -> Result<Arc<Vec<Count>>> {
        let analysis = format!("counts({})", params.min_length);
        self.cached(&analysis, || {
            let breakouts = self.breakouts()?;
            let range = self.series.price_range(self.config.method);
            let counts = detect_counts(
                &self.matrix,
                &breakouts,
                &self.scale,
                range,
                self.config.reversal,
                params,
            )?;
            info!("{} counts", counts.len());
            Ok(counts)
        })
    }

    fn indicator<F>(&self, label: &str, compute: F) -> Result<Arc<Vec<IndicatorSeries>>>
    where
        F: FnOnce(&[f64]) -> Vec<IndicatorSeries>,
    {
        self.cached(label, || {
            let midpoints = indicators::column_midpoints(&self.matrix, &self.scale);
            Ok(compute(&midpoints))
        })
    }

    fn single(series: Arc<Vec<IndicatorSeries>>) -> IndicatorSeries {
        series.first().cloned().unwrap_or_else(|| IndicatorSeries {
            label: String::new(),
            values: Vec::new(),
        })
    }

    fn pair(series: Arc<Vec<IndicatorSeries>>) -> (IndicatorSeries, IndicatorSeries) {
        let mut iter = series.iter().cloned();
        let upper = iter.next();
        let lower = iter.next();
        let empty = || IndicatorSeries {
            label: String::new(),
            values: Vec::new(),
        };
        (upper.unwrap_or_else(empty), lower.unwrap_or_else(empty))
    }

    pub fn midpoints(&self) -> Result<IndicatorSeries> {
        self.indicator("Midpoints", |mp| vec![indicators::midpoints(mp)])
            .map(Self::single)
    }

    pub fn sma(&self, period: usize) -> Result<IndicatorSeries> {
        self.indicator(&format!("SMA({})", period), |mp| vec![indicators::sma(mp, period)])
            .map(Self::single)
    }

    pub fn ema(&self, period: usize) -> Result<IndicatorSeries> {
        self.indicator(&format!("EMA({})", period), |mp| vec![indicators::ema(mp, period)])
            .map(Self::single)
    }

    /// Upper and lower band
    pub fn bollinger(&self, period: usize, factor: f64) -> Result<(IndicatorSeries, IndicatorSeries)> {
        self.indicator(&format!("Bollinger({},{})", period, factor), |mp| {
            let (upper, lower) = indicators::bollinger(mp, period, factor);
            vec![upper, lower]
        })
        .map(Self::pair)
    }

    /// Upper and lower channel
    pub fn donchian(&self, period: usize, ignore: usize) -> Result<(IndicatorSeries, IndicatorSeries)> {
        self.indicator(&format!("Donchian({},{})", period, ignore), |_| {
            let (upper, lower) = indicators::donchian(&self.matrix, &self.scale, period, ignore);
            vec![upper, lower]
        })
        .map(Self::pair)
    }

    pub fn psar(&self, step: f64, leap: f64) -> Result<IndicatorSeries> {
        self.indicator(&format!("pSAR({},{})", step, leap), |_| {
            vec![indicators::psar(&self.matrix, &self.scale, step, leap)]
        })
        .map(Self::single)
    }

    /// Bar-aligned buys and sells for breakouts with exactly `multiple` hits
    ///
    /// `multiple` 2 gives DTB/DBS, 3 gives TTB/TBS.
    pub fn buy_sell_levels(&self, multiple: usize) -> Result<(IndicatorSeries, IndicatorSeries)> {
        let analysis = format!("levels({})", multiple);
        self.cached(&analysis, || {
            let breakouts = self.breakouts()?;
            let bars = self.series.len();
            let series = [Trend::Bullish, Trend::Bearish]
                .map(|trend| levels::multiple_levels(&self.states, &breakouts, &self.scale, bars, trend, multiple));
            Ok(series.to_vec())
        })
        .map(Self::pair)
    }

    pub fn rated_signals(&self) -> Result<Arc<Vec<RatedSignal>>> {
        self.cached("rated-signals", || Ok(scoring::rated_signals(&self.matrix)))
    }

    pub fn next_reversal_signal(&self) -> Option<RatedSignal> {
        scoring::next_reversal_signal(&self.matrix)
    }

    pub fn next_continuation_signal(&self) -> Option<RatedSignal> {
        scoring::next_continuation_signal(&self.matrix)
    }

    /// -3..=3, see [`scoring::signal_score`]
    pub fn signal_score(&self) -> i8 {
        scoring::signal_score(&self.matrix)
    }

    /// Current score and the prices that would change it
    pub fn score_changes(&self) -> ScoreOutlook {
        let outlook = scoring::score_changes(&self.matrix, &self.scale, self.config.reversal);
        info!("Signal score {} with {} change levels", outlook.score, outlook.changes.len());
        outlook
    }

    /// Levels one box beyond the previous same-direction column and
    /// beyond the preceding opposite column
    pub fn next_simple_signal(&self) -> NextSignal {
        let columns = self.matrix.columns();
        if columns < 3 {
            return NextSignal::default();
        }
        let last = columns - 1;
        let (Some(current), Some(previous), Some(before)) = (
            self.matrix.profile(last),
            self.matrix.profile(last - 1),
            self.matrix.profile(last - 2),
        ) else {
            return NextSignal::default();
        };

        let price = |row: i64| usize::try_from(row).ok().and_then(|r| self.scale.get(r));

        match current.trend {
            Trend::Bullish => {
                let breakout = before.high as i64 + 1;
                NextSignal {
                    buy: (breakout > current.high as i64).then(|| price(breakout)).flatten(),
                    sell: price(previous.low as i64 - 1),
                }
            }
            Trend::Bearish => {
                let breakdown = before.low as i64 - 1;
                NextSignal {
                    buy: price(previous.high as i64 + 1),
                    sell: (breakdown < current.low as i64).then(|| price(breakdown)).flatten(),
                }
            }
        }
    }

    /// Date of the first state of every column, formatted for the series' time step
    pub fn column_labels(&self) -> Vec<Option<String>> {
        let format = self.series.time_step.map(|step| step.label_format());
        let mut labels = vec![None; self.matrix.columns()];

        for state in &self.states {
            if let Some(label) = labels.get_mut(state.column) {
                if label.is_none() {
                    *label = format
                        .zip(self.series.date_at(state.bar))
                        .map(|(fmt, date)| date.format(fmt).to_string());
                }
            }
        }
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BoxSize, TrendlineMode};
    use crate::engine::{BreakoutPattern, SignalKind};
    use crate::error::PnfError;
    use crate::types::{Method, Scaling};
    use chrono::{NaiveDate, NaiveDateTime};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn close_chart(close: &[f64], reversal: u32) -> PointFigureChart {
        let config = ChartConfig {
            reversal,
            ..Default::default()
        };
        PointFigureChart::new(&TimeSeries::from_close(close.to_vec()), config).unwrap()
    }

    fn random_walk(seed: u64, len: usize) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut price = 100.0;
        (0..len)
            .map(|_| {
                price = f64::max(price + rng.gen_range(-3.0..3.0), 5.0);
                price
            })
            .collect()
    }

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_columns_of_small_series() {
        let chart = close_chart(&[1.0, 5.0, 2.0, 7.0, 2.0], 3);
        assert_eq!(chart.matrix().columns(), 4);
        assert_eq!(chart.title(), "Point & Figure (abs|cl) 1 x 3");
    }

    #[test]
    fn test_no_trend_with_oversized_box() {
        let config = ChartConfig {
            box_size: BoxSize::Value(10.0),
            ..Default::default()
        };
        let series = TimeSeries::from_close(vec![5.0, 5.2, 5.4, 5.1]);
        assert_eq!(PointFigureChart::new(&series, config).err(), Some(PnfError::NoTrend));
    }

    #[test]
    fn test_double_top_signal_and_count() {
        let chart = close_chart(&[5.0, 1.0, 6.0, 3.0, 7.0], 3);

        let breakouts = chart.breakouts().unwrap();
        assert_eq!(breakouts.len(), 1);
        assert_eq!(breakouts[0].pattern, BreakoutPattern::Continuation);

        let signals = chart.signals(SignalParams::default()).unwrap();
        let double = signals.iter().find(|s| s.column == 3).unwrap();
        assert_eq!(double.kind, SignalKind::DoubleTopBreakout);
        assert_eq!(double.row, 7);

        let counts = chart.counts(CountParams::default()).unwrap();
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0].target, 16.0);
    }

    #[test]
    fn test_analyses_are_memoised() {
        let chart = close_chart(&[5.0, 1.0, 6.0, 3.0, 7.0], 3);
        let first = chart.breakouts().unwrap();
        let second = chart.breakouts().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_identical_charts_share_cache_entries() {
        let cache = AnalysisCache::shared();
        let series = TimeSeries::from_close(vec![5.0, 1.0, 6.0, 3.0, 7.0]);
        let a = PointFigureChart::with_cache(&series, ChartConfig::default(), Arc::clone(&cache)).unwrap();
        let b = PointFigureChart::with_cache(&series, ChartConfig::default(), Arc::clone(&cache)).unwrap();

        assert_eq!(a.fingerprint(), b.fingerprint());
        let _ = a.signals(SignalParams::default()).unwrap();
        let _ = b.signals(SignalParams::default()).unwrap();
        // breakouts and signals, each computed once
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().1, 2);
    }

    #[test]
    fn test_next_simple_signal() {
        // last column O from 6 to 2, previous X tops at 7, O before bottoms at 2
        let chart = close_chart(&[1.0, 5.0, 2.0, 7.0, 2.0], 3);
        assert_eq!(
            chart.next_simple_signal(),
            NextSignal {
                buy: Some(8.0),
                sell: Some(1.0),
            }
        );

        let short = close_chart(&[1.0, 5.0, 2.0], 3);
        assert_eq!(short.next_simple_signal(), NextSignal::default());
    }

    #[test]
    fn test_buy_sell_levels_align_with_bars() {
        let chart = close_chart(&[8.0, 1.0, 5.0, 2.0, 7.0, 2.0], 3);
        let (buys, sells) = chart.buy_sell_levels(2).unwrap();

        assert_eq!(buys.label, "DTB");
        assert_eq!(buys.values, vec![None, None, None, None, Some(6.0), None]);
        assert_eq!(sells.label, "DBS");
        assert_eq!(sells.len(), 6);
        assert!(sells.values.iter().all(Option::is_none));

        let (triple_buys, triple_sells) = chart.buy_sell_levels(3).unwrap();
        assert_eq!((triple_buys.label.as_str(), triple_sells.label.as_str()), ("TTB", "TBS"));
        assert!(triple_buys.values.iter().all(Option::is_none));
    }

    #[test]
    fn test_score_one_column_after_double_top() {
        let chart = close_chart(&[1.0, 5.0, 2.0, 7.0, 2.0], 3);

        let rated = chart.rated_signals().unwrap();
        assert_eq!(rated.len(), 1);
        assert_eq!(rated[0].label, "B-con(2)s(0)s");
        assert_eq!(chart.signal_score(), 2);

        let reversal = chart.next_reversal_signal().unwrap();
        assert_eq!((reversal.column, reversal.row, reversal.label.as_str()), (4, 8, "B-con(2)s(0)"));
        let continuation = chart.next_continuation_signal().unwrap();
        assert_eq!((continuation.column, continuation.row), (3, 1));

        let outlook = chart.score_changes();
        let levels: Vec<(i8, f64)> = outlook.changes.iter().map(|c| (c.to, c.price)).collect();
        assert_eq!(levels, vec![(3, 8.0), (1, 5.0), (-3, 1.0)]);
    }

    #[test]
    fn test_next_buy_absent_after_breakout() {
        // X column at 7 already above the X column at 5
        let chart = close_chart(&[1.0, 5.0, 2.0, 7.0], 3);
        let next = chart.next_simple_signal();
        assert_eq!(next.buy, None);
        assert_eq!(next.sell, Some(1.0));
    }

    #[test]
    fn test_descending_dates_match_ascending() {
        let close = vec![1.0, 5.0, 2.0, 7.0, 2.0];
        let dates: Vec<NaiveDateTime> = (1..=5).map(day).collect();

        let ascending = TimeSeries::from_close(close.clone()).with_dates(dates.clone());
        let descending = TimeSeries::from_close(close.into_iter().rev().collect())
            .with_dates(dates.into_iter().rev().collect());

        let a = PointFigureChart::new(&ascending, ChartConfig::default()).unwrap();
        let b = PointFigureChart::new(&descending, ChartConfig::default()).unwrap();
        assert_eq!(a.matrix(), b.matrix());
        assert_eq!(a.states(), b.states());
    }

    #[test]
    fn test_column_labels_use_first_state_date() {
        let dates: Vec<NaiveDateTime> = (1..=5).map(day).collect();
        let series = TimeSeries::from_close(vec![1.0, 5.0, 2.0, 7.0, 2.0]).with_dates(dates);
        let chart = PointFigureChart::new(&series, ChartConfig::default()).unwrap();

        assert_eq!(
            chart.column_labels(),
            vec![
                Some("2024-03-01".to_string()),
                Some("2024-03-03".to_string()),
                Some("2024-03-04".to_string()),
                Some("2024-03-05".to_string()),
            ]
        );

        let undated = close_chart(&[1.0, 5.0, 2.0], 3);
        assert_eq!(undated.column_labels(), vec![None, None]);
    }

    #[test]
    fn test_indicators_follow_columns() {
        let chart = close_chart(&[1.0, 5.0, 2.0, 7.0, 2.0], 3);
        let sma = chart.sma(2).unwrap();
        assert_eq!(sma.len(), chart.matrix().columns());
        assert_eq!(sma.values[1], Some(3.0));

        let (upper, lower) = chart.bollinger(2, 2.0).unwrap();
        assert_eq!(upper.label, "Bollinger(2,2)-upper");
        assert_eq!(lower.values[2], Some(2.0));

        assert_eq!(chart.midpoints().unwrap().values[2], Some(5.0));
    }

    #[test]
    fn test_random_walk_invariants() {
        for seed in 0..8 {
            let close = random_walk(seed, 300);
            for reversal in [1, 3] {
                let chart = close_chart(&close, reversal);

                let boxes = chart.scale().values();
                assert!(boxes.windows(2).all(|w| w[0] < w[1]));
                let (min, max) = chart.series().price_range(Method::Close);
                assert!(boxes[0] <= min && boxes[boxes.len() - 1] >= max);
                let last = chart.states().last().unwrap();
                assert_eq!(chart.matrix().columns(), last.column + 1);

                if reversal > 1 {
                    let trends: Vec<Trend> = chart.profiles().iter().map(|p| p.trend).collect();
                    assert!(trends.windows(2).all(|w| w[0] != w[1]));
                }

                let breakouts = chart.breakouts().unwrap();
                assert!(breakouts.iter().all(|b| b.hits >= 2 && b.width >= 2));

                for mode in [TrendlineMode::Strong, TrendlineMode::Weak] {
                    let params = TrendlineParams { length: 4, mode };
                    let lines = chart.trendlines(params).unwrap();
                    assert!(lines.iter().all(|l| l.length >= mode.minimum_length()));
                }

                let counts = chart.counts(CountParams::default()).unwrap();
                assert!(counts.iter().all(|c| c.reward > 0.0));

                let again = close_chart(&close, reversal);
                assert_eq!(chart.matrix(), again.matrix());
                assert_eq!(chart.breakouts().unwrap(), again.breakouts().unwrap());
                assert_eq!(
                    chart.counts(CountParams::default()).unwrap(),
                    again.counts(CountParams::default()).unwrap()
                );
                assert_eq!(
                    chart.signals(SignalParams::default()).unwrap(),
                    again.signals(SignalParams::default()).unwrap()
                );
            }
        }
    }

    #[test]
    fn test_high_low_method_with_log_scaling() {
        let close = random_walk(42, 120);
        let high: Vec<f64> = close.iter().map(|c| c + 1.0).collect();
        let low: Vec<f64> = close.iter().map(|c| c - 1.0).collect();
        let series = TimeSeries::from_ohlc(close.clone(), high, low, close);
        let config = ChartConfig::new(Method::HighLow, 3, Scaling::Logarithmic, BoxSize::Value(1.0));

        let chart = PointFigureChart::new(&series, config).unwrap();
        assert!(chart.scale_spec().is_logarithmic());
        assert!(chart.matrix().columns() > 1);
    }
}
