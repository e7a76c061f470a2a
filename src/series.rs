//! Price series input and normalisation
//!
//! The caller owns a `TimeSeries`; chart construction borrows it once and
//! produces a `NormalizedSeries`:
//! - required fields for the method (and ATR scaling) are present
//! - every field has the same length and holds finite prices
//! - bars are in ascending date order (descending input is reversed)
//! - the time step (daily or intraday) is inferred from the dates

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ChartConfig;
use crate::error::{PnfError, Result};
use crate::types::{Method, Scaling};

/// Raw OHLC(V) series as supplied by a data collaborator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub date: Option<Vec<NaiveDateTime>>,
    pub open: Option<Vec<f64>>,
    pub high: Option<Vec<f64>>,
    pub low: Option<Vec<f64>>,
    pub close: Option<Vec<f64>>,
    pub volume: Option<Vec<f64>>,
}

impl TimeSeries {
    pub fn from_close(close: Vec<f64>) -> Self {
        Self {
            close: Some(close),
            ..Default::default()
        }
    }

    pub fn from_ohlc(open: Vec<f64>, high: Vec<f64>, low: Vec<f64>, close: Vec<f64>) -> Self {
        Self {
            open: Some(open),
            high: Some(high),
            low: Some(low),
            close: Some(close),
            ..Default::default()
        }
    }

    pub fn with_dates(mut self, dates: Vec<NaiveDateTime>) -> Self {
        self.date = Some(dates);
        self
    }

    pub fn with_volume(mut self, volume: Vec<f64>) -> Self {
        self.volume = Some(volume);
        self
    }

    /// Length of the first present price field
    pub fn len(&self) -> usize {
        [&self.close, &self.high, &self.low, &self.open]
            .iter()
            .find_map(|field| field.as_ref().map(|v| v.len()))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Granularity of the bar dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeStep {
    /// Every gap between bars is a whole number of days
    Daily,
    /// At least one gap is a fraction of a day
    Intraday,
}

impl TimeStep {
    /// `chrono` format used for column labels
    pub fn label_format(self) -> &'static str {
        match self {
            TimeStep::Daily => "%Y-%m-%d",
            TimeStep::Intraday => "%Y-%m-%d %H:%M",
        }
    }
}

/// Validated series in ascending order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSeries {
    pub date: Option<Vec<NaiveDateTime>>,
    pub open: Option<Vec<f64>>,
    pub high: Option<Vec<f64>>,
    pub low: Option<Vec<f64>>,
    pub close: Option<Vec<f64>>,
    pub volume: Option<Vec<f64>>,
    pub time_step: Option<TimeStep>,
    len: usize,
}

impl NormalizedSeries {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn open(&self) -> &[f64] {
        self.open.as_deref().unwrap_or(&[])
    }

    pub fn high(&self) -> &[f64] {
        self.high.as_deref().unwrap_or(&[])
    }

    pub fn low(&self) -> &[f64] {
        self.low.as_deref().unwrap_or(&[])
    }

    pub fn close(&self) -> &[f64] {
        self.close.as_deref().unwrap_or(&[])
    }

    /// Lowest and highest price the box scale must cover
    pub fn price_range(&self, method: Method) -> (f64, f64) {
        let (lows, highs) = match method {
            Method::Close => (self.close(), self.close()),
            _ => (self.low(), self.high()),
        };
        let min = lows.iter().copied().fold(f64::INFINITY, f64::min);
        let max = highs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (min, max)
    }

    /// Date of bar `bar`, if the series carries dates
    pub fn date_at(&self, bar: usize) -> Option<NaiveDateTime> {
        self.date.as_ref().and_then(|dates| dates.get(bar).copied())
    }
}

fn required_fields(config: &ChartConfig) -> Vec<&'static str> {
    let mut fields = match config.method {
        Method::Close => vec!["close"],
        Method::HighLow | Method::LowHigh => vec!["high", "low"],
        Method::HighLowClose => vec!["high", "low", "close"],
        Method::OpenHighLowClose => vec!["open", "high", "low", "close"],
    };
    if config.scaling == Scaling::AverageTrueRange {
        for field in ["high", "low", "close"] {
            if !fields.contains(&field) {
                fields.push(field);
            }
        }
    }
    fields
}

fn infer_time_step(dates: &[NaiveDateTime]) -> Option<TimeStep> {
    if dates.len() < 2 {
        return None;
    }
    let fractional = dates
        .windows(2)
        .any(|pair| (pair[1] - pair[0]).num_seconds() % 86_400 != 0);
    if fractional {
        Some(TimeStep::Intraday)
    } else {
        Some(TimeStep::Daily)
    }
}

/// Validate `series` for `config` and return an ascending copy
pub fn normalize(series: &TimeSeries, config: &ChartConfig) -> Result<NormalizedSeries> {
    let fields: [(&str, Option<&Vec<f64>>); 5] = [
        ("open", series.open.as_ref()),
        ("high", series.high.as_ref()),
        ("low", series.low.as_ref()),
        ("close", series.close.as_ref()),
        ("volume", series.volume.as_ref()),
    ];

    for name in required_fields(config) {
        let present = fields
            .iter()
            .any(|(field, values)| *field == name && values.is_some());
        if !present {
            return Err(PnfError::Shape(format!(
                "method {} with {} scaling requires the '{}' field",
                config.method, config.scaling, name
            )));
        }
    }

    let len = series.len();
    if len == 0 {
        return Err(PnfError::Shape("series is empty".to_string()));
    }

    for (name, values) in fields.iter() {
        if let Some(values) = values {
            if values.len() != len {
                return Err(PnfError::Shape(format!(
                    "field '{}' has {} values, expected {}",
                    name,
                    values.len(),
                    len
                )));
            }
            if *name != "volume" {
                if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
                    return Err(PnfError::Shape(format!(
                        "field '{}' holds a non-finite value at bar {}",
                        name, pos
                    )));
                }
            }
        }
    }

    if let Some(dates) = &series.date {
        if dates.len() != len {
            return Err(PnfError::Shape(format!(
                "field 'date' has {} values, expected {}",
                dates.len(),
                len
            )));
        }
    }

    config.validate_for_length(len)?;

    let mut normalized = NormalizedSeries {
        date: series.date.clone(),
        open: series.open.clone(),
        high: series.high.clone(),
        low: series.low.clone(),
        close: series.close.clone(),
        volume: series.volume.clone(),
        time_step: None,
        len,
    };

    let descending = series
        .date
        .as_ref()
        .map(|dates| dates.first() > dates.last())
        .unwrap_or(false);

    if descending {
        debug!("Series dates are descending, reversing {} bars", len);
        if let Some(dates) = normalized.date.as_mut() {
            dates.reverse();
        }
        for field in [
            &mut normalized.open,
            &mut normalized.high,
            &mut normalized.low,
            &mut normalized.close,
            &mut normalized.volume,
        ] {
            if let Some(values) = field.as_mut() {
                values.reverse();
            }
        }
    }

    normalized.time_step = normalized.date.as_deref().and_then(infer_time_step);

    Ok(normalized)
}
