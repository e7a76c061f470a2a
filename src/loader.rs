//! CSV loading
//!
//! Expects a header row naming any of `date`, `open`, `high`, `low`,
//! `close`, `volume` (case-insensitive, any order). Missing price columns
//! are left absent so the chart can report which field its method needs.

use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::series::TimeSeries;

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%Y/%m/%d %H:%M:%S"];

fn parse_date(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(date);
        }
    }
    for format in ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
                return Ok(midnight);
            }
        }
    }
    bail!("Unrecognised date '{}'", raw)
}

pub fn read_series<R: Read>(reader: R) -> Result<TimeSeries> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let headers: Vec<String> = csv_reader
        .headers()
        .context("Failed to read CSV header")?
        .iter()
        .map(|h| h.to_ascii_lowercase())
        .collect();
    let column = |name: &str| headers.iter().position(|h| h == name);

    let date_col = column("date");
    let price_cols = ["open", "high", "low", "close", "volume"].map(column);
    if price_cols.iter().all(Option::is_none) {
        bail!("CSV header names none of open, high, low, close, volume");
    }

    let mut dates = Vec::new();
    let mut fields: [Vec<f64>; 5] = Default::default();

    for (line, record) in csv_reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to parse CSV row {}", line + 2))?;

        if let Some(i) = date_col {
            let raw = record.get(i).unwrap_or_default();
            dates.push(parse_date(raw).with_context(|| format!("Row {}", line + 2))?);
        }

        for (values, col) in fields.iter_mut().zip(price_cols) {
            if let Some(i) = col {
                let raw = record.get(i).unwrap_or_default();
                let value: f64 = raw
                    .parse()
                    .with_context(|| format!("Row {}: '{}' is not a number", line + 2, raw))?;
                values.push(value);
            }
        }
    }

    let [open, high, low, close, volume] = fields;
    let pick = |values: Vec<f64>, col: Option<usize>| col.map(|_| values);

    let series = TimeSeries {
        date: date_col.map(|_| dates),
        open: pick(open, price_cols[0]),
        high: pick(high, price_cols[1]),
        low: pick(low, price_cols[2]),
        close: pick(close, price_cols[3]),
        volume: pick(volume, price_cols[4]),
    };
    debug!("Loaded {} rows", series.len());
    Ok(series)
}

pub fn read_series_file(path: &Path) -> Result<TimeSeries> {
    let file = std::fs::File::open(path).with_context(|| format!("Failed to open file: {:?}", path))?;
    read_series(std::io::BufReader::new(file)).with_context(|| format!("Failed to load {:?}", path))
}
