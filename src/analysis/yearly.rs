//! Per-year flow and stage statistics.
//!
//! Groups readings by calendar year and reports the same columns the
//! hydrology summaries downstream expect: average, max, min, median and the
//! 25th/50th/95th/99th percentiles.

use std::collections::BTreeMap;

use chrono::Datelike;

use crate::model::RawReading;

/// Statistics for one calendar year of readings.
#[derive(Debug, Clone, PartialEq)]
pub struct YearSummary {
    pub year: i32,
    pub count: usize,
    pub mean: f64,
    pub max: f64,
    pub min: f64,
    pub median: f64,
    pub p25: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Linear-interpolated quantile of already-sorted values.
///
/// `q` is clamped to `[0, 1]`; position is `q * (n - 1)` between the two
/// closest ranks. Returns `None` for an empty slice.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

/// Summarizes `readings` by calendar year, ascending. Non-finite values are
/// ignored; years without any finite value are omitted.
pub fn summarize_by_year(readings: &[RawReading]) -> Vec<YearSummary> {
    let mut by_year: BTreeMap<i32, Vec<f64>> = BTreeMap::new();
    for r in readings.iter().filter(|r| r.value.is_finite()) {
        by_year.entry(r.timestamp.year()).or_default().push(r.value);
    }

    by_year
        .into_iter()
        .filter_map(|(year, mut values)| {
            values.sort_by(|a, b| a.total_cmp(b));
            let count = values.len();
            let mean = values.iter().sum::<f64>() / count as f64;
            Some(YearSummary {
                year,
                count,
                mean,
                max: *values.last()?,
                min: *values.first()?,
                median: quantile(&values, 0.5)?,
                p25: quantile(&values, 0.25)?,
                p50: quantile(&values, 0.50)?,
                p95: quantile(&values, 0.95)?,
                p99: quantile(&values, 0.99)?,
            })
        })
        .collect()
}
