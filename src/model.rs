//! Core data types for CDEC historical retrieval.
//!
//! This module defines the shared domain model imported by all other modules:
//! readings, series, date windows, station/sensor keys, and the error types
//! raised while talking to the remote service. It contains no I/O.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Named constants
// ---------------------------------------------------------------------------

/// Value CDEC reports in place of a real reading when the sensor had no data.
pub const MISSING_VALUE_SENTINEL: f64 = -9999.0;

/// Decade anchors probed (earliest first) when looking for the start of a record.
pub const PROBE_YEARS: [i32; 8] = [1900, 1930, 1950, 1970, 1980, 1990, 2000, 2010];

/// Year-by-year narrowing never looks at years before this one.
pub const NARROWING_FLOOR_YEAR: i32 = 1900;

/// Start of the catch-all probe used when no anchor year returned data.
pub const FALLBACK_PROBE_START_YEAR: i32 = 2000;

/// CDEC sensor number for river stage (ft).
pub const SENSOR_STAGE: u32 = 1;

/// CDEC sensor number for river discharge (cfs).
pub const SENSOR_FLOW: u32 = 20;

// ---------------------------------------------------------------------------
// Reading types
// ---------------------------------------------------------------------------

/// A single cleaned reading from one CDEC response row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawReading {
    pub timestamp: NaiveDateTime,
    pub value: f64,
}

impl RawReading {
    pub fn new(timestamp: NaiveDateTime, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// An ordered run of readings with at most one reading per timestamp.
///
/// The only ways to build a `Series` sort and deduplicate their input, so a
/// value of this type always satisfies the ordering invariant. When two
/// readings share a timestamp the one that appeared first in the input wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    readings: Vec<RawReading>,
}

impl Series {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Stable-sorts by timestamp and drops later duplicates.
    pub fn from_unsorted(mut readings: Vec<RawReading>) -> Self {
        readings.sort_by_key(|r| r.timestamp);
        readings.dedup_by_key(|r| r.timestamp);
        Self { readings }
    }

    /// Concatenates `parts` in iteration order, then sorts and deduplicates.
    ///
    /// Because the sort is stable, a timestamp present in several parts keeps
    /// the reading from the earliest part.
    pub fn merge<I>(parts: I) -> Self
    where
        I: IntoIterator<Item = Series>,
    {
        let combined: Vec<RawReading> = parts
            .into_iter()
            .flat_map(|s| s.readings)
            .collect();
        Self::from_unsorted(combined)
    }

    pub fn readings(&self) -> &[RawReading] {
        &self.readings
    }

    pub fn into_readings(self) -> Vec<RawReading> {
        self.readings
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn first(&self) -> Option<&RawReading> {
        self.readings.first()
    }

    /// Calendar date of the earliest reading, if any.
    pub fn earliest_date(&self) -> Option<NaiveDate> {
        self.first().map(|r| r.timestamp.date())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RawReading> {
        self.readings.iter()
    }
}

impl<'a> IntoIterator for &'a Series {
    type Item = &'a RawReading;
    type IntoIter = std::slice::Iter<'a, RawReading>;

    fn into_iter(self) -> Self::IntoIter {
        self.readings.iter()
    }
}

/// One row of the stage/flow outer join.
///
/// Either value is `None` when that sensor had no reading at `timestamp`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CombinedRecord {
    pub timestamp: NaiveDateTime,
    pub stage_value: Option<f64>,
    pub flow_value: Option<f64>,
}

// ---------------------------------------------------------------------------
// Request identity
// ---------------------------------------------------------------------------

/// Inclusive date range passed to a single fetch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DateWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError(format!(
                "window start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// The full calendar year `[year-01-01, year-12-31]`.
    pub fn year(year: i32) -> Result<Self, ValidationError> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1);
        let end = NaiveDate::from_ymd_opt(year, 12, 31);
        match (start, end) {
            (Some(start), Some(end)) => Self::new(start, end),
            _ => Err(ValidationError(format!("year {} is out of range", year))),
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of calendar days covered, counting both ends.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

/// CDEC `dur_code`: the sampling cadence of the requested series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum DurationCode {
    /// Event-based raw readings.
    #[serde(rename = "E")]
    Event,
    #[serde(rename = "H")]
    Hourly,
    #[serde(rename = "D")]
    Daily,
    #[serde(rename = "M")]
    Monthly,
}

impl DurationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DurationCode::Event => "E",
            DurationCode::Hourly => "H",
            DurationCode::Daily => "D",
            DurationCode::Monthly => "M",
        }
    }
}

impl fmt::Display for DurationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DurationCode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "E" => Ok(DurationCode::Event),
            "H" => Ok(DurationCode::Hourly),
            "D" => Ok(DurationCode::Daily),
            "M" => Ok(DurationCode::Monthly),
            other => Err(ValidationError(format!("unknown duration code '{}'", other))),
        }
    }
}

/// Identifies one logical series at CDEC.
///
/// The same key (including `duration_code`) is reused for every request of a
/// discovery or collection run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StationSensorKey {
    pub station_id: String,
    pub sensor_num: u32,
    pub duration_code: DurationCode,
}

impl StationSensorKey {
    pub fn new(
        station_id: impl Into<String>,
        sensor_num: u32,
        duration_code: DurationCode,
    ) -> Self {
        Self {
            station_id: station_id.into(),
            sensor_num,
            duration_code,
        }
    }
}

impl fmt::Display for StationSensorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} sensor {} dur {}",
            self.station_id, self.sensor_num, self.duration_code
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// What went wrong talking to CDEC for one window.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchErrorKind {
    /// Connection failure, timeout, or a body that could not be read.
    #[error("transport error: {0}")]
    Transport(String),
    /// Non-2xx HTTP response.
    #[error("HTTP error: {0}")]
    Status(u16),
    /// The body was not a JSON array of records.
    #[error("parse error: {0}")]
    Parse(String),
}

/// A failed request for one station/sensor/window.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("fetch failed for {station} sensor {sensor} dur {duration_code} over {window}: {kind}")]
pub struct FetchError {
    pub station: String,
    pub sensor: u32,
    pub duration_code: DurationCode,
    pub window: DateWindow,
    pub kind: FetchErrorKind,
}

impl FetchError {
    pub fn new(key: &StationSensorKey, window: DateWindow, kind: FetchErrorKind) -> Self {
        Self {
            station: key.station_id.clone(),
            sensor: key.sensor_num,
            duration_code: key.duration_code,
            window,
            kind,
        }
    }

    /// Transport failures and server-side (5xx) statuses may succeed on a
    /// second attempt; client errors and unparsable bodies will not.
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            FetchErrorKind::Transport(_) => true,
            FetchErrorKind::Status(code) => code >= 500,
            FetchErrorKind::Parse(_) => false,
        }
    }
}

/// Every probe of the earliest-date search came back empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no data found for {station} sensor {sensor} dur {duration_code}")]
pub struct NoDataFoundError {
    pub station: String,
    pub sensor: u32,
    pub duration_code: DurationCode,
}

impl NoDataFoundError {
    pub fn for_key(key: &StationSensorKey) -> Self {
        Self {
            station: key.station_id.clone(),
            sensor: key.sensor_num,
            duration_code: key.duration_code,
        }
    }
}

/// Malformed caller input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid input: {0}")]
pub struct ValidationError(pub String);

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
