//! Test fixtures: representative JSON payloads from the CDEC JSONDataServlet.
//!
//! Truncated to the minimum needed to exercise the parser. The real servlet
//! answers with an array of flat records:
//!
//!   [{ "stationId": "LCH", "durCode": "E", "SENSOR_NUM": 1,
//!      "sensorType": "STAGE", "date": "2020-1-1 0:00",
//!      "obsDate": "2020-1-1 0:00", "value": 4.52,
//!      "dataFlag": " ", "units": "FEET" }, ...]
//!
//! Note: `date` uses unpadded month/day/hour fields, and missing readings are
//! reported as `-9999` rather than omitted.

/// Three clean event readings of LCH stage on New Year's Day 2020.
pub(crate) fn fixture_lch_stage_json() -> &'static str {
    r#"[
      { "stationId": "LCH", "durCode": "E", "SENSOR_NUM": 1, "sensorType": "STAGE",
        "date": "2020-1-1 0:00", "obsDate": "2020-1-1 0:00", "value": 4.52, "dataFlag": " ", "units": "FEET" },
      { "stationId": "LCH", "durCode": "E", "SENSOR_NUM": 1, "sensorType": "STAGE",
        "date": "2020-1-1 0:15", "obsDate": "2020-1-1 0:15", "value": 4.55, "dataFlag": " ", "units": "FEET" },
      { "stationId": "LCH", "durCode": "E", "SENSOR_NUM": 1, "sensorType": "STAGE",
        "date": "2020-1-1 0:30", "obsDate": "2020-1-1 0:30", "value": 4.61, "dataFlag": " ", "units": "FEET" }
    ]"#
}

/// Older stations return the measurement as a string.
pub(crate) fn fixture_string_values_json() -> &'static str {
    r#"[
      { "stationId": "LCH", "SENSOR_NUM": 20, "date": "1995-3-1 12:00", "value": "1180" },
      { "stationId": "LCH", "SENSOR_NUM": 20, "date": "1995-3-1 13:00", "value": " 1250 " }
    ]"#
}

/// Two usable rows mixed with every kind of row the cleaner must drop.
pub(crate) fn fixture_dirty_rows_json() -> &'static str {
    r#"[
      { "date": "2021-2-1 0:00", "value": 12.0 },
      { "date": "2021-2-1 1:00", "value": -9999 },
      { "date": "", "value": 12.5 },
      { "date": null, "value": 12.6 },
      { "date": "yesterday", "value": 12.7 },
      { "date": "2021-2-1 2:00", "value": null },
      { "date": "2021-2-1 3:00", "value": "n/a" },
      { "date": "2021-2-1 4:00" },
      42,
      { "date": "2021-2-1 5:00", "value": 13.1 }
    ]"#
}

/// Rows delivered newest-first.
pub(crate) fn fixture_out_of_order_json() -> &'static str {
    r#"[
      { "date": "2019-6-1 2:00", "value": 3.0 },
      { "date": "2019-6-1 0:00", "value": 1.0 },
      { "date": "2019-6-1 1:00", "value": 2.0 }
    ]"#
}

/// The same timestamp reported twice; the first report must win.
pub(crate) fn fixture_duplicate_rows_json() -> &'static str {
    r#"[
      { "date": "2018-7-4 6:00", "value": 10.0 },
      { "date": "2018-7-4 6:00", "value": 11.0 },
      { "date": "2018-7-4 7:00", "value": 12.0 }
    ]"#
}

// ---------------------------------------------------------------------------
// In-memory fetchers
// ---------------------------------------------------------------------------

use std::sync::Mutex;

use chrono::{NaiveDate, NaiveDateTime};

use crate::ingest::Fetcher;
use crate::model::{DateWindow, FetchError, FetchErrorKind, RawReading, Series, StationSensorKey};

pub(crate) fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("fixture date should parse")
}

pub(crate) fn at(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").expect("fixture timestamp should parse")
}

/// Serves a fixed set of readings, answering each window with the readings
/// whose date falls inside it. Windows listed in `failing` return HTTP 503.
pub(crate) struct MemoryFetcher {
    readings: Vec<RawReading>,
    failing: Vec<DateWindow>,
    calls: Mutex<Vec<DateWindow>>,
}

impl MemoryFetcher {
    pub(crate) fn new(readings: Vec<RawReading>) -> Self {
        Self {
            readings,
            failing: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing_on(mut self, window: DateWindow) -> Self {
        self.failing.push(window);
        self
    }

    pub(crate) fn calls(&self) -> Vec<DateWindow> {
        let mut calls = self.calls.lock().unwrap().clone();
        calls.sort();
        calls
    }
}

impl Fetcher for MemoryFetcher {
    fn fetch(&self, key: &StationSensorKey, window: DateWindow) -> Result<Series, FetchError> {
        self.calls.lock().unwrap().push(window);
        if self.failing.contains(&window) {
            return Err(FetchError::new(key, window, FetchErrorKind::Status(503)));
        }
        let rows = self
            .readings
            .iter()
            .filter(|r| {
                let d = r.timestamp.date();
                d >= window.start() && d <= window.end()
            })
            .copied()
            .collect();
        Ok(Series::from_unsorted(rows))
    }
}

/// Answers each call from a closure given the zero-based call index and the
/// requested window, recording the windows in call order.
pub(crate) struct ScriptedFetcher<F> {
    respond: F,
    calls: Mutex<Vec<DateWindow>>,
}

impl<F> ScriptedFetcher<F>
where
    F: Fn(usize, DateWindow) -> Result<Vec<RawReading>, FetchErrorKind> + Send + Sync,
{
    pub(crate) fn new(respond: F) -> Self {
        Self {
            respond,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> Vec<DateWindow> {
        self.calls.lock().unwrap().clone()
    }
}

impl<F> Fetcher for ScriptedFetcher<F>
where
    F: Fn(usize, DateWindow) -> Result<Vec<RawReading>, FetchErrorKind> + Send + Sync,
{
    fn fetch(&self, key: &StationSensorKey, window: DateWindow) -> Result<Series, FetchError> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(window);
            calls.len() - 1
        };
        (self.respond)(index, window)
            .map(Series::from_unsorted)
            .map_err(|kind| FetchError::new(key, window, kind))
    }
}

/// One reading at noon on every day of `[start, end]`, value = day ordinal.
pub(crate) fn daily_readings(start: &str, end: &str) -> Vec<RawReading> {
    let end = date(end);
    date(start)
        .iter_days()
        .take_while(|d| *d <= end)
        .enumerate()
        .map(|(i, d)| RawReading::new(d.and_hms_opt(12, 0, 0).unwrap(), i as f64))
        .collect()
}
