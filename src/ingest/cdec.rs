//! CDEC JSONDataServlet client.
//!
//! Retrieves station sensor readings from the California Data Exchange Center:
//!   https://cdec.water.ca.gov/dynamicapp/req/JSONDataServlet
//!
//! The servlet takes `Stations`, `SensorNums`, `dur_code`, `Start` and `End`
//! (dates as `YYYY-MM-DD`, both inclusive) and answers with either `null` or a
//! JSON array of records. Each record carries the reading time under `date`
//! and the measurement under `value`. See `fixtures.rs` for annotated samples.

use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use tracing::debug;

use crate::ingest::Fetcher;
use crate::model::{
    DateWindow, FetchError, FetchErrorKind, MISSING_VALUE_SENTINEL, RawReading, Series,
    StationSensorKey,
};

pub const CDEC_JSON_URL: &str = "https://cdec.water.ca.gov/dynamicapp/req/JSONDataServlet";

/// Default per-request timeout for the blocking HTTP client.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const DATE_FIELD: &str = "date";
const VALUE_FIELD: &str = "value";

// CDEC writes "2020-1-5 7:00"; chrono accepts the unpadded fields with these patterns.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

// ---------------------------------------------------------------------------
// Cleaning rules
// ---------------------------------------------------------------------------

/// Row filters applied to every response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CleaningRules {
    /// Readings equal to this value are dropped.
    pub missing_value: f64,
}

impl Default for CleaningRules {
    fn default() -> Self {
        Self {
            missing_value: MISSING_VALUE_SENTINEL,
        }
    }
}

// ---------------------------------------------------------------------------
// URL construction
// ---------------------------------------------------------------------------

/// Builds the servlet URL for one station/sensor/window request.
///
/// # Example
/// ```
/// use cdec_history::ingest::cdec::{build_request_url, CDEC_JSON_URL};
/// use cdec_history::model::{DateWindow, DurationCode, StationSensorKey};
///
/// let key = StationSensorKey::new("LCH", 20, DurationCode::Event);
/// let window = DateWindow::year(2020).unwrap();
/// let url = build_request_url(CDEC_JSON_URL, &key, window);
/// assert!(url.ends_with("Stations=LCH&SensorNums=20&dur_code=E&Start=2020-01-01&End=2020-12-31"));
/// ```
pub fn build_request_url(base_url: &str, key: &StationSensorKey, window: DateWindow) -> String {
    format!(
        "{}?Stations={}&SensorNums={}&dur_code={}&Start={}&End={}",
        base_url,
        urlencoding::encode(&key.station_id),
        key.sensor_num,
        key.duration_code,
        window.start().format("%Y-%m-%d"),
        window.end().format("%Y-%m-%d"),
    )
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Parses one CDEC timestamp, returning `None` for anything unrecognised.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn record_timestamp(record: &Value) -> Option<NaiveDateTime> {
    match record.get(DATE_FIELD)? {
        Value::String(s) => parse_timestamp(s),
        _ => None,
    }
}

// CDEC usually sends numbers but older stations return numeric strings.
fn record_value(record: &Value) -> Option<f64> {
    let value = match record.get(VALUE_FIELD)? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    value.is_finite().then_some(value)
}

/// Parses a CDEC response body into a cleaned `Series`.
///
/// Rows are filtered in order: unparsable timestamp, unparsable value,
/// sentinel value. The survivors are stable-sorted by timestamp and any
/// repeated timestamp keeps its first row. `null`, `[]` and an empty body all
/// yield an empty series.
///
/// # Errors
/// Returns the underlying `serde_json::Error` when the body is not JSON or is
/// not an array (or `null`) at the top level.
pub fn parse_response(body: &str, rules: &CleaningRules) -> Result<Series, serde_json::Error> {
    if body.trim().is_empty() {
        return Ok(Series::empty());
    }

    let records: Option<Vec<Value>> = serde_json::from_str(body)?;
    let records = records.unwrap_or_default();
    let total = records.len();

    let mut bad_timestamp = 0usize;
    let mut bad_value = 0usize;
    let mut sentinel = 0usize;
    let mut kept = Vec::with_capacity(total);

    for record in &records {
        let Some(timestamp) = record_timestamp(record) else {
            bad_timestamp += 1;
            continue;
        };
        let Some(value) = record_value(record) else {
            bad_value += 1;
            continue;
        };
        if value == rules.missing_value {
            sentinel += 1;
            continue;
        }
        kept.push(RawReading::new(timestamp, value));
    }

    if kept.len() < total {
        debug!(
            total,
            kept = kept.len(),
            bad_timestamp,
            bad_value,
            sentinel,
            "dropped rows while cleaning CDEC response"
        );
    }

    Ok(Series::from_unsorted(kept))
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// Blocking CDEC client; one `fetch` is one HTTP request.
#[derive(Debug, Clone)]
pub struct CdecClient {
    http: reqwest::blocking::Client,
    base_url: String,
    rules: CleaningRules,
}

impl CdecClient {
    /// Client against the public servlet with the default timeout.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_settings(
            CDEC_JSON_URL,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            CleaningRules::default(),
        )
    }

    pub fn with_settings(
        base_url: impl Into<String>,
        timeout: Duration,
        rules: CleaningRules,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            rules,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Fetcher for CdecClient {
    fn fetch(&self, key: &StationSensorKey, window: DateWindow) -> Result<Series, FetchError> {
        let url = build_request_url(&self.base_url, key, window);
        debug!(%url, "fetching CDEC window");

        let transport = |e: reqwest::Error| {
            FetchError::new(key, window, FetchErrorKind::Transport(e.to_string()))
        };

        let response = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                key,
                window,
                FetchErrorKind::Status(status.as_u16()),
            ));
        }

        let body = response.text().map_err(transport)?;

        parse_response(&body, &self.rules)
            .map_err(|e| FetchError::new(key, window, FetchErrorKind::Parse(e.to_string())))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
