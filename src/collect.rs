//! Chunked range collection.
//!
//! CDEC times out on long ranges of event data, so a full history is pulled
//! as a run of bounded windows and stitched back together. Windows are
//! independent: they are fetched on a bounded thread pool and merged with a
//! stable sort plus timestamp dedup, so the result never depends on the order
//! in which responses arrive.
//!
//! Under `FailurePolicy::Propagate` a failed window stops queued windows from
//! starting and `collect` returns as soon as every earlier window has
//! reported. Requests already in flight cannot be interrupted through the
//! blocking client; they finish in the background, bounded by the client
//! timeout, and their results are discarded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

use chrono::{Days, NaiveDate};
use serde::Deserialize;
use thiserror::Error;
use threadpool::ThreadPool;
use tracing::{info, warn};

use crate::ingest::Fetcher;
use crate::model::{
    DateWindow, FetchError, FetchErrorKind, Series, StationSensorKey, ValidationError,
};

pub const DEFAULT_CHUNK_DAYS: i64 = 365;
pub const DEFAULT_WORKERS: usize = 4;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// What to do when one window's fetch fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum FailurePolicy {
    /// Abort the whole collection with the first failure.
    #[default]
    #[serde(rename = "propagate")]
    Propagate,
    /// Log the failed window, leave it out, and keep going.
    #[serde(rename = "skip")]
    SkipAndWarn,
}

/// Per-window progress notification.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowProgress {
    pub station: String,
    pub sensor: u32,
    pub window: DateWindow,
    pub rows: usize,
}

pub type ProgressSink = Arc<dyn Fn(&WindowProgress) + Send + Sync>;

#[derive(Clone)]
pub struct CollectOptions {
    /// Maximum windows in flight at once. `1` fetches strictly in sequence.
    pub workers: usize,
    pub failure_policy: FailurePolicy,
    /// Receives one notification per completed window, in completion order.
    pub progress: Option<ProgressSink>,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            failure_policy: FailurePolicy::default(),
            progress: None,
        }
    }
}

impl std::fmt::Debug for CollectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectOptions")
            .field("workers", &self.workers)
            .field("failure_policy", &self.failure_policy)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Bookkeeping for one `collect` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectReport {
    pub windows_planned: usize,
    pub windows_fetched: usize,
    /// Rows across all windows before the merge.
    pub rows_fetched: usize,
    /// Rows left after sorting and dropping duplicate timestamps.
    pub rows_merged: usize,
    /// Windows dropped under `FailurePolicy::SkipAndWarn`, in date order.
    pub skipped_windows: Vec<DateWindow>,
}

#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

// ---------------------------------------------------------------------------
// Window planning
// ---------------------------------------------------------------------------

/// Splits `[start, end]` into consecutive inclusive windows of `chunk_days`
/// days; the last window is cut short at `end`.
///
/// Returns no windows when `start > end`.
///
/// # Errors
/// `ValidationError` when `chunk_days < 1`.
pub fn plan_windows(
    start: NaiveDate,
    end: NaiveDate,
    chunk_days: i64,
) -> Result<Vec<DateWindow>, ValidationError> {
    if chunk_days < 1 {
        return Err(ValidationError(format!(
            "chunk_days must be at least 1, got {}",
            chunk_days
        )));
    }

    let span = Days::new((chunk_days - 1) as u64);
    let mut windows = Vec::new();
    let mut cur = start;

    while cur <= end {
        let chunk_end = cur.checked_add_days(span).map_or(end, |d| d.min(end));
        windows.push(DateWindow::new(cur, chunk_end)?);
        match chunk_end.succ_opt() {
            Some(next) => cur = next,
            None => break,
        }
    }

    Ok(windows)
}

// ---------------------------------------------------------------------------
// Collector
// ---------------------------------------------------------------------------

type WindowOutcome = (usize, DateWindow, Option<Result<Series, FetchError>>);

pub struct ChunkedRangeCollector {
    fetcher: Arc<dyn Fetcher>,
    options: CollectOptions,
}

impl ChunkedRangeCollector {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self::with_options(fetcher, CollectOptions::default())
    }

    pub fn with_options(fetcher: Arc<dyn Fetcher>, options: CollectOptions) -> Self {
        Self { fetcher, options }
    }

    /// Fetches `[start, end]` in `chunk_days` windows and merges the results.
    ///
    /// # Errors
    /// - `CollectError::Validation`: `chunk_days < 1`; nothing is fetched.
    /// - `CollectError::Fetch`: a window failed under `FailurePolicy::Propagate`.
    pub fn collect(
        &self,
        key: &StationSensorKey,
        start: NaiveDate,
        end: NaiveDate,
        chunk_days: i64,
    ) -> Result<Series, CollectError> {
        self.collect_with_report(key, start, end, chunk_days)
            .map(|(series, _)| series)
    }

    pub fn collect_with_report(
        &self,
        key: &StationSensorKey,
        start: NaiveDate,
        end: NaiveDate,
        chunk_days: i64,
    ) -> Result<(Series, CollectReport), CollectError> {
        let windows = plan_windows(start, end, chunk_days)?;
        let mut report = CollectReport {
            windows_planned: windows.len(),
            ..CollectReport::default()
        };

        if windows.is_empty() {
            return Ok((Series::empty(), report));
        }

        let workers = self.options.workers.clamp(1, windows.len());
        let pool = ThreadPool::with_name("cdec-window".to_string(), workers);
        let cancelled = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel::<WindowOutcome>();

        for (index, window) in windows.iter().copied().enumerate() {
            let tx = tx.clone();
            let fetcher = Arc::clone(&self.fetcher);
            let key = key.clone();
            let cancelled = Arc::clone(&cancelled);
            let policy = self.options.failure_policy;

            pool.execute(move || {
                if cancelled.load(Ordering::SeqCst) {
                    let _ = tx.send((index, window, None));
                    return;
                }
                let result = fetcher.fetch(&key, window);
                // Raise the flag before reporting so queued jobs see it immediately.
                if result.is_err() && policy == FailurePolicy::Propagate {
                    cancelled.store(true, Ordering::SeqCst);
                }
                let _ = tx.send((index, window, Some(result)));
            });
        }
        drop(tx);

        let mut parts: Vec<Option<Series>> = vec![None; windows.len()];
        let mut reported = vec![false; windows.len()];
        let mut failure: Option<(usize, FetchError)> = None;

        // Ends once every job has reported, or once a propagating failure is
        // known and every earlier window has reported. Windows still in
        // flight after that are abandoned and their results dropped.
        for (index, window, outcome) in &rx {
            reported[index] = true;
            match outcome {
                None => {}
                Some(Ok(series)) => {
                    if failure.is_none() {
                        self.notify(key, window, series.len());
                        parts[index] = Some(series);
                    }
                }
                Some(Err(err)) => {
                    self.handle_failure(index, err, &cancelled, &mut failure, &mut report)
                }
            }
            if let Some((failed, _)) = &failure {
                if reported[..*failed].iter().all(|r| *r) {
                    break;
                }
            }
        }

        // A job that panicked never reports back.
        if failure.is_none() {
            for (index, window) in windows.iter().enumerate() {
                if !reported[index] {
                    let err = FetchError::new(
                        key,
                        *window,
                        FetchErrorKind::Transport(
                            "window worker terminated unexpectedly".to_string(),
                        ),
                    );
                    self.handle_failure(index, err, &cancelled, &mut failure, &mut report);
                }
            }
        }

        if let Some((_, err)) = failure {
            return Err(err.into());
        }

        report.skipped_windows.sort();
        report.windows_fetched = parts.iter().filter(|p| p.is_some()).count();
        report.rows_fetched = parts.iter().flatten().map(Series::len).sum();

        let merged = Series::merge(parts.into_iter().flatten());
        report.rows_merged = merged.len();

        info!(
            station = %key.station_id,
            sensor = key.sensor_num,
            %start,
            %end,
            windows = report.windows_planned,
            skipped = report.skipped_windows.len(),
            rows = report.rows_merged,
            duplicates = report.rows_fetched - report.rows_merged,
            "collection complete"
        );

        Ok((merged, report))
    }

    /// Under `Propagate` the failure of the earliest window wins, so the
    /// reported window does not depend on which response arrived first.
    fn handle_failure(
        &self,
        index: usize,
        err: FetchError,
        cancelled: &AtomicBool,
        failure: &mut Option<(usize, FetchError)>,
        report: &mut CollectReport,
    ) {
        match self.options.failure_policy {
            FailurePolicy::Propagate => {
                cancelled.store(true, Ordering::SeqCst);
                if failure.as_ref().is_none_or(|(failed, _)| index < *failed) {
                    *failure = Some((index, err));
                }
            }
            FailurePolicy::SkipAndWarn => {
                warn!(
                    station = %err.station,
                    sensor = err.sensor,
                    window = %err.window,
                    error = %err.kind,
                    "skipping failed window"
                );
                report.skipped_windows.push(err.window);
            }
        }
    }

    fn notify(&self, key: &StationSensorKey, window: DateWindow, rows: usize) {
        info!(
            station = %key.station_id,
            sensor = key.sensor_num,
            start = %window.start(),
            end = %window.end(),
            rows,
            "window fetched"
        );
        if let Some(progress) = &self.options.progress {
            progress(&WindowProgress {
                station: key.station_id.clone(),
                sensor: key.sensor_num,
                window,
                rows,
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
