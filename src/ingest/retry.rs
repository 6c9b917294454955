//! Retry policy layered over a `Fetcher`.
//!
//! The CDEC client never retries on its own. Callers that want retries wrap
//! it in `RetryingFetcher`, which re-issues transport failures and 5xx
//! responses with a fixed pause between attempts.

use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::ingest::Fetcher;
use crate::model::{DateWindow, FetchError, Series, StationSensorKey};

#[derive(Debug, Clone)]
pub struct RetryingFetcher<F> {
    inner: F,
    max_attempts: u32,
    pause: Duration,
}

impl<F: Fetcher> RetryingFetcher<F> {
    /// `max_attempts` counts the first call; values below 1 are treated as 1.
    pub fn new(inner: F, max_attempts: u32, pause: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            pause,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl<F: Fetcher> Fetcher for RetryingFetcher<F> {
    fn fetch(&self, key: &StationSensorKey, window: DateWindow) -> Result<Series, FetchError> {
        let mut attempt = 1;
        loop {
            match self.inner.fetch(key, window) {
                Ok(series) => return Ok(series),
                Err(err) if attempt < self.max_attempts && err.is_retryable() => {
                    warn!(
                        station = %key.station_id,
                        sensor = key.sensor_num,
                        %window,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err.kind,
                        "retrying CDEC window"
                    );
                    if !self.pause.is_zero() {
                        thread::sleep(self.pause);
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
