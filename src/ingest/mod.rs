//! Data source clients.
//!
//! - `cdec`  - CDEC JSONDataServlet: URL construction, response cleaning, HTTP client
//! - `retry` - retry policy layered over any `Fetcher`
//! - `fixtures` (test only) - representative CDEC response payloads

pub mod cdec;
pub mod retry;

#[cfg(test)]
pub(crate) mod fixtures;

use std::sync::Arc;

use crate::model::{DateWindow, FetchError, Series, StationSensorKey};

/// Issues one bounded-range request and returns the cleaned readings.
///
/// Implementations perform no caching and no retry. An empty or absent payload
/// is an empty `Series`, never an error.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, key: &StationSensorKey, window: DateWindow) -> Result<Series, FetchError>;
}

impl<F: Fetcher + ?Sized> Fetcher for Arc<F> {
    fn fetch(&self, key: &StationSensorKey, window: DateWindow) -> Result<Series, FetchError> {
        (**self).fetch(key, window)
    }
}

impl<F: Fetcher + ?Sized> Fetcher for &F {
    fn fetch(&self, key: &StationSensorKey, window: DateWindow) -> Result<Series, FetchError> {
        (**self).fetch(key, window)
    }
}
