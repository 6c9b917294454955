//! Earliest-record discovery.
//!
//! CDEC has no "period of record" query, so the start of a sensor's history
//! is found by probing. Phase one fetches single years at fixed decade
//! anchors until one returns data. Phase two walks backwards one calendar
//! year at a time from that hit until a year comes back empty.
//!
//! Each probe's outcome decides the next request, so discovery is strictly
//! sequential.

use chrono::{Datelike, Local, NaiveDate};
use thiserror::Error;
use tracing::{debug, info};

use crate::ingest::Fetcher;
use crate::model::{
    DateWindow, FALLBACK_PROBE_START_YEAR, FetchError, NARROWING_FLOOR_YEAR, NoDataFoundError,
    PROBE_YEARS, StationSensorKey, ValidationError,
};

// ---------------------------------------------------------------------------
// Settings and results
// ---------------------------------------------------------------------------

/// Probe schedule for the earliest-date search.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeSettings {
    /// Anchor years, probed in ascending order.
    pub probe_years: Vec<i32>,
    /// Narrowing stops once it reaches this year.
    pub floor_year: i32,
    /// Start of the catch-all probe used when no anchor has data.
    pub fallback_start: NaiveDate,
    /// End of the catch-all probe.
    pub today: NaiveDate,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            probe_years: PROBE_YEARS.to_vec(),
            floor_year: NARROWING_FLOOR_YEAR,
            fallback_start: NaiveDate::from_ymd_opt(FALLBACK_PROBE_START_YEAR, 1, 1)
                .unwrap_or_default(),
            today: Local::now().date_naive(),
        }
    }
}

/// How the earliest date was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryPhase {
    /// The first anchor with data was also the first year with data.
    Anchor { year: i32 },
    /// Walking back from the anchor found earlier years with data.
    Narrowed { anchor_year: i32, steps: usize },
    /// No anchor had data; the answer came from the catch-all probe and was
    /// not narrowed.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub earliest: NaiveDate,
    pub phase: DiscoveryPhase,
    /// Total fetch calls issued.
    pub requests: usize,
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    NoData(#[from] NoDataFoundError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

// ---------------------------------------------------------------------------
// Finder
// ---------------------------------------------------------------------------

pub struct EarliestDateFinder<'a> {
    fetcher: &'a dyn Fetcher,
    settings: ProbeSettings,
}

impl<'a> EarliestDateFinder<'a> {
    pub fn new(fetcher: &'a dyn Fetcher) -> Self {
        Self::with_settings(fetcher, ProbeSettings::default())
    }

    pub fn with_settings(fetcher: &'a dyn Fetcher, settings: ProbeSettings) -> Self {
        Self { fetcher, settings }
    }


    /// Earliest date with data for `key`.
    ///
    /// # Errors
    /// - `DiscoveryError::NoData`: every anchor and the fallback probe were empty.
    /// - `DiscoveryError::Fetch`: a probe failed; discovery stops at that probe.
    /// - `DiscoveryError::Validation`: the fallback window would end before it starts.
    pub fn find_earliest(&self, key: &StationSensorKey) -> Result<NaiveDate, DiscoveryError> {
        self.find_earliest_with_report(key).map(|r| r.earliest)
    }

    pub fn find_earliest_with_report(
        &self,
        key: &StationSensorKey,
    ) -> Result<DiscoveryReport, DiscoveryError> {
        let mut requests = 0;

        // Phase 1: coarse probe over the decade anchors
        let mut anchor_hit = None;
        for &year in &self.settings.probe_years {
            let series = self.fetcher.fetch(key, DateWindow::year(year)?)?;
            requests += 1;
            if let Some(first) = series.earliest_date() {
                debug!(
                    station = %key.station_id,
                    sensor = key.sensor_num,
                    year,
                    %first,
                    "anchor year has data"
                );
                anchor_hit = Some((year, first));
                break;
            }
            debug!(station = %key.station_id, sensor = key.sensor_num, year, "anchor year empty");
        }

        let Some((anchor_year, mut earliest)) = anchor_hit else {
            return self.fallback_probe(key, requests);
        };

        // Phase 2: walk back one calendar year at a time
        let mut year = earliest.year();
        let mut steps = 0;
        while year > self.settings.floor_year {
            let series = self.fetcher.fetch(key, DateWindow::year(year - 1)?)?;
            requests += 1;
            match series.earliest_date() {
                Some(first) => {
                    earliest = first;
                    year -= 1;
                    steps += 1;
                }
                None => break,
            }
        }

        let phase = if steps == 0 {
            DiscoveryPhase::Anchor { year: anchor_year }
        } else {
            DiscoveryPhase::Narrowed { anchor_year, steps }
        };

        Ok(self.finish(key, earliest, phase, requests))
    }

    // The catch-all answer is returned as-is, without year-by-year narrowing.
    fn fallback_probe(
        &self,
        key: &StationSensorKey,
        mut requests: usize,
    ) -> Result<DiscoveryReport, DiscoveryError> {
        let window = DateWindow::new(self.settings.fallback_start, self.settings.today)?;
        let series = self.fetcher.fetch(key, window)?;
        requests += 1;

        match series.earliest_date() {
            Some(first) => Ok(self.finish(key, first, DiscoveryPhase::Fallback, requests)),
            None => Err(NoDataFoundError::for_key(key).into()),
        }
    }

    fn finish(
        &self,
        key: &StationSensorKey,
        earliest: NaiveDate,
        phase: DiscoveryPhase,
        requests: usize,
    ) -> DiscoveryReport {
        info!(
            station = %key.station_id,
            sensor = key.sensor_num,
            dur_code = %key.duration_code,
            %earliest,
            ?phase,
            requests,
            "earliest record located"
        );
        DiscoveryReport {
            earliest,
            phase,
            requests,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::fixtures::{MemoryFetcher, ScriptedFetcher, at, date};
    use crate::model::{DurationCode, FetchErrorKind, RawReading};

    fn key() -> StationSensorKey {
        StationSensorKey::new("LCH", 1, DurationCode::Event)
    }

    fn settings() -> ProbeSettings {
        ProbeSettings {
            today: date("2024-06-30"),
            ..ProbeSettings::default()
        }
    }

    fn reading(ts: &str) -> RawReading {
        RawReading::new(at(ts), 1.0)
    }

    #[test]
    fn test_anchor_hit_then_empty_prior_year() {
        // Empty through the 2000 anchor, data from 2010-03-15, nothing in 2009.
        let fetcher = MemoryFetcher::new(vec![
            reading("2010-03-15 08:00"),
            reading("2010-07-01 00:00"),
            reading("2015-01-01 00:00"),
        ]);
        let finder = EarliestDateFinder::with_settings(&fetcher, settings());

        let report = finder.find_earliest_with_report(&key()).expect("data exists");
        assert_eq!(report.earliest, date("2010-03-15"));
        assert_eq!(report.phase, DiscoveryPhase::Anchor { year: 2010 });
        assert_eq!(report.requests, 9, "8 anchors + one narrowing probe of 2009");
        assert!(fetcher.calls().contains(&DateWindow::year(2009).unwrap()));
    }

    #[test]
    fn test_narrowing_walks_back_to_floor_year() {
        // Anchors 1900..1950 answer empty during the coarse probe, 1970 answers
        // with 1970-06-01, and every year 1969..1900 has data when narrowed.
        let fetcher = ScriptedFetcher::new(|call, window| {
            let year = window.start().year();
            match call {
                0..=2 => Ok(Vec::new()),
                3 => {
                    assert_eq!(year, 1970);
                    Ok(vec![reading("1970-06-01 00:00"), reading("1970-09-01 00:00")])
                }
                _ if year == 1900 => Ok(vec![reading("1900-04-17 06:00")]),
                _ => {
                    let ts = format!("{}-05-01 00:00", year);
                    Ok(vec![reading(&ts)])
                }
            }
        });
        let finder = EarliestDateFinder::with_settings(&fetcher, settings());

        let report = finder.find_earliest_with_report(&key()).expect("data exists");
        assert_eq!(report.earliest, date("1900-04-17"));
        assert_eq!(
            report.phase,
            DiscoveryPhase::Narrowed {
                anchor_year: 1970,
                steps: 70
            }
        );
        assert_eq!(report.requests, 4 + 70);

        let calls = fetcher.calls();
        assert_eq!(calls.last(), Some(&DateWindow::year(1900).unwrap()));
        assert!(
            !calls.contains(&DateWindow::year(1899).unwrap()),
            "narrowing must not go below the floor year"
        );
    }

    #[test]
    fn test_no_data_anywhere_is_no_data_found() {
        let fetcher = MemoryFetcher::new(Vec::new());
        let finder = EarliestDateFinder::with_settings(&fetcher, settings());

        let result = finder.find_earliest(&key());
        match result {
            Err(DiscoveryError::NoData(err)) => {
                assert_eq!(err.station, "LCH");
                assert_eq!(err.sensor, 1);
            }
            other => panic!("expected NoData, got {:?}", other),
        }
        assert_eq!(fetcher.calls().len(), 9, "8 anchors + fallback");
    }

    #[test]
    fn test_fallback_probe_result_is_not_narrowed() {
        // Data only in 2005..2008, which no anchor year covers.
        let fetcher = MemoryFetcher::new(vec![
            reading("2005-02-10 00:00"),
            reading("2008-11-01 00:00"),
        ]);
        let finder = EarliestDateFinder::with_settings(&fetcher, settings());

        let report = finder.find_earliest_with_report(&key()).unwrap();
        assert_eq!(report.earliest, date("2005-02-10"));
        assert_eq!(report.phase, DiscoveryPhase::Fallback);

        let fallback = DateWindow::new(date("2000-01-01"), date("2024-06-30")).unwrap();
        assert_eq!(fetcher.calls().len(), 9);
        assert!(fetcher.calls().contains(&fallback));
    }

    #[test]
    fn test_data_spanning_anchor_boundaries_is_found_by_narrowing() {
        // Contiguous data from 1987 onward: anchor 1990 hits, narrowing finds 1987.
        let fetcher = MemoryFetcher::new(vec![
            reading("1987-08-20 00:00"),
            reading("1988-01-01 00:00"),
            reading("1989-01-01 00:00"),
            reading("1990-03-01 00:00"),
        ]);
        let finder = EarliestDateFinder::with_settings(&fetcher, settings());

        let report = finder.find_earliest_with_report(&key()).unwrap();
        assert_eq!(report.earliest, date("1987-08-20"));
        assert_eq!(
            report.phase,
            DiscoveryPhase::Narrowed {
                anchor_year: 1990,
                steps: 3
            }
        );
    }

    #[test]
    fn test_find_earliest_is_idempotent() {
        let fetcher = MemoryFetcher::new(vec![
            reading("1979-01-09 00:00"),
            reading("1980-01-01 00:00"),
        ]);
        let finder = EarliestDateFinder::with_settings(&fetcher, settings());

        let first = finder.find_earliest(&key()).unwrap();
        let second = finder.find_earliest(&key()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, date("1979-01-09"));
    }

    #[test]
    fn test_probe_failure_propagates() {
        let fetcher = ScriptedFetcher::new(|call, _| {
            if call == 2 {
                Err(FetchErrorKind::Status(500))
            } else {
                Ok(Vec::new())
            }
        });
        let finder = EarliestDateFinder::with_settings(&fetcher, settings());

        match finder.find_earliest(&key()) {
            Err(DiscoveryError::Fetch(err)) => {
                assert_eq!(err.kind, FetchErrorKind::Status(500));
                assert_eq!(err.window, DateWindow::year(1950).unwrap());
            }
            other => panic!("expected Fetch error, got {:?}", other),
        }
        assert_eq!(fetcher.calls().len(), 3, "no probes after the failure");
    }

    #[test]
    fn test_custom_probe_schedule_is_honoured() {
        let fetcher = MemoryFetcher::new(vec![reading("1962-05-05 00:00")]);
        let finder = EarliestDateFinder::with_settings(
            &fetcher,
            ProbeSettings {
                probe_years: vec![1962],
                floor_year: 1960,
                ..settings()
            },
        );

        let report = finder.find_earliest_with_report(&key()).unwrap();
        assert_eq!(report.earliest, date("1962-05-05"));
        assert_eq!(
            fetcher.calls(),
            vec![DateWindow::year(1961).unwrap(), DateWindow::year(1962).unwrap()]
        );
    }

    #[test]
    fn test_default_schedule_finds_anchor_year() {
        let fetcher = MemoryFetcher::new(vec![reading("1950-08-12 06:00")]);
        let finder = EarliestDateFinder::new(&fetcher);

        assert_eq!(finder.find_earliest(&key()).unwrap(), date("1950-08-12"));
        assert_eq!(fetcher.calls().len(), 4, "1900, 1930, 1950 and the empty 1949");
    }

    #[test]
    fn test_today_before_fallback_start_is_validation_error() {
        let fetcher = MemoryFetcher::new(Vec::new());
        let finder = EarliestDateFinder::with_settings(
            &fetcher,
            ProbeSettings {
                today: date("1999-06-30"),
                ..settings()
            },
        );

        let result = finder.find_earliest(&key());
        assert!(
            matches!(result, Err(DiscoveryError::Validation(_))),
            "got {:?}",
            result
        );
        assert_eq!(fetcher.calls().len(), 8, "only the anchor years are fetched");
    }
}
