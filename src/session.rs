//! Full-history export for one station.
//!
//! Finds where stage and flow records begin, pulls both sensors from the
//! earlier of the two start dates through today, and aligns them on
//! timestamp. Any failure aborts the run and names the step that failed.

use std::fmt;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use thiserror::Error;
use tracing::info;

use crate::collect::{ChunkedRangeCollector, CollectError};
use crate::combine::combine;
use crate::config::SessionConfig;
use crate::discovery::{DiscoveryError, EarliestDateFinder};
use crate::ingest::Fetcher;
use crate::model::{CombinedRecord, Series, StationSensorKey};

/// Everything retrieved for one station.
#[derive(Debug, Clone, PartialEq)]
pub struct StationHistory {
    pub station_id: String,
    pub earliest_stage: NaiveDate,
    pub earliest_flow: NaiveDate,
    /// Start of the collected range: the earlier of the two sensors.
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub stage: Series,
    pub flow: Series,
    pub combined: Vec<CombinedRecord>,
}

/// Step of the export at which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStage {
    DiscoverStage,
    DiscoverFlow,
    CollectStage,
    CollectFlow,
}

impl fmt::Display for SessionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStage::DiscoverStage => "discover stage sensor",
            SessionStage::DiscoverFlow => "discover flow sensor",
            SessionStage::CollectStage => "collect stage sensor",
            SessionStage::CollectFlow => "collect flow sensor",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum SessionFailure {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Collect(#[from] CollectError),
}

#[derive(Debug, Error)]
#[error("{stage} ({key}) failed: {source}")]
pub struct SessionError {
    pub stage: SessionStage,
    pub key: StationSensorKey,
    pub source: SessionFailure,
}

impl SessionError {
    fn new(stage: SessionStage, key: &StationSensorKey, source: impl Into<SessionFailure>) -> Self {
        SessionError {
            stage,
            key: key.clone(),
            source: source.into(),
        }
    }
}

/// Runs discovery, collection and combination through today's date.
pub fn export_station_history(
    fetcher: Arc<dyn Fetcher>,
    config: &SessionConfig,
) -> Result<StationHistory, SessionError> {
    export_station_history_until(fetcher, config, Local::now().date_naive())
}

/// As `export_station_history`, with `today` supplied by the caller.
pub fn export_station_history_until(
    fetcher: Arc<dyn Fetcher>,
    config: &SessionConfig,
    today: NaiveDate,
) -> Result<StationHistory, SessionError> {
    let stage_key = config.stage_key();
    let flow_key = config.flow_key();

    let finder = EarliestDateFinder::with_settings(fetcher.as_ref(), config.probe_settings(today));
    let earliest_stage = finder
        .find_earliest(&stage_key)
        .map_err(|e| SessionError::new(SessionStage::DiscoverStage, &stage_key, e))?;
    let earliest_flow = finder
        .find_earliest(&flow_key)
        .map_err(|e| SessionError::new(SessionStage::DiscoverFlow, &flow_key, e))?;

    let start = earliest_stage.min(earliest_flow);
    let end = today;
    info!(
        station = %config.station.id,
        %earliest_stage,
        %earliest_flow,
        %start,
        %end,
        "collecting station history"
    );

    let collector = ChunkedRangeCollector::with_options(fetcher, config.collect_options());
    let chunk_days = config.collect.chunk_days;
    let stage = collector
        .collect(&stage_key, start, end, chunk_days)
        .map_err(|e| SessionError::new(SessionStage::CollectStage, &stage_key, e))?;
    let flow = collector
        .collect(&flow_key, start, end, chunk_days)
        .map_err(|e| SessionError::new(SessionStage::CollectFlow, &flow_key, e))?;

    let combined = combine(&stage, &flow);
    info!(
        station = %config.station.id,
        stage_rows = stage.len(),
        flow_rows = flow.len(),
        combined_rows = combined.len(),
        "station history assembled"
    );

    Ok(StationHistory {
        station_id: config.station.id.clone(),
        earliest_stage,
        earliest_flow,
        start,
        end,
        stage,
        flow,
        combined,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::FailurePolicy;
    use crate::ingest::fixtures::{MemoryFetcher, ScriptedFetcher, at, date};
    use crate::model::{DateWindow, FetchErrorKind, RawReading, SENSOR_STAGE};

    fn config() -> SessionConfig {
        let mut config = SessionConfig::default();
        config.collect.chunk_days = 30;
        config.collect.workers = 2;
        config
    }

    /// Stage readings use value 1.0, flow readings 100.0; sensors are told
    /// apart through the request key.
    struct TwoSensor {
        stage: MemoryFetcher,
        flow: MemoryFetcher,
    }

    impl Fetcher for TwoSensor {
        fn fetch(
            &self,
            key: &StationSensorKey,
            window: DateWindow,
        ) -> Result<Series, crate::model::FetchError> {
            if key.sensor_num == SENSOR_STAGE {
                self.stage.fetch(key, window)
            } else {
                self.flow.fetch(key, window)
            }
        }
    }

    #[test]
    fn test_collects_from_earlier_sensor_start_through_today() {
        let fetcher = Arc::new(TwoSensor {
            stage: MemoryFetcher::new(vec![
                RawReading::new(at("2010-03-01 00:00"), 1.0),
                RawReading::new(at("2010-03-02 00:00"), 1.5),
            ]),
            flow: MemoryFetcher::new(vec![
                RawReading::new(at("2010-02-15 00:00"), 100.0),
                RawReading::new(at("2010-03-01 00:00"), 110.0),
            ]),
        });

        let history = export_station_history_until(fetcher, &config(), date("2010-04-01"))
            .expect("export succeeds");

        assert_eq!(history.earliest_stage, date("2010-03-01"));
        assert_eq!(history.earliest_flow, date("2010-02-15"));
        assert_eq!(history.start, date("2010-02-15"));
        assert_eq!(history.end, date("2010-04-01"));
        assert_eq!(history.stage.len(), 2);
        assert_eq!(history.flow.len(), 2);
        assert_eq!(history.combined.len(), 3, "2010-03-01 00:00 is shared");
        assert_eq!(history.combined[1].stage_value, Some(1.0));
        assert_eq!(history.combined[1].flow_value, Some(110.0));
    }

    #[test]
    fn test_missing_flow_history_fails_at_flow_discovery() {
        let fetcher = Arc::new(TwoSensor {
            stage: MemoryFetcher::new(vec![RawReading::new(at("2010-03-01 00:00"), 1.0)]),
            flow: MemoryFetcher::new(vec![]),
        });

        let err = export_station_history_until(fetcher, &config(), date("2010-04-01"))
            .expect_err("flow has no data");

        assert_eq!(err.stage, SessionStage::DiscoverFlow);
        assert_eq!(err.key.sensor_num, 20);
        assert!(matches!(
            err.source,
            SessionFailure::Discovery(DiscoveryError::NoData(_))
        ));
        assert!(err.to_string().starts_with("discover flow sensor"));
    }

    #[test]
    fn test_window_failure_is_reported_against_collect_step() {
        // Discovery for both sensors hits the 2010 anchor and narrows once into
        // an empty 2009 (nine calls each); every later call is a collection window and fails.
        let fetcher = Arc::new(ScriptedFetcher::new(|call, window| {
            if call < 18 {
                if window == DateWindow::year(2010).unwrap() {
                    Ok(vec![RawReading::new(at("2010-06-01 00:00"), 2.0)])
                } else {
                    Ok(vec![])
                }
            } else {
                Err(FetchErrorKind::Status(500))
            }
        }));

        let mut config = config();
        config.collect.workers = 1;
        config.collect.failure_policy = FailurePolicy::Propagate;

        let err = export_station_history_until(fetcher, &config, date("2010-07-01"))
            .expect_err("collection fails");
        assert_eq!(err.stage, SessionStage::CollectStage);
        assert!(matches!(err.source, SessionFailure::Collect(CollectError::Fetch(_))));
    }
}
