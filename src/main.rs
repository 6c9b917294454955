//! CDEC history export
//!
//! Pulls the complete stage and flow record for the configured station,
//! writes the three `*_ALL.csv` files and logs a per-year flow summary.
//!
//! Usage:
//!   cargo run --release
//!
//! Environment:
//!   CDEC_CONFIG   - path to the session file (default: cdec.toml)
//!   CDEC_BASE_URL - override for the JSONDataServlet URL
//!   CDEC_STATION  - override for the station id
//!   RUST_LOG      - log filter (default: info)

use std::error::Error;
use std::sync::Arc;

use cdec_history::analysis::yearly::summarize_by_year;
use cdec_history::config::SessionConfig;
use cdec_history::export::write_station_history;
use cdec_history::ingest::Fetcher;
use cdec_history::ingest::cdec::CdecClient;
use cdec_history::ingest::retry::RetryingFetcher;
use cdec_history::logging;
use cdec_history::session::export_station_history;
use tracing::{error, info};

fn main() {
    logging::init();

    if let Err(e) = run() {
        let mut message = e.to_string();
        let mut cause = e.source();
        while let Some(inner) = cause {
            message.push_str(&format!(": {inner}"));
            cause = inner.source();
        }
        error!(error = %message, "station export failed");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let config = SessionConfig::load()?;
    info!(
        station = %config.station.id,
        stage_sensor = config.station.stage_sensor,
        flow_sensor = config.station.flow_sensor,
        dur_code = %config.station.duration_code,
        base_url = %config.service.base_url,
        "starting CDEC history export"
    );

    let client = CdecClient::with_settings(
        config.service.base_url.clone(),
        config.request_timeout(),
        config.cleaning_rules(),
    )?;
    let fetcher: Arc<dyn Fetcher> = Arc::new(RetryingFetcher::new(
        client,
        config.service.max_attempts,
        config.retry_pause(),
    ));

    let history = export_station_history(fetcher, &config)?;
    let paths = write_station_history(&config.output.dir, &history)?;
    info!(
        combined = %paths.combined.display(),
        stage = %paths.stage.display(),
        flow = %paths.flow.display(),
        "export complete"
    );

    for year in summarize_by_year(history.flow.readings()) {
        info!(
            year = year.year,
            count = year.count,
            mean = year.mean,
            min = year.min,
            max = year.max,
            median = year.median,
            p25 = year.p25,
            p95 = year.p95,
            p99 = year.p99,
            "flow summary (cfs)"
        );
    }

    Ok(())
}
