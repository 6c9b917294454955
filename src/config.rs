//! Session configuration loader - parses cdec.toml
//!
//! Keeps the station, sensors, service endpoint and probe schedule out of the
//! code so a different station or a tighter chunk size is a config edit, not
//! a rebuild. Every section is optional; missing keys fall back to the
//! defaults for the LCH stage/flow export.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;

use crate::collect::{CollectOptions, DEFAULT_CHUNK_DAYS, DEFAULT_WORKERS, FailurePolicy};
use crate::discovery::ProbeSettings;
use crate::ingest::cdec::{CDEC_JSON_URL, CleaningRules, DEFAULT_TIMEOUT_SECS};
use crate::model::{
    DurationCode, FALLBACK_PROBE_START_YEAR, MISSING_VALUE_SENTINEL, NARROWING_FLOOR_YEAR,
    PROBE_YEARS, SENSOR_FLOW, SENSOR_STAGE, StationSensorKey,
};

pub const DEFAULT_CONFIG_PATH: &str = "cdec.toml";

/// Environment variable naming the config file.
pub const ENV_CONFIG_PATH: &str = "CDEC_CONFIG";
pub const ENV_BASE_URL: &str = "CDEC_BASE_URL";
pub const ENV_STATION: &str = "CDEC_STATION";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    pub id: String,
    pub stage_sensor: u32,
    pub flow_sensor: u32,
    pub duration_code: DurationCode,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            id: "LCH".to_string(),
            stage_sensor: SENSOR_STAGE,
            flow_sensor: SENSOR_FLOW,
            duration_code: DurationCode::Event,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Total attempts per window, including the first. `1` disables retry.
    pub max_attempts: u32,
    pub retry_pause_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: CDEC_JSON_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_attempts: 1,
            retry_pause_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CollectConfig {
    pub chunk_days: i64,
    pub workers: usize,
    pub failure_policy: FailurePolicy,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            chunk_days: DEFAULT_CHUNK_DAYS,
            workers: DEFAULT_WORKERS,
            failure_policy: FailurePolicy::Propagate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub years: Vec<i32>,
    pub floor_year: i32,
    pub fallback_start: NaiveDate,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            years: PROBE_YEARS.to_vec(),
            floor_year: NARROWING_FLOOR_YEAR,
            fallback_start: NaiveDate::from_ymd_opt(FALLBACK_PROBE_START_YEAR, 1, 1)
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    pub missing_value: f64,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            missing_value: MISSING_VALUE_SENTINEL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
        }
    }
}

/// Root of `cdec.toml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub station: StationConfig,
    pub service: ServiceConfig,
    pub collect: CollectConfig,
    pub probe: ProbeConfig,
    pub cleaning: CleaningConfig,
    pub output: OutputConfig,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl SessionConfig {
    /// Loads the session config from `$CDEC_CONFIG` (default `cdec.toml`),
    /// falling back to defaults when the file does not exist, then applies
    /// `CDEC_BASE_URL` / `CDEC_STATION` overrides. A `.env` file is honoured.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let path = env::var(ENV_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = if Path::new(&path).exists() {
            Self::load_from_path(&path)?
        } else {
            Self::default()
        };

        config.apply_overrides(|name| env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies environment-style overrides looked up through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|s| !s.trim().is_empty()) {
            self.service.base_url = url;
        }
        if let Some(station) = lookup(ENV_STATION).filter(|s| !s.trim().is_empty()) {
            self.station.id = station.trim().to_uppercase();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.station.id.trim().is_empty() {
            return invalid("station.id must not be empty".to_string());
        }
        if self.collect.chunk_days < 1 {
            return invalid(format!(
                "collect.chunk_days must be at least 1, got {}",
                self.collect.chunk_days
            ));
        }
        if self.collect.workers == 0 {
            return invalid("collect.workers must be at least 1".to_string());
        }
        if self.service.max_attempts == 0 {
            return invalid("service.max_attempts must be at least 1".to_string());
        }
        if self.service.timeout_secs == 0 {
            return invalid("service.timeout_secs must be at least 1".to_string());
        }
        let Some(&first_probe) = self.probe.years.first() else {
            return invalid("probe.years must list at least one year".to_string());
        };
        if self.probe.years.windows(2).any(|w| w[0] >= w[1]) {
            return invalid(format!(
                "probe.years must be strictly ascending, got {:?}",
                self.probe.years
            ));
        }
        if self.probe.floor_year > first_probe {
            return invalid(format!(
                "probe.floor_year {} is after the first probe year {}",
                self.probe.floor_year, first_probe
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Adapters to the component settings types
    // -----------------------------------------------------------------------

    pub fn stage_key(&self) -> StationSensorKey {
        StationSensorKey::new(
            self.station.id.clone(),
            self.station.stage_sensor,
            self.station.duration_code,
        )
    }

    pub fn flow_key(&self) -> StationSensorKey {
        StationSensorKey::new(
            self.station.id.clone(),
            self.station.flow_sensor,
            self.station.duration_code,
        )
    }

    pub fn probe_settings(&self, today: NaiveDate) -> ProbeSettings {
        ProbeSettings {
            probe_years: self.probe.years.clone(),
            floor_year: self.probe.floor_year,
            fallback_start: self.probe.fallback_start,
            today,
        }
    }

    pub fn collect_options(&self) -> CollectOptions {
        CollectOptions {
            workers: self.collect.workers,
            failure_policy: self.collect.failure_policy,
            progress: None,
        }
    }

    pub fn cleaning_rules(&self) -> CleaningRules {
        CleaningRules {
            missing_value: self.cleaning.missing_value,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.service.timeout_secs)
    }

    pub fn retry_pause(&self) -> Duration {
        Duration::from_millis(self.service.retry_pause_ms)
    }
}
