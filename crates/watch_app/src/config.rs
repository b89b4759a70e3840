//! Application settings, read from a RON file.
//!
//! Every field has a default, so a missing file or a partial file is fine.

use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use engine_logging::engine_info;
use serde::Deserialize;
use thiserror::Error;
use watch_core::{ExtractionSettings, HourRange, Schedule, ScheduleError};
use watch_engine::{FetchSettings, PendingPolicy, RetryPolicy, ScanSettings};

use crate::logging::LogDestination;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("could not parse config {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid schedule: {0}")]
    Schedule(#[from] ScheduleError),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store_path: PathBuf,
    /// Digests are written here as HTML files; without it they are logged.
    pub outbox_dir: Option<PathBuf>,
    pub api_addr: SocketAddr,
    pub active_hours: HourRange,
    pub interval_minutes: u32,
    pub max_attempts: u32,
    pub content_ratio: f64,
    pub pending_policy: PendingPolicy,
    pub fetch: FetchConfig,
    pub log_destination: LogDestination,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("sitewatch_store.ron"),
            outbox_dir: None,
            api_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            active_hours: HourRange::default(),
            interval_minutes: 180,
            max_attempts: watch_engine::DEFAULT_MAX_ATTEMPTS,
            content_ratio: watch_core::DEFAULT_CONTENT_RATIO,
            pending_policy: PendingPolicy::default(),
            fetch: FetchConfig::default(),
            log_destination: LogDestination::Both,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub redirect_limit: usize,
    pub max_bytes: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        let defaults = FetchSettings::default();
        Self {
            connect_timeout_secs: defaults.connect_timeout.as_secs(),
            request_timeout_secs: defaults.request_timeout.as_secs(),
            redirect_limit: defaults.redirect_limit,
            max_bytes: defaults.max_bytes,
        }
    }
}

impl AppConfig {
    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(path, &text),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                engine_info!("No config at {:?}, using defaults", path);
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn parse(path: &Path, text: &str) -> Result<Self, ConfigError> {
        ron::from_str(text).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }

    pub fn schedule(&self) -> Result<Schedule, ConfigError> {
        Ok(Schedule::new(self.active_hours, self.interval_minutes)?)
    }

    pub fn scan_settings(&self) -> ScanSettings {
        ScanSettings {
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
            },
            extraction: ExtractionSettings {
                content_ratio: self.content_ratio,
            },
            pending_policy: self.pending_policy,
        }
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            connect_timeout: Duration::from_secs(self.fetch.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.fetch.request_timeout_secs),
            redirect_limit: self.fetch.redirect_limit,
            max_bytes: self.fetch.max_bytes,
            ..FetchSettings::default()
        }
    }
}
