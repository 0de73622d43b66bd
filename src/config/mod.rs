//! Configuration loading and validation.
//!
//! Values are layered: built-in defaults, an optional TOML file, then
//! `MIRROR_`-prefixed environment variables (`__` separates nested keys,
//! e.g. `MIRROR_GRID__CYCLE_INTERVAL=15m`). The loaded value is built once
//! at startup and handed to each feed by reference.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::models::FeedKind;
use crate::parse_duration;
use crate::storage::MergeMode;

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    LoadError(#[from] ::config::ConfigError),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("No storage root configured (set MIRROR_DATA_DIR or --data-dir)")]
    MissingDataDir,

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "MIRROR";

/// HTTP client and per-file retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Additional attempts after the first failed download
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed wait between download attempts
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    /// Pause between consecutive files within one feed
    #[serde(default = "default_pacing")]
    pub pacing_ms: u64,
}

fn default_timeout() -> u64 {
    60
}

fn default_user_agent() -> String {
    format!("weather-mirror/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    2000
}

fn default_pacing() -> u64 {
    100
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            user_agent: default_user_agent(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay(),
            pacing_ms: default_pacing(),
        }
    }
}

/// Markers recognised on directory-index pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingConfig {
    /// Href of the synthetic "up one level" link
    #[serde(default = "default_parent_marker")]
    pub parent_marker: String,

    /// Substring identifying alias links such as `LATEST`
    #[serde(default = "default_placeholder_marker")]
    pub placeholder_marker: String,
}

fn default_parent_marker() -> String {
    "../".to_string()
}

fn default_placeholder_marker() -> String {
    "LATEST".to_string()
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            parent_marker: default_parent_marker(),
            placeholder_marker: default_placeholder_marker(),
        }
    }
}

/// Cycle-summary broadcast target. No port means no notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_notify_host")]
    pub host: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

fn default_notify_host() -> String {
    "127.0.0.1".to_string()
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            host: default_notify_host(),
            port: None,
        }
    }
}

/// Model-grid feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub enabled: bool,
    pub root_url: String,
    pub crawl_retry_interval: String,
    pub cycle_interval: String,

    /// Suffix every admitted grid file ends with
    pub file_suffix: String,

    /// Every admitted file must contain all of these
    pub required_markers: Vec<String>,

    /// Directories containing any of these are never entered
    pub excluded_markers: Vec<String>,

    /// Compression suffix of the downloaded archive
    pub archive_suffix: String,

    /// Compression suffix of the stored file
    pub storage_suffix: String,

    pub decompress_command: Vec<String>,
    pub recompress_command: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_listings: Option<usize>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            root_url: "https://opendata.dwd.de/weather/nwp/cosmo-d2/grib/".to_string(),
            crawl_retry_interval: "1m".to_string(),
            cycle_interval: "1h".to_string(),
            file_suffix: ".grib2.bz2".to_string(),
            required_markers: vec!["single-level".to_string(), "regular-lat-lon".to_string()],
            excluded_markers: vec!["rotated".to_string()],
            archive_suffix: ".bz2".to_string(),
            storage_suffix: ".zst".to_string(),
            decompress_command: vec!["bzip2".to_string(), "-d".to_string(), "-f".to_string()],
            recompress_command: vec!["zstd".to_string(), "-q".to_string(), "-f".to_string()],
            max_depth: None,
            max_listings: None,
        }
    }
}

/// Per-station forecast feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub enabled: bool,
    pub root_url: String,
    pub crawl_retry_interval: String,
    pub cycle_interval: String,
    pub file_suffix: String,

    /// Station identifiers to mirror. Empty means every station listed under the root.
    pub stations: Vec<String>,

    /// Path below a station directory holding its packages
    pub station_subdir: String,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            root_url: "https://opendata.dwd.de/weather/local_forecasts/mos/MOSMIX_L/single_stations/"
                .to_string(),
            crawl_retry_interval: "1m".to_string(),
            cycle_interval: "1h".to_string(),
            file_suffix: ".kmz".to_string(),
            stations: Vec::new(),
            station_subdir: "kml/".to_string(),
        }
    }
}

/// Per-station observation report feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub enabled: bool,
    pub root_url: String,
    pub crawl_retry_interval: String,
    pub cycle_interval: String,
    pub file_suffix: String,
    pub delimiter: char,
    pub merge_mode: MergeMode,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            root_url: "https://opendata.dwd.de/weather/weather_reports/poi/".to_string(),
            crawl_retry_interval: "1m".to_string(),
            cycle_interval: "30m".to_string(),
            file_suffix: ".csv".to_string(),
            delimiter: ';',
            merge_mode: MergeMode::default(),
        }
    }
}

impl ReportConfig {
    /// The field delimiter as a single byte. Only ASCII delimiters are supported.
    pub fn delimiter_byte(&self) -> Result<u8, ConfigError> {
        u8::try_from(self.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| {
                ConfigError::ValidationError(format!(
                    "Report delimiter '{}' must be a single ASCII character",
                    self.delimiter
                ))
            })
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Storage root. Mandatory; there is no default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub listing: ListingConfig,

    #[serde(default)]
    pub notify: NotifyConfig,

    #[serde(default)]
    pub grid: GridConfig,

    #[serde(default)]
    pub forecast: ForecastConfig,

    #[serde(default)]
    pub report: ReportConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            log_level: default_log_level(),
            fetch: FetchConfig::default(),
            listing: ListingConfig::default(),
            notify: NotifyConfig::default(),
            grid: GridConfig::default(),
            forecast: ForecastConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

/// Interval and location settings every feed shares, in runtime form.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub kind: FeedKind,
    pub enabled: bool,
    pub root_url: Url,
    pub crawl_retry_interval: Duration,
    pub cycle_interval: Duration,
}

impl AppConfig {
    /// Load configuration from an optional TOML file plus environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path.to_path_buf()).required(false))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Parse a configuration from TOML text, without environment overrides.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from_str(contents, ::config::FileFormat::Toml))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// The storage root, or the fatal error for its absence.
    pub fn data_dir(&self) -> Result<&Path, ConfigError> {
        self.data_dir.as_deref().ok_or(ConfigError::MissingDataDir)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.timeout_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.fetch.retry_delay_ms)
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.fetch.pacing_ms)
    }

    /// Resolve one feed's shared settings into runtime types.
    pub fn feed_settings(&self, kind: FeedKind) -> Result<FeedSettings, ConfigError> {
        let (enabled, root_url, crawl_retry, cycle) = match kind {
            FeedKind::Grid => (
                self.grid.enabled,
                &self.grid.root_url,
                &self.grid.crawl_retry_interval,
                &self.grid.cycle_interval,
            ),
            FeedKind::Forecast => (
                self.forecast.enabled,
                &self.forecast.root_url,
                &self.forecast.crawl_retry_interval,
                &self.forecast.cycle_interval,
            ),
            FeedKind::Report => (
                self.report.enabled,
                &self.report.root_url,
                &self.report.crawl_retry_interval,
                &self.report.cycle_interval,
            ),
        };

        let root_url = Url::parse(root_url).map_err(|e| {
            ConfigError::ValidationError(format!("{} root URL '{}': {}", kind, root_url, e))
        })?;
        if !root_url.path().ends_with('/') {
            return Err(ConfigError::ValidationError(format!(
                "{} root URL must end with '/': {}",
                kind, root_url
            )));
        }
        if root_url.host_str().is_none() {
            return Err(ConfigError::ValidationError(format!(
                "{} root URL has no host: {}",
                kind, root_url
            )));
        }

        Ok(FeedSettings {
            kind,
            enabled,
            root_url,
            crawl_retry_interval: positive_duration(kind, "crawl_retry_interval", crawl_retry)?,
            cycle_interval: positive_duration(kind, "cycle_interval", cycle)?,
        })
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.data_dir()?;

        for kind in FeedKind::ALL {
            self.feed_settings(kind)?;
        }

        if self.fetch.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "Fetch timeout must be greater than 0".to_string(),
            ));
        }

        for (kind, suffix) in [
            (FeedKind::Grid, &self.grid.file_suffix),
            (FeedKind::Forecast, &self.forecast.file_suffix),
            (FeedKind::Report, &self.report.file_suffix),
        ] {
            if suffix.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "{} file suffix must not be empty",
                    kind
                )));
            }
        }

        if !self.grid.file_suffix.ends_with(&self.grid.archive_suffix) {
            return Err(ConfigError::ValidationError(format!(
                "Grid file suffix '{}' must end with archive suffix '{}'",
                self.grid.file_suffix, self.grid.archive_suffix
            )));
        }

        if self.grid.decompress_command.is_empty() || self.grid.recompress_command.is_empty() {
            return Err(ConfigError::ValidationError(
                "Grid transcode commands must not be empty".to_string(),
            ));
        }

        self.report.delimiter_byte()?;

        if self.listing.placeholder_marker.is_empty() {
            return Err(ConfigError::ValidationError(
                "Placeholder marker must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

fn positive_duration(kind: FeedKind, field: &str, value: &str) -> Result<Duration, ConfigError> {
    match parse_duration(value) {
        Some(d) if !d.is_zero() => Ok(d),
        _ => Err(ConfigError::ValidationError(format!(
            "{} {} must be a positive duration (e.g. \"30m\"), got '{}'",
            kind, field, value
        ))),
    }
}
