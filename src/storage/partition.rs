//! Partition keys derived from file names and report dates.

use std::path::PathBuf;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use thiserror::Error;

use crate::crawl::CrawlTarget;

#[derive(Debug, Error)]
pub enum PartitionError {
    #[error("Unexpected grid file name shape ({segments} segments): {name}")]
    GridShape { name: String, segments: usize },

    #[error("Grid file {0} has no quantity directory")]
    MissingQuantity(String),

    #[error("Grid file {name} does not end with {suffix}")]
    ArchiveSuffix { name: String, suffix: String },

    #[error("Unrecognised forecast file name: {0}")]
    ForecastName(String),
}

/// The model-run date-time token of a grid file name.
///
/// Grid names carry 6, 7 or 8 underscore-separated segments depending on how
/// many segments the quantity name spans; the token sits 2, 3 or 4 segments
/// from the end respectively. Any other shape is rejected.
pub fn grid_datetime_token(file_name: &str) -> Result<&str, PartitionError> {
    let segments: Vec<&str> = file_name.split('_').collect();
    let from_end = match segments.len() {
        6 => 2,
        7 => 3,
        8 => 4,
        n => {
            return Err(PartitionError::GridShape {
                name: file_name.to_string(),
                segments: n,
            })
        }
    };
    Ok(segments[segments.len() - from_end])
}

/// `{datetime}/{quantity}/{name}` for a grid target, with the archive
/// compression suffix swapped for the storage one.
pub fn grid_relative_path(
    target: &CrawlTarget,
    archive_suffix: &str,
    storage_suffix: &str,
) -> Result<PathBuf, PartitionError> {
    let token = grid_datetime_token(&target.file_name)?;
    let quantity = target
        .parent_name()
        .ok_or_else(|| PartitionError::MissingQuantity(target.file_name.clone()))?;
    let stem = target
        .file_name
        .strip_suffix(archive_suffix)
        .ok_or_else(|| PartitionError::ArchiveSuffix {
            name: target.file_name.clone(),
            suffix: archive_suffix.to_string(),
        })?;

    Ok(PathBuf::from(token)
        .join(quantity)
        .join(format!("{}{}", stem, storage_suffix)))
}

/// Parts of a forecast package name such as `MOSMIX_L_2026101603_10381.kmz`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForecastName {
    /// Issue time, `YYYYMMDDHH`
    pub timestamp: String,
    pub station: String,
    pub extension: String,
}

impl ForecastName {
    /// `{timestamp}/{station}-MOSMIX.{ext}`
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(&self.timestamp).join(format!("{}-MOSMIX.{}", self.station, self.extension))
    }
}

fn forecast_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9]+_[A-Za-z0-9]+_(\d{10})_([A-Za-z0-9]+)\.([A-Za-z0-9]+)$").unwrap()
    })
}

pub fn parse_forecast_name(file_name: &str) -> Result<ForecastName, PartitionError> {
    let caps = forecast_pattern()
        .captures(file_name)
        .ok_or_else(|| PartitionError::ForecastName(file_name.to_string()))?;

    Ok(ForecastName {
        timestamp: caps[1].to_string(),
        station: caps[2].to_string(),
        extension: caps[3].to_string(),
    })
}

/// Partition directory (`YYYYMMDD`) for a report date field in `dd.mm.yy` form.
pub fn report_partition(date_token: &str) -> Option<String> {
    NaiveDate::parse_from_str(date_token.trim(), "%d.%m.%y")
        .ok()
        .map(|date| date.format("%Y%m%d").to_string())
}
