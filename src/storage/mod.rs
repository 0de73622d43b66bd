//! Local file store.
//!
//! Handles the date-partitioned on-disk layout other tooling depends on:
//! - `weather/cosmo-d2/grib/{datetime}/{quantity}/{file}` for grids
//! - `weather/local_forecasts/mos/{timestamp}/{station}-MOSMIX.{ext}` for forecasts
//! - `weather/weather_reports/poi/{YYYYMMDD}/{file}` for reports
//!
//! The store assumes a single running instance; existence checks and writes
//! are not guarded against a concurrent writer.

mod partition;
mod table;
mod transcode;

pub use partition::{
    grid_datetime_token, grid_relative_path, parse_forecast_name, report_partition,
    ForecastName, PartitionError,
};
pub use table::{CsvMerger, MergeMode, RowTable, HEADER_ROWS};
pub use transcode::{TranscodeError, Transcoder};

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed table: {0}")]
    Csv(#[from] csv::Error),
}

impl StorageError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Configuration for storage paths.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl StorageConfig {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn weather_dir(&self) -> PathBuf {
        self.data_dir.join("weather")
    }

    pub fn grid_dir(&self) -> PathBuf {
        self.weather_dir().join("cosmo-d2").join("grib")
    }

    pub fn forecast_dir(&self) -> PathBuf {
        self.weather_dir().join("local_forecasts").join("mos")
    }

    pub fn report_dir(&self) -> PathBuf {
        self.weather_dir().join("weather_reports").join("poi")
    }
}

/// Whether a stored file is already present.
pub async fn file_exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

/// Write `content` to `path`, creating parent directories.
pub async fn write_file(path: &Path, content: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| StorageError::io(parent, e))?;
    }

    let mut file = fs::File::create(path)
        .await
        .map_err(|e| StorageError::io(path, e))?;
    file.write_all(content)
        .await
        .map_err(|e| StorageError::io(path, e))?;
    file.flush().await.map_err(|e| StorageError::io(path, e))?;

    debug!("Wrote {} bytes to {:?}", content.len(), path);
    Ok(())
}

/// Read a file's bytes, or `None` if it does not exist yet.
pub async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::io(path, e)),
    }
}
