//! Per-station observation reports, merged into per-date partition files.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;

use super::{download_fetcher, Feed, StoreError};
use crate::config::{AppConfig, ConfigError};
use crate::crawl::{CrawlTarget, LinkLister, ListingError};
use crate::fetch::{Fetcher, Transport};
use crate::models::{FeedKind, StoreOutcome};
use crate::storage::{
    read_optional, report_partition, write_file, CsvMerger, RowTable, StorageConfig, StorageError,
};

pub struct ReportFeed {
    lister: LinkLister,
    fetcher: Fetcher,
    merger: CsvMerger,
    report_dir: PathBuf,
    file_suffix: String,
}

impl ReportFeed {
    pub fn from_config(
        config: &AppConfig,
        storage: &StorageConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        let report = &config.report;
        Ok(Self {
            lister: LinkLister::new(transport.clone(), config.listing.clone()),
            fetcher: download_fetcher(config, transport),
            merger: CsvMerger::new(report.delimiter_byte()?, report.merge_mode),
            report_dir: storage.report_dir(),
            file_suffix: report.file_suffix.clone(),
        })
    }

    /// Write or merge the rows of `incoming` dated `token` into its partition file.
    async fn merge_partition(
        &self,
        incoming: &RowTable,
        token: &str,
        partition: &str,
        file_name: &str,
    ) -> Result<(), StorageError> {
        let path = self.report_dir.join(partition).join(file_name);

        let table = match read_optional(&path).await? {
            Some(existing) => {
                let existing = self.merger.parse(&existing)?;
                self.merger.merge_tables(&existing, incoming, token)
            }
            None => self.merger.fresh(incoming, token),
        };

        write_file(&path, &self.merger.serialize(&table)?).await?;
        debug!("Merged {} into {:?} ({} rows)", token, path, table.len());
        Ok(())
    }
}

#[async_trait]
impl Feed for ReportFeed {
    fn kind(&self) -> FeedKind {
        FeedKind::Report
    }

    async fn crawl(&self, root: &Url) -> Result<Vec<CrawlTarget>, ListingError> {
        self.lister.list_files(root, &self.file_suffix).await
    }

    /// Reports are re-fetched and merged every cycle; there is no existence check.
    ///
    /// Each date in the payload is merged independently. A failed partition is
    /// logged and the others still go ahead; the target fails only when every
    /// partition failed.
    async fn store(&self, target: &CrawlTarget) -> Result<StoreOutcome, StoreError> {
        let bytes = self.fetcher.download(&target.url).await?;
        let incoming = self.merger.parse(&bytes).map_err(StorageError::from)?;

        let mut merged = 0usize;
        let mut last_error = None;

        for token in incoming.distinct_values(self.merger.date_column) {
            let Some(partition) = report_partition(&token) else {
                debug!("Ignoring rows with unparsable date '{}' in {}", token, target.file_name);
                continue;
            };

            match self
                .merge_partition(&incoming, &token, &partition, &target.file_name)
                .await
            {
                Ok(()) => merged += 1,
                Err(e) => {
                    warn!("Partition {} of {} skipped: {}", partition, target.file_name, e);
                    last_error = Some(e);
                }
            }
        }

        match (merged, last_error) {
            (0, Some(e)) => Err(StoreError::Storage(e)),
            (0, None) => {
                debug!("No dated rows in {}", target.file_name);
                Ok(StoreOutcome::Empty)
            }
            (n, _) => {
                info!("Merged {} into {} partitions", target.file_name, n);
                Ok(StoreOutcome::Stored)
            }
        }
    }
}
