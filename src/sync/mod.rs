//! Acquisition cycles.
//!
//! Each feed runs its own forever-loop:
//! 1. Resolve the feed host once
//! 2. Crawl for targets, retrying until a listing succeeds
//! 3. Route each target to storage, one file at a time
//! 4. Broadcast a summary
//! 5. Sleep until the next cycle

mod forecast;
mod grid;
mod report;
mod supervisor;

pub use forecast::ForecastFeed;
pub use grid::GridFeed;
pub use report::ReportFeed;
pub use supervisor::{run_cycles_once, run_feeds};

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::config::{AppConfig, ConfigError, FeedSettings};
use crate::crawl::{CrawlTarget, ListingError};
use crate::fetch::{
    DownloadError, Fetcher, ResolveError, Resolver, RetryPolicy, SystemResolver, Transport,
};
use crate::models::{CycleSummary, FeedKind, StoreOutcome};
use crate::notify::Notifier;
use crate::storage::{PartitionError, StorageConfig, StorageError, TranscodeError};

/// Failure storing a single target. Everything but `Fatal` skips just that target.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Download failed: {0}")]
    Download(#[from] DownloadError),

    #[error("Partition error: {0}")]
    Partition(#[from] PartitionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transcode error: {0}")]
    Transcode(#[from] TranscodeError),

    /// Persisting a downloaded file failed; on-disk state is now ambiguous.
    #[error("Fatal storage error: {0}")]
    Fatal(#[source] StorageError),
}

impl StoreError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Fatal(_))
    }
}

/// Errors that end a cycle early.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Host resolution failed: {0}")]
    Resolve(#[from] ResolveError),

    #[error("{feed} feed hit a fatal storage error on {url}: {source}")]
    FatalStorage {
        feed: FeedKind,
        url: Url,
        #[source]
        source: StoreError,
    },
}

/// Feed-specific crawl and storage policy.
#[async_trait]
pub trait Feed: Send + Sync {
    fn kind(&self) -> FeedKind;

    /// Discover this cycle's targets below `root`.
    async fn crawl(&self, root: &Url) -> Result<Vec<CrawlTarget>, ListingError>;

    /// Download and persist one target, unless it is already stored.
    async fn store(&self, target: &CrawlTarget) -> Result<StoreOutcome, StoreError>;
}

/// Build the feed implementation for `kind` from configuration.
pub fn build_feed(
    kind: FeedKind,
    config: &AppConfig,
    transport: Arc<dyn Transport>,
) -> Result<Arc<dyn Feed>, ConfigError> {
    let storage = StorageConfig::new(config.data_dir()?.to_path_buf());
    let feed: Arc<dyn Feed> = match kind {
        FeedKind::Grid => Arc::new(GridFeed::from_config(config, &storage, transport)),
        FeedKind::Forecast => Arc::new(ForecastFeed::from_config(config, &storage, transport)),
        FeedKind::Report => Arc::new(ReportFeed::from_config(config, &storage, transport)?),
    };
    Ok(feed)
}

/// Per-file fetcher using the configured retry budget.
fn download_fetcher(config: &AppConfig, transport: Arc<dyn Transport>) -> Fetcher {
    Fetcher::new(
        transport,
        RetryPolicy {
            max_retries: config.fetch.max_retries,
            delay: config.retry_delay(),
        },
    )
}

/// The forever-loop driving one feed.
pub struct AcquisitionCycle {
    feed: Arc<dyn Feed>,
    settings: FeedSettings,
    notifier: Notifier,
    pacing: Duration,
    resolver: Arc<dyn Resolver>,
}

impl AcquisitionCycle {
    pub fn new(
        feed: Arc<dyn Feed>,
        settings: FeedSettings,
        notifier: Notifier,
        pacing: Duration,
    ) -> Self {
        Self {
            feed,
            settings,
            notifier,
            pacing,
            resolver: Arc::new(SystemResolver),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Build the cycle for `kind` from configuration.
    pub fn from_config(
        kind: FeedKind,
        config: &AppConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(
            build_feed(kind, config, transport)?,
            config.feed_settings(kind)?,
            Notifier::new(&config.notify),
            config.pacing(),
        ))
    }

    pub fn kind(&self) -> FeedKind {
        self.feed.kind()
    }

    pub fn settings(&self) -> &FeedSettings {
        &self.settings
    }

    /// Run one complete cycle: resolve, crawl, store, notify.
    ///
    /// Only resolution failures and fatal storage errors end the cycle
    /// early; every other per-target error is logged and skipped.
    pub async fn run_once(&self) -> Result<CycleSummary, SyncError> {
        let start = Instant::now();
        let kind = self.kind();

        let root = self.resolver.resolve(&self.settings.root_url).await?;
        let targets = self.crawl_until_ok(&root).await;
        info!("{} cycle: {} targets below {}", kind, targets.len(), root);

        let mut summary = CycleSummary::new(kind, targets.len());

        for target in &targets {
            match self.feed.store(target).await {
                Ok(StoreOutcome::AlreadyPresent) => {
                    summary.record(StoreOutcome::AlreadyPresent);
                    continue;
                }
                Ok(outcome) => summary.record(outcome),
                Err(e) if e.is_fatal() => {
                    return Err(SyncError::FatalStorage {
                        feed: kind,
                        url: target.url.clone(),
                        source: e,
                    });
                }
                Err(e) => {
                    error!("{} target {} skipped: {}", kind, target.url, e);
                    summary.record_failure();
                }
            }

            if !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
        }

        summary.duration = start.elapsed();
        info!(
            "{} cycle completed: {} stored, {} skipped, {} failed in {:?}",
            kind, summary.stored, summary.skipped, summary.failed, summary.duration
        );

        self.notifier.notify(&summary.notification()).await;
        Ok(summary)
    }

    /// Repeat the feed's listing until it succeeds. There is no retry limit.
    async fn crawl_until_ok(&self, root: &Url) -> Vec<CrawlTarget> {
        loop {
            match self.feed.crawl(root).await {
                Ok(targets) => return targets,
                Err(e) => {
                    warn!(
                        "{} crawl failed, retrying in {:?}: {}",
                        self.kind(),
                        self.settings.crawl_retry_interval,
                        e
                    );
                    tokio::time::sleep(self.settings.crawl_retry_interval).await;
                }
            }
        }
    }

    /// Run cycles forever. Returns only on a fatal storage error.
    pub async fn run_forever(&self) -> Result<(), SyncError> {
        info!(
            "Starting {} feed from {} (cycle every {:?}, notifications {})",
            self.kind(),
            self.settings.root_url,
            self.settings.cycle_interval,
            if self.notifier.is_enabled() { "on" } else { "off" }
        );

        loop {
            match self.run_once().await {
                Ok(_) => tokio::time::sleep(self.settings.cycle_interval).await,
                Err(SyncError::Resolve(e)) => {
                    error!(
                        "{} cycle aborted, retrying in {:?}: {}",
                        self.kind(),
                        self.settings.crawl_retry_interval,
                        e
                    );
                    tokio::time::sleep(self.settings.crawl_retry_interval).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
