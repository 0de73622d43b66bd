//! Runs every feed as its own task.
//!
//! A feed that panics is restarted on its own after its retry interval.
//! A fatal storage error in any feed stops them all.

use std::sync::Arc;

use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};

use super::{AcquisitionCycle, SyncError};
use crate::models::{CycleSummary, FeedKind};

/// Aborts the wrapped task when dropped, so stopping a supervisor stops its feed.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Keep one feed alive. Returns only when the feed reports a fatal error.
async fn supervise(cycle: Arc<AcquisitionCycle>) -> Result<(), SyncError> {
    let kind = cycle.kind();
    let mut restarts = 0u32;

    loop {
        let task = cycle.clone();
        let mut handle = AbortOnDrop(tokio::spawn(async move { task.run_forever().await }));

        match (&mut handle.0).await {
            Ok(result) => return result,
            Err(e) if e.is_panic() => {
                restarts += 1;
                error!(
                    "{} feed panicked (restart #{}), restarting in {:?}",
                    kind,
                    restarts,
                    cycle.settings().crawl_retry_interval
                );
                tokio::time::sleep(cycle.settings().crawl_retry_interval).await;
            }
            Err(e) => {
                warn!("{} feed task cancelled: {}", kind, e);
                return Ok(());
            }
        }
    }
}

/// Run the given feeds until one of them fails fatally.
pub async fn run_feeds(cycles: Vec<AcquisitionCycle>) -> Result<(), SyncError> {
    let mut tasks = JoinSet::new();

    for cycle in cycles {
        info!("Spawning {} feed", cycle.kind());
        tasks.spawn(supervise(Arc::new(cycle)));
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("Stopping all feeds: {}", e);
                tasks.abort_all();
                return Err(e);
            }
            Err(e) => error!("Feed supervisor failed: {}", e),
        }
    }

    Ok(())
}

/// Run a single cycle of each feed concurrently, returning results in input order.
pub async fn run_cycles_once(
    cycles: Vec<AcquisitionCycle>,
) -> Vec<(FeedKind, Result<CycleSummary, SyncError>)> {
    let handles: Vec<_> = cycles
        .into_iter()
        .map(|cycle| {
            let kind = cycle.kind();
            (kind, tokio::spawn(async move { cycle.run_once().await }))
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for (kind, handle) in handles {
        match handle.await {
            Ok(result) => results.push((kind, result)),
            Err(e) => error!("{} cycle task failed: {}", kind, e),
        }
    }
    results
}
