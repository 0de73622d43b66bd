//! Per-cycle outcome tracking.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::FeedKind;

/// What happened to a single crawl target during a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// The target was downloaded and persisted.
    Stored,
    /// The target already exists on disk; nothing was fetched.
    AlreadyPresent,
    /// The target was fetched but held nothing to store.
    Empty,
}

/// Result of one complete acquisition cycle for a feed.
#[derive(Debug, Clone)]
pub struct CycleSummary {
    pub feed: FeedKind,

    /// Number of crawl targets discovered
    pub targets: usize,

    /// Targets newly stored this cycle
    pub stored: usize,

    /// Targets already on disk, or fetched with nothing to store
    pub skipped: usize,

    /// Targets that failed and were left for the next cycle
    pub failed: usize,

    pub duration: Duration,
}

impl CycleSummary {
    pub fn new(feed: FeedKind, targets: usize) -> Self {
        Self {
            feed,
            targets,
            stored: 0,
            skipped: 0,
            failed: 0,
            duration: Duration::ZERO,
        }
    }

    /// Account for one processed target.
    pub fn record(&mut self, outcome: StoreOutcome) {
        match outcome {
            StoreOutcome::Stored => self.stored += 1,
            StoreOutcome::AlreadyPresent | StoreOutcome::Empty => self.skipped += 1,
        }
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    /// The broadcast message announcing this cycle.
    pub fn notification(&self) -> CycleNotification {
        CycleNotification {
            feed: self.feed,
            new_files: self.stored,
        }
    }
}

/// Payload of the fire-and-forget datagram sent after each cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleNotification {
    pub feed: FeedKind,
    pub new_files: usize,
}
