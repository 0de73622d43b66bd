//! # Weather Mirror
//!
//! Periodically mirrors weather open-data directory listings into a local,
//! date-partitioned file store.
//!
//! ## Architecture
//!
//! - **crawl**: Directory-index link listing and recursive grid crawling
//! - **fetch**: HTTP transport, bounded-retry downloads, per-cycle host resolution
//! - **storage**: On-disk layout, CSV partition merging, grid transcoding
//! - **sync**: The per-feed acquisition cycle (grid, forecast, report)
//! - **notify**: Fire-and-forget cycle summaries over UDP
//! - **config**: Configuration loading and validation

pub mod config;
pub mod crawl;
pub mod fetch;
pub mod models;
pub mod notify;
pub mod storage;
pub mod sync;

pub use models::*;

use std::time::Duration;

/// Parse a human-friendly duration string (e.g., "6h", "30m", "90s").
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let (num_str, multiplier) = if let Some(n) = s.strip_suffix('h') {
        (n, 3600)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1)
    } else {
        // Default to seconds
        (s, 1)
    };

    let num: u64 = num_str.parse().ok()?;
    Some(Duration::from_secs(num * multiplier))
}
