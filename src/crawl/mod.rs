//! Directory-index crawling.
//!
//! [`LinkLister`] turns one index page into child links. Flat feeds use a
//! single listing; the grid feed walks the whole tree with [`GridCrawler`].

mod grid;
mod listing;

pub use grid::{CrawlLimits, GridCrawler, GridRules, LinkClass};
pub use listing::{link_name, parse_links, DirectoryLink, LinkLister};

use thiserror::Error;
use url::Url;

use crate::fetch::FetchError;

/// A directory page could not be fetched.
#[derive(Debug, Error)]
#[error("Listing of {url} failed: {source}")]
pub struct ListingError {
    pub url: Url,
    #[source]
    pub source: FetchError,
}

/// A URL admitted as a file to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTarget {
    pub url: Url,

    /// Last path segment of the URL
    pub file_name: String,
}

impl CrawlTarget {
    /// Build a target from a file URL. Directory URLs (trailing `/`) yield `None`.
    pub fn from_url(url: Url) -> Option<Self> {
        let file_name = url.path_segments()?.last()?.to_string();
        if file_name.is_empty() {
            return None;
        }
        Some(Self { url, file_name })
    }

    /// Name of the directory that holds the file.
    pub fn parent_name(&self) -> Option<&str> {
        let mut segments = self.url.path_segments()?.rev();
        segments.next()?;
        segments.next().filter(|s| !s.is_empty())
    }
}
