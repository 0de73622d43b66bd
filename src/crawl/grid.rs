//! Recursive crawl of the model-grid directory tree.

use std::collections::HashSet;

use tracing::{debug, info, warn};
use url::Url;

use super::listing::{link_name, LinkLister};
use super::{CrawlTarget, ListingError};
use crate::config::GridConfig;
use crate::fetch::{with_retries, RetryPolicy};

/// File-name rules deciding what the grid crawl admits and enters.
#[derive(Debug, Clone)]
pub struct GridRules {
    pub file_suffix: String,
    pub required_markers: Vec<String>,
    pub excluded_markers: Vec<String>,
}

/// How one link is treated by the crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkClass {
    /// A grid file carrying every required marker
    Target,
    /// A grid file missing a required marker; dropped silently
    Rejected,
    /// A directory to descend into
    Directory,
    /// A directory for an excluded model variant
    ExcludedDirectory,
}

impl GridRules {
    pub fn from_config(config: &GridConfig) -> Self {
        Self {
            file_suffix: config.file_suffix.clone(),
            required_markers: config.required_markers.clone(),
            excluded_markers: config.excluded_markers.clone(),
        }
    }

    /// Classify a link by its name. Anything not ending in the file suffix is a directory.
    pub fn classify(&self, name: &str) -> LinkClass {
        if name.ends_with(&self.file_suffix) {
            if self.required_markers.iter().all(|m| name.contains(m.as_str())) {
                LinkClass::Target
            } else {
                LinkClass::Rejected
            }
        } else if self.excluded_markers.iter().any(|m| name.contains(m.as_str())) {
            LinkClass::ExcludedDirectory
        } else {
            LinkClass::Directory
        }
    }
}

/// Optional ceilings against an unexpectedly deep or wide remote tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrawlLimits {
    /// Directories deeper than this below the root are not entered
    pub max_depth: Option<usize>,

    /// Stop entering directories once this many pages have been listed
    pub max_listings: Option<usize>,
}

struct Frame {
    depth: usize,
    links: std::vec::IntoIter<Url>,
}

/// Depth-first crawler over nested index pages.
///
/// Uses an explicit stack of partially consumed listings, so targets come
/// out in the order a recursive walk would discover them.
pub struct GridCrawler {
    lister: LinkLister,
    rules: GridRules,
    retry: RetryPolicy,
    limits: CrawlLimits,
}

impl GridCrawler {
    /// Each page fetch is retried immediately up to three more times.
    pub fn new(lister: LinkLister, rules: GridRules) -> Self {
        Self {
            lister,
            rules,
            retry: RetryPolicy::immediate(3),
            limits: CrawlLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: CrawlLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Walk everything below `root` and return the admitted files.
    ///
    /// A page that still fails after its retries aborts the whole crawl.
    /// Each page is listed at most once and each file is admitted at most
    /// once, so self links (`./`) and sort links (`?C=N;O=D`) cannot loop.
    pub async fn crawl(&self, root: &Url) -> Result<Vec<CrawlTarget>, ListingError> {
        let mut targets = Vec::new();
        let mut admitted: HashSet<Url> = HashSet::new();
        let mut visited: HashSet<Url> = HashSet::from([page_url(root)]);
        let mut listings = 1usize;
        let mut ceiling_logged = false;

        let mut stack = vec![Frame {
            depth: 0,
            links: self.list_with_retry(root).await?.into_iter(),
        }];

        loop {
            let Some(frame) = stack.last_mut() else {
                break;
            };
            let depth = frame.depth;
            let Some(link) = frame.links.next() else {
                stack.pop();
                continue;
            };

            match self.rules.classify(link_name(&link)) {
                LinkClass::Target => {
                    if !admitted.insert(link.clone()) {
                        continue;
                    }
                    if let Some(target) = CrawlTarget::from_url(link) {
                        targets.push(target);
                    }
                }
                LinkClass::Rejected => {}
                LinkClass::ExcludedDirectory => {
                    debug!("Skipping excluded directory {}", link);
                }
                LinkClass::Directory => {
                    let page = page_url(&link);
                    if visited.contains(&page) {
                        debug!("Already listed {}", page);
                        continue;
                    }
                    if self.limits.max_depth.is_some_and(|max| depth >= max) {
                        warn!("Not entering {}: depth limit {} reached", link, depth);
                        continue;
                    }
                    if self.limits.max_listings.is_some_and(|max| listings >= max) {
                        if !ceiling_logged {
                            warn!(
                                "Listing limit of {} pages reached below {}; crawl truncated",
                                listings, root
                            );
                            ceiling_logged = true;
                        }
                        continue;
                    }

                    let children = self.list_with_retry(&page).await?;
                    visited.insert(page);
                    listings += 1;
                    stack.push(Frame {
                        depth: depth + 1,
                        links: children.into_iter(),
                    });
                }
            }
        }

        info!(
            "Crawled {} pages below {}: {} targets",
            listings,
            root,
            targets.len()
        );
        Ok(targets)
    }

    async fn list_with_retry(&self, url: &Url) -> Result<Vec<Url>, ListingError> {
        let what = format!("Listing of {}", url);
        with_retries(&self.retry, &what, || self.lister.list(url))
            .await
            .map_err(|exhausted| exhausted.error)
    }
}

/// The page a directory link lists: query and fragment dropped.
fn page_url(link: &Url) -> Url {
    let mut page = link.clone();
    page.set_query(None);
    page.set_fragment(None);
    page
}
