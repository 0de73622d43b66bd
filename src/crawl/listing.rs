//! Directory-index page listing.

use std::sync::Arc;

use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use super::{CrawlTarget, ListingError};
use crate::config::ListingConfig;
use crate::fetch::Transport;

/// One anchor found on an index page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryLink {
    /// Base URL concatenated with the href
    pub url: String,

    /// The synthetic "up one level" link
    pub is_parent: bool,

    /// An alias such as `LATEST` rather than a real entry
    pub is_placeholder: bool,
}

/// Extract every anchor href from an index page, in document order.
pub fn parse_links(html: &str, base_url: &Url, markers: &ListingConfig) -> Vec<DirectoryLink> {
    let document = Html::parse_document(html);
    let anchor_sel = Selector::parse("a[href]").unwrap();

    document
        .select(&anchor_sel)
        .filter_map(|anchor| anchor.value().attr("href"))
        .map(|href| DirectoryLink {
            url: format!("{}{}", base_url.as_str(), href),
            is_parent: href == markers.parent_marker || href == "..",
            is_placeholder: href.contains(&markers.placeholder_marker),
        })
        .collect()
}

/// Last non-empty path segment of a URL: the file or directory name.
pub fn link_name(url: &Url) -> &str {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .unwrap_or("")
}

/// Fetches index pages and returns the real child links they expose.
#[derive(Clone)]
pub struct LinkLister {
    transport: Arc<dyn Transport>,
    markers: ListingConfig,
}

impl LinkLister {
    pub fn new(transport: Arc<dyn Transport>, markers: ListingConfig) -> Self {
        Self { transport, markers }
    }

    /// List one page, dropping the parent link and placeholder aliases.
    ///
    /// No retry happens here; callers decide how to retry.
    pub async fn list(&self, url: &Url) -> Result<Vec<Url>, ListingError> {
        let html = self
            .transport
            .get_text(url)
            .await
            .map_err(|source| ListingError {
                url: url.clone(),
                source,
            })?;

        let links = parse_links(&html, url, &self.markers)
            .into_iter()
            .filter(|link| !link.is_parent && !link.is_placeholder)
            .filter_map(|link| match Url::parse(&link.url) {
                Ok(u) => Some(u),
                Err(e) => {
                    debug!("Ignoring unparsable link {}: {}", link.url, e);
                    None
                }
            })
            .collect::<Vec<_>>();

        debug!("Listed {} links under {}", links.len(), url);
        Ok(links)
    }

    /// Flat listing: one level, keeping only files ending in `suffix`.
    pub async fn list_files(&self, url: &Url, suffix: &str) -> Result<Vec<CrawlTarget>, ListingError> {
        Ok(self
            .list(url)
            .await?
            .into_iter()
            .filter(|link| link.path().ends_with(suffix))
            .filter_map(CrawlTarget::from_url)
            .collect())
    }

    /// Subdirectory links of one page, by name.
    pub async fn list_directories(&self, url: &Url) -> Result<Vec<String>, ListingError> {
        Ok(self
            .list(url)
            .await?
            .iter()
            .filter(|link| link.path().ends_with('/'))
            .map(|link| link_name(link).to_string())
            .filter(|name| !name.is_empty())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::mock::MockTransport;

    const INDEX: &str = r#"<html><head><title>Index of /weather/poi/</title></head>
<body><h1>Index of /weather/poi/</h1><hr><pre>
<a href="../">../</a>
<a href="10381-BEOB.csv">10381-BEOB.csv</a>     16-Oct-2026 10:02    41K
<a href="MOSMIX_L_LATEST_10381.kmz">MOSMIX_L_LATEST_10381.kmz</a>
<a href="P263-BEOB.csv">P263-BEOB.csv</a>       16-Oct-2026 10:02    38K
<a href="archive/">archive/</a>
<a name="no-href">anchor without href</a>
</pre><hr></body></html>"#;

    fn base() -> Url {
        Url::parse("https://192.0.2.1/weather/poi/").unwrap()
    }

    #[test]
    fn test_parse_links_flags_markers() {
        let links = parse_links(INDEX, &base(), &ListingConfig::default());

        assert_eq!(links.len(), 5);
        assert!(links[0].is_parent);
        assert_eq!(links[1].url, "https://192.0.2.1/weather/poi/10381-BEOB.csv");
        assert!(!links[1].is_parent && !links[1].is_placeholder);
        assert!(links[2].is_placeholder);
        assert_eq!(links[4].url, "https://192.0.2.1/weather/poi/archive/");
    }

    #[test]
    fn test_link_name() {
        let file = Url::parse("https://192.0.2.1/a/b/file.csv").unwrap();
        let dir = Url::parse("https://192.0.2.1/a/b/").unwrap();

        assert_eq!(link_name(&file), "file.csv");
        assert_eq!(link_name(&dir), "b");
    }

    #[tokio::test]
    async fn test_list_excludes_parent_and_placeholder() {
        let mock = MockTransport::new().with_body(base().as_str(), INDEX);
        let lister = LinkLister::new(Arc::new(mock), ListingConfig::default());

        let urls: Vec<String> = lister
            .list(&base())
            .await
            .unwrap()
            .into_iter()
            .map(String::from)
            .collect();

        assert_eq!(
            urls,
            vec![
                "https://192.0.2.1/weather/poi/10381-BEOB.csv",
                "https://192.0.2.1/weather/poi/P263-BEOB.csv",
                "https://192.0.2.1/weather/poi/archive/",
            ]
        );
    }

    #[tokio::test]
    async fn test_list_files_and_directories() {
        let mock = MockTransport::new().with_body(base().as_str(), INDEX);
        let lister = LinkLister::new(Arc::new(mock), ListingConfig::default());

        let files = lister.list_files(&base(), ".csv").await.unwrap();
        let names: Vec<&str> = files.iter().map(|t| t.file_name.as_str()).collect();
        assert_eq!(names, vec!["10381-BEOB.csv", "P263-BEOB.csv"]);

        let dirs = lister.list_directories(&base()).await.unwrap();
        assert_eq!(dirs, vec!["archive".to_string()]);
    }

    #[tokio::test]
    async fn test_list_failure_is_listing_error() {
        let lister = LinkLister::new(Arc::new(MockTransport::new()), ListingConfig::default());

        let err = lister.list(&base()).await.unwrap_err();
        assert_eq!(err.url, base());
    }
}
