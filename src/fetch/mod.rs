//! HTTP fetching with bounded retry.
//!
//! The network sits behind the [`Transport`] trait. [`HttpTransport`] is the
//! production implementation; [`Fetcher`] layers the per-file retry policy on
//! top of any transport.

mod resolve;
mod retry;

#[cfg(test)]
pub(crate) mod mock;

pub use resolve::{resolve_base_url, ResolveError, Resolver, SystemResolver};
pub use retry::{with_retries, RetryExhausted, RetryPolicy};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Errors from a single HTTP request.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },
}

/// A file download that still failed after every retry.
#[derive(Debug, Error)]
#[error("Download of {url} failed after {attempts} attempts: {source}")]
pub struct DownloadError {
    pub url: Url,
    pub attempts: u32,
    #[source]
    pub source: FetchError,
}

/// Source of raw bytes for a URL.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name for logging.
    fn name(&self) -> &'static str;

    /// GET the full body of `url`.
    async fn get_bytes(&self, url: &Url) -> Result<Vec<u8>, FetchError>;

    /// GET `url` as text. Invalid UTF-8 is replaced rather than rejected.
    async fn get_text(&self, url: &Url) -> Result<String, FetchError> {
        let bytes = self.get_bytes(url).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Configuration for the HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Request timeout
    pub timeout: Duration,

    /// User agent string
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            user_agent: format!("weather-mirror/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// reqwest-backed transport.
///
/// Certificate validation is off: requests go to a numeric address
/// substituted for the host name, and the upstream chain is not expected to
/// validate in any case.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &HttpConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .unwrap_or_else(|_| HeaderValue::from_static("weather-mirror")),
        );

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn get_bytes(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        debug!("GET {}", url);

        let response = self.client.get(url.as_str()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Downloads whole files through a transport, retrying failures.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// Download the full content of `url`.
    ///
    /// Retries up to `policy.max_retries` more times with a fixed delay,
    /// logging each failure. The caller is expected to skip the file on error.
    pub async fn download(&self, url: &Url) -> Result<Vec<u8>, DownloadError> {
        debug!("Downloading {} via {}", url, self.transport.name());
        let what = format!("Download of {}", url);
        with_retries(&self.policy, &what, || self.transport.get_bytes(url))
            .await
            .map_err(|exhausted| DownloadError {
                url: url.clone(),
                attempts: exhausted.attempts,
                source: exhausted.error,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockTransport;
    use super::*;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_http_config_default() {
        let config = HttpConfig::default();

        assert_eq!(config.timeout, Duration::from_secs(60));
        assert!(config.user_agent.starts_with("weather-mirror/"));
    }

    #[test]
    fn test_http_transport_builds() {
        let transport = HttpTransport::new(&HttpConfig::default()).unwrap();
        assert_eq!(transport.name(), "http");
    }

    #[tokio::test]
    async fn test_download_succeeds_after_transient_failures() {
        let url = Url::parse("https://10.0.0.1/data/file.kmz").unwrap();
        let mock = Arc::new(
            MockTransport::new()
                .with_body(url.as_str(), b"payload".to_vec())
                .with_failures(url.as_str(), 2),
        );
        let fetcher = Fetcher::new(mock.clone(), fast_policy());

        let bytes = tokio_test::assert_ok!(fetcher.download(&url).await);

        assert_eq!(bytes, b"payload");
        assert_eq!(mock.request_count(url.as_str()), 3);
    }

    #[tokio::test]
    async fn test_download_gives_up_after_four_attempts() {
        let url = Url::parse("https://10.0.0.1/data/file.kmz").unwrap();
        let mock = Arc::new(
            MockTransport::new()
                .with_body(url.as_str(), b"payload".to_vec())
                .with_failures(url.as_str(), 4),
        );
        let fetcher = Fetcher::new(mock.clone(), fast_policy());

        let err = fetcher.download(&url).await.unwrap_err();

        assert_eq!(err.attempts, 4);
        assert_eq!(err.url, url);
        assert!(matches!(
            err.source,
            FetchError::HttpStatus { status: 503, .. }
        ));
        assert_eq!(mock.request_count(url.as_str()), 4);
    }

    #[tokio::test]
    async fn test_get_text_is_lossy() {
        let url = Url::parse("https://10.0.0.1/index/").unwrap();
        let mock = MockTransport::new().with_body(url.as_str(), vec![b'o', b'k', 0xff]);

        let text = mock.get_text(&url).await.unwrap();
        assert!(text.starts_with("ok"));
    }
}
