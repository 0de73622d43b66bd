//! Once-per-cycle host resolution.
//!
//! Each cycle looks the feed's host up once and rewrites its base URL to the
//! numeric address, so a cycle issuing thousands of requests generates a
//! single lookup against the resolver.

use std::net::IpAddr;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("URL has no host: {0}")]
    NoHost(Url),

    #[error("Failed to resolve {host}: {source}")]
    Lookup {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No addresses found for {0}")]
    NoAddress(String),

    #[error("Cannot use a numeric host in {0}")]
    Substitute(Url),
}

/// Return `url` with its host replaced by a resolved address.
///
/// URLs that already carry a numeric host are returned unchanged.
pub async fn resolve_base_url(url: &Url) -> Result<Url, ResolveError> {
    let host = match url.host_str() {
        Some(host) => host.to_string(),
        None => return Err(ResolveError::NoHost(url.clone())),
    };

    if host.trim_matches(|c| c == '[' || c == ']').parse::<IpAddr>().is_ok() {
        return Ok(url.clone());
    }

    let port = url.port_or_known_default().unwrap_or(443);
    let addrs: Vec<_> = tokio::net::lookup_host((host.as_str(), port))
        .await
        .map_err(|source| ResolveError::Lookup {
            host: host.clone(),
            source,
        })?
        .collect();

    let ip = addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .map(|addr| addr.ip())
        .ok_or_else(|| ResolveError::NoAddress(host.clone()))?;

    let mut resolved = url.clone();
    resolved
        .set_ip_host(ip)
        .map_err(|_| ResolveError::Substitute(url.clone()))?;

    debug!("Resolved {} to {}", host, ip);
    Ok(resolved)
}

/// Turns a feed's configured base URL into the URL a cycle crawls.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, url: &Url) -> Result<Url, ResolveError>;
}

/// Resolves through the operating system with [`resolve_base_url`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, url: &Url) -> Result<Url, ResolveError> {
        resolve_base_url(url).await
    }
}
