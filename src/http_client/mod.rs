//! Shared HTTP clients for page fetching and file downloads.
//!
//! Two clients are built at startup: a direct one for clearnet targets and
//! one routed through the SOCKS5 anonymising proxy for `.onion` hosts. The
//! proxy is treated as a stateless external service.

use std::time::Duration;

use reqwest::{Client, Proxy};
use thiserror::Error;
use url::Url;

use crate::models::target;

/// Errors from building the HTTP clients.
#[derive(Debug, Error)]
pub enum HttpClientError {
    /// The configured proxy address was rejected by the client builder.
    #[error("Invalid anonymising proxy address: {0}")]
    InvalidProxy(String),

    /// The underlying client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),
}

/// Browser user agents rotated across outbound requests.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:137.0) Gecko/20100101 Firefox/137.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.7; rv:137.0) Gecko/20100101 Firefox/137.0",
];

/// Picks a random user agent from the rotation list.
pub fn random_user_agent() -> &'static str {
    use rand::Rng;
    let idx = rand::thread_rng().gen_range(0..USER_AGENTS.len());
    USER_AGENTS[idx]
}

/// Holds the direct and proxied clients and selects between them per URL.
#[derive(Debug, Clone)]
pub struct HttpClientPool {
    direct: Client,
    proxied: Client,
}

impl HttpClientPool {
    /// Builds both clients with the given proxy address and request deadline.
    pub fn new(anon_proxy_addr: &str, timeout: Duration) -> Result<Self, HttpClientError> {
        let direct = base_builder(timeout)
            .build()
            .map_err(|e| HttpClientError::ClientBuild(e.to_string()))?;

        let proxy = Proxy::all(anon_proxy_addr)
            .map_err(|e| HttpClientError::InvalidProxy(e.to_string()))?;
        let proxied = base_builder(timeout)
            .proxy(proxy)
            .build()
            .map_err(|e| HttpClientError::ClientBuild(e.to_string()))?;

        Ok(Self { direct, proxied })
    }

    /// Returns the client appropriate for the URL: proxied for hidden
    /// services, direct otherwise.
    pub fn client_for(&self, url: &Url) -> &Client {
        if target::is_onion(url) {
            &self.proxied
        } else {
            &self.direct
        }
    }
}

fn base_builder(timeout: Duration) -> reqwest::ClientBuilder {
    Client::builder()
        .timeout(timeout)
        .user_agent(random_user_agent())
        // Hidden services commonly present self-signed certificates.
        .danger_accept_invalid_certs(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_builds_with_default_proxy_address() {
        let pool = HttpClientPool::new("socks5h://127.0.0.1:9050", Duration::from_secs(30));
        assert!(pool.is_ok());
    }

    #[test]
    fn invalid_proxy_address_is_rejected() {
        let pool = HttpClientPool::new("not a proxy", Duration::from_secs(30));
        assert!(matches!(pool, Err(HttpClientError::InvalidProxy(_))));
    }

    #[test]
    fn user_agent_rotation_yields_browser_strings() {
        assert!(random_user_agent().contains("Mozilla"));
    }
}
