//! Target URLs and their normalised fingerprints.

use thiserror::Error;
use url::Url;

/// Errors produced while validating a target URL.
#[derive(Debug, Error)]
pub enum TargetError {
    /// The input could not be parsed as a URL at all.
    #[error("Invalid URL '{0}'. Include http:// or https://")]
    Unparseable(String),

    /// The URL parsed but uses a scheme other than http/https.
    #[error("Unsupported URL scheme '{0}', only http and https are scanned")]
    UnsupportedScheme(String),
}

/// A validated scan target.
///
/// Parsing normalises the URL (lowercased scheme and host, default port
/// removed), which makes [`Target::fingerprint`] a stable grouping key for
/// scan history.
#[derive(Debug, Clone)]
pub struct Target {
    url: Url,
}

impl Target {
    /// Parses and validates a user-supplied URL.
    pub fn parse(input: &str) -> Result<Self, TargetError> {
        let trimmed = input.trim();
        let url =
            Url::parse(trimmed).map_err(|_| TargetError::Unparseable(trimmed.to_string()))?;
        match url.scheme() {
            "http" | "https" => Ok(Self { url }),
            other => Err(TargetError::UnsupportedScheme(other.to_string())),
        }
    }

    /// The parsed URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The normalised URL string.
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Whether this target is a hidden service and must be routed through the
    /// anonymising proxy.
    pub fn is_onion(&self) -> bool {
        is_onion(&self.url)
    }

    /// Stable normalised form of the URL, used as the history grouping key.
    pub fn fingerprint(&self) -> String {
        self.url.as_str().to_string()
    }
}

/// Returns true when the URL host is a `.onion` hidden service.
pub fn is_onion(url: &Url) -> bool {
    url.host_str().is_some_and(|h| h.ends_with(".onion"))
}
