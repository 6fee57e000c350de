//! Page acquisition with status classification.
//!
//! The fetcher never fails outward: every exceptional condition maps to a
//! [`UrlStatus`] on the returned outcome. One attempt per call; retries are a
//! scheduler concern.

use std::{collections::HashMap, sync::Arc, time::Instant};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::{
    http_client::HttpClientPool,
    models::{scan::UrlStatus, target::Target},
};

/// The result of one fetch attempt.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Outcome classification.
    pub url_status: UrlStatus,
    /// HTTP status code, when a response arrived.
    pub status_code: Option<u16>,
    /// Wall-clock seconds until the outcome was known.
    pub response_time_seconds: f64,
    /// Declared content type, when a response arrived.
    pub content_type: Option<String>,
    /// Response headers, lowercased names.
    pub response_headers: HashMap<String, String>,
    /// Raw body bytes, when a response body was read.
    pub content_bytes: Option<Vec<u8>>,
    /// Decoded text body, only for textual content types.
    pub text: Option<String>,
}

impl FetchOutcome {
    /// An outcome with no response content.
    pub fn failure(url_status: UrlStatus, status_code: Option<u16>, elapsed: f64) -> Self {
        Self {
            url_status,
            status_code,
            response_time_seconds: elapsed,
            content_type: None,
            response_headers: HashMap::new(),
            content_bytes: None,
            text: None,
        }
    }

    /// The decoded text, if the page was ONLINE with a non-empty body.
    pub fn page_text(&self) -> Option<&str> {
        if self.url_status != UrlStatus::Online {
            return None;
        }
        self.text.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// Fetches one page and classifies the outcome.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Issues a single GET for the target, routing hidden services through
    /// the anonymising proxy.
    async fn fetch(&self, target: &Target) -> FetchOutcome;
}

/// [`PageFetcher`] backed by the shared client pool.
pub struct HttpFetcher {
    clients: Arc<HttpClientPool>,
    max_body_bytes: u64,
}

impl HttpFetcher {
    /// Creates a fetcher with the given body size cap.
    pub fn new(clients: Arc<HttpClientPool>, max_body_bytes: u64) -> Self {
        Self { clients, max_body_bytes }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, target: &Target) -> FetchOutcome {
        let start = Instant::now();
        let client = self.clients.client_for(target.url());

        let response = match client.get(target.url().clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                let status = classify_request_error(&e);
                tracing::warn!(target = %target.as_str(), error = %e, status = %status, "Fetch failed");
                return FetchOutcome::failure(status, None, elapsed_secs(start));
            }
        };

        let http_status = response.status();
        let status_code = Some(http_status.as_u16());
        let response_headers = collect_headers(&response);
        let content_type = response_headers.get("content-type").cloned();

        if !(http_status.is_success() || http_status.is_redirection()) {
            tracing::warn!(target = %target.as_str(), code = http_status.as_u16(), "Fetch returned error status");
            return FetchOutcome {
                url_status: UrlStatus::Error,
                status_code,
                response_time_seconds: elapsed_secs(start),
                content_type,
                response_headers,
                content_bytes: None,
                text: None,
            };
        }

        // Read the body incrementally so the size cap applies while streaming.
        let mut body: Vec<u8> = Vec::new();
        let mut response = response;
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    body.extend_from_slice(&chunk);
                    if body.len() as u64 > self.max_body_bytes {
                        tracing::warn!(
                            target = %target.as_str(),
                            cap = self.max_body_bytes,
                            "Response exceeded size cap"
                        );
                        return FetchOutcome {
                            url_status: UrlStatus::Error,
                            status_code,
                            response_time_seconds: elapsed_secs(start),
                            content_type,
                            response_headers,
                            content_bytes: None,
                            text: None,
                        };
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let status = classify_request_error(&e);
                    tracing::warn!(target = %target.as_str(), error = %e, "Body read failed");
                    return FetchOutcome {
                        url_status: status,
                        status_code,
                        response_time_seconds: elapsed_secs(start),
                        content_type,
                        response_headers,
                        content_bytes: None,
                        text: None,
                    };
                }
            }
        }

        let elapsed = elapsed_secs(start);

        if !is_textual(content_type.as_deref()) {
            // Binary payload: ONLINE with bytes, nothing for the parser.
            return FetchOutcome {
                url_status: UrlStatus::Online,
                status_code,
                response_time_seconds: elapsed,
                content_type,
                response_headers,
                content_bytes: Some(body),
                text: None,
            };
        }

        match String::from_utf8(body) {
            Ok(text) => {
                tracing::info!(target = %target.as_str(), elapsed, "Fetch ONLINE");
                FetchOutcome {
                    url_status: UrlStatus::Online,
                    status_code,
                    response_time_seconds: elapsed,
                    content_type,
                    response_headers,
                    content_bytes: Some(text.clone().into_bytes()),
                    text: Some(text),
                }
            }
            Err(e) => {
                tracing::warn!(target = %target.as_str(), "Body is not valid UTF-8");
                FetchOutcome {
                    url_status: UrlStatus::Error,
                    status_code,
                    response_time_seconds: elapsed,
                    content_type,
                    response_headers,
                    content_bytes: Some(e.into_bytes()),
                    text: None,
                }
            }
        }
    }
}

/// Maps a transport error onto the status taxonomy: deadlines become TIMEOUT,
/// refused or unreachable connections become OFFLINE, the rest is ERROR.
fn classify_request_error(e: &reqwest::Error) -> UrlStatus {
    if e.is_timeout() {
        UrlStatus::Timeout
    } else if e.is_connect() {
        UrlStatus::Offline
    } else {
        UrlStatus::Error
    }
}

/// Whether a decoded text body should be produced for this content type.
/// Absent content types are treated as textual.
fn is_textual(content_type: Option<&str>) -> bool {
    match content_type {
        None => true,
        Some(value) => {
            let value = value.to_ascii_lowercase();
            value.starts_with("text/")
                || value.starts_with("application/json")
                || value.starts_with("application/xml")
        }
    }
}

fn collect_headers(response: &reqwest::Response) -> HashMap<String, String> {
    response
        .headers()
        .iter()
        .map(|(name, value)| {
            (name.as_str().to_string(), String::from_utf8_lossy(value.as_bytes()).into_owned())
        })
        .collect()
}

fn elapsed_secs(start: Instant) -> f64 {
    start.elapsed().as_secs_f64()
}
