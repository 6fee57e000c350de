//! Bounded retrieval of file-link candidates.

use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;
use url::Url;

use crate::{analysis, http_client::HttpClientPool, models::scan::FileLink};

/// Errors from a single file download. A failed download skips the file; it
/// never fails the scan.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The link could not be resolved to a URL.
    #[error("Invalid file URL: {0}")]
    InvalidUrl(String),

    /// The transfer failed on the wire.
    #[error("Download request failed: {0}")]
    Request(String),

    /// The server answered with a non-success status.
    #[error("Download rejected with HTTP status {0}")]
    HttpStatus(u16),

    /// The file exceeded the configured size cap.
    #[error("File exceeded the {limit} byte size cap")]
    TooLarge {
        /// The configured cap.
        limit: u64,
    },
}

/// A retrieved file ready for forensic analysis.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    /// URL the file was retrieved from.
    pub file_url: String,
    /// Sanitised name derived from the URL path.
    pub file_name: String,
    /// Declared content type.
    pub content_type: String,
    /// File contents.
    pub bytes: Vec<u8>,
}

impl DownloadedFile {
    /// Size of the retrieved file in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Retrieves one file-link candidate.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FileDownloader: Send + Sync {
    /// Resolves the link against the page URL and retrieves it, routing
    /// through the anonymising proxy for hidden services.
    async fn download(&self, base: &Url, link: &FileLink) -> Result<DownloadedFile, DownloadError>;
}

/// [`FileDownloader`] backed by the shared client pool.
pub struct HttpDownloader {
    clients: Arc<HttpClientPool>,
    max_bytes: u64,
}

impl HttpDownloader {
    /// Creates a downloader with the given per-file size cap.
    pub fn new(clients: Arc<HttpClientPool>, max_bytes: u64) -> Self {
        Self { clients, max_bytes }
    }
}

#[async_trait]
impl FileDownloader for HttpDownloader {
    async fn download(&self, base: &Url, link: &FileLink) -> Result<DownloadedFile, DownloadError> {
        let url = base.join(&link.url).map_err(|e| DownloadError::InvalidUrl(e.to_string()))?;
        let client = self.clients.client_for(&url);

        tracing::debug!(url = %url, "Downloading file");

        let response = client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| DownloadError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DownloadError::HttpStatus(response.status().as_u16()));
        }

        // A declared length over the cap saves the transfer entirely.
        if let Some(length) = response.content_length() {
            if length > self.max_bytes {
                return Err(DownloadError::TooLarge { limit: self.max_bytes });
            }
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        // The cap is re-checked while streaming: Content-Length is advisory.
        let mut bytes: Vec<u8> = Vec::new();
        let mut response = response;
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    bytes.extend_from_slice(&chunk);
                    if bytes.len() as u64 > self.max_bytes {
                        return Err(DownloadError::TooLarge { limit: self.max_bytes });
                    }
                }
                Ok(None) => break,
                Err(e) => return Err(DownloadError::Request(e.to_string())),
            }
        }

        let file_name = safe_file_name(&url);
        tracing::info!(url = %url, size = bytes.len(), file_name = %file_name, "Downloaded file");

        Ok(DownloadedFile { file_url: url.to_string(), file_name, content_type, bytes })
    }
}

/// Derives a filesystem-safe name from the URL path, falling back to a hash
/// prefix when the path has no usable segment.
pub fn safe_file_name(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("")
        .to_string();

    let cleaned: String =
        segment.chars().filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')).collect();

    if cleaned.is_empty() {
        analysis::sha256_hex(url.as_str().as_bytes())[..12].to_string()
    } else {
        cleaned.chars().take(100).collect()
    }
}
