//! Shared fixtures for integration tests: scripted fetchers and downloaders,
//! a flagging signature scanner and a scan-draft builder.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use url::Url;

use crate::{
    downloader::{DownloadError, DownloadedFile, FileDownloader},
    fetcher::{FetchOutcome, PageFetcher},
    forensics::{FileAnalyser, SignatureScanner},
    models::{
        scan::{MalwareScan, RiskLevel, ScanDraft, ThreatIndicators, ThreatSignature, UrlStatus},
        target::Target,
    },
    persistence::traits::Store,
    scanner::ScanPipeline,
};

/// Builds an ONLINE fetch outcome carrying an HTML body.
pub fn online_html(html: &str) -> FetchOutcome {
    let mut outcome = FetchOutcome::failure(UrlStatus::Online, Some(200), 0.2);
    outcome.content_type = Some("text/html".to_string());
    outcome.text = Some(html.to_string());
    outcome.content_bytes = Some(html.as_bytes().to_vec());
    outcome
}

/// Builds a failed fetch outcome with the given status.
pub fn fetch_failure(status: UrlStatus) -> FetchOutcome {
    FetchOutcome::failure(status, None, 30.0)
}

/// A fetcher replaying scripted outcomes per URL. When a URL's queue is down
/// to one outcome it is replayed forever; unknown URLs read as OFFLINE.
#[derive(Default)]
pub struct StaticFetcher {
    outcomes: Mutex<HashMap<String, VecDeque<FetchOutcome>>>,
}

impl StaticFetcher {
    /// Creates an empty fetcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an outcome for a URL.
    pub fn push(&self, url: &str, outcome: FetchOutcome) {
        self.outcomes
            .lock()
            .expect("fetcher lock poisoned")
            .entry(url.to_string())
            .or_default()
            .push_back(outcome);
    }

    /// Builder-style [`StaticFetcher::push`].
    pub fn with(self, url: &str, outcome: FetchOutcome) -> Self {
        self.push(url, outcome);
        self
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&self, target: &Target) -> FetchOutcome {
        let mut outcomes = self.outcomes.lock().expect("fetcher lock poisoned");
        match outcomes.get_mut(target.as_str()) {
            Some(queue) if queue.len() > 1 => queue.pop_front().expect("non-empty queue"),
            Some(queue) => queue.front().cloned().expect("non-empty queue"),
            None => fetch_failure(UrlStatus::Offline),
        }
    }
}

/// A downloader serving files from a fixed map of absolute URLs.
#[derive(Default)]
pub struct StaticDownloader {
    files: HashMap<String, (String, Vec<u8>)>,
}

impl StaticDownloader {
    /// Creates an empty downloader; every request fails.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a file at an absolute URL.
    pub fn with_file(mut self, url: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.files.insert(url.to_string(), (content_type.to_string(), bytes.to_vec()));
        self
    }
}

#[async_trait]
impl FileDownloader for StaticDownloader {
    async fn download(
        &self,
        base: &Url,
        link: &crate::models::scan::FileLink,
    ) -> Result<DownloadedFile, DownloadError> {
        let url = base.join(&link.url).map_err(|e| DownloadError::InvalidUrl(e.to_string()))?;
        let (content_type, bytes) = self
            .files
            .get(url.as_str())
            .ok_or_else(|| DownloadError::HttpStatus(404))?
            .clone();
        Ok(DownloadedFile {
            file_url: url.to_string(),
            file_name: crate::downloader::safe_file_name(&url),
            content_type,
            bytes,
        })
    }
}

/// A signature scanner that flags every file with a fixed threat name.
pub struct FlaggingScanner {
    /// Name reported for every scanned file.
    pub threat_name: String,
}

#[async_trait]
impl SignatureScanner for FlaggingScanner {
    fn available(&self) -> bool {
        true
    }

    async fn scan(&self, _bytes: &[u8]) -> MalwareScan {
        MalwareScan {
            success: true,
            status: "scanned".to_string(),
            detected: true,
            threats: vec![ThreatSignature {
                name: self.threat_name.clone(),
                kind: "signature".to_string(),
            }],
            error: None,
        }
    }
}

/// A signature scanner that reports every file clean.
pub struct CleanScanner;

#[async_trait]
impl SignatureScanner for CleanScanner {
    fn available(&self) -> bool {
        true
    }

    async fn scan(&self, _bytes: &[u8]) -> MalwareScan {
        MalwareScan {
            success: true,
            status: "scanned".to_string(),
            detected: false,
            threats: Vec::new(),
            error: None,
        }
    }
}

/// Wires a pipeline over test components, with native strings/carving
/// providers and a metadata extractor that reads as unavailable.
pub fn test_pipeline(
    store: Arc<dyn Store>,
    fetcher: Arc<dyn PageFetcher>,
    downloader: Arc<dyn FileDownloader>,
    signature: Arc<dyn SignatureScanner>,
) -> ScanPipeline {
    let analyser = Arc::new(FileAnalyser::new(
        signature,
        Arc::new(crate::forensics::providers::PrintableStrings::default()),
        Arc::new(crate::forensics::providers::CommandMetadataExtractor::new(
            "/nonexistent/metadata-extractor",
        )),
        Arc::new(crate::forensics::providers::MagicCarver),
    ));
    ScanPipeline::new(fetcher, downloader, analyser, store, 10)
}

/// Builder for scan drafts used in persistence tests.
pub struct ScanDraftBuilder {
    draft: ScanDraft,
}

impl ScanDraftBuilder {
    /// Starts an ONLINE draft for a target.
    pub fn new(target: &str) -> Self {
        Self {
            draft: ScanDraft {
                target: target.to_string(),
                fingerprint: target.to_string(),
                timestamp: Utc::now(),
                url_status: UrlStatus::Online,
                status_code: Some(200),
                response_time_seconds: Some(0.5),
                title: "Test page".to_string(),
                content_preview: String::new(),
                content_hash: Some("hash-0".to_string()),
                keywords: Vec::new(),
                emails: Vec::new(),
                crypto_addresses: Vec::new(),
                pgp_detected: false,
                links: Vec::new(),
                file_links: Vec::new(),
                file_analyses: Vec::new(),
                threat_score: 0,
                risk_level: RiskLevel::Low,
                category: "Unknown".to_string(),
                confidence: 0.25,
                threat_indicators: ThreatIndicators::default(),
            },
        }
    }

    /// Sets the fetch status; non-ONLINE drafts lose their content hash.
    pub fn url_status(mut self, status: UrlStatus) -> Self {
        self.draft.url_status = status;
        if status != UrlStatus::Online {
            self.draft.content_hash = None;
            self.draft.status_code = None;
        }
        self
    }

    /// Sets the content hash.
    pub fn content_hash(mut self, hash: Option<&str>) -> Self {
        self.draft.content_hash = hash.map(str::to_string);
        self
    }

    /// Sets the threat score and derives the risk level.
    pub fn threat_score(mut self, score: u8) -> Self {
        self.draft.threat_score = score;
        self.draft.risk_level = RiskLevel::from_score(score);
        self
    }

    /// Sets the extracted emails.
    pub fn emails(mut self, emails: &[&str]) -> Self {
        self.draft.emails = emails.iter().map(|e| e.to_string()).collect();
        self
    }

    /// Sets the classification category.
    pub fn category(mut self, category: &str) -> Self {
        self.draft.category = category.to_string();
        self
    }

    /// Sets the scan timestamp.
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.draft.timestamp = timestamp;
        self
    }

    /// Finishes the draft.
    pub fn build(self) -> ScanDraft {
        self.draft
    }
}
