//! The scan pipeline: fetch, parse, download, analyse, persist, correlate
//! and alert, composed into one idempotent `scan` operation.
//!
//! The pipeline never throws for acquisition or analysis problems; those are
//! folded into the persisted record. Only store failures surface.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use thiserror::Error;
use url::Url;

use crate::{
    alerting::AlertEngine,
    analysis,
    correlation::Correlator,
    downloader::{DownloadedFile, FileDownloader},
    fetcher::{FetchOutcome, PageFetcher},
    forensics::FileAnalyser,
    models::{
        scan::{FileLink, RiskLevel, ScanDraft, ScanRecord, ThreatIndicators, UrlStatus},
        target::{Target, TargetError},
    },
    parser,
    persistence::{error::PersistenceError, traits::Store},
};

/// Concurrent file downloads per scan.
const DOWNLOAD_CONCURRENCY: usize = 4;

/// Errors surfaced by the scan pipeline.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The requested URL failed validation.
    #[error(transparent)]
    InvalidTarget(#[from] TargetError),

    /// A required store operation failed.
    #[error(transparent)]
    Store(#[from] PersistenceError),
}

/// Composes the acquisition and analysis components into `scan(target)`.
pub struct ScanPipeline {
    fetcher: Arc<dyn PageFetcher>,
    downloader: Arc<dyn FileDownloader>,
    file_analyser: Arc<FileAnalyser>,
    store: Arc<dyn Store>,
    correlator: Correlator,
    alert_engine: AlertEngine,
    max_file_downloads: usize,
}

impl ScanPipeline {
    /// Wires the pipeline over its components.
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        downloader: Arc<dyn FileDownloader>,
        file_analyser: Arc<FileAnalyser>,
        store: Arc<dyn Store>,
        max_file_downloads: usize,
    ) -> Self {
        let correlator = Correlator::new(Arc::clone(&store));
        let alert_engine = AlertEngine::new(Arc::clone(&store));
        Self {
            fetcher,
            downloader,
            file_analyser,
            store,
            correlator,
            alert_engine,
            max_file_downloads,
        }
    }

    /// Scans one target end to end and returns the persisted record.
    ///
    /// Every invocation appends exactly one new record; failed fetches
    /// persist a placeholder record with the failure status.
    pub async fn scan(&self, raw_url: &str) -> Result<ScanRecord, ScanError> {
        let target = Target::parse(raw_url)?;
        let started = Utc::now();

        tracing::info!(target = %target.as_str(), "Scanning target");
        let outcome = self.fetcher.fetch(&target).await;

        let draft = match outcome.page_text() {
            Some(text) => {
                let text = text.to_string();
                self.analyse_page(&target, &outcome, &text, started).await
            }
            None => placeholder_draft(&target, &outcome, started),
        };

        let record = self.store.put_scan(draft).await?;

        let reuse_signals = if record.url_status == UrlStatus::Online {
            self.correlator.record_iocs(&record).await?
        } else {
            Vec::new()
        };

        self.alert_engine.process(&record, &reuse_signals).await;

        tracing::info!(
            target = %record.target,
            status = %record.url_status,
            threat_score = record.threat_score,
            "Scan completed"
        );
        Ok(record)
    }

    async fn analyse_page(
        &self,
        target: &Target,
        outcome: &FetchOutcome,
        text: &str,
        started: chrono::DateTime<Utc>,
    ) -> ScanDraft {
        let parsed = parser::parse_page(text, Some(target.url()));

        let files = self.download_files(target.url(), &parsed.file_links).await;
        let file_analyses = self.file_analyser.analyze_all(&files).await;
        let malware_detected = file_analyses.iter().any(|fa| fa.malware.detected);

        let analysis = analysis::analyze(
            &parsed.text,
            &parsed.keywords,
            malware_detected,
            parsed.pgp_detected,
        );

        ScanDraft {
            target: target.as_str().to_string(),
            fingerprint: target.fingerprint(),
            timestamp: started,
            url_status: outcome.url_status,
            status_code: outcome.status_code,
            response_time_seconds: Some(outcome.response_time_seconds),
            title: parsed.title.unwrap_or_else(|| "No title".to_string()),
            content_preview: preview(&parsed.text),
            content_hash: analysis.content_hash,
            keywords: parsed.keywords,
            emails: analysis.emails,
            crypto_addresses: analysis.crypto_addresses,
            pgp_detected: parsed.pgp_detected,
            links: parsed.links,
            file_links: parsed.file_links,
            file_analyses,
            threat_score: analysis.threat_score,
            risk_level: analysis.risk_level,
            category: analysis.category,
            confidence: analysis.confidence,
            threat_indicators: analysis.threat_indicators,
        }
    }

    async fn download_files(&self, base: &Url, links: &[FileLink]) -> Vec<DownloadedFile> {
        if links.len() > self.max_file_downloads {
            tracing::warn!(
                total = links.len(),
                cap = self.max_file_downloads,
                "File links exceed the per-scan cap, skipping the rest"
            );
        }
        let futures: Vec<_> = links
            .iter()
            .take(self.max_file_downloads)
            .map(|link| self.download_one(base, link))
            .collect();
        stream::iter(futures)
            .buffer_unordered(DOWNLOAD_CONCURRENCY)
            .filter_map(|file| async { file })
            .collect()
            .await
    }

    async fn download_one(&self, base: &Url, link: &FileLink) -> Option<DownloadedFile> {
        match self.downloader.download(base, link).await {
            Ok(file) => Some(file),
            Err(e) => {
                tracing::warn!(url = %link.url, error = %e, "File download skipped");
                None
            }
        }
    }
}

/// Builds the record persisted when no analysable content was retrieved.
fn placeholder_draft(
    target: &Target,
    outcome: &FetchOutcome,
    started: chrono::DateTime<Utc>,
) -> ScanDraft {
    let status = outcome.url_status;
    ScanDraft {
        target: target.as_str().to_string(),
        fingerprint: target.fingerprint(),
        timestamp: started,
        url_status: status,
        status_code: outcome.status_code,
        response_time_seconds: Some(outcome.response_time_seconds),
        title: format!("[{status}] Unable to fetch content"),
        content_preview: format!("Failed to retrieve content - Status: {status}"),
        content_hash: None,
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
        confidence: 0.0,
        threat_indicators: ThreatIndicators::default(),
    }
}

fn preview(text: &str) -> String {
    text.chars().take(500).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        downloader::MockFileDownloader,
        fetcher::MockPageFetcher,
        forensics::{
            MockFormatCarver, MockMetadataExtractor, MockSignatureScanner, MockStringsExtractor,
        },
        persistence::SqliteStore,
    };

    async fn memory_store() -> Arc<SqliteStore> {
        let store =
            SqliteStore::new("sqlite::memory:").await.expect("in-memory store should connect");
        store.run_migrations().await.expect("migrations should run");
        Arc::new(store)
    }

    fn offline_analyser() -> Arc<FileAnalyser> {
        let mut signature = MockSignatureScanner::new();
        signature.expect_available().return_const(false);
        let mut strings = MockStringsExtractor::new();
        strings.expect_available().return_const(false);
        let mut metadata = MockMetadataExtractor::new();
        metadata.expect_available().return_const(false);
        let mut carver = MockFormatCarver::new();
        carver.expect_available().return_const(false);
        Arc::new(FileAnalyser::new(
            Arc::new(signature),
            Arc::new(strings),
            Arc::new(metadata),
            Arc::new(carver),
        ))
    }

    fn online_outcome(html: &str) -> FetchOutcome {
        let mut outcome = FetchOutcome::failure(UrlStatus::Online, Some(200), 0.2);
        outcome.text = Some(html.to_string());
        outcome.content_type = Some("text/html".to_string());
        outcome
    }

    fn pipeline(
        fetcher: MockPageFetcher,
        downloader: MockFileDownloader,
        store: Arc<SqliteStore>,
    ) -> ScanPipeline {
        ScanPipeline::new(
            Arc::new(fetcher),
            Arc::new(downloader),
            offline_analyser(),
            store,
            10,
        )
    }

    #[tokio::test]
    async fn invalid_url_is_rejected_before_any_fetch() {
        let mut fetcher = MockPageFetcher::new();
        fetcher.expect_fetch().times(0);
        let store = memory_store().await;
        let pipeline = pipeline(fetcher, MockFileDownloader::new(), store);

        let result = pipeline.scan("not-a-url").await;
        assert!(matches!(result, Err(ScanError::InvalidTarget(_))));
    }

    #[tokio::test]
    async fn online_scan_persists_the_analysed_record() {
        let mut fetcher = MockPageFetcher::new();
        fetcher.expect_fetch().returning(|_| {
            online_outcome(
                "<html><head><title>Dark Market</title></head><body>Dark Market buy carding \
                 escrow contact: admin@shop.test BTC 1BoatSLRHtKNngkdXEeobR76b53LETtpyT</body></html>",
            )
        });
        let store = memory_store().await;
        let pipeline = pipeline(fetcher, MockFileDownloader::new(), Arc::clone(&store));

        let record = pipeline.scan("http://example1.onion/").await.unwrap();

        assert_eq!(record.url_status, UrlStatus::Online);
        assert_eq!(record.threat_score, 74);
        assert_eq!(record.risk_level, RiskLevel::High);
        assert_eq!(record.category, "Illegal Marketplace");
        assert_eq!(record.emails, vec!["admin@shop.test".to_string()]);
        assert!(record.content_hash.is_some());
        assert!(!record.content_changed);
        assert_eq!(record.status_history.len(), 1);

        // Read-your-writes through the store.
        let latest = store.latest_scan(&record.fingerprint).await.unwrap().unwrap();
        assert_eq!(latest.id, record.id);
    }

    #[tokio::test]
    async fn failed_fetch_persists_a_placeholder_record() {
        let mut fetcher = MockPageFetcher::new();
        fetcher
            .expect_fetch()
            .returning(|_| FetchOutcome::failure(UrlStatus::Timeout, None, 30.0));
        let store = memory_store().await;
        let pipeline = pipeline(fetcher, MockFileDownloader::new(), Arc::clone(&store));

        let record = pipeline.scan("http://example1.onion/").await.unwrap();

        assert_eq!(record.url_status, UrlStatus::Timeout);
        assert_eq!(record.status_code, None);
        assert!(record.content_hash.is_none());
        assert!(record.emails.is_empty());
        assert_eq!(record.threat_score, 0);
        assert_eq!(record.title, "[TIMEOUT] Unable to fetch content");
    }

    #[tokio::test]
    async fn file_downloads_respect_the_per_scan_cap() {
        let mut html = String::from("<body>");
        for i in 0..15 {
            html.push_str(&format!("<a href=\"/f{i}.zip\">f{i}</a>"));
        }
        html.push_str("</body>");

        let mut fetcher = MockPageFetcher::new();
        let page = html.clone();
        fetcher.expect_fetch().returning(move |_| online_outcome(&page));

        let mut downloader = MockFileDownloader::new();
        downloader.expect_download().times(10).returning(|_, link| {
            Err(crate::downloader::DownloadError::InvalidUrl(link.url.clone()))
        });

        let store = memory_store().await;
        let pipeline = pipeline(fetcher, downloader, store);
        let record = pipeline.scan("http://example1.onion/").await.unwrap();
        assert_eq!(record.file_links.len(), 15);
        assert!(record.file_analyses.is_empty());
    }

    #[tokio::test]
    async fn rescan_with_identical_content_repeats_analytical_fields() {
        let mut fetcher = MockPageFetcher::new();
        fetcher
            .expect_fetch()
            .times(2)
            .returning(|_| online_outcome("<body>carding escrow market</body>"));
        let store = memory_store().await;
        let pipeline = pipeline(fetcher, MockFileDownloader::new(), Arc::clone(&store));

        let first = pipeline.scan("http://example1.onion/").await.unwrap();
        let second = pipeline.scan("http://example1.onion/").await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(first.threat_score, second.threat_score);
        assert_eq!(first.category, second.category);
        assert_eq!(first.content_hash, second.content_hash);
        assert!(!second.content_changed);
        assert_eq!(second.status_history.len(), 2);
    }
}
