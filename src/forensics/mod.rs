//! Forensic analysis of downloaded files.
//!
//! Every file is hashed, then handed to the capability providers: a malware
//! signature scanner, a printable-strings extractor, a metadata extractor
//! and an embedded-format carver. Providers are optional; a missing provider
//! yields a `not_available` report and never aborts the scan.

pub mod providers;

use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::{
    analysis,
    downloader::DownloadedFile,
    models::scan::{CarvingReport, FileAnalysis, MalwareScan, MetadataReport, StringsReport},
};

/// Signature-based malware detection over raw bytes.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SignatureScanner: Send + Sync {
    /// Whether the provider can run at all.
    fn available(&self) -> bool;
    /// Scans the bytes against the signature database.
    async fn scan(&self, bytes: &[u8]) -> MalwareScan;
}

/// Printable-string extraction over raw bytes.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StringsExtractor: Send + Sync {
    /// Whether the provider can run at all.
    fn available(&self) -> bool;
    /// Extracts printable runs.
    async fn extract(&self, bytes: &[u8]) -> StringsReport;
}

/// File metadata extraction.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    /// Whether the provider can run at all.
    fn available(&self) -> bool;
    /// Extracts a flat metadata mapping.
    async fn extract(&self, bytes: &[u8]) -> MetadataReport;
}

/// Embedded-format marker carving.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FormatCarver: Send + Sync {
    /// Whether the provider can run at all.
    fn available(&self) -> bool;
    /// Scans for embedded format markers.
    async fn carve(&self, bytes: &[u8]) -> CarvingReport;
}

/// Runs the capability providers over downloaded files.
pub struct FileAnalyser {
    signature: Arc<dyn SignatureScanner>,
    strings: Arc<dyn StringsExtractor>,
    metadata: Arc<dyn MetadataExtractor>,
    carving: Arc<dyn FormatCarver>,
}

impl FileAnalyser {
    /// Creates an analyser over the given providers.
    pub fn new(
        signature: Arc<dyn SignatureScanner>,
        strings: Arc<dyn StringsExtractor>,
        metadata: Arc<dyn MetadataExtractor>,
        carving: Arc<dyn FormatCarver>,
    ) -> Self {
        Self { signature, strings, metadata, carving }
    }

    /// Analyses a batch of files from one scan, deduplicated by content hash.
    pub async fn analyze_all(&self, files: &[DownloadedFile]) -> Vec<FileAnalysis> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut analyses = Vec::new();
        for file in files {
            let file_hash = analysis::sha256_hex(&file.bytes);
            if !seen.insert(file_hash.clone()) {
                tracing::debug!(file = %file.file_name, "Skipping duplicate file");
                continue;
            }
            analyses.push(self.analyze(file, file_hash).await);
        }
        analyses
    }

    async fn analyze(&self, file: &DownloadedFile, file_hash: String) -> FileAnalysis {
        tracing::info!(file = %file.file_name, size = file.size(), "Analysing file");

        let malware = if self.signature.available() {
            self.signature.scan(&file.bytes).await
        } else {
            MalwareScan::not_available()
        };
        let strings = if self.strings.available() {
            self.strings.extract(&file.bytes).await
        } else {
            StringsReport::not_available()
        };
        let metadata = if self.metadata.available() {
            self.metadata.extract(&file.bytes).await
        } else {
            MetadataReport::not_available()
        };
        let carving = if self.carving.available() {
            self.carving.carve(&file.bytes).await
        } else {
            CarvingReport::not_available()
        };

        if malware.detected {
            tracing::warn!(file = %file.file_name, "Malware signature matched");
        }

        FileAnalysis {
            file_url: file.file_url.clone(),
            file_name: file.file_name.clone(),
            content_type: file.content_type.clone(),
            file_size: file.size(),
            file_hash,
            malware,
            strings,
            metadata,
            carving,
        }
    }
}
