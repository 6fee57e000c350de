//! Scan records: one persisted observation of a target.

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome classification of a page fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UrlStatus {
    /// The target answered with a readable 2xx/3xx response.
    Online,
    /// The target refused the connection or was unreachable.
    Offline,
    /// The connect or read deadline elapsed.
    Timeout,
    /// Any other failure: TLS errors, 4xx/5xx, oversized or undecodable body.
    Error,
}

impl UrlStatus {
    /// The canonical wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            UrlStatus::Online => "ONLINE",
            UrlStatus::Offline => "OFFLINE",
            UrlStatus::Timeout => "TIMEOUT",
            UrlStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for UrlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UrlStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ONLINE" => Ok(UrlStatus::Online),
            "OFFLINE" => Ok(UrlStatus::Offline),
            "TIMEOUT" => Ok(UrlStatus::Timeout),
            "ERROR" => Ok(UrlStatus::Error),
            other => Err(format!("unknown url status '{other}'")),
        }
    }
}

/// Risk bands derived from the threat score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    /// Threat score 0..=30.
    Low,
    /// Threat score 31..=70.
    Medium,
    /// Threat score 71..=100.
    High,
}

impl RiskLevel {
    /// Maps a threat score onto its risk band.
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=30 => RiskLevel::Low,
            31..=70 => RiskLevel::Medium,
            _ => RiskLevel::High,
        }
    }

    /// The canonical wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(RiskLevel::Low),
            "MEDIUM" => Ok(RiskLevel::Medium),
            "HIGH" => Ok(RiskLevel::High),
            other => Err(format!("unknown risk level '{other}'")),
        }
    }
}

/// An anchor harvested from the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLink {
    /// Resolved link URL.
    pub url: String,
    /// Visible anchor text, if any.
    pub anchor_text: Option<String>,
}

/// A link whose URL path ends in a downloadable extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLink {
    /// Resolved file URL.
    pub url: String,
    /// Matched extension, without the leading dot.
    pub extension: String,
}

/// Aggregated threat signals for a scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreatIndicators {
    /// Number of distinct threat keywords matched.
    pub keyword_matches: u32,
    /// The matched keyword names, capped at five.
    pub matched_keywords: Vec<String>,
    /// Whether any cryptocurrency address was extracted.
    pub crypto_detected: bool,
    /// Whether any email address was extracted.
    pub email_detected: bool,
    /// Whether the signature scanner flagged a downloaded file.
    pub malware_detected: bool,
}

/// One entry in a target's append-only availability log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    /// When the observation was made.
    pub timestamp: DateTime<Utc>,
    /// Fetch classification at that time.
    pub url_status: UrlStatus,
    /// HTTP status code, when a response arrived.
    pub status_code: Option<u16>,
    /// Wall-clock seconds until the outcome was known.
    pub response_time_seconds: Option<f64>,
}

/// A named threat signature reported by the malware scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatSignature {
    /// Signature name as reported by the scanner.
    pub name: String,
    /// Signature class.
    #[serde(rename = "type")]
    pub kind: String,
}

/// Output of the signature-scanner capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MalwareScan {
    /// Whether the provider ran to completion.
    pub success: bool,
    /// Provider state: `scanned`, `not_available` or `error`.
    pub status: String,
    /// Whether any signature matched.
    pub detected: bool,
    /// Matched signatures.
    pub threats: Vec<ThreatSignature>,
    /// Error code when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MalwareScan {
    /// The report emitted when the provider is not installed.
    pub fn not_available() -> Self {
        Self {
            success: false,
            status: "not_available".to_string(),
            detected: false,
            threats: Vec::new(),
            error: Some("not_available".to_string()),
        }
    }
}

/// Output of the printable-strings capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringsReport {
    /// Whether the provider ran to completion.
    pub success: bool,
    /// Number of printable runs found.
    pub count: u32,
    /// Leading sample of extracted strings.
    pub samples: Vec<String>,
    /// Error code when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StringsReport {
    /// The report emitted when the provider is not installed.
    pub fn not_available() -> Self {
        Self {
            success: false,
            count: 0,
            samples: Vec::new(),
            error: Some("not_available".to_string()),
        }
    }
}

/// Output of the metadata-extraction capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataReport {
    /// Whether the provider ran to completion.
    pub success: bool,
    /// Flat field name to value mapping.
    pub fields: BTreeMap<String, String>,
    /// Error code when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MetadataReport {
    /// The report emitted when the provider is not installed.
    pub fn not_available() -> Self {
        Self {
            success: false,
            fields: BTreeMap::new(),
            error: Some("not_available".to_string()),
        }
    }
}

/// Output of the embedded-format carving capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarvingReport {
    /// Whether the provider ran to completion.
    pub success: bool,
    /// Human-readable descriptions of embedded format markers.
    pub signatures: Vec<String>,
    /// Error code when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CarvingReport {
    /// The report emitted when the provider is not installed.
    pub fn not_available() -> Self {
        Self {
            success: false,
            signatures: Vec::new(),
            error: Some("not_available".to_string()),
        }
    }
}

/// Forensic analysis of one downloaded file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAnalysis {
    /// URL the file was retrieved from.
    pub file_url: String,
    /// Sanitised file name derived from the URL path.
    pub file_name: String,
    /// Declared content type.
    pub content_type: String,
    /// Size in bytes.
    pub file_size: u64,
    /// SHA-256 of the file contents.
    pub file_hash: String,
    /// Signature-scanner output.
    pub malware: MalwareScan,
    /// Printable-strings output.
    pub strings: StringsReport,
    /// Metadata-extractor output.
    pub metadata: MetadataReport,
    /// Format-carving output.
    pub carving: CarvingReport,
}

/// A scan observation before persistence assigns its id, change flag and
/// status history.
#[derive(Debug, Clone)]
pub struct ScanDraft {
    /// Scanned URL in normalised form.
    pub target: String,
    /// History grouping key.
    pub fingerprint: String,
    /// When the scan ran.
    pub timestamp: DateTime<Utc>,
    /// Fetch classification.
    pub url_status: UrlStatus,
    /// HTTP status code, when a response arrived.
    pub status_code: Option<u16>,
    /// Seconds until the fetch outcome was known.
    pub response_time_seconds: Option<f64>,
    /// Page title.
    pub title: String,
    /// First 500 characters of the normalised text.
    pub content_preview: String,
    /// SHA-256 of the normalised text; absent unless ONLINE with text.
    pub content_hash: Option<String>,
    /// Matched threat keywords.
    pub keywords: Vec<String>,
    /// Extracted email addresses, lowercased and deduplicated.
    pub emails: Vec<String>,
    /// Extracted cryptocurrency addresses.
    pub crypto_addresses: Vec<String>,
    /// Whether a PGP block marker was present.
    pub pgp_detected: bool,
    /// Harvested anchors.
    pub links: Vec<PageLink>,
    /// Anchors pointing at downloadable files.
    pub file_links: Vec<FileLink>,
    /// Forensic results for downloaded files, deduplicated by hash.
    pub file_analyses: Vec<FileAnalysis>,
    /// Threat score, 0..=100.
    pub threat_score: u8,
    /// Risk band for the score.
    pub risk_level: RiskLevel,
    /// Winning classification category.
    pub category: String,
    /// Classification confidence, 0..=0.99.
    pub confidence: f64,
    /// Aggregated threat signals.
    pub threat_indicators: ThreatIndicators,
}

/// One persisted observation of a target. Append-only: records are never
/// mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRecord {
    /// Opaque record id.
    pub id: i64,
    /// Scanned URL in normalised form.
    pub target: String,
    /// History grouping key.
    pub fingerprint: String,
    /// When the scan ran.
    pub timestamp: DateTime<Utc>,
    /// Fetch classification.
    pub url_status: UrlStatus,
    /// HTTP status code, when a response arrived.
    pub status_code: Option<u16>,
    /// Seconds until the fetch outcome was known.
    pub response_time_seconds: Option<f64>,
    /// Page title.
    pub title: String,
    /// First 500 characters of the normalised text.
    pub content_preview: String,
    /// SHA-256 of the normalised text; absent unless ONLINE with text.
    pub content_hash: Option<String>,
    /// Matched threat keywords.
    pub keywords: Vec<String>,
    /// Extracted email addresses.
    pub emails: Vec<String>,
    /// Extracted cryptocurrency addresses.
    pub crypto_addresses: Vec<String>,
    /// Whether a PGP block marker was present.
    pub pgp_detected: bool,
    /// Harvested anchors.
    pub links: Vec<PageLink>,
    /// Anchors pointing at downloadable files.
    pub file_links: Vec<FileLink>,
    /// Forensic results for downloaded files.
    pub file_analyses: Vec<FileAnalysis>,
    /// Threat score, 0..=100.
    pub threat_score: u8,
    /// Risk band for the score.
    pub risk_level: RiskLevel,
    /// Winning classification category.
    pub category: String,
    /// Classification confidence, 0..=0.99.
    pub confidence: f64,
    /// Aggregated threat signals.
    pub threat_indicators: ThreatIndicators,
    /// True when a previous ONLINE record exists with a different hash.
    pub content_changed: bool,
    /// Append-only availability log for the target, oldest first.
    pub status_history: Vec<StatusHistoryEntry>,
}

/// Condensed scan representation for history listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSummary {
    /// Record id.
    pub id: i64,
    /// Scanned URL.
    pub target: String,
    /// When the scan ran.
    pub timestamp: DateTime<Utc>,
    /// Fetch classification.
    pub url_status: UrlStatus,
    /// Page title.
    pub title: String,
    /// Threat score.
    pub threat_score: u8,
    /// Risk band.
    pub risk_level: RiskLevel,
    /// Classification category.
    pub category: String,
    /// Whether content changed versus the prior ONLINE record.
    pub content_changed: bool,
}

impl From<&ScanRecord> for ScanSummary {
    fn from(record: &ScanRecord) -> Self {
        Self {
            id: record.id,
            target: record.target.clone(),
            timestamp: record.timestamp,
            url_status: record.url_status,
            title: record.title.clone(),
            threat_score: record.threat_score,
            risk_level: record.risk_level,
            category: record.category.clone(),
            content_changed: record.content_changed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_level_bands_match_thresholds() {
        assert_eq!(RiskLevel::from_score(0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(30), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(31), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(70), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(71), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(100), RiskLevel::High);
    }

    #[test]
    fn url_status_round_trips_through_str() {
        for status in
            [UrlStatus::Online, UrlStatus::Offline, UrlStatus::Timeout, UrlStatus::Error]
        {
            assert_eq!(status.as_str().parse::<UrlStatus>().unwrap(), status);
        }
    }

    #[test]
    fn threat_signature_serialises_kind_as_type() {
        let sig = ThreatSignature { name: "Eicar-Test".to_string(), kind: "signature".to_string() };
        let json = serde_json::to_value(&sig).unwrap();
        assert_eq!(json["type"], "signature");
    }
}
