//! Monitors: registered targets rescanned on a fixed interval.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::scan::{RiskLevel, ScanRecord, UrlStatus};

/// Smallest accepted rescan interval, in minutes.
pub const MIN_INTERVAL_MINUTES: u32 = 1;
/// Largest accepted rescan interval, one day.
pub const MAX_INTERVAL_MINUTES: u32 = 1440;

/// A registered monitoring job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
    /// Opaque monitor id.
    pub id: i64,
    /// Monitored URL in normalised form.
    pub target: String,
    /// History grouping key for the target.
    pub fingerprint: String,
    /// Minutes between rescans, 1..=1440.
    pub interval_minutes: u32,
    /// Sticky pause flag; a paused monitor is never dispatched.
    pub paused: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Dispatch time of the most recent scan, if any.
    pub last_scan: Option<DateTime<Utc>>,
    /// Earliest time the next scan may be dispatched.
    pub next_scan: DateTime<Utc>,
    /// Number of scans completed for this monitor.
    pub scan_count: u32,
    /// Condensed outcome of the most recent scan.
    pub last_scan_summary: Option<MonitorScanSummary>,
}

/// Condensed result of a monitor-driven scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorScanSummary {
    /// Fetch classification; ERROR when the pipeline itself failed.
    pub status: UrlStatus,
    /// Threat score of the scan.
    pub threat_score: u8,
    /// Risk band of the scan.
    pub risk_level: RiskLevel,
    /// Classification category.
    pub category: String,
    /// Number of extracted email addresses.
    pub email_count: u32,
    /// Number of extracted cryptocurrency addresses.
    pub crypto_count: u32,
    /// Number of analysed file hashes.
    pub file_hash_count: u32,
    /// Whether the signature scanner flagged any file.
    pub malware_detected: bool,
}

impl MonitorScanSummary {
    /// Summary recorded when the scan pipeline failed outright.
    pub fn failed() -> Self {
        Self {
            status: UrlStatus::Error,
            threat_score: 0,
            risk_level: RiskLevel::Low,
            category: "Unknown".to_string(),
            email_count: 0,
            crypto_count: 0,
            file_hash_count: 0,
            malware_detected: false,
        }
    }
}

impl From<&ScanRecord> for MonitorScanSummary {
    fn from(record: &ScanRecord) -> Self {
        Self {
            status: record.url_status,
            threat_score: record.threat_score,
            risk_level: record.risk_level,
            category: record.category.clone(),
            email_count: record.emails.len() as u32,
            crypto_count: record.crypto_addresses.len() as u32,
            file_hash_count: record.file_analyses.len() as u32,
            malware_detected: record.threat_indicators.malware_detected,
        }
    }
}

/// Validates a requested rescan interval.
pub fn interval_in_range(interval_minutes: u32) -> bool {
    (MIN_INTERVAL_MINUTES..=MAX_INTERVAL_MINUTES).contains(&interval_minutes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_bounds_are_inclusive() {
        assert!(!interval_in_range(0));
        assert!(interval_in_range(1));
        assert!(interval_in_range(1440));
        assert!(!interval_in_range(1441));
    }

    #[test]
    fn failed_summary_reads_as_error() {
        let summary = MonitorScanSummary::failed();
        assert_eq!(summary.status, UrlStatus::Error);
        assert_eq!(summary.threat_score, 0);
    }
}
