//! Structured deltas between the two most recent ONLINE scans of a target.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::scan::ScanRecord;

/// Field-level changes between two scans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonChanges {
    /// `current.threat_score - previous.threat_score`.
    pub threat_score_delta: i32,
    /// Whether the risk band moved.
    pub risk_level_changed: bool,
    /// Whether the URL status moved.
    pub status_changed: bool,
    /// Whether the classification category moved.
    pub category_changed: bool,
    /// Emails present now but not in the previous scan.
    pub new_emails: u32,
    /// Crypto addresses present now but not in the previous scan.
    pub new_crypto: u32,
}

/// Comparison of a target's two most recent ONLINE scans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comparison {
    /// The most recent ONLINE scan.
    pub current: ScanRecord,
    /// The ONLINE scan before it.
    pub previous: ScanRecord,
    /// Field-level deltas.
    pub changes: ComparisonChanges,
    /// Human-readable descriptions of the changes that fired.
    pub reasons: Vec<String>,
}

impl Comparison {
    /// Builds the delta between two scans of the same fingerprint,
    /// `current` being the newer one.
    pub fn between(current: ScanRecord, previous: ScanRecord) -> Self {
        let new_emails = set_difference(&current.emails, &previous.emails);
        let new_crypto = set_difference(&current.crypto_addresses, &previous.crypto_addresses);
        let changes = ComparisonChanges {
            threat_score_delta: i32::from(current.threat_score)
                - i32::from(previous.threat_score),
            risk_level_changed: current.risk_level != previous.risk_level,
            status_changed: current.url_status != previous.url_status,
            category_changed: current.category != previous.category,
            new_emails,
            new_crypto,
        };

        let new_malware = current.threat_indicators.malware_detected
            && !previous.threat_indicators.malware_detected;

        let mut reasons = Vec::new();
        if changes.status_changed {
            reasons.push(format!(
                "URL status changed from {} to {}",
                previous.url_status, current.url_status
            ));
        }
        if changes.category_changed {
            reasons.push(format!(
                "Category changed from {} to {}",
                previous.category, current.category
            ));
        }
        if changes.threat_score_delta != 0 {
            reasons.push(format!(
                "Threat score changed by {:+} points",
                changes.threat_score_delta
            ));
        }
        if changes.new_emails > 0 {
            reasons.push(format!("{} new email address(es) discovered", changes.new_emails));
        }
        if changes.new_crypto > 0 {
            reasons.push(format!("{} new crypto address(es) found", changes.new_crypto));
        }
        if new_malware {
            reasons.push("Malware detected in downloaded files".to_string());
        }
        if current.content_changed {
            reasons.push("Page content changed".to_string());
        }

        Self { current, previous, changes, reasons }
    }
}

fn set_difference(current: &[String], previous: &[String]) -> u32 {
    let prior: HashSet<&str> = previous.iter().map(String::as_str).collect();
    current.iter().filter(|v| !prior.contains(v.as_str())).count() as u32
}
