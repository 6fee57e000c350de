//! Content analysis: IOC extraction, tiered threat scoring and category
//! classification. Pure and deterministic; no I/O.

pub mod categories;
pub mod keywords;

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::models::scan::{RiskLevel, ThreatIndicators};

/// Score bonus when both emails and crypto addresses are present.
const DUAL_INDICATOR_BONUS: u32 = 40;
/// Score bonus when the signature scanner flagged a file.
const MALWARE_BONUS: u32 = 25;
/// Score bonus for a PGP block marker.
const PGP_BONUS: u32 = 2;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("valid email pattern")
});

// The prefix alternation must stay non-capturing: find-all over a capturing
// group would yield the prefix substring instead of the full address.
static BITCOIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:bc1|[13])[a-zA-HJ-NP-Z0-9]{25,39}\b").expect("valid bitcoin pattern")
});

static ETHEREUM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b0x[a-fA-F0-9]{40}\b").expect("valid ethereum pattern"));

static MONERO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b4[0-9AB][1-9A-HJ-NP-Za-km-z]{93}\b").expect("valid monero pattern")
});

/// The complete analysis of one page's text.
#[derive(Debug, Clone)]
pub struct ContentAnalysis {
    /// SHA-256 of the normalised text; absent for blank text.
    pub content_hash: Option<String>,
    /// Extracted email addresses, lowercased and deduplicated.
    pub emails: Vec<String>,
    /// Extracted cryptocurrency addresses, deduplicated case-insensitively.
    pub crypto_addresses: Vec<String>,
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

/// Strips zero-width, directional and soft-hyphen characters that break
/// regex word boundaries, and maps non-breaking spaces to plain spaces.
pub fn normalize_text(text: &str) -> String {
    text.chars()
        .filter_map(|c| match c {
            '\u{00ad}'
            | '\u{200b}'..='\u{200f}'
            | '\u{202a}'..='\u{202e}'
            | '\u{2060}'..='\u{206f}'
            | '\u{feff}' => None,
            '\u{00a0}' => Some(' '),
            other => Some(other),
        })
        .collect()
}

/// Extracts email addresses, lowercased and deduplicated.
pub fn detect_emails(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    EMAIL_RE
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(|email| seen.insert(email.clone()))
        .collect()
}

/// Extracts Bitcoin, Ethereum and Monero addresses, deduplicated
/// case-insensitively while keeping the original casing.
pub fn detect_crypto_addresses(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut addresses = Vec::new();
    for re in [&*BITCOIN_RE, &*ETHEREUM_RE, &*MONERO_RE] {
        for m in re.find_iter(text) {
            if seen.insert(m.as_str().to_lowercase()) {
                addresses.push(m.as_str().to_string());
            }
        }
    }
    addresses
}

/// Hex-encoded SHA-256 digest.
pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes).iter().map(|b| format!("{b:02x}")).collect()
}

/// Runs the full analysis over a page's normalised text.
///
/// `keywords` are canonical threat keywords already extracted by the parser;
/// the analyser re-derives matches from the text as well, so the two sources
/// agree on identical input.
pub fn analyze(
    text: &str,
    keywords: &[String],
    malware_detected: bool,
    pgp_detected: bool,
) -> ContentAnalysis {
    let normalized = normalize_text(text);
    let emails = detect_emails(&normalized);
    let crypto_addresses = detect_crypto_addresses(&normalized);
    let content_hash =
        if normalized.trim().is_empty() { None } else { Some(sha256_hex(normalized.as_bytes())) };

    let text_lower = normalized.to_lowercase();
    let tokens = keywords::tokenize(&text_lower);
    let mut matched = keywords::matched(&tokens, &text_lower, keywords);

    // Contact info (any email) and the moderate `contact` keyword are the
    // same signal; inject it once so it never double-counts.
    if !emails.is_empty() && !matched.iter().any(|kw| kw.name == "contact") {
        if let Some(contact) = keywords::find("contact") {
            matched.push(contact);
        }
    }

    let mut score: u32 = matched.iter().map(|kw| kw.weight).sum();
    if !emails.is_empty() && !crypto_addresses.is_empty() {
        score += DUAL_INDICATOR_BONUS;
    }
    if malware_detected {
        score += MALWARE_BONUS;
    }
    if pgp_detected {
        score += PGP_BONUS;
    }
    let threat_score = score.min(100) as u8;
    let risk_level = RiskLevel::from_score(threat_score);

    let classification = categories::classify(&tokens, &text_lower);
    let confidence =
        confidence(matched.len(), crypto_addresses.len(), emails.len(), malware_detected, &classification);

    if threat_score > 50 {
        tracing::warn!(
            threat_score,
            category = %classification.category,
            risk_level = %risk_level,
            "High threat content detected"
        );
    }

    let threat_indicators = ThreatIndicators {
        keyword_matches: matched.len() as u32,
        matched_keywords: matched.iter().take(5).map(|kw| kw.name.to_string()).collect(),
        crypto_detected: !crypto_addresses.is_empty(),
        email_detected: !emails.is_empty(),
        malware_detected,
    };

    ContentAnalysis {
        content_hash,
        emails,
        crypto_addresses,
        threat_score,
        risk_level,
        category: classification.category,
        confidence,
        threat_indicators,
    }
}

fn confidence(
    keyword_matches: usize,
    crypto_count: usize,
    email_count: usize,
    malware_detected: bool,
    classification: &categories::Classification,
) -> f64 {
    let no_signal = keyword_matches == 0
        && crypto_count == 0
        && email_count == 0
        && !malware_detected
        && classification.category == categories::UNKNOWN_CATEGORY;
    if no_signal {
        return 0.25;
    }

    let mut value = f64::min(0.4, 0.12 * keyword_matches as f64)
        + f64::min(0.35, 0.15 * crypto_count as f64)
        + f64::min(0.30, 0.10 * email_count as f64)
        + f64::min(0.15, 0.05 * classification.weight);
    if malware_detected {
        value += 0.20;
    }
    (value.min(0.99) * 100.0).round() / 100.0
}
