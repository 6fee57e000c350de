//! The curated threat-keyword dictionary.
//!
//! Keywords are tiered: critical, high and moderate, each tier carrying a
//! per-match score contribution. A keyword is canonical (`marketplace`) and
//! matches through token aliases (`market`) or, for hyphenated terms,
//! through phrase containment. The tier tables are plain consts so the
//! weights stay tunable.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

/// Score contribution of a critical-tier keyword.
pub const CRITICAL_WEIGHT: u32 = 15;
/// Score contribution of a high-tier keyword.
pub const HIGH_WEIGHT: u32 = 8;
/// Score contribution of a moderate-tier keyword.
pub const MODERATE_WEIGHT: u32 = 3;

/// One entry of the threat dictionary.
#[derive(Debug)]
pub struct ThreatKeyword {
    /// Canonical keyword name.
    pub name: &'static str,
    /// Per-match score contribution.
    pub weight: u32,
    /// Single-token aliases matched against the token set.
    pub tokens: &'static [&'static str],
    /// Multi-word or hyphenated forms matched by containment.
    pub phrases: &'static [&'static str],
}

/// The full dictionary, critical tier first.
pub const THREAT_KEYWORDS: &[ThreatKeyword] = &[
    ThreatKeyword {
        name: "ransomware",
        weight: CRITICAL_WEIGHT,
        tokens: &["ransomware"],
        phrases: &[],
    },
    ThreatKeyword {
        name: "exploit",
        weight: CRITICAL_WEIGHT,
        tokens: &["exploit", "exploits"],
        phrases: &[],
    },
    ThreatKeyword { name: "carding", weight: CRITICAL_WEIGHT, tokens: &["carding"], phrases: &[] },
    ThreatKeyword { name: "cvv", weight: CRITICAL_WEIGHT, tokens: &["cvv"], phrases: &[] },
    ThreatKeyword {
        name: "zero-day",
        weight: CRITICAL_WEIGHT,
        tokens: &["0day", "zeroday"],
        phrases: &["zero-day", "zero day"],
    },
    ThreatKeyword {
        name: "breach",
        weight: CRITICAL_WEIGHT,
        tokens: &["breach", "breached", "breaches"],
        phrases: &[],
    },
    ThreatKeyword { name: "ddos", weight: CRITICAL_WEIGHT, tokens: &["ddos"], phrases: &[] },
    ThreatKeyword {
        name: "botnet",
        weight: CRITICAL_WEIGHT,
        tokens: &["botnet", "botnets"],
        phrases: &[],
    },
    ThreatKeyword {
        name: "marketplace",
        weight: HIGH_WEIGHT,
        tokens: &["market", "markets", "marketplace"],
        phrases: &[],
    },
    ThreatKeyword { name: "escrow", weight: HIGH_WEIGHT, tokens: &["escrow"], phrases: &[] },
    ThreatKeyword { name: "fraud", weight: HIGH_WEIGHT, tokens: &["fraud"], phrases: &[] },
    ThreatKeyword { name: "phishing", weight: HIGH_WEIGHT, tokens: &["phishing"], phrases: &[] },
    ThreatKeyword {
        name: "hack",
        weight: HIGH_WEIGHT,
        tokens: &["hack", "hacked", "hacker", "hacking"],
        phrases: &[],
    },
    ThreatKeyword { name: "drug", weight: HIGH_WEIGHT, tokens: &["drug", "drugs"], phrases: &[] },
    ThreatKeyword {
        name: "weapon",
        weight: HIGH_WEIGHT,
        tokens: &["weapon", "weapons"],
        phrases: &[],
    },
    ThreatKeyword { name: "illegal", weight: HIGH_WEIGHT, tokens: &["illegal"], phrases: &[] },
    ThreatKeyword { name: "contact", weight: MODERATE_WEIGHT, tokens: &["contact"], phrases: &[] },
    ThreatKeyword {
        name: "service",
        weight: MODERATE_WEIGHT,
        tokens: &["service", "services"],
        phrases: &[],
    },
    ThreatKeyword {
        name: "offer",
        weight: MODERATE_WEIGHT,
        tokens: &["offer", "offers"],
        phrases: &[],
    },
];

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-z0-9]{3,}").expect("valid token pattern"));

/// Splits lowercased text into deduplicated alphanumeric tokens of length
/// three or more.
pub fn tokenize(text_lower: &str) -> HashSet<String> {
    TOKEN_RE.find_iter(text_lower).map(|m| m.as_str().to_string()).collect()
}

/// Looks up a dictionary entry by canonical name.
pub fn find(name: &str) -> Option<&'static ThreatKeyword> {
    THREAT_KEYWORDS.iter().find(|kw| kw.name == name)
}

/// Returns the dictionary entries matched by the token set, the lowercased
/// text (for phrase forms) or the caller-provided canonical names. Each
/// keyword appears at most once, in dictionary order.
pub fn matched(
    tokens: &HashSet<String>,
    text_lower: &str,
    extra: &[String],
) -> Vec<&'static ThreatKeyword> {
    THREAT_KEYWORDS
        .iter()
        .filter(|kw| {
            kw.tokens.iter().any(|t| tokens.contains(*t))
                || kw.phrases.iter().any(|p| text_lower.contains(p))
                || extra.iter().any(|name| name == kw.name)
        })
        .collect()
}

/// Extracts the canonical threat keywords present in a text.
pub fn extract(text: &str) -> Vec<String> {
    let text_lower = text.to_lowercase();
    let tokens = tokenize(&text_lower);
    matched(&tokens, &text_lower, &[]).into_iter().map(|kw| kw.name.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marketplace_matches_through_market_alias() {
        let found = extract("Dark Market buy now");
        assert!(found.contains(&"marketplace".to_string()));
    }

    #[test]
    fn hyphenated_zero_day_matches_as_phrase() {
        let found = extract("fresh zero-day for sale");
        assert!(found.contains(&"zero-day".to_string()));
    }

    #[test]
    fn tokens_shorter_than_three_chars_are_ignored(){
        let tokens = tokenize("ab cd efg");
        assert!(!tokens.contains("ab"));
        assert!(tokens.contains("efg"));
    }

    #[test]
    fn each_keyword_reported_once() {
        let found = extract("drugs drug drugs drug");
        assert_eq!(found, vec!["drug".to_string()]);
    }

    #[test]
    fn extraction_is_deterministic_dictionary_order() {
        let found = extract("escrow carding marketplace");
        assert_eq!(found, vec!["carding", "marketplace", "escrow"]);
    }
}
