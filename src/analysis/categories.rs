//! Category classification rules.
//!
//! Each category carries a keyword set and a weight. A category scores
//! `distinct matches x weight`; the best score wins, ties broken by higher
//! weight and then by name. No match at all classifies as `Unknown`.

use std::collections::HashSet;

/// Category assigned when no rule matches.
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// One classification rule.
#[derive(Debug)]
pub struct CategoryRule {
    /// Category name from the closed set.
    pub name: &'static str,
    /// Priority multiplier.
    pub weight: f64,
    /// Single-token indicators matched against the token set.
    pub tokens: &'static [&'static str],
    /// Multi-word indicators matched by containment.
    pub phrases: &'static [&'static str],
}

/// The closed category set with its indicator vocabulary.
pub const CATEGORY_RULES: &[CategoryRule] = &[
    CategoryRule {
        name: "Illegal Marketplace",
        weight: 3.7,
        tokens: &[
            "shop", "store", "buy", "sell", "vendor", "market", "marketplace", "product", "drugs",
            "weapon", "exploit", "stolen", "illegal", "contraband", "escrow", "carding", "cvv",
        ],
        phrases: &[],
    },
    CategoryRule {
        name: "Financial/Crypto",
        weight: 1.6,
        tokens: &[
            "bitcoin", "crypto", "wallet", "payment", "transaction", "money", "ethereum",
            "monero", "zcash", "blockchain", "exchange", "mining", "coin",
        ],
        phrases: &[],
    },
    CategoryRule {
        name: "Hacking/Exploitation",
        weight: 3.8,
        tokens: &[
            "hack", "hacking", "hacker", "exploit", "vulnerability", "malware", "ransomware",
            "ddos", "botnet", "payload", "breach", "intrusion", "worm", "trojan", "keylogger",
            "database", "carding", "dump", "cvv",
        ],
        phrases: &["zero-day", "remote access"],
    },
    CategoryRule {
        name: "Data Leak",
        weight: 3.4,
        tokens: &[
            "leak", "leaked", "database", "dump", "credentials", "password", "breach", "exposed",
            "confidential", "classified", "documents", "records",
        ],
        phrases: &["personal data", "user data"],
    },
    CategoryRule {
        name: "Fraud",
        weight: 2.5,
        tokens: &[
            "fraud", "scam", "phishing", "forgery", "fake", "counterfeit", "ponzi", "scheme",
            "clone", "impersonate", "spoof",
        ],
        phrases: &["money laundering", "identity theft"],
    },
    CategoryRule {
        name: "Communication/Forum",
        weight: 1.0,
        tokens: &[
            "forum", "chat", "message", "contact", "email", "discuss", "community", "board",
            "thread", "post", "group", "channel",
        ],
        phrases: &[],
    },
    CategoryRule {
        name: "Document/Info",
        weight: 1.2,
        tokens: &[
            "document", "guide", "manual", "tutorial", "information", "research", "whitepaper",
            "pdf", "archive", "collection", "library", "reference",
        ],
        phrases: &[],
    },
    CategoryRule {
        name: "Adult Content",
        weight: 1.5,
        tokens: &[
            "adult", "explicit", "nsfw", "sex", "porn", "xxx", "escort", "prostitution",
            "dating", "cam",
        ],
        phrases: &[],
    },
];

/// Outcome of classifying a page.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Winning category name, or `Unknown`.
    pub category: String,
    /// Number of distinct indicators matched by the winning rule.
    pub matches: u32,
    /// Weight of the winning rule; zero for `Unknown`.
    pub weight: f64,
}

impl Classification {
    fn unknown() -> Self {
        Self { category: UNKNOWN_CATEGORY.to_string(), matches: 0, weight: 0.0 }
    }
}

/// Classifies a page from its token set and lowercased text.
pub fn classify(tokens: &HashSet<String>, text_lower: &str) -> Classification {
    let mut best: Option<(&CategoryRule, u32, f64)> = None;

    for rule in CATEGORY_RULES {
        let matches = rule.tokens.iter().filter(|t| tokens.contains(**t)).count()
            + rule.phrases.iter().filter(|p| text_lower.contains(**p)).count();
        if matches == 0 {
            continue;
        }
        let matches = matches as u32;
        let score = f64::from(matches) * rule.weight;
        let wins = match best {
            None => true,
            Some((current, _, current_score)) => {
                score > current_score
                    || (score == current_score
                        && (rule.weight > current.weight
                            || (rule.weight == current.weight && rule.name < current.name)))
            }
        };
        if wins {
            best = Some((rule, matches, score));
        }
    }

    match best {
        Some((rule, matches, _)) => {
            Classification { category: rule.name.to_string(), matches, weight: rule.weight }
        }
        None => Classification::unknown(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::keywords::tokenize;

    fn classify_text(text: &str) -> Classification {
        let lower = text.to_lowercase();
        classify(&tokenize(&lower), &lower)
    }

    #[test]
    fn marketplace_page_classifies_as_illegal_marketplace() {
        let c = classify_text("dark market shop buy escrow carding");
        assert_eq!(c.category, "Illegal Marketplace");
        assert_eq!(c.matches, 5);
    }

    #[test]
    fn no_indicators_classify_as_unknown() {
        let c = classify_text("the quick brown fox");
        assert_eq!(c.category, UNKNOWN_CATEGORY);
        assert_eq!(c.matches, 0);
    }

    #[test]
    fn single_indicators_prefer_the_weighted_category() {
        // One forum token against one hacking token: the 3.8x weight wins.
        let c = classify_text("hack forum");
        assert_eq!(c.category, "Hacking/Exploitation");
    }

    #[test]
    fn phrase_indicators_count_as_matches() {
        let c = classify_text("selling remote access toolkits");
        assert_eq!(c.category, "Hacking/Exploitation");
    }

    #[test]
    fn classification_is_deterministic() {
        let a = classify_text("bitcoin wallet exchange");
        let b = classify_text("bitcoin wallet exchange");
        assert_eq!(a, b);
        assert_eq!(a.category, "Financial/Crypto");
    }
}
