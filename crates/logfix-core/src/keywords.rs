//! Keyword extraction and content hashing.
//!
//! Logs are reduced to a set of lowercase tokens for candidate proposal
//! and category inference. Pattern identity is a SHA-256 over the sorted,
//! de-duplicated keyword set, so the same trigger set always hashes to
//! the same id regardless of order, case, or weights.

use std::collections::{BTreeSet, HashMap};

use sha2::{Digest, Sha256};

/// Hex characters kept from the SHA-256 digest for ids.
const ID_LEN: usize = 16;

/// Minimum token length kept by the extractor.
const MIN_TOKEN_LEN: usize = 3;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "that", "this", "was", "were", "are", "has", "have",
    "had", "not", "but", "you", "your", "all", "any", "can", "could", "will", "would", "into",
    "out", "its", "our", "then", "than", "when", "while", "there", "their", "been", "being",
    "which", "what", "who", "how", "why", "also", "just", "only", "some", "such", "via", "per",
    "info", "debug", "trace", "warn", "warning", "error", "err", "fatal", "level", "msg",
    "message", "time", "timestamp", "line", "true", "false", "null", "none",
];

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
        .map(|t| t.trim_matches(|c: char| c == '-' || c == '_').to_lowercase())
        .filter(|t| {
            t.chars().count() >= MIN_TOKEN_LEN
                && !t.chars().all(|c| c.is_ascii_digit() || c == '-' || c == '_')
                && !STOPWORDS.contains(&t.as_str())
        })
}

/// Extract the distinct keyword set of a log.
pub fn extract_keywords(text: &str) -> BTreeSet<String> {
    tokens(text).collect()
}

/// The `n` most frequent keywords, ties broken by first appearance.
pub fn top_keywords(text: &str, n: usize) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for (pos, tok) in tokens(text).enumerate() {
        counts.entry(tok).or_insert((0, pos)).0 += 1;
    }
    let mut ranked: Vec<(String, usize, usize)> = counts
        .into_iter()
        .map(|(tok, (count, first))| (tok, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked.into_iter().take(n).map(|(tok, _, _)| tok).collect()
}

/// Content hash of a keyword set: SHA-256 over the sorted, de-duplicated,
/// lowercased terms joined by newlines, truncated to 16 hex chars.
pub fn content_hash<'a>(terms: impl IntoIterator<Item = &'a str>) -> String {
    let canonical: BTreeSet<String> = terms
        .into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

    let mut hasher = Sha256::new();
    for (i, term) in canonical.iter().enumerate() {
        if i > 0 {
            hasher.update(b"\n");
        }
        hasher.update(term.as_bytes());
    }
    let hash = format!("{:x}", hasher.finalize());
    hash[..ID_LEN].to_string()
}
