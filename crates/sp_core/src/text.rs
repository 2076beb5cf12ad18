//! Text canonicalization used for keyword matching, similarity and dedup keys.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use sha2::{Digest, Sha256};

fn url_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://\S+").expect("static URL pattern"))
}

fn fold_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Word characters, whitespace, hiragana, katakana and CJK ideographs survive.
    RE.get_or_init(|| Regex::new(r"[^\w\sぁ-んァ-ン一-龥]").expect("static fold pattern"))
}

fn space_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static whitespace pattern"))
}

/// Lowercase, drop URLs, fold punctuation into spaces and collapse whitespace.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let without_urls = url_pattern().replace_all(lowered.trim(), "");
    let folded = fold_pattern().replace_all(&without_urls, " ");
    space_pattern().replace_all(&folded, " ").trim().to_string()
}

pub fn token_set(text: &str) -> HashSet<String> {
    normalize(text)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Token-set Jaccard similarity. An empty side yields `0.0`, never "identical".
pub fn jaccard(a: &str, b: &str) -> f64 {
    let left = token_set(a);
    let right = token_set(b);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let shared = left.intersection(&right).count();
    let total = left.union(&right).count();
    shared as f64 / total as f64
}

/// Hex-encoded SHA-256 of the input.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
