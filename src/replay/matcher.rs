// src/replay/matcher.rs
//! Fuzzy matching of request descriptions
//!
//! Absent an exact textual match, a replayed response comes from the most
//! similar recorded request of the same wire type. Similarity is token
//! overlap: descriptions split on `/` then whitespace, scored as
//! `100 * matches / (matches + mismatches)`.

/// Whether two descriptions carry the same 3-char wire tag
pub fn same_kind(a: &str, b: &str) -> bool {
    match (a.as_bytes().get(2..5), b.as_bytes().get(2..5)) {
        (Some(tag_a), Some(tag_b)) => tag_a == tag_b,
        _ => false,
    }
}

/// Tokens of a description: split on `/`, then on whitespace
pub fn words(desc: &str) -> Vec<&str> {
    desc.split('/').flat_map(str::split_whitespace).collect()
}

/// Token-overlap score between two descriptions, 0..=100
pub fn match_percentage(a: &str, b: &str) -> f64 {
    let words_a = words(a);
    let words_b = words(b);
    let matches = words_a.iter().filter(|word| words_b.contains(word)).count();
    let denominator = words_a.len() + words_b.len() - matches;
    if denominator == 0 {
        return 0.0;
    }
    100.0 * matches as f64 / denominator as f64
}
