//! Trigram fuzzy matching for species names.
//!
//! Field recordings come back with a mix of scientific names, common names
//! and free-text labels, often with minor spelling variation. Trigram
//! Jaccard similarity tolerates single-character edits and partial matches
//! without an external NLP dependency.

use std::collections::HashSet;

/// Default similarity threshold used by the report filter.
pub const DEFAULT_MIN_SCORE: f64 = 0.35;

/// Lowercase and collapse internal whitespace runs to a single space.
fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Decompose a string into its set of overlapping 3-character windows.
///
/// The normalized string is padded with two spaces on each side so that
/// leading and trailing characters form boundary trigrams. A string that is
/// empty after normalization yields no trigrams at all.
fn trigram_set(s: &str) -> HashSet<Vec<char>> {
    let normalized = normalize(s);
    if normalized.is_empty() {
        return HashSet::new();
    }
    let padded: Vec<char> = format!("  {}  ", normalized).chars().collect();
    padded.windows(3).map(|w| w.to_vec()).collect()
}

/// Trigram Jaccard similarity between two strings, in [0, 1].
///
/// Symmetric, and 1.0 for identical inputs with at least one trigram. If
/// either side yields zero trigrams the similarity is 0.
pub fn similarity(a: &str, b: &str) -> f64 {
    let ta = trigram_set(a);
    let tb = trigram_set(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let intersection = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    intersection as f64 / union as f64
}

/// Every candidate whose similarity to `query` is at least `min_score`.
///
/// Set semantics: duplicate candidate strings collapse, ties are not broken.
pub fn match_set<I, S>(query: &str, candidates: I, min_score: f64) -> HashSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    candidates
        .into_iter()
        .filter(|c| similarity(query, c.as_ref()) >= min_score)
        .map(|c| c.as_ref().to_string())
        .collect()
}
