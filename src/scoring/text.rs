//! Lexical helpers shared by the sub-scorers and highlight generation.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-zA-Z]{3,}\b").expect("word pattern is valid"));

static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+").expect("sentence pattern is valid"));

const STOP_WORDS: &[&str] = &[
    "the", "and", "but", "for", "with", "are", "was", "were", "been", "have", "has", "had",
    "does", "did", "will", "would", "could", "should", "may", "might", "this", "that", "these",
    "those", "from", "into", "through", "during", "before", "after", "above", "below",
    "between", "among", "its", "not", "can", "you", "your", "our", "they", "their", "what",
    "how", "who",
];

pub const DEFINITION_MARKERS: &[&str] =
    &["is defined as", "refers to", "means", "is a type of", "is known as", "is a", "is an"];

pub const CAUSAL_MARKERS: &[&str] = &[
    "because", "therefore", "as a result", "due to", "consequently", "leads to", "so that",
    "thus", "which causes",
];

pub const EXAMPLE_MARKERS: &[&str] = &["for example", "for instance", "such as", "e.g.", "including"];

pub const CITATION_MARKERS: &[&str] = &[
    "according to", "source:", "research shows", "study", "survey", "data from", "reported by",
];

/// Lowercased content words: three or more ASCII letters, stop words removed.
pub fn words(text: &str) -> Vec<String> {
    WORD.find_iter(text)
        .map(|m| m.as_str().to_ascii_lowercase())
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

pub fn token_set(text: &str) -> BTreeSet<String> {
    words(text).into_iter().collect()
}

pub fn sentences(text: &str) -> Vec<&str> {
    SENTENCE_END
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn is_word_char(c: Option<char>) -> bool {
    c.map(|c| c.is_alphanumeric()).unwrap_or(false)
}

/// Occurrences of `phrase` in `haystack` at word boundaries, ASCII
/// case-insensitive. Both sides are lowercased here.
pub fn count_phrase(haystack: &str, phrase: &str) -> usize {
    let hay = haystack.to_lowercase();
    let needle = phrase.to_lowercase();
    if needle.is_empty() {
        return 0;
    }
    let mut count = 0;
    let mut from = 0;
    while let Some(pos) = hay[from..].find(&needle) {
        let start = from + pos;
        let end = start + needle.len();
        let before = hay[..start].chars().next_back();
        let after = hay[end..].chars().next();
        let first_is_word = needle.chars().next().map(|c| c.is_alphanumeric()).unwrap_or(false);
        let last_is_word = needle.chars().next_back().map(|c| c.is_alphanumeric()).unwrap_or(false);
        if !(first_is_word && is_word_char(before)) && !(last_is_word && is_word_char(after)) {
            count += 1;
        }
        from = end;
    }
    count
}

pub fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    count_phrase(haystack, phrase) > 0
}

pub fn contains_any(haystack: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| contains_phrase(haystack, p))
}

pub fn count_all(haystack: &str, phrases: &[&str]) -> usize {
    phrases.iter().map(|p| count_phrase(haystack, p)).sum()
}

/// Points for `ratio` in [0, 1] scaled to `max`, rounded down.
pub fn floor_points(ratio: f64, max: u32) -> u32 {
    if !ratio.is_finite() {
        return 0;
    }
    (ratio.clamp(0.0, 1.0) * max as f64).floor() as u32
}
