use super::text::{contains_any, floor_points, sentences, token_set, words};
use super::{DimensionOutcome, DimensionScorer, ScoringContext};
use crate::error::ScoringError;
use crate::types::{Dimension, Page, Section};
use std::collections::BTreeMap;

/// Sentence pairs compared for redundancy are drawn from this many sentences.
const MAX_REDUNDANCY_SENTENCES: usize = 200;

const CONTEXT_WORDS: &[&str] = &["this", "here", "above", "below", "following"];
const DEFINITION_WORDS: &[&str] = &["means", "refers to", "is defined as"];
const EXAMPLE_WORDS: &[&str] = &["for example", "such as", "including", "like"];
const CONCLUSION_WORDS: &[&str] = &["therefore", "thus", "in conclusion", "summary"];
const SEQUENCE_WORDS: &[&str] = &["first", "second", "third", "finally", "next", "then"];
const SPECIFIC_WORDS: &[&str] = &["specifically", "particularly", "especially", "namely"];

/// How well passages stand alone once chunked: vocabulary consistency,
/// self-containment, redundancy and per-section clarity.
pub struct ContentClarityScorer;

/// Normalized Shannon entropy of the content-word distribution.
pub fn term_consistency(text: &str) -> f64 {
    let words = words(text);
    if words.is_empty() {
        return 0.0;
    }
    let mut freq: BTreeMap<&str, usize> = BTreeMap::new();
    for w in &words {
        *freq.entry(w.as_str()).or_default() += 1;
    }
    if freq.len() < 2 {
        return 0.0;
    }
    let total = words.len() as f64;
    let entropy: f64 = freq
        .values()
        .map(|&c| {
            let p = c as f64 / total;
            -p * p.log2()
        })
        .sum();
    (entropy / (freq.len() as f64).log2()).min(1.0)
}

fn indicator_ratio(flags: &[bool]) -> f64 {
    flags.iter().filter(|f| **f).count() as f64 / flags.len() as f64
}

/// Mean share of self-containment indicators across non-empty sections.
pub fn self_containment(sections: &[Section]) -> f64 {
    let scores: Vec<f64> = sections
        .iter()
        .filter(|s| !s.text.trim().is_empty())
        .map(|s| {
            let t = s.text.as_str();
            indicator_ratio(&[
                t.split_whitespace().count() > 50,
                contains_any(t, CONTEXT_WORDS),
                contains_any(t, DEFINITION_WORDS),
                contains_any(t, EXAMPLE_WORDS),
                contains_any(t, CONCLUSION_WORDS),
            ])
        })
        .collect();
    if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    }
}

/// Mean pairwise Jaccard similarity between sentences, or `None` when there
/// are fewer than two comparable sentences.
pub fn redundancy(text: &str) -> Option<f64> {
    let sets: Vec<_> = sentences(text)
        .into_iter()
        .take(MAX_REDUNDANCY_SENTENCES)
        .map(token_set)
        .filter(|s| !s.is_empty())
        .collect();
    if sets.len() < 2 {
        return None;
    }
    let mut sum = 0.0;
    let mut pairs = 0usize;
    for i in 0..sets.len() {
        for j in (i + 1)..sets.len() {
            let shared = sets[i].intersection(&sets[j]).count();
            let union = sets[i].union(&sets[j]).count();
            sum += shared as f64 / union as f64;
            pairs += 1;
        }
    }
    Some(sum / pairs as f64)
}

pub fn section_clarity(text: &str) -> f64 {
    let word_count = text.split_whitespace().count();
    if word_count == 0 {
        return 0.0;
    }
    if word_count < 10 {
        return 0.3;
    }
    indicator_ratio(&[
        contains_any(text, SEQUENCE_WORDS),
        contains_any(text, SPECIFIC_WORDS),
        contains_any(text, EXAMPLE_WORDS),
        contains_any(text, DEFINITION_WORDS),
        text.chars().any(|c| c.is_ascii_digit()),
        (50..=500).contains(&word_count),
    ])
}

impl DimensionScorer for ContentClarityScorer {
    fn dimension(&self) -> Dimension {
        Dimension::ContentClarity
    }

    fn evaluate(&self, page: &Page, _ctx: &ScoringContext<'_>) -> Result<DimensionOutcome, ScoringError> {
        let sections = &page.metadata.sections;
        let tc = term_consistency(&page.content);
        let sc = self_containment(sections);
        let red = redundancy(&page.content);
        let clarities: Vec<f64> = sections.iter().map(|s| section_clarity(&s.text)).collect();
        let mean_clarity = if clarities.is_empty() {
            0.0
        } else {
            clarities.iter().sum::<f64>() / clarities.len() as f64
        };

        let mut out = DimensionOutcome::default();
        out.award("term_consistency", true, floor_points(tc, 6));
        out.award("self_containment", true, floor_points(sc, 6));
        // too little text to judge repetition earns nothing
        out.award("low_redundancy", red.is_some(), red.map(|r| floor_points(1.0 - r, 4)).unwrap_or(0));
        out.award("section_clarity", !clarities.is_empty(), floor_points(mean_clarity, 4));

        out.detail("termConsistency", tc);
        out.detail("selfContainment", sc);
        out.detail("redundancy", red);
        out.detail("sectionClarity", mean_clarity);
        out.detail("sectionCount", sections.len());
        Ok(out)
    }
}
