use super::text::{contains_phrase, count_all, sentences, CITATION_MARKERS, EXAMPLE_MARKERS};
use super::{DimensionOutcome, DimensionScorer, ScoringContext};
use crate::error::ScoringError;
use crate::types::{Dimension, Page};

/// A family of user questions an answer engine might be asked, with the
/// phrases that make a page relevant to them.
pub struct PromptCategory {
    pub name: &'static str,
    pub prompts: &'static [&'static str],
    pub indicators: &'static [&'static str],
    pub weight: f64,
}

pub const PROMPT_CATEGORIES: &[PromptCategory] = &[
    PromptCategory {
        name: "how_to",
        prompts: &["How to write AI-visible articles?", "How to improve website visibility?"],
        indicators: &["how to", "steps", "guide", "tutorial", "instructions"],
        weight: 0.8,
    },
    PromptCategory {
        name: "optimization",
        prompts: &["Website optimization for search engines", "Content structure best practices"],
        indicators: &["optimize", "improve", "best practices", "structure", "seo"],
        weight: 0.7,
    },
    PromptCategory {
        name: "marketing",
        prompts: &["Content marketing strategies", "Digital marketing best practices"],
        indicators: &["marketing", "strategy", "content", "digital", "campaign"],
        weight: 0.6,
    },
    PromptCategory {
        name: "performance",
        prompts: &["Website performance optimization", "User experience design tips"],
        indicators: &["performance", "speed", "user experience", "ux", "design"],
        weight: 0.5,
    },
    PromptCategory {
        name: "business",
        prompts: &["Online business growth strategies"],
        indicators: &["business", "growth", "revenue", "customers", "sales"],
        weight: 0.4,
    },
];

/// Passages compared against the prompts are drawn from this many sentences.
const MAX_PASSAGES: usize = 200;

/// Mean weighted indicator coverage across every prompt, as a percentage.
pub fn query_overlap_percent(content: &str) -> f64 {
    let mut total = 0.0;
    let mut prompts = 0usize;
    for cat in PROMPT_CATEGORIES {
        let hits = cat
            .indicators
            .iter()
            .filter(|i| contains_phrase(content, i))
            .count();
        let relevance = (hits as f64 / cat.indicators.len() as f64).min(1.0) * cat.weight;
        total += relevance * cat.prompts.len() as f64;
        prompts += cat.prompts.len();
    }
    if prompts == 0 {
        0.0
    } else {
        (total / prompts as f64 * 100.0).min(100.0)
    }
}

/// Likelihood that an answer engine quotes this page for common questions.
pub struct AnswerInclusionScorer;

impl DimensionScorer for AnswerInclusionScorer {
    fn dimension(&self) -> Dimension {
        Dimension::AnswerInclusion
    }

    fn evaluate(&self, page: &Page, ctx: &ScoringContext<'_>) -> Result<DimensionOutcome, ScoringError> {
        let mut out = DimensionOutcome::default();
        if page.content.trim().is_empty() {
            out.detail("overlapPercentage", 0.0);
            return Ok(out);
        }

        let overlap = query_overlap_percent(&page.content);
        let overlap_points = if overlap >= 40.0 {
            4
        } else if overlap >= 20.0 {
            2
        } else if overlap > 0.0 {
            1
        } else {
            0
        };
        out.award("query_overlap", overlap_points > 0, overlap_points);

        // title, headings and sentences are the units an answer would quote
        let passages: Vec<&str> = std::iter::once(page.title.as_str())
            .chain(page.metadata.h1.iter().map(String::as_str))
            .chain(page.metadata.h2.iter().map(String::as_str))
            .chain(page.metadata.h3.iter().map(String::as_str))
            .chain(sentences(&page.content).into_iter().take(MAX_PASSAGES))
            .filter(|p| !p.trim().is_empty())
            .collect();
        let mut best = 0.0f64;
        let mut best_prompt = "";
        for cat in PROMPT_CATEGORIES {
            for prompt in cat.prompts {
                for passage in &passages {
                    let s = ctx.similarity.similarity(prompt, passage);
                    if s > best {
                        best = s;
                        best_prompt = *prompt;
                    }
                }
            }
        }
        let prompt_points = if best >= 0.5 {
            3
        } else if best >= 0.25 {
            1
        } else {
            0
        };
        out.award("prompt_overlap", prompt_points > 0, prompt_points);

        let examples = count_all(&page.content, EXAMPLE_MARKERS) + count_all(&page.content, CITATION_MARKERS);
        let example_points = if examples >= 3 {
            3
        } else if examples >= 1 {
            1
        } else {
            0
        };
        out.award("examples_and_citations", example_points > 0, example_points);

        out.detail("overlapPercentage", (overlap * 100.0).round() / 100.0);
        out.detail("bestPromptSimilarity", (best * 1000.0).round() / 1000.0);
        if !best_prompt.is_empty() {
            out.detail("bestPrompt", best_prompt);
        }
        out.detail("exampleMatches", examples);
        out.detail("similarityModel", ctx.similarity.name());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::similarity::LexicalSimilarity;
    use chrono::Utc;

    #[test]
    fn test_overlap_percent() {
        assert_eq!(query_overlap_percent(""), 0.0);
        // one marketing indicator: (1/5 * 0.6 * 2 prompts) / 9 prompts
        let p = query_overlap_percent("Our campaign launched.");
        assert!((p - (0.2 * 0.6 * 2.0 / 9.0 * 100.0)).abs() < 1e-9);
    }

    #[test]
    fn test_empty_content_scores_zero() {
        let ctx = ScoringContext { similarity: &LexicalSimilarity };
        let mut page = Page::empty("https://example.com/", Utc::now());
        page.title = "Website performance optimization".into();
        assert_eq!(AnswerInclusionScorer.evaluate(&page, &ctx).unwrap().points, 0);
    }

    #[test]
    fn test_prompt_similarity_uses_headings() {
        let ctx = ScoringContext { similarity: &LexicalSimilarity };
        let mut page = Page::empty("https://example.com/", Utc::now());
        page.content = "Nothing relevant here at all.".into();
        page.metadata.h2 = vec!["Website performance optimization".into()];
        let out = AnswerInclusionScorer.evaluate(&page, &ctx).unwrap();
        assert_eq!(out.points, 3);
        assert_eq!(out.details["bestPrompt"], "Website performance optimization");
    }
}
