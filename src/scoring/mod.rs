//! Page scoring: six independent sub-scorers, each a sum of fixed-point
//! checks clamped to its dimension maximum.
//!
//! Scoring is synchronous and reads only what extraction already put on the
//! [`Page`]; nothing here touches the network or the clock.

pub mod accessibility;
pub mod answer;
pub mod clarity;
pub mod freshness;
pub mod schema;
pub mod semantic;
pub mod similarity;
pub mod text;

use crate::aggregate::remediation_for;
use crate::error::ScoringError;
use crate::types::{Dimension, DimensionScores, Page, Score};
use serde_json::{json, Map, Value};
use similarity::{LexicalSimilarity, SimilarityModel};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// Points earned by one sub-scorer plus the values it looked at.
#[derive(Debug, Default)]
pub struct DimensionOutcome {
    pub points: u32,
    pub details: Map<String, Value>,
}

impl DimensionOutcome {
    /// Adds `points` when `passed`, and records the points earned under
    /// `checks.<check>` either way.
    pub fn award(&mut self, check: &str, passed: bool, points: u32) {
        let earned = if passed { points } else { 0 };
        self.points += earned;
        let checks = self
            .details
            .entry("checks")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(map) = checks {
            map.insert(check.to_string(), Value::from(earned));
        }
    }

    pub fn detail<V: Into<Value>>(&mut self, key: &str, value: V) {
        self.details.insert(key.to_string(), value.into());
    }
}

pub struct ScoringContext<'a> {
    pub similarity: &'a dyn SimilarityModel,
}

pub trait DimensionScorer: Send + Sync {
    fn dimension(&self) -> Dimension;

    fn evaluate(&self, page: &Page, ctx: &ScoringContext<'_>) -> Result<DimensionOutcome, ScoringError>;
}

/// Share of a dimension's maximum at or above which it counts as a strength.
const STRENGTH_RATIO: f64 = 0.8;
/// Share of a dimension's maximum below which it counts as a weakness.
const WEAKNESS_RATIO: f64 = 0.5;

#[derive(Clone)]
pub struct ScoringEngine {
    similarity: Arc<dyn SimilarityModel>,
    scorers: Arc<Vec<Box<dyn DimensionScorer>>>,
}

impl std::fmt::Debug for ScoringEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoringEngine")
            .field("similarity", &self.similarity.name())
            .field("scorers", &self.scorers.len())
            .finish()
    }
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new(Arc::new(LexicalSimilarity))
    }
}

impl ScoringEngine {
    pub fn new(similarity: Arc<dyn SimilarityModel>) -> Self {
        Self::with_scorers(
            similarity,
            vec![
                Box::new(semantic::SemanticStructureScorer),
                Box::new(schema::SchemaMarkupScorer),
                Box::new(clarity::ContentClarityScorer),
                Box::new(accessibility::CrawlerAccessibilityScorer),
                Box::new(freshness::FreshnessScorer),
                Box::new(answer::AnswerInclusionScorer),
            ],
        )
    }

    pub fn with_scorers(
        similarity: Arc<dyn SimilarityModel>,
        scorers: Vec<Box<dyn DimensionScorer>>,
    ) -> Self {
        Self {
            similarity,
            scorers: Arc::new(scorers),
        }
    }

    /// Scores one page. Never fails: a sub-scorer that errors or panics
    /// turns the whole result into [`Score::fallback`].
    pub fn score(&self, page: &Page) -> Score {
        match self.try_score(page) {
            Ok(score) => score,
            Err(e) => {
                warn!("Scoring failed for {}: {}", page.url, e);
                Score::fallback(&e.to_string())
            }
        }
    }

    fn try_score(&self, page: &Page) -> Result<Score, ScoringError> {
        let ctx = ScoringContext {
            similarity: self.similarity.as_ref(),
        };
        let mut scores = DimensionScores::default();
        let mut details = BTreeMap::new();

        for scorer in self.scorers.iter() {
            let dimension = scorer.dimension();
            let outcome = catch_unwind(AssertUnwindSafe(|| scorer.evaluate(page, &ctx)))
                .map_err(|_| ScoringError::Panicked {
                    dimension: dimension.label().to_string(),
                })??;

            scores.set(dimension, outcome.points);
            let mut entry = outcome.details;
            entry.insert("points".to_string(), Value::from(scores.get(dimension)));
            entry.insert("max".to_string(), Value::from(dimension.max_points()));
            details.insert(dimension.key().to_string(), Value::Object(entry));
        }

        details.insert("analysis".to_string(), analysis(&scores));
        Ok(Score::from_scores(scores, details))
    }
}

/// Strengths, weaknesses and recommendations derived from how close each
/// dimension came to its maximum.
fn analysis(scores: &DimensionScores) -> Value {
    let mut strengths = Vec::new();
    let mut weaknesses = Vec::new();
    let mut recommendations = Vec::new();
    for (dimension, points) in scores.iter() {
        let ratio = points as f64 / dimension.max_points() as f64;
        if ratio >= STRENGTH_RATIO {
            strengths.push(format!("Strong {} ({}/{})", dimension.label(), points, dimension.max_points()));
        } else if ratio < WEAKNESS_RATIO {
            weaknesses.push(format!("Weak {} ({}/{})", dimension.label(), points, dimension.max_points()));
            recommendations.push(remediation_for(dimension).to_string());
        }
    }
    json!({
        "strengths": strengths,
        "weaknesses": weaknesses,
        "recommendations": recommendations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ScoreStatus, Section, VisibilityTier};
    use chrono::{TimeZone, Utc};

    fn sample_page() -> Page {
        let fetched = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let mut page = Page::empty("https://example.com/guide", fetched);
        page.title = "Caching guide".into();
        page.content = "A cache is a store of computed results. It helps because recomputing is slow. \
                        For example, a page view can reuse a rendered fragment."
            .into();
        page.metadata.h1 = vec!["Caching guide".into()];
        page.metadata.h2 = vec!["Why cache".into()];
        page.metadata.sections = vec![Section {
            heading: "Why cache".into(),
            text: page.content.clone(),
        }];
        page.response.status = 200;
        page
    }

    #[test]
    fn test_score_is_deterministic() {
        let engine = ScoringEngine::default();
        let page = sample_page();
        assert_eq!(engine.score(&page), engine.score(&page));
    }

    #[test]
    fn test_scores_within_bounds() {
        let engine = ScoringEngine::default();
        let score = engine.score(&sample_page());
        assert_eq!(score.status, ScoreStatus::Complete);
        for (dimension, points) in score.scores.iter() {
            assert!(points <= dimension.max_points());
        }
        assert_eq!(score.total, score.scores.total());
        assert!(score.check_bounds().is_ok());
        assert!(score.details.contains_key("semantic_structure"));
        assert!(score.details["analysis"]["weaknesses"].is_array());
    }

    #[test]
    fn test_empty_page_scores_zero() {
        let engine = ScoringEngine::default();
        let page = Page::empty("https://example.com/", Utc::now());
        let score = engine.score(&page);
        for (_, points) in score.scores.iter() {
            assert_eq!(points, 0);
        }
        assert_eq!(score.total, 0);
        assert_eq!(score.tier, VisibilityTier::Low);
        assert!(score.summary.starts_with("Low visibility"));
    }

    struct Exploding;

    impl DimensionScorer for Exploding {
        fn dimension(&self) -> Dimension {
            Dimension::Freshness
        }

        fn evaluate(&self, _page: &Page, _ctx: &ScoringContext<'_>) -> Result<DimensionOutcome, ScoringError> {
            panic!("boom");
        }
    }

    struct Overflowing;

    impl DimensionScorer for Overflowing {
        fn dimension(&self) -> Dimension {
            Dimension::Freshness
        }

        fn evaluate(&self, _page: &Page, _ctx: &ScoringContext<'_>) -> Result<DimensionOutcome, ScoringError> {
            let mut out = DimensionOutcome::default();
            out.award("a", true, 8);
            out.award("b", true, 8);
            Ok(out)
        }
    }

    #[test]
    fn test_panicking_scorer_falls_back() {
        let engine = ScoringEngine::with_scorers(Arc::new(LexicalSimilarity), vec![Box::new(Exploding)]);
        let score = engine.score(&sample_page());
        assert_eq!(score.status, ScoreStatus::Fallback);
        assert_eq!(score.total, 0);
        assert!(score.details["error"].as_str().unwrap().contains("freshness"));
    }

    #[test]
    fn test_overlapping_checks_are_clamped() {
        let engine = ScoringEngine::with_scorers(Arc::new(LexicalSimilarity), vec![Box::new(Overflowing)]);
        let score = engine.score(&sample_page());
        assert_eq!(score.scores.freshness, 10);
        assert_eq!(score.details["freshness"]["checks"]["b"], 8);
    }
}
