use crate::types::{
    Dimension, DimensionAverage, DomainSummary, Page, Recommendation, Score,
};
use tracing::info;

/// Pages below this share of a dimension's maximum are listed as affected.
const AFFECTED_RATIO: f64 = 0.6;

/// One remediation statement per dimension, in declaration order.
const REMEDIATIONS: &[(Dimension, &str)] = &[
    (
        Dimension::SemanticStructure,
        "Restructure pages around one H1 with H2/H3 sections, use lists and tables for enumerations, and define key terms where they first appear.",
    ),
    (
        Dimension::SchemaMarkup,
        "Add JSON-LD structured data (Organization, WebPage or Article) with dateModified, declare canonical URLs, and list every content page in the sitemap.",
    ),
    (
        Dimension::ContentClarity,
        "Write self-contained sections that each answer one question, keep terminology consistent, and cut repeated sentences.",
    ),
    (
        Dimension::CrawlerAccessibility,
        "Serve content with a direct 200 response, remove redirect chains and bot challenges on content URLs, and allow AI crawlers in robots.txt.",
    ),
    (
        Dimension::Freshness,
        "Publish Last-Modified and Cache-Control headers and review content regularly so modification dates stay recent.",
    ),
    (
        Dimension::AnswerInclusion,
        "Phrase headings as the questions users ask, answer them directly, and back claims with concrete examples and cited sources.",
    ),
];

pub fn remediation_for(dimension: Dimension) -> &'static str {
    REMEDIATIONS
        .iter()
        .find(|(d, _)| *d == dimension)
        .map(|(_, text)| *text)
        .unwrap_or_default()
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Rolls page scores up into a domain summary.
///
/// The overall score is the mean page total rounded half up. Improvements
/// are ranked by lowest average dimension score, ties broken by dimension
/// declaration order; dimensions every page maxed out are skipped. An empty
/// input gives the zero summary.
pub fn aggregate(pages: &[(Page, Score)], top_n: usize) -> DomainSummary {
    if pages.is_empty() {
        return DomainSummary::default();
    }
    let n = pages.len() as u64;
    let sum: u64 = pages.iter().map(|(_, s)| s.total as u64).sum();
    let overall = ((2 * sum + n) / (2 * n)) as u8;

    let averages: Vec<DimensionAverage> = Dimension::ALL
        .iter()
        .map(|&dimension| {
            let total: u64 = pages.iter().map(|(_, s)| s.scores.get(dimension) as u64).sum();
            DimensionAverage {
                dimension,
                average: total as f64 / n as f64,
                max_points: dimension.max_points(),
            }
        })
        .collect();

    let mut ranked: Vec<&DimensionAverage> = averages
        .iter()
        .filter(|a| a.average < a.max_points as f64)
        .collect();
    // stable, so equal averages keep declaration order
    ranked.sort_by(|a, b| a.average.total_cmp(&b.average));

    let top_improvements = ranked
        .into_iter()
        .take(top_n)
        .map(|a| {
            let threshold = a.max_points as f64 * AFFECTED_RATIO;
            Recommendation {
                dimension: a.dimension,
                text: remediation_for(a.dimension).to_string(),
                average_score: round2(a.average),
                max_points: a.max_points,
                affected_pages: pages
                    .iter()
                    .filter(|(_, s)| (s.scores.get(a.dimension) as f64) < threshold)
                    .map(|(p, _)| p.url.clone())
                    .collect(),
            }
        })
        .collect::<Vec<_>>();

    info!(
        "Aggregated {} pages: overall score {}, {} improvements",
        pages.len(),
        overall,
        top_improvements.len()
    );

    DomainSummary {
        overall_score: overall,
        pages_analyzed: pages.len(),
        top_improvements,
        dimension_averages: averages
            .into_iter()
            .map(|a| DimensionAverage {
                average: round2(a.average),
                ..a
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DimensionScores;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn scored(url: &str, scores: DimensionScores) -> (Page, Score) {
        (
            Page::empty(url, Utc::now()),
            Score::from_scores(scores, BTreeMap::new()),
        )
    }

    fn uniform(v: u8) -> DimensionScores {
        DimensionScores {
            semantic_structure: v,
            schema_markup: v,
            content_clarity: v,
            crawler_accessibility: v,
            freshness: v,
            answer_inclusion: v,
        }
    }

    #[test]
    fn test_empty_input_is_zero() {
        let summary = aggregate(&[], 5);
        assert_eq!(summary.overall_score, 0);
        assert_eq!(summary.pages_analyzed, 0);
        assert!(summary.top_improvements.is_empty());
    }

    #[test]
    fn test_mean_rounds_half_up() {
        // totals 30 and 31 -> 30.5 -> 31
        let mut a = uniform(5);
        let mut b = uniform(5);
        a.semantic_structure = 5;
        b.semantic_structure = 6;
        let summary = aggregate(&[scored("https://a.test/1", a), scored("https://a.test/2", b)], 5);
        assert_eq!(summary.overall_score, 31);
        assert_eq!(summary.pages_analyzed, 2);
    }

    #[test]
    fn test_ranking_ties_follow_declaration_order() {
        let summary = aggregate(&[scored("https://a.test/", uniform(4))], 3);
        let dims: Vec<_> = summary.top_improvements.iter().map(|r| r.dimension).collect();
        assert_eq!(
            dims,
            vec![Dimension::SemanticStructure, Dimension::SchemaMarkup, Dimension::ContentClarity]
        );
    }

    #[test]
    fn test_lowest_first_and_maxed_skipped() {
        let scores = DimensionScores {
            semantic_structure: 25,
            schema_markup: 2,
            content_clarity: 15,
            crawler_accessibility: 15,
            freshness: 1,
            answer_inclusion: 9,
        };
        let summary = aggregate(&[scored("https://a.test/", scores)], 6);
        let dims: Vec<_> = summary.top_improvements.iter().map(|r| r.dimension).collect();
        assert_eq!(
            dims,
            vec![
                Dimension::Freshness,
                Dimension::SchemaMarkup,
                Dimension::AnswerInclusion,
                Dimension::ContentClarity,
            ]
        );
    }

    #[test]
    fn test_affected_pages_below_threshold() {
        let mut good = uniform(10);
        good.freshness = 9;
        let mut poor = uniform(10);
        poor.freshness = 2;
        let pages = [scored("https://a.test/good", good), scored("https://a.test/poor", poor)];
        let summary = aggregate(&pages, 6);
        let freshness = summary
            .top_improvements
            .iter()
            .find(|r| r.dimension == Dimension::Freshness)
            .unwrap();
        assert_eq!(freshness.affected_pages, vec!["https://a.test/poor".to_string()]);
        assert_eq!(freshness.average_score, 5.5);
        assert_eq!(aggregate(&pages, 6), summary);
    }
}
