use super::text::{contains_any, CAUSAL_MARKERS, DEFINITION_MARKERS};
use super::{DimensionOutcome, DimensionScorer, ScoringContext};
use crate::error::ScoringError;
use crate::types::{Dimension, Page};

/// Heading hierarchy, block-element density, explanatory language and
/// internal linking.
pub struct SemanticStructureScorer;

impl DimensionScorer for SemanticStructureScorer {
    fn dimension(&self) -> Dimension {
        Dimension::SemanticStructure
    }

    fn evaluate(&self, page: &Page, _ctx: &ScoringContext<'_>) -> Result<DimensionOutcome, ScoringError> {
        let m = &page.metadata;
        let (h1, h2, h3) = (m.h1.len(), m.h2.len(), m.h3.len());
        let semantic_kinds = m.semantic_tags.len();
        let internal_links = page.internal_link_count();
        let content = page.content.as_str();

        let mut out = DimensionOutcome::default();
        out.award("single_h1", h1 == 1, 5);
        out.award("has_h2", h2 > 0, 4);
        out.award("h3_under_h2", h3 > 0 && h2 > 0, 3);
        out.award("no_heading_gap", h1 > 0 && !(h3 > 0 && h2 == 0), 2);
        if semantic_kinds >= 3 {
            out.award("semantic_tags", true, 3);
        } else {
            out.award("semantic_tags", semantic_kinds >= 1, 1);
        }
        out.award("lists_or_tables", m.list_count + m.table_count > 0, 2);
        out.award("paragraphs", m.paragraph_count >= 3, 2);
        out.award(
            "definitions",
            !content.is_empty() && (m.has_glossary || contains_any(content, DEFINITION_MARKERS)),
            2,
        );
        out.award("causal_language", !content.is_empty() && contains_any(content, CAUSAL_MARKERS), 2);
        out.award("internal_links", internal_links >= 3, 2);

        out.detail("h1Count", h1);
        out.detail("h2Count", h2);
        out.detail("h3Count", h3);
        out.detail("semanticTags", m.semantic_tags.keys().cloned().collect::<Vec<_>>());
        out.detail("paragraphCount", m.paragraph_count);
        out.detail("internalLinks", internal_links);
        Ok(out)
    }
}
