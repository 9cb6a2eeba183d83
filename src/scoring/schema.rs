use super::{DimensionOutcome, DimensionScorer, ScoringContext};
use crate::error::ScoringError;
use crate::types::{Dimension, Page};

/// Schema types most answer engines know how to use.
pub const COMMON_SCHEMAS: &[&str] = &[
    "Organization",
    "WebPage",
    "Article",
    "FAQPage",
    "BreadcrumbList",
    "Product",
    "Service",
    "Person",
];

pub struct SchemaMarkupScorer;

impl DimensionScorer for SchemaMarkupScorer {
    fn dimension(&self) -> Dimension {
        Dimension::SchemaMarkup
    }

    fn evaluate(&self, page: &Page, _ctx: &ScoringContext<'_>) -> Result<DimensionOutcome, ScoringError> {
        let sd = &page.metadata.structured_data;
        let types = &sd.schema_types;
        let last_modified = page.last_modified();
        // nothing scores without content
        let has_content = page.has_content();

        let mut out = DimensionOutcome::default();
        out.award("structured_data", has_content && sd.is_present(), 10);
        out.award("schema_types", has_content && !types.is_empty(), 2 * types.len() as u32);
        out.award("canonical", has_content && page.metadata.canonical_url.is_some(), 3);
        out.award("last_modified", has_content && last_modified.is_some(), 2);
        out.award("sitemap_entry", has_content && page.metadata.site.in_sitemap, 3);

        out.detail("schemaTypes", types.clone());
        out.detail(
            "missingSchemas",
            COMMON_SCHEMAS
                .iter()
                .filter(|s| !types.iter().any(|t| t.as_str() == **s))
                .map(|s| s.to_string())
                .collect::<Vec<_>>(),
        );
        out.detail("jsonLdBlocks", sd.json_ld_blocks);
        out.detail("microdataItems", sd.microdata_items);
        if let Some((_, source)) = last_modified {
            out.detail("lastModifiedSource", serde_json::to_value(source).unwrap_or_default());
        }
        Ok(out)
    }
}
