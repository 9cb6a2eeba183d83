use super::{DimensionOutcome, DimensionScorer, ScoringContext};
use crate::error::ScoringError;
use crate::types::{AiCrawlerPolicy, Dimension, Page};

/// Whether an AI crawler would get the content: a clean 200, no redirect
/// hops, no challenge page, and robots.txt welcoming AI agents. When the
/// crawl requested the site as an AI crawler, that response must pass too.
pub struct CrawlerAccessibilityScorer;

impl DimensionScorer for CrawlerAccessibilityScorer {
    fn dimension(&self) -> Dimension {
        Dimension::CrawlerAccessibility
    }

    fn evaluate(&self, page: &Page, _ctx: &ScoringContext<'_>) -> Result<DimensionOutcome, ScoringError> {
        let r = &page.response;
        // an empty document is itself a block
        let served = r.status == 200 && page.has_content();
        let view = page.metadata.site.crawler_view.as_ref();
        let crawler_blocked = view.map(|v| v.is_blocked()).unwrap_or(false);
        let crawler_redirected = view.map(|v| !v.redirects.is_empty()).unwrap_or(false);

        let mut out = DimensionOutcome::default();
        out.award("status_ok", served, 8);
        out.award("no_redirects", served && r.redirects.is_empty() && !crawler_redirected, 3);
        out.award(
            "no_block_signals",
            served && r.block_signals.is_empty() && !crawler_blocked,
            2,
        );
        out.award(
            "ai_crawlers_allowed",
            served
                && page.metadata.site.ai_crawlers == AiCrawlerPolicy::ExplicitlyAllowed
                && !crawler_blocked,
            2,
        );

        out.detail("status", r.status);
        out.detail("redirects", r.redirects.clone());
        out.detail("blockSignals", r.block_signals.clone());
        out.detail(
            "aiCrawlers",
            serde_json::to_value(page.metadata.site.ai_crawlers).unwrap_or_default(),
        );
        if let Some(v) = view {
            out.detail("crawlerView", serde_json::to_value(v).unwrap_or_default());
        }
        if let Some(tag) = &r.x_robots_tag {
            out.detail("xRobotsTag", tag.clone());
        }
        Ok(out)
    }
}
