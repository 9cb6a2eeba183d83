use super::{DimensionOutcome, DimensionScorer, ScoringContext};
use crate::error::ScoringError;
use crate::types::{Dimension, Page};

/// Points for content age in days.
pub fn age_points(age_days: Option<i64>) -> u32 {
    match age_days {
        Some(d) if d <= 7 => 6,
        Some(d) if d <= 30 => 4,
        Some(d) if d <= 90 => 2,
        _ => 0,
    }
}

/// Age is measured against the page's own fetch time, never the clock at
/// scoring time, so rescoring a stored page gives the same result.
pub struct FreshnessScorer;

impl DimensionScorer for FreshnessScorer {
    fn dimension(&self) -> Dimension {
        Dimension::Freshness
    }

    fn evaluate(&self, page: &Page, _ctx: &ScoringContext<'_>) -> Result<DimensionOutcome, ScoringError> {
        // nothing scores without content
        let has_content = page.has_content();
        let last_modified = page.last_modified();
        let age = page.age_days();
        let cache_control = page
            .response
            .cache_control
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());

        let mut out = DimensionOutcome::default();
        out.award("last_modified", has_content && last_modified.is_some(), 2);
        out.award("cache_control", has_content && cache_control.is_some(), 2);
        out.award("recent", has_content && age_points(age) > 0, age_points(age));

        if let Some((date, source)) = last_modified {
            out.detail("lastModified", date.to_rfc3339());
            out.detail("lastModifiedSource", serde_json::to_value(source).unwrap_or_default());
        }
        out.detail("ageDays", age);
        if let Some(c) = cache_control {
            out.detail("cacheControl", c.to_string());
        }
        if let Some(etag) = &page.response.etag {
            out.detail("etag", etag.clone());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::similarity::LexicalSimilarity;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn test_age_tiers() {
        assert_eq!(age_points(Some(0)), 6);
        assert_eq!(age_points(Some(7)), 6);
        assert_eq!(age_points(Some(8)), 4);
        assert_eq!(age_points(Some(30)), 4);
        assert_eq!(age_points(Some(90)), 2);
        assert_eq!(age_points(Some(91)), 0);
        assert_eq!(age_points(None), 0);
    }

    #[test]
    fn test_freshness_uses_fetch_time() {
        let ctx = ScoringContext { similarity: &LexicalSimilarity };
        let fetched = Utc.with_ymd_and_hms(2023, 3, 10, 12, 0, 0).unwrap();
        let mut page = Page::empty("https://example.com/", fetched);
        page.content = "Release notes for the March update.".into();
        page.metadata.site.sitemap_lastmod = Some(fetched - Duration::days(20));
        page.response.cache_control = Some("max-age=300".into());

        let out = FreshnessScorer.evaluate(&page, &ctx).unwrap();
        assert_eq!(out.points, 2 + 2 + 4);
        assert_eq!(out.details["ageDays"], 20);
    }

    #[test]
    fn test_empty_page_with_headers_scores_zero() {
        let ctx = ScoringContext { similarity: &LexicalSimilarity };
        let fetched = Utc.with_ymd_and_hms(2023, 3, 10, 12, 0, 0).unwrap();
        let mut page = Page::empty("https://example.com/", fetched);
        page.response.last_modified = Some(fetched);
        page.response.cache_control = Some("max-age=60".into());

        let out = FreshnessScorer.evaluate(&page, &ctx).unwrap();
        assert_eq!(out.points, 0);
        assert_eq!(out.details["ageDays"], 0);
    }
}
