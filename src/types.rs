use crate::error::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Page
// ---------------------------------------------------------------------------

/// One crawled URL: the rendered markup snapshot plus the metadata projection
/// derived from it. Never mutated after extraction; a re-crawl yields a new Page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: Uuid,
    pub url: String,
    pub title: String,
    pub description: String,
    /// Raw rendered markup this page was extracted from.
    pub html: String,
    /// Whitespace-normalized main content, length-capped.
    pub content: String,
    pub metadata: PageMetadata,
    pub response: ResponseMeta,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageMetadata {
    pub h1: Vec<String>,
    pub h2: Vec<String>,
    pub h3: Vec<String>,
    /// Absolute anchor targets in document order, deduplicated.
    pub links: Vec<String>,
    /// Non-empty image alt texts.
    pub image_alts: Vec<String>,
    pub images_total: usize,
    pub images_missing_alt: usize,
    pub structured_data: StructuredData,
    pub canonical_url: Option<String>,
    pub meta_lastmod: Option<DateTime<Utc>>,
    pub robots_meta: Option<String>,
    /// Counts of semantic HTML elements keyed by tag name.
    pub semantic_tags: BTreeMap<String, usize>,
    pub paragraph_count: usize,
    pub list_count: usize,
    pub table_count: usize,
    pub has_glossary: bool,
    pub sections: Vec<Section>,
    #[serde(default)]
    pub site: SiteContext,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructuredData {
    pub json_ld_blocks: usize,
    pub microdata_items: usize,
    /// Distinct schema.org types, sorted.
    pub schema_types: Vec<String>,
    pub date_modified: Option<DateTime<Utc>>,
}

impl StructuredData {
    pub fn is_present(&self) -> bool {
        self.json_ld_blocks > 0 || self.microdata_items > 0 || !self.schema_types.is_empty()
    }
}

/// Heading-delimited chunk of body text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub heading: String,
    pub text: String,
}

/// Facts about a page that come from the rest of the site rather than the
/// page itself. Filled in by the crawler before the page is scored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteContext {
    pub in_sitemap: bool,
    pub sitemap_lastmod: Option<DateTime<Utc>>,
    pub ai_crawlers: AiCrawlerPolicy,
    /// The seed as served to an AI crawler user-agent. `None` when the
    /// site was not checked this way.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crawler_view: Option<CrawlerView>,
}

/// What one request made with an AI crawler's user-agent got back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlerView {
    pub user_agent: String,
    /// 0 when the request never got a response.
    pub status: u16,
    pub redirects: Vec<String>,
    pub block_signals: Vec<String>,
}

impl CrawlerView {
    pub fn is_blocked(&self) -> bool {
        self.status != 200 || !self.block_signals.is_empty()
    }
}

/// What robots.txt says about AI crawler user-agents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiCrawlerPolicy {
    #[default]
    Unknown,
    NotMentioned,
    ExplicitlyAllowed,
    Disallowed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub status: u16,
    pub final_url: String,
    /// URLs that answered with a redirect before `final_url`.
    pub redirects: Vec<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub cache_control: Option<String>,
    pub etag: Option<String>,
    pub x_robots_tag: Option<String>,
    pub block_signals: Vec<String>,
}

/// Where a resolved last-modified date came from, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateSource {
    HttpHeader,
    StructuredData,
    MetaTag,
    Sitemap,
}

impl Page {
    /// A page with nothing extracted. Useful as a starting point for callers
    /// that assemble pages from stored or submitted data.
    pub fn empty(url: &str, fetched_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.to_string(),
            title: String::new(),
            description: String::new(),
            html: String::new(),
            content: String::new(),
            metadata: PageMetadata::default(),
            response: ResponseMeta {
                final_url: url.to_string(),
                ..Default::default()
            },
            fetched_at,
        }
    }

    pub fn host(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
    }

    pub fn internal_link_count(&self) -> usize {
        let Some(host) = self.host() else { return 0 };
        self.metadata
            .links
            .iter()
            .filter_map(|l| url::Url::parse(l).ok())
            .filter(|u| u.host_str().map(|h| h.eq_ignore_ascii_case(&host)).unwrap_or(false))
            .count()
    }

    /// Resolved last-modified date: HTTP header, then JSON-LD `dateModified`,
    /// then meta tags, then the sitemap `<lastmod>`.
    pub fn last_modified(&self) -> Option<(DateTime<Utc>, DateSource)> {
        if let Some(d) = self.response.last_modified {
            return Some((d, DateSource::HttpHeader));
        }
        if let Some(d) = self.metadata.structured_data.date_modified {
            return Some((d, DateSource::StructuredData));
        }
        if let Some(d) = self.metadata.meta_lastmod {
            return Some((d, DateSource::MetaTag));
        }
        self.metadata
            .site
            .sitemap_lastmod
            .map(|d| (d, DateSource::Sitemap))
    }

    /// Content age in whole days at fetch time. Future dates count as zero.
    pub fn age_days(&self) -> Option<i64> {
        self.last_modified()
            .map(|(d, _)| self.fetched_at.signed_duration_since(d).num_days().max(0))
    }

    pub fn with_site_context(mut self, site: SiteContext) -> Self {
        self.metadata.site = site;
        self
    }

    pub fn content_chars(&self) -> usize {
        self.content.chars().count()
    }

    /// Whether extraction found any text at all.
    pub fn has_content(&self) -> bool {
        !self.content.trim().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Score
// ---------------------------------------------------------------------------

/// The six scoring dimensions, in declaration order. The order is the
/// documented tie-break for recommendation ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    SemanticStructure,
    SchemaMarkup,
    ContentClarity,
    CrawlerAccessibility,
    Freshness,
    AnswerInclusion,
}

impl Dimension {
    pub const ALL: [Dimension; 6] = [
        Dimension::SemanticStructure,
        Dimension::SchemaMarkup,
        Dimension::ContentClarity,
        Dimension::CrawlerAccessibility,
        Dimension::Freshness,
        Dimension::AnswerInclusion,
    ];

    pub fn max_points(self) -> u8 {
        match self {
            Dimension::SemanticStructure => 25,
            Dimension::SchemaMarkup => 20,
            Dimension::ContentClarity => 20,
            Dimension::CrawlerAccessibility => 15,
            Dimension::Freshness => 10,
            Dimension::AnswerInclusion => 10,
        }
    }

    /// Stable snake_case key, matching the serialized form.
    pub fn key(self) -> &'static str {
        match self {
            Dimension::SemanticStructure => "semantic_structure",
            Dimension::SchemaMarkup => "schema_markup",
            Dimension::ContentClarity => "content_clarity",
            Dimension::CrawlerAccessibility => "crawler_accessibility",
            Dimension::Freshness => "freshness",
            Dimension::AnswerInclusion => "answer_inclusion",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Dimension::SemanticStructure => "semantic structure",
            Dimension::SchemaMarkup => "schema markup",
            Dimension::ContentClarity => "content clarity",
            Dimension::CrawlerAccessibility => "crawler accessibility",
            Dimension::Freshness => "freshness",
            Dimension::AnswerInclusion => "answer inclusion",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionScores {
    pub semantic_structure: u8,
    pub schema_markup: u8,
    pub content_clarity: u8,
    pub crawler_accessibility: u8,
    pub freshness: u8,
    pub answer_inclusion: u8,
}

impl DimensionScores {
    pub fn get(&self, dimension: Dimension) -> u8 {
        match dimension {
            Dimension::SemanticStructure => self.semantic_structure,
            Dimension::SchemaMarkup => self.schema_markup,
            Dimension::ContentClarity => self.content_clarity,
            Dimension::CrawlerAccessibility => self.crawler_accessibility,
            Dimension::Freshness => self.freshness,
            Dimension::AnswerInclusion => self.answer_inclusion,
        }
    }

    /// Sets a dimension, clamped to its declared maximum.
    pub fn set(&mut self, dimension: Dimension, points: u32) {
        let v = points.min(dimension.max_points() as u32) as u8;
        match dimension {
            Dimension::SemanticStructure => self.semantic_structure = v,
            Dimension::SchemaMarkup => self.schema_markup = v,
            Dimension::ContentClarity => self.content_clarity = v,
            Dimension::CrawlerAccessibility => self.crawler_accessibility = v,
            Dimension::Freshness => self.freshness = v,
            Dimension::AnswerInclusion => self.answer_inclusion = v,
        }
    }

    pub fn total(&self) -> u8 {
        Dimension::ALL.iter().map(|d| self.get(*d)).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dimension, u8)> + '_ {
        Dimension::ALL.iter().map(move |d| (*d, self.get(*d)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisibilityTier {
    Low,
    Moderate,
    Good,
    Excellent,
}

impl VisibilityTier {
    pub fn from_total(total: u8) -> Self {
        match total {
            80.. => VisibilityTier::Excellent,
            60..=79 => VisibilityTier::Good,
            40..=59 => VisibilityTier::Moderate,
            _ => VisibilityTier::Low,
        }
    }

    pub fn summary(self) -> &'static str {
        match self {
            VisibilityTier::Excellent => "Excellent visibility: content is well structured, marked up and likely to be quoted in AI answers.",
            VisibilityTier::Good => "Good visibility with room for improvement: tighten structure and add clearer, citable statements.",
            VisibilityTier::Moderate => "Moderate visibility: structure, markup and clarity all need work before AI answers will use this content.",
            VisibilityTier::Low => "Low visibility: major improvements are required across every scoring dimension.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreStatus {
    Complete,
    /// A sub-scorer failed; the score is the fixed minimal default.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    pub scores: DimensionScores,
    pub total: u8,
    pub tier: VisibilityTier,
    pub summary: String,
    /// Counts and intermediate values each sub-scorer used.
    pub details: BTreeMap<String, serde_json::Value>,
    pub status: ScoreStatus,
}

impl Score {
    pub fn from_scores(
        scores: DimensionScores,
        details: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        let total = scores.total();
        let tier = VisibilityTier::from_total(total);
        Self {
            scores,
            total,
            tier,
            summary: tier.summary().to_string(),
            details,
            status: ScoreStatus::Complete,
        }
    }

    /// Conservative minimal score substituted when scoring fails internally.
    pub fn fallback(reason: &str) -> Self {
        let mut details = BTreeMap::new();
        details.insert("error".to_string(), serde_json::Value::from(reason));
        Self {
            scores: DimensionScores::default(),
            total: 0,
            tier: VisibilityTier::Low,
            summary: format!(
                "Scoring could not be completed for this page ({}); a minimal default score was recorded.",
                reason
            ),
            details,
            status: ScoreStatus::Fallback,
        }
    }

    /// Write-time range checks for persisted scores.
    pub fn check_bounds(&self) -> Result<(), StoreError> {
        for (dimension, value) in self.scores.iter() {
            if value > dimension.max_points() {
                return Err(StoreError::OutOfRange {
                    field: dimension.label().to_string(),
                    value: value as u32,
                    max: dimension.max_points() as u32,
                });
            }
        }
        if self.total > 100 || self.total != self.scores.total() {
            return Err(StoreError::OutOfRange {
                field: "total".to_string(),
                value: self.total as u32,
                max: self.scores.total().min(100) as u32,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Highlight
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn raise(self) -> Self {
        match self {
            Severity::Low => Severity::Medium,
            _ => Severity::High,
        }
    }
}

/// Character offsets into the page's extracted text, `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSpan {
    pub start: usize,
    pub end: usize,
}

/// Where a highlight points. A text span, a structural selector, or both;
/// the renderer tries the span first and falls back to the selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextSpan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

impl Anchor {
    pub fn span(start: usize, end: usize) -> Self {
        Self {
            text: Some(TextSpan { start, end }),
            selector: None,
        }
    }

    pub fn selector(selector: &str) -> Self {
        Self {
            text: None,
            selector: Some(selector.to_string()),
        }
    }

    pub fn with_selector(mut self, selector: &str) -> Self {
        self.selector = Some(selector.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    pub before: String,
    pub after: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlight {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Dimension>,
    pub severity: Severity,
    pub reason: String,
    pub suggestion: String,
    pub anchor: Anchor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<Example>,
}

impl Highlight {
    /// Checks the anchor against the length (in chars) of the text it was
    /// computed from.
    pub fn validate(&self, text_chars: usize) -> Result<(), String> {
        if self.anchor.text.is_none() && self.anchor.selector.is_none() {
            return Err("anchor has neither a text span nor a selector".to_string());
        }
        if let Some(span) = self.anchor.text {
            if span.start >= span.end {
                return Err(format!("empty span {}..{}", span.start, span.end));
            }
            if span.end > text_chars {
                return Err(format!(
                    "span {}..{} exceeds text length {}",
                    span.start, span.end, text_chars
                ));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Domain
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub dimension: Dimension,
    pub text: String,
    pub average_score: f64,
    pub max_points: u8,
    /// Pages scoring below 60% of the dimension maximum.
    pub affected_pages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionAverage {
    pub dimension: Dimension,
    pub average: f64,
    pub max_points: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainSummary {
    pub overall_score: u8,
    pub pages_analyzed: usize,
    pub top_improvements: Vec<Recommendation>,
    pub dimension_averages: Vec<DimensionAverage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AnalysisOutcome {
    Complete,
    /// The seed page itself could not be fetched. Not the same as a score of 0.
    Unreachable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedPage {
    pub url: String,
    pub error: String,
    pub timed_out: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainReport {
    pub domain_id: Uuid,
    pub hostname: String,
    pub seed_url: String,
    pub outcome: AnalysisOutcome,
    #[serde(flatten)]
    pub summary: DomainSummary,
    pub failed_pages: Vec<FailedPage>,
    pub analyzed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Analyzing,
    Complete,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub domain_id: Uuid,
    pub hostname: String,
    pub status: AnalysisStatus,
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<DomainReport>,
}

/// A stored page with whatever analysis is visible for it so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageAnalysis {
    pub page_id: Uuid,
    pub url: String,
    pub title: String,
    pub version: u32,
    pub score: Option<Score>,
    pub highlights: Vec<Highlight>,
}

/// Ad-hoc scoring input: either raw markup or already-extracted text.
#[derive(Debug, Serialize, Deserialize)]
pub struct ScoreRequest {
    pub url: String,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScoreResponse {
    pub score: Score,
    pub highlights: Vec<Highlight>,
}

/// Live markup to re-anchor highlights onto, with the text snapshot their
/// offsets refer to.
#[derive(Debug, Serialize, Deserialize)]
pub struct RenderPlanRequest {
    pub snapshot: String,
    pub html: String,
    pub highlights: Vec<Highlight>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
