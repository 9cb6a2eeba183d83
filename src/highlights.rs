//! Highlight generation: concrete, re-displayable annotations explaining
//! where a page loses points and how to fix it.
//!
//! Text anchors are char offsets into `Page::content`. Everything is
//! derived from the page and its score, so the same inputs always give the
//! same list.

use crate::scoring::text::{contains_any, CITATION_MARKERS, DEFINITION_MARKERS, EXAMPLE_MARKERS};
use crate::types::{
    AiCrawlerPolicy, Anchor, Dimension, Example, Highlight, Page, Score, Severity, VisibilityTier,
};

/// Sentences longer than this many words are flagged as hard to quote.
const LONG_SENTENCE_WORDS: usize = 35;
const MAX_LONG_SENTENCES: usize = 3;
/// Below this total the opening passage itself is flagged.
const VAGUE_OPENING_BELOW: u8 = 50;
const OPENING_CHARS: usize = 100;
const STALE_AFTER_DAYS: i64 = 90;
const MIN_INTERNAL_LINKS: usize = 3;

/// Lower tiers get more highlights.
fn max_highlights(tier: VisibilityTier) -> usize {
    match tier {
        VisibilityTier::Low => 12,
        VisibilityTier::Moderate => 8,
        VisibilityTier::Good => 6,
        VisibilityTier::Excellent => 3,
    }
}

struct Draft {
    category: Option<Dimension>,
    severity: Severity,
    reason: String,
    suggestion: String,
    anchor: Anchor,
    example: Option<Example>,
}

impl Draft {
    fn new(category: Dimension, severity: Severity, reason: impl Into<String>, suggestion: impl Into<String>, anchor: Anchor) -> Self {
        Self {
            category: Some(category),
            severity,
            reason: reason.into(),
            suggestion: suggestion.into(),
            anchor,
            example: None,
        }
    }

    fn example(mut self, before: &str, after: &str) -> Self {
        self.example = Some(Example {
            before: before.to_string(),
            after: after.to_string(),
        });
        self
    }
}

/// Char-offset spans of each sentence, terminal punctuation included and
/// leading whitespace excluded.
fn sentence_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    let mut len = 0;
    for (i, c) in text.chars().enumerate() {
        len = i + 1;
        if start.is_none() && !c.is_whitespace() {
            start = Some(i);
        }
        if matches!(c, '.' | '!' | '?') {
            if let Some(s) = start.take() {
                spans.push((s, i + 1));
            }
        }
    }
    if let Some(s) = start {
        spans.push((s, len));
    }
    spans
}

fn slice_chars(text: &str, start: usize, end: usize) -> String {
    text.chars().skip(start).take(end - start).collect()
}

pub fn generate_highlights(page: &Page, score: &Score) -> Vec<Highlight> {
    let content = page.content.as_str();
    let content_chars = content.chars().count();
    let has_text = !content.trim().is_empty();
    let m = &page.metadata;
    let mut drafts = Vec::new();

    if !has_text {
        drafts.push(
            Draft::new(
                Dimension::CrawlerAccessibility,
                Severity::High,
                "The page body has no extractable text, so answer engines have nothing to read or quote",
                "Serve the main content as HTML text in the initial response instead of leaving the body empty",
                Anchor::selector("body"),
            )
            .example("<body><div id=\"app\"></div></body>", "<body><main><h1>Topic</h1><p>Direct answer...</p></main></body>"),
        );
    }

    let r = &page.response;
    if r.status != 200 || !r.block_signals.is_empty() {
        let mut reasons = Vec::new();
        if r.status != 200 {
            reasons.push(format!("HTTP {}", r.status));
        }
        reasons.extend(r.block_signals.iter().cloned());
        drafts.push(Draft::new(
            Dimension::CrawlerAccessibility,
            Severity::High,
            format!("Crawlers may be blocked from this page ({})", reasons.join(", ")),
            "Return 200 with the full content to known crawler user agents and avoid challenge pages on content URLs",
            Anchor::selector("body"),
        ));
    }
    if let Some(view) = m.site.crawler_view.as_ref().filter(|v| v.is_blocked()) {
        let mut reasons = Vec::new();
        if view.status != 200 {
            reasons.push(if view.status == 0 {
                "no response".to_string()
            } else {
                format!("HTTP {}", view.status)
            });
        }
        reasons.extend(view.block_signals.iter().filter(|s| !s.starts_with("HTTP ")).cloned());
        drafts.push(
            Draft::new(
                Dimension::CrawlerAccessibility,
                Severity::High,
                format!("AI crawlers are turned away from this site ({})", reasons.join(", ")),
                "Serve the same content to GPTBot and other AI crawler user agents as to browsers; exempt them from bot challenges and rate limits",
                Anchor::selector("html"),
            )
            .example("GPTBot -> 403 Forbidden", "GPTBot -> 200 OK with the full page"),
        );
    }
    if m.site.ai_crawlers == AiCrawlerPolicy::Disallowed {
        drafts.push(
            Draft::new(
                Dimension::CrawlerAccessibility,
                Severity::High,
                "robots.txt disallows AI crawlers from the site root",
                "Allow the AI crawlers you want to be cited by in robots.txt",
                Anchor::selector("html"),
            )
            .example("User-agent: GPTBot\nDisallow: /", "User-agent: GPTBot\nAllow: /"),
        );
    }
    if !r.redirects.is_empty() {
        drafts.push(Draft::new(
            Dimension::CrawlerAccessibility,
            Severity::Medium,
            format!("Reached through {} redirect(s) starting at {}", r.redirects.len(), r.redirects[0]),
            "Link to the final URL directly and keep canonical, sitemap and internal links pointing at it",
            Anchor::selector("html"),
        ));
    }

    match m.h1.len() {
        0 => drafts.push(
            Draft::new(
                Dimension::SemanticStructure,
                Severity::High,
                "The page has no H1 heading naming its topic",
                "Add exactly one H1 that states what the page is about",
                Anchor::selector("body"),
            )
            .example("<div class=\"title\">Caching guide</div>", "<h1>Caching guide</h1>"),
        ),
        1 => {}
        n => drafts.push(Draft::new(
            Dimension::SemanticStructure,
            Severity::Medium,
            format!("The page has {} H1 headings; the main topic is ambiguous", n),
            "Keep a single H1 and demote the others to H2",
            Anchor::selector("h1"),
        )),
    }
    if !m.h3.is_empty() && m.h2.is_empty() {
        drafts.push(
            Draft::new(
                Dimension::SemanticStructure,
                Severity::Medium,
                "H3 headings appear without any H2, leaving a gap in the outline",
                "Group subsections under H2 headings so the outline has no skipped levels",
                Anchor::selector("h3"),
            )
            .example("<h1>Guide</h1><h3>Setup</h3>", "<h1>Guide</h1><h2>Getting started</h2><h3>Setup</h3>"),
        );
    }

    if !m.structured_data.is_present() {
        drafts.push(
            Draft::new(
                Dimension::SchemaMarkup,
                Severity::High,
                "No structured data (JSON-LD or microdata) describes this page",
                "Add a JSON-LD block declaring the page type, headline and modification date",
                Anchor::selector("head"),
            )
            .example(
                "<head><title>Caching guide</title></head>",
                "<script type=\"application/ld+json\">{\"@context\":\"https://schema.org\",\"@type\":\"Article\",\"headline\":\"Caching guide\",\"dateModified\":\"2024-05-01\"}</script>",
            ),
        );
    }
    if m.canonical_url.is_none() {
        drafts.push(
            Draft::new(
                Dimension::SchemaMarkup,
                Severity::Low,
                "No canonical URL is declared",
                "Declare the preferred URL so duplicates are consolidated",
                Anchor::selector("head"),
            )
            .example("<head>...</head>", &format!("<link rel=\"canonical\" href=\"{}\">", page.url)),
        );
    }
    if page.description.trim().is_empty() {
        drafts.push(
            Draft::new(
                Dimension::SchemaMarkup,
                Severity::Medium,
                "The page has no meta description",
                "Add a one or two sentence description summarizing the answer the page gives",
                Anchor::selector("head"),
            )
            .example("", "<meta name=\"description\" content=\"How caching cuts response times, with examples.\">"),
        );
    }

    if has_text {
        if score.total < VAGUE_OPENING_BELOW {
            let start = content.chars().take_while(|c| c.is_whitespace()).count();
            let end = (start + OPENING_CHARS).min(content_chars);
            if start < end {
                drafts.push(Draft::new(
                    Dimension::ContentClarity,
                    Severity::High,
                    "The opening lacks clear structure and specific details that answer engines can parse",
                    "Open with a direct, self-contained statement of what the page answers",
                    Anchor::span(start, end),
                ));
            }
        }

        let spans = sentence_spans(content);
        for (start, end) in spans
            .iter()
            .copied()
            .filter(|(s, e)| slice_chars(content, *s, *e).split_whitespace().count() > LONG_SENTENCE_WORDS)
            .take(MAX_LONG_SENTENCES)
        {
            drafts.push(Draft::new(
                Dimension::ContentClarity,
                Severity::Medium,
                format!("This sentence runs past {} words and is hard to quote on its own", LONG_SENTENCE_WORDS),
                "Split it into shorter sentences that each state one fact",
                Anchor::span(start, end),
            ));
        }

        if !m.has_glossary && !contains_any(content, DEFINITION_MARKERS) {
            if let Some(&(start, end)) = spans.first() {
                drafts.push(
                    Draft::new(
                        Dimension::SemanticStructure,
                        Severity::Low,
                        "Key terms are used without being defined",
                        "Define the main term explicitly near its first use",
                        Anchor::span(start, end),
                    )
                    .example("Caching is important.", "Caching is a technique that stores computed results so later requests are served faster."),
                );
            }
        }

        if !contains_any(content, EXAMPLE_MARKERS) && !contains_any(content, CITATION_MARKERS) {
            let anchor = if content_chars > 200 {
                Anchor::span(200, content_chars.min(400))
            } else {
                Anchor::selector("body")
            };
            drafts.push(
                Draft::new(
                    Dimension::AnswerInclusion,
                    Severity::Medium,
                    "No concrete examples or cited sources back up the claims here",
                    "Add concrete examples and attribute facts to their sources",
                    anchor,
                )
                .example("Caching improves speed.", "For example, caching rendered fragments cut median response time from 240 ms to 60 ms, according to our load tests."),
            );
        }

        if page.internal_link_count() < MIN_INTERNAL_LINKS {
            drafts.push(Draft::new(
                Dimension::SemanticStructure,
                Severity::Low,
                format!("Only {} internal link(s) connect this page to the rest of the site", page.internal_link_count()),
                "Link to related pages on the same site with descriptive anchor text",
                Anchor::selector("body"),
            ));
        }
    }

    if m.images_missing_alt > 0 {
        drafts.push(
            Draft::new(
                Dimension::SemanticStructure,
                Severity::Medium,
                format!("{} image(s) have no alt text", m.images_missing_alt),
                "Describe each informative image in its alt attribute",
                Anchor::selector("img:not([alt])"),
            )
            .example("<img src=\"chart.png\">", "<img src=\"chart.png\" alt=\"Response time before and after caching\">"),
        );
    }

    match page.age_days() {
        None => drafts.push(
            Draft::new(
                Dimension::Freshness,
                Severity::Medium,
                "No modification date is published for this page",
                "Send a Last-Modified header and declare dateModified in structured data",
                Anchor::selector("head"),
            )
            .example("", "<meta property=\"article:modified_time\" content=\"2024-05-01T09:00:00Z\">"),
        ),
        Some(days) if days > STALE_AFTER_DAYS => drafts.push(Draft::new(
            Dimension::Freshness,
            Severity::Low,
            format!("Content was last updated {} days ago", days),
            "Review the page and update facts, figures and the modification date",
            Anchor::selector("head"),
        )),
        Some(_) => {}
    }

    finalize(drafts, score.tier)
}

/// Applies the tier's severity shift and count cap, orders the list and
/// assigns ids.
fn finalize(mut drafts: Vec<Draft>, tier: VisibilityTier) -> Vec<Highlight> {
    for d in &mut drafts {
        d.severity = match tier {
            VisibilityTier::Low => d.severity.raise(),
            VisibilityTier::Excellent => d.severity.min(Severity::Medium),
            _ => d.severity,
        };
    }
    drafts.sort_by_key(|d| {
        (
            std::cmp::Reverse(d.severity),
            d.category,
            d.anchor.text.map(|t| t.start).unwrap_or(usize::MAX),
        )
    });
    drafts.truncate(max_highlights(tier));

    drafts
        .into_iter()
        .enumerate()
        .map(|(i, d)| Highlight {
            id: format!("hl-{}", i + 1),
            category: d.category,
            severity: d.severity,
            reason: d.reason,
            suggestion: d.suggestion,
            anchor: d.anchor,
            example: d.example,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::ScoringEngine;
    use chrono::Utc;

    #[test]
    fn test_sentence_spans() {
        let spans = sentence_spans("  One two. Three!  Four");
        assert_eq!(spans, vec![(2, 10), (11, 17), (19, 23)]);
        assert!(sentence_spans("   ").is_empty());
    }

    #[test]
    fn test_empty_page_flags_body() {
        let page = Page::empty("https://example.com/", Utc::now());
        let score = ScoringEngine::default().score(&page);
        let highlights = generate_highlights(&page, &score);
        assert!(highlights
            .iter()
            .any(|h| h.severity == Severity::High && h.anchor.selector.as_deref() == Some("body")));
        assert!(highlights.len() <= 12);
    }

    #[test]
    fn test_anchors_stay_inside_text() {
        let mut page = Page::empty("https://example.com/", Utc::now());
        page.response.status = 200;
        let long = "word ".repeat(40);
        page.content = format!("Intro line. {}end. Short one. Caf\u{e9} na\u{ef}ve r\u{e9}sum\u{e9} text {}", long, "x ".repeat(150));
        let score = ScoringEngine::default().score(&page);
        let highlights = generate_highlights(&page, &score);
        let chars = page.content.chars().count();
        assert!(!highlights.is_empty());
        for h in &highlights {
            assert!(h.validate(chars).is_ok(), "{:?}", h);
        }
        assert!(highlights.iter().any(|h| h.reason.contains("35 words")));
    }

    #[test]
    fn test_crawler_block_is_flagged() {
        let mut page = Page::empty("https://example.com/", Utc::now());
        page.response.status = 200;
        page.content = "Caching keeps pages fast.".into();
        page.metadata.site.crawler_view = Some(crate::types::CrawlerView {
            user_agent: "GPTBot".into(),
            status: 403,
            redirects: vec![],
            block_signals: vec!["HTTP 403".into()],
        });
        let score = ScoringEngine::default().score(&page);
        let highlights = generate_highlights(&page, &score);
        let flagged = highlights
            .iter()
            .find(|h| h.reason.starts_with("AI crawlers are turned away"))
            .unwrap();
        assert_eq!(flagged.severity, Severity::High);
        assert!(flagged.reason.contains("HTTP 403"));
        assert_eq!(flagged.category, Some(Dimension::CrawlerAccessibility));
    }

    #[test]
    fn test_ids_and_ordering() {
        let page = Page::empty("https://example.com/", Utc::now());
        let score = ScoringEngine::default().score(&page);
        let highlights = generate_highlights(&page, &score);
        for (i, h) in highlights.iter().enumerate() {
            assert_eq!(h.id, format!("hl-{}", i + 1));
        }
        for pair in highlights.windows(2) {
            assert!(pair[0].severity >= pair[1].severity);
        }
        assert_eq!(highlights, generate_highlights(&page, &score));
    }

    #[test]
    fn test_excellent_tier_caps_count_and_severity() {
        let page = Page::empty("https://example.com/", Utc::now());
        let mut score = ScoringEngine::default().score(&page);
        score.tier = VisibilityTier::Excellent;
        let highlights = generate_highlights(&page, &score);
        assert_eq!(highlights.len(), 3);
        assert!(highlights.iter().all(|h| h.severity <= Severity::Medium));
    }
}
