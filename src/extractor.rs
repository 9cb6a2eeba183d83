use crate::config::AnalyzerConfig;
use crate::error::FetchError;
use crate::fetcher::{FetchedPage, PageFetcher};
use crate::sitemap::parse_date;
use crate::types::*;
use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

/// Elements counted toward semantic-structure density.
pub const SEMANTIC_TAGS: &[&str] = &[
    "table", "dl", "ul", "ol", "blockquote", "code", "pre", "article", "section", "nav", "aside",
    "main", "header", "footer",
];

/// Candidate main-content containers in priority order.
const MAIN_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role=main]",
    "[itemprop=articleBody]",
    ".entry-content",
    ".post-content",
    ".article-content",
    "#content",
    "#main",
    ".content",
    ".post",
    ".article",
];

/// Served documents shorter than this are treated as a block page.
const MIN_SERVED_HTML: usize = 1000;

static BLOCK_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)captcha|cf-chl|cf_chl|checking your browser|access denied|attention required")
        .expect("block marker pattern is valid")
});

/// Fetches pages through a [`PageFetcher`] and turns them into [`Page`]s.
#[derive(Clone)]
pub struct ContentExtractor {
    fetcher: Arc<dyn PageFetcher>,
    page_timeout: Duration,
    max_content_chars: usize,
}

impl ContentExtractor {
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: &AnalyzerConfig) -> Self {
        Self {
            fetcher,
            page_timeout: config.page_timeout,
            max_content_chars: config.max_content_chars,
        }
    }

    /// Fetch and extract one URL under the per-page timeout.
    pub async fn extract(&self, url: &str) -> Result<Page, FetchError> {
        info!("Extracting page: {}", url);

        let fetched = match tokio::time::timeout(self.page_timeout, self.fetcher.fetch_page(url)).await {
            Ok(result) => result?,
            Err(_) => return Err(FetchError::Timeout(self.page_timeout)),
        };

        if !(200..300).contains(&fetched.status) && fetched.html.trim().is_empty() {
            return Err(FetchError::Status {
                status: fetched.status,
            });
        }

        let page = extract_page(&fetched, Utc::now(), self.max_content_chars);
        info!(
            "Extracted: {} ({} chars, {} links, status {})",
            if page.title.is_empty() { "(untitled)" } else { page.title.as_str() },
            page.content_chars(),
            page.metadata.links.len(),
            page.response.status
        );
        Ok(page)
    }
}

/// Build a [`Page`] from fetched markup. Pure; no I/O.
pub fn extract_page(fetched: &FetchedPage, fetched_at: DateTime<Utc>, max_chars: usize) -> Page {
    let document = Html::parse_document(&fetched.html);
    let base = Url::parse(&fetched.final_url)
        .or_else(|_| Url::parse(&fetched.requested_url))
        .ok();

    let (images_total, images_missing_alt, image_alts) = extract_images(&document);
    let metadata = PageMetadata {
        h1: extract_heading_texts(&document, "h1"),
        h2: extract_heading_texts(&document, "h2"),
        h3: extract_heading_texts(&document, "h3"),
        links: base
            .as_ref()
            .map(|b| extract_links(&document, b))
            .unwrap_or_default(),
        image_alts,
        images_total,
        images_missing_alt,
        structured_data: extract_structured_data(&document),
        canonical_url: base.as_ref().and_then(|b| extract_canonical(&document, b)),
        meta_lastmod: extract_meta_lastmod(&document),
        robots_meta: first_meta_content(&document, "meta[name=\"robots\"]"),
        semantic_tags: count_semantic_tags(&document),
        paragraph_count: count_non_empty(&document, "p"),
        list_count: count_non_empty(&document, "ul, ol"),
        table_count: count_matches(&document, "table"),
        has_glossary: has_glossary(&document),
        sections: extract_sections(&document),
        site: SiteContext::default(),
    };

    let response = ResponseMeta {
        status: fetched.status,
        final_url: fetched.final_url.clone(),
        redirects: fetched.redirects.clone(),
        last_modified: fetched.headers.last_modified.as_deref().and_then(parse_date),
        cache_control: fetched.headers.cache_control.clone(),
        etag: fetched.headers.etag.clone(),
        x_robots_tag: fetched.headers.x_robots_tag.clone(),
        block_signals: detect_block_signals(fetched.status, &fetched.html),
    };

    Page {
        id: Uuid::new_v4(),
        url: fetched.requested_url.clone(),
        title: extract_title(&document),
        description: extract_meta_description(&document),
        html: fetched.html.clone(),
        content: extract_main_content(&document, max_chars),
        metadata,
        response,
        fetched_at,
    }
}

/// Collapse whitespace runs and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cap at `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].trim_end().to_string(),
        None => text.to_string(),
    }
}

fn element_text(el: &ElementRef) -> String {
    normalize_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

fn first_meta_content(document: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    document
        .select(&sel)
        .filter_map(|el| el.value().attr("content"))
        .map(|c| c.trim().to_string())
        .find(|c| !c.is_empty())
}

/// Extract page title with fallback to h1
fn extract_title(document: &Html) -> String {
    for selector in ["title", "h1"] {
        if let Ok(sel) = Selector::parse(selector) {
            if let Some(el) = document.select(&sel).next() {
                let text = element_text(&el);
                if !text.is_empty() {
                    return text;
                }
            }
        }
    }
    String::new()
}

/// Meta description, falling back to Open Graph.
fn extract_meta_description(document: &Html) -> String {
    first_meta_content(document, "meta[name=\"description\"]")
        .or_else(|| first_meta_content(document, "meta[property=\"og:description\"]"))
        .unwrap_or_default()
}

fn extract_canonical(document: &Html, base: &Url) -> Option<String> {
    let sel = Selector::parse("link[rel=\"canonical\"]").ok()?;
    let href = document.select(&sel).next()?.value().attr("href")?.trim();
    if href.is_empty() {
        return None;
    }
    base.join(href)
        .ok()
        .map(|u| u.to_string())
        .or_else(|| Some(href.to_string()))
}

fn extract_meta_lastmod(document: &Html) -> Option<DateTime<Utc>> {
    [
        "meta[name=\"lastmod\"]",
        "meta[name=\"last-modified\"]",
        "meta[property=\"article:modified_time\"]",
        "meta[property=\"og:updated_time\"]",
    ]
    .iter()
    .filter_map(|s| first_meta_content(document, s))
    .find_map(|v| parse_date(&v))
}

fn extract_heading_texts(document: &Html, tag: &str) -> Vec<String> {
    let Ok(sel) = Selector::parse(tag) else {
        return Vec::new();
    };
    document
        .select(&sel)
        .map(|el| element_text(&el))
        .filter(|t| !t.is_empty())
        .collect()
}

/// Absolute http(s) link targets in document order. Fragments are dropped
/// and non-navigational schemes skipped.
fn extract_links(document: &Html, base: &Url) -> Vec<String> {
    let mut links = Vec::new();
    let mut seen = HashSet::new();
    let Ok(sel) = Selector::parse("a[href]") else {
        return links;
    };

    for el in document.select(&sel) {
        let Some(href) = el.value().attr("href") else { continue };
        let href = href.trim();
        let lower = href.to_ascii_lowercase();
        if href.is_empty()
            || href.starts_with('#')
            || lower.starts_with("javascript:")
            || lower.starts_with("mailto:")
            || lower.starts_with("tel:")
        {
            continue;
        }
        let Ok(mut url) = base.join(href) else { continue };
        if url.scheme() != "http" && url.scheme() != "https" {
            continue;
        }
        url.set_fragment(None);
        let s = url.to_string();
        if seen.insert(s.clone()) {
            links.push(s);
        }
    }
    links
}

/// (total images, images with no alt attribute, non-empty alt texts)
fn extract_images(document: &Html) -> (usize, usize, Vec<String>) {
    let Ok(sel) = Selector::parse("img") else {
        return (0, 0, Vec::new());
    };
    let mut total = 0;
    let mut missing = 0;
    let mut alts = Vec::new();
    for el in document.select(&sel) {
        total += 1;
        match el.value().attr("alt") {
            None => missing += 1,
            Some(alt) => {
                let alt = normalize_whitespace(alt);
                if !alt.is_empty() {
                    alts.push(alt);
                }
            }
        }
    }
    (total, missing, alts)
}

fn schema_type_name(raw: &str) -> Option<String> {
    let name = raw.trim().trim_end_matches('/').rsplit('/').next()?.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn collect_json_ld(value: &Value, types: &mut BTreeSet<String>, modified: &mut Option<DateTime<Utc>>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_json_ld(item, types, modified);
            }
        }
        Value::Object(map) => {
            match map.get("@type") {
                Some(Value::String(t)) => types.extend(schema_type_name(t)),
                Some(Value::Array(ts)) => {
                    types.extend(ts.iter().filter_map(|t| t.as_str()).filter_map(schema_type_name))
                }
                _ => {}
            }
            if modified.is_none() {
                if let Some(d) = map.get("dateModified").and_then(|d| d.as_str()) {
                    *modified = parse_date(d);
                }
            }
            if let Some(graph) = map.get("@graph") {
                collect_json_ld(graph, types, modified);
            }
        }
        _ => {}
    }
}

fn extract_structured_data(document: &Html) -> StructuredData {
    let mut data = StructuredData::default();
    let mut types = BTreeSet::new();
    let mut modified = None;

    if let Ok(sel) = Selector::parse("script[type=\"application/ld+json\"]") {
        for el in document.select(&sel) {
            let raw = el.text().collect::<String>();
            match serde_json::from_str::<Value>(raw.trim()) {
                Ok(value) => {
                    data.json_ld_blocks += 1;
                    collect_json_ld(&value, &mut types, &mut modified);
                }
                Err(e) => warn!("Skipping malformed JSON-LD block: {}", e),
            }
        }
    }

    data.microdata_items = count_matches(document, "[itemscope]");
    if let Ok(sel) = Selector::parse("[itemtype]") {
        for el in document.select(&sel) {
            if let Some(itemtype) = el.value().attr("itemtype") {
                types.extend(itemtype.split_whitespace().filter_map(schema_type_name));
            }
        }
    }

    data.schema_types = types.into_iter().collect();
    data.date_modified = modified;
    data
}

fn count_matches(document: &Html, selector: &str) -> usize {
    Selector::parse(selector)
        .map(|sel| document.select(&sel).count())
        .unwrap_or(0)
}

fn count_non_empty(document: &Html, selector: &str) -> usize {
    Selector::parse(selector)
        .map(|sel| {
            document
                .select(&sel)
                .filter(|el| el.text().any(|t| !t.trim().is_empty()))
                .count()
        })
        .unwrap_or(0)
}

fn count_semantic_tags(document: &Html) -> BTreeMap<String, usize> {
    SEMANTIC_TAGS
        .iter()
        .filter_map(|tag| {
            let n = count_matches(document, tag);
            (n > 0).then(|| (tag.to_string(), n))
        })
        .collect()
}

fn has_glossary(document: &Html) -> bool {
    let Ok(dl) = Selector::parse("dl") else { return false };
    let (Ok(dt), Ok(dd)) = (Selector::parse("dt"), Selector::parse("dd")) else {
        return false;
    };
    document
        .select(&dl)
        .any(|el| el.select(&dt).next().is_some() && el.select(&dd).next().is_some())
}

fn has_ancestor(el: &ElementRef, names: &[&str]) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| names.contains(&a.value().name()))
}

/// Split body text into heading-delimited sections.
fn extract_sections(document: &Html) -> Vec<Section> {
    let Ok(sel) = Selector::parse("h1, h2, h3, p, li, dd, blockquote") else {
        return Vec::new();
    };
    let mut sections = Vec::new();
    let mut current = Section {
        heading: String::new(),
        text: String::new(),
    };

    for el in document.select(&sel) {
        if has_ancestor(&el, &["nav", "footer", "aside", "script", "template"]) {
            continue;
        }
        let name = el.value().name();
        let text = element_text(&el);
        if text.is_empty() {
            continue;
        }
        if matches!(name, "h1" | "h2" | "h3") {
            if !current.text.is_empty() {
                sections.push(current);
            }
            current = Section {
                heading: text,
                text: String::new(),
            };
        } else {
            // nested blocks already counted through their parent
            if has_ancestor(&el, &["p", "li", "dd", "blockquote"]) {
                continue;
            }
            if !current.text.is_empty() {
                current.text.push(' ');
            }
            current.text.push_str(&text);
        }
    }
    if !current.text.is_empty() {
        sections.push(current);
    }
    sections
}

/// Recursively extract text from elements
fn extract_text_recursive(element: &ElementRef, text_parts: &mut Vec<String>) {
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            let tag_name = child_element.value().name();
            // Skip noisy/boilerplate elements entirely
            if matches!(
                tag_name,
                "script" | "style" | "noscript" | "svg" | "canvas" | "iframe" | "form" | "header"
                    | "footer" | "nav" | "aside" | "template"
            ) {
                continue;
            }

            let attrs = child_element.value();
            let mut skip = attrs.id().map(is_noise_identifier).unwrap_or(false);
            if !skip {
                skip = attrs.classes().any(is_noise_identifier);
            }
            if skip {
                continue;
            }
            extract_text_recursive(&child_element, text_parts);
        } else if let Some(text_node) = child.value().as_text() {
            text_parts.push(text_node.text.to_string());
        }
    }
}

/// Identify noisy identifiers by substring match
fn is_noise_identifier(ident: &str) -> bool {
    let ident = ident.to_ascii_lowercase();
    let needles = [
        // avoid plain "ad" to not match words like "header"
        "ads", "advert", "adsense", "adunit", "sponsor", "promo", "cookie", "consent", "banner",
        "modal", "subscribe", "newsletter", "share", "social", "sidebar", "comments", "breadcrumb",
        "pagination", "navbar", "footer", "toolbar",
    ];
    needles.iter().any(|n| ident.contains(n))
}

fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Best content container by word count, else the whole body.
fn extract_main_content(document: &Html, max_chars: usize) -> String {
    let mut best_text = String::new();
    let mut best_words = 0usize;

    for sel_str in MAIN_SELECTORS {
        if let Ok(sel) = Selector::parse(sel_str) {
            for el in document.select(&sel) {
                let mut parts = Vec::new();
                extract_text_recursive(&el, &mut parts);
                let text = normalize_whitespace(&parts.join(" "));
                let wc = count_words(&text);
                if wc > best_words {
                    best_words = wc;
                    best_text = text;
                }
            }
        }
    }

    if best_words == 0 {
        let root = Selector::parse("body")
            .ok()
            .and_then(|sel| document.select(&sel).next())
            .unwrap_or_else(|| document.root_element());
        let mut parts = Vec::new();
        extract_text_recursive(&root, &mut parts);
        best_text = normalize_whitespace(&parts.join(" "));
    }

    truncate_chars(&best_text, max_chars)
}

pub(crate) fn detect_block_signals(status: u16, html: &str) -> Vec<String> {
    let mut signals = Vec::new();
    if status == 403 || status == 429 || status >= 500 {
        signals.push(format!("HTTP {}", status));
    }
    if let Some(m) = BLOCK_MARKERS.find(html) {
        signals.push(format!("bot challenge marker: {}", m.as_str().to_ascii_lowercase()));
    }
    if html.chars().count() < MIN_SERVED_HTML {
        signals.push("insufficient content served".to_string());
    }
    signals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::{ResponseHeaders, StaticFetcher};
    use async_trait::async_trait;

    fn fetched(url: &str, html: &str) -> FetchedPage {
        FetchedPage {
            requested_url: url.to_string(),
            final_url: url.to_string(),
            status: 200,
            redirects: Vec::new(),
            headers: ResponseHeaders::default(),
            html: html.to_string(),
        }
    }

    const ARTICLE: &str = r##"<!doctype html><html><head>
        <title>  Caching   Guide </title>
        <meta property="og:description" content="How caching works">
        <meta name="robots" content="index,follow">
        <meta property="article:modified_time" content="2024-04-02T09:00:00Z">
        <link rel="canonical" href="/guide">
        <script type="application/ld+json">
          {"@context":"https://schema.org","@graph":[{"@type":"Article","dateModified":"2024-04-01"},{"@type":["WebPage","BreadcrumbList"]}]}
        </script>
        <script type="application/ld+json">{ not json</script>
        </head><body>
        <nav><a href="/">Home</a><a href="#top">Top</a></nav>
        <div itemscope itemtype="https://schema.org/Person"><span>Ann</span></div>
        <article>
          <h1>Caching Guide</h1>
          <p>Caching is a technique that stores results.</p>
          <h2>Why it matters</h2>
          <p>Pages load faster because fewer requests reach the origin.</p>
          <ul><li>Item <p>nested</p></li><li>Second</li></ul>
          <dl><dt>TTL</dt><dd>Time to live</dd></dl>
          <img src="a.png" alt="diagram"><img src="b.png"><img src="c.png" alt="">
          <a href="/docs#intro">Docs</a><a href="mailto:a@b.c">Mail</a><a href="tel:1">Call</a>
          <a href="javascript:void(0)">JS</a><a href="https://other.test/x">Other</a>
        </article>
        <footer>Copyright</footer>
        </body></html>"##;

    #[test]
    fn test_extracts_metadata() {
        let now = Utc::now();
        let page = extract_page(&fetched("https://example.com/guide", ARTICLE), now, 10_000);

        assert_eq!(page.title, "Caching Guide");
        assert_eq!(page.description, "How caching works");
        assert_eq!(page.metadata.h1, vec!["Caching Guide"]);
        assert_eq!(page.metadata.h2, vec!["Why it matters"]);
        assert_eq!(page.metadata.canonical_url.as_deref(), Some("https://example.com/guide"));
        assert_eq!(page.metadata.robots_meta.as_deref(), Some("index,follow"));
        assert!(page.metadata.meta_lastmod.is_some());
        assert!(page.metadata.has_glossary);
        assert_eq!(page.metadata.images_total, 3);
        assert_eq!(page.metadata.images_missing_alt, 1);
        assert_eq!(page.metadata.image_alts, vec!["diagram"]);

        let sd = &page.metadata.structured_data;
        assert_eq!(sd.json_ld_blocks, 1);
        assert_eq!(sd.microdata_items, 1);
        assert_eq!(
            sd.schema_types,
            vec!["Article", "BreadcrumbList", "Person", "WebPage"]
        );
        assert!(sd.date_modified.is_some());
        assert_eq!(page.metadata.semantic_tags.get("article"), Some(&1));
    }

    #[test]
    fn test_links_are_absolute_and_filtered() {
        let page = extract_page(&fetched("https://example.com/guide", ARTICLE), Utc::now(), 10_000);
        assert_eq!(
            page.metadata.links,
            vec![
                "https://example.com/".to_string(),
                "https://example.com/docs".to_string(),
                "https://other.test/x".to_string(),
            ]
        );
        assert_eq!(page.internal_link_count(), 2);
    }

    #[test]
    fn test_main_content_prefers_article() {
        let page = extract_page(&fetched("https://example.com/guide", ARTICLE), Utc::now(), 10_000);
        assert!(page.content.starts_with("Caching Guide Caching is a technique"));
        assert!(!page.content.contains("Copyright"));
        assert!(!page.content.contains("  "));
    }

    #[test]
    fn test_sections_follow_headings() {
        let page = extract_page(&fetched("https://example.com/guide", ARTICLE), Utc::now(), 10_000);
        let sections = &page.metadata.sections;
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].heading, "Caching Guide");
        assert_eq!(sections[1].heading, "Why it matters");
        assert!(sections[1].text.contains("Item nested"));
        assert!(!sections[1].text.contains("nested nested"));
    }

    #[test]
    fn test_title_falls_back_to_h1_and_body() {
        let html = "<html><body><h1>Only Heading</h1><div>Body text here</div></body></html>";
        let page = extract_page(&fetched("https://example.com/", html), Utc::now(), 10_000);
        assert_eq!(page.title, "Only Heading");
        assert_eq!(page.content, "Only Heading Body text here");
        assert!(page
            .response
            .block_signals
            .iter()
            .any(|s| s.contains("insufficient")));
    }

    #[test]
    fn test_content_is_capped() {
        let body = "word ".repeat(5000);
        let html = format!("<html><body><main>{}</main></body></html>", body);
        let page = extract_page(&fetched("https://example.com/", &html), Utc::now(), 100);
        assert!(page.content.chars().count() <= 100);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 7), "héllo w");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn test_block_signals() {
        let html = format!("<html><body>Attention Required! {}</body></html>", "x".repeat(2000));
        let signals = detect_block_signals(403, &html);
        assert_eq!(signals.len(), 2);
        assert!(detect_block_signals(200, &"y".repeat(2000)).is_empty());
    }

    struct SlowFetcher;

    #[async_trait]
    impl PageFetcher for SlowFetcher {
        async fn fetch_page(&self, url: &str) -> Result<FetchedPage, FetchError> {
            tokio::time::sleep(Duration::from_secs(120)).await;
            Ok(fetched(url, "<html></html>"))
        }

        async fn fetch_resource(
            &self,
            _url: &str,
            _timeout: Duration,
        ) -> Result<crate::fetcher::Resource, FetchError> {
            Err(FetchError::Transport("unused".into()))
        }

        async fn fetch_as(
            &self,
            _url: &str,
            _user_agent: &str,
            _timeout: Duration,
        ) -> Result<FetchedPage, FetchError> {
            Err(FetchError::Transport("unused".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_extract_times_out() {
        let extractor = ContentExtractor::new(Arc::new(SlowFetcher), &AnalyzerConfig::default());
        let err = extractor.extract("https://slow.test/").await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_error_status_without_body_fails() {
        let fetcher = StaticFetcher::new().with_fetched(FetchedPage {
            status: 404,
            html: "  ".into(),
            ..fetched("https://example.com/gone", "")
        });
        let extractor = ContentExtractor::new(Arc::new(fetcher), &AnalyzerConfig::default());
        let err = extractor.extract("https://example.com/gone").await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404 }));
    }
}
