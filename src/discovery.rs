use crate::config::AnalyzerConfig;
use crate::fetcher::PageFetcher;
use crate::robots::RobotsTxt;
use crate::sitemap::{parse_sitemap, SitemapEntry, SITEMAP_PROBE_PATHS};
use crate::types::Page;
use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Child sitemaps followed from one index file.
const MAX_CHILD_SITEMAPS: usize = 3;

static NON_CONTENT_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)/login|/signup|/cart|/checkout|/admin|/api/|\.(pdf|docx?|xlsx?|pptx?|zip|rar)$")
        .expect("non-content pattern is valid")
});

/// The bounded page set for one crawl, seed first.
#[derive(Debug, Clone, Default)]
pub struct DiscoveredSite {
    pub urls: Vec<String>,
    pub sitemap_url: Option<String>,
    /// Every same-host sitemap location with its `<lastmod>`, before the cap.
    pub sitemap_entries: BTreeMap<String, Option<DateTime<Utc>>>,
}

/// Canonical string form used for de-duplication: parsed, fragment dropped.
pub fn normalize_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    url.set_fragment(None);
    Some(url.to_string())
}

pub fn is_non_content_url(url: &Url) -> bool {
    NON_CONTENT_PATH.is_match(url.path())
}

fn same_host(url: &Url, host: &str) -> bool {
    url.host_str().map(|h| h.eq_ignore_ascii_case(host)).unwrap_or(false)
}

/// `<link rel="sitemap" href>` in the seed document, resolved against the seed.
fn declared_sitemap(html: &str, base: &Url) -> Option<String> {
    let document = Html::parse_document(html);
    let sel = Selector::parse("link[rel~=\"sitemap\"][href]").ok()?;
    let href = document.select(&sel).next()?.value().attr("href")?;
    base.join(href.trim()).ok().map(|u| u.to_string())
}

pub struct SiteDiscoverer {
    fetcher: Arc<dyn PageFetcher>,
    probe_timeout: Duration,
}

impl SiteDiscoverer {
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: &AnalyzerConfig) -> Self {
        Self {
            fetcher,
            probe_timeout: config.sitemap_probe_timeout,
        }
    }

    /// Resolve the page set for `seed`. Never fails: sitemap problems degrade
    /// to in-page links, and the worst case is the seed alone.
    pub async fn discover(
        &self,
        seed: &Page,
        robots: Option<&RobotsTxt>,
        max_pages: usize,
    ) -> DiscoveredSite {
        let mut site = DiscoveredSite::default();
        // links were resolved against where the seed actually landed
        let seed_raw = if seed.response.final_url.is_empty() {
            &seed.url
        } else {
            &seed.response.final_url
        };
        let seed_url = match normalize_url(seed_raw).and_then(|s| Url::parse(&s).ok()) {
            Some(u) => u,
            None => {
                warn!("Seed URL {} cannot be parsed; discovery limited to the seed", seed.url);
                site.urls.push(seed.url.clone());
                return site;
            }
        };
        let Some(host) = seed_url.host_str().map(|h| h.to_string()) else {
            site.urls.push(seed_url.to_string());
            return site;
        };

        let mut urls = vec![seed_url.to_string()];

        // in-page anchors
        for link in &seed.metadata.links {
            if let Ok(u) = Url::parse(link) {
                if same_host(&u, &host) && !is_non_content_url(&u) {
                    urls.push(u.to_string());
                }
            }
        }

        // sitemap
        if let Some((sitemap_url, body)) = self.locate_sitemap(seed, &seed_url, robots).await {
            for entry in self.sitemap_entries(&sitemap_url, body).await {
                let Some(normalized) = normalize_url(&entry.loc) else { continue };
                let Ok(u) = Url::parse(&normalized) else { continue };
                if !same_host(&u, &host) || is_non_content_url(&u) {
                    continue;
                }
                site.sitemap_entries.entry(normalized.clone()).or_insert(entry.lastmod);
                urls.push(normalized);
            }
            site.sitemap_url = Some(sitemap_url);
        }

        let mut seen = HashSet::new();
        urls.retain(|u| seen.insert(u.clone()));
        urls.truncate(max_pages.max(1));

        info!(
            "Discovered {} URLs for {} (sitemap: {})",
            urls.len(),
            host,
            site.sitemap_url.as_deref().unwrap_or("none")
        );
        site.urls = urls;
        site
    }

    /// Declared link, then robots.txt `Sitemap:` lines, then the conventional
    /// paths. Returns the sitemap URL and, when a probe already fetched it,
    /// its body.
    async fn locate_sitemap(
        &self,
        seed: &Page,
        seed_url: &Url,
        robots: Option<&RobotsTxt>,
    ) -> Option<(String, Option<String>)> {
        if let Some(declared) = declared_sitemap(&seed.html, seed_url) {
            debug!("Seed declares sitemap {}", declared);
            return Some((declared, None));
        }
        if let Some(from_robots) = robots.and_then(|r| r.sitemaps.first()) {
            debug!("robots.txt declares sitemap {}", from_robots);
            return Some((from_robots.clone(), None));
        }
        for path in SITEMAP_PROBE_PATHS {
            let Ok(candidate) = seed_url.join(path) else { continue };
            debug!("Probing {}", candidate);
            match self
                .fetcher
                .fetch_resource(candidate.as_str(), self.probe_timeout)
                .await
            {
                Ok(res) if res.is_ok() => return Some((candidate.to_string(), Some(res.body))),
                Ok(res) => debug!("{} answered {}", candidate, res.status),
                Err(e) => debug!("{} unreachable: {}", candidate, e),
            }
        }
        None
    }

    /// All `<url>` entries of a sitemap, following an index one level deep.
    async fn sitemap_entries(&self, sitemap_url: &str, body: Option<String>) -> Vec<SitemapEntry> {
        let Some(body) = self.body_or_fetch(sitemap_url, body).await else {
            return Vec::new();
        };
        let sitemap = match parse_sitemap(&body) {
            Ok(s) => s,
            Err(e) => {
                warn!("Ignoring unparseable sitemap {}: {}", sitemap_url, e);
                return Vec::new();
            }
        };

        let mut entries = sitemap.entries;
        for child in sitemap.children.iter().take(MAX_CHILD_SITEMAPS) {
            let Some(child_body) = self.body_or_fetch(child, None).await else { continue };
            match parse_sitemap(&child_body) {
                Ok(s) => entries.extend(s.entries),
                Err(e) => warn!("Ignoring unparseable child sitemap {}: {}", child, e),
            }
        }
        entries
    }

    async fn body_or_fetch(&self, url: &str, body: Option<String>) -> Option<String> {
        if body.is_some() {
            return body;
        }
        match self.fetcher.fetch_resource(url, self.probe_timeout).await {
            Ok(res) if res.is_ok() => Some(res.body),
            Ok(res) => {
                warn!("Sitemap {} answered {}", url, res.status);
                None
            }
            Err(e) => {
                warn!("Sitemap {} unreachable: {}", url, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::extract_page;
    use crate::fetcher::{FetchedPage, HttpFetcher, ResponseHeaders, StaticFetcher};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn seed_page(url: &str, html: &str) -> Page {
        let fetched = FetchedPage {
            requested_url: url.to_string(),
            final_url: url.to_string(),
            status: 200,
            redirects: Vec::new(),
            headers: ResponseHeaders::default(),
            html: html.to_string(),
        };
        extract_page(&fetched, Utc::now(), 10_000)
    }

    fn discoverer(fetcher: Arc<dyn PageFetcher>) -> SiteDiscoverer {
        SiteDiscoverer::new(fetcher, &AnalyzerConfig::default())
    }

    #[tokio::test]
    async fn test_cap_keeps_seed_first() {
        let links: String = (0..30)
            .map(|i| format!("<a href=\"/page-{}\">p{}</a>", i, i))
            .collect();
        let html = format!("<html><body>{}</body></html>", links);
        let seed = seed_page("https://example.com/", &html);

        let site = discoverer(Arc::new(StaticFetcher::new()))
            .discover(&seed, None, 10)
            .await;
        assert_eq!(site.urls.len(), 10);
        assert_eq!(site.urls[0], "https://example.com/");
        assert_eq!(site.urls[1], "https://example.com/page-0");
        assert!(site.sitemap_url.is_none());
    }

    #[tokio::test]
    async fn test_excludes_other_hosts_and_non_content() {
        let html = r#"<html><body>
            <a href="https://example.com/a">a</a>
            <a href="https://blog.example.com/b">sub</a>
            <a href="https://other.test/c">other</a>
            <a href="/login">login</a>
            <a href="/files/report.PDF">pdf</a>
            <a href="/a#section">dup</a>
            <a href="tel:123">tel</a>
        </body></html>"#;
        let seed = seed_page("https://example.com/", html);

        let site = discoverer(Arc::new(StaticFetcher::new()))
            .discover(&seed, None, 10)
            .await;
        assert_eq!(
            site.urls,
            vec!["https://example.com/".to_string(), "https://example.com/a".to_string()]
        );
    }

    #[tokio::test]
    async fn test_declared_sitemap_index_is_followed() {
        let fetcher = StaticFetcher::new()
            .with_resource(
                "https://example.com/maps/index.xml",
                200,
                r#"<sitemapindex><sitemap><loc>https://example.com/maps/posts.xml</loc></sitemap></sitemapindex>"#,
            )
            .with_resource(
                "https://example.com/maps/posts.xml",
                200,
                r#"<urlset>
                    <url><loc>https://example.com/post-1</loc><lastmod>2024-02-01</lastmod></url>
                    <url><loc>https://elsewhere.test/post-2</loc></url>
                   </urlset>"#,
            );
        let html = r#"<html><head><link rel="sitemap" href="/maps/index.xml"></head><body></body></html>"#;
        let seed = seed_page("https://example.com/", html);

        let site = discoverer(Arc::new(fetcher)).discover(&seed, None, 10).await;
        assert_eq!(site.sitemap_url.as_deref(), Some("https://example.com/maps/index.xml"));
        assert_eq!(
            site.urls,
            vec!["https://example.com/".to_string(), "https://example.com/post-1".to_string()]
        );
        assert!(site.sitemap_entries["https://example.com/post-1"].is_some());
    }

    #[tokio::test]
    async fn test_probes_conventional_paths_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let urlset = format!(
            "<urlset><url><loc>{0}/from-sitemap</loc></url><url><loc>http://localhost:1/x</loc></url></urlset>",
            server.uri()
        );
        Mock::given(method("GET"))
            .and(path("/sitemap_index.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(urlset))
            .mount(&server)
            .await;

        let seed_url = format!("{}/", server.uri());
        let seed = seed_page(&seed_url, "<html><body><a href=\"/linked\">l</a></body></html>");
        let fetcher = HttpFetcher::with_default_client(5).unwrap();

        let site = discoverer(Arc::new(fetcher)).discover(&seed, None, 10).await;
        assert_eq!(site.sitemap_url, Some(format!("{}/sitemap_index.xml", server.uri())));
        assert_eq!(
            site.urls,
            vec![
                seed_url.clone(),
                format!("{}/linked", server.uri()),
                format!("{}/from-sitemap", server.uri()),
            ]
        );
    }

    #[tokio::test]
    async fn test_broken_sitemap_degrades_to_links() {
        let fetcher = StaticFetcher::new().with_resource("https://example.com/sitemap.xml", 200, "<urlset><url>");
        let seed = seed_page(
            "https://example.com/",
            "<html><body><a href=\"/about\">About</a></body></html>",
        );
        let site = discoverer(Arc::new(fetcher)).discover(&seed, None, 10).await;
        assert_eq!(
            site.urls,
            vec!["https://example.com/".to_string(), "https://example.com/about".to_string()]
        );
        assert!(site.sitemap_entries.is_empty());
    }
}
