use crate::config::AnalyzerConfig;
use crate::discovery::{normalize_url, SiteDiscoverer};
use crate::error::FetchError;
use crate::extractor::{detect_block_signals, ContentExtractor};
use crate::fetcher::{PageFetcher, AI_CRAWLER_USER_AGENT};
use crate::robots::{parse_robots, RobotsTxt};
use crate::types::{AiCrawlerPolicy, CrawlerView, FailedPage, Page, SiteContext};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Outcome of one crawl. Partial results are normal; an unreachable seed is
/// reported through `seed_error`, not by an empty page list alone.
#[derive(Debug, Clone, Default)]
pub struct CrawlResult {
    pub seed_url: String,
    pub pages: Vec<Page>,
    pub failures: Vec<FailedPage>,
    pub discovered: Vec<String>,
    pub seed_error: Option<String>,
    pub cancelled: bool,
}

impl CrawlResult {
    pub fn seed_reachable(&self) -> bool {
        self.seed_error.is_none() && !self.pages.is_empty()
    }
}

#[async_trait]
pub trait SiteCrawler: Send + Sync {
    async fn crawl(&self, seed_url: &str, cancel: &CancellationToken) -> CrawlResult;
}

/// Sequential, polite crawler: seed, robots.txt, discovery, then one page at
/// a time with the configured delay between fetches.
pub struct Crawler {
    extractor: ContentExtractor,
    discoverer: SiteDiscoverer,
    fetcher: Arc<dyn PageFetcher>,
    max_pages: usize,
    crawl_delay: Duration,
    probe_timeout: Duration,
}

impl Crawler {
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: &AnalyzerConfig) -> Self {
        Self {
            extractor: ContentExtractor::new(fetcher.clone(), config),
            discoverer: SiteDiscoverer::new(fetcher.clone(), config),
            fetcher,
            max_pages: config.max_pages,
            crawl_delay: config.crawl_delay,
            probe_timeout: config.sitemap_probe_timeout,
        }
    }

    /// Best effort; `None` when robots.txt could not be retrieved at all.
    async fn fetch_robots(&self, seed: &Page) -> Option<RobotsTxt> {
        let base = Url::parse(&seed.response.final_url)
            .or_else(|_| Url::parse(&seed.url))
            .ok()?;
        let robots_url = base.join("/robots.txt").ok()?;
        debug!("Fetching {}", robots_url);
        match self
            .fetcher
            .fetch_resource(robots_url.as_str(), self.probe_timeout)
            .await
        {
            Ok(res) if res.is_ok() => Some(parse_robots(&res.body)),
            // no robots.txt means nothing is disallowed
            Ok(res) if res.status == 404 || res.status == 410 => Some(RobotsTxt::default()),
            Ok(res) => {
                debug!("{} answered {}", robots_url, res.status);
                None
            }
            Err(e) => {
                debug!("{} unreachable: {}", robots_url, e);
                None
            }
        }
    }

    /// Request the seed again as an AI crawler and record what it is served.
    async fn crawler_view(&self, seed: &Page) -> CrawlerView {
        debug!("Requesting {} as {}", seed.url, AI_CRAWLER_USER_AGENT);
        match self
            .fetcher
            .fetch_as(&seed.url, AI_CRAWLER_USER_AGENT, self.probe_timeout)
            .await
        {
            Ok(fetched) => {
                let view = CrawlerView {
                    user_agent: AI_CRAWLER_USER_AGENT.to_string(),
                    status: fetched.status,
                    redirects: fetched.redirects,
                    block_signals: detect_block_signals(fetched.status, &fetched.html),
                };
                if view.is_blocked() {
                    warn!(
                        "{} is blocked for AI crawlers (status {}, {:?})",
                        seed.url, view.status, view.block_signals
                    );
                }
                view
            }
            Err(e) => {
                warn!("{} unreachable as an AI crawler: {}", seed.url, e);
                CrawlerView {
                    user_agent: AI_CRAWLER_USER_AGENT.to_string(),
                    status: 0,
                    redirects: Vec::new(),
                    block_signals: vec![format!("request failed: {}", e)],
                }
            }
        }
    }

    async fn extract_or_cancel(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Option<Result<Page, FetchError>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.extractor.extract(url) => Some(result),
        }
    }
}

fn failed(url: &str, error: &FetchError) -> FailedPage {
    FailedPage {
        url: url.to_string(),
        error: error.to_string(),
        timed_out: error.is_timeout(),
    }
}

#[async_trait]
impl SiteCrawler for Crawler {
    async fn crawl(&self, seed_url: &str, cancel: &CancellationToken) -> CrawlResult {
        let mut result = CrawlResult {
            seed_url: seed_url.to_string(),
            ..Default::default()
        };
        info!("Starting crawl of {} (max {} pages)", seed_url, self.max_pages);

        let seed = match self.extract_or_cancel(seed_url, cancel).await {
            None => {
                result.cancelled = true;
                return result;
            }
            Some(Ok(page)) => page,
            Some(Err(e)) => {
                warn!("Seed page {} could not be extracted: {}", seed_url, e);
                result.failures.push(failed(seed_url, &e));
                result.seed_error = Some(e.to_string());
                return result;
            }
        };

        let crawler_view = self.crawler_view(&seed).await;
        let robots = self.fetch_robots(&seed).await;
        let site = self
            .discoverer
            .discover(&seed, robots.as_ref(), self.max_pages)
            .await;
        result.discovered = site.urls.clone();
        result.pages.push(seed);

        for url in site.urls.iter().skip(1) {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    result.cancelled = true;
                    break;
                }
                _ = tokio::time::sleep(self.crawl_delay) => {}
            }

            match self.extract_or_cancel(url, cancel).await {
                None => {
                    result.cancelled = true;
                    break;
                }
                Some(Ok(page)) => result.pages.push(page),
                Some(Err(e)) => {
                    warn!("Skipping {}: {}", url, e);
                    result.failures.push(failed(url, &e));
                }
            }
        }

        let policy = robots
            .as_ref()
            .map(|r| r.ai_crawler_policy())
            .unwrap_or(AiCrawlerPolicy::Unknown);
        result.pages = std::mem::take(&mut result.pages)
            .into_iter()
            .map(|page| {
                let key = normalize_url(&page.url).unwrap_or_else(|| page.url.clone());
                let entry = site.sitemap_entries.get(&key);
                page.with_site_context(SiteContext {
                    in_sitemap: entry.is_some(),
                    sitemap_lastmod: entry.copied().flatten(),
                    ai_crawlers: policy,
                    crawler_view: Some(crawler_view.clone()),
                })
            })
            .collect();

        info!(
            "Crawl of {} finished: {} pages extracted, {} failed{}",
            seed_url,
            result.pages.len(),
            result.failures.len(),
            if result.cancelled { " (cancelled)" } else { "" }
        );
        result
    }
}
