//! The inbound `analyze` operation: normalize the seed, short-circuit on a
//! cached report, otherwise crawl, score, persist and aggregate.

use crate::aggregate::aggregate;
use crate::cache::ReportCache;
use crate::config::AnalyzerConfig;
use crate::crawler::{CrawlResult, Crawler, SiteCrawler};
use crate::error::InputError;
use crate::extractor::extract_page;
use crate::fetcher::{FetchedPage, PageFetcher, ResponseHeaders};
use crate::highlights::generate_highlights;
use crate::scoring::ScoringEngine;
use crate::store::Store;
use crate::types::{
    AnalysisOutcome, AnalysisStatus, AnalyzeResponse, DomainReport, DomainSummary, Page,
    PageAnalysis, ScoreRequest, ScoreResponse,
};
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

/// Accepts a URL with or without a scheme; bare hosts get `https://`.
pub fn normalize_seed(input: &str) -> Result<Url, InputError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(InputError::Empty);
    }
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };
    let url = Url::parse(&candidate).map_err(|e| InputError::Unparseable {
        input: trimmed.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(InputError::UnsupportedScheme(url.scheme().to_string()));
    }
    match url.host_str() {
        Some(h) if !h.is_empty() => Ok(url),
        _ => Err(InputError::MissingHost(trimmed.to_string())),
    }
}

fn hostname(url: &Url) -> String {
    url.host_str().unwrap_or_default().to_ascii_lowercase()
}

/// A finished analysis and whether it came from the cache.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub report: DomainReport,
    pub cached: bool,
}

/// Runs the pipeline against injected collaborators. Cloning is cheap and
/// every clone shares the same crawler, store and cache.
#[derive(Clone)]
pub struct Analyzer {
    crawler: Arc<dyn SiteCrawler>,
    engine: ScoringEngine,
    store: Arc<dyn Store>,
    cache: Arc<dyn ReportCache>,
    config: AnalyzerConfig,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer")
            .field("engine", &self.engine)
            .field("config", &self.config)
            .finish()
    }
}

impl Analyzer {
    pub fn new(
        crawler: Arc<dyn SiteCrawler>,
        engine: ScoringEngine,
        store: Arc<dyn Store>,
        cache: Arc<dyn ReportCache>,
        config: AnalyzerConfig,
    ) -> Self {
        Self {
            crawler,
            engine,
            store,
            cache,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Builds the standard sequential crawler over `fetcher`.
    pub fn with_fetcher(
        fetcher: Arc<dyn PageFetcher>,
        store: Arc<dyn Store>,
        cache: Arc<dyn ReportCache>,
        config: AnalyzerConfig,
    ) -> Self {
        let crawler = Arc::new(Crawler::new(fetcher, &config));
        Self::new(crawler, ScoringEngine::default(), store, cache, config)
    }

    /// Cancels every background analysis started by [`Analyzer::submit`].
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn domain_id(&self, hostname: &str) -> Uuid {
        self.store
            .domain(hostname)
            .await
            .map(|d| d.domain_id)
            .unwrap_or_else(Uuid::new_v4)
    }

    /// Analyzes the domain of `input`, returning the cached report when one
    /// is still fresh. Only malformed input is an error; an unreachable site
    /// is reported through [`AnalysisOutcome::Unreachable`].
    pub async fn analyze(&self, input: &str, cancel: &CancellationToken) -> Result<Analysis, InputError> {
        let url = normalize_seed(input)?;
        let host = hostname(&url);
        if let Some(report) = self.cache.get(&host).await {
            info!("Cache hit for {}", host);
            return Ok(Analysis { report, cached: true });
        }
        let domain_id = self.domain_id(&host).await;
        let report = self.run(&url, &host, domain_id, cancel).await;
        Ok(Analysis { report, cached: false })
    }

    /// Starts an analysis in the background unless a cached report exists.
    pub async fn submit(&self, input: &str) -> Result<AnalyzeResponse, InputError> {
        let url = normalize_seed(input)?;
        let host = hostname(&url);
        if let Some(report) = self.cache.get(&host).await {
            info!("Cache hit for {}", host);
            return Ok(AnalyzeResponse {
                domain_id: report.domain_id,
                hostname: host,
                status: AnalysisStatus::Complete,
                cached: true,
                report: Some(report),
            });
        }

        let domain_id = self.domain_id(&host).await;
        let this = self.clone();
        let cancel = self.shutdown.child_token();
        let task_host = host.clone();
        tokio::spawn(async move {
            this.run(&url, &task_host, domain_id, &cancel).await;
        });

        Ok(AnalyzeResponse {
            domain_id,
            hostname: host,
            status: AnalysisStatus::Analyzing,
            cached: false,
            report: None,
        })
    }

    /// Analyzes several seeds concurrently. Each domain still crawls
    /// sequentially.
    pub async fn analyze_batch(
        &self,
        inputs: &[String],
        cancel: &CancellationToken,
    ) -> Vec<Result<Analysis, InputError>> {
        join_all(inputs.iter().map(|i| self.analyze(i, cancel))).await
    }

    async fn run(&self, url: &Url, host: &str, domain_id: Uuid, cancel: &CancellationToken) -> DomainReport {
        let crawl = self.crawler.crawl(url.as_str(), cancel).await;
        let report = if crawl.seed_reachable() {
            self.score_crawl(&crawl, host, domain_id).await
        } else {
            let reason = crawl
                .seed_error
                .clone()
                .unwrap_or_else(|| "analysis cancelled before the seed page was fetched".to_string());
            warn!("Could not analyze {}: {}", host, reason);
            DomainReport {
                domain_id,
                hostname: host.to_string(),
                seed_url: crawl.seed_url.clone(),
                outcome: AnalysisOutcome::Unreachable { reason },
                summary: DomainSummary::default(),
                failed_pages: crawl.failures.clone(),
                analyzed_at: Utc::now(),
            }
        };

        if let Err(e) = self.store.save_domain(&report).await {
            warn!("Failed to store report for {}: {}", host, e);
        }
        // unreachable and cancelled runs are retried on the next request
        if report.outcome == AnalysisOutcome::Complete && !crawl.cancelled {
            self.cache.set(host, report.clone(), self.config.cache_ttl).await;
        }
        report
    }

    async fn score_crawl(&self, crawl: &CrawlResult, host: &str, domain_id: Uuid) -> DomainReport {
        let mut scored = Vec::with_capacity(crawl.pages.len());
        for page in &crawl.pages {
            let score = self.engine.score(page);
            let highlights = generate_highlights(page, &score);
            info!(
                "Scored {}: {}/100 ({} highlights)",
                page.url,
                score.total,
                highlights.len()
            );

            match self.store.save_page(page).await {
                Ok(_) => {
                    if let Err(e) = self.store.save_analysis(page.id, &score, &highlights).await {
                        warn!("Failed to store analysis for {}: {}", page.url, e);
                    }
                }
                Err(e) => warn!("Failed to store page {}: {}", page.url, e),
            }
            scored.push((page.clone(), score));
        }

        let summary = aggregate(&scored, self.config.top_improvements);
        info!(
            "Domain {} analyzed: overall {} across {} pages",
            host, summary.overall_score, summary.pages_analyzed
        );
        DomainReport {
            domain_id,
            hostname: host.to_string(),
            seed_url: crawl.seed_url.clone(),
            outcome: AnalysisOutcome::Complete,
            summary,
            failed_pages: crawl.failures.clone(),
            analyzed_at: Utc::now(),
        }
    }

    /// Latest report for a hostname: the cache first, then the store.
    pub async fn report(&self, host: &str) -> Option<DomainReport> {
        let host = host.to_ascii_lowercase();
        match self.cache.get(&host).await {
            Some(r) => Some(r),
            None => self.store.domain(&host).await,
        }
    }

    pub async fn pages(&self, host: &str) -> Vec<PageAnalysis> {
        self.store.domain_pages(&host.to_ascii_lowercase()).await
    }

    /// Scores a submitted page without crawling. Raw markup goes through the
    /// extractor; otherwise the supplied text fields are scored as given.
    pub fn score_request(&self, req: &ScoreRequest) -> ScoreResponse {
        let now = Utc::now();
        let page = match req.html.as_deref().filter(|h| !h.trim().is_empty()) {
            Some(html) => {
                let fetched = FetchedPage {
                    requested_url: req.url.clone(),
                    final_url: req.url.clone(),
                    status: 200,
                    redirects: vec![],
                    headers: ResponseHeaders::default(),
                    html: html.to_string(),
                };
                extract_page(&fetched, now, self.config.max_content_chars)
            }
            None => {
                let mut page = Page::empty(&req.url, now);
                page.title = req.title.clone();
                page.description = req.description.clone();
                page.content = req.content.clone();
                page.response.status = 200;
                page
            }
        };
        let score = self.engine.score(&page);
        let highlights = generate_highlights(&page, &score);
        ScoreResponse { score, highlights }
    }
}
