use crate::error::FetchError;
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use rand::Rng;
use reqwest::{Client, Response};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// User agents for rotation
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
];

/// Identity used to check what an AI crawler is served.
pub const AI_CRAWLER_USER_AGENT: &str =
    "Mozilla/5.0 AppleWebKit/537.36 (KHTML, like Gecko; compatible; GPTBot/1.2; +https://openai.com/gptbot)";

/// Get a random User-Agent string
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::thread_rng();
    let index = rng.gen_range(0..USER_AGENTS.len());
    USER_AGENTS[index]
}

/// The response headers the scorers care about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeaders {
    pub last_modified: Option<String>,
    pub cache_control: Option<String>,
    pub etag: Option<String>,
    pub x_robots_tag: Option<String>,
}

/// A page as delivered by a fetcher: final markup plus response metadata.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub requested_url: String,
    pub final_url: String,
    pub status: u16,
    pub redirects: Vec<String>,
    pub headers: ResponseHeaders,
    pub html: String,
}

/// A non-page resource (sitemap, robots.txt).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub status: u16,
    pub body: String,
}

impl Resource {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Acquisition seam. Implementations decide how a document is rendered;
/// callers only see the resulting markup.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch a page as a rendered document.
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage, FetchError>;

    /// Fetch a plain resource with its own short timeout.
    async fn fetch_resource(&self, url: &str, timeout: Duration) -> Result<Resource, FetchError>;

    /// Fetch the served markup as a specific user-agent sees it, without
    /// rendering.
    async fn fetch_as(
        &self,
        url: &str,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<FetchedPage, FetchError>;
}

fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

fn header_string(resp: &Response, name: reqwest::header::HeaderName) -> Option<String> {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// reqwest-backed fetcher. Follows redirects itself so the chain can be
/// reported; the client it is given must have redirects disabled.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    max_redirects: usize,
}

impl HttpFetcher {
    pub fn new(client: Client, max_redirects: usize) -> Self {
        Self {
            client,
            max_redirects,
        }
    }

    /// Build with a private client (redirects off, 30s ceiling).
    pub fn with_default_client(max_redirects: usize) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self::new(client, max_redirects))
    }

    async fn send_once(
        &self,
        url: &str,
        user_agent: &str,
        timeout: Option<Duration>,
    ) -> Result<Response, FetchError> {
        let client = self.client.clone();
        retry(
            ExponentialBackoffBuilder::new()
                .with_initial_interval(Duration::from_millis(200))
                .with_max_interval(Duration::from_secs(2))
                .with_max_elapsed_time(Some(Duration::from_secs(4)))
                .build(),
            || async {
                let mut req = client
                    .get(url)
                    .header("User-Agent", user_agent)
                    .header(
                        "Accept",
                        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
                    )
                    .header("Accept-Language", "en-US,en;q=0.5")
                    .header("DNT", "1")
                    .header("Upgrade-Insecure-Requests", "1");
                if let Some(t) = timeout {
                    req = req.timeout(t);
                }
                req.send().await.map_err(|e| {
                    // connection refused / reset is worth another try, the rest is not
                    if e.is_connect() {
                        backoff::Error::transient(FetchError::from(e))
                    } else if e.is_timeout() {
                        backoff::Error::permanent(FetchError::Timeout(
                            timeout.unwrap_or(Duration::from_secs(30)),
                        ))
                    } else {
                        backoff::Error::permanent(FetchError::from(e))
                    }
                })
            },
        )
        .await
    }

    /// GET `url`, following up to `max_redirects` hops by hand.
    async fn follow(
        &self,
        url: &str,
        user_agent: &str,
        timeout: Option<Duration>,
    ) -> Result<(Response, Vec<String>), FetchError> {
        let mut current = url.to_string();
        let mut chain = Vec::new();

        loop {
            let resp = self.send_once(&current, user_agent, timeout).await?;
            let status = resp.status().as_u16();
            if !is_redirect(status) {
                return Ok((resp, chain));
            }
            let Some(location) = header_string(&resp, reqwest::header::LOCATION) else {
                warn!("Redirect status {} for {} but no Location header", status, current);
                return Ok((resp, chain));
            };
            if chain.len() >= self.max_redirects {
                return Err(FetchError::TooManyRedirects(self.max_redirects));
            }
            let next = Url::parse(&location)
                .or_else(|_| Url::parse(&current).and_then(|base| base.join(&location)))
                .map_err(|e| FetchError::Transport(format!("bad redirect target '{}': {}", location, e)))?;
            debug!("{} redirected ({}) to {}", current, status, next);
            chain.push(current);
            current = next.to_string();
        }
    }

    /// GET `url` as `user_agent` and keep the served markup with its
    /// response metadata.
    async fn served(
        &self,
        url: &str,
        user_agent: &str,
        timeout: Option<Duration>,
    ) -> Result<FetchedPage, FetchError> {
        let (resp, redirects) = self.follow(url, user_agent, timeout).await?;
        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();
        let headers = ResponseHeaders {
            last_modified: header_string(&resp, reqwest::header::LAST_MODIFIED),
            cache_control: header_string(&resp, reqwest::header::CACHE_CONTROL),
            etag: header_string(&resp, reqwest::header::ETAG),
            x_robots_tag: header_string(
                &resp,
                reqwest::header::HeaderName::from_static("x-robots-tag"),
            ),
        };
        let html = resp
            .text()
            .await
            .map_err(|e| FetchError::Body(e.to_string()))?;

        Ok(FetchedPage {
            requested_url: url.to_string(),
            final_url,
            status,
            redirects,
            headers,
            html,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage, FetchError> {
        self.served(url, random_user_agent(), None).await
    }

    async fn fetch_resource(&self, url: &str, timeout: Duration) -> Result<Resource, FetchError> {
        let (resp, _) = self.follow(url, random_user_agent(), Some(timeout)).await?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| FetchError::Body(e.to_string()))?;
        Ok(Resource { status, body })
    }

    async fn fetch_as(
        &self,
        url: &str,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<FetchedPage, FetchError> {
        self.served(url, user_agent, Some(timeout)).await
    }
}

#[derive(Debug, Clone)]
enum Canned {
    Page(FetchedPage),
    Fail(FetchError),
}

/// In-memory fetcher serving canned documents. Used for offline replays of
/// stored snapshots and as a test double; counts page fetches.
#[derive(Default)]
pub struct StaticFetcher {
    pages: HashMap<String, Canned>,
    resources: HashMap<String, Resource>,
    crawler_pages: HashMap<String, FetchedPage>,
    page_fetches: AtomicUsize,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, html: &str) -> Self {
        self.with_fetched(FetchedPage {
            requested_url: url.to_string(),
            final_url: url.to_string(),
            status: 200,
            redirects: Vec::new(),
            headers: ResponseHeaders::default(),
            html: html.to_string(),
        })
    }

    pub fn with_fetched(mut self, page: FetchedPage) -> Self {
        self.pages
            .insert(page.requested_url.clone(), Canned::Page(page));
        self
    }

    pub fn with_failure(mut self, url: &str, error: FetchError) -> Self {
        self.pages.insert(url.to_string(), Canned::Fail(error));
        self
    }

    pub fn with_resource(mut self, url: &str, status: u16, body: &str) -> Self {
        self.resources.insert(
            url.to_string(),
            Resource {
                status,
                body: body.to_string(),
            },
        );
        self
    }

    /// What `fetch_as` returns for `url`. Without one, `fetch_as` serves
    /// the regular page.
    pub fn with_crawler_response(mut self, url: &str, status: u16, html: &str) -> Self {
        self.crawler_pages.insert(
            url.to_string(),
            FetchedPage {
                requested_url: url.to_string(),
                final_url: url.to_string(),
                status,
                redirects: Vec::new(),
                headers: ResponseHeaders::default(),
                html: html.to_string(),
            },
        );
        self
    }

    /// Rendered page fetches so far; `fetch_as` is not counted.
    pub fn page_fetches(&self) -> usize {
        self.page_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage, FetchError> {
        self.page_fetches.fetch_add(1, Ordering::SeqCst);
        match self.pages.get(url) {
            Some(Canned::Page(p)) => Ok(p.clone()),
            Some(Canned::Fail(e)) => Err(e.clone()),
            None => Err(FetchError::Transport(format!("no route to {}", url))),
        }
    }

    async fn fetch_resource(&self, url: &str, _timeout: Duration) -> Result<Resource, FetchError> {
        Ok(self.resources.get(url).cloned().unwrap_or(Resource {
            status: 404,
            body: String::new(),
        }))
    }

    async fn fetch_as(
        &self,
        url: &str,
        _user_agent: &str,
        _timeout: Duration,
    ) -> Result<FetchedPage, FetchError> {
        if let Some(page) = self.crawler_pages.get(url) {
            return Ok(page.clone());
        }
        match self.pages.get(url) {
            Some(Canned::Page(p)) => Ok(p.clone()),
            Some(Canned::Fail(e)) => Err(e.clone()),
            None => Err(FetchError::Transport(format!("no route to {}", url))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_regex, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_redirect_chain_is_recorded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(ResponseTemplate::new(301).insert_header("Location", "/new"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Cache-Control", "max-age=600")
                    .set_body_string("<html><body>moved</body></html>"),
            )
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::with_default_client(5).unwrap();
        let page = fetcher
            .fetch_page(&format!("{}/old", server.uri()))
            .await
            .unwrap();

        assert_eq!(page.status, 200);
        assert_eq!(page.redirects, vec![format!("{}/old", server.uri())]);
        assert!(page.final_url.ends_with("/new"));
        assert_eq!(page.headers.cache_control.as_deref(), Some("max-age=600"));
        assert!(page.html.contains("moved"));
    }

    #[tokio::test]
    async fn test_redirect_loop_is_bounded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/loop"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::with_default_client(3).unwrap();
        let err = fetcher
            .fetch_page(&format!("{}/loop", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::TooManyRedirects(3)));
    }

    #[tokio::test]
    async fn test_resource_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::with_default_client(5).unwrap();
        let res = fetcher
            .fetch_resource(&format!("{}/robots.txt", server.uri()), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(res.status, 404);
        assert!(!res.is_ok());
    }

    #[tokio::test]
    async fn test_fetch_as_sends_the_given_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .and(header_regex("user-agent", "GPTBot"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Access denied"))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>hi</body></html>"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::with_default_client(5).unwrap();
        let url = format!("{}/", server.uri());
        let as_crawler = fetcher
            .fetch_as(&url, AI_CRAWLER_USER_AGENT, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(as_crawler.status, 403);
        assert_eq!(fetcher.fetch_page(&url).await.unwrap().status, 200);
    }

    #[tokio::test]
    async fn test_static_fetcher_counts_and_fails() {
        let fetcher = StaticFetcher::new()
            .with_page("https://a.test/", "<html></html>")
            .with_failure("https://a.test/x", FetchError::Timeout(Duration::from_secs(1)));

        assert!(fetcher.fetch_page("https://a.test/").await.is_ok());
        assert!(fetcher.fetch_page("https://a.test/x").await.unwrap_err().is_timeout());
        assert!(fetcher.fetch_page("https://a.test/missing").await.is_err());
        assert_eq!(fetcher.page_fetches(), 3);
    }
}
