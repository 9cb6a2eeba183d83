//! Headless Chromium fetcher for pages whose content is built by scripts.

use crate::error::FetchError;
use crate::fetcher::{random_user_agent, FetchedPage, HttpFetcher, PageFetcher, Resource, ResponseHeaders};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, EventResponseReceived,
    RequestId, ResourceType,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// No request in flight for this long counts as network idle.
const NETWORK_IDLE: Duration = Duration::from_millis(500);

/// Left of the page timeout for reading the DOM once the network settles.
const READ_MARGIN: Duration = Duration::from_secs(2);

/// What the browser saw for the top-level document.
#[derive(Debug, Default)]
struct DocumentResponse {
    request: Option<RequestId>,
    status: Option<u16>,
    redirects: Vec<String>,
    headers: ResponseHeaders,
}

impl DocumentResponse {
    fn on_request(&mut self, event: &EventRequestWillBeSent) {
        if self.request.is_none() && event.r#type == Some(ResourceType::Document) {
            self.request = Some(event.request_id.clone());
        }
        if self.request.as_ref() == Some(&event.request_id) {
            // the browser reuses the request id across redirect hops
            if let Some(hop) = &event.redirect_response {
                self.redirects.push(hop.url.clone());
            }
        }
    }

    fn on_response(&mut self, event: &EventResponseReceived) {
        if self.request.as_ref() != Some(&event.request_id) {
            return;
        }
        self.status = u16::try_from(event.response.status).ok();
        let headers = event.response.headers.inner();
        let header = |name: &str| {
            headers.as_object().and_then(|map| {
                map.iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
                    .and_then(|(_, v)| v.as_str())
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
            })
        };
        self.headers = ResponseHeaders {
            last_modified: header("last-modified"),
            cache_control: header("cache-control"),
            etag: header("etag"),
            x_robots_tag: header("x-robots-tag"),
        };
    }
}

/// Renders pages in headless Chromium under a desktop browser identity.
///
/// Status, headers and the redirect chain are read from the browser's own
/// network events, so each page is requested once. Readiness is network
/// idle within the page timeout. Non-page resources and crawler-identity
/// requests skip the browser.
pub struct ChromiumFetcher {
    browser: Browser,
    http: HttpFetcher,
    page_timeout: Duration,
}

impl ChromiumFetcher {
    /// Launches Chromium. `CHROMIUM_PATH` overrides executable discovery.
    pub async fn launch(http: HttpFetcher, page_timeout: Duration) -> Result<Self, FetchError> {
        let user_agent = random_user_agent();
        let mut builder = BrowserConfig::builder()
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg(format!("--user-agent={}", user_agent));
        if let Ok(path) = std::env::var("CHROMIUM_PATH") {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| FetchError::Render(format!("browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| FetchError::Render(format!("launch failed: {e}")))?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler event error: {}", e);
                }
            }
        });
        info!("Launched headless Chromium as '{}'", user_agent);

        Ok(Self {
            browser,
            http,
            page_timeout,
        })
    }

    async fn render(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| FetchError::Render(format!("opening tab failed: {e}")))?;
        let result = self.navigate(&page, url).await;
        if let Err(e) = page.close().await {
            debug!("closing tab for {}: {}", url, e);
        }
        result
    }

    async fn navigate(&self, page: &Page, url: &str) -> Result<FetchedPage, FetchError> {
        let listen_err = |e| FetchError::Render(format!("network events unavailable: {e}"));
        let mut requests = page.event_listener::<EventRequestWillBeSent>().await.map_err(listen_err)?;
        let mut responses = page.event_listener::<EventResponseReceived>().await.map_err(listen_err)?;
        let mut finished = page.event_listener::<EventLoadingFinished>().await.map_err(listen_err)?;
        let mut failed = page.event_listener::<EventLoadingFailed>().await.map_err(listen_err)?;

        let deadline = Instant::now() + self.page_timeout.saturating_sub(READ_MARGIN);
        match tokio::time::timeout_at(deadline, page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(FetchError::Render(format!("navigation failed: {e}"))),
            Err(_) => return Err(FetchError::Timeout(self.page_timeout)),
        }
        if let Err(e) = page.wait_for_navigation().await {
            debug!("wait_for_navigation on {}: {}", url, e);
        }

        let mut document = DocumentResponse::default();
        let mut in_flight: HashSet<RequestId> = HashSet::new();
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    debug!("{} never went network idle; reading the DOM as is", url);
                    break;
                }
                _ = tokio::time::sleep(NETWORK_IDLE), if in_flight.is_empty() => break,
                Some(event) = requests.next() => {
                    document.on_request(&event);
                    in_flight.insert(event.request_id.clone());
                }
                Some(event) = responses.next() => document.on_response(&event),
                Some(event) = finished.next() => {
                    in_flight.remove(&event.request_id);
                }
                Some(event) = failed.next() => {
                    in_flight.remove(&event.request_id);
                }
            }
        }

        let Some(status) = document.status else {
            return Err(FetchError::Render(format!("no document response for {}", url)));
        };
        let html = page
            .content()
            .await
            .map_err(|e| FetchError::Render(format!("reading DOM failed: {e}")))?;
        let final_url = page
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| url.to_string());

        Ok(FetchedPage {
            requested_url: url.to_string(),
            final_url,
            status,
            redirects: document.redirects,
            headers: document.headers,
            html,
        })
    }
}

#[async_trait]
impl PageFetcher for ChromiumFetcher {
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage, FetchError> {
        match self.render(url).await {
            Ok(page) => Ok(page),
            Err(e) if e.is_timeout() => Err(e),
            Err(e) => {
                warn!("Rendering {} failed, using served HTML: {}", url, e);
                self.http.fetch_page(url).await
            }
        }
    }

    async fn fetch_resource(&self, url: &str, timeout: Duration) -> Result<Resource, FetchError> {
        self.http.fetch_resource(url, timeout).await
    }

    async fn fetch_as(
        &self,
        url: &str,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<FetchedPage, FetchError> {
        self.http.fetch_as(url, user_agent, timeout).await
    }
}
