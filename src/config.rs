use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Politeness floor between page fetches within one crawl.
pub const MIN_CRAWL_DELAY: Duration = Duration::from_secs(1);

/// Runtime knobs for one analyzer instance. Read from the environment by the
/// binary, built directly in tests.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub max_pages: usize,
    pub page_timeout: Duration,
    pub sitemap_probe_timeout: Duration,
    pub crawl_delay: Duration,
    pub max_content_chars: usize,
    pub cache_ttl: Duration,
    pub top_improvements: usize,
    pub max_redirects: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_pages: 10,
            page_timeout: Duration::from_secs(30),
            sitemap_probe_timeout: Duration::from_secs(10),
            crawl_delay: MIN_CRAWL_DELAY,
            max_content_chars: 10_000,
            cache_ttl: Duration::from_secs(3600),
            top_improvements: 5,
            max_redirects: 10,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

impl AnalyzerConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self::default()
            .with_max_pages(env_or("MAX_PAGES", d.max_pages))
            .with_page_timeout(Duration::from_secs(env_or(
                "PAGE_TIMEOUT_SECS",
                d.page_timeout.as_secs(),
            )))
            .with_sitemap_probe_timeout(Duration::from_secs(env_or(
                "SITEMAP_PROBE_TIMEOUT_SECS",
                d.sitemap_probe_timeout.as_secs(),
            )))
            .with_crawl_delay(Duration::from_millis(env_or(
                "CRAWL_DELAY_MS",
                d.crawl_delay.as_millis() as u64,
            )))
            .with_max_content_chars(env_or("MAX_CONTENT_CHARS", d.max_content_chars))
            .with_cache_ttl(Duration::from_secs(env_or(
                "CACHE_TTL_SECS",
                d.cache_ttl.as_secs(),
            )))
            .with_top_improvements(env_or("TOP_IMPROVEMENTS", d.top_improvements))
    }

    /// Seed always counts as one page, so zero is raised to one.
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn with_page_timeout(mut self, timeout: Duration) -> Self {
        self.page_timeout = timeout;
        self
    }

    pub fn with_sitemap_probe_timeout(mut self, timeout: Duration) -> Self {
        self.sitemap_probe_timeout = timeout;
        self
    }

    pub fn with_crawl_delay(mut self, delay: Duration) -> Self {
        self.crawl_delay = delay.max(MIN_CRAWL_DELAY);
        self
    }

    pub fn with_max_content_chars(mut self, chars: usize) -> Self {
        self.max_content_chars = chars;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_top_improvements(mut self, n: usize) -> Self {
        self.top_improvements = n.clamp(3, 6);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crawl_delay_has_floor() {
        let cfg = AnalyzerConfig::default().with_crawl_delay(Duration::from_millis(10));
        assert_eq!(cfg.crawl_delay, MIN_CRAWL_DELAY);

        let cfg = AnalyzerConfig::default().with_crawl_delay(Duration::from_secs(3));
        assert_eq!(cfg.crawl_delay, Duration::from_secs(3));
    }

    #[test]
    fn test_bounds_on_counts() {
        let cfg = AnalyzerConfig::default()
            .with_max_pages(0)
            .with_top_improvements(20);
        assert_eq!(cfg.max_pages, 1);
        assert_eq!(cfg.top_improvements, 6);
    }
}
