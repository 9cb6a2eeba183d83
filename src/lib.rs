pub mod aggregate;
pub mod analyzer;
pub mod anchoring;
pub mod cache;
pub mod config;
pub mod crawler;
pub mod discovery;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod highlights;
#[cfg(feature = "browser")]
pub mod renderer;
pub mod robots;
pub mod scoring;
pub mod sitemap;
pub mod store;
pub mod types;

use anyhow::Context;
use std::env;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

const CERT_DIR: &str = "/app/certificates";

pub use analyzer::{normalize_seed, Analysis, Analyzer};
pub use config::AnalyzerConfig;
pub use types::*;

/// Shared handles for the route layer, built once at startup.
#[derive(Debug, Clone)]
pub struct AppState {
    pub analyzer: Analyzer,
}

impl AppState {
    pub fn new(
        fetcher: Arc<dyn fetcher::PageFetcher>,
        store: Arc<dyn store::Store>,
        cache: Arc<dyn cache::ReportCache>,
        config: AnalyzerConfig,
    ) -> Self {
        Self {
            analyzer: Analyzer::with_fetcher(fetcher, store, cache, config),
        }
    }
}

/// Outbound client for page fetches. Redirects are followed manually by
/// the fetcher so the chain can be recorded.
pub fn build_http_client(config: &AnalyzerConfig) -> anyhow::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(config.page_timeout)
        .redirect(reqwest::redirect::Policy::none());

    if let Ok(ca_cert_name) = env::var("TLS_CA_CERT") {
        let cert_path = Path::new(CERT_DIR).join(&ca_cert_name);
        let pem = std::fs::read(&cert_path)
            .with_context(|| format!("Failed to read TLS CA certificate at {}", cert_path.display()))?;
        let cert = reqwest::Certificate::from_pem(&pem)
            .with_context(|| format!("Failed to parse TLS CA certificate at {}", cert_path.display()))?;
        info!("Loaded TLS CA certificate from {}", cert_path.display());
        builder = builder.add_root_certificate(cert);
    }

    builder.build().context("Failed to build HTTP client")
}
