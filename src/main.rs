use axum::{
    extract::{Path as UrlPath, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use std::env;
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use site_visibility::{
    anchoring::{plan_render, LiveDocument, RenderPlan},
    build_http_client,
    cache::MokaReportCache,
    fetcher::{HttpFetcher, PageFetcher},
    normalize_seed,
    store::MemoryStore,
    types::*,
    AnalyzerConfig, AppState,
};

const CERT_DIR: &str = "/app/certificates";

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: message.into() }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = AnalyzerConfig::from_env();
    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:5000".to_string());

    info!("Starting site visibility analyzer");
    info!(
        "Max pages: {}, crawl delay: {:?}, cache TTL: {:?}",
        config.max_pages, config.crawl_delay, config.cache_ttl
    );

    let http_client = build_http_client(&config)?;
    let http = HttpFetcher::new(http_client, config.max_redirects);
    let fetcher = page_fetcher(http, &config).await;

    let state = Arc::new(AppState::new(
        fetcher,
        Arc::new(MemoryStore::new()),
        Arc::new(MokaReportCache::default()),
        config,
    ));

    let app = router(state.clone());

    // Start server
    let tls_cert = env::var("TLS_HOST_CERT").ok();
    let tls_key = env::var("TLS_HOST_KEY").ok();

    match (tls_cert, tls_key) {
        (Some(cert_name), Some(key_name)) => {
            let cert_path = Path::new(CERT_DIR).join(cert_name);
            let key_path = Path::new(CERT_DIR).join(key_name);
            let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
                cert_path,
                key_path,
            )
            .await?;
            info!("Listening on https://{}", bind_addr);
            axum_server::bind_rustls(bind_addr.parse()?, tls_config)
                .serve(app.into_make_service())
                .await?;
        }
        (cert, key) => {
            if cert.is_some() || key.is_some() {
                warn!("TLS_HOST_CERT and TLS_HOST_KEY must both be set to enable inbound TLS. Falling back to HTTP.");
            }
            let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
            info!("Listening on http://{}", bind_addr);
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
    }

    state.analyzer.shutdown();
    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/analyze", post(analyze_handler))
        .route("/domains/:hostname", get(domain_handler))
        .route("/domains/:hostname/pages", get(domain_pages_handler))
        .route("/score", post(score_handler))
        .route("/render-plan", post(render_plan_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[cfg(feature = "browser")]
async fn page_fetcher(http: HttpFetcher, config: &AnalyzerConfig) -> Arc<dyn PageFetcher> {
    use site_visibility::renderer::ChromiumFetcher;
    // used when the browser cannot start
    let fallback = http.clone();
    match ChromiumFetcher::launch(http, config.page_timeout).await {
        Ok(browser) => Arc::new(browser),
        Err(e) => {
            warn!("Headless browser unavailable ({}). Analyzing served HTML only.", e);
            Arc::new(fallback)
        }
    }
}

#[cfg(not(feature = "browser"))]
async fn page_fetcher(http: HttpFetcher, _config: &AnalyzerConfig) -> Arc<dyn PageFetcher> {
    Arc::new(http)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "site-visibility",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<(StatusCode, Json<AnalyzeResponse>), ApiError> {
    match state.analyzer.submit(&request.url).await {
        Ok(response) => {
            let status = match response.status {
                AnalysisStatus::Analyzing => StatusCode::ACCEPTED,
                AnalysisStatus::Complete => StatusCode::OK,
            };
            Ok((status, Json(response)))
        }
        Err(e) => {
            error!("Rejected analyze request for '{}': {}", request.url, e);
            Err(api_error(StatusCode::BAD_REQUEST, e.to_string()))
        }
    }
}

async fn domain_handler(
    State(state): State<Arc<AppState>>,
    UrlPath(hostname): UrlPath<String>,
) -> Result<Json<DomainReport>, ApiError> {
    state
        .analyzer
        .report(&hostname)
        .await
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("No analysis for {}", hostname)))
}

async fn domain_pages_handler(
    State(state): State<Arc<AppState>>,
    UrlPath(hostname): UrlPath<String>,
) -> Json<Vec<PageAnalysis>> {
    Json(state.analyzer.pages(&hostname).await)
}

async fn score_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ScoreRequest>,
) -> Result<Json<ScoreResponse>, ApiError> {
    if let Err(e) = normalize_seed(&request.url) {
        error!("Rejected score request: {}", e);
        return Err(api_error(StatusCode::BAD_REQUEST, e.to_string()));
    }
    Ok(Json(state.analyzer.score_request(&request)))
}

async fn render_plan_handler(Json(request): Json<RenderPlanRequest>) -> Json<RenderPlan> {
    let live = LiveDocument::parse(&request.html);
    Json(plan_render(&request.snapshot, &live, &request.highlights))
}
