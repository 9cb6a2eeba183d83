use chrono::Utc;
use site_visibility::cache::MokaReportCache;
use site_visibility::discovery::SiteDiscoverer;
use site_visibility::error::FetchError;
use site_visibility::extractor::extract_page;
use site_visibility::fetcher::{FetchedPage, PageFetcher, ResponseHeaders, StaticFetcher};
use site_visibility::store::{MemoryStore, Store};
use site_visibility::{AnalysisOutcome, Analyzer, AnalyzerConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

fn page_html(title: &str, links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|l| format!("<a href=\"{}\">{}</a> ", l, l))
        .collect();
    format!(
        "<html><head><title>{}</title></head><body><main><h1>{}</h1><p>Some text about {}.</p><p>{}</p></main></body></html>",
        title, title, title, anchors
    )
}

fn five_page_site() -> StaticFetcher {
    StaticFetcher::new()
        .with_page(
            "https://shop.test/",
            &page_html("Home", &["/one", "/two", "/three", "/four"]),
        )
        .with_page("https://shop.test/one", &page_html("One", &[]))
        .with_failure(
            "https://shop.test/two",
            FetchError::Timeout(Duration::from_secs(30)),
        )
        .with_page("https://shop.test/three", &page_html("Three", &[]))
        .with_failure(
            "https://shop.test/four",
            FetchError::Transport("connection reset".into()),
        )
}

fn analyzer(fetcher: Arc<dyn PageFetcher>, store: Arc<MemoryStore>) -> Analyzer {
    Analyzer::with_fetcher(
        fetcher,
        store,
        Arc::new(MokaReportCache::default()),
        AnalyzerConfig::default().with_max_pages(5),
    )
}

#[tokio::test(start_paused = true)]
async fn partial_crawl_failure_analyzes_the_rest() {
    let store = Arc::new(MemoryStore::new());
    let analyzer = analyzer(Arc::new(five_page_site()), store.clone());

    let analysis = analyzer
        .analyze("shop.test", &CancellationToken::new())
        .await
        .unwrap();
    let report = analysis.report;

    assert_eq!(report.outcome, AnalysisOutcome::Complete);
    assert_eq!(report.summary.pages_analyzed, 3);
    assert_eq!(report.failed_pages.len(), 2);
    assert!(report.failed_pages.iter().any(|f| f.timed_out));
    assert_eq!(store.domain_pages("shop.test").await.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn second_analysis_within_ttl_is_served_from_cache() {
    let fetcher = Arc::new(five_page_site());
    let analyzer = analyzer(fetcher.clone(), Arc::new(MemoryStore::new()));
    let cancel = CancellationToken::new();

    let first = analyzer.analyze("https://shop.test", &cancel).await.unwrap();
    let fetches = fetcher.page_fetches();
    assert_eq!(fetches, 5);

    let second = analyzer.analyze("shop.test/one", &cancel).await.unwrap();
    assert!(second.cached);
    assert_eq!(fetcher.page_fetches(), fetches);
    assert_eq!(second.report.domain_id, first.report.domain_id);
}

#[tokio::test]
async fn unreachable_seed_is_not_a_zero_score() {
    let analyzer = analyzer(Arc::new(StaticFetcher::new()), Arc::new(MemoryStore::new()));
    let analysis = analyzer
        .analyze("offline.test", &CancellationToken::new())
        .await
        .unwrap();
    assert!(matches!(
        analysis.report.outcome,
        AnalysisOutcome::Unreachable { .. }
    ));
    assert!(!analysis.cached);
}

#[tokio::test]
async fn discovery_is_capped_and_stays_on_host() {
    let mut links: Vec<String> = (0..20).map(|i| format!("/articles/{}", i)).collect();
    links.push("https://other.test/elsewhere".into());
    links.push("https://sub.news.test/page".into());
    links.push("/login".into());
    let link_refs: Vec<&str> = links.iter().map(String::as_str).collect();

    let fetched = FetchedPage {
        requested_url: "https://news.test/".into(),
        final_url: "https://news.test/".into(),
        status: 200,
        redirects: vec![],
        headers: ResponseHeaders::default(),
        html: page_html("News", &link_refs),
    };
    let seed = extract_page(&fetched, Utc::now(), 10_000);
    let discoverer = SiteDiscoverer::new(Arc::new(StaticFetcher::new()), &AnalyzerConfig::default());

    let site = discoverer.discover(&seed, None, 7).await;
    assert_eq!(site.urls.len(), 7);
    assert_eq!(site.urls[0], "https://news.test/");
    for u in &site.urls {
        assert_eq!(Url::parse(u).unwrap().host_str(), Some("news.test"));
    }

    let all = discoverer.discover(&seed, None, 100).await;
    assert_eq!(all.urls.len(), 21);
    assert!(!all.urls.iter().any(|u| u.contains("/login")));
}
