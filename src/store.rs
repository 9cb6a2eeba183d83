use crate::error::StoreError;
use crate::types::{DomainReport, Highlight, Page, PageAnalysis, Score};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Persistence collaborator. Pages are keyed by URL (every save is a new
/// version), scores and highlights by page id, domain reports by hostname.
#[async_trait]
pub trait Store: Send + Sync {
    /// Stores a new version of the page and returns its version number,
    /// starting at 1.
    async fn save_page(&self, page: &Page) -> Result<u32, StoreError>;

    /// Stores a page's score and highlights together; neither is visible
    /// until both are written. Scores are range-checked and highlight
    /// anchors validated against the page text.
    async fn save_analysis(
        &self,
        page_id: Uuid,
        score: &Score,
        highlights: &[Highlight],
    ) -> Result<(), StoreError>;

    /// Latest version of the page at `url`.
    async fn page(&self, url: &str) -> Option<Page>;

    async fn page_versions(&self, url: &str) -> Vec<Page>;

    async fn analysis(&self, page_id: Uuid) -> Option<(Score, Vec<Highlight>)>;

    /// Removes every version of the page and their analyses.
    async fn delete_page(&self, url: &str) -> bool;

    async fn save_domain(&self, report: &DomainReport) -> Result<(), StoreError>;

    async fn domain(&self, hostname: &str) -> Option<DomainReport>;

    /// Latest version of each stored page on `hostname`, ordered by URL, with
    /// whatever analysis has been written for it.
    async fn domain_pages(&self, hostname: &str) -> Vec<PageAnalysis>;
}

#[derive(Default)]
struct Tables {
    pages: BTreeMap<String, Vec<Page>>,
    analyses: HashMap<Uuid, (Score, Vec<Highlight>)>,
    domains: HashMap<String, DomainReport>,
}

impl Tables {
    fn find_page(&self, id: Uuid) -> Option<&Page> {
        self.pages.values().flatten().find(|p| p.id == id)
    }
}

/// In-process store for the service and for tests.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_page(&self, page: &Page) -> Result<u32, StoreError> {
        let mut t = self.tables.write().await;
        let versions = t.pages.entry(page.url.clone()).or_default();
        versions.push(page.clone());
        let version = versions.len() as u32;
        debug!("Stored {} version {}", page.url, version);
        Ok(version)
    }

    async fn save_analysis(
        &self,
        page_id: Uuid,
        score: &Score,
        highlights: &[Highlight],
    ) -> Result<(), StoreError> {
        score.check_bounds()?;
        let mut t = self.tables.write().await;
        let page = t.find_page(page_id).ok_or(StoreError::PageNotFound(page_id))?;
        let text_chars = page.content_chars();
        for h in highlights {
            h.validate(text_chars).map_err(|reason| StoreError::InvalidHighlight {
                id: h.id.clone(),
                reason,
            })?;
        }
        t.analyses.insert(page_id, (score.clone(), highlights.to_vec()));
        Ok(())
    }

    async fn page(&self, url: &str) -> Option<Page> {
        let t = self.tables.read().await;
        t.pages.get(url).and_then(|v| v.last()).cloned()
    }

    async fn page_versions(&self, url: &str) -> Vec<Page> {
        let t = self.tables.read().await;
        t.pages.get(url).cloned().unwrap_or_default()
    }

    async fn analysis(&self, page_id: Uuid) -> Option<(Score, Vec<Highlight>)> {
        let t = self.tables.read().await;
        t.analyses.get(&page_id).cloned()
    }

    async fn delete_page(&self, url: &str) -> bool {
        let mut t = self.tables.write().await;
        match t.pages.remove(url) {
            Some(versions) => {
                for p in versions {
                    t.analyses.remove(&p.id);
                }
                true
            }
            None => false,
        }
    }

    async fn save_domain(&self, report: &DomainReport) -> Result<(), StoreError> {
        if report.summary.overall_score > 100 {
            return Err(StoreError::OutOfRange {
                field: "overallScore".to_string(),
                value: report.summary.overall_score as u32,
                max: 100,
            });
        }
        let mut t = self.tables.write().await;
        t.domains.insert(report.hostname.clone(), report.clone());
        Ok(())
    }

    async fn domain(&self, hostname: &str) -> Option<DomainReport> {
        let t = self.tables.read().await;
        t.domains.get(hostname).cloned()
    }

    async fn domain_pages(&self, hostname: &str) -> Vec<PageAnalysis> {
        let t = self.tables.read().await;
        t.pages
            .values()
            .filter_map(|versions| versions.last().map(|p| (p, versions.len())))
            .filter(|(p, _)| p.host().as_deref() == Some(hostname))
            .map(|(p, version)| {
                let analysis = t.analyses.get(&p.id);
                PageAnalysis {
                    page_id: p.id,
                    url: p.url.clone(),
                    title: p.title.clone(),
                    version: version as u32,
                    score: analysis.map(|(s, _)| s.clone()),
                    highlights: analysis.map(|(_, h)| h.clone()).unwrap_or_default(),
                }
            })
            .collect()
    }
}
