use crate::types::DomainReport;
use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use std::time::{Duration, Instant};

/// Cache collaborator for finished domain reports, keyed by hostname.
#[async_trait]
pub trait ReportCache: Send + Sync {
    async fn get(&self, hostname: &str) -> Option<DomainReport>;

    async fn set(&self, hostname: &str, report: DomainReport, ttl: Duration);

    async fn invalidate(&self, hostname: &str);
}

#[derive(Clone)]
struct Entry {
    report: DomainReport,
    ttl: Duration,
}

/// Each entry lives for the ttl it was stored with.
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

#[derive(Clone)]
pub struct MokaReportCache {
    inner: Cache<String, Entry>,
}

impl MokaReportCache {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .expire_after(PerEntryTtl)
                .build(),
        }
    }
}

impl Default for MokaReportCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl ReportCache for MokaReportCache {
    async fn get(&self, hostname: &str) -> Option<DomainReport> {
        self.inner.get(hostname).await.map(|e| e.report)
    }

    async fn set(&self, hostname: &str, report: DomainReport, ttl: Duration) {
        self.inner.insert(hostname.to_string(), Entry { report, ttl }).await;
    }

    async fn invalidate(&self, hostname: &str) {
        self.inner.invalidate(hostname).await;
    }
}
