use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cache::Cache;

/// Default NVD CVE API endpoint.
pub const NVD_API_URL: &str = "https://services.nvd.nist.gov/rest/json/cves/2.0";

/// What the feed knows about one CVE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CveRecord {
    pub id: String,
    pub description: String,
    /// Highest CVSS base score published for the CVE; 0.0 when none.
    pub score: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("feed request for {id} failed")]
    Http {
        id: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("feed returned status {status} for {id}")]
    Status { id: String, status: u16 },

    #[error("{0} not found in feed")]
    NotFound(String),
}

#[async_trait]
pub trait CveFeed: Send + Sync {
    async fn lookup(&self, id: &str) -> Result<CveRecord, FeedError>;
}

pub struct NvdFeed {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl NvdFeed {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

impl Default for NvdFeed {
    fn default() -> Self {
        Self::new(NVD_API_URL)
    }
}

#[derive(Deserialize)]
struct NvdResponse {
    #[serde(default)]
    vulnerabilities: Vec<NvdItem>,
}

#[derive(Deserialize)]
struct NvdItem {
    cve: NvdCve,
}

#[derive(Deserialize)]
struct NvdCve {
    id: String,
    #[serde(default)]
    descriptions: Vec<NvdDescription>,
    #[serde(default)]
    metrics: HashMap<String, Vec<NvdMetric>>,
}

#[derive(Deserialize)]
struct NvdDescription {
    lang: String,
    value: String,
}

#[derive(Deserialize)]
struct NvdMetric {
    #[serde(rename = "cvssData")]
    cvss_data: NvdCvssData,
}

#[derive(Deserialize)]
struct NvdCvssData {
    #[serde(rename = "baseScore")]
    base_score: f64,
}

impl NvdCve {
    fn into_record(self) -> CveRecord {
        let score = self
            .metrics
            .values()
            .flatten()
            .map(|m| m.cvss_data.base_score)
            .fold(0.0, f64::max);
        let description = self
            .descriptions
            .iter()
            .find(|d| d.lang == "en")
            .or_else(|| self.descriptions.first())
            .map(|d| d.value.clone())
            .unwrap_or_default();
        CveRecord {
            id: self.id,
            description,
            score,
        }
    }
}

#[async_trait]
impl CveFeed for NvdFeed {
    async fn lookup(&self, id: &str) -> Result<CveRecord, FeedError> {
        let http = |source| FeedError::Http {
            id: id.to_string(),
            source,
        };

        let mut request = self.client.get(&self.url).query(&[("cveId", id)]);
        if let Some(key) = &self.api_key {
            request = request.header("apiKey", key);
        }
        let response = request.send().await.map_err(http)?;

        if !response.status().is_success() {
            return Err(FeedError::Status {
                id: id.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body: NvdResponse = response.json().await.map_err(http)?;
        body.vulnerabilities
            .into_iter()
            .map(|item| item.cve)
            .find(|cve| cve.id.eq_ignore_ascii_case(id))
            .map(NvdCve::into_record)
            .ok_or_else(|| FeedError::NotFound(id.to_string()))
    }
}

/// Memoizes feed lookups for the lifetime of the cache value.
///
/// Records are fetched on first reference and never refetched. The lock is
/// held across the fetch, so concurrent callers never look up the same
/// identifier twice.
pub struct CveCache {
    feed: Box<dyn CveFeed>,
    entries: Mutex<HashMap<String, CveRecord>>,
    disk: Option<Cache>,
}

impl CveCache {
    pub fn new(feed: Box<dyn CveFeed>) -> Self {
        Self {
            feed,
            entries: Mutex::new(HashMap::new()),
            disk: None,
        }
    }

    /// Also keeps records on disk between runs.
    pub fn with_disk_cache(mut self, disk: Cache) -> Self {
        self.disk = Some(disk);
        self
    }

    pub async fn get(&self, id: &str) -> Result<CveRecord, FeedError> {
        let mut entries = self.entries.lock().await;
        if let Some(record) = entries.get(id) {
            return Ok(record.clone());
        }

        let disk_key = format!("cve_{}", id);
        let record = match self.disk.as_ref().and_then(|d| d.get::<CveRecord>(&disk_key)) {
            Some(record) => record,
            None => {
                debug!(id, "querying feed");
                let record = self.feed.lookup(id).await?;
                if let Some(disk) = &self.disk {
                    if let Err(e) = disk.set(&disk_key, &record) {
                        warn!(
                            id,
                            dir = %disk.dir().display(),
                            error = %format_args!("{:#}", e),
                            "failed to store feed record"
                        );
                    }
                }
                record
            }
        };

        entries.insert(id.to_string(), record.clone());
        Ok(record)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// In-memory feed counting its lookups.
    pub(crate) struct StaticFeed {
        pub records: HashMap<String, f64>,
        pub lookups: Arc<AtomicUsize>,
    }

    impl StaticFeed {
        pub fn new(records: &[(&str, f64)]) -> Self {
            Self {
                records: records.iter().map(|(id, s)| (id.to_string(), *s)).collect(),
                lookups: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl CveFeed for StaticFeed {
        async fn lookup(&self, id: &str) -> Result<CveRecord, FeedError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            let score = self
                .records
                .get(id)
                .ok_or_else(|| FeedError::NotFound(id.to_string()))?;
            Ok(CveRecord {
                id: id.to_string(),
                description: format!("description of {}", id),
                score: *score,
            })
        }
    }

    #[tokio::test]
    async fn test_lookup_is_memoized() {
        let feed = StaticFeed::new(&[("CVE-1", 4.0)]);
        let lookups = feed.lookups.clone();
        let cache = CveCache::new(Box::new(feed));

        assert_eq!(cache.get("CVE-1").await.unwrap().score, 4.0);
        assert_eq!(cache.get("CVE-1").await.unwrap().score, 4.0);
        assert_eq!(lookups.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_lookup_failure_is_not_cached() {
        let feed = StaticFeed::new(&[]);
        let lookups = feed.lookups.clone();
        let cache = CveCache::new(Box::new(feed));

        assert!(matches!(cache.get("CVE-9").await, Err(FeedError::NotFound(_))));
        assert!(cache.get("CVE-9").await.is_err());
        assert_eq!(lookups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_disk_cache_survives_new_process_cache() {
        let dir = tempfile::tempdir().unwrap();

        let first = CveCache::new(Box::new(StaticFeed::new(&[("CVE-1", 7.5)])))
            .with_disk_cache(Cache::in_dir(dir.path(), Duration::from_secs(3600)));
        first.get("CVE-1").await.unwrap();

        let feed = StaticFeed::new(&[]);
        let lookups = feed.lookups.clone();
        let second = CveCache::new(Box::new(feed))
            .with_disk_cache(Cache::in_dir(dir.path(), Duration::from_secs(3600)));
        assert_eq!(second.get("CVE-1").await.unwrap().score, 7.5);
        assert_eq!(lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unwritable_disk_cache_still_returns_record() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();

        let cache = CveCache::new(Box::new(StaticFeed::new(&[("CVE-1", 5.0)])))
            .with_disk_cache(Cache::in_dir(&blocker, Duration::from_secs(3600)));
        assert_eq!(cache.get("CVE-1").await.unwrap().score, 5.0);
        assert!(blocker.is_file());
    }

    #[test]
    fn test_nvd_record_parsing() {
        let body = r#"{
            "vulnerabilities": [{
                "cve": {
                    "id": "CVE-2015-0219",
                    "descriptions": [
                        {"lang": "es", "value": "Django ..."},
                        {"lang": "en", "value": "WSGI header spoofing"}
                    ],
                    "metrics": {
                        "cvssMetricV31": [{"cvssData": {"baseScore": 5.3}}],
                        "cvssMetricV2": [{"cvssData": {"baseScore": 7.5}}]
                    }
                }
            }]
        }"#;
        let response: NvdResponse = serde_json::from_str(body).unwrap();
        let record = response
            .vulnerabilities
            .into_iter()
            .next()
            .unwrap()
            .cve
            .into_record();
        assert_eq!(record.id, "CVE-2015-0219");
        assert_eq!(record.description, "WSGI header spoofing");
        assert_eq!(record.score, 7.5);
    }

    #[test]
    fn test_nvd_record_without_metrics() {
        let cve: NvdCve = serde_json::from_str(r#"{"id": "CVE-1"}"#).unwrap();
        let record = cve.into_record();
        assert_eq!(record.score, 0.0);
        assert_eq!(record.description, "");
    }
}
