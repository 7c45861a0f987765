//! Event publishing.
//!
//! Classified events go to an event intake endpoint as JSON over HTTP, or,
//! when none is configured, to stdout as one JSON record per line.

use async_trait::async_trait;
use std::io::Write;
use std::sync::Mutex;
use tracing::{info, warn};

use crate::classify::{ClassifyError, Classifier};
use crate::model::VulnEvent;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to post event")]
    Http(#[from] reqwest::Error),

    #[error("event intake returned status {0}")]
    Status(u16),

    #[error("failed to serialize event")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write event")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("classification failed, nothing was published")]
    Classify(#[from] ClassifyError),

    #[error("publishing failed")]
    Publish(#[from] PublishError),
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, event: &VulnEvent) -> Result<(), PublishError>;
}

/// Classifies every event, then publishes them all.
///
/// Publishing only starts once the whole batch classified, so a failed
/// classification leaves nothing half published. Returns the number of
/// events published.
pub async fn classify_and_publish(
    mut events: Vec<VulnEvent>,
    classifier: &Classifier<'_>,
    publisher: &dyn Publisher,
) -> Result<usize, BatchError> {
    for event in &mut events {
        if !classifier.classify(&mut event.vuln.draft).await? {
            warn!(
                host = %event.asset.hostname,
                value = %event.vuln.draft.description,
                "no lineage matched"
            );
        }
    }

    for event in &events {
        publisher.publish(event).await?;
    }
    info!(published = events.len(), "events published");
    Ok(events.len())
}

/// Posts each event as JSON to an intake URL.
pub struct HttpPublisher {
    client: reqwest::Client,
    url: String,
}

impl HttpPublisher {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn publish(&self, event: &VulnEvent) -> Result<(), PublishError> {
        let response = self.client.post(&self.url).json(event).send().await?;
        if !response.status().is_success() {
            return Err(PublishError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

/// Writes each event as a single line of JSON.
pub struct JsonLinesPublisher<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesPublisher<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl JsonLinesPublisher<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

#[async_trait]
impl<W: Write + Send> Publisher for JsonLinesPublisher<W> {
    async fn publish(&self, event: &VulnEvent) -> Result<(), PublishError> {
        let line = serde_json::to_string(event)?;
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        writeln!(out, "{}", line)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{CveCache, CveFeed, CveRecord, FeedError, Filter};
    use crate::model::{Asset, Status, VulnDetails, VulnerabilityDraft};
    use chrono::Utc;

    fn event(host: &str) -> VulnEvent {
        VulnEvent {
            timestamp: Utc::now(),
            description: "fleetcheck check for django".into(),
            source_name: "fleetcheck".into(),
            asset: Asset {
                asset_id: 1,
                hostname: host.into(),
            },
            vuln: VulnDetails {
                vuln_id: "django".into(),
                title: "/srv/a".into(),
                draft: VulnerabilityDraft {
                    status: Status::Closed,
                    ..VulnerabilityDraft::new("1.8.3")
                },
            },
        }
    }

    const FILTER: &str = r#"{
        "name": "django",
        "lastupdated": "2015-06-01T12:30:00Z",
        "lineage": [{
            "value": "^1\\.8\\.",
            "filters": [
                { "type": "anchor", "value": "^1\\.8\\.[3-9]$", "ok": true },
                { "type": "cve", "cves": ["CVE-2015-0219"] },
                { "type": "anchor", "ok": false, "impact": "high" }
            ]
        }]
    }"#;

    /// A feed that knows no CVE at all.
    struct EmptyFeed;

    #[async_trait]
    impl CveFeed for EmptyFeed {
        async fn lookup(&self, id: &str) -> Result<CveRecord, FeedError> {
            Err(FeedError::NotFound(id.to_string()))
        }
    }

    fn draft_event(host: &str, version: &str) -> VulnEvent {
        let mut event = event(host);
        event.vuln.draft = VulnerabilityDraft::new(version);
        event
    }

    #[tokio::test]
    async fn test_failed_classification_publishes_nothing() {
        let filter = Filter::from_json(FILTER).unwrap();
        let feed = CveCache::new(Box::new(EmptyFeed));
        let classifier = Classifier::new(&filter).with_feed(&feed);
        let publisher = JsonLinesPublisher::new(Vec::new());

        // The first event needs no feed lookup; the second one fails.
        let events = vec![draft_event("web1", "1.8.3"), draft_event("web2", "1.8.1")];
        let err = classify_and_publish(events, &classifier, &publisher)
            .await
            .unwrap_err();

        assert!(matches!(err, BatchError::Classify(_)));
        assert!(publisher.into_inner().is_empty());
    }

    #[tokio::test]
    async fn test_classify_and_publish_batch() {
        let filter = Filter::from_json(FILTER).unwrap();
        let classifier = Classifier::new(&filter);
        let publisher = JsonLinesPublisher::new(Vec::new());

        let events = vec![
            draft_event("web1", "1.8.3"),
            draft_event("web2", "1.8.1"),
            draft_event("web3", "2.0.0"),
        ];
        let published = classify_and_publish(events, &classifier, &publisher)
            .await
            .unwrap();
        assert_eq!(published, 3);

        let output = String::from_utf8(publisher.into_inner()).unwrap();
        let statuses: Vec<Status> = output
            .lines()
            .map(|l| serde_json::from_str::<VulnEvent>(l).unwrap().vuln.draft.status)
            .collect();
        assert_eq!(statuses, vec![Status::Closed, Status::Open, Status::Unknown]);
    }

    #[tokio::test]
    async fn test_json_lines() {
        let publisher = JsonLinesPublisher::new(Vec::new());
        publisher.publish(&event("web1")).await.unwrap();
        publisher.publish(&event("web2")).await.unwrap();

        let output = String::from_utf8(publisher.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: VulnEvent = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed.asset.hostname, "web2");
        assert_eq!(parsed.vuln.draft.status, Status::Closed);
    }
}
