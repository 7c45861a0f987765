use tracing::debug;

use super::feed::{CveCache, FeedError};
use super::filter::{Anchor, Filter, FilterEntry, Lineage};
use super::severity::derive_score;
use crate::model::{Status, VulnerabilityDraft};

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("classifying {description:?}")]
    Feed {
        description: String,
        #[source]
        source: FeedError,
    },
}

/// Applies a [`Filter`] to vulnerability drafts.
///
/// Matching is first-match-wins at each level: one lineage per draft, then
/// one anchor within it. CVE identifiers from accumulator entries seen before
/// the matching anchor are attached to the draft.
pub struct Classifier<'a> {
    filter: &'a Filter,
    feed: Option<&'a CveCache>,
}

impl<'a> Classifier<'a> {
    pub fn new(filter: &'a Filter) -> Self {
        Self { filter, feed: None }
    }

    /// Scores drafts from the CVE feed instead of impact labels alone.
    pub fn with_feed(mut self, feed: &'a CveCache) -> Self {
        self.feed = Some(feed);
        self
    }

    /// Classifies `draft` in place.
    ///
    /// Returns `false` and leaves the draft untouched when no lineage or
    /// anchor applies. A feed failure is an error for the default lineage
    /// just as for a matched one.
    pub async fn classify(&self, draft: &mut VulnerabilityDraft) -> Result<bool, ClassifyError> {
        let Some(lineage) = self.filter.select_lineage(&draft.description) else {
            debug!(description = %draft.description, "no lineage applies");
            return Ok(false);
        };
        self.apply_lineage(lineage, draft)
            .await
            .map_err(|source| ClassifyError::Feed {
                description: draft.description.clone(),
                source,
            })
    }

    async fn apply_lineage(
        &self,
        lineage: &Lineage,
        draft: &mut VulnerabilityDraft,
    ) -> Result<bool, FeedError> {
        let mut running = Vec::new();

        for entry in lineage.entries() {
            match entry {
                FilterEntry::Accumulator { cves } => running.extend(cves.iter().cloned()),
                FilterEntry::Anchor(anchor) if anchor.matches(&draft.description) => {
                    self.apply(anchor, running, draft).await?;
                    return Ok(true);
                }
                FilterEntry::Anchor(_) => {}
            }
        }

        match lineage.default_entry() {
            Some(anchor) => {
                self.apply(anchor, running, draft).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn apply(
        &self,
        anchor: &Anchor,
        cves: Vec<String>,
        draft: &mut VulnerabilityDraft,
    ) -> Result<(), FeedError> {
        draft.status = if anchor.ok { Status::Closed } else { Status::Open };
        if !anchor.description.is_empty() {
            draft.proof = format!("{}: {}", self.filter.name(), anchor.description);
        }
        draft.proof = format!(
            "{}, filter applied from {}",
            draft.proof,
            self.filter.last_updated().format("%Y-%m-%d %H:%M")
        );
        if let Some(impact) = &anchor.impact {
            draft.impact_label = Some(impact.clone());
        }
        draft.cves = cves;

        debug!(
            description = %draft.description,
            status = %draft.status,
            cves = draft.cves.len(),
            "filter applied"
        );
        derive_score(draft, self.feed).await
    }
}
