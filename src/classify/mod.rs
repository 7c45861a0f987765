//! Vulnerability classification.
//!
//! Scan results are turned into vulnerability drafts and matched against a
//! [`Filter`]: an ordered table of lineages, each holding an ordered list of
//! anchor and accumulator entries. The first matching anchor decides the
//! draft's status, rationale and impact; the accumulators before it supply
//! its CVE list. A severity score is then taken from the CVE feed or, failing
//! that, from the impact label.
//!
//! # Example
//!
//! ```
//! use fleetcheck::classify::{Classifier, Filter};
//! use fleetcheck::model::{Status, VulnerabilityDraft};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let filter = Filter::from_json(r#"{
//!     "name": "django",
//!     "lastupdated": "2015-06-01T00:00:00Z",
//!     "lineage": [{
//!         "value": "^1\\.8\\.",
//!         "filters": [
//!             { "type": "cve", "cves": ["CVE-2015-0219"] },
//!             { "type": "anchor", "value": "^1\\.8\\.[3-9]", "ok": true },
//!             { "type": "anchor", "ok": false, "impact": "high" }
//!         ]
//!     }]
//! }"#)?;
//!
//! let mut draft = VulnerabilityDraft::new("1.8.1");
//! Classifier::new(&filter).classify(&mut draft).await?;
//!
//! assert_eq!(draft.status, Status::Open);
//! assert_eq!(draft.cves, vec!["CVE-2015-0219"]);
//! assert_eq!(draft.cvss, Some(9.0));
//! # Ok(())
//! # }
//! ```

mod engine;
mod feed;
mod filter;
mod severity;

pub use engine::{ClassifyError, Classifier};
pub use feed::{CveCache, CveFeed, CveRecord, FeedError, NvdFeed, NVD_API_URL};
pub use filter::{Anchor, Filter, FilterEntry, FilterError, Lineage};
pub use severity::{derive_score, impact_score, MAX_SCORE, OTHERS_TOKEN};
