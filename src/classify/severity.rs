use super::feed::{CveCache, FeedError};
use crate::model::VulnerabilityDraft;

/// Stands for "further, unlisted CVEs apply" in a filter's CVE lists.
pub const OTHERS_TOKEN: &str = "others";

pub const MAX_SCORE: f64 = 10.0;

/// Score for an impact label when no feed score is available.
pub fn impact_score(label: &str) -> Option<f64> {
    match label {
        "maximum" => Some(MAX_SCORE),
        "high" => Some(9.0),
        "mediumlow" | "medium" | "low" => Some(7.0),
        _ => None,
    }
}

/// Sets `draft.cvss` (and `draft.cve_text` when the feed is used).
///
/// With a feed, the score is the highest score among the draft's CVEs, and
/// the [`OTHERS_TOKEN`] forces [`MAX_SCORE`]. Without a feed, or when the
/// feed yields no positive score, the impact label decides.
pub async fn derive_score(
    draft: &mut VulnerabilityDraft,
    feed: Option<&CveCache>,
) -> Result<(), FeedError> {
    let mut score = None;

    if let Some(cache) = feed {
        let mut max: f64 = 0.0;
        let mut text = Vec::with_capacity(draft.cves.len());
        for id in &draft.cves {
            if id == OTHERS_TOKEN {
                max = MAX_SCORE;
                text.push(format!("{}: Other CVEs are also applicable", OTHERS_TOKEN));
                continue;
            }
            let record = cache.get(id).await?;
            max = max.max(record.score);
            text.push(format!("{}: {}", id, record.description));
        }
        draft.cve_text = text;
        if max > 0.0 {
            score = Some(max);
        }
    }

    draft.cvss = score.or_else(|| draft.impact_label.as_deref().and_then(impact_score));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::feed::tests::StaticFeed;

    fn draft(cves: &[&str], impact: Option<&str>) -> VulnerabilityDraft {
        VulnerabilityDraft {
            cves: cves.iter().map(|s| s.to_string()).collect(),
            impact_label: impact.map(String::from),
            ..VulnerabilityDraft::new("1.8.1")
        }
    }

    fn cache() -> CveCache {
        CveCache::new(Box::new(StaticFeed::new(&[("CVE-1", 4.0), ("CVE-2", 7.5)])))
    }

    #[test]
    fn test_impact_score_table() {
        assert_eq!(impact_score("maximum"), Some(10.0));
        assert_eq!(impact_score("high"), Some(9.0));
        assert_eq!(impact_score("mediumlow"), Some(7.0));
        assert_eq!(impact_score("medium"), Some(7.0));
        assert_eq!(impact_score("low"), Some(7.0));
        assert_eq!(impact_score("cosmetic"), None);
    }

    #[tokio::test]
    async fn test_feed_max_score() {
        let mut d = draft(&["CVE-1", "CVE-2"], Some("maximum"));
        derive_score(&mut d, Some(&cache())).await.unwrap();
        assert_eq!(d.cvss, Some(7.5));
        assert_eq!(
            d.cve_text,
            vec!["CVE-1: description of CVE-1", "CVE-2: description of CVE-2"]
        );
    }

    #[tokio::test]
    async fn test_others_forces_maximum() {
        let mut d = draft(&["CVE-1", "others", "CVE-2"], None);
        derive_score(&mut d, Some(&cache())).await.unwrap();
        assert_eq!(d.cvss, Some(10.0));
        assert_eq!(d.cve_text[1], "others: Other CVEs are also applicable");
    }

    #[tokio::test]
    async fn test_impact_fallback_without_feed() {
        let mut d = draft(&["CVE-1"], Some("high"));
        derive_score(&mut d, None).await.unwrap();
        assert_eq!(d.cvss, Some(9.0));
        assert!(d.cve_text.is_empty());

        let mut d = draft(&[], Some("negligible"));
        derive_score(&mut d, None).await.unwrap();
        assert_eq!(d.cvss, None);
    }

    #[tokio::test]
    async fn test_impact_fallback_when_feed_has_no_cves() {
        let mut d = draft(&[], Some("mediumlow"));
        derive_score(&mut d, Some(&cache())).await.unwrap();
        assert_eq!(d.cvss, Some(7.0));
    }

    #[tokio::test]
    async fn test_feed_failure_propagates() {
        let mut d = draft(&["CVE-1", "CVE-404"], Some("high"));
        let err = derive_score(&mut d, Some(&cache())).await.unwrap_err();
        assert!(matches!(err, FeedError::NotFound(id) if id == "CVE-404"));
    }
}
