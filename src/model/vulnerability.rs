use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Unknown,
    Open,
    Closed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Unknown => "unknown",
            Status::Open => "open",
            Status::Closed => "closed",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A vulnerability record under classification.
///
/// Created with everything but `description` at its unknown default;
/// a single classification pass fills in the rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilityDraft {
    pub description: String,
    pub status: Status,
    #[serde(default)]
    pub proof: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact_label: Option<String>,
    #[serde(rename = "cve", default)]
    pub cves: Vec<String>,
    #[serde(rename = "cvetext", default)]
    pub cve_text: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cvss: Option<f64>,
}

impl VulnerabilityDraft {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    #[serde(rename = "assetid")]
    pub asset_id: u64,
    pub hostname: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VulnDetails {
    #[serde(rename = "vulnid")]
    pub vuln_id: String,
    pub title: String,
    #[serde(flatten)]
    pub draft: VulnerabilityDraft,
}

/// A classified result ready for publishing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VulnEvent {
    pub timestamp: DateTime<Utc>,
    pub description: String,
    #[serde(rename = "sourcename")]
    pub source_name: String,
    pub asset: Asset,
    pub vuln: VulnDetails,
}
