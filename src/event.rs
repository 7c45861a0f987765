//! Result lines to vulnerability events.
//!
//! The `scan` command writes one line per candidate:
//!
//! ```text
//! <host> <path> <ok|error> <trimmed-path|-> <value|error text>
//! ```
//!
//! The `classify` command reads those lines back and turns each successful
//! one into a [`VulnEvent`] whose draft the classifier then fills in.

use chrono::Utc;

use crate::asset::{AssetError, AssetRegistry};
use crate::model::{Asset, VulnDetails, VulnEvent, VulnerabilityDraft};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LineError {
    #[error("not enough fields in result line: {0:?}")]
    TooFewFields(String),

    #[error("invalid status {status:?} in result line: {line:?}")]
    BadStatus { status: String, line: String },
}

/// A parsed result line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultLine {
    pub host: String,
    pub path: String,
    pub ok: bool,
    pub result_path: Option<String>,
    /// The value for `ok` lines (empty when nothing matched), else the error text.
    pub detail: String,
}

impl ResultLine {
    pub fn parse(line: &str) -> Result<Self, LineError> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 5 {
            return Err(LineError::TooFewFields(line.to_string()));
        }
        let ok = match fields[2] {
            "ok" => true,
            "error" => false,
            other => {
                return Err(LineError::BadStatus {
                    status: other.to_string(),
                    line: line.to_string(),
                })
            }
        };
        let dash_to_none = |s: &str| if s == "-" { None } else { Some(s.to_string()) };
        let detail = fields[4..].join(" ");
        Ok(Self {
            host: fields[0].to_string(),
            path: fields[1].to_string(),
            ok,
            result_path: dash_to_none(fields[3]),
            detail: if ok && detail == "-" { String::new() } else { detail },
        })
    }

    /// The title an event is filed under: the trimmed path when there is one.
    pub fn title(&self) -> &str {
        self.result_path.as_deref().unwrap_or(&self.path)
    }
}

/// Builds unclassified events for one check.
pub struct EventBuilder<'a> {
    check: String,
    source_name: String,
    assets: &'a AssetRegistry,
}

impl<'a> EventBuilder<'a> {
    pub fn new(check: impl Into<String>, source_name: impl Into<String>, assets: &'a AssetRegistry) -> Self {
        Self {
            check: check.into(),
            source_name: source_name.into(),
            assets,
        }
    }

    pub fn build(&self, line: &ResultLine) -> Result<VulnEvent, AssetError> {
        let asset_id = self
            .assets
            .resolve_or_create(&line.host, line.title(), &self.check)?;

        Ok(VulnEvent {
            timestamp: Utc::now(),
            description: format!("{} check for {}", self.source_name, self.check),
            source_name: self.source_name.clone(),
            asset: Asset {
                asset_id,
                hostname: line.host.clone(),
            },
            vuln: VulnDetails {
                vuln_id: self.check.clone(),
                title: line.title().to_string(),
                draft: VulnerabilityDraft::new(line.detail.clone()),
            },
        })
    }
}
