//! The classification rule table.
//!
//! A filter is a JSON document holding an ordered list of lineages. Each
//! lineage is gated by a regular expression over the result description and
//! holds an ordered list of entries. All regular expressions are compiled
//! when the filter is loaded; a filter that fails to compile is rejected.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("failed to read filter {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse filter")]
    Parse(#[from] serde_json::Error),

    #[error("lineage {lineage}: invalid gate")]
    LineageGate {
        lineage: usize,
        #[source]
        source: regex::Error,
    },

    #[error("lineage {lineage}, entry {entry}: invalid gate")]
    EntryGate {
        lineage: usize,
        entry: usize,
        #[source]
        source: regex::Error,
    },

    #[error("lineage {lineage}, entry {entry}: unknown entry type {kind:?}")]
    UnknownEntryType {
        lineage: usize,
        entry: usize,
        kind: String,
    },

    #[error("lineages {first} and {second} both lack a gate; only one default lineage is allowed")]
    DuplicateDefaultLineage { first: usize, second: usize },

    #[error("lineage {lineage}: entries {first} and {second} are both default anchors")]
    DuplicateDefaultEntry {
        lineage: usize,
        first: usize,
        second: usize,
    },
}

#[derive(Deserialize)]
struct RawFilter {
    name: String,
    #[serde(rename = "lastupdated")]
    last_updated: DateTime<Utc>,
    #[serde(rename = "lineage", default)]
    lineages: Vec<RawLineage>,
}

#[derive(Deserialize)]
struct RawLineage {
    #[serde(default)]
    value: String,
    #[serde(rename = "filters", default)]
    entries: Vec<RawEntry>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct RawEntry {
    description: String,
    value: String,
    #[serde(rename = "type")]
    kind: String,
    ok: bool,
    #[serde(rename = "entryts")]
    entry_ts: Option<DateTime<Utc>>,
    impact: String,
    cves: Vec<String>,
}

/// A terminal classification rule.
#[derive(Debug, Clone)]
pub struct Anchor {
    /// `None` marks the lineage's default anchor.
    pub gate: Option<Regex>,
    /// Whether a match means the host is not vulnerable.
    pub ok: bool,
    pub description: String,
    pub impact: Option<String>,
    pub entry_ts: Option<DateTime<Utc>>,
}

impl Anchor {
    pub fn is_default(&self) -> bool {
        self.gate.is_none()
    }

    pub fn matches(&self, description: &str) -> bool {
        self.gate.as_ref().is_some_and(|gate| gate.is_match(description))
    }
}

#[derive(Debug, Clone)]
pub enum FilterEntry {
    Anchor(Anchor),
    /// Contributes CVE identifiers to whichever anchor matches later.
    Accumulator { cves: Vec<String> },
}

#[derive(Debug, Clone)]
pub struct Lineage {
    gate: Option<Regex>,
    entries: Vec<FilterEntry>,
    default_entry: Option<usize>,
}

impl Lineage {
    pub fn is_default(&self) -> bool {
        self.gate.is_none()
    }

    pub fn matches(&self, description: &str) -> bool {
        self.gate.as_ref().is_some_and(|gate| gate.is_match(description))
    }

    pub fn entries(&self) -> &[FilterEntry] {
        &self.entries
    }

    pub fn default_entry(&self) -> Option<&Anchor> {
        match self.entries.get(self.default_entry?)? {
            FilterEntry::Anchor(anchor) => Some(anchor),
            FilterEntry::Accumulator { .. } => None,
        }
    }
}

/// A loaded, read-only rule table.
#[derive(Debug, Clone)]
pub struct Filter {
    name: String,
    last_updated: DateTime<Utc>,
    lineages: Vec<Lineage>,
    default_lineage: Option<usize>,
}

impl Filter {
    pub fn load(path: &Path) -> Result<Self, FilterError> {
        info!(path = %path.display(), "loading filter");
        let content = std::fs::read_to_string(path).map_err(|source| FilterError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, FilterError> {
        let raw: RawFilter = serde_json::from_str(content)?;

        let mut lineages = Vec::with_capacity(raw.lineages.len());
        let mut default_lineage = None;
        for (li, raw_lineage) in raw.lineages.into_iter().enumerate() {
            let lineage = compile_lineage(li, raw_lineage)?;
            if lineage.is_default() {
                if let Some(first) = default_lineage {
                    return Err(FilterError::DuplicateDefaultLineage { first, second: li });
                }
                default_lineage = Some(li);
            }
            lineages.push(lineage);
        }

        Ok(Self {
            name: raw.name,
            last_updated: raw.last_updated,
            lineages,
            default_lineage,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn lineages(&self) -> &[Lineage] {
        &self.lineages
    }

    pub fn default_lineage(&self) -> Option<&Lineage> {
        self.lineages.get(self.default_lineage?)
    }

    /// First gated lineage matching `description`, else the default lineage.
    pub fn select_lineage(&self, description: &str) -> Option<&Lineage> {
        self.lineages
            .iter()
            .find(|lineage| lineage.matches(description))
            .or_else(|| self.default_lineage())
    }
}

fn compile_lineage(li: usize, raw: RawLineage) -> Result<Lineage, FilterError> {
    let gate = if raw.value.is_empty() {
        None
    } else {
        Some(
            Regex::new(&raw.value)
                .map_err(|source| FilterError::LineageGate { lineage: li, source })?,
        )
    };

    let mut entries = Vec::with_capacity(raw.entries.len());
    let mut default_entry = None;
    for (ei, raw_entry) in raw.entries.into_iter().enumerate() {
        let entry = match raw_entry.kind.as_str() {
            "anchor" => {
                if !raw_entry.cves.is_empty() {
                    warn!(lineage = li, entry = ei, "cves on an anchor entry are ignored");
                }
                let gate = if raw_entry.value.is_empty() {
                    if let Some(first) = default_entry {
                        return Err(FilterError::DuplicateDefaultEntry {
                            lineage: li,
                            first,
                            second: ei,
                        });
                    }
                    default_entry = Some(ei);
                    None
                } else {
                    Some(Regex::new(&raw_entry.value).map_err(|source| {
                        FilterError::EntryGate {
                            lineage: li,
                            entry: ei,
                            source,
                        }
                    })?)
                };
                FilterEntry::Anchor(Anchor {
                    gate,
                    ok: raw_entry.ok,
                    description: raw_entry.description,
                    impact: Some(raw_entry.impact).filter(|i| !i.is_empty()),
                    entry_ts: raw_entry.entry_ts,
                })
            }
            "cve" | "accumulator" => FilterEntry::Accumulator {
                cves: raw_entry.cves,
            },
            other => {
                return Err(FilterError::UnknownEntryType {
                    lineage: li,
                    entry: ei,
                    kind: other.to_string(),
                })
            }
        };
        entries.push(entry);
    }

    Ok(Lineage {
        gate,
        entries,
        default_entry,
    })
}
