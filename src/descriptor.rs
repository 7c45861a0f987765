//! Check descriptors.
//!
//! A descriptor names one fleet check: which files the resolver should look
//! for, what to search for in each file, how to normalize the match, and how
//! to post-process the result path. Descriptors are JSON files, one check per
//! file, loaded from the configured descriptor directory.
//!
//! # Example Descriptor
//!
//! ```json
//! {
//!   "name": "django",
//!   "mig": {
//!     "filename": "^__init__\\.py$",
//!     "filepath": "/",
//!     "filecontent": "^VERSION = ",
//!     "expiry": "5m",
//!     "postfilter": "/django/__init__\\.py$"
//!   },
//!   "ssh": {
//!     "action": "egrep",
//!     "pattern": "^VERSION = ",
//!     "outputtransform": "django-python"
//!   },
//!   "result": { "trim": 2 }
//! }
//! ```

use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::resolver::ResolveCriteria;
use crate::scan::PathTrim;
use crate::transform::{Transform, TransformRegistry};

#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("failed to read descriptor {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse descriptor {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read descriptor directory")]
    Walk(#[from] walkdir::Error),

    #[error("descriptor {name}: {reason}")]
    Invalid { name: String, reason: String },

    #[error("descriptor {name}: invalid {field} pattern")]
    Regex {
        name: String,
        field: &'static str,
        #[source]
        source: regex::Error,
    },

    #[error("descriptor {0} defined more than once")]
    Duplicate(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDescriptor {
    name: String,
    mig: RawMig,
    ssh: RawSsh,
    result: RawResult,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawMig {
    filename: String,
    #[serde(rename = "filecontent")]
    file_content: String,
    #[serde(rename = "filepath")]
    file_path: String,
    #[serde(rename = "filedepth")]
    file_depth: String,
    target: String,
    expiry: String,
    #[serde(rename = "postfilter")]
    post_filter: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSsh {
    action: String,
    pattern: String,
    #[serde(rename = "outputtransform")]
    output_transform: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawResult {
    trim: i64,
}

/// What to search for inside each candidate file.
#[derive(Debug, Clone)]
pub struct SearchSpec {
    /// Extended regular expression handed to the remote `egrep`.
    pub pattern: String,
    pub transform: Transform,
}

/// A validated check descriptor.
#[derive(Debug, Clone)]
pub struct Descriptor {
    pub name: String,
    pub criteria: ResolveCriteria,
    pub search: SearchSpec,
    pub trim: PathTrim,
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

impl Descriptor {
    /// Parses and validates a descriptor from its JSON text.
    pub fn from_json(
        content: &str,
        registry: &TransformRegistry,
        path: &Path,
    ) -> Result<Self, DescriptorError> {
        let raw: RawDescriptor =
            serde_json::from_str(content).map_err(|source| DescriptorError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Self::validate(raw, registry)
    }

    /// Reads one descriptor file.
    pub fn load(path: &Path, registry: &TransformRegistry) -> Result<Self, DescriptorError> {
        let content = std::fs::read_to_string(path).map_err(|source| DescriptorError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content, registry, path)
    }

    fn validate(raw: RawDescriptor, registry: &TransformRegistry) -> Result<Self, DescriptorError> {
        if raw.name.is_empty() {
            return Err(DescriptorError::Invalid {
                name: "<unnamed>".to_string(),
                reason: "descriptor must have a name".to_string(),
            });
        }
        let name = raw.name;
        let invalid = |reason: &str| DescriptorError::Invalid {
            name: name.clone(),
            reason: reason.to_string(),
        };

        if raw.ssh.action != "egrep" {
            return Err(invalid("invalid ssh action specified"));
        }
        if raw.ssh.pattern.is_empty() {
            return Err(invalid("ssh egrep pattern must be set"));
        }
        if raw.ssh.output_transform.is_empty() {
            return Err(invalid("ssh section must have an output transform"));
        }
        if raw.mig.expiry.is_empty() {
            return Err(invalid("mig section must have an expiry"));
        }
        if raw.mig.filename.is_empty() {
            return Err(invalid("mig section must have a filename"));
        }
        if raw.result.trim < 0 {
            return Err(invalid("trim must be >= 0"));
        }

        let compile = |field: &'static str, pattern: &str| {
            Regex::new(pattern).map_err(|source| DescriptorError::Regex {
                name: name.clone(),
                field,
                source,
            })
        };
        compile("ssh", &raw.ssh.pattern)?;
        if !raw.mig.file_content.is_empty() {
            compile("filecontent", &raw.mig.file_content)?;
        }
        let post_filter = if raw.mig.post_filter.is_empty() {
            None
        } else {
            Some(compile("postfilter", &raw.mig.post_filter)?)
        };

        let transform = registry
            .get(&raw.ssh.output_transform)
            .map_err(|e| invalid(&e.to_string()))?;

        Ok(Self {
            criteria: ResolveCriteria {
                filename: raw.mig.filename,
                content: non_empty(raw.mig.file_content),
                path: non_empty(raw.mig.file_path),
                depth: non_empty(raw.mig.file_depth),
                target: non_empty(raw.mig.target),
                expiry: raw.mig.expiry,
                post_filter,
            },
            search: SearchSpec {
                pattern: raw.ssh.pattern,
                transform,
            },
            trim: PathTrim::new(raw.result.trim as usize),
            name,
        })
    }
}

/// Loads every `*.json` descriptor directly inside `dir`, sorted by name.
pub fn load_dir(dir: &Path, registry: &TransformRegistry) -> Result<Vec<Descriptor>, DescriptorError> {
    let mut descriptors = Vec::new();
    let mut seen = HashSet::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().map(|e| e != "json").unwrap_or(true) {
            debug!(path = %path.display(), "skipping non-descriptor file");
            continue;
        }

        let descriptor = Descriptor::load(path, registry)?;
        if !seen.insert(descriptor.name.clone()) {
            return Err(DescriptorError::Duplicate(descriptor.name));
        }
        info!(name = %descriptor.name, "loaded descriptor");
        descriptors.push(descriptor);
    }

    descriptors.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(descriptors)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DJANGO: &str = r#"{
        "name": "django",
        "mig": {
            "filename": "^__init__\\.py$",
            "filepath": "/srv",
            "filecontent": "^VERSION = ",
            "expiry": "5m",
            "postfilter": "/django/__init__\\.py$"
        },
        "ssh": { "action": "egrep", "pattern": "^VERSION = ", "outputtransform": "django-python" },
        "result": { "trim": 2 }
    }"#;

    fn parse(content: &str) -> Result<Descriptor, DescriptorError> {
        Descriptor::from_json(content, &TransformRegistry::builtin(), Path::new("test.json"))
    }

    #[test]
    fn test_valid_descriptor() {
        let desc = parse(DJANGO).unwrap();
        assert_eq!(desc.name, "django");
        assert_eq!(desc.criteria.filename, "^__init__\\.py$");
        assert_eq!(desc.criteria.path.as_deref(), Some("/srv"));
        assert_eq!(desc.criteria.depth, None);
        assert_eq!(desc.criteria.expiry, "5m");
        assert!(desc.criteria.post_filter.is_some());
        assert_eq!(desc.search.transform.name(), "django-python");
        assert_eq!(desc.trim, PathTrim::new(2));
    }

    #[test]
    fn test_missing_name() {
        let err = parse(r#"{"ssh": {"action": "egrep"}}"#).unwrap_err();
        assert!(err.to_string().contains("must have a name"));
    }

    #[test]
    fn test_invalid_action() {
        let content = DJANGO.replace("\"egrep\"", "\"grep\"");
        let err = parse(&content).unwrap_err();
        assert!(err.to_string().contains("invalid ssh action"));
    }

    #[test]
    fn test_missing_expiry() {
        let content = DJANGO.replace("\"expiry\": \"5m\",", "");
        let err = parse(&content).unwrap_err();
        assert!(err.to_string().contains("expiry"));
    }

    #[test]
    fn test_negative_trim() {
        let content = DJANGO.replace("\"trim\": 2", "\"trim\": -1");
        assert!(parse(&content).is_err());
    }

    #[test]
    fn test_bad_pattern() {
        let content = DJANGO.replace("\"pattern\": \"^VERSION = \"", "\"pattern\": \"(unclosed\"");
        let err = parse(&content).unwrap_err();
        assert!(matches!(err, DescriptorError::Regex { field: "ssh", .. }));
    }

    #[test]
    fn test_unknown_transform() {
        let content = DJANGO.replace("django-python", "rails-ruby");
        let err = parse(&content).unwrap_err();
        assert!(err.to_string().contains("invalid transform specified: rails-ruby"));
    }

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("django.json"), DJANGO).unwrap();
        std::fs::write(
            dir.path().join("b.json"),
            DJANGO.replace("\"django\"", "\"another\""),
        )
        .unwrap();
        std::fs::write(dir.path().join("README.md"), "not a descriptor").unwrap();

        let descriptors = load_dir(dir.path(), &TransformRegistry::builtin()).unwrap();
        let names: Vec<_> = descriptors.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["another", "django"]);
    }

    #[test]
    fn test_load_dir_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.json"), DJANGO).unwrap();
        std::fs::write(dir.path().join("b.json"), DJANGO).unwrap();

        let err = load_dir(dir.path(), &TransformRegistry::builtin()).unwrap_err();
        assert!(matches!(err, DescriptorError::Duplicate(name) if name == "django"));
    }
}
