//! Candidate resolution.
//!
//! The resolver asks the fleet inventory agent which hosts carry files
//! matching a descriptor's criteria. The stock implementation shells out to
//! the `mig` client (`mig file ...`) and parses its `host path` output.

use anyhow::Context;
use async_trait::async_trait;
use regex::Regex;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::model::Candidate;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("failed to run resolver")]
    Command(#[from] anyhow::Error),

    #[error("resolver exited with status {0}")]
    Exit(String),

    #[error("malformed output from resolver: {0}")]
    Malformed(String),
}

/// Static criteria a candidate file must satisfy.
#[derive(Debug, Clone, Default)]
pub struct ResolveCriteria {
    /// File name regex.
    pub filename: String,
    /// File content regex.
    pub content: Option<String>,
    /// Root path to search under.
    pub path: Option<String>,
    /// Maximum search depth below `path`.
    pub depth: Option<String>,
    /// Inventory target scope.
    pub target: Option<String>,
    /// How long the inventory action stays valid.
    pub expiry: String,
    /// Applied locally to each returned path; non-matching paths are dropped.
    pub post_filter: Option<Regex>,
}

/// Command line overrides for the descriptor's criteria.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub target: Option<String>,
    pub expiry: Option<String>,
    pub path: Option<String>,
}

impl ResolveCriteria {
    pub fn with_overrides(mut self, overrides: &Overrides) -> Self {
        if let Some(target) = &overrides.target {
            info!(%target, "overriding resolver target");
            self.target = Some(target.clone());
        }
        if let Some(expiry) = &overrides.expiry {
            info!(%expiry, "overriding action expiry");
            self.expiry = expiry.clone();
        }
        if let Some(path) = &overrides.path {
            info!(%path, "overriding search path");
            self.path = Some(path.clone());
        }
        self
    }

    /// Arguments for `mig file`.
    pub fn mig_arguments(&self) -> Vec<String> {
        let mut args = vec!["file".to_string()];
        let mut push = |flag: &str, value: Option<&String>| {
            if let Some(value) = value {
                args.push(flag.to_string());
                args.push(value.clone());
            }
        };
        push("-t", self.target.as_ref());
        push("-e", Some(&self.expiry).filter(|e| !e.is_empty()));
        push("-name", Some(&self.filename).filter(|f| !f.is_empty()));
        push("-maxdepth", self.depth.as_ref());
        push("-path", self.path.as_ref());
        push("-content", self.content.as_ref());
        args
    }
}

/// Turns resolver output into candidates.
///
/// Each non-empty line must carry at least a host and a path. Lines whose
/// path does not match `post_filter` are dropped.
pub fn parse_candidates(
    output: &str,
    post_filter: Option<&Regex>,
) -> Result<Vec<Candidate>, ResolveError> {
    let mut candidates = Vec::new();
    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() < 2 {
            return Err(ResolveError::Malformed(line.to_string()));
        }
        if let Some(filter) = post_filter {
            if !filter.is_match(fields[1]) {
                debug!(host = fields[0], path = fields[1], "dropped by post filter");
                continue;
            }
        }
        candidates.push(Candidate::new(fields[0], fields[1]));
    }
    Ok(candidates)
}

#[async_trait]
pub trait CandidateResolver: Send + Sync {
    async fn resolve(&self, criteria: &ResolveCriteria) -> Result<Vec<Candidate>, ResolveError>;
}

/// Resolves candidates with the `mig` command line client.
pub struct MigResolver {
    binary: String,
}

impl MigResolver {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl CandidateResolver for MigResolver {
    async fn resolve(&self, criteria: &ResolveCriteria) -> Result<Vec<Candidate>, ResolveError> {
        let args = criteria.mig_arguments();
        info!(binary = %self.binary, ?args, "executing inventory query");

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("failed to execute {}", self.binary))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(stderr = %stderr.trim(), "inventory query failed");
            return Err(ResolveError::Exit(output.status.to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let candidates = parse_candidates(&stdout, criteria.post_filter.as_ref())?;
        info!(count = candidates.len(), "candidates returned by inventory");
        Ok(candidates)
    }
}
