use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A (host, file path) pair to be inspected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    pub host: String,
    pub path: String,
}

impl Candidate {
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.path)
    }
}

/// Why a remote inspection did not yield a value.
///
/// A "pattern not found" result is not a failure; it is reported as an
/// outcome with an empty value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ScanFailure {
    /// The remote command exited with a status other than 0 or 1.
    ExitStatus(i32),
    /// The remote channel could not be established or broke down.
    Transport(String),
    /// The matched line did not have the shape the output transform expects.
    Transform(String),
    /// The worker did not finish before its deadline.
    Timeout { millis: u64 },
    /// The worker task ended without reporting (panic).
    Aborted(String),
}

impl ScanFailure {
    pub fn timeout(after: Duration) -> Self {
        ScanFailure::Timeout {
            millis: after.as_millis() as u64,
        }
    }
}

impl fmt::Display for ScanFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanFailure::ExitStatus(code) => write!(f, "unexpected exit status {}", code),
            ScanFailure::Transport(msg) => write!(f, "transport failure: {}", msg),
            ScanFailure::Transform(msg) => write!(f, "transform failed: {}", msg),
            ScanFailure::Timeout { millis } => write!(f, "timed out after {}ms", millis),
            ScanFailure::Aborted(msg) => write!(f, "worker aborted: {}", msg),
        }
    }
}

/// What a single worker produced for one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub host: String,
    pub path: String,
    /// Normalized value; empty when the pattern was not found.
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<ScanFailure>,
}

impl ScanOutcome {
    pub fn value(candidate: &Candidate, value: impl Into<String>) -> Self {
        Self {
            host: candidate.host.clone(),
            path: candidate.path.clone(),
            value: value.into(),
            failure: None,
        }
    }

    pub fn empty(candidate: &Candidate) -> Self {
        Self::value(candidate, String::new())
    }

    pub fn failed(candidate: &Candidate, failure: ScanFailure) -> Self {
        Self {
            host: candidate.host.clone(),
            path: candidate.path.clone(),
            value: String::new(),
            failure: Some(failure),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.failure.is_none()
    }
}

/// An aggregated outcome with its optionally trimmed path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    #[serde(flatten)]
    pub outcome: ScanOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,
}

impl ScanResult {
    pub fn new(outcome: ScanOutcome, result_path: Option<String>) -> Self {
        Self {
            outcome,
            result_path,
        }
    }

    /// Formats the result as `<host> <path> <ok|error> <trimmed|-> <value|error>`.
    pub fn to_line(&self) -> String {
        let status = if self.outcome.is_ok() { "ok" } else { "error" };
        let trimmed = self.result_path.as_deref().unwrap_or("-");
        let detail = match &self.outcome.failure {
            Some(failure) => failure.to_string(),
            None if self.outcome.value.is_empty() => "-".to_string(),
            None => self.outcome.value.clone(),
        };
        format!(
            "{} {} {} {} {}",
            self.outcome.host, self.outcome.path, status, trimmed, detail
        )
    }
}

/// All results of one descriptor run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub check: String,
    pub scan_time: DateTime<Utc>,
    pub results: Vec<ScanResult>,
}

impl ScanReport {
    pub fn new(check: impl Into<String>, results: Vec<ScanResult>) -> Self {
        Self {
            check: check.into(),
            scan_time: Utc::now(),
            results,
        }
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| !r.outcome.is_ok()).count()
    }
}
