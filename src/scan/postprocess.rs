use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not enough elements in path {path:?} to trim {count}")]
pub struct TrimError {
    pub path: String,
    pub count: usize,
}

/// Drops a fixed number of trailing segments from a result path.
///
/// A zero count leaves paths untouched and produces no result path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathTrim(usize);

impl PathTrim {
    pub fn new(count: usize) -> Self {
        Self(count)
    }

    pub fn count(&self) -> usize {
        self.0
    }

    pub fn is_enabled(&self) -> bool {
        self.0 > 0
    }

    /// Returns the trimmed path, or `None` when trimming is disabled.
    pub fn apply(&self, path: &str) -> Result<Option<String>, TrimError> {
        if !self.is_enabled() {
            return Ok(None);
        }
        trim_path(self.0, path).map(Some)
    }
}

impl fmt::Display for PathTrim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trim {}", self.0)
    }
}

/// Removes the last `count` segments of `path`.
///
/// At least one segment must remain, so `count` has to be smaller than the
/// number of non-empty segments.
pub fn trim_path(count: usize, path: &str) -> Result<String, TrimError> {
    let parts: Vec<&str> = path.strip_suffix('/').unwrap_or(path).split('/').collect();
    let segments = parts.iter().filter(|p| !p.is_empty()).count();
    if count >= segments {
        return Err(TrimError {
            path: path.to_string(),
            count,
        });
    }
    Ok(parts[..parts.len() - count].join("/"))
}
