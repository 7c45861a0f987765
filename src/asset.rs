//! Asset-id registry.
//!
//! Downstream consumers track each (host, title, check) triple under a stable
//! numeric asset id. The registry is an append-only text file with one
//! `host title id check` record per line; unknown triples get the next id.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("asset id file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed asset id file {path} at line {line}: {content:?}")]
    Malformed {
        path: PathBuf,
        line: usize,
        content: String,
    },
}

pub struct AssetRegistry {
    path: PathBuf,
}

impl AssetRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io(&self, source: std::io::Error) -> AssetError {
        AssetError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Returns the id recorded for the triple, appending a new record with
    /// the next free id when there is none.
    pub fn resolve_or_create(&self, host: &str, title: &str, check: &str) -> Result<u64, AssetError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(self.io(e)),
        };

        let mut highest = 0;
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let malformed = || AssetError::Malformed {
                path: self.path.clone(),
                line: index + 1,
                content: line.to_string(),
            };
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != 4 {
                return Err(malformed());
            }
            let id: u64 = fields[2].parse().map_err(|_| malformed())?;
            if fields[0] == host && fields[1] == title && fields[3] == check {
                return Ok(id);
            }
            highest = highest.max(id);
        }

        let id = highest + 1;
        info!(id, host, title, check, "adding new asset");
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io(e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io(e))?;
        writeln!(file, "{} {} {} {}", host, title, id, check).map_err(|e| self.io(e))?;
        Ok(id)
    }
}
