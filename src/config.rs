//! Configuration file handling.
//!
//! This module provides loading and saving of fleetcheck configuration
//! from a TOML file.
//!
//! # Configuration Location
//!
//! The configuration file is stored at:
//! - Linux: `~/.config/fleetcheck/config.toml`
//! - macOS: `~/Library/Application Support/fleetcheck/config.toml`
//! - Windows: `%APPDATA%\fleetcheck\config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! descriptors = "/etc/fleetcheck/descriptors"
//!
//! [resolver]
//! binary = "/usr/local/bin/mig"
//! key_id = "E60892BB9BD89A69F759A1A0A3D652173B763E8F"
//!
//! [ssh]
//! binary = "/usr/bin/ssh"
//! args = ["-o", "BatchMode=yes", "-o", "ConnectTimeout=10"]
//! workers = 20
//! timeout_secs = 60
//!
//! [feed]
//! enabled = true
//! cache_ttl_hours = 72
//!
//! [classify]
//! asset_file = "/var/lib/fleetcheck/assets.txt"
//! source_name = "wfs"
//! publish_url = "https://mozdef.example.com:8443/events"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::classify::NVD_API_URL;
use crate::platform;

/// Application configuration.
///
/// Values missing from the file take their defaults; command line flags
/// override both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding `*.json` check descriptors.
    pub descriptors: PathBuf,

    pub resolver: ResolverConfig,

    pub ssh: SshConfig,

    pub feed: FeedConfig,

    pub classify: ClassifyConfig,
}

/// How candidates are resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// The `mig` client binary.
    pub binary: String,

    /// Fingerprint of the key the resolver signs with. When set, the key's
    /// passphrase is cached in gpg-agent before the resolver runs.
    pub key_id: Option<String>,

    /// GnuPG home holding that key. Default: gpg's own default.
    pub gpg_home: Option<PathBuf>,
}

/// Remote inspection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    pub binary: String,

    /// Extra arguments placed before the host name.
    pub args: Vec<String>,

    /// Maximum number of concurrent remote searches.
    ///
    /// Default: 10
    pub workers: usize,

    /// Per-host deadline in seconds; 0 disables it.
    ///
    /// Default: 60
    pub timeout_secs: u64,
}

/// CVE feed settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Score drafts from the feed instead of impact labels alone.
    ///
    /// Default: false
    pub enabled: bool,

    pub url: String,

    pub api_key: Option<String>,

    /// How long feed records are kept on disk, in hours; 0 disables the
    /// disk cache.
    ///
    /// Default: 24 hours
    pub cache_ttl_hours: u64,
}

/// Classification and publishing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifyConfig {
    pub asset_file: PathBuf,

    /// Reported as the event source.
    pub source_name: String,

    /// Event intake endpoint. Without one, events are printed as JSON lines.
    pub publish_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            descriptors: platform::descriptors_dir(),
            resolver: ResolverConfig::default(),
            ssh: SshConfig::default(),
            feed: FeedConfig::default(),
            classify: ClassifyConfig::default(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            binary: "mig".to_string(),
            key_id: None,
            gpg_home: None,
        }
    }
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            binary: "ssh".to_string(),
            args: vec!["-o".to_string(), "BatchMode=yes".to_string()],
            workers: 10,
            timeout_secs: 60,
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: NVD_API_URL.to_string(),
            api_key: None,
            cache_ttl_hours: 24,
        }
    }
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            asset_file: platform::asset_file(),
            source_name: "fleetcheck".to_string(),
            publish_url: None,
        }
    }
}

impl Config {
    /// Loads configuration from `path`, or from the default location.
    ///
    /// A missing file at the default location yields the default
    /// configuration; a missing file at an explicit path is an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::config_path(), false),
        };

        if !explicit && !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("failed to parse config {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Saves the configuration to the default config file location.
    ///
    /// Creates the parent directory if it doesn't exist.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    /// Returns the path to the configuration file.
    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }

    /// Generates a string containing the default configuration.
    pub fn generate_default_config() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.resolver.binary, "mig");
        assert_eq!(config.ssh.workers, 10);
        assert_eq!(config.ssh.timeout_secs, 60);
        assert_eq!(config.ssh.args, vec!["-o", "BatchMode=yes"]);
        assert!(!config.feed.enabled);
        assert_eq!(config.feed.url, NVD_API_URL);
        assert_eq!(config.classify.source_name, "fleetcheck");
        assert!(config.classify.publish_url.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            descriptors = "/etc/fleetcheck/descriptors"

            [ssh]
            workers = 32

            [feed]
            enabled = true
            "#,
        )
        .unwrap();

        assert_eq!(config.descriptors, PathBuf::from("/etc/fleetcheck/descriptors"));
        assert_eq!(config.ssh.workers, 32);
        assert_eq!(config.ssh.binary, "ssh");
        assert!(config.feed.enabled);
        assert_eq!(config.feed.cache_ttl_hours, 24);
    }

    #[test]
    fn test_default_config_round_trips() {
        let text = Config::generate_default_config();
        assert_eq!(Config::from_toml(&text).unwrap(), Config::default());
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[resolver]\nbinary = \"/opt/mig/bin/mig\"\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.resolver.binary, "/opt/mig/bin/mig");
    }
}
