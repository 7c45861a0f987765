//! Signing key warm-up.
//!
//! The resolver signs its queries with a PGP key. If that key's passphrase
//! is not cached when the resolver starts, the resolver blocks on a pinentry
//! prompt that may never be shown. Signing a throwaway message first makes
//! gpg-agent prompt once, in the foreground, and cache the passphrase.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("failed to start {binary}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not unlock signing key {key_id}: gpg exited with {status}")]
    Unlock { key_id: String, status: String },
}

#[async_trait]
pub trait KeyCache: Send + Sync {
    async fn ensure_cached(&self, key_id: &str, gpg_home: Option<&Path>) -> Result<(), KeyError>;
}

pub struct GpgAgentKeyCache {
    binary: PathBuf,
}

impl GpgAgentKeyCache {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn arguments(key_id: &str, gpg_home: Option<&Path>) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(home) = gpg_home {
            args.push("--homedir".to_string());
            args.push(home.display().to_string());
        }
        args.extend([
            "--local-user".to_string(),
            key_id.to_uppercase(),
            "--detach-sign".to_string(),
            "--output".to_string(),
            "-".to_string(),
        ]);
        args
    }
}

impl Default for GpgAgentKeyCache {
    fn default() -> Self {
        Self::new("gpg")
    }
}

#[async_trait]
impl KeyCache for GpgAgentKeyCache {
    async fn ensure_cached(&self, key_id: &str, gpg_home: Option<&Path>) -> Result<(), KeyError> {
        info!(key_id, "caching signing key passphrase");
        let status = Command::new(&self.binary)
            .args(Self::arguments(key_id, gpg_home))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
            .await
            .map_err(|source| KeyError::Spawn {
                binary: self.binary.display().to_string(),
                source,
            })?;

        if !status.success() {
            return Err(KeyError::Unlock {
                key_id: key_id.to_string(),
                status: status.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arguments() {
        assert_eq!(
            GpgAgentKeyCache::arguments("a3d652173b763e8f", Some(Path::new("/home/ops/.mig"))),
            vec![
                "--homedir",
                "/home/ops/.mig",
                "--local-user",
                "A3D652173B763E8F",
                "--detach-sign",
                "--output",
                "-",
            ]
        );
        assert_eq!(GpgAgentKeyCache::arguments("ABC", None)[0], "--local-user");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_unlock() {
        let cache = GpgAgentKeyCache::new("false");
        let err = cache.ensure_cached("ABC", None).await.unwrap_err();
        assert!(matches!(err, KeyError::Unlock { .. }));
    }
}
