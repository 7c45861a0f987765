//! Remote content inspection.
//!
//! Runs a pattern search against one file on one host and reports the first
//! matching line. The stock implementation runs `egrep` over `ssh`.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

/// Result of a remote search that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inspection {
    /// The pattern matched; carries the first matching line without its newline.
    Matched(String),
    /// The search ran but the pattern was not found.
    NoMatch,
    /// The remote command exited with some other status.
    Exited(i32),
}

/// The remote channel itself failed.
#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    #[error("failed to start {binary}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read remote output")]
    Read(#[source] std::io::Error),

    #[error("remote command terminated by signal")]
    Signal,
}

#[async_trait]
pub trait RemoteInspector: Send + Sync {
    async fn inspect(&self, host: &str, path: &str, pattern: &str)
        -> Result<Inspection, InspectError>;
}

/// Quotes `s` for a POSIX shell on the remote side.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Runs `ssh <args> <host> egrep '<pattern>' '<path>'`.
pub struct SshInspector {
    binary: String,
    args: Vec<String>,
}

impl SshInspector {
    pub fn new(binary: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            binary: binary.into(),
            args,
        }
    }

    fn command(&self, host: &str, path: &str, pattern: &str) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(&self.args)
            .arg(host)
            .arg("egrep")
            .arg(shell_quote(pattern))
            .arg(shell_quote(path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl RemoteInspector for SshInspector {
    async fn inspect(
        &self,
        host: &str,
        path: &str,
        pattern: &str,
    ) -> Result<Inspection, InspectError> {
        debug!(host, path, pattern, "starting remote search");

        let mut child = self
            .command(host, path, pattern)
            .spawn()
            .map_err(|source| InspectError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        let mut line = String::new();
        if let Some(stdout) = child.stdout.take() {
            let mut reader = BufReader::new(stdout);
            reader.read_line(&mut line).await.map_err(InspectError::Read)?;
            // Discard further matches so the remote side never blocks on a full pipe.
            tokio::io::copy(&mut reader, &mut tokio::io::sink())
                .await
                .map_err(InspectError::Read)?;
        }

        let status = child.wait().await.map_err(InspectError::Read)?;
        match status.code() {
            Some(0) => Ok(Inspection::Matched(
                line.trim_end_matches(['\r', '\n']).to_string(),
            )),
            Some(1) => Ok(Inspection::NoMatch),
            Some(code) => Ok(Inspection::Exited(code)),
            None => Err(InspectError::Signal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("^VERSION = "), "'^VERSION = '");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_command_line() {
        let inspector = SshInspector::new("ssh", vec!["-o".into(), "BatchMode=yes".into()]);
        let cmd = inspector.command("web1", "/srv/app/x.py", "^VERSION");
        let args: Vec<_> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec!["-o", "BatchMode=yes", "web1", "egrep", "'^VERSION'", "'/srv/app/x.py'"]
        );
    }

    // `sh -c` stands in for ssh: the host argument becomes $0 and the rest
    // of the command line is ignored by the script.
    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_status_mapping() {
        let matched = SshInspector::new("sh", vec!["-c".into(), "echo 'VERSION = (1, 8, 3,'; echo more".into()]);
        assert_eq!(
            matched.inspect("host", "/p", "x").await.unwrap(),
            Inspection::Matched("VERSION = (1, 8, 3,".into())
        );

        let not_found = SshInspector::new("sh", vec!["-c".into(), "exit 1".into()]);
        assert_eq!(not_found.inspect("host", "/p", "x").await.unwrap(), Inspection::NoMatch);

        let broken = SshInspector::new("sh", vec!["-c".into(), "exit 2".into()]);
        assert_eq!(broken.inspect("host", "/p", "x").await.unwrap(), Inspection::Exited(2));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let inspector = SshInspector::new("/nonexistent/fleetcheck-ssh", vec![]);
        let err = inspector.inspect("host", "/p", "x").await.unwrap_err();
        assert!(matches!(err, InspectError::Spawn { .. }));
    }
}
