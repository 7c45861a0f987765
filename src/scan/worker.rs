use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::descriptor::SearchSpec;
use crate::inspector::{Inspection, RemoteInspector};
use crate::model::{Candidate, ScanFailure, ScanOutcome};

/// Produces exactly one outcome per candidate.
///
/// Implementations never return errors: a failed inspection is reported
/// through [`ScanOutcome::failure`].
#[async_trait]
pub trait ScanWorker: Send + Sync {
    async fn scan(&self, candidate: &Candidate) -> ScanOutcome;
}

/// Inspects a candidate on its host and normalizes the matched line.
pub struct RemoteScanWorker {
    inspector: Arc<dyn RemoteInspector>,
    search: SearchSpec,
    timeout: Option<Duration>,
}

impl RemoteScanWorker {
    pub fn new(inspector: Arc<dyn RemoteInspector>, search: SearchSpec) -> Self {
        Self {
            inspector,
            search,
            timeout: None,
        }
    }

    /// Bounds each inspection; an expired inspection yields [`ScanFailure::Timeout`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl ScanWorker for RemoteScanWorker {
    async fn scan(&self, candidate: &Candidate) -> ScanOutcome {
        let inspection = self
            .inspector
            .inspect(&candidate.host, &candidate.path, &self.search.pattern);

        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, inspection).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(host = %candidate.host, ?limit, "remote search timed out");
                    return ScanOutcome::failed(candidate, ScanFailure::timeout(limit));
                }
            },
            None => inspection.await,
        };

        match result {
            Ok(Inspection::Matched(line)) => match self.search.transform.apply(&line) {
                Ok(value) => {
                    debug!(host = %candidate.host, %value, "matched");
                    ScanOutcome::value(candidate, value)
                }
                Err(e) => ScanOutcome::failed(candidate, ScanFailure::Transform(e.to_string())),
            },
            Ok(Inspection::NoMatch) => {
                debug!(host = %candidate.host, "pattern not found");
                ScanOutcome::empty(candidate)
            }
            Ok(Inspection::Exited(code)) => {
                warn!(host = %candidate.host, code, "remote search exited unexpectedly");
                ScanOutcome::failed(candidate, ScanFailure::ExitStatus(code))
            }
            Err(e) => {
                let message = format!("{:#}", anyhow::Error::new(e));
                warn!(host = %candidate.host, error = %message, "remote channel failed");
                ScanOutcome::failed(candidate, ScanFailure::Transport(message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspector::InspectError;
    use crate::transform::TransformRegistry;

    struct Fixed(fn() -> Result<Inspection, InspectError>);

    #[async_trait]
    impl RemoteInspector for Fixed {
        async fn inspect(&self, _: &str, _: &str, _: &str) -> Result<Inspection, InspectError> {
            (self.0)()
        }
    }

    struct Hang;

    #[async_trait]
    impl RemoteInspector for Hang {
        async fn inspect(&self, _: &str, _: &str, _: &str) -> Result<Inspection, InspectError> {
            std::future::pending().await
        }
    }

    fn worker(inspector: impl RemoteInspector + 'static) -> RemoteScanWorker {
        let search = SearchSpec {
            pattern: "^VERSION = ".into(),
            transform: TransformRegistry::builtin().get("django-python").unwrap(),
        };
        RemoteScanWorker::new(Arc::new(inspector), search)
    }

    fn candidate() -> Candidate {
        Candidate::new("web1", "/srv/django/__init__.py")
    }

    #[tokio::test]
    async fn test_match_is_transformed() {
        let w = worker(Fixed(|| Ok(Inspection::Matched("VERSION = (1, 8, 3, 'final', 0)".into()))));
        let outcome = w.scan(&candidate()).await;
        assert_eq!(outcome.value, "1.8.3");
        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn test_not_found_is_empty_success() {
        let w = worker(Fixed(|| Ok(Inspection::NoMatch)));
        let outcome = w.scan(&candidate()).await;
        assert!(outcome.is_ok());
        assert!(outcome.value.is_empty());
    }

    #[tokio::test]
    async fn test_unexpected_exit() {
        let w = worker(Fixed(|| Ok(Inspection::Exited(2))));
        let outcome = w.scan(&candidate()).await;
        assert_eq!(outcome.failure, Some(ScanFailure::ExitStatus(2)));
    }

    #[tokio::test]
    async fn test_transport_failure() {
        let w = worker(Fixed(|| Err(InspectError::Signal)));
        let outcome = w.scan(&candidate()).await;
        assert!(matches!(outcome.failure, Some(ScanFailure::Transport(_))));
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_cause() {
        let w = worker(Fixed(|| {
            Err(InspectError::Spawn {
                binary: "ssh".into(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            })
        }));
        let outcome = w.scan(&candidate()).await;
        assert_eq!(
            outcome.failure,
            Some(ScanFailure::Transport("failed to start ssh: no such file".into()))
        );
    }

    #[tokio::test]
    async fn test_transform_failure() {
        let w = worker(Fixed(|| Ok(Inspection::Matched("VERSION = '1.8'".into()))));
        let outcome = w.scan(&candidate()).await;
        assert!(matches!(outcome.failure, Some(ScanFailure::Transform(_))));
    }

    #[tokio::test]
    async fn test_timeout() {
        let w = worker(Hang).with_timeout(Duration::from_millis(20));
        let outcome = w.scan(&candidate()).await;
        assert_eq!(outcome.failure, Some(ScanFailure::Timeout { millis: 20 }));
    }
}
