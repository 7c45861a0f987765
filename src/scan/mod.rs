//! Fleet scanning.
//!
//! This module runs one descriptor's remote search across every candidate:
//!
//! - [`RemoteScanWorker`] inspects a single candidate and normalizes the match
//! - [`Dispatcher`] runs workers under a concurrency ceiling and aggregates
//!   exactly one [`ScanResult`](crate::model::ScanResult) per candidate
//! - [`PathTrim`] post-processes result paths
//!
//! # Example
//!
//! ```no_run
//! use fleetcheck::inspector::SshInspector;
//! use fleetcheck::model::Candidate;
//! use fleetcheck::scan::{Dispatcher, PathTrim, RemoteScanWorker};
//! use fleetcheck::descriptor::SearchSpec;
//! use fleetcheck::transform::TransformRegistry;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let search = SearchSpec {
//!         pattern: "^VERSION = ".to_string(),
//!         transform: TransformRegistry::builtin().get("django-python")?,
//!     };
//!     let inspector = Arc::new(SshInspector::new("ssh", vec![]));
//!     let worker = Arc::new(RemoteScanWorker::new(inspector, search));
//!
//!     let candidates = vec![Candidate::new("web1", "/srv/app/django/__init__.py")];
//!     let results = Dispatcher::new(10)
//!         .with_trim(PathTrim::new(2))
//!         .run(candidates, worker)
//!         .await?;
//!
//!     for result in results {
//!         println!("{}", result.to_line());
//!     }
//!     Ok(())
//! }
//! ```

mod dispatcher;
mod postprocess;
mod worker;

pub use dispatcher::{DispatchError, Dispatcher};
pub use postprocess::{trim_path, PathTrim, TrimError};
pub use worker::{RemoteScanWorker, ScanWorker};
