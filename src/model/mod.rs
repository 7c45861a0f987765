//! Core data types for scan candidates, scan results and vulnerability records.
//!
//! This module contains the fundamental types used throughout fleetcheck:
//!
//! - [`Candidate`] - A (host, file path) pair returned by the resolver
//! - [`ScanOutcome`] - What a single remote inspection produced
//! - [`ScanFailure`] - Why a remote inspection did not produce a value
//! - [`ScanResult`] - An outcome plus its post-processed path
//! - [`VulnerabilityDraft`] - A vulnerability record under classification
//! - [`VulnEvent`] - The envelope handed to the publisher
//!
//! # Example
//!
//! ```
//! use fleetcheck::{Candidate, ScanOutcome, ScanResult};
//!
//! let candidate = Candidate::new("web1.example.com", "/srv/app/django/__init__.py");
//! let outcome = ScanOutcome::value(&candidate, "1.8.3");
//! let result = ScanResult::new(outcome, None);
//!
//! assert_eq!(
//!     result.to_line(),
//!     "web1.example.com /srv/app/django/__init__.py ok - 1.8.3"
//! );
//! ```

mod scan;
mod vulnerability;

pub use scan::*;
pub use vulnerability::*;
