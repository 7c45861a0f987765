pub mod asset;
pub mod cache;
pub mod classify;
pub mod config;
pub mod descriptor;
pub mod event;
pub mod inspector;
pub mod keys;
pub mod model;
pub mod output;
pub mod platform;
pub mod publish;
pub mod resolver;
pub mod scan;
pub mod transform;

pub use cache::Cache;
pub use config::Config;
pub use descriptor::Descriptor;
pub use model::{
    Candidate, ScanFailure, ScanOutcome, ScanReport, ScanResult, Status, VulnEvent,
    VulnerabilityDraft,
};
pub use scan::Dispatcher;
