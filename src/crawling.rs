//! Crawling orchestration - discovery, dedup ledger, and the harvest pipeline

pub mod discovery;
pub mod ledger;
pub mod pipeline;

pub use discovery::{DiscoveryConfig, UrlDiscovery};
pub use ledger::DedupLedger;
pub use pipeline::{HarvestPipeline, HarvestSummary, PipelineConfig};
