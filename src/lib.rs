//! Replmoa catalog harvester
//!
//! Crawls the Replmoa shop catalog into the modern_shop Postgres database:
//! URL discovery over two independent producers (sitemap, category walk), a
//! bounded-concurrency fetch/transform/persist pipeline with cooperative
//! cancellation, and breadcrumb normalization into a parent-linked category
//! tree.

pub mod crawling;
pub mod domain;
pub mod infrastructure;

pub use crawling::{DedupLedger, HarvestPipeline, HarvestSummary, UrlDiscovery};
pub use infrastructure::HarvestConfig;
