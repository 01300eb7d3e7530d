//! Infrastructure layer for HTTP fetching, parsing, persistence, and logging
//!
//! External-facing implementations of the domain's collaborator traits plus
//! process-level concerns (configuration, logging).

pub mod catalog_source;
pub mod config;
pub mod http_client;
pub mod image_mirror;
pub mod logging;
pub mod product_parser;
pub mod product_repository;

pub use catalog_source::{HttpListingSource, HttpProductFetcher, HttpSitemapSource};
pub use config::{DiscoverySelection, HarvestConfig};
pub use http_client::{HttpClient, HttpClientConfig};
pub use image_mirror::HttpImageMirror;
pub use product_parser::{ProductPageParser, ProductParserConfig};
pub use product_repository::PgProductRepository;
