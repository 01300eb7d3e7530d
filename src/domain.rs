//! Domain module - core data model and business rules
//!
//! Modern Rust module organization (Rust 2018+ style):
//! - Each module is its own file in the domain/ directory
//! - Public exports are defined here for convenience

pub mod category;
pub mod product;
pub mod services;

pub use category::{normalize_category, slugify, CategoryNode};
pub use product::{DiscoveredUrl, DiscoverySource, ItemId, ProductRecord};
