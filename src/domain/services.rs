//! Collaborator seams for discovery, fetching, mirroring, and persistence
//!
//! The discovery and pipeline orchestrators only talk to these traits, so
//! tests can substitute simulated sources without touching the network or a
//! database.

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::category::CategoryNode;
use crate::domain::product::{ItemId, ProductRecord};

/// 사이트맵에서 상품 상세 URL 후보를 한 번에 수집
#[async_trait]
pub trait SitemapSource: Send + Sync {
    /// Returns raw (not yet normalized) item detail URLs. A failed fetch is
    /// reported by the implementation and surfaces here as an empty list.
    async fn fetch_item_urls(&self) -> Vec<String>;
}

/// 카테고리 목록 페이지에서 상품 링크를 수집
#[async_trait]
pub trait ListingPageSource: Send + Sync {
    /// Fetch one listing page of a top-level category and return the item
    /// detail links found on it. An empty list means the page has no items.
    async fn fetch_listing_page(&self, category_id: &str, page: u32) -> Result<Vec<String>>;
}

/// 상품 상세 페이지를 가져와 파싱
#[async_trait]
pub trait ProductPageFetcher: Send + Sync {
    /// Fetch and parse one item detail page. Parse results are best-effort;
    /// an `Err` here means the page could not be fetched or yielded no
    /// usable record at all.
    async fn fetch_product(&self, url: &str) -> Result<ProductRecord>;
}

/// 이미지 미러링 - 실패 시 원본 URL을 그대로 반환
#[async_trait]
pub trait ImageMirror: Send + Sync {
    /// Mirror one image and return the mirrored URL, or the original URL
    /// unchanged on any failure. Must enforce its own timeout.
    async fn mirror(&self, url: &str) -> String;
}

/// 영속 저장소 - 카테고리 트리와 상품의 멱등 upsert
#[async_trait]
pub trait ProductSink: Send + Sync {
    /// Item ids already persisted by earlier runs, parsed from stored
    /// source URLs. Used to seed the dedup ledger.
    async fn load_known_item_ids(&self) -> Result<Vec<ItemId>>;

    /// Walk the candidate nodes top-down, inserting missing ones and
    /// backfilling empty parent links, and return the leaf category id.
    async fn upsert_category_path(&self, path: &[CategoryNode]) -> Result<i64>;

    /// Insert the record unless `(name, category_id)` already exists.
    /// Returns `true` when a new row was written, `false` for a duplicate
    /// (which is a success, not an error).
    async fn save_product_if_new(&self, record: &ProductRecord, category_id: i64) -> Result<bool>;
}
