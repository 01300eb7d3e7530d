//! Harvested product data model
//!
//! Explicit record types for the data flowing between pipeline stages:
//! discovered URLs, the stable item identifier embedded in them, and the
//! fully parsed product record handed to the persistence sink.

use serde::{Deserialize, Serialize};
use url::Url;

/// Which discovery strategy produced a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscoverySource {
    Sitemap,
    CategoryWalk,
}

/// A normalized absolute URL pointing at one item detail page.
///
/// Identity is the normalized URL string; instances are never mutated after
/// discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredUrl {
    pub url: String,
    pub source: DiscoverySource,
}

impl DiscoveredUrl {
    pub fn new(raw: &str, source: DiscoverySource) -> Option<Self> {
        normalize_item_url(raw).map(|url| Self { url, source })
    }

    /// The stable item identifier embedded in this URL, if present.
    pub fn item_id(&self) -> Option<ItemId> {
        extract_item_id(&self.url)
    }
}

/// Stable numeric key for one logical item, parsed from the `it_id` query
/// parameter. Two differently spelled URLs with the same `ItemId` refer to
/// the same item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId(pub u64);

/// Normalize an item-detail URL: parse, drop the fragment, trim the trailing
/// slash from the path. Returns `None` for unparsable input.
pub fn normalize_item_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    url.set_fragment(None);

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }
    Some(url.to_string())
}

/// `it_id` 쿼리 파라미터에서 숫자 상품 키를 추출
pub fn extract_item_id(url: &str) -> Option<ItemId> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == "it_id")
        .and_then(|(_, value)| value.trim().parse::<u64>().ok())
        .map(ItemId)
}

/// One selectable option value, e.g. `블랙 (+ 5,000원)` -> value `블랙`,
/// adjustment `5000`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductOptionValue {
    pub value: String,
    pub price_adjustment: i64,
}

/// A named option group (사이즈, 컬러, ...) with its values.
/// Groups are deduplicated by name during extraction; first occurrence wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductOptionGroup {
    pub name: String,
    pub values: Vec<ProductOptionValue>,
}

/// The harvested product record, immutable once built.
///
/// Persistence identity is `(name, leaf category)` rather than the `ItemId`:
/// the upstream catalog exposes the same logical item at different URLs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub name: String,
    pub raw_category: String,
    /// 판매가격 (won)
    pub price: i64,
    /// 시중가격/백화점가 (won); 0 means unknown
    pub department_price: i64,
    pub image_url: String,
    /// Gallery image references in document order, deduplicated.
    pub gallery_images: Vec<String>,
    pub source_url: String,
    pub options: Vec<ProductOptionGroup>,
}

impl ProductRecord {
    /// Description column payload: source URL on the first line, gallery
    /// references joined by `;` on the second. The ledger seed parses the
    /// first line back out of this.
    pub fn description(&self) -> String {
        format!("{}\n{}", self.source_url, self.gallery_images.join(";"))
            .trim()
            .to_string()
    }
}
