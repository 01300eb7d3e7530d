//! HTTP-backed implementations of the discovery and fetch seams
//!
//! Thin glue between the rate-limited [`HttpClient`] and the
//! [`ProductPageParser`]: one type per collaborator trait so the orchestrators
//! stay free of network concerns.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::domain::services::{ListingPageSource, ProductPageFetcher, SitemapSource};
use crate::domain::product::ProductRecord;
use crate::infrastructure::http_client::HttpClient;
use crate::infrastructure::product_parser::ProductPageParser;

/// 사이트맵 문서에서 상품 URL을 수집
pub struct HttpSitemapSource {
    http: Arc<HttpClient>,
    parser: Arc<ProductPageParser>,
    sitemap_url: String,
}

impl HttpSitemapSource {
    pub fn new(http: Arc<HttpClient>, parser: Arc<ProductPageParser>, sitemap_url: &str) -> Self {
        Self {
            http,
            parser,
            sitemap_url: sitemap_url.to_string(),
        }
    }
}

#[async_trait]
impl SitemapSource for HttpSitemapSource {
    async fn fetch_item_urls(&self) -> Vec<String> {
        match self.http.get_text(&self.sitemap_url).await {
            Ok(xml) => self.parser.extract_sitemap_item_urls(&xml),
            Err(err) => {
                // 사이트맵 실패는 치명적이지 않다; 다른 소스가 계속 돈다
                warn!("Sitemap fetch failed ({}): {}", self.sitemap_url, err);
                Vec::new()
            }
        }
    }
}

/// 카테고리 목록 페이지(list.php)에서 상품 링크를 수집
pub struct HttpListingSource {
    http: Arc<HttpClient>,
    parser: Arc<ProductPageParser>,
    listing_base_url: String,
    token: CancellationToken,
}

impl HttpListingSource {
    pub fn new(
        http: Arc<HttpClient>,
        parser: Arc<ProductPageParser>,
        listing_base_url: &str,
        token: CancellationToken,
    ) -> Self {
        Self {
            http,
            parser,
            listing_base_url: listing_base_url.to_string(),
            token,
        }
    }

    fn page_url(&self, category_id: &str, page: u32) -> String {
        format!("{}?ca_id={}&page={}", self.listing_base_url, category_id, page)
    }
}

#[async_trait]
impl ListingPageSource for HttpListingSource {
    async fn fetch_listing_page(&self, category_id: &str, page: u32) -> Result<Vec<String>> {
        let url = self.page_url(category_id, page);
        let body = self
            .http
            .get_text_with_cancellation(&url, &self.token)
            .await
            .with_context(|| format!("Listing page fetch failed: {url}"))?;
        Ok(self.parser.extract_listing_links(&body))
    }
}

/// 상품 상세 페이지를 가져와 레코드로 파싱
pub struct HttpProductFetcher {
    http: Arc<HttpClient>,
    parser: Arc<ProductPageParser>,
    token: CancellationToken,
}

impl HttpProductFetcher {
    pub fn new(
        http: Arc<HttpClient>,
        parser: Arc<ProductPageParser>,
        token: CancellationToken,
    ) -> Self {
        Self {
            http,
            parser,
            token,
        }
    }
}

#[async_trait]
impl ProductPageFetcher for HttpProductFetcher {
    async fn fetch_product(&self, url: &str) -> Result<ProductRecord> {
        let body = self
            .http
            .get_text_with_cancellation(url, &self.token)
            .await
            .with_context(|| format!("Item page fetch failed: {url}"))?;
        Ok(self.parser.parse_product(&body, url))
    }
}
