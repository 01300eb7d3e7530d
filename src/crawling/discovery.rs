//! URL 발견 - 사이트맵과 카테고리 워크 두 프로듀서의 병합
//!
//! 독립적인 두 전략으로 상품 상세 URL 후보를 모은다:
//! - 사이트맵: 단일 요청으로 item.php 엔트리 전체를 수집 (실패해도 치명적이지 않음)
//! - 카테고리 워크: 대분류별 목록 페이지를 1페이지부터 라운드 단위로 동시
//!   요청하고, 페이지 번호 순서로 seen-set에 접어 넣는다
//!
//! 두 출력은 정규화 URL과 상품 키 기준으로 중복 제거된 뒤 섞여서(카테고리
//! 간 부하 분산) 파이프라인에 전달된다.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::product::{DiscoveredUrl, DiscoverySource};
use crate::domain::services::{ListingPageSource, SitemapSource};
use crate::infrastructure::config::DiscoverySelection;

/// 한 카테고리 워크를 끝내는 연속 무신규 페이지 수
const MAX_CONSECUTIVE_STALE_PAGES: u32 = 3;

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub sources: DiscoverySelection,
    /// 워크 대상 대분류: (ca_id, 이름)
    pub walk_categories: Vec<(String, String)>,
    /// 라운드당 동시 요청 페이지 수
    pub pages_per_round: usize,
    /// 카테고리당 페이지 상한 (폭주 방지)
    pub page_cap: u32,
}

/// URL 발견 오케스트레이터
pub struct UrlDiscovery {
    sitemap: Arc<dyn SitemapSource>,
    listing: Arc<dyn ListingPageSource>,
    config: DiscoveryConfig,
    token: CancellationToken,
}

impl UrlDiscovery {
    pub fn new(
        sitemap: Arc<dyn SitemapSource>,
        listing: Arc<dyn ListingPageSource>,
        config: DiscoveryConfig,
        token: CancellationToken,
    ) -> Self {
        Self {
            sitemap,
            listing,
            config,
            token,
        }
    }

    /// 두 프로듀서를 실행하고 병합/중복제거/셔플된 URL 목록을 반환
    pub async fn discover(&self) -> Vec<DiscoveredUrl> {
        let mut sitemap_urls = Vec::new();
        if self.config.sources != DiscoverySelection::WalkOnly {
            sitemap_urls = self.sitemap.fetch_item_urls().await;
            info!("Sitemap yielded {} item URL candidates", sitemap_urls.len());
        }

        let mut walk_urls = Vec::new();
        if self.config.sources != DiscoverySelection::SitemapOnly {
            for (category_id, name) in &self.config.walk_categories {
                if self.token.is_cancelled() {
                    break;
                }
                let urls = self.walk_category(category_id).await;
                info!(
                    "Category walk '{}' (ca_id={}) yielded {} links",
                    name,
                    category_id,
                    urls.len()
                );
                walk_urls.extend(urls);
            }
        }

        let mut merged = merge_discovered(sitemap_urls, walk_urls);
        fastrand::shuffle(&mut merged);
        info!("Discovery produced {} unique item URLs", merged.len());
        merged
    }

    /// 한 대분류의 목록 페이지를 걷는다.
    ///
    /// 라운드 안에서는 페이지를 동시에 가져오지만, 결과는 페이지 번호
    /// 오름차순으로 접어 넣어 "연속 무신규 3페이지" 규칙이 잘 정의되게 한다.
    /// 종료: 링크가 하나도 없는 페이지, 연속 무신규 3페이지, 페이지 상한.
    async fn walk_category(&self, category_id: &str) -> Vec<String> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut collected: Vec<String> = Vec::new();
        let mut next_page: u32 = 1;
        let mut stale_pages: u32 = 0;

        'rounds: while next_page <= self.config.page_cap {
            if self.token.is_cancelled() {
                debug!("🛑 Category walk cancelled before round at page {}", next_page);
                break;
            }

            // 라운드 크기 0은 1페이지짜리 라운드로 보정한다
            let round_size = self.config.pages_per_round.max(1) as u32;
            let round_end = (next_page + round_size - 1).min(self.config.page_cap);
            let pages: Vec<u32> = (next_page..=round_end).collect();

            let fetches = pages
                .iter()
                .map(|page| self.listing.fetch_listing_page(category_id, *page));
            let results = join_all(fetches).await;

            for (page, result) in pages.iter().zip(results) {
                if self.token.is_cancelled() {
                    break 'rounds;
                }
                match result {
                    Ok(links) if links.is_empty() => {
                        debug!("Category {} page {} is empty, stopping walk", category_id, page);
                        break 'rounds;
                    }
                    Ok(links) => {
                        let mut new_on_page = 0usize;
                        for link in links {
                            if seen.insert(link.clone()) {
                                collected.push(link);
                                new_on_page += 1;
                            }
                        }
                        if new_on_page == 0 {
                            stale_pages += 1;
                            if stale_pages >= MAX_CONSECUTIVE_STALE_PAGES {
                                debug!(
                                    "Category {} saw {} consecutive stale pages, stopping walk",
                                    category_id, stale_pages
                                );
                                break 'rounds;
                            }
                        } else {
                            stale_pages = 0;
                        }
                    }
                    Err(err) => {
                        // 한 페이지의 실패는 무신규 페이지처럼 취급하고 계속 진행
                        warn!("Category {} page {} fetch failed: {}", category_id, page, err);
                        stale_pages += 1;
                        if stale_pages >= MAX_CONSECUTIVE_STALE_PAGES {
                            break 'rounds;
                        }
                    }
                }
            }

            next_page = round_end + 1;
        }

        collected
    }
}

/// 두 프로듀서의 출력을 정규화 URL과 상품 키 기준으로 중복 제거해 병합
///
/// 같은 상품 키를 가진 URL 표기가 여러 개면 처음 본 것이 이긴다. 결과
/// 스트림에는 중복 `ItemId`가 존재하지 않는다.
pub fn merge_discovered(sitemap_urls: Vec<String>, walk_urls: Vec<String>) -> Vec<DiscoveredUrl> {
    let mut seen_urls: HashSet<String> = HashSet::new();
    let mut seen_ids = HashSet::new();
    let mut merged = Vec::new();

    let tagged = sitemap_urls
        .into_iter()
        .map(|u| (u, DiscoverySource::Sitemap))
        .chain(walk_urls.into_iter().map(|u| (u, DiscoverySource::CategoryWalk)));

    for (raw, source) in tagged {
        let Some(discovered) = DiscoveredUrl::new(&raw, source) else {
            debug!("Dropping unparsable URL from discovery: {}", raw);
            continue;
        };
        if !seen_urls.insert(discovered.url.clone()) {
            continue;
        }
        if let Some(id) = discovered.item_id() {
            if !seen_ids.insert(id) {
                continue;
            }
        }
        merged.push(discovered);
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct EmptySitemap;

    #[async_trait]
    impl SitemapSource for EmptySitemap {
        async fn fetch_item_urls(&self) -> Vec<String> {
            Vec::new()
        }
    }

    /// 페이지별 링크를 미리 정해두는 시뮬레이션 소스
    struct ScriptedListing {
        pages: Vec<Vec<String>>,
        fetched: Mutex<Vec<u32>>,
    }

    impl ScriptedListing {
        fn new(pages: Vec<Vec<String>>) -> Self {
            Self {
                pages,
                fetched: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ListingPageSource for ScriptedListing {
        async fn fetch_listing_page(&self, _category_id: &str, page: u32) -> Result<Vec<String>> {
            self.fetched.lock().unwrap().push(page);
            Ok(self
                .pages
                .get((page - 1) as usize)
                .cloned()
                .unwrap_or_default())
        }
    }

    fn item_url(id: u64) -> String {
        format!("https://replmoa1.com/shop/item.php?it_id={id}")
    }

    fn walk_discovery(listing: Arc<dyn ListingPageSource>, pages_per_round: usize) -> UrlDiscovery {
        UrlDiscovery::new(
            Arc::new(EmptySitemap),
            listing,
            DiscoveryConfig {
                sources: DiscoverySelection::WalkOnly,
                walk_categories: vec![("10".to_string(), "남성".to_string())],
                pages_per_round,
                page_cap: 2_000,
            },
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_walk_stops_on_empty_page_and_collects_prior_links() {
        // 4페이지부터 빈 결과: 1~3페이지 링크만 수집하고 6페이지 전에 멈춘다
        let listing = Arc::new(ScriptedListing::new(vec![
            vec![item_url(1), item_url(2)],
            vec![item_url(3)],
            vec![item_url(4)],
            vec![],
            vec![],
            vec![],
        ]));
        let discovery = walk_discovery(listing.clone(), 2);

        let urls = discovery.discover().await;
        let ids: HashSet<u64> = urls.iter().filter_map(|u| u.item_id()).map(|i| i.0).collect();
        assert_eq!(ids, HashSet::from([1, 2, 3, 4]));

        let fetched = listing.fetched.lock().unwrap().clone();
        assert!(fetched.iter().max().unwrap() <= &6);
    }

    #[tokio::test]
    async fn test_walk_stops_after_three_stale_pages() {
        // 2페이지부터 같은 링크만 반복: 신규 링크 없는 연속 3페이지에서 종료
        let repeat = vec![item_url(1), item_url(2)];
        let listing = Arc::new(ScriptedListing::new(vec![
            repeat.clone(),
            repeat.clone(),
            repeat.clone(),
            repeat.clone(),
            repeat.clone(),
            repeat.clone(),
            repeat.clone(),
        ]));
        let discovery = walk_discovery(listing.clone(), 3);

        let urls = discovery.discover().await;
        assert_eq!(urls.len(), 2);

        // 1페이지(신규) + 무신규 3페이지에서 멈추므로 5페이지 이상 가지 않는다
        let fetched = listing.fetched.lock().unwrap().clone();
        assert!(fetched.iter().max().unwrap() <= &6);
    }

    #[tokio::test]
    async fn test_walk_with_zero_round_size_still_terminates() {
        // 라운드 크기 0도 최소 1페이지 라운드로 진행되어 빈 페이지에서 끝난다
        let listing = Arc::new(ScriptedListing::new(vec![vec![item_url(1)], vec![]]));
        let discovery = walk_discovery(listing, 0);

        let urls = tokio::time::timeout(std::time::Duration::from_secs(5), discovery.discover())
            .await
            .expect("walk terminates with a zero round size");
        assert_eq!(urls.len(), 1);
    }

    #[tokio::test]
    async fn test_walk_respects_cancellation() {
        let listing = Arc::new(ScriptedListing::new(vec![vec![item_url(1)]; 100]));
        let discovery = UrlDiscovery::new(
            Arc::new(EmptySitemap),
            listing,
            DiscoveryConfig {
                sources: DiscoverySelection::WalkOnly,
                walk_categories: vec![("10".to_string(), "남성".to_string())],
                pages_per_round: 2,
                page_cap: 2_000,
            },
            {
                let token = CancellationToken::new();
                token.cancel();
                token
            },
        );
        let urls = discovery.discover().await;
        assert!(urls.is_empty());
    }

    #[test]
    fn test_merge_dedupes_by_item_id_across_sources() {
        let sitemap = vec![
            item_url(1),
            format!("{}#frag", item_url(2)),
        ];
        let walk = vec![
            // 같은 상품을 다른 표기로 다시 발견
            format!("{}&ca_id=10", item_url(1)),
            item_url(2),
            item_url(3),
        ];
        let merged = merge_discovered(sitemap, walk);

        let mut ids: Vec<u64> = merged.iter().filter_map(|u| u.item_id()).map(|i| i.0).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3]);

        // 처음 본 표기(사이트맵 쪽)가 이긴다
        assert_eq!(merged[0].source, DiscoverySource::Sitemap);
    }

    #[test]
    fn test_merge_drops_unparsable_urls() {
        let merged = merge_discovered(vec!["not a url".to_string()], vec![item_url(9)]);
        assert_eq!(merged.len(), 1);
    }
}
