//! 수집 파이프라인 - 배치 단위 fetch/transform/persist 오케스트레이터
//!
//! 발견된 URL 스트림을 고정 크기 배치로 잘라, 배치마다 세마포어로 묶인
//! 워커 풀을 돌린다. 취소 토큰과 저장 목표는 배치 경계에서 검사하므로
//! 진행 중인 배치는 끝까지 소진되고(최대 배치 크기만큼의 추가 작업),
//! 그 이후의 배치는 시작되지 않는다. 개별 아이템의 실패는 기록하고
//! 건너뛸 뿐 실행을 중단시키지 않는다.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::crawling::ledger::DedupLedger;
use crate::domain::category::{matches_filter, normalize_category};
use crate::domain::product::{DiscoveredUrl, ProductRecord};
use crate::domain::services::{ImageMirror, ProductPageFetcher, ProductSink};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub batch_size: usize,
    pub detail_workers: usize,
    pub batch_delay: Duration,
    /// 저장 목표; 0이면 무제한
    pub max_save: usize,
    pub category_filter: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 12,
            detail_workers: 3,
            batch_delay: Duration::from_millis(2_000),
            max_save: 50,
            category_filter: String::new(),
        }
    }
}

/// 한 아이템 처리의 결과
#[derive(Debug, Clone, PartialEq, Eq)]
enum ItemOutcome {
    Saved,
    /// 싱크가 (name, category_id) 중복으로 판정 - 성공으로 취급
    Duplicate,
    /// 카테고리 필터 불일치 - 고빈도 정상 경로
    Filtered,
    Failed,
    /// 취소 관찰 후 시작하지 않음
    NotStarted,
}

/// 실행 결과 요약. 취소로 조기 종료된 실행도 부분 실패가 아니라
/// 정상 결과로 보고된다.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct HarvestSummary {
    pub session_id: String,
    pub discovered: usize,
    pub processed: usize,
    pub saved: usize,
    /// 원장 사전 검사로 건너뛴 수
    pub skipped_known: usize,
    pub duplicates: usize,
    pub filtered_out: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub elapsed_ms: u64,
}

pub struct HarvestPipeline {
    fetcher: Arc<dyn ProductPageFetcher>,
    sink: Arc<dyn ProductSink>,
    mirror: Option<Arc<dyn ImageMirror>>,
    config: PipelineConfig,
    token: CancellationToken,
}

impl HarvestPipeline {
    pub fn new(
        fetcher: Arc<dyn ProductPageFetcher>,
        sink: Arc<dyn ProductSink>,
        mirror: Option<Arc<dyn ImageMirror>>,
        config: PipelineConfig,
        token: CancellationToken,
    ) -> Self {
        Self {
            fetcher,
            sink,
            mirror,
            config,
            token,
        }
    }

    /// 발견된 URL을 소비해 저장까지 수행하고 요약을 반환
    pub async fn run(&self, urls: Vec<DiscoveredUrl>, ledger: &mut DedupLedger) -> HarvestSummary {
        let session_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let mut summary = HarvestSummary {
            session_id: session_id.clone(),
            discovered: urls.len(),
            ..Default::default()
        };

        info!(
            "Starting harvest session {} ({} URLs, batch size {}, {} workers)",
            session_id,
            urls.len(),
            self.config.batch_size,
            self.config.detail_workers
        );

        let total_batches = urls.len().div_ceil(self.config.batch_size.max(1));
        for (batch_index, batch) in urls.chunks(self.config.batch_size.max(1)).enumerate() {
            if self.token.is_cancelled() {
                info!("🛑 Cancellation observed at batch boundary, stopping");
                summary.cancelled = true;
                break;
            }
            if self.target_reached(summary.saved) {
                info!("Save target {} reached, stopping", self.config.max_save);
                break;
            }

            // 배치 구성은 단일 스레드에서 원장을 검사/기록한다
            let mut dispatch: Vec<DiscoveredUrl> = Vec::with_capacity(batch.len());
            for url in batch {
                if let Some(id) = url.item_id() {
                    if ledger.contains(id) {
                        debug!("Skipping already-known item {}: {}", id.0, url.url);
                        summary.skipped_known += 1;
                        continue;
                    }
                    ledger.record(id);
                }
                dispatch.push(url.clone());
            }

            debug!(
                "Batch {}/{}: dispatching {} items",
                batch_index + 1,
                total_batches,
                dispatch.len()
            );

            // 배치마다 새 워커 풀: 취소 검사가 배치 경계에 정렬된다
            let semaphore = Arc::new(Semaphore::new(self.config.detail_workers.max(1)));
            let mut handles = Vec::with_capacity(dispatch.len());
            for url in dispatch {
                let semaphore = Arc::clone(&semaphore);
                let fetcher = Arc::clone(&self.fetcher);
                let sink = Arc::clone(&self.sink);
                let mirror = self.mirror.clone();
                let token = self.token.clone();
                let filter = self.config.category_filter.clone();

                handles.push(tokio::spawn(async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return ItemOutcome::NotStarted;
                    };
                    process_item(&url, fetcher, sink, mirror, &filter, &token).await
                }));
            }

            // 배치는 끝까지 소진한다 - 저장 목표 도달도 진행 중 작업은 끊지 않는다
            for handle in handles {
                let outcome = match handle.await {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        warn!("Worker task panicked: {}", err);
                        ItemOutcome::Failed
                    }
                };
                match outcome {
                    ItemOutcome::Saved => {
                        summary.processed += 1;
                        summary.saved += 1;
                    }
                    ItemOutcome::Duplicate => {
                        summary.processed += 1;
                        summary.duplicates += 1;
                    }
                    ItemOutcome::Filtered => {
                        summary.processed += 1;
                        summary.filtered_out += 1;
                    }
                    ItemOutcome::Failed => {
                        summary.processed += 1;
                        summary.failed += 1;
                    }
                    ItemOutcome::NotStarted => {}
                }
            }

            let more_batches = batch_index + 1 < total_batches;
            if more_batches
                && !self.token.is_cancelled()
                && !self.target_reached(summary.saved)
                && !self.config.batch_delay.is_zero()
            {
                tokio::time::sleep(self.config.batch_delay).await;
            }
        }

        if self.token.is_cancelled() {
            summary.cancelled = true;
        }
        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            "Harvest session {} finished: {} saved, {} duplicates, {} filtered, {} failed{}",
            session_id,
            summary.saved,
            summary.duplicates,
            summary.filtered_out,
            summary.failed,
            if summary.cancelled { " (cancelled)" } else { "" }
        );
        summary
    }

    fn target_reached(&self, saved: usize) -> bool {
        self.config.max_save > 0 && saved >= self.config.max_save
    }
}

/// 워커 한 개의 아이템 처리: fetch → 필터 → 정규화 → 이미지 미러링 → 저장
async fn process_item(
    url: &DiscoveredUrl,
    fetcher: Arc<dyn ProductPageFetcher>,
    sink: Arc<dyn ProductSink>,
    mirror: Option<Arc<dyn ImageMirror>>,
    category_filter: &str,
    token: &CancellationToken,
) -> ItemOutcome {
    // 취소 후에는 새 네트워크 호출을 시작하지 않는다
    if token.is_cancelled() {
        return ItemOutcome::NotStarted;
    }

    let record = match fetcher.fetch_product(&url.url).await {
        Ok(record) => record,
        Err(err) => {
            warn!("Item fetch/parse failed ({}): {}", url.url, err);
            return ItemOutcome::Failed;
        }
    };

    if !matches_filter(&record.raw_category, category_filter) {
        debug!("Filtered out '{}' ({})", record.name, record.raw_category);
        return ItemOutcome::Filtered;
    }

    let path = normalize_category(&record.raw_category);
    let record = match mirror {
        Some(mirror) => mirror_images(record, mirror.as_ref()).await,
        None => record,
    };

    let leaf_id = match sink.upsert_category_path(&path).await {
        Ok(id) => id,
        Err(err) => {
            warn!("Category upsert failed for '{}': {}", record.raw_category, err);
            return ItemOutcome::Failed;
        }
    };

    match sink.save_product_if_new(&record, leaf_id).await {
        Ok(true) => {
            info!("✅ Saved '{}' ({}원)", record.name, record.price);
            ItemOutcome::Saved
        }
        Ok(false) => {
            debug!("Already saved: '{}'", record.name);
            ItemOutcome::Duplicate
        }
        Err(err) => {
            warn!("Persist failed for '{}': {}", record.name, err);
            ItemOutcome::Failed
        }
    }
}

/// 대표/갤러리 이미지를 미러링한다. 갤러리는 동시에 미러링하되 문서
/// 순서를 보존하고, 실패한 이미지는 원본 URL을 유지한다.
async fn mirror_images(mut record: ProductRecord, mirror: &dyn ImageMirror) -> ProductRecord {
    if !record.image_url.is_empty() {
        record.image_url = mirror.mirror(&record.image_url).await;
    }

    let mirrored = join_all(
        record
            .gallery_images
            .iter()
            .map(|url| mirror.mirror(url)),
    )
    .await;
    record.gallery_images = mirrored;
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::domain::category::CategoryNode;
    use crate::domain::product::{DiscoverySource, ItemId};

    fn record(name: &str, category: &str) -> ProductRecord {
        ProductRecord {
            name: name.to_string(),
            raw_category: category.to_string(),
            price: 100_000,
            department_price: 0,
            image_url: format!("https://replmoa1.com/data/item/{name}.jpg"),
            gallery_images: vec![
                format!("https://replmoa1.com/data/editor/{name}-1.jpg"),
                format!("https://replmoa1.com/data/editor/{name}-2.jpg"),
            ],
            source_url: String::new(),
            options: vec![],
        }
    }

    fn url(id: u64) -> DiscoveredUrl {
        DiscoveredUrl::new(
            &format!("https://replmoa1.com/shop/item.php?it_id={id}"),
            DiscoverySource::Sitemap,
        )
        .unwrap()
    }

    /// it_id → 레코드 테이블 기반 모의 fetcher; 요청 수를 센다
    struct ScriptedFetcher {
        records: HashMap<String, ProductRecord>,
        fetches: AtomicUsize,
        cancel_after: Option<(usize, CancellationToken)>,
    }

    impl ScriptedFetcher {
        fn new(records: Vec<(DiscoveredUrl, ProductRecord)>) -> Self {
            Self {
                records: records.into_iter().map(|(u, r)| (u.url, r)).collect(),
                fetches: AtomicUsize::new(0),
                cancel_after: None,
            }
        }
    }

    #[async_trait]
    impl ProductPageFetcher for ScriptedFetcher {
        async fn fetch_product(&self, url: &str) -> Result<ProductRecord> {
            let count = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((limit, token)) = &self.cancel_after {
                if count >= *limit {
                    token.cancel();
                }
            }
            self.records
                .get(url)
                .cloned()
                .map(|mut r| {
                    r.source_url = url.to_string();
                    r
                })
                .ok_or_else(|| anyhow!("fetch failed: {url}"))
        }
    }

    /// 인메모리 싱크: (name, category_id) 중복 검사를 재현
    #[derive(Default)]
    struct MemorySink {
        saved: Mutex<Vec<(String, i64)>>,
        categories: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ProductSink for MemorySink {
        async fn load_known_item_ids(&self) -> Result<Vec<ItemId>> {
            Ok(Vec::new())
        }

        async fn upsert_category_path(&self, path: &[CategoryNode]) -> Result<i64> {
            let leaf_slug = path
                .last()
                .map_or_else(|| "etc".to_string(), |n| n.slug.clone());
            let mut categories = self.categories.lock().unwrap();
            if let Some(pos) = categories.iter().position(|s| *s == leaf_slug) {
                return Ok(pos as i64 + 1);
            }
            categories.push(leaf_slug);
            Ok(categories.len() as i64)
        }

        async fn save_product_if_new(&self, record: &ProductRecord, category_id: i64) -> Result<bool> {
            let mut saved = self.saved.lock().unwrap();
            let key = (record.name.clone(), category_id);
            if saved.contains(&key) {
                return Ok(false);
            }
            saved.push(key);
            Ok(true)
        }
    }

    /// 항상 실패해서 원본 URL이 유지되는지 검증하기 위한 미러
    struct PrefixMirror {
        fail: bool,
    }

    #[async_trait]
    impl ImageMirror for PrefixMirror {
        async fn mirror(&self, url: &str) -> String {
            if self.fail {
                url.to_string()
            } else {
                format!("https://cdn.example.com/{}", url.rsplit('/').next().unwrap())
            }
        }
    }

    fn pipeline_config(batch_size: usize, max_save: usize) -> PipelineConfig {
        PipelineConfig {
            batch_size,
            detail_workers: 2,
            batch_delay: Duration::ZERO,
            max_save,
            category_filter: String::new(),
        }
    }

    #[tokio::test]
    async fn test_save_target_stops_after_batch_drains() {
        let urls: Vec<DiscoveredUrl> = (1..=6).map(url).collect();
        let records = urls
            .iter()
            .map(|u| (u.clone(), record(&format!("상품{}", u.item_id().unwrap().0), "남성 > 가방")))
            .collect();
        let fetcher = Arc::new(ScriptedFetcher::new(records));
        let sink = Arc::new(MemorySink::default());

        let pipeline = HarvestPipeline::new(
            fetcher.clone(),
            sink.clone(),
            None,
            pipeline_config(2, 3),
            CancellationToken::new(),
        );
        let mut ledger = DedupLedger::new();
        let summary = pipeline.run(urls, &mut ledger).await;

        // 목표 3은 2번째 배치가 다 돌고 나서야 넘으므로 4개까지 저장될 수 있다
        assert_eq!(summary.saved, 4);
        assert!(!summary.cancelled);
        // 3번째 배치는 시작되지 않는다
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_duplicate_records_saved_once() {
        let urls = vec![url(1), url(2)];
        // 다른 URL이지만 같은 (상품명, 카테고리)
        let records = vec![
            (urls[0].clone(), record("고야드 토트백", "남성 > 가방 > 고야드")),
            (urls[1].clone(), record("고야드 토트백", "남성 > 가방 > 고야드")),
        ];
        let fetcher = Arc::new(ScriptedFetcher::new(records));
        let sink = Arc::new(MemorySink::default());

        let pipeline = HarvestPipeline::new(
            fetcher,
            sink.clone(),
            None,
            pipeline_config(1, 0),
            CancellationToken::new(),
        );
        let summary = pipeline.run(urls, &mut DedupLedger::new()).await;

        assert_eq!(summary.saved, 1);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(sink.saved.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ledger_precheck_skips_known_items() {
        let urls = vec![url(1), url(2)];
        let records = urls
            .iter()
            .map(|u| (u.clone(), record(&u.url.clone(), "여성 > 지갑")))
            .collect();
        let fetcher = Arc::new(ScriptedFetcher::new(records));
        let sink = Arc::new(MemorySink::default());

        let mut ledger = DedupLedger::new();
        ledger.seed([ItemId(1)]);

        let pipeline = HarvestPipeline::new(
            fetcher.clone(),
            sink,
            None,
            pipeline_config(10, 0),
            CancellationToken::new(),
        );
        let summary = pipeline.run(urls, &mut ledger).await;

        assert_eq!(summary.skipped_known, 1);
        assert_eq!(summary.saved, 1);
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 1);
        assert!(ledger.contains(ItemId(2)));
    }

    #[tokio::test]
    async fn test_category_filter_rejects_mismatches() {
        let urls = vec![url(1), url(2)];
        let records = vec![
            (urls[0].clone(), record("남성 가방", "남성 > 가방")),
            (urls[1].clone(), record("여성 지갑", "여성 > 지갑")),
        ];
        let fetcher = Arc::new(ScriptedFetcher::new(records));
        let sink = Arc::new(MemorySink::default());

        let mut config = pipeline_config(10, 0);
        config.category_filter = "여성".to_string();
        let pipeline =
            HarvestPipeline::new(fetcher, sink, None, config, CancellationToken::new());
        let summary = pipeline.run(urls, &mut DedupLedger::new()).await;

        assert_eq!(summary.saved, 1);
        assert_eq!(summary.filtered_out, 1);
    }

    #[tokio::test]
    async fn test_cancellation_mid_run_keeps_completed_batches() {
        let token = CancellationToken::new();
        let urls: Vec<DiscoveredUrl> = (1..=10).map(url).collect();
        let records = urls
            .iter()
            .map(|u| (u.clone(), record(&format!("상품{}", u.item_id().unwrap().0), "남성 > 가방")))
            .collect();
        let mut fetcher = ScriptedFetcher::new(records);
        // 4번째 fetch(2번째 배치) 도중 취소 발생
        fetcher.cancel_after = Some((4, token.clone()));
        let fetcher = Arc::new(fetcher);
        let sink = Arc::new(MemorySink::default());

        let pipeline = HarvestPipeline::new(
            fetcher.clone(),
            sink.clone(),
            None,
            pipeline_config(2, 0),
            token,
        );
        let summary = pipeline.run(urls, &mut DedupLedger::new()).await;

        assert!(summary.cancelled);
        // 배치 1~2의 결과만 반영되고, 반쯤 저장된 아이템은 없다
        assert_eq!(summary.saved, sink.saved.lock().unwrap().len());
        assert!(summary.saved >= 2 && summary.saved <= 4);
        assert!(fetcher.fetches.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_skipped_not_fatal() {
        let urls = vec![url(1), url(2)];
        // url(1)만 레코드가 있고 url(2)는 fetch 실패
        let records = vec![(urls[0].clone(), record("상품1", "남성 > 가방"))];
        let fetcher = Arc::new(ScriptedFetcher::new(records));
        let sink = Arc::new(MemorySink::default());

        let pipeline = HarvestPipeline::new(
            fetcher,
            sink,
            None,
            pipeline_config(10, 0),
            CancellationToken::new(),
        );
        let summary = pipeline.run(urls, &mut DedupLedger::new()).await;

        assert_eq!(summary.saved, 1);
        assert_eq!(summary.failed, 1);
        assert!(!summary.cancelled);
    }

    #[tokio::test]
    async fn test_mirror_failure_keeps_original_urls() {
        let original = record("상품1", "남성 > 가방");
        let gallery = original.gallery_images.clone();
        let image = original.image_url.clone();

        let failed = mirror_images(original.clone(), &PrefixMirror { fail: true }).await;
        assert_eq!(failed.image_url, image);
        assert_eq!(failed.gallery_images, gallery);

        // 성공 시에도 갤러리 순서는 문서 순서를 유지한다
        let mirrored = mirror_images(original, &PrefixMirror { fail: false }).await;
        assert_eq!(
            mirrored.gallery_images,
            vec![
                "https://cdn.example.com/상품1-1.jpg".to_string(),
                "https://cdn.example.com/상품1-2.jpg".to_string(),
            ]
        );
    }
}
