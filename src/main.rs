//! Harvest run entry point
//!
//! Wires configuration, logging, the Postgres sink, cancellation signals
//! (Ctrl-C and a sentinel stop file), URL discovery, and the pipeline into
//! one run. The process exits non-zero only for fatal startup conditions;
//! a cancelled run is a normal, fully reported result.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::info;

use replmoa_harvester::crawling::{
    DedupLedger, DiscoveryConfig, HarvestPipeline, PipelineConfig, UrlDiscovery,
};
use replmoa_harvester::domain::services::{ImageMirror, ProductSink};
use replmoa_harvester::infrastructure::{
    logging, HarvestConfig, HttpClient, HttpClientConfig, HttpImageMirror, HttpListingSource,
    HttpProductFetcher, HttpSitemapSource, PgProductRepository, ProductPageParser,
};

/// 미러 엔드포인트 자체 타임아웃
const MIRROR_TIMEOUT: Duration = Duration::from_secs(10);
/// 중단 파일 폴링 주기
const STOP_FILE_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging()?;

    let config = HarvestConfig::from_env()?;
    info!(
        "Effective configuration: {}",
        serde_json::to_string(&config)?
    );

    // 저장소 연결 실패는 치명적: 실행을 시작하지 않는다
    let repository = PgProductRepository::connect(&config.database.connection_url()?).await?;

    let token = CancellationToken::new();
    spawn_cancellation_watchers(&token, config.stop_file.clone());

    let http = Arc::new(HttpClient::new(HttpClientConfig {
        max_requests_per_second: config.max_requests_per_second,
        ..Default::default()
    })?);
    let parser = Arc::new(ProductPageParser::new()?);

    let mut ledger = DedupLedger::new();
    ledger.seed(repository.load_known_item_ids().await?);

    let discovery = UrlDiscovery::new(
        Arc::new(HttpSitemapSource::new(
            Arc::clone(&http),
            Arc::clone(&parser),
            &config.sitemap_url,
        )),
        Arc::new(HttpListingSource::new(
            Arc::clone(&http),
            Arc::clone(&parser),
            &config.listing_base_url,
            token.clone(),
        )),
        DiscoveryConfig {
            sources: config.discovery_sources,
            walk_categories: config.filtered_walk_categories(),
            pages_per_round: config.list_workers,
            page_cap: config.page_cap,
        },
        token.clone(),
    );
    let urls = discovery.discover().await;

    let mirror: Option<Arc<dyn ImageMirror>> =
        if config.mirror_enabled && !config.mirror_endpoint.is_empty() {
            Some(Arc::new(HttpImageMirror::new(
                &config.mirror_endpoint,
                MIRROR_TIMEOUT,
            )?))
        } else {
            None
        };

    let fetcher = Arc::new(HttpProductFetcher::new(http, parser, token.clone()));
    let sink: Arc<dyn ProductSink> = Arc::new(repository);
    let pipeline = HarvestPipeline::new(
        fetcher,
        sink,
        mirror,
        PipelineConfig {
            batch_size: config.batch_size,
            detail_workers: config.detail_workers,
            batch_delay: Duration::from_millis(config.batch_delay_ms),
            max_save: config.max_save,
            category_filter: config.category_filter.clone(),
        },
        token.clone(),
    );

    let summary = pipeline.run(urls, &mut ledger).await;
    info!("Run summary: {}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Ctrl-C와 중단 파일을 취소 토큰으로 연결
fn spawn_cancellation_watchers(token: &CancellationToken, stop_file: String) {
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("🛑 Ctrl-C received, requesting cooperative shutdown");
            signal_token.cancel();
        }
    });

    let file_token = token.clone();
    tokio::spawn(async move {
        loop {
            if Path::new(&stop_file).exists() {
                info!("🛑 Stop file '{}' detected, requesting shutdown", stop_file);
                file_token.cancel();
                break;
            }
            tokio::time::sleep(STOP_FILE_POLL_INTERVAL).await;
        }
    });
}
