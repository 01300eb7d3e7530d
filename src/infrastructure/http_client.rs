//! HTTP client for web crawling with rate limiting and error handling
//!
//! Provides a robust HTTP client specifically designed for catalog scraping
//! with respect for server resources: connection reuse, a request-rate
//! limiter, bounded retries on transient failures, and cooperative
//! cancellation.

use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::{Context, Result};
use governor::{
    clock::DefaultClock,
    state::{direct::NotKeyed, InMemoryState},
    Quota, RateLimiter,
};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, Response};
use tokio_util::sync::CancellationToken;

/// HTTP client configuration for crawling
#[derive(Debug, Clone, serde::Serialize)]
pub struct HttpClientConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_requests_per_second: u32,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                         AppleWebKit/537.36 (KHTML, like Gecko) \
                         Chrome/91.0.4472.124 Safari/537.36"
                .to_string(),
            timeout_seconds: 15,
            max_requests_per_second: 2,
            max_retries: 2,
            retry_delay_ms: 1_000,
        }
    }
}

/// Rate-limited HTTP client shared by both discovery producers and the
/// per-item fetch step. One instance per run; the reqwest client keeps a
/// connection pool across requests.
pub struct HttpClient {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    config: HttpClientConfig,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).context("Invalid user agent")?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("Failed to create HTTP client")?;

        let quota = Quota::per_second(
            NonZeroU32::new(config.max_requests_per_second)
                .context("Rate limit must be greater than 0")?,
        );
        let rate_limiter = RateLimiter::direct(quota);

        Ok(Self {
            client,
            rate_limiter,
            config,
        })
    }

    /// Fetch a URL once, honoring the rate limiter.
    async fn get_once(&self, url: &str) -> Result<Response> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch URL: {url}"))?;

        if !response.status().is_success() {
            anyhow::bail!(
                "HTTP request failed with status {}: {}",
                response.status(),
                url
            );
        }
        Ok(response)
    }

    /// Fetch URL and return the body as text, retrying transient failures a
    /// bounded number of times before giving up on this URL.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tracing::debug!("Retrying ({}/{}): {}", attempt, self.config.max_retries, url);
                tokio::time::sleep(Duration::from_millis(
                    self.config.retry_delay_ms * u64::from(attempt),
                ))
                .await;
            }

            match self.get_once(url).await {
                Ok(response) => {
                    let text = response
                        .text()
                        .await
                        .with_context(|| format!("Failed to read response body from: {url}"))?;
                    tracing::debug!("Fetched {} ({} chars)", url, text.len());
                    return Ok(text);
                }
                Err(err) => last_error = Some(err),
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("unreachable: no fetch attempt ran")))
    }

    /// Fetch URL with cancellation support: no new request is started after
    /// the token fires, and rate-limiter waits are interruptible. An
    /// in-flight request is left to its HTTP timeout.
    pub async fn get_text_with_cancellation(
        &self,
        url: &str,
        token: &CancellationToken,
    ) -> Result<String> {
        if token.is_cancelled() {
            anyhow::bail!("Request cancelled before starting: {url}");
        }

        tokio::select! {
            result = self.get_text(url) => result,
            () = token.cancelled() => {
                tracing::debug!("🛑 Fetch cancelled: {}", url);
                anyhow::bail!("Request cancelled: {url}")
            }
        }
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }
}
