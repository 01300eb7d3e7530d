//! Image mirroring collaborator
//!
//! Asks the mirror endpoint to re-host one source image and returns the
//! mirrored URL. The contract is fallback-to-original: any failure (endpoint
//! down, timeout, bad response) returns the input URL unchanged so the
//! pipeline never drops an item over mirroring.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::services::ImageMirror;

#[derive(Debug, Deserialize)]
struct MirrorResponse {
    url: String,
}

/// HTTP-backed mirror with its own (short) timeout, independent of the
/// crawl client's timeout.
pub struct HttpImageMirror {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpImageMirror {
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    async fn try_mirror(&self, url: &str) -> anyhow::Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await?
            .error_for_status()?;

        let body: MirrorResponse = response.json().await?;
        if body.url.is_empty() {
            anyhow::bail!("mirror endpoint returned an empty url");
        }
        Ok(body.url)
    }
}

#[async_trait]
impl ImageMirror for HttpImageMirror {
    async fn mirror(&self, url: &str) -> String {
        match self.try_mirror(url).await {
            Ok(mirrored) => {
                debug!("Mirrored image: {} -> {}", url, mirrored);
                mirrored
            }
            Err(err) => {
                warn!("Image mirror failed for {}, keeping original: {}", url, err);
                url.to_string()
            }
        }
    }
}
