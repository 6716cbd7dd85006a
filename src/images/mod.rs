//! Card image retrieval and local storage.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use reqwest::Client;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::traits::{ImageStore, ScrapeConfig};

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const JPEG_QUALITY: u8 = 85;

pub struct ImageDownloader {
    client: Client,
    images_dir: PathBuf,
}

impl ImageDownloader {
    pub fn new(config: &ScrapeConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.images_dir).with_context(|| {
            format!("failed to create images dir {}", config.images_dir.display())
        })?;

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(FETCH_TIMEOUT)
            .build()
            .context("failed to build image http client")?;

        Ok(Self {
            client,
            images_dir: config.images_dir.clone(),
        })
    }
}

#[async_trait]
impl ImageStore for ImageDownloader {
    async fn fetch_and_store(&self, image_url: &str, base_url: Option<&str>) -> Option<String> {
        let absolute = resolve_image_url(image_url, base_url);

        let response = match self.client.get(&absolute).send().await {
            Ok(response) => response,
            Err(error) => {
                debug!(error = %error, url = %absolute, "image fetch failed");
                return None;
            }
        };
        let bytes = response.error_for_status().ok()?.bytes().await.ok()?;

        let image_id = Uuid::new_v4();
        store_decoded(&self.images_dir, image_id, &bytes)
            .or_else(|| store_raw(&self.images_dir, image_id, &bytes, &absolute))
    }
}

/// Relative image sources resolve against the page URL; anything that
/// cannot be resolved is fetched as given and fails downstream.
fn resolve_image_url(image_url: &str, base_url: Option<&str>) -> String {
    if image_url.starts_with("http") {
        return image_url.to_string();
    }
    base_url
        .and_then(|base| Url::parse(base).ok())
        .and_then(|base| base.join(image_url).ok())
        .map(|joined| joined.to_string())
        .unwrap_or_else(|| image_url.to_string())
}

/// Decode and store. Images carrying alpha are flattened to RGB and
/// re-encoded as JPEG; everything else keeps the sniffed format.
fn store_decoded(dir: &Path, id: Uuid, bytes: &[u8]) -> Option<String> {
    let format = image::guess_format(bytes).ok()?;
    let decoded = image::load_from_memory(bytes).ok()?;

    if decoded.color().has_alpha() {
        let filename = format!("{id}.jpeg");
        let rgb = decoded.to_rgb8();
        let mut encoded = Vec::new();
        JpegEncoder::new_with_quality(&mut encoded, JPEG_QUALITY)
            .encode_image(&rgb)
            .ok()?;
        std::fs::write(dir.join(&filename), encoded).ok()?;
        return Some(filename);
    }

    let extension = format.extensions_str().first().copied().unwrap_or("jpg");
    let filename = format!("{id}.{extension}");
    std::fs::write(dir.join(&filename), bytes).ok()?;
    Some(filename)
}

/// Undecodable payloads are kept verbatim with the extension the URL path
/// suggests.
fn store_raw(dir: &Path, id: Uuid, bytes: &[u8], source_url: &str) -> Option<String> {
    let filename = format!("{id}.{}", extension_from_url(source_url));
    std::fs::write(dir.join(&filename), bytes).ok()?;
    Some(filename)
}

fn extension_from_url(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()?
                .last()?
                .rsplit_once('.')
                .map(|(_, extension)| extension.to_ascii_lowercase())
        })
        .filter(|extension| !extension.is_empty())
        .unwrap_or_else(|| "jpg".to_string())
}
