use std::path::Path;

use anyhow::Result;
use tracing::info;

use crate::images::ImageDownloader;
use crate::models::PerformanceRecord;
use crate::session::ExtractionSession;
use crate::storage;
use crate::traits::ScrapeConfig;

/// Ties the extraction session, image store and persistence together.
pub struct AfishaScraper {
    config: ScrapeConfig,
    images: ImageDownloader,
}

impl AfishaScraper {
    pub fn new(config: ScrapeConfig) -> Result<Self> {
        let images = ImageDownloader::new(&config)?;
        Ok(Self { config, images })
    }

    pub async fn scrape_from_url(&self, url: &str) -> Vec<PerformanceRecord> {
        info!(url, "scraping listing page");
        let session = ExtractionSession::new(&self.config, &self.images);
        session.run_url(url).await
    }

    pub async fn scrape_from_file(&self, path: &Path) -> Result<Vec<PerformanceRecord>> {
        info!(path = %path.display(), "parsing saved listing page");
        let html = storage::read_local_file(path)?;
        let session = ExtractionSession::new(&self.config, &self.images);
        Ok(session.run_html(&html, None).await)
    }

    pub fn save_to_json(&self, records: &[PerformanceRecord], path: &Path) -> Result<()> {
        storage::save_to_json(records, path)
    }

    pub fn print_summary(&self, records: &[PerformanceRecord]) {
        storage::print_summary(records);
    }
}
