//! Run configuration and collaborator seams

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

/// Immutable configuration for one scraping run.
///
/// Built once in `main` and handed down to the renderer and image store;
/// there is no process-wide mutable state.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// Run Chrome headless.
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    /// Overrides Chrome binary discovery, taken from `CHROME_BIN`.
    pub chrome_binary: Option<PathBuf>,
    /// User agent presented to the site.
    pub user_agent: String,
    /// Where fetched card images are stored.
    pub images_dir: PathBuf,
    /// Per-selector wait for the listing content to appear.
    pub content_timeout: Duration,
    /// Wait for a click-triggered navigation before giving up on a block.
    pub click_timeout: Duration,
    /// Pause between scroll positions when triggering lazy rendering.
    pub scroll_pause: Duration,
    /// Scroll cycles run right after the initial page load.
    pub initial_scroll_cycles: u32,
    /// Parse-and-locate attempts before accepting whatever markup is there.
    pub load_attempts: u32,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 800,
            window_height: 600,
            chrome_binary: std::env::var_os("CHROME_BIN")
                .map(PathBuf::from)
                .filter(|path| path.exists()),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            images_dir: PathBuf::from("static/images"),
            content_timeout: Duration::from_secs(10),
            click_timeout: Duration::from_secs(10),
            scroll_pause: Duration::from_secs(2),
            initial_scroll_cycles: 3,
            load_attempts: 3,
        }
    }
}

/// Fetches a card image and stores it locally.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Returns the stored filename, or `None` when the image could not be
    /// fetched or written. A failure here never fails the record.
    async fn fetch_and_store(&self, image_url: &str, base_url: Option<&str>) -> Option<String>;
}
