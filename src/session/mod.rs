//! Drives one extraction pass over a listing page.
//!
//! Static extraction always runs first. The click-augmentation fallback
//! fires only when not a single block yielded a detail URL statically; a
//! page where some links resolved is left alone.

use std::time::Duration;

use scraper::Html;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::links::{LinkContext, LiveBlock};
use crate::models::PerformanceRecord;
use crate::parsing;
use crate::renderer::Renderer;
use crate::traits::{ImageStore, ScrapeConfig};
use crate::urls;

/// Pause before re-reading the markup when no blocks were located.
const RELOCATE_PAUSE: Duration = Duration::from_secs(3);

/// Where the session is in its `static → click → done` flow.
#[derive(Debug, Clone, Copy)]
enum Phase {
    StaticOnly,
    ClickAugmented,
    Done,
}

/// One extraction pass: records produced plus the block selector that
/// matched, which the click probes re-query the live page with.
struct StaticPass {
    records: Vec<PerformanceRecord>,
    block_selector: Option<&'static str>,
}

pub struct ExtractionSession<'a> {
    config: &'a ScrapeConfig,
    images: &'a dyn ImageStore,
}

impl<'a> ExtractionSession<'a> {
    pub fn new(config: &'a ScrapeConfig, images: &'a dyn ImageStore) -> Self {
        Self { config, images }
    }

    /// Extract from a live page behind a headless browser. Rendering
    /// failures degrade to an empty record set; they never panic or abort.
    pub async fn run_url(&self, url: &str) -> Vec<PerformanceRecord> {
        let mut phase = Phase::StaticOnly;
        debug!(?phase, url, "session started");

        let renderer = match Renderer::launch(self.config) {
            Ok(renderer) => renderer,
            Err(error) => {
                error!(error = %error, "browser launch failed");
                return Vec::new();
            }
        };
        if let Err(error) = renderer.load(url) {
            error!(error = %error, url, "page load failed");
            return Vec::new();
        }
        debug!(location = %renderer.current_url(), "page rendered");

        let mut pass = StaticPass {
            records: Vec::new(),
            block_selector: None,
        };
        for attempt in 0..self.config.load_attempts {
            let html = match renderer.content() {
                Ok(html) => html,
                Err(error) => {
                    error!(error = %error, "could not read the rendered markup");
                    return Vec::new();
                }
            };
            pass = self.extract_static(&html, Some(url), Some(&renderer)).await;
            if !pass.records.is_empty() {
                break;
            }
            if attempt + 1 < self.config.load_attempts {
                debug!(attempt = attempt + 1, "no blocks located, scrolling and retrying");
                sleep(RELOCATE_PAUSE).await;
                renderer.scroll_cycle();
            }
        }

        let StaticPass {
            mut records,
            block_selector,
        } = pass;

        if needs_click_augmentation(&records)
            && let Some(selector) = block_selector
        {
            phase = Phase::ClickAugmented;
            debug!(?phase, "no detail urls resolved statically, probing clicks");
            self.click_augment(&renderer, url, selector, &mut records);
        }

        phase = Phase::Done;
        let records = accepted(records);
        info!(?phase, count = records.len(), "extraction finished");
        records
    }

    /// Extract from pre-fetched markup. The script and click strategies
    /// are unavailable here.
    pub async fn run_html(&self, html: &str, base_url: Option<&str>) -> Vec<PerformanceRecord> {
        let pass = self.extract_static(html, base_url, None).await;
        let records = accepted(pass.records);
        info!(count = records.len(), "static extraction finished");
        records
    }

    /// One static pass: locate blocks, assemble one record per block.
    async fn extract_static(
        &self,
        html: &str,
        base_url: Option<&str>,
        renderer: Option<&Renderer>,
    ) -> StaticPass {
        let document = Html::parse_document(html);
        let Some(located) = parsing::locate_blocks(&document) else {
            return StaticPass {
                records: Vec::new(),
                block_selector: None,
            };
        };

        let mut records = Vec::with_capacity(located.blocks.len());
        for (index, block) in located.blocks.iter().enumerate() {
            let link = LinkContext {
                base_url,
                live: renderer.map(|renderer| LiveBlock {
                    renderer,
                    selector: located.selector,
                    index,
                }),
            };
            records.push(parsing::assemble(*block, &link, self.images).await);
        }

        StaticPass {
            records,
            block_selector: Some(located.selector),
        }
    }

    /// Probe every block still missing a detail URL with a synthetic click
    /// in an isolated tab.
    fn click_augment(
        &self,
        renderer: &Renderer,
        origin_url: &str,
        block_selector: &str,
        records: &mut [PerformanceRecord],
    ) {
        let mut resolved = 0usize;
        for (index, record) in records.iter_mut().enumerate() {
            if !record.detail_url.is_empty() {
                continue;
            }
            let Some(location) = renderer.click_block_for_url(block_selector, index, origin_url)
            else {
                continue;
            };
            let cleaned = urls::clean(&location);
            if cleaned.is_empty() {
                continue;
            }
            record.detail_url = urls::normalize(&cleaned, origin_url);
            resolved += 1;
        }
        if resolved > 0 {
            info!(resolved, "detail urls recovered via click probes");
        }
    }
}

/// Augmentation is all-or-nothing: it fires only when no block at all
/// resolved a detail URL statically.
fn needs_click_augmentation(records: &[PerformanceRecord]) -> bool {
    !records.is_empty() && records.iter().all(|record| record.detail_url.is_empty())
}

/// A record earns its place with a title; every other field may be empty.
fn accepted(records: Vec<PerformanceRecord>) -> Vec<PerformanceRecord> {
    records.into_iter().filter(PerformanceRecord::has_title).collect()
}
