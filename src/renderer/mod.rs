//! Headless Chrome wrapper the extraction session drives.
//!
//! The listing renders client side, so a plain HTTP GET returns an empty
//! shell; everything here goes through a real browser. All waits are
//! bounded and a timeout is "no signal", never an error that escapes to
//! the session. The Chrome process is torn down when the `Renderer` drops.

use std::ffi::OsStr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use headless_chrome::{Browser, LaunchOptions, Tab};
use tracing::{debug, warn};

use crate::traits::ScrapeConfig;

/// Selectors that signal the listing has actually rendered, checked in
/// order of specificity. `body` is the last resort so the wait never spins
/// on a blank page forever.
const CONTENT_READY_SELECTORS: [&str; 8] = [
    "div._3XrzE._5fgzK",
    "._3ErvA",
    "div[class*='_3ErvA']",
    "div[class*='performance']",
    "div[class*='event']",
    ".event-item",
    "div[class*='card']",
    "body",
];

const CHROME_ARGS: [&str; 15] = [
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-extensions",
    "--disable-setuid-sandbox",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-renderer-backgrounding",
    "--disable-features=TranslateUI",
    "--disable-ipc-flooding-protection",
    "--mute-audio",
    "--no-first-run",
    "--no-default-browser-check",
    "--disable-default-apps",
    "--disable-web-security",
    "--disable-features=VizDisplayCompositor",
];

/// SPA routers need a moment after a probe tab loads the origin page.
const PROBE_SETTLE: Duration = Duration::from_secs(3);
/// Pause between scrolling a block into view and clicking it.
const PRE_CLICK_PAUSE: Duration = Duration::from_secs(1);
/// Extra wait after the location first changes, for the final route.
const POST_CLICK_SETTLE: Duration = Duration::from_secs(2);
const LOCATION_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct Renderer {
    browser: Browser,
    tab: Arc<Tab>,
    config: ScrapeConfig,
}

impl Renderer {
    /// Launch a headless browser configured for the listing site.
    pub fn launch(config: &ScrapeConfig) -> Result<Self> {
        let user_agent_arg = format!("--user-agent={}", config.user_agent);
        let mut args: Vec<&OsStr> = CHROME_ARGS.iter().map(OsStr::new).collect();
        args.push(OsStr::new(&user_agent_arg));

        let mut options = LaunchOptions::default();
        options.headless = config.headless;
        options.sandbox = false;
        options.window_size = Some((config.window_width, config.window_height));
        options.args = args;
        options.idle_browser_timeout = Duration::from_secs(300);
        if let Some(path) = &config.chrome_binary {
            options.path = Some(path.clone());
        }

        let browser = Browser::new(options).context("failed to launch chrome")?;
        let tab = browser.new_tab().context("failed to open a tab")?;

        Ok(Self {
            browser,
            tab,
            config: config.clone(),
        })
    }

    /// Navigate to the listing page and wait, within bounds, for its
    /// content to render; then scroll to trigger lazy blocks.
    pub fn load(&self, url: &str) -> Result<()> {
        self.tab
            .navigate_to(url)
            .with_context(|| format!("failed to navigate to {url}"))?;
        if let Err(error) = self.tab.wait_until_navigated() {
            warn!(error = %error, "navigation wait timed out, continuing with current state");
        }

        self.wait_for_content();
        for _ in 0..self.config.initial_scroll_cycles {
            self.scroll_cycle();
        }
        Ok(())
    }

    fn wait_for_content(&self) {
        for selector in CONTENT_READY_SELECTORS {
            if self
                .tab
                .wait_for_element_with_custom_timeout(selector, self.config.content_timeout)
                .is_ok()
            {
                debug!(selector, "content ready");
                return;
            }
        }
        debug!("no readiness selector appeared before its timeout");
    }

    /// Scroll to the bottom and back up to trigger lazy rendering.
    pub fn scroll_cycle(&self) {
        const TO_BOTTOM: &str = "window.scrollTo(0, document.body.scrollHeight);";
        const TO_TOP: &str = "window.scrollTo(0, 0);";

        for script in [TO_BOTTOM, TO_TOP] {
            if let Err(error) = self.tab.evaluate(script, false) {
                warn!(error = %error, "scroll evaluation failed");
                return;
            }
            thread::sleep(self.config.scroll_pause);
        }
    }

    /// The rendered markup as it currently stands.
    pub fn content(&self) -> Result<String> {
        self.tab.get_content().context("failed to read rendered markup")
    }

    pub fn current_url(&self) -> String {
        self.tab.get_url()
    }

    /// Enumerate the `href`s of every anchor inside the indexed block via
    /// script evaluation; this sees hrefs the static attribute does not
    /// carry yet. The script returns a JSON string.
    pub fn block_anchor_hrefs(&self, block_selector: &str, index: usize) -> Vec<String> {
        let selector_literal = serde_json::to_string(block_selector)
            .unwrap_or_else(|_| String::from("\"\""));
        let script = format!(
            r#"(function() {{
                var blocks = document.querySelectorAll({selector_literal});
                var block = blocks[{index}];
                var hrefs = [];
                if (block) {{
                    var anchors = block.querySelectorAll('a');
                    for (var i = 0; i < anchors.length; i++) {{
                        if (anchors[i].href) {{ hrefs.push(anchors[i].href); }}
                    }}
                }}
                return JSON.stringify(hrefs);
            }})()"#
        );

        let value = match self.tab.evaluate(&script, false) {
            Ok(remote) => remote.value,
            Err(error) => {
                debug!(error = %error, "anchor enumeration script failed");
                return Vec::new();
            }
        };

        value
            .as_ref()
            .and_then(|json| json.as_str())
            .and_then(|json| serde_json::from_str::<Vec<String>>(json).ok())
            .unwrap_or_default()
    }

    /// Click-augmentation probe for one block: reload the origin page in an
    /// isolated tab, click the block at `index`, and report the location
    /// the click navigated to, if any. The probe tab is closed and the
    /// primary tab re-activated on every exit path.
    pub fn click_block_for_url(
        &self,
        block_selector: &str,
        index: usize,
        origin_url: &str,
    ) -> Option<String> {
        let tab = match self.browser.new_tab() {
            Ok(tab) => tab,
            Err(error) => {
                warn!(error = %error, "could not open a click-probe tab");
                return None;
            }
        };

        let found = self.click_in_tab(&tab, block_selector, index, origin_url);

        if let Err(error) = tab.close(true) {
            warn!(error = %error, "failed to close the click-probe tab");
        }
        if let Err(error) = self.tab.activate() {
            warn!(error = %error, "failed to re-activate the primary tab");
        }

        found
    }

    fn click_in_tab(
        &self,
        tab: &Arc<Tab>,
        block_selector: &str,
        index: usize,
        origin_url: &str,
    ) -> Option<String> {
        tab.navigate_to(origin_url).ok()?;
        tab.wait_until_navigated().ok()?;
        thread::sleep(PROBE_SETTLE);

        let blocks = tab.find_elements(block_selector).unwrap_or_default();
        let block = blocks.get(index)?;
        let before = tab.get_url();

        if block.scroll_into_view().is_err() {
            debug!(index, "scroll into view failed before the click");
        }
        thread::sleep(PRE_CLICK_PAUSE);
        block.click().ok()?;

        self.wait_for_location_change(tab, &before)
    }

    /// Bounded poll for a navigation triggered by the synthetic click.
    fn wait_for_location_change(&self, tab: &Arc<Tab>, before: &str) -> Option<String> {
        let deadline = Instant::now() + self.config.click_timeout;
        while Instant::now() < deadline {
            let current = tab.get_url();
            if current != before {
                thread::sleep(POST_CLICK_SETTLE);
                let settled = tab.get_url();
                return Some(if settled == before { current } else { settled });
            }
            thread::sleep(LOCATION_POLL_INTERVAL);
        }
        None
    }
}
