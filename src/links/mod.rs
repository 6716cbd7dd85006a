//! Detail-link resolution for a located performance block.
//!
//! The site buries the card link differently across deployments: a plain
//! anchor, an href populated client-side that the static attribute lacks, a
//! data attribute on the card, a template fragment the query layer never
//! exposes, or an anchor wrapping the card from outside. The strategies
//! below run in that order and the first candidate that survives
//! `clean` + validation wins.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Selector};
use tracing::trace;

use crate::renderer::Renderer;
use crate::urls;

/// Non-standard attributes the site has used to carry the card target.
const DATA_URL_ATTRIBUTES: [&str; 7] = [
    "data-href",
    "data-url",
    "data-link",
    "data-event-url",
    "data-performance-url",
    "data-target",
    "data-to",
];

/// How many parent levels the ancestor scan climbs.
const ANCESTOR_LEVELS: usize = 3;

static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a").unwrap());

static MARKUP_URL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r#"(?i)href=["']([^"']*performance[^"']*)["']"#,
        r#"(?i)href=["']([^"']*event[^"']*)["']"#,
        r#"(?i)href=["']([^"']*creations[^"']*)["']"#,
        r#"(?i)data-href=["']([^"']*performance[^"']*)["']"#,
        r#"(?i)data-url=["']([^"']*performance[^"']*)["']"#,
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Everything a resolution pass may draw on besides the block itself.
pub struct LinkContext<'a> {
    /// Page URL candidates are resolved against; absent for saved files.
    pub base_url: Option<&'a str>,
    /// Live page handle. When absent (saved files), only the anchor,
    /// data-attribute and markup strategies run.
    pub live: Option<LiveBlock<'a>>,
}

/// The live-page counterpart of a statically located block.
pub struct LiveBlock<'a> {
    pub renderer: &'a Renderer,
    /// Block cascade selector that matched the static document.
    pub selector: &'a str,
    /// Position of the block within that selector's match set.
    pub index: usize,
}

/// Find the single best detail URL for one block, or nothing.
pub fn resolve_detail_url(block: ElementRef<'_>, ctx: &LinkContext<'_>) -> Option<String> {
    if let Some(url) = direct_anchor_scan(block, ctx.base_url) {
        trace!(url = %url, strategy = "anchor", "detail url resolved");
        return Some(url);
    }
    if let Some(live) = &ctx.live
        && let Some(url) = script_anchor_scan(live, ctx.base_url)
    {
        trace!(url = %url, strategy = "script", "detail url resolved");
        return Some(url);
    }
    if let Some(url) = data_attribute_scan(block, ctx.base_url) {
        trace!(url = %url, strategy = "data-attribute", "detail url resolved");
        return Some(url);
    }
    if let Some(url) = markup_regex_scan(block, ctx.base_url) {
        trace!(url = %url, strategy = "markup", "detail url resolved");
        return Some(url);
    }
    if ctx.live.is_some() {
        // saved-file extraction stops at the block boundary
        if let Some(url) = ancestor_scan(block, ctx.base_url) {
            trace!(url = %url, strategy = "ancestor", "detail url resolved");
            return Some(url);
        }
    }
    None
}

/// `clean → validate → normalize`; rejected candidates are discarded,
/// never retried with different rules.
fn accept(candidate: &str, base_url: Option<&str>) -> Option<String> {
    let cleaned = urls::clean(candidate);
    if !urls::is_valid_candidate(&cleaned) {
        return None;
    }
    let resolved = match base_url {
        Some(base) => urls::normalize(&cleaned, base),
        None => cleaned,
    };
    // emit without a trailing slash so resolved links dedupe stably
    Some(resolved.trim_end_matches('/').to_string())
}

fn direct_anchor_scan(scope: ElementRef<'_>, base_url: Option<&str>) -> Option<String> {
    scope
        .select(&ANCHOR)
        .filter_map(|anchor| anchor.value().attr("href"))
        .find_map(|href| accept(href, base_url))
}

/// Re-enumerate the block's anchor hrefs through the live page, picking up
/// hrefs the static attribute does not carry yet.
fn script_anchor_scan(live: &LiveBlock<'_>, base_url: Option<&str>) -> Option<String> {
    live.renderer
        .block_anchor_hrefs(live.selector, live.index)
        .into_iter()
        .find_map(|href| accept(&href, base_url))
}

fn data_attribute_scan(block: ElementRef<'_>, base_url: Option<&str>) -> Option<String> {
    DATA_URL_ATTRIBUTES
        .iter()
        .filter_map(|attribute| block.value().attr(attribute))
        .find_map(|value| accept(value, base_url))
}

/// Net for links embedded in markup the structured query layer does not
/// expose, e.g. un-rendered template fragments.
fn markup_regex_scan(block: ElementRef<'_>, base_url: Option<&str>) -> Option<String> {
    let markup = block.inner_html();
    MARKUP_URL_PATTERNS
        .iter()
        .flat_map(|pattern| pattern.captures_iter(&markup))
        .filter_map(|captures| captures.get(1))
        .find_map(|candidate| accept(candidate.as_str(), base_url))
}

/// The clickable anchor sometimes wraps the card instead of nesting inside
/// it; repeat the anchor scan a few parent levels up.
fn ancestor_scan(block: ElementRef<'_>, base_url: Option<&str>) -> Option<String> {
    let mut current = block;
    for _ in 0..ANCESTOR_LEVELS {
        let parent = current.parent().and_then(ElementRef::wrap)?;
        if let Some(url) = direct_anchor_scan(parent, base_url) {
            return Some(url);
        }
        current = parent;
    }
    None
}
