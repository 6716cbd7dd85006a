//! Locating performance blocks and extracting their fields.
//!
//! The target markup has no stable schema: class names are obfuscated and
//! rotate between deployments. Every lookup here is an ordered cascade,
//! most specific known selector first, generic catch-all last, and the
//! first selector that matches wins. A miss anywhere degrades the field to
//! an empty string, never the whole record.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::links::{self, LinkContext};
use crate::models::PerformanceRecord;
use crate::traits::ImageStore;

/// Block cascade. The obfuscated class pair is the current deployment; the
/// substring matches survive class-name churn; `article` and the test ids
/// are the last resort.
pub const BLOCK_SELECTORS: [&str; 9] = [
    "div._3XrzE._5fgzK",
    "div[class*='_3XrzE']",
    "div[class*='event']",
    "div[class*='performance']",
    "div[class*='card']",
    "article",
    ".event-item",
    "[data-testid*='event']",
    "[data-testid*='performance']",
];

const TITLE_SELECTORS: [&str; 8] = [
    "div.IlTNG",
    "h1",
    "h2",
    "h3",
    "h4",
    "[class*='title']",
    "[class*='name']",
    "[class*='heading']",
];

const CATEGORY_SELECTORS: [&str; 4] = [
    "div._2nsaF",
    "[class*='category']",
    "[class*='genre']",
    "[class*='type']",
];

const DATETIME_SELECTORS: [&str; 4] = [
    "div._1E60K",
    "[class*='date']",
    "[class*='time']",
    "[class*='when']",
];

const PRICE_SELECTORS: [&str; 3] = ["span._1QJzJ", "[class*='price']", "[class*='cost']"];

/// Separator of composite fields like `"Drama · 16+"`.
const COMPOSITE_SEPARATOR: &str = " · ";

static IMG: Lazy<Selector> = Lazy::new(|| Selector::parse("img").unwrap());

/// Schedule lines as they appear in the running text when the schedule
/// element itself is missing.
static RU_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(\d{1,2}\s+(?:января|февраля|марта|апреля|мая|июня|июля|августа|сентября|октября|ноября|декабря),?\s*\d{1,2}:\d{2})",
    )
    .unwrap()
});

/// Result of a block-locator pass, remembering which cascade entry matched
/// so the live page can be re-queried with the same selector.
pub struct LocatedBlocks<'a> {
    pub selector: &'static str,
    pub blocks: Vec<ElementRef<'a>>,
}

/// First cascade selector with at least one match wins; match sets are
/// never merged across selectors.
pub fn locate_blocks(document: &Html) -> Option<LocatedBlocks<'_>> {
    for selector_str in BLOCK_SELECTORS {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        let blocks: Vec<ElementRef<'_>> = document.select(&selector).collect();
        if !blocks.is_empty() {
            debug!(selector = selector_str, count = blocks.len(), "performance blocks located");
            return Some(LocatedBlocks { selector: selector_str, blocks });
        }
    }
    None
}

#[allow(dead_code)]
pub fn find_blocks(document: &Html) -> Vec<ElementRef<'_>> {
    locate_blocks(document).map(|located| located.blocks).unwrap_or_default()
}

/// Assemble one record from one block. Field extractors run independently;
/// whatever fails stays empty. The image store is consulted only when the
/// block carries an image URL, and its failure costs just the filename.
pub async fn assemble(
    block: ElementRef<'_>,
    link: &LinkContext<'_>,
    images: &dyn ImageStore,
) -> PerformanceRecord {
    let mut record = PerformanceRecord::default();

    record.image_url = extract_image_url(block);
    if !record.image_url.is_empty() {
        record.image_filename = images
            .fetch_and_store(&record.image_url, link.base_url)
            .await
            .unwrap_or_default();
    }

    record.title = extract_title(block);
    (record.category, record.age_rating) = extract_category_and_age(block);
    (record.datetime, record.venue) = extract_datetime_and_venue(block);
    record.price = extract_price(block);
    record.detail_url = links::resolve_detail_url(block, link).unwrap_or_default();

    record
}

pub fn extract_title(block: ElementRef<'_>) -> String {
    if let Some(title) = select_first_text(block, &TITLE_SELECTORS) {
        return title;
    }
    block_text(block)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string()
}

pub fn extract_category_and_age(block: ElementRef<'_>) -> (String, String) {
    select_first_text(block, &CATEGORY_SELECTORS)
        .map(|text| split_composite(&text))
        .unwrap_or_default()
}

pub fn extract_datetime_and_venue(block: ElementRef<'_>) -> (String, String) {
    if let Some(text) = select_first_text(block, &DATETIME_SELECTORS) {
        return split_composite(&text);
    }
    let datetime = RU_DATE
        .find(&block_text(block))
        .map(|found| found.as_str().to_string())
        .unwrap_or_default();
    (datetime, String::new())
}

pub fn extract_price(block: ElementRef<'_>) -> String {
    select_first_text(block, &PRICE_SELECTORS).unwrap_or_default()
}

pub fn extract_image_url(block: ElementRef<'_>) -> String {
    block
        .select(&IMG)
        .next()
        .and_then(|img| img.value().attr("src").or_else(|| img.value().attr("data-src")))
        .map(str::to_string)
        .unwrap_or_default()
}

/// Trimmed text of the first descendant matched by the first cascade
/// selector that hits; `None` when the whole cascade misses. An unparsable
/// selector counts as a miss, not an error.
fn select_first_text(block: ElementRef<'_>, cascade: &[&str]) -> Option<String> {
    for selector_str in cascade {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        if let Some(element) = block.select(&selector).next() {
            return Some(element_text(element));
        }
    }
    None
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Block text with one line per text node, for line-based fallbacks.
fn block_text(block: ElementRef<'_>) -> String {
    block
        .text()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// `"Drama · 16+"` → `("Drama", "16+")`; without the separator the whole
/// text is the first field and the second stays empty.
fn split_composite(text: &str) -> (String, String) {
    match text.split_once(COMPOSITE_SEPARATOR) {
        Some((first, second)) => (first.trim().to_string(), second.trim().to_string()),
        None => (text.trim().to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct NoImages;

    #[async_trait]
    impl ImageStore for NoImages {
        async fn fetch_and_store(&self, _image_url: &str, _base_url: Option<&str>) -> Option<String> {
            None
        }
    }

    fn static_ctx() -> LinkContext<'static> {
        LinkContext {
            base_url: Some("https://site.test"),
            live: None,
        }
    }

    fn single_block(document: &Html) -> ElementRef<'_> {
        let blocks = find_blocks(document);
        assert_eq!(blocks.len(), 1, "fixture should contain exactly one block");
        blocks[0]
    }

    #[test]
    fn first_matching_cascade_selector_wins_exclusively() {
        // matches only the third cascade entry; the later `article` entry
        // must contribute nothing
        let document = Html::parse_document(
            r#"<html><body>
                <div class="event-row"><h2>A</h2></div>
                <div class="event-row"><h2>B</h2></div>
                <article>unrelated</article>
            </body></html>"#,
        );
        let located = locate_blocks(&document).unwrap();
        assert_eq!(located.selector, "div[class*='event']");
        assert_eq!(located.blocks.len(), 2);
        for block in &located.blocks {
            assert_ne!(element_text(*block), "unrelated");
        }
    }

    #[test]
    fn no_matching_selector_yields_no_blocks() {
        let document = Html::parse_document("<html><body><p>nothing here</p></body></html>");
        assert!(find_blocks(&document).is_empty());
    }

    #[test]
    fn title_comes_from_the_cascade_when_a_selector_matches() {
        let document = Html::parse_document(
            r#"<div class="event-row"><div class="show-title">Swan Lake</div>Bolshoi</div>"#,
        );
        assert_eq!(extract_title(single_block(&document)), "Swan Lake");
    }

    #[test]
    fn title_falls_back_to_first_nonempty_text_line() {
        let document = Html::parse_document(
            "<div class=\"event-row\">Swan Lake\nBolshoi\n19:00</div>",
        );
        assert_eq!(extract_title(single_block(&document)), "Swan Lake");
    }

    #[test]
    fn composite_category_splits_into_category_and_age() {
        let document = Html::parse_document(
            r#"<div class="event-row"><span class="category-tag">Drama · 16+</span></div>"#,
        );
        let (category, age_rating) = extract_category_and_age(single_block(&document));
        assert_eq!(category, "Drama");
        assert_eq!(age_rating, "16+");
    }

    #[test]
    fn category_without_separator_leaves_age_empty() {
        let document = Html::parse_document(
            r#"<div class="event-row"><span class="category-tag">Drama</span></div>"#,
        );
        let (category, age_rating) = extract_category_and_age(single_block(&document));
        assert_eq!(category, "Drama");
        assert_eq!(age_rating, "");
    }

    #[test]
    fn composite_datetime_splits_into_datetime_and_venue() {
        let document = Html::parse_document(
            r#"<div class="event-row"><div class="date-line">12 мая, 19:00 · Большой зал</div></div>"#,
        );
        let (datetime, venue) = extract_datetime_and_venue(single_block(&document));
        assert_eq!(datetime, "12 мая, 19:00");
        assert_eq!(venue, "Большой зал");
    }

    #[test]
    fn datetime_falls_back_to_schedule_pattern_in_running_text() {
        let document = Html::parse_document(
            r#"<div class="event-row"><span>Премьера 5 октября, 19:30 на большой сцене</span></div>"#,
        );
        let (datetime, venue) = extract_datetime_and_venue(single_block(&document));
        assert_eq!(datetime, "5 октября, 19:30");
        assert_eq!(venue, "");
    }

    #[test]
    fn price_uses_its_cascade() {
        let document = Html::parse_document(
            r#"<div class="event-row"><span class="price-from">от 500 ₽</span></div>"#,
        );
        assert_eq!(extract_price(single_block(&document)), "от 500 ₽");
    }

    #[test]
    fn image_url_prefers_src_over_data_src() {
        let document = Html::parse_document(
            r#"<div class="event-row"><img src="/img/a.jpg" data-src="/img/b.jpg"></div>"#,
        );
        assert_eq!(extract_image_url(single_block(&document)), "/img/a.jpg");

        let lazy_only = Html::parse_document(
            r#"<div class="event-row"><img data-src="/img/b.jpg"></div>"#,
        );
        assert_eq!(extract_image_url(single_block(&lazy_only)), "/img/b.jpg");
    }

    #[tokio::test]
    async fn assembler_degrades_to_empty_fields_without_panicking() {
        let document = Html::parse_document(r#"<div class="event-row"></div>"#);
        let record = assemble(single_block(&document), &static_ctx(), &NoImages).await;

        assert_eq!(record.title, "");
        assert_eq!(record.category, "");
        assert_eq!(record.age_rating, "");
        assert_eq!(record.datetime, "");
        assert_eq!(record.venue, "");
        assert_eq!(record.price, "");
        assert_eq!(record.image_url, "");
        assert_eq!(record.image_filename, "");
        assert_eq!(record.detail_url, "");
    }

    #[tokio::test]
    async fn assembler_fills_every_extractable_field() {
        let document = Html::parse_document(
            r#"<div class="event-row">
                <img src="/img/poster.jpg">
                <div class="show-title">Swan Lake</div>
                <span class="category-tag">Ballet · 6+</span>
                <div class="date-line">12 мая, 19:00 · Историческая сцена</div>
                <span class="price-from">от 1500 ₽</span>
                <a href="/w/performance/321/swan-lake/">tickets</a>
            </div>"#,
        );
        let record = assemble(single_block(&document), &static_ctx(), &NoImages).await;

        assert_eq!(record.title, "Swan Lake");
        assert_eq!(record.category, "Ballet");
        assert_eq!(record.age_rating, "6+");
        assert_eq!(record.datetime, "12 мая, 19:00");
        assert_eq!(record.venue, "Историческая сцена");
        assert_eq!(record.price, "от 1500 ₽");
        assert_eq!(record.image_url, "/img/poster.jpg");
        assert_eq!(record.image_filename, "", "image store stub returns nothing");
        assert_eq!(record.detail_url, "https://site.test/w/performance/321/swan-lake");
    }
}
