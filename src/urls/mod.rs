//! URL cleaning, validation and normalization for detail links.
//!
//! The listing markup leaks half-broken hrefs: doubled protocols from SPA
//! redirects, repeated hosts, and `/https` markers left over from an earlier
//! canonicalization pass. Every candidate link goes through `clean` and
//! `is_valid_candidate` before it is resolved against the page URL.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// Keywords a real detail link always carries. The surrounding navigation
/// chrome is link-dense but never matches any of these.
const URL_KEYWORDS: [&str; 3] = ["performance", "event", "creations"];

static SCHEME: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://").unwrap());
static HOST_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^https?://[^/]+").unwrap());
static TRAILING_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"/?https?/?$").unwrap());

/// Strip the artifacts the site's markup smuggles into hrefs.
///
/// Idempotent: cleaning an already-clean URL returns it unchanged.
pub fn clean(url: &str) -> String {
    if url.is_empty() {
        return String::new();
    }

    let mut url = dedup_scheme(url);
    url = dedup_host(&url);

    // leftover resolved markers, possibly stacked
    loop {
        let stripped = TRAILING_MARKER.replace(&url, "").into_owned();
        if stripped == url {
            break;
        }
        url = stripped;
    }

    url.trim().to_string()
}

/// A second `http(s)://` later in the string replaces everything before it.
fn dedup_scheme(url: &str) -> String {
    let starts: Vec<usize> = SCHEME.find_iter(url).map(|m| m.start()).collect();
    match starts.as_slice() {
        [.., last] if starts.len() > 1 => url[*last..].to_string(),
        _ => url.to_string(),
    }
}

/// A repeated identical `scheme://host` prefix collapses to one occurrence.
fn dedup_host(url: &str) -> String {
    let Some(prefix) = HOST_PREFIX.find(url) else {
        return url.to_string();
    };
    let host = prefix.as_str();
    let rest = &url[prefix.end()..];
    match rest.find(host) {
        Some(pos) => format!("{host}{}", &rest[pos + host.len()..]),
        None => url.to_string(),
    }
}

/// Whether a cleaned candidate can be a performance detail link at all.
pub fn is_valid_candidate(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }
    if url.starts_with('#') || url.starts_with("javascript:") {
        return false;
    }
    let lower = url.to_lowercase();
    URL_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}

/// Resolve a candidate against the page URL. Absolute URLs pass through;
/// anything unresolvable is returned as-is rather than dropped here, the
/// validity gate has already run.
pub fn normalize(url: &str, base_url: &str) -> String {
    if url.is_empty() {
        return String::new();
    }
    if url.starts_with("http") {
        return url.to_string();
    }
    match Url::parse(base_url).and_then(|base| base.join(url)) {
        Ok(joined) => joined.to_string(),
        Err(_) => url.to_string(),
    }
}

/// Append the `/https` resolved marker exactly once, for downstream
/// consumers that distinguish pipeline-resolved URLs.
pub fn tag_resolved(url: &str) -> String {
    if url.is_empty() {
        return String::new();
    }
    let trimmed = url.trim_end_matches('/');
    if trimmed.ends_with("/https") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/https")
    }
}

/// Strict check used by the CLI to tell a page URL from a local file path.
pub fn is_well_formed_http_url(source: &str) -> bool {
    match Url::parse(source) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https")
                && url.host_str().is_some_and(|host| !host.is_empty())
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_keeps_ordinary_urls_untouched() {
        let url = "https://site.test/w/creations/performance/123/abc";
        assert_eq!(clean(url), url);
    }

    #[test]
    fn clean_collapses_duplicated_protocol() {
        assert_eq!(
            clean("https://site.test/redirect/https://site.test/w/performance/1"),
            "https://site.test/w/performance/1"
        );
        assert_eq!(
            clean("http://a.test/http://b.test/http://c.test/w/event/2"),
            "http://c.test/w/event/2"
        );
    }

    #[test]
    fn clean_strips_trailing_resolved_marker() {
        assert_eq!(clean("https://x.test/w/event/5/https"), "https://x.test/w/event/5");
        assert_eq!(clean("https://x.test/w/event/5/https/"), "https://x.test/w/event/5");
        assert_eq!(clean("https://x.test/w/event/5/http"), "https://x.test/w/event/5");
    }

    #[test]
    fn clean_is_idempotent() {
        let inputs = [
            "https://site.test/w/performance/1",
            "https://site.test/redirect/https://site.test/w/performance/1",
            "http://a.test/http://b.test/http://c.test/w/event/2",
            "https://x.test/w/event/5/https",
            "https://x.test/w/event/5/https/https",
            "",
            "https",
        ];
        for input in inputs {
            let once = clean(input);
            assert_eq!(clean(&once), once, "clean not idempotent for {input:?}");
        }
    }

    #[test]
    fn host_duplicate_collapses() {
        assert_eq!(
            dedup_host("https://x.test/oops/https://x.test/w/performance/1"),
            "https://x.test/w/performance/1"
        );
        assert_eq!(dedup_host("https://x.test/w/event/1"), "https://x.test/w/event/1");
    }

    #[test]
    fn keywordless_urls_are_invalid() {
        assert!(!is_valid_candidate("https://site.test/about"));
        assert!(!is_valid_candidate("/nav/home"));
        assert!(!is_valid_candidate(""));
    }

    #[test]
    fn fragments_and_script_urls_are_invalid() {
        assert!(!is_valid_candidate("#performances"));
        assert!(!is_valid_candidate("javascript:openEvent(1)"));
    }

    #[test]
    fn keyword_gate_is_case_insensitive() {
        assert!(is_valid_candidate("/w/creations/performance/123"));
        assert!(is_valid_candidate("https://site.test/EVENTS/9"));
    }

    #[test]
    fn normalize_resolves_root_relative_against_base_host() {
        assert_eq!(normalize("/a/b", "https://x.com/y"), "https://x.com/a/b");
    }

    #[test]
    fn normalize_passes_absolute_urls_through() {
        assert_eq!(normalize("https://z.com/c", "https://x.com/y"), "https://z.com/c");
    }

    #[test]
    fn normalize_resolves_relative_references() {
        assert_eq!(normalize("c/d", "https://x.com/y/z"), "https://x.com/y/c/d");
    }

    #[test]
    fn tag_resolved_applies_exactly_once() {
        assert_eq!(tag_resolved("https://x.test/w/event/1"), "https://x.test/w/event/1/https");
        assert_eq!(tag_resolved("https://x.test/w/event/1/"), "https://x.test/w/event/1/https");

        let once = tag_resolved("https://x.test/w/event/1");
        assert_eq!(tag_resolved(&once), once);
        assert_eq!(tag_resolved(""), "");
    }

    #[test]
    fn well_formed_check_accepts_http_urls_only() {
        assert!(is_well_formed_http_url("https://site.test/afisha"));
        assert!(is_well_formed_http_url("http://site.test"));
        assert!(!is_well_formed_http_url("saved/listing.html"));
        assert!(!is_well_formed_http_url("/tmp/listing.html"));
        assert!(!is_well_formed_http_url("file:///tmp/listing.html"));
        assert!(!is_well_formed_http_url(""));
    }
}
