//! Parsing of worker output.
//!
//! Workers report their results as labelled lines in their log. When a label
//! appears more than once the last occurrence wins, so a worker may print
//! provisional values and correct them later.

use regex::Regex;
use std::sync::LazyLock;

// Labels and values are separated by spaces or tabs only, so an empty value
// never picks up the following line.

/// `... saved to: <path>`, as printed by file-producing workers.
static RESULT_PATH: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)saved to:[ \t]*([^\r\n]+)").ok());

/// `Product URL: <url>` or `Listing URL: <url>`, printed on publication.
static LISTING_URL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)(?:product|listing) url:[ \t]*(https?://\S+)").ok());

/// `Updated Title: <text>`, printed by the title fixer.
static UPDATED_TITLE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)updated title:[ \t]*([^\r\n]+)").ok());

/// A listing reference embedded in a free-text status label.
static STATUS_LISTING: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)(?:listing|product|printify) url:[ \t]*([^\s)]+)").ok());

fn last_capture(pattern: &Option<Regex>, text: &str) -> Option<String> {
    pattern
        .as_ref()?
        .captures_iter(text)
        .last()
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Last reported output path.
pub fn result_path(log: &str) -> Option<String> {
    last_capture(&RESULT_PATH, log)
}

/// Last reported listing URL.
pub fn listing_url(log: &str) -> Option<String> {
    last_capture(&LISTING_URL, log)
}

/// Last reported title.
pub fn updated_title(log: &str) -> Option<String> {
    last_capture(&UPDATED_TITLE, log)
}

/// Listing URL mentioned in an artifact status label.
pub fn listing_url_from_status(status: &str) -> Option<String> {
    STATUS_LISTING
        .as_ref()?
        .captures(status)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Identifier of a listing: the last path segment of its URL, without query
/// or fragment.
pub fn listing_id(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(without_query)
        .to_string()
}
