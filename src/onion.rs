//! Onion address helpers used when admitting URLs into the crawl.
//!
//! The extractor only flags hosts that *look* like onions. These helpers are
//! the strict check applied to seeds and, optionally, to fan-out.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Length of a v3 onion service label.
pub const ONION_V3_LABEL_LEN: usize = 56;

static ONION_IN_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:https?://)?(?:www\.)?([A-Za-z0-9.\-]*?[a-z2-7]{16,56}\.onion)\b")
        .expect("hardcoded regex pattern is valid")
});

/// True when `host` (or the host of `url`) is a v3 onion address.
///
/// Accepts either a bare hostname or a full URL. Subdomains are allowed; the
/// label directly before `.onion` must be 56 base32 characters.
pub fn is_valid_onion_address(candidate: &str) -> bool {
    let host = Url::parse(candidate)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| {
            candidate
                .split(['/', ':'])
                .next()
                .unwrap_or_default()
                .to_ascii_lowercase()
        });

    let Some(stem) = host.strip_suffix(".onion") else {
        return false;
    };
    let label = stem.rsplit('.').next().unwrap_or(stem);
    label.len() == ONION_V3_LABEL_LEN
        && label
            .bytes()
            .all(|b| b.is_ascii_lowercase() || (b'2'..=b'7').contains(&b))
}

/// True when the host of `url` looks like an onion service. A heuristic,
/// not a validity check.
pub fn is_onion_url(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.contains(".onion")))
        .unwrap_or(false)
}

/// Give a scheme-less seed an `http://` prefix and trim it.
///
/// Returns `None` when the result still does not parse as an http(s) URL.
pub fn normalize_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };
    let parsed = Url::parse(&candidate).ok()?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Some(parsed.to_string()),
        _ => None,
    }
}

/// Pull onion hostnames out of free text, in order of first appearance.
pub fn extract_onions(text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for caps in ONION_IN_TEXT.captures_iter(text) {
        if let Some(host) = caps.get(1) {
            let host = host.as_str().trim_start_matches('.').to_ascii_lowercase();
            if !found.contains(&host) {
                found.push(host);
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    const V3: &str = "duckduckgogg42xjoc72x3sjasowoarfbgcmvfimaftt6twagswzczad";

    #[test]
    fn test_v3_is_valid() {
        assert!(is_valid_onion_address(&format!("{}.onion", V3)));
        assert!(is_valid_onion_address(&format!("http://{}.onion/path?q=1", V3)));
        assert!(is_valid_onion_address(&format!("www.{}.onion", V3)));
    }

    #[test]
    fn test_short_or_clearnet_is_invalid() {
        assert!(!is_valid_onion_address("example.onion"));
        assert!(!is_valid_onion_address("http://expyuzz4wqqyqhjn.onion/"));
        assert!(!is_valid_onion_address("https://example.com/"));
        assert!(!is_valid_onion_address(""));
    }

    #[test]
    fn test_normalize_adds_scheme() {
        assert_eq!(
            normalize_url("example.onion").as_deref(),
            Some("http://example.onion/")
        );
        assert_eq!(
            normalize_url("  https://example.com/a ").as_deref(),
            Some("https://example.com/a")
        );
        assert_eq!(normalize_url(""), None);
        assert_eq!(normalize_url("ftp://example.com/"), None);
    }

    #[test]
    fn test_onion_url_checks_host_only() {
        assert!(is_onion_url("http://example.onion/"));
        assert!(!is_onion_url("https://example.com/mirror.onion.html"));
        assert!(!is_onion_url("not a url"));
    }

    #[test]
    fn test_extract_onions_from_text() {
        let text = format!(
            "mirror at http://{v3}.onion/ and also {v3}.onion, old: expyuzz4wqqyqhjn.onion",
            v3 = V3
        );
        let found = extract_onions(&text);
        assert_eq!(
            found,
            vec![format!("{}.onion", V3), "expyuzz4wqqyqhjn.onion".to_string()]
        );
    }
}
