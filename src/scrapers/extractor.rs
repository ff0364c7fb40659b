//! HTML content extraction.
//!
//! Every accessor is independent and tolerant of malformed markup: a missing
//! element yields `None` or an empty list, never an error.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use crate::models::{CryptoAddresses, ExtractedContent, LinkRef};

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\w.-]+@[\w.-]+").expect("hardcoded regex pattern is valid"));

static PGP_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)-----BEGIN PGP PUBLIC KEY BLOCK-----.*?-----END PGP PUBLIC KEY BLOCK-----")
        .expect("hardcoded regex pattern is valid")
});

static BITCOIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[13][a-km-zA-HJ-NP-Z1-9]{25,34}").expect("hardcoded regex pattern is valid")
});

static ETHEREUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"0x[a-fA-F0-9]{40}").expect("hardcoded regex pattern is valid"));

static MONERO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"4[0-9AB][1-9A-HJ-NP-Za-km-z]{93}").expect("hardcoded regex pattern is valid")
});

static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("hardcoded selector is valid"));
static BODY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("hardcoded selector is valid"));
static ANCHORS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href], area[href]").expect("hardcoded selector is valid"));
static IMAGES: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img[src]").expect("hardcoded selector is valid"));

/// Parsed page plus the URL it was fetched from.
///
/// Holds a `scraper::Html`, which is not `Send`; build it, read what you need
/// and drop it before the next `.await`.
pub struct Extractor {
    base: Option<Url>,
    raw: String,
    document: Html,
}

impl Extractor {
    pub fn new(base_url: &str, html: &str) -> Self {
        let base = match Url::parse(base_url) {
            Ok(url) => Some(url),
            Err(e) => {
                debug!("Base URL {} does not parse ({}); relative links dropped", base_url, e);
                None
            }
        };
        Self {
            base,
            raw: html.to_string(),
            document: Html::parse_document(html),
        }
    }

    /// Text of the first `<title>`, trimmed.
    pub fn title(&self) -> Option<String> {
        let title = self.document.select(&TITLE).next()?;
        let text = title.text().collect::<String>().trim().to_string();
        (!text.is_empty()).then_some(text)
    }

    /// Visible body text: every text node stripped and joined by one space.
    pub fn body(&self) -> Option<String> {
        let body = self.document.select(&BODY).next()?;
        let text = body
            .text()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        (!text.is_empty()).then_some(text)
    }

    /// Outbound links in document order, resolved and classified.
    pub fn links(&self) -> Vec<LinkRef> {
        self.document
            .select(&ANCHORS)
            .filter_map(|el| el.value().attr("href"))
            .filter_map(|href| self.classify(href))
            .collect()
    }

    /// Absolute image URLs in document order.
    pub fn img_links(&self) -> Vec<String> {
        self.document
            .select(&IMAGES)
            .filter_map(|el| el.value().attr("src"))
            .filter_map(|src| self.resolve(src))
            .map(|url| url.to_string())
            .collect()
    }

    /// Email-like tokens in the raw HTML.
    pub fn emails(&self) -> Vec<String> {
        find_unique(&EMAIL, &self.raw)
    }

    /// Armored PGP public key blocks in the raw HTML.
    pub fn pgp_keys(&self) -> Vec<String> {
        find_unique(&PGP_KEY, &self.raw)
    }

    pub fn bitcoin_addrs(&self) -> Vec<String> {
        self.body().map(|t| find_unique(&BITCOIN, &t)).unwrap_or_default()
    }

    pub fn eth_addrs(&self) -> Vec<String> {
        self.body().map(|t| find_unique(&ETHEREUM, &t)).unwrap_or_default()
    }

    pub fn monero_addrs(&self) -> Vec<String> {
        self.body().map(|t| find_unique(&MONERO, &t)).unwrap_or_default()
    }

    /// Run every accessor.
    pub fn extract(&self) -> ExtractedContent {
        let body_text = self.body();
        let addresses = match body_text.as_deref() {
            Some(text) => CryptoAddresses {
                btc: find_unique(&BITCOIN, text),
                eth: find_unique(&ETHEREUM, text),
                monero: find_unique(&MONERO, text),
            },
            None => CryptoAddresses::default(),
        };

        ExtractedContent {
            title: self.title(),
            body_text,
            links: self.links(),
            images: self.img_links(),
            emails: self.emails(),
            pgp_keys: self.pgp_keys(),
            addresses,
        }
    }

    fn resolve(&self, reference: &str) -> Option<Url> {
        let reference = reference.trim();
        let resolved = match &self.base {
            Some(base) => base.join(reference),
            None => Url::parse(reference),
        };
        match resolved {
            Ok(mut url) => {
                url.set_fragment(None);
                Some(url)
            }
            Err(e) => {
                debug!("Skipping unresolvable reference {:?}: {}", reference, e);
                None
            }
        }
    }

    fn classify(&self, href: &str) -> Option<LinkRef> {
        let url = self.resolve(href)?;
        let is_onion = url.host_str().is_some_and(|h| h.contains(".onion"));
        let in_scope = match &self.base {
            Some(base) if same_netloc(base, &url) => true,
            _ => !has_scheme(href),
        };

        Some(LinkRef {
            url: url.to_string(),
            is_onion,
            in_scope,
        })
    }
}

/// True for `scheme:...` references. Scheme-relative (`//host`), path,
/// query and fragment references have none.
fn has_scheme(reference: &str) -> bool {
    Url::parse(reference.trim()).is_ok()
}

/// Same host and explicit port, whatever the scheme.
fn same_netloc(a: &Url, b: &Url) -> bool {
    a.host_str().is_some() && a.host_str() == b.host_str() && a.port() == b.port()
}

/// All matches in first-seen order, without repeats.
fn find_unique(pattern: &Regex, haystack: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for m in pattern.find_iter(haystack) {
        let s = m.as_str();
        if !out.iter().any(|seen| seen == s) {
            out.push(s.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "http://example.onion/a/b";

    fn page(body: &str) -> String {
        format!("<html><head><title> Test page </title></head><body>{}</body></html>", body)
    }

    #[test]
    fn test_title_and_body() {
        let ex = Extractor::new(BASE, &page("<p>Hello</p>\n<p> world </p>"));
        assert_eq!(ex.title().as_deref(), Some("Test page"));
        assert_eq!(ex.body().as_deref(), Some("Hello world"));
    }

    #[test]
    fn test_missing_title_is_none() {
        let ex = Extractor::new(BASE, "<html><body></body></html>");
        assert_eq!(ex.title(), None);
        assert_eq!(ex.body(), None);
        assert!(ex.bitcoin_addrs().is_empty());
    }

    #[test]
    fn test_link_scope() {
        let html = page(
            r##"<a href="/c">c</a>
                <a href="http://other.onion/x">x</a>
                <a href="#sec1">s</a>
                <a href="d?q=1#frag">d</a>
                <a href="//elsewhere.com/y">y</a>
                <a href="http://example.onion:8080/z">z</a>
                <area href="http://example.onion/map">
                <a href="https://example.onion/s">s</a>
                <a href="mailto:admin@example.onion">m</a>"##,
        );
        let links = Extractor::new(BASE, &html).links();

        let expect = |url: &str, is_onion: bool, in_scope: bool| LinkRef {
            url: url.to_string(),
            is_onion,
            in_scope,
        };
        assert_eq!(
            links,
            vec![
                expect("http://example.onion/c", true, true),
                expect("http://other.onion/x", true, false),
                expect("http://example.onion/a/b", true, true),
                expect("http://example.onion/a/d?q=1", true, true),
                expect("http://elsewhere.com/y", false, true),
                expect("http://example.onion:8080/z", true, false),
                expect("http://example.onion/map", true, true),
                expect("https://example.onion/s", true, true),
                expect("mailto:admin@example.onion", false, false),
            ]
        );
    }

    #[test]
    fn test_scheme_relative_link_is_in_scope() {
        let html = page(r#"<a href="//elsewhere.com/y">y</a><a href="?page=2">n</a>"#);
        let links = Extractor::new(BASE, &html).links();
        assert_eq!(links[0].url, "http://elsewhere.com/y");
        assert!(links[0].in_scope);
        assert_eq!(links[1].url, "http://example.onion/a/b?page=2");
        assert!(links[1].in_scope);
    }

    #[test]
    fn test_clearnet_base() {
        let html = page(r#"<a href="https://example.com/x">x</a><a href="rel">r</a>"#);
        let links = Extractor::new("https://example.com/", &html).links();
        assert!(links.iter().all(|l| !l.is_onion && l.in_scope));
    }

    #[test]
    fn test_images_are_absolute() {
        let html = page(r#"<img src="/logo.png"><img src="http://cdn.onion/x.jpg#f"><img>"#);
        let images = Extractor::new(BASE, &html).img_links();
        assert_eq!(
            images,
            vec!["http://example.onion/logo.png", "http://cdn.onion/x.jpg"]
        );
    }

    #[test]
    fn test_emails_deduplicated_in_order() {
        let html = page(
            r#"<a href="mailto:admin@example.onion">admin@example.onion</a> b.c@d.org"#,
        );
        let emails = Extractor::new(BASE, &html).emails();
        assert_eq!(emails, vec!["admin@example.onion", "b.c@d.org"]);
    }

    #[test]
    fn test_crypto_addresses() {
        let html = page(
            "donate: 1BoatSLRHtKNngkdXEeobR76b53LETtpyT or \
             0x52908400098527886E0F7030069857D2E4169EE7",
        );
        let ex = Extractor::new(BASE, &html);
        assert!(ex
            .bitcoin_addrs()
            .contains(&"1BoatSLRHtKNngkdXEeobR76b53LETtpyT".to_string()));
        assert_eq!(
            ex.eth_addrs(),
            vec!["0x52908400098527886E0F7030069857D2E4169EE7"]
        );
        assert!(ex.monero_addrs().is_empty());
    }

    #[test]
    fn test_no_eth_address_is_empty() {
        let ex = Extractor::new(BASE, &page("nothing to see 0x1234"));
        assert_eq!(ex.eth_addrs(), Vec::<String>::new());
    }

    #[test]
    fn test_monero_address() {
        let xmr = "44AFFq5kSiGBoZ4NMDwYtN18obc8AemS33DBLWs3H7otXft3XjrpDtQGv7SqSsaBYBb98uNbr2VBBEt7f2wfn3RVGQBEP3A";
        let ex = Extractor::new(BASE, &page(&format!("xmr: {}", xmr)));
        assert_eq!(ex.monero_addrs(), vec![xmr.to_string()]);
    }

    #[test]
    fn test_pgp_key_block() {
        let key = "-----BEGIN PGP PUBLIC KEY BLOCK-----\nmQENBF\n=abcd\n-----END PGP PUBLIC KEY BLOCK-----";
        let ex = Extractor::new(BASE, &page(&format!("<pre>{}</pre>", key)));
        assert_eq!(ex.pgp_keys(), vec![key.to_string()]);
    }

    #[test]
    fn test_malformed_html_still_extracts() {
        let ex = Extractor::new(BASE, "<p><a href='/x'>x<div><b>unclosed</p></table>");
        let content = ex.extract();
        assert!(content.links.iter().any(|l| l.url == "http://example.onion/x"));
        assert!(content.emails.is_empty());
    }

    #[test]
    fn test_unparseable_base_keeps_absolute_links() {
        let html = page(r#"<a href="relative">r</a><a href="http://b.onion/">b</a>"#);
        let links = Extractor::new("not a url", &html).links();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].url, "http://b.onion/");
        assert!(!links[0].in_scope);
    }
}
