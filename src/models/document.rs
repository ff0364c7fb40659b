//! Persisted crawl document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use super::content::{CryptoAddresses, ExtractedContent, LinkRef};

/// A page as stored in the document store, keyed by URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlDocument {
    /// Store identity. Empty until the store assigns one.
    pub id: String,
    pub url: String,
    /// Host (and port, when explicit) of `url`.
    pub netloc: String,
    pub status: Option<u16>,
    pub seen_time: DateTime<Utc>,
    /// Identity of the document this page was discovered on.
    pub parent: Option<String>,
    pub html: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub emails: Vec<String>,
    pub pgp_keys: Vec<String>,
    pub links: Vec<LinkRef>,
    pub images: Vec<String>,
    pub addresses: CryptoAddresses,
    pub capture_id: Option<String>,
    pub is_onion: bool,
    pub in_scope: bool,
}

impl CrawlDocument {
    /// A document with only the fetch metadata and no content.
    pub fn minimal(
        url: &str,
        status: Option<u16>,
        seen_time: DateTime<Utc>,
        parent: Option<String>,
        is_onion: bool,
        in_scope: bool,
    ) -> Self {
        Self {
            id: String::new(),
            url: url.to_string(),
            netloc: netloc_of(url),
            status,
            seen_time,
            parent,
            html: None,
            title: None,
            body: None,
            emails: Vec::new(),
            pgp_keys: Vec::new(),
            links: Vec::new(),
            images: Vec::new(),
            addresses: CryptoAddresses::default(),
            capture_id: None,
            is_onion,
            in_scope,
        }
    }

    /// Attach the raw HTML and everything extracted from it.
    pub fn with_content(mut self, html: String, content: ExtractedContent) -> Self {
        self.html = Some(html);
        self.title = content.title;
        self.body = content.body_text;
        self.emails = content.emails;
        self.pgp_keys = content.pgp_keys;
        self.links = content.links;
        self.images = content.images;
        self.addresses = content.addresses;
        self
    }

    pub fn with_capture_id(mut self, capture_id: Option<String>) -> Self {
        self.capture_id = capture_id;
        self
    }
}

/// `host[:port]` of a URL, or an empty string when it has no host.
pub fn netloc_of(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            _ => String::new(),
        },
        Err(_) => String::new(),
    }
}
