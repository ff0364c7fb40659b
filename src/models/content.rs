use serde::{Deserialize, Serialize};

/// A link discovered on a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRef {
    /// Absolute URL with the fragment removed.
    pub url: String,
    /// The resolved host contains `.onion`. Not a validity check.
    pub is_onion: bool,
    /// The link stays on the page's authority.
    pub in_scope: bool,
}

/// Cryptocurrency addresses found in the page text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoAddresses {
    #[serde(default)]
    pub btc: Vec<String>,
    #[serde(default)]
    pub eth: Vec<String>,
    #[serde(default)]
    pub monero: Vec<String>,
}

impl CryptoAddresses {
    pub fn is_empty(&self) -> bool {
        self.btc.is_empty() && self.eth.is_empty() && self.monero.is_empty()
    }
}

/// Everything pulled out of one HTML page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub title: Option<String>,
    pub body_text: Option<String>,
    pub links: Vec<LinkRef>,
    pub images: Vec<String>,
    pub emails: Vec<String>,
    pub pgp_keys: Vec<String>,
    pub addresses: CryptoAddresses,
}
