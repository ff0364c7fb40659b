//! Proxied HTTP fetcher with bounded retries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONNECTION};
use reqwest::{redirect, Client, Proxy, StatusCode};
use thiserror::Error;
use tracing::{debug, error, warn};

use super::retry::RetryPolicy;
use crate::models::FetchResult;

/// Tor Browser 6 (Firefox 45 ESR) user agent.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 6.1; rv:45.0) Gecko/20100101 Firefox/45.0";

/// Default Tor SOCKS endpoint. `socks5h` makes the proxy resolve hostnames.
pub const DEFAULT_PROXY_URL: &str = "socks5h://127.0.0.1:9050";

/// Real browser user agents for impersonate mode.
const IMPERSONATE_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:128.0) Gecko/20100101 Firefox/128.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:115.0) Gecko/20100101 Firefox/115.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
];

fn random_user_agent() -> &'static str {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as usize)
        .unwrap_or(0);
    IMPERSONATE_USER_AGENTS[nanos % IMPERSONATE_USER_AGENTS.len()]
}

/// Resolve user agent from config value.
/// - None => Tor Browser default
/// - "impersonate" => random modern browser user agent
/// - other => custom user agent string
pub fn resolve_user_agent(config: Option<&str>) -> String {
    match config {
        None => DEFAULT_USER_AGENT.to_string(),
        Some("impersonate") => random_user_agent().to_string(),
        Some(custom) => custom.to_string(),
    }
}

/// Errors raised below the fetcher. None of them escape `Fetcher::fetch`.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("response body is not valid UTF-8: {0}")]
    Decode(String),
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// What came back over the wire for one attempt.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub final_url: String,
    pub status: u16,
    /// Raw bytes, only read for 200 responses.
    pub body: Option<Vec<u8>>,
}

/// One GET request, with or without the proxy.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str, use_proxy: bool) -> Result<RawResponse, FetchError>;
}

/// Fetcher settings.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub proxy_url: String,
    /// See [`resolve_user_agent`].
    pub user_agent: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_redirects: usize,
    pub retry: RetryPolicy,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            proxy_url: DEFAULT_PROXY_URL.to_string(),
            user_agent: None,
            connect_timeout: Duration::from_secs(25),
            request_timeout: Duration::from_secs(30),
            max_redirects: 10,
            retry: RetryPolicy::default(),
        }
    }
}

/// reqwest transport holding one proxied and one direct client.
#[derive(Clone)]
pub struct ReqwestTransport {
    proxied: Client,
    direct: Client,
}

impl ReqwestTransport {
    pub fn new(config: &FetcherConfig) -> Result<Self, FetchError> {
        let proxy =
            Proxy::all(&config.proxy_url).map_err(|e| FetchError::Client(e.to_string()))?;
        let proxied = Self::builder(config)
            .proxy(proxy)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        let direct = Self::builder(config)
            .no_proxy()
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { proxied, direct })
    }

    fn builder(config: &FetcherConfig) -> reqwest::ClientBuilder {
        let user_agent = resolve_user_agent(config.user_agent.as_deref());
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("close"));

        Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .redirect(redirect::Policy::limited(config.max_redirects))
            .gzip(true)
            .brotli(true)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str, use_proxy: bool) -> Result<RawResponse, FetchError> {
        let client = if use_proxy { &self.proxied } else { &self.direct };
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        let final_url = response.url().to_string();
        let body = if status == StatusCode::OK {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| FetchError::Transport(e.to_string()))?;
            Some(bytes.to_vec())
        } else {
            None
        };

        Ok(RawResponse {
            final_url,
            status: status.as_u16(),
            body,
        })
    }
}

/// Fetches a URL, retrying transport failures per the retry policy.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// Build a fetcher backed by reqwest.
    pub fn from_config(config: &FetcherConfig) -> Result<Self, FetchError> {
        let transport = ReqwestTransport::new(config)?;
        Ok(Self::new(Arc::new(transport), config.retry))
    }

    /// GET `url`. Never fails: unreachable hosts and undecodable bodies are
    /// reported as status 503 with no body.
    pub async fn fetch(&self, url: &str, use_proxy: bool) -> FetchResult {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.transport.get(url, use_proxy).await {
                Ok(response) => return Self::classify(url, response, attempt),
                Err(e) => {
                    if !self.policy.allows_retry(attempt) {
                        error!(
                            "Giving up on {} after {} attempt(s): {}",
                            url, attempt, e
                        );
                        return FetchResult::unreachable(url, attempt);
                    }
                    warn!(
                        "Attempt {}/{} for {} failed: {}",
                        attempt, self.policy.max_attempts, url, e
                    );
                    if let Some(delay) = self.policy.delay() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    fn classify(requested: &str, response: RawResponse, attempts: u32) -> FetchResult {
        let final_url = if response.final_url.is_empty() {
            requested.to_string()
        } else {
            response.final_url
        };

        if response.status != 200 {
            debug!("{} answered {}", final_url, response.status);
            return FetchResult::status_only(final_url, response.status, attempts);
        }

        let bytes = response.body.unwrap_or_default();
        match decode_body(bytes) {
            Ok(text) => FetchResult::success(final_url, text, attempts),
            Err(e) => {
                warn!("{}: {}", final_url, e);
                FetchResult::undecodable(final_url, attempts)
            }
        }
    }
}

fn decode_body(bytes: Vec<u8>) -> Result<String, FetchError> {
    String::from_utf8(bytes).map_err(|e| FetchError::Decode(e.utf8_error().to_string()))
}
