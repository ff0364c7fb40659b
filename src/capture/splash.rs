//! Splash render client.
//!
//! Splash fetches the page itself, through Tor, and returns a PNG.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use super::{CaptureError, ScreenshotCapture};

/// Configuration for the Splash client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplashConfig {
    /// Splash base URL (default: http://splash:8050)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Proxy Splash should render through (default: socks5://tor:9050)
    #[serde(default = "default_render_proxy")]
    pub render_proxy: String,
    /// Directory screenshots are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Render timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_endpoint() -> String {
    "http://splash:8050".to_string()
}
fn default_render_proxy() -> String {
    "socks5://tor:9050".to_string()
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("screenshots")
}
fn default_timeout_secs() -> u64 {
    60
}

impl Default for SplashConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            render_proxy: default_render_proxy(),
            output_dir: default_output_dir(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl SplashConfig {
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn with_output_dir(mut self, dir: PathBuf) -> Self {
        self.output_dir = dir;
        self
    }

    /// `render.png` URL for `target`.
    pub fn render_url(&self, target: &str) -> Result<Url, CaptureError> {
        let base = format!("{}/render.png", self.endpoint.trim_end_matches('/'));
        let mut url = Url::parse(&base).map_err(|e| CaptureError::Endpoint(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("url", target)
            .append_pair("proxy", &self.render_proxy);
        Ok(url)
    }
}

/// Screenshot client for a Splash instance.
pub struct SplashCapture {
    client: Client,
    config: SplashConfig,
}

impl SplashCapture {
    pub fn new(config: SplashConfig) -> Result<Self, CaptureError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .no_proxy()
            .build()
            .map_err(|e| CaptureError::Request(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Where the screenshot for `capture_id` is written.
    pub fn screenshot_path(&self, capture_id: &str) -> PathBuf {
        self.config.output_dir.join(format!("{}.png", capture_id))
    }
}

#[async_trait]
impl ScreenshotCapture for SplashCapture {
    async fn capture(&self, url: &str, capture_id: &str) -> Result<(), CaptureError> {
        let render_url = self.config.render_url(url)?;
        debug!("Requesting screenshot of {} from {}", url, self.config.endpoint);

        let response = self
            .client
            .get(render_url)
            .send()
            .await
            .map_err(|e| CaptureError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CaptureError::Status(response.status().as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CaptureError::Request(e.to_string()))?;

        tokio::fs::create_dir_all(&self.config.output_dir).await?;
        let path = self.screenshot_path(capture_id);
        tokio::fs::write(&path, &bytes).await?;

        info!("Saved screenshot of {} to {}", url, path.display());
        Ok(())
    }
}
