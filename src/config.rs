//! Configuration management for onionspider using the prefer crate.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::capture::{CaptureMode, SplashConfig};
use crate::models::EnqueueOptions;
use crate::queue::DEFAULT_QUEUE;
use crate::scrapers::http_client::{DEFAULT_PROXY_URL, DEFAULT_USER_AGENT};
use crate::scrapers::{FetcherConfig, RetryPolicy};
use crate::services::spider::FanOutPolicy;

/// Depth used when a caller does not ask for one.
pub const DEFAULT_CRAWL_DEPTH: u32 = 1;
/// Largest depth a caller may request.
pub const MAX_CRAWL_DEPTH: u32 = 5;

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename.
    pub database_filename: String,
    /// Directory screenshots are written to.
    pub screenshots_dir: PathBuf,
    /// SOCKS proxy for crawling (`socks5h://` resolves names at the proxy).
    pub proxy_url: String,
    /// User agent for HTTP requests ("impersonate" picks a browser UA).
    pub user_agent: String,
    /// Connect timeout in seconds.
    pub connect_timeout: u64,
    /// Total request timeout in seconds.
    pub request_timeout: u64,
    pub max_redirects: usize,
    /// Attempts per fetch before a page is reported unreachable.
    pub max_attempts: u32,
    /// Delay between attempts in milliseconds.
    pub retry_backoff_ms: u64,
    /// Worker queue broker URL (None = local DB, "redis://..." = Redis).
    pub broker_url: Option<String>,
    pub queue_name: String,
    /// Seconds a queued job may wait before it is abandoned.
    pub job_ttl: u64,
    /// Seconds a job result is kept.
    pub job_result_ttl: u64,
    /// Seconds a worker spends on one job before giving up.
    pub job_timeout: u64,
    pub worker_concurrency: usize,
    /// Idle poll interval in milliseconds.
    pub poll_interval_ms: u64,
    pub splash_url: String,
    /// Proxy Splash renders through.
    pub splash_proxy: String,
    pub capture: CaptureMode,
    pub fan_out: FanOutPolicy,
    /// Only enqueue onion links that are valid v3 addresses.
    pub strict_onion_admission: bool,
    pub default_depth: u32,
    pub max_depth: u32,
}

impl Default for Settings {
    fn default() -> Self {
        // Default to ~/Documents/onionspider/ for user data
        let data_dir = dirs::document_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
            .join("onionspider");

        Self {
            screenshots_dir: data_dir.join("screenshots"),
            data_dir,
            database_filename: "onionspider.db".to_string(),
            proxy_url: DEFAULT_PROXY_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connect_timeout: 25,
            request_timeout: 30,
            max_redirects: 10,
            max_attempts: 3,
            retry_backoff_ms: 0,
            broker_url: None, // Local DB by default
            queue_name: DEFAULT_QUEUE.to_string(),
            job_ttl: 86_400,
            job_result_ttl: 1,
            job_timeout: 300,
            worker_concurrency: 4,
            poll_interval_ms: 1000,
            splash_url: "http://splash:8050".to_string(),
            splash_proxy: "socks5://tor:9050".to_string(),
            capture: CaptureMode::Direct,
            fan_out: FanOutPolicy::Decrement,
            strict_onion_admission: false,
            default_depth: DEFAULT_CRAWL_DEPTH,
            max_depth: MAX_CRAWL_DEPTH,
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            screenshots_dir: data_dir.join("screenshots"),
            data_dir,
            ..Default::default()
        }
    }

    /// Get the full path to the database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    /// Ensure all directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        fs::create_dir_all(&self.screenshots_dir)?;
        Ok(())
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            proxy_url: self.proxy_url.clone(),
            user_agent: Some(self.user_agent.clone()),
            connect_timeout: Duration::from_secs(self.connect_timeout),
            request_timeout: Duration::from_secs(self.request_timeout),
            max_redirects: self.max_redirects,
            retry: RetryPolicy::new(
                self.max_attempts,
                Duration::from_millis(self.retry_backoff_ms),
            ),
        }
    }

    pub fn enqueue_options(&self) -> EnqueueOptions {
        EnqueueOptions {
            ttl: Duration::from_secs(self.job_ttl),
            result_ttl: Duration::from_secs(self.job_result_ttl),
        }
    }

    pub fn splash_config(&self) -> SplashConfig {
        SplashConfig {
            endpoint: self.splash_url.clone(),
            render_proxy: self.splash_proxy.clone(),
            output_dir: self.screenshots_dir.clone(),
            ..Default::default()
        }
    }

    /// Clamp a requested depth to `max_depth`, or use the default.
    pub fn effective_depth(&self, requested: Option<u32>) -> u32 {
        requested.unwrap_or(self.default_depth).min(self.max_depth)
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Target directory for data.
    #[serde(default)]
    pub target: Option<String>,
    /// Database filename.
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub proxy_url: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub connect_timeout: Option<u64>,
    #[serde(default)]
    pub request_timeout: Option<u64>,
    #[serde(default)]
    pub max_redirects: Option<usize>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub retry_backoff_ms: Option<u64>,
    /// Worker queue broker URL.
    /// - None or "database": Use local SQLite database
    /// - "redis://host:port": Use Redis
    #[serde(default)]
    pub broker_url: Option<String>,
    #[serde(default)]
    pub queue_name: Option<String>,
    #[serde(default)]
    pub job_ttl: Option<u64>,
    #[serde(default)]
    pub job_result_ttl: Option<u64>,
    #[serde(default)]
    pub job_timeout: Option<u64>,
    #[serde(default)]
    pub worker_concurrency: Option<usize>,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    #[serde(default)]
    pub splash_url: Option<String>,
    #[serde(default)]
    pub splash_proxy: Option<String>,
    /// "direct", "queued" or "disabled".
    #[serde(default)]
    pub capture: Option<String>,
    /// "decrement" or "replicate".
    #[serde(default)]
    pub fan_out: Option<String>,
    #[serde(default)]
    pub strict_onion_admission: Option<bool>,
    #[serde(default)]
    pub default_depth: Option<u32>,
    #[serde(default)]
    pub max_depth: Option<u32>,
}

impl Config {
    /// Load configuration using prefer crate.
    /// Automatically discovers onionspider config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("onionspider").await {
            Ok(pref_config) => Config {
                target: pref_config.get("target").ok(),
                database: pref_config.get("database").ok(),
                proxy_url: pref_config.get("proxy_url").ok(),
                user_agent: pref_config.get("user_agent").ok(),
                connect_timeout: pref_config.get("connect_timeout").ok(),
                request_timeout: pref_config.get("request_timeout").ok(),
                max_redirects: pref_config.get("max_redirects").ok(),
                max_attempts: pref_config.get("max_attempts").ok(),
                retry_backoff_ms: pref_config.get("retry_backoff_ms").ok(),
                broker_url: pref_config.get("broker_url").ok(),
                queue_name: pref_config.get("queue_name").ok(),
                job_ttl: pref_config.get("job_ttl").ok(),
                job_result_ttl: pref_config.get("job_result_ttl").ok(),
                job_timeout: pref_config.get("job_timeout").ok(),
                worker_concurrency: pref_config.get("worker_concurrency").ok(),
                poll_interval_ms: pref_config.get("poll_interval_ms").ok(),
                splash_url: pref_config.get("splash_url").ok(),
                splash_proxy: pref_config.get("splash_proxy").ok(),
                capture: pref_config.get("capture").ok(),
                fan_out: pref_config.get("fan_out").ok(),
                strict_onion_admission: pref_config.get("strict_onion_admission").ok(),
                default_depth: pref_config.get("default_depth").ok(),
                max_depth: pref_config.get("max_depth").ok(),
            },
            Err(_) => {
                // No config file found, use defaults
                Self::default()
            }
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings) {
        if let Some(ref target) = self.target {
            let path = shellexpand::tilde(target);
            settings.data_dir = PathBuf::from(path.as_ref());
            settings.screenshots_dir = settings.data_dir.join("screenshots");
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(ref proxy) = self.proxy_url {
            settings.proxy_url = proxy.clone();
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = user_agent.clone();
        }
        if let Some(timeout) = self.connect_timeout {
            settings.connect_timeout = timeout;
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(redirects) = self.max_redirects {
            settings.max_redirects = redirects;
        }
        if let Some(attempts) = self.max_attempts {
            settings.max_attempts = attempts.max(1);
        }
        if let Some(backoff) = self.retry_backoff_ms {
            settings.retry_backoff_ms = backoff;
        }
        if let Some(ref broker) = self.broker_url {
            settings.broker_url = Some(broker.clone());
        }
        if let Some(ref queue) = self.queue_name {
            settings.queue_name = queue.clone();
        }
        if let Some(ttl) = self.job_ttl {
            settings.job_ttl = ttl;
        }
        if let Some(ttl) = self.job_result_ttl {
            settings.job_result_ttl = ttl;
        }
        if let Some(timeout) = self.job_timeout {
            settings.job_timeout = timeout;
        }
        if let Some(concurrency) = self.worker_concurrency {
            settings.worker_concurrency = concurrency.max(1);
        }
        if let Some(interval) = self.poll_interval_ms {
            settings.poll_interval_ms = interval;
        }
        if let Some(ref splash) = self.splash_url {
            settings.splash_url = splash.clone();
        }
        if let Some(ref proxy) = self.splash_proxy {
            settings.splash_proxy = proxy.clone();
        }
        if let Some(ref mode) = self.capture {
            match mode.parse::<CaptureMode>() {
                Ok(mode) => settings.capture = mode,
                Err(e) => warn!("Ignoring capture setting: {}", e),
            }
        }
        if let Some(ref policy) = self.fan_out {
            match policy.parse::<FanOutPolicy>() {
                Ok(policy) => settings.fan_out = policy,
                Err(e) => warn!("Ignoring fan_out setting: {}", e),
            }
        }
        if let Some(strict) = self.strict_onion_admission {
            settings.strict_onion_admission = strict;
        }
        if let Some(max) = self.max_depth {
            settings.max_depth = max;
        }
        if let Some(depth) = self.default_depth {
            settings.default_depth = depth.min(settings.max_depth);
        }
    }
}

/// Load settings from config file, falling back to defaults.
pub async fn load_settings() -> Settings {
    let config = Config::load().await;
    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings);
    settings
}
