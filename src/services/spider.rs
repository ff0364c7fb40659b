//! Crawl orchestration.
//!
//! One invocation handles one URL:
//!
//! ```text
//! Start -> Fetched -> Extracted | NoContent -> Persisted -> FannedOut -> Done
//!                                        \-> Failed (store error)
//! ```
//!
//! The page is fetched, parsed, optionally screenshotted, upserted by URL and,
//! while depth remains, every discovered link becomes a new crawl job. Nothing
//! here returns an error: failures are logged and reported in [`CrawlReport`].

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::capture::{new_capture_id, ScreenshotCapture};
use crate::models::{CrawlDocument, CrawlJob, EnqueueOptions, FetchOutcome, JobKind, LinkRef};
use crate::onion::{is_onion_url, is_valid_onion_address};
use crate::queue::JobQueue;
use crate::repository::{DocumentStore, UpsertAction};
use crate::scrapers::{Extractor, Fetcher};

/// How child jobs are derived from a page's links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanOutPolicy {
    /// One job per link with `depth - 1` remaining.
    #[default]
    Decrement,
    /// One job per link for every remaining depth `0..depth`. Reproduces the
    /// legacy crawler's queue volume.
    Replicate,
}

impl FromStr for FanOutPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "decrement" => Ok(Self::Decrement),
            "replicate" => Ok(Self::Replicate),
            other => Err(format!("unknown fan-out policy: {}", other)),
        }
    }
}

impl FanOutPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decrement => "decrement",
            Self::Replicate => "replicate",
        }
    }
}

/// Input to one crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlRequest {
    pub target_url: String,
    pub parent_id: Option<String>,
    pub depth: u32,
    pub is_onion: bool,
    pub in_scope: bool,
    pub use_proxy: bool,
    pub re_crawl: bool,
}

impl CrawlRequest {
    /// A top-level crawl with no parent.
    pub fn seed(url: &str, depth: u32) -> Self {
        Self {
            target_url: url.to_string(),
            parent_id: None,
            depth,
            is_onion: is_onion_url(url),
            in_scope: true,
            use_proxy: true,
            re_crawl: true,
        }
    }

    pub fn with_proxy(mut self, use_proxy: bool) -> Self {
        self.use_proxy = use_proxy;
        self
    }

    pub fn with_re_crawl(mut self, re_crawl: bool) -> Self {
        self.re_crawl = re_crawl;
        self
    }
}

impl From<CrawlJob> for CrawlRequest {
    fn from(job: CrawlJob) -> Self {
        Self {
            target_url: job.target_url,
            parent_id: job.parent_id,
            depth: job.remaining_depth,
            is_onion: job.is_onion,
            in_scope: job.in_scope,
            use_proxy: job.use_proxy,
            re_crawl: job.re_crawl,
        }
    }
}

impl From<CrawlRequest> for CrawlJob {
    fn from(request: CrawlRequest) -> Self {
        Self {
            target_url: request.target_url,
            parent_id: request.parent_id,
            remaining_depth: request.depth,
            is_onion: request.is_onion,
            in_scope: request.in_scope,
            use_proxy: request.use_proxy,
            re_crawl: request.re_crawl,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlState {
    Start,
    Fetched,
    Extracted,
    NoContent,
    Persisted,
    FannedOut,
    Done,
    Failed,
}

/// What happened during one crawl.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    pub url: String,
    pub document_id: Option<String>,
    pub status: Option<u16>,
    pub outcome: Option<FetchOutcome>,
    pub action: Option<&'static str>,
    pub capture_id: Option<String>,
    pub children_enqueued: usize,
    pub children_failed: usize,
    pub state: CrawlState,
}

impl CrawlReport {
    fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            document_id: None,
            status: None,
            outcome: None,
            action: None,
            capture_id: None,
            children_enqueued: 0,
            children_failed: 0,
            state: CrawlState::Start,
        }
    }
}

/// Knobs for the orchestrator.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpiderOptions {
    pub fan_out: FanOutPolicy,
    pub strict_onion_admission: bool,
    pub enqueue: EnqueueOptions,
}

/// Child jobs for `links` discovered on the page `parent_id`.
///
/// Links are deduplicated by URL and limited to http(s). With `strict`, onion
/// links must be valid v3 addresses.
pub fn plan_fan_out(
    request: &CrawlRequest,
    parent_id: &str,
    links: &[LinkRef],
    policy: FanOutPolicy,
    strict: bool,
) -> Vec<CrawlJob> {
    if request.depth == 0 {
        return Vec::new();
    }

    let mut seen = HashSet::new();
    let admitted: Vec<&LinkRef> = links
        .iter()
        .filter(|link| {
            let crawlable = Url::parse(&link.url)
                .map(|u| matches!(u.scheme(), "http" | "https"))
                .unwrap_or(false);
            if !crawlable {
                return false;
            }
            if strict && link.is_onion && !is_valid_onion_address(&link.url) {
                debug!("Not admitting {}: not a v3 onion address", link.url);
                return false;
            }
            seen.insert(link.url.as_str())
        })
        .collect();

    let depths: Vec<u32> = match policy {
        FanOutPolicy::Decrement => vec![request.depth - 1],
        FanOutPolicy::Replicate => (0..request.depth).collect(),
    };

    depths
        .into_iter()
        .flat_map(|remaining| {
            admitted.iter().map(move |link| CrawlJob {
                target_url: link.url.clone(),
                parent_id: Some(parent_id.to_string()),
                remaining_depth: remaining,
                is_onion: link.is_onion,
                in_scope: link.in_scope,
                use_proxy: request.use_proxy,
                re_crawl: request.re_crawl,
            })
        })
        .collect()
}

/// The crawl orchestrator.
#[derive(Clone)]
pub struct Spider {
    fetcher: Fetcher,
    store: Arc<dyn DocumentStore>,
    queue: Arc<dyn JobQueue>,
    capture: Option<Arc<dyn ScreenshotCapture>>,
    options: SpiderOptions,
}

impl Spider {
    pub fn new(
        fetcher: Fetcher,
        store: Arc<dyn DocumentStore>,
        queue: Arc<dyn JobQueue>,
        capture: Option<Arc<dyn ScreenshotCapture>>,
        options: SpiderOptions,
    ) -> Self {
        Self {
            fetcher,
            store,
            queue,
            capture,
            options,
        }
    }

    /// Crawl one URL and return the stored document's identity, or `None` if
    /// it could not be persisted.
    pub async fn crawl(&self, request: CrawlRequest) -> Option<String> {
        self.crawl_report(request).await.document_id
    }

    /// Crawl one URL and report every step.
    pub async fn crawl_report(&self, request: CrawlRequest) -> CrawlReport {
        let mut report = CrawlReport::new(&request.target_url);

        let fetched = self
            .fetcher
            .fetch(&request.target_url, request.use_proxy)
            .await;
        report.state = CrawlState::Fetched;
        report.status = fetched.status;
        report.outcome = Some(fetched.outcome);

        let minimal = CrawlDocument::minimal(
            &request.target_url,
            fetched.status,
            fetched.observed_at,
            request.parent_id.clone(),
            request.is_onion,
            request.in_scope,
        );

        let mut links = Vec::new();
        let has_content = fetched.has_content();
        let mut document = match fetched.body {
            Some(html) if has_content => {
                let content = Extractor::new(&fetched.url, &html).extract();
                links = content.links.clone();
                report.state = CrawlState::Extracted;
                debug!(
                    "{}: {} link(s), {} image(s), {} email(s)",
                    request.target_url,
                    content.links.len(),
                    content.images.len(),
                    content.emails.len()
                );
                if !content.addresses.is_empty() {
                    info!(
                        "{}: {} btc, {} eth, {} xmr address(es)",
                        request.target_url,
                        content.addresses.btc.len(),
                        content.addresses.eth.len(),
                        content.addresses.monero.len()
                    );
                }
                minimal.with_content(html, content)
            }
            _ => {
                report.state = CrawlState::NoContent;
                minimal
            }
        };

        if fetched.status == Some(200) {
            if let Some(capture) = &self.capture {
                let capture_id = new_capture_id();
                if let Err(e) = capture.capture(&request.target_url, &capture_id).await {
                    warn!("Screenshot of {} failed: {}", request.target_url, e);
                }
                document = document.with_capture_id(Some(capture_id.clone()));
                report.capture_id = Some(capture_id);
            }
        }

        let outcome = match self.store.upsert_by_url(&document, request.re_crawl).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Failed to persist {}: {}", request.target_url, e);
                report.state = CrawlState::Failed;
                return report;
            }
        };
        report.state = CrawlState::Persisted;
        report.document_id = Some(outcome.id.clone());
        report.action = Some(outcome.action.as_str());
        if outcome.action != UpsertAction::Unchanged {
            info!(
                "{} {} (status {:?}) as {}",
                outcome.action.as_str(),
                request.target_url,
                fetched.status,
                outcome.id
            );
        }

        if request.depth > 0 && !links.is_empty() {
            let children = plan_fan_out(
                &request,
                &outcome.id,
                &links,
                self.options.fan_out,
                self.options.strict_onion_admission,
            );
            for child in children {
                let target = child.target_url.clone();
                match self
                    .queue
                    .enqueue(&JobKind::Crawl(child), self.options.enqueue)
                    .await
                {
                    Ok(_) => report.children_enqueued += 1,
                    Err(e) => {
                        warn!("Failed to enqueue {}: {}", target, e);
                        report.children_failed += 1;
                    }
                }
            }
            report.state = CrawlState::FannedOut;
            info!(
                "{}: enqueued {} child job(s) at depth {}",
                request.target_url, report.children_enqueued, request.depth
            );
        }

        report.state = CrawlState::Done;
        report
    }
}
