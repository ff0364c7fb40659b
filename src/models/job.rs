//! Queue job payloads.
//!
//! Jobs carry plain data and an explicit `kind` tag; workers map the tag to a
//! handler through a fixed dispatch table rather than shipping callables.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Time a queued job may wait before it is abandoned.
pub const DEFAULT_JOB_TTL: Duration = Duration::from_secs(86_400);
/// Time a finished job's result is retained.
pub const DEFAULT_JOB_RESULT_TTL: Duration = Duration::from_secs(1);

/// Recursive crawl work unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlJob {
    pub target_url: String,
    pub parent_id: Option<String>,
    /// Remaining fan-out budget. Zero means fetch and persist, no children.
    pub remaining_depth: u32,
    pub is_onion: bool,
    pub in_scope: bool,
    pub use_proxy: bool,
    pub re_crawl: bool,
}

/// Deferred screenshot of a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureJob {
    pub url: String,
    pub capture_id: String,
}

/// Every job type a worker knows how to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    Crawl(CrawlJob),
    Capture(CaptureJob),
}

impl JobKind {
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::Crawl(_) => "crawl",
            JobKind::Capture(_) => "capture",
        }
    }

    /// URL the job operates on, for logging.
    pub fn target(&self) -> &str {
        match self {
            JobKind::Crawl(job) => &job.target_url,
            JobKind::Capture(job) => &job.url,
        }
    }
}

/// Per-job queue retention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueOptions {
    pub ttl: Duration,
    pub result_ttl: Duration,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_JOB_TTL,
            result_ttl: DEFAULT_JOB_RESULT_TTL,
        }
    }
}
