//! Screenshot side-channel.
//!
//! The crawler hands every successfully fetched page to a
//! [`ScreenshotCapture`] together with an opaque capture id; failures are
//! logged by the caller and never block persistence.

mod splash;

pub use splash::{SplashCapture, SplashConfig};

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::models::{CaptureJob, EnqueueOptions, JobKind};
use crate::queue::JobQueue;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("render request failed: {0}")]
    Request(String),
    #[error("render service returned status {0}")]
    Status(u16),
    #[error("failed to write screenshot: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to queue capture: {0}")]
    Queue(String),
    #[error("invalid render endpoint: {0}")]
    Endpoint(String),
}

/// Takes a screenshot of `url` and files it under `capture_id`.
#[async_trait]
pub trait ScreenshotCapture: Send + Sync {
    async fn capture(&self, url: &str, capture_id: &str) -> Result<(), CaptureError>;
}

/// How screenshots are taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// Render inline during the crawl.
    #[default]
    Direct,
    /// Enqueue a capture job for a worker.
    Queued,
    Disabled,
}

impl FromStr for CaptureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "queued" => Ok(Self::Queued),
            "disabled" | "off" | "none" => Ok(Self::Disabled),
            other => Err(format!("unknown capture mode: {}", other)),
        }
    }
}

/// Fresh opaque capture id: a v4 UUID in simple hex form.
pub fn new_capture_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Defers the screenshot to a worker by enqueueing a capture job.
pub struct QueuedCapture {
    queue: Arc<dyn JobQueue>,
    options: EnqueueOptions,
}

impl QueuedCapture {
    pub fn new(queue: Arc<dyn JobQueue>, options: EnqueueOptions) -> Self {
        Self { queue, options }
    }
}

#[async_trait]
impl ScreenshotCapture for QueuedCapture {
    async fn capture(&self, url: &str, capture_id: &str) -> Result<(), CaptureError> {
        let job = JobKind::Capture(CaptureJob {
            url: url.to_string(),
            capture_id: capture_id.to_string(),
        });
        let job_id = self
            .queue
            .enqueue(&job, self.options)
            .await
            .map_err(|e| CaptureError::Queue(e.to_string()))?;
        debug!("Queued capture {} for {} as job {}", capture_id, url, job_id);
        Ok(())
    }
}
