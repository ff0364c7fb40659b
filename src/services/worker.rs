//! Queue worker.
//!
//! Pulls jobs off the queue and runs them through a fixed dispatch table keyed
//! by [`JobKind`]. Several polling loops share one worker; each finishes its
//! current job before honoring shutdown.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::spider::{CrawlRequest, CrawlState, Spider};
use crate::capture::ScreenshotCapture;
use crate::models::JobKind;
use crate::queue::{JobOutcome, JobQueue, QueueError, QueuedJob};

/// Worker tuning.
#[derive(Debug, Clone, Copy)]
pub struct WorkerOptions {
    pub concurrency: usize,
    pub job_timeout: Duration,
    pub poll_interval: Duration,
    pub purge_interval: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            job_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(1),
            purge_interval: Duration::from_secs(60),
        }
    }
}

/// Summary of one processed job.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job_id: String,
    pub kind: &'static str,
    pub succeeded: bool,
}

pub struct Worker {
    spider: Spider,
    renderer: Option<Arc<dyn ScreenshotCapture>>,
    queue: Arc<dyn JobQueue>,
    options: WorkerOptions,
}

impl Worker {
    /// `renderer` runs capture jobs; without one they fail.
    pub fn new(
        spider: Spider,
        renderer: Option<Arc<dyn ScreenshotCapture>>,
        queue: Arc<dyn JobQueue>,
        options: WorkerOptions,
    ) -> Self {
        Self {
            spider,
            renderer,
            queue,
            options,
        }
    }

    /// Claim and run one job. `Ok(None)` when the queue is empty.
    pub async fn run_once(&self) -> Result<Option<JobReport>, QueueError> {
        let Some(QueuedJob { id, job, enqueued_at }) = self.queue.dequeue().await? else {
            return Ok(None);
        };
        let kind = job.name();
        debug!(
            "Job {} ({} {}) waited {}s",
            id,
            kind,
            job.target(),
            (chrono::Utc::now() - enqueued_at).num_seconds()
        );

        let outcome = match tokio::time::timeout(self.options.job_timeout, self.dispatch(&job)).await
        {
            Ok(Ok(result)) => JobOutcome::Finished(result),
            Ok(Err(message)) => JobOutcome::Failed(message),
            Err(_) => {
                warn!(
                    "Job {} ({}) timed out after {}s",
                    id,
                    job.target(),
                    self.options.job_timeout.as_secs()
                );
                JobOutcome::Failed(format!(
                    "timed out after {}s",
                    self.options.job_timeout.as_secs()
                ))
            }
        };

        let succeeded = matches!(outcome, JobOutcome::Finished(_));
        self.queue.complete(&id, outcome).await?;
        Ok(Some(JobReport {
            job_id: id,
            kind,
            succeeded,
        }))
    }

    async fn dispatch(&self, job: &JobKind) -> Result<serde_json::Value, String> {
        match job {
            JobKind::Crawl(crawl) => {
                let report = self
                    .spider
                    .crawl_report(CrawlRequest::from(crawl.clone()))
                    .await;
                if report.state == CrawlState::Failed {
                    return Err(format!("crawl of {} failed", report.url));
                }
                serde_json::to_value(&report).map_err(|e| e.to_string())
            }
            JobKind::Capture(capture) => {
                let renderer = self
                    .renderer
                    .as_ref()
                    .ok_or_else(|| "no screenshot renderer configured".to_string())?;
                renderer
                    .capture(&capture.url, &capture.capture_id)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(json!({ "url": capture.url, "capture_id": capture.capture_id }))
            }
        }
    }

    /// Process jobs until the queue is empty. Returns how many ran.
    pub async fn drain(&self) -> Result<usize, QueueError> {
        let mut processed = 0;
        while self.run_once().await?.is_some() {
            processed += 1;
        }
        Ok(processed)
    }

    /// Poll the queue with `concurrency` loops until `shutdown` flips to true.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        info!(
            "Worker started with {} loop(s), job timeout {}s",
            self.options.concurrency,
            self.options.job_timeout.as_secs()
        );

        let loops = (0..self.options.concurrency.max(1))
            .map(|n| self.poll_loop(n, shutdown.clone()))
            .collect::<Vec<_>>();
        let purge = self.purge_loop(shutdown.clone());

        futures::join!(join_all(loops), purge);
        info!("Worker stopped");
    }

    async fn poll_loop(&self, n: usize, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.run_once().await {
                Ok(Some(report)) => {
                    debug!(
                        "Loop {} finished {} job {} (ok: {})",
                        n, report.kind, report.job_id, report.succeeded
                    );
                    continue;
                }
                Ok(None) => {}
                Err(e) => error!("Loop {} queue error: {}", n, e),
            }
            if self.idle(&mut shutdown).await {
                break;
            }
        }
    }

    /// Sleep for the poll interval. True when the worker should stop.
    async fn idle(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.options.poll_interval) => false,
            changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
        }
    }

    async fn purge_loop(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.options.purge_interval) => {
                    if let Err(e) = self.queue.purge().await {
                        warn!("Failed to purge expired jobs: {}", e);
                    }
                }
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }
        }
    }
}
