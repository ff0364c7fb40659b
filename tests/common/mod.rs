#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use onionspider::capture::{CaptureError, ScreenshotCapture};
use onionspider::models::{CrawlDocument, EnqueueOptions, JobKind};
use onionspider::queue::{JobOutcome, JobQueue, QueueError, QueuedJob};
use onionspider::repository::{
    create_diesel_pool_from_url, init_schema, DieselDocumentRepository, DocumentStore,
    SqlitePool, StoreError, UpsertOutcome,
};
use onionspider::scrapers::{FetchError, Fetcher, RawResponse, RetryPolicy, Transport};

pub const ROOT: &str = "http://example.onion/";

/// Serves pages from a map; unknown URLs fail at the transport level.
#[derive(Default)]
pub struct FakeWeb {
    pages: Mutex<HashMap<String, (u16, Vec<u8>)>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl FakeWeb {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn page(&self, url: &str, status: u16, body: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), (status, body.as_bytes().to_vec()));
    }

    pub fn raw(&self, url: &str, status: u16, body: Vec<u8>) {
        self.pages.lock().unwrap().insert(url.to_string(), (status, body));
    }

    pub fn remove(&self, url: &str) {
        self.pages.lock().unwrap().remove(url);
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Transport for FakeWeb {
    async fn get(&self, url: &str, _use_proxy: bool) -> Result<RawResponse, FetchError> {
        *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;
        let page = self.pages.lock().unwrap().get(url).cloned();
        match page {
            Some((status, body)) => Ok(RawResponse {
                final_url: url.to_string(),
                status,
                body: (status == 200).then_some(body),
            }),
            None => Err(FetchError::Transport(format!("cannot reach {}", url))),
        }
    }
}

pub fn fetcher(web: &Arc<FakeWeb>) -> Fetcher {
    Fetcher::new(web.clone(), RetryPolicy::default())
}

/// Records enqueued jobs; optionally rejects URLs containing a marker.
#[derive(Default)]
pub struct RecordingQueue {
    pub jobs: Mutex<Vec<JobKind>>,
    reject_marker: Option<String>,
}

impl RecordingQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn rejecting(marker: &str) -> Arc<Self> {
        Arc::new(Self {
            jobs: Mutex::new(Vec::new()),
            reject_marker: Some(marker.to_string()),
        })
    }

    pub fn jobs(&self) -> Vec<JobKind> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobQueue for RecordingQueue {
    async fn enqueue(&self, job: &JobKind, _options: EnqueueOptions) -> Result<String, QueueError> {
        if let Some(marker) = &self.reject_marker {
            if job.target().contains(marker.as_str()) {
                return Err(QueueError::UnsupportedBroker("queue is down".into()));
            }
        }
        let mut jobs = self.jobs.lock().unwrap();
        jobs.push(job.clone());
        Ok(jobs.len().to_string())
    }

    async fn dequeue(&self) -> Result<Option<QueuedJob>, QueueError> {
        Ok(None)
    }

    async fn complete(&self, _job_id: &str, _outcome: JobOutcome) -> Result<(), QueueError> {
        Ok(())
    }

    async fn purge(&self) -> Result<u64, QueueError> {
        Ok(0)
    }
}

/// Records capture requests, failing every one when `fail` is set.
#[derive(Default)]
pub struct RecordingCapture {
    pub captured: Mutex<Vec<(String, String)>>,
    pub fail: bool,
}

impl RecordingCapture {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            captured: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    pub fn captured(&self) -> Vec<(String, String)> {
        self.captured.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScreenshotCapture for RecordingCapture {
    async fn capture(&self, url: &str, capture_id: &str) -> Result<(), CaptureError> {
        self.captured
            .lock()
            .unwrap()
            .push((url.to_string(), capture_id.to_string()));
        if self.fail {
            return Err(CaptureError::Status(502));
        }
        Ok(())
    }
}

/// Store whose writes always fail.
#[derive(Default)]
pub struct BrokenStore {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl DocumentStore for BrokenStore {
    async fn find_by_url(&self, _url: &str) -> Result<Option<CrawlDocument>, StoreError> {
        Ok(None)
    }

    async fn create(&self, _doc: &CrawlDocument) -> Result<String, StoreError> {
        Err(StoreError::Database(diesel::result::Error::BrokenTransactionManager))
    }

    async fn update_by_url(&self, url: &str, _doc: &CrawlDocument) -> Result<bool, StoreError> {
        Err(StoreError::NotFound(url.to_string()))
    }

    async fn url_exists(&self, _url: &str) -> Result<bool, StoreError> {
        Ok(false)
    }

    async fn upsert_by_url(
        &self,
        _doc: &CrawlDocument,
        _re_crawl: bool,
    ) -> Result<UpsertOutcome, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Database(diesel::result::Error::BrokenTransactionManager))
    }
}

pub async fn test_store() -> (Arc<DieselDocumentRepository>, SqlitePool, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("crawl.db");
    let pool = create_diesel_pool_from_url(&db_path.display().to_string()).unwrap();
    init_schema(&pool).await.unwrap();
    (Arc::new(DieselDocumentRepository::new(pool.clone())), pool, dir)
}

pub fn html_page(title: &str, body: &str) -> String {
    format!(
        "<html><head><title>{}</title></head><body>{}</body></html>",
        title, body
    )
}
