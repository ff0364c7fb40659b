//! Process-wide handles.
//!
//! Everything the crawler talks to is opened here once and passed down
//! explicitly; there are no global clients.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use tracing::info;

use crate::capture::{CaptureMode, QueuedCapture, ScreenshotCapture, SplashCapture};
use crate::config::Settings;
use crate::queue::{self, JobQueue};
use crate::repository::{create_diesel_pool, init_schema, DieselDocumentRepository, SqlitePool};
use crate::scrapers::Fetcher;
use crate::services::{Spider, SpiderOptions, Worker, WorkerOptions};

/// Shared state for crawls and workers.
#[derive(Clone)]
pub struct AppContext {
    pub settings: Settings,
    pub pool: SqlitePool,
    pub documents: Arc<DieselDocumentRepository>,
    pub queue: Arc<dyn JobQueue>,
    pub fetcher: Fetcher,
    /// Capture used while crawling, per `settings.capture`.
    pub capture: Option<Arc<dyn ScreenshotCapture>>,
    /// Renderer that executes queued capture jobs.
    pub renderer: Option<Arc<dyn ScreenshotCapture>>,
}

impl AppContext {
    /// Open the database, queue and clients described by `settings`.
    pub async fn init(settings: Settings) -> anyhow::Result<Self> {
        settings
            .ensure_directories()
            .with_context(|| format!("creating {}", settings.data_dir.display()))?;

        let db_path = settings.database_path();
        let pool = create_diesel_pool(&db_path)
            .with_context(|| format!("opening database {}", db_path.display()))?;
        init_schema(&pool).await.context("creating schema")?;

        let documents = Arc::new(DieselDocumentRepository::new(pool.clone()));
        let queue = queue::connect(
            settings.broker_url.as_deref(),
            &settings.queue_name,
            pool.clone(),
        )
        .await
        .context("connecting to job queue")?;
        let fetcher = Fetcher::from_config(&settings.fetcher_config())?;

        let renderer: Option<Arc<dyn ScreenshotCapture>> = match settings.capture {
            CaptureMode::Disabled => None,
            _ => Some(Arc::new(SplashCapture::new(settings.splash_config())?)),
        };
        let capture: Option<Arc<dyn ScreenshotCapture>> = match settings.capture {
            CaptureMode::Direct => renderer.clone(),
            CaptureMode::Queued => Some(Arc::new(QueuedCapture::new(
                queue.clone(),
                settings.enqueue_options(),
            ))),
            CaptureMode::Disabled => None,
        };

        info!(
            "Context ready: db {}, proxy {}, capture {:?}",
            db_path.display(),
            settings.proxy_url,
            settings.capture
        );

        Ok(Self {
            settings,
            pool,
            documents,
            queue,
            fetcher,
            capture,
            renderer,
        })
    }

    pub fn spider(&self) -> Spider {
        Spider::new(
            self.fetcher.clone(),
            self.documents.clone(),
            self.queue.clone(),
            self.capture.clone(),
            SpiderOptions {
                fan_out: self.settings.fan_out,
                strict_onion_admission: self.settings.strict_onion_admission,
                enqueue: self.settings.enqueue_options(),
            },
        )
    }

    pub fn worker(&self) -> Worker {
        Worker::new(
            self.spider(),
            self.renderer.clone(),
            self.queue.clone(),
            WorkerOptions {
                concurrency: self.settings.worker_concurrency.max(1),
                job_timeout: Duration::from_secs(self.settings.job_timeout),
                poll_interval: Duration::from_millis(self.settings.poll_interval_ms),
                ..Default::default()
            },
        )
    }

    /// Release handles. Expired jobs are purged on the way out.
    pub async fn shutdown(self) {
        if let Err(e) = self.queue.purge().await {
            tracing::warn!("Failed to purge queue on shutdown: {}", e);
        }
        info!(
            "Closing context ({} idle db connection(s))",
            self.pool.state().idle_connections
        );
    }
}
