//! Job queue abstraction.
//!
//! The queue is the crawl frontier: the spider enqueues [`JobKind`] payloads
//! and workers pull them back out. Two backends:
//! - SQLite, sharing the document database (default)
//! - Redis (`redis-backend` feature), for workers on several hosts

mod diesel_queue;
#[cfg(feature = "redis-backend")]
mod redis_queue;

pub use diesel_queue::DieselJobQueue;
#[cfg(feature = "redis-backend")]
pub use redis_queue::RedisJobQueue;

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use crate::models::{EnqueueOptions, JobKind};
use crate::repository::SqlitePool;

/// Queue name used by the crawler.
pub const DEFAULT_QUEUE: &str = "high";

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("job payload error: {0}")]
    Payload(#[from] serde_json::Error),
    #[cfg(feature = "redis-backend")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("unknown job {0}")]
    UnknownJob(String),
    #[error("unsupported broker url: {0}")]
    UnsupportedBroker(String),
}

/// Lifecycle of a job in the SQLite backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Started,
    Finished,
    Failed,
    /// Sat in the queue past its TTL.
    Abandoned,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Started => "started",
            Self::Finished => "finished",
            Self::Failed => "failed",
            Self::Abandoned => "abandoned",
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "started" => Ok(Self::Started),
            "finished" => Ok(Self::Finished),
            "failed" => Ok(Self::Failed),
            "abandoned" => Ok(Self::Abandoned),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// A job handed to a worker.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub id: String,
    pub job: JobKind,
    pub enqueued_at: DateTime<Utc>,
}

/// How a job ended, stored for `result_ttl`.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Finished(serde_json::Value),
    Failed(String),
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Add a job and return its id.
    async fn enqueue(&self, job: &JobKind, options: EnqueueOptions) -> Result<String, QueueError>;

    /// Claim the oldest live job, if any.
    async fn dequeue(&self) -> Result<Option<QueuedJob>, QueueError>;

    /// Record the outcome of a claimed job.
    async fn complete(&self, job_id: &str, outcome: JobOutcome) -> Result<(), QueueError>;

    /// Drop expired jobs and results. Returns how many were removed.
    async fn purge(&self) -> Result<u64, QueueError>;
}

/// Open the queue named by `broker_url`.
///
/// - None, "database" or "sqlite": jobs table in the local database
/// - "redis://host:port": Redis (requires the `redis-backend` feature)
pub async fn connect(
    broker_url: Option<&str>,
    queue_name: &str,
    pool: SqlitePool,
) -> Result<Arc<dyn JobQueue>, QueueError> {
    match broker_url {
        None | Some("database") | Some("sqlite") => {
            info!("Using database job queue '{}'", queue_name);
            Ok(Arc::new(DieselJobQueue::new(pool, queue_name)))
        }
        #[cfg(feature = "redis-backend")]
        Some(url) if url.starts_with("redis://") || url.starts_with("rediss://") => {
            info!("Using Redis job queue '{}'", queue_name);
            Ok(Arc::new(RedisJobQueue::connect(url, queue_name).await?))
        }
        Some(other) => Err(QueueError::UnsupportedBroker(other.to_string())),
    }
}
