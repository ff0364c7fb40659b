//! Redis-backed job queue.
//!
//! Layout, all under the `onionspider:` prefix:
//! - `queue:{name}`: list of job ids, oldest first
//! - `job:{id}`: job envelope, expires after the job TTL
//! - `job:{id}:result`: outcome, expires after the result TTL

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{JobOutcome, JobQueue, QueueError, QueuedJob};
use crate::models::{EnqueueOptions, JobKind};

const PREFIX: &str = "onionspider";

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    job: JobKind,
    enqueued_at: DateTime<Utc>,
    result_ttl_secs: u64,
}

#[derive(Debug, Serialize)]
struct StoredResult<'a> {
    status: &'a str,
    result: Option<&'a serde_json::Value>,
    error: Option<&'a str>,
    finished_at: DateTime<Utc>,
}

/// Job queue stored in Redis lists and expiring keys.
pub struct RedisJobQueue {
    conn: ConnectionManager,
    queue: String,
    /// Result TTLs of jobs claimed by this process.
    claimed: Mutex<HashMap<String, u64>>,
}

impl RedisJobQueue {
    pub async fn connect(url: &str, queue: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            queue: queue.to_string(),
            claimed: Mutex::new(HashMap::new()),
        })
    }

    fn list_key(&self) -> String {
        list_key(&self.queue)
    }
}

fn list_key(queue: &str) -> String {
    format!("{}:queue:{}", PREFIX, queue)
}

fn job_key(id: &str) -> String {
    format!("{}:job:{}", PREFIX, id)
}

fn result_key(id: &str) -> String {
    format!("{}:job:{}:result", PREFIX, id)
}

/// Redis rejects `EX 0`; keep at least one second.
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, job: &JobKind, options: EnqueueOptions) -> Result<String, QueueError> {
        let mut conn = self.conn.clone();
        let seq: u64 = conn.incr(format!("{}:job_seq", PREFIX), 1).await?;
        let id = seq.to_string();

        let envelope = Envelope {
            job: job.clone(),
            enqueued_at: Utc::now(),
            result_ttl_secs: ttl_secs(options.result_ttl),
        };
        let payload = serde_json::to_string(&envelope)?;

        let _: () = conn
            .set_ex(job_key(&id), payload, ttl_secs(options.ttl))
            .await?;
        let _: () = conn.rpush(self.list_key(), &id).await?;

        debug!("Enqueued {} job {} on '{}'", job.name(), id, self.queue);
        Ok(id)
    }

    async fn dequeue(&self) -> Result<Option<QueuedJob>, QueueError> {
        let mut conn = self.conn.clone();
        loop {
            let id: Option<String> = conn.lpop(self.list_key(), None).await?;
            let Some(id) = id else {
                return Ok(None);
            };

            let payload: Option<String> = conn.get(job_key(&id)).await?;
            let Some(payload) = payload else {
                debug!("Job {} expired before it was claimed", id);
                continue;
            };
            let _: () = conn.del(job_key(&id)).await?;

            match serde_json::from_str::<Envelope>(&payload) {
                Ok(envelope) => {
                    if let Ok(mut claimed) = self.claimed.lock() {
                        claimed.insert(id.clone(), envelope.result_ttl_secs);
                    }
                    return Ok(Some(QueuedJob {
                        id,
                        job: envelope.job,
                        enqueued_at: envelope.enqueued_at,
                    }));
                }
                Err(e) => warn!("Job {} has unreadable payload: {}", id, e),
            }
        }
    }

    async fn complete(&self, job_id: &str, outcome: JobOutcome) -> Result<(), QueueError> {
        let result_ttl = self
            .claimed
            .lock()
            .ok()
            .and_then(|mut claimed| claimed.remove(job_id))
            .ok_or_else(|| QueueError::UnknownJob(job_id.to_string()))?;

        let stored = match &outcome {
            JobOutcome::Finished(value) => StoredResult {
                status: "finished",
                result: Some(value),
                error: None,
                finished_at: Utc::now(),
            },
            JobOutcome::Failed(message) => StoredResult {
                status: "failed",
                result: None,
                error: Some(message),
                finished_at: Utc::now(),
            },
        };
        let payload = serde_json::to_string(&stored)?;

        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(result_key(job_id), payload, result_ttl)
            .await?;
        Ok(())
    }

    async fn purge(&self) -> Result<u64, QueueError> {
        // Key expiry already drops stale jobs and results.
        Ok(0)
    }
}
