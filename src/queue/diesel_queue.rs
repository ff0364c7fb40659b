//! SQLite-backed job queue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::dsl::count_star;
use diesel::prelude::*;
use tracing::{debug, warn};

use super::{JobOutcome, JobQueue, JobStatus, QueueError, QueuedJob};
use crate::models::{EnqueueOptions, JobKind};
use crate::repository::diesel_models::{JobRecord, NewJob};
use crate::repository::diesel_pool::{run_blocking, DieselError, SqlitePool};
use crate::schema::jobs;

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}

/// Job queue stored in the `jobs` table.
#[derive(Clone)]
pub struct DieselJobQueue {
    pool: SqlitePool,
    queue: String,
}

impl DieselJobQueue {
    pub fn new(pool: SqlitePool, queue: &str) -> Self {
        Self {
            pool,
            queue: queue.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.queue
    }

    /// Job counts per status for this queue.
    pub async fn count_by_status(&self) -> Result<Vec<(String, u64)>, DieselError> {
        let queue = self.queue.clone();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let rows: Vec<(String, i64)> = jobs::table
                .filter(jobs::queue.eq(&queue))
                .group_by(jobs::status)
                .select((jobs::status, count_star()))
                .order(jobs::status.asc())
                .load(conn)?;
            Ok(rows.into_iter().map(|(s, c)| (s, c as u64)).collect())
        })
        .await
    }

    /// Status of one job, if it is still stored.
    pub async fn status_of(&self, job_id: &str) -> Result<Option<JobStatus>, QueueError> {
        let Ok(id) = job_id.parse::<i32>() else {
            return Ok(None);
        };
        let pool = self.pool.clone();

        let status = run_blocking(pool, move |conn| {
            jobs::table
                .find(id)
                .select(jobs::status)
                .first::<String>(conn)
                .optional()
        })
        .await?;
        Ok(status.and_then(|s| s.parse().ok()))
    }
}

/// Mark jobs still queued or executing past their TTL as abandoned.
///
/// Covers workers that died holding a claim; their rows keep the lapsed
/// `expires_at`, so the next purge removes them.
fn abandon_expired(
    conn: &mut SqliteConnection,
    queue: &str,
    now: i64,
) -> Result<usize, DieselError> {
    let live = vec![JobStatus::Queued.as_str(), JobStatus::Started.as_str()];
    let abandoned = diesel::update(
        jobs::table
            .filter(jobs::queue.eq(queue))
            .filter(jobs::status.eq_any(live))
            .filter(jobs::expires_at.le(now)),
    )
    .set((
        jobs::status.eq(JobStatus::Abandoned.as_str()),
        jobs::finished_at.eq(Some(now)),
    ))
    .execute(conn)?;
    if abandoned > 0 {
        warn!("Abandoned {} job(s) on '{}' past their TTL", abandoned, queue);
    }
    Ok(abandoned)
}

#[async_trait]
impl JobQueue for DieselJobQueue {
    async fn enqueue(&self, job: &JobKind, options: EnqueueOptions) -> Result<String, QueueError> {
        let payload = serde_json::to_string(job)?;
        let kind = job.name();
        let queue = self.queue.clone();
        let pool = self.pool.clone();
        let now = now_millis();
        let expires_at = now.saturating_add(options.ttl.as_millis() as i64);
        let result_ttl_ms = options.result_ttl.as_millis() as i64;

        let id = run_blocking(pool, move |conn| {
            conn.immediate_transaction::<_, DieselError, _>(|conn| {
                diesel::insert_into(jobs::table)
                    .values(&NewJob {
                        queue: &queue,
                        kind,
                        payload: &payload,
                        status: JobStatus::Queued.as_str(),
                        enqueued_at: now,
                        expires_at,
                        result_ttl_ms,
                    })
                    .execute(conn)?;
                jobs::table
                    .select(jobs::id)
                    .order(jobs::id.desc())
                    .first::<i32>(conn)
            })
        })
        .await?;

        debug!("Enqueued {} job {} on '{}'", kind, id, self.queue);
        Ok(id.to_string())
    }

    async fn dequeue(&self) -> Result<Option<QueuedJob>, QueueError> {
        let queue = self.queue.clone();
        let pool = self.pool.clone();

        let claimed = run_blocking(pool, move |conn| {
            conn.immediate_transaction::<_, DieselError, _>(|conn| {
                let now = now_millis();
                abandon_expired(conn, &queue, now)?;

                loop {
                    let Some(record) = jobs::table
                        .filter(jobs::queue.eq(&queue))
                        .filter(jobs::status.eq(JobStatus::Queued.as_str()))
                        .order(jobs::id.asc())
                        .first::<JobRecord>(conn)
                        .optional()?
                    else {
                        return Ok(None);
                    };

                    match serde_json::from_str::<JobKind>(&record.payload) {
                        Ok(job) => {
                            diesel::update(jobs::table.find(record.id))
                                .set((
                                    jobs::status.eq(JobStatus::Started.as_str()),
                                    jobs::started_at.eq(Some(now)),
                                ))
                                .execute(conn)?;
                            return Ok(Some(QueuedJob {
                                id: record.id.to_string(),
                                job,
                                enqueued_at: millis_to_datetime(record.enqueued_at),
                            }));
                        }
                        Err(e) => {
                            warn!("Job {} has unreadable payload: {}", record.id, e);
                            diesel::update(jobs::table.find(record.id))
                                .set((
                                    jobs::status.eq(JobStatus::Failed.as_str()),
                                    jobs::finished_at.eq(Some(now)),
                                    jobs::error.eq(Some(e.to_string())),
                                    jobs::expires_at.eq(now.saturating_add(record.result_ttl_ms)),
                                ))
                                .execute(conn)?;
                        }
                    }
                }
            })
        })
        .await?;

        Ok(claimed)
    }

    async fn complete(&self, job_id: &str, outcome: JobOutcome) -> Result<(), QueueError> {
        let id: i32 = job_id
            .parse()
            .map_err(|_| QueueError::UnknownJob(job_id.to_string()))?;
        let (status, result, error) = match outcome {
            JobOutcome::Finished(value) => {
                (JobStatus::Finished, Some(serde_json::to_string(&value)?), None)
            }
            JobOutcome::Failed(message) => (JobStatus::Failed, None, Some(message)),
        };
        let pool = self.pool.clone();

        let rows = run_blocking(pool, move |conn| {
            let now = now_millis();
            let Some(result_ttl_ms) = jobs::table
                .find(id)
                .select(jobs::result_ttl_ms)
                .first::<i64>(conn)
                .optional()?
            else {
                return Ok(0);
            };
            diesel::update(jobs::table.find(id))
                .set((
                    jobs::status.eq(status.as_str()),
                    jobs::finished_at.eq(Some(now)),
                    jobs::result.eq(result),
                    jobs::error.eq(error),
                    jobs::expires_at.eq(now.saturating_add(result_ttl_ms)),
                ))
                .execute(conn)
        })
        .await?;

        if rows == 0 {
            return Err(QueueError::UnknownJob(job_id.to_string()));
        }
        Ok(())
    }

    async fn purge(&self) -> Result<u64, QueueError> {
        let queue = self.queue.clone();
        let pool = self.pool.clone();

        let removed = run_blocking(pool, move |conn| {
            let now = now_millis();
            let expirable = vec![
                JobStatus::Finished.as_str(),
                JobStatus::Failed.as_str(),
                JobStatus::Abandoned.as_str(),
                JobStatus::Queued.as_str(),
                JobStatus::Started.as_str(),
            ];
            diesel::delete(
                jobs::table
                    .filter(jobs::queue.eq(&queue))
                    .filter(jobs::status.eq_any(expirable))
                    .filter(jobs::expires_at.le(now)),
            )
            .execute(conn)
        })
        .await?;

        if removed > 0 {
            debug!("Purged {} expired job(s) from '{}'", removed, self.queue);
        }
        Ok(removed as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CaptureJob, CrawlJob};
    use crate::repository::{create_diesel_pool_from_url, init_schema};
    use std::time::Duration;
    use tempfile::tempdir;

    async fn setup_queue() -> (DieselJobQueue, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("queue.db");
        let pool = create_diesel_pool_from_url(&db_path.display().to_string()).unwrap();
        init_schema(&pool).await.unwrap();
        (DieselJobQueue::new(pool, "high"), dir)
    }

    fn crawl(url: &str) -> JobKind {
        JobKind::Crawl(CrawlJob {
            target_url: url.to_string(),
            parent_id: None,
            remaining_depth: 1,
            is_onion: true,
            in_scope: true,
            use_proxy: true,
            re_crawl: false,
        })
    }

    #[tokio::test]
    async fn test_fifo_claim_and_complete() {
        let (queue, _dir) = setup_queue().await;
        let first = queue.enqueue(&crawl("http://a.onion/"), EnqueueOptions::default()).await.unwrap();
        let capture = JobKind::Capture(CaptureJob {
            url: "http://b.onion/".into(),
            capture_id: "abc".into(),
        });
        queue.enqueue(&capture, EnqueueOptions::default()).await.unwrap();

        let claimed = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(claimed.id, first);
        assert_eq!(claimed.job, crawl("http://a.onion/"));
        assert_eq!(queue.status_of(&first).await.unwrap(), Some(JobStatus::Started));

        let next = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(next.job, capture);
        assert!(queue.dequeue().await.unwrap().is_none());

        queue
            .complete(&first, JobOutcome::Finished(serde_json::json!({"ok": true})))
            .await
            .unwrap();
        assert_eq!(queue.status_of(&first).await.unwrap(), Some(JobStatus::Finished));
    }

    #[tokio::test]
    async fn test_expired_jobs_are_abandoned() {
        let (queue, _dir) = setup_queue().await;
        let opts = EnqueueOptions {
            ttl: Duration::ZERO,
            result_ttl: Duration::ZERO,
        };
        let id = queue.enqueue(&crawl("http://a.onion/"), opts).await.unwrap();

        assert!(queue.dequeue().await.unwrap().is_none());
        assert_eq!(queue.status_of(&id).await.unwrap(), Some(JobStatus::Abandoned));

        assert_eq!(queue.purge().await.unwrap(), 1);
        assert_eq!(queue.status_of(&id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_claimed_job_past_ttl_is_abandoned_and_purged() {
        let (queue, _dir) = setup_queue().await;
        let opts = EnqueueOptions {
            ttl: Duration::from_millis(50),
            ..Default::default()
        };
        let id = queue.enqueue(&crawl("http://a.onion/"), opts).await.unwrap();
        queue.dequeue().await.unwrap().unwrap();
        assert_eq!(queue.status_of(&id).await.unwrap(), Some(JobStatus::Started));

        // The claiming worker never completes.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(queue.dequeue().await.unwrap().is_none());
        assert_eq!(queue.status_of(&id).await.unwrap(), Some(JobStatus::Abandoned));

        assert_eq!(queue.purge().await.unwrap(), 1);
        assert_eq!(queue.status_of(&id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_purge_drops_stale_claims() {
        let (queue, _dir) = setup_queue().await;
        let opts = EnqueueOptions {
            ttl: Duration::from_millis(50),
            ..Default::default()
        };
        let id = queue.enqueue(&crawl("http://a.onion/"), opts).await.unwrap();
        queue.dequeue().await.unwrap().unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(queue.purge().await.unwrap(), 1);
        assert_eq!(queue.status_of(&id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_result_is_dropped_after_result_ttl() {
        let (queue, _dir) = setup_queue().await;
        let opts = EnqueueOptions {
            result_ttl: Duration::ZERO,
            ..Default::default()
        };
        let id = queue.enqueue(&crawl("http://a.onion/"), opts).await.unwrap();
        queue.dequeue().await.unwrap().unwrap();
        queue.complete(&id, JobOutcome::Failed("boom".into())).await.unwrap();

        assert_eq!(queue.purge().await.unwrap(), 1);
        let counts = queue.count_by_status().await.unwrap();
        assert!(counts.is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_payload_is_failed_and_skipped() {
        let (queue, _dir) = setup_queue().await;
        let pool = queue.pool.clone();
        run_blocking(pool, |conn| {
            diesel::sql_query(
                "INSERT INTO jobs (queue, kind, payload, status, enqueued_at, expires_at, result_ttl_ms)
                 VALUES ('high', 'legacy', '{\"kind\":\"spider.run\"}', 'queued', 0, 9999999999999, 1000)",
            )
            .execute(conn)
        })
        .await
        .unwrap();
        queue.enqueue(&crawl("http://ok.onion/"), EnqueueOptions::default()).await.unwrap();

        let claimed = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(claimed.job, crawl("http://ok.onion/"));
        assert_eq!(queue.status_of("1").await.unwrap(), Some(JobStatus::Failed));
    }

    #[tokio::test]
    async fn test_complete_unknown_job() {
        let (queue, _dir) = setup_queue().await;
        let err = queue
            .complete("42", JobOutcome::Failed("x".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::UnknownJob(_)));
    }
}
