//! Schema bootstrap.
//!
//! Statements are idempotent so `init_schema` can run on every start.

use diesel::connection::SimpleConnection;

use super::diesel_pool::{run_blocking, DieselError, SqlitePool};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY NOT NULL,
    url TEXT NOT NULL,
    netloc TEXT NOT NULL DEFAULT '',
    status INTEGER,
    seen_time TEXT NOT NULL,
    parent TEXT,
    html TEXT,
    title TEXT,
    body TEXT,
    emails TEXT NOT NULL DEFAULT '[]',
    pgp_keys TEXT NOT NULL DEFAULT '[]',
    links TEXT NOT NULL DEFAULT '[]',
    images TEXT NOT NULL DEFAULT '[]',
    addresses TEXT NOT NULL DEFAULT '{}',
    capture_id TEXT,
    is_onion BOOLEAN NOT NULL DEFAULT 0,
    in_scope BOOLEAN NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_documents_url ON documents(url);
CREATE INDEX IF NOT EXISTS idx_documents_parent ON documents(parent);
CREATE INDEX IF NOT EXISTS idx_documents_updated ON documents(updated_at);

CREATE TABLE IF NOT EXISTS jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    queue TEXT NOT NULL,
    kind TEXT NOT NULL,
    payload TEXT NOT NULL,
    status TEXT NOT NULL,
    enqueued_at BIGINT NOT NULL,
    expires_at BIGINT NOT NULL,
    started_at BIGINT,
    finished_at BIGINT,
    result_ttl_ms BIGINT NOT NULL,
    result TEXT,
    error TEXT
);
CREATE INDEX IF NOT EXISTS idx_jobs_queue_status ON jobs(queue, status, id);
"#;

/// Create every table and index if missing.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), DieselError> {
    run_blocking(pool.clone(), |conn| conn.batch_execute(SCHEMA)).await
}
