//! Document persistence.
//!
//! [`DocumentStore`] is the seam the crawler talks to; the Diesel/SQLite
//! implementation lives in [`diesel_document`].

pub mod diesel_document;
pub mod diesel_models;
pub mod diesel_pool;
pub mod migrations;

pub use diesel_document::DieselDocumentRepository;
pub use diesel_pool::{create_diesel_pool, create_diesel_pool_from_url, run_blocking, SqlitePool};
pub use migrations::init_schema;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::CrawlDocument;

/// Errors from the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no document with url {0}")]
    NotFound(String),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("failed to encode document field: {0}")]
    Encode(#[from] serde_json::Error),
}

/// What an upsert did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAction {
    Created,
    Updated,
    /// The URL already existed and re-crawl was off.
    Unchanged,
}

impl UpsertAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub id: String,
    pub action: UpsertAction,
}

/// Storage for crawl documents, keyed by URL.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_by_url(&self, url: &str) -> Result<Option<CrawlDocument>, StoreError>;

    /// Insert a new document and return its identity.
    async fn create(&self, doc: &CrawlDocument) -> Result<String, StoreError>;

    /// Overwrite the document stored under `url`. Fails with
    /// [`StoreError::NotFound`] if there is none.
    async fn update_by_url(&self, url: &str, doc: &CrawlDocument) -> Result<bool, StoreError>;

    async fn url_exists(&self, url: &str) -> Result<bool, StoreError>;

    /// Create `doc` if its URL is new; otherwise overwrite it when `re_crawl`
    /// is set. Atomic with respect to concurrent callers on the same URL.
    async fn upsert_by_url(
        &self,
        doc: &CrawlDocument,
        re_crawl: bool,
    ) -> Result<UpsertOutcome, StoreError>;
}

/// Parse an RFC 3339 timestamp, falling back to now.
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
