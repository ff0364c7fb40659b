//! Diesel-based document repository for SQLite.

use async_trait::async_trait;
use chrono::Utc;
use diesel::dsl::count_star;
use diesel::prelude::*;
use uuid::Uuid;

use super::diesel_models::{DocumentChanges, DocumentRecord, NewDocument};
use super::diesel_pool::{run_blocking, DieselError, SqlitePool};
use super::{parse_datetime, DocumentStore, StoreError, UpsertAction, UpsertOutcome};
use crate::models::CrawlDocument;
use crate::schema::documents;

/// Convert a database record to a domain model.
impl From<DocumentRecord> for CrawlDocument {
    fn from(record: DocumentRecord) -> Self {
        CrawlDocument {
            id: record.id,
            url: record.url,
            netloc: record.netloc,
            status: record.status.and_then(|s| u16::try_from(s).ok()),
            seen_time: parse_datetime(&record.seen_time),
            parent: record.parent,
            html: record.html,
            title: record.title,
            body: record.body,
            emails: serde_json::from_str(&record.emails).unwrap_or_default(),
            pgp_keys: serde_json::from_str(&record.pgp_keys).unwrap_or_default(),
            links: serde_json::from_str(&record.links).unwrap_or_default(),
            images: serde_json::from_str(&record.images).unwrap_or_default(),
            addresses: serde_json::from_str(&record.addresses).unwrap_or_default(),
            capture_id: record.capture_id,
            is_onion: record.is_onion,
            in_scope: record.in_scope,
        }
    }
}

/// Owned, column-encoded copy of a document that can move into a blocking task.
struct DocumentRow {
    id: String,
    url: String,
    netloc: String,
    status: Option<i32>,
    seen_time: String,
    parent: Option<String>,
    html: Option<String>,
    title: Option<String>,
    body: Option<String>,
    emails: String,
    pgp_keys: String,
    links: String,
    images: String,
    addresses: String,
    capture_id: Option<String>,
    is_onion: bool,
    in_scope: bool,
    stamp: String,
}

impl DocumentRow {
    fn encode(doc: &CrawlDocument, id: String) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id,
            url: doc.url.clone(),
            netloc: doc.netloc.clone(),
            status: doc.status.map(i32::from),
            seen_time: doc.seen_time.to_rfc3339(),
            parent: doc.parent.clone(),
            html: doc.html.clone(),
            title: doc.title.clone(),
            body: doc.body.clone(),
            emails: serde_json::to_string(&doc.emails)?,
            pgp_keys: serde_json::to_string(&doc.pgp_keys)?,
            links: serde_json::to_string(&doc.links)?,
            images: serde_json::to_string(&doc.images)?,
            addresses: serde_json::to_string(&doc.addresses)?,
            capture_id: doc.capture_id.clone(),
            is_onion: doc.is_onion,
            in_scope: doc.in_scope,
            stamp: Utc::now().to_rfc3339(),
        })
    }

    fn insertable(&self) -> NewDocument<'_> {
        NewDocument {
            id: &self.id,
            url: &self.url,
            netloc: &self.netloc,
            status: self.status,
            seen_time: &self.seen_time,
            parent: self.parent.as_deref(),
            html: self.html.as_deref(),
            title: self.title.as_deref(),
            body: self.body.as_deref(),
            emails: &self.emails,
            pgp_keys: &self.pgp_keys,
            links: &self.links,
            images: &self.images,
            addresses: &self.addresses,
            capture_id: self.capture_id.as_deref(),
            is_onion: self.is_onion,
            in_scope: self.in_scope,
            created_at: &self.stamp,
            updated_at: &self.stamp,
        }
    }

    fn changes(&self) -> DocumentChanges<'_> {
        DocumentChanges {
            netloc: &self.netloc,
            status: self.status,
            seen_time: &self.seen_time,
            parent: self.parent.as_deref(),
            html: self.html.as_deref(),
            title: self.title.as_deref(),
            body: self.body.as_deref(),
            emails: &self.emails,
            pgp_keys: &self.pgp_keys,
            links: &self.links,
            images: &self.images,
            addresses: &self.addresses,
            capture_id: self.capture_id.as_deref(),
            is_onion: self.is_onion,
            in_scope: self.in_scope,
            updated_at: &self.stamp,
        }
    }
}

/// Diesel-based document repository with compile-time query checking.
#[derive(Clone)]
pub struct DieselDocumentRepository {
    pool: SqlitePool,
}

impl DieselDocumentRepository {
    /// Create a new Diesel document repository with an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a document by identity.
    pub async fn get(&self, id: &str) -> Result<Option<CrawlDocument>, DieselError> {
        let id = id.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            documents::table
                .find(&id)
                .first::<DocumentRecord>(conn)
                .optional()
        })
        .await
        .map(|opt| opt.map(CrawlDocument::from))
    }

    /// Documents discovered on the page with identity `parent_id`.
    pub async fn children_of(&self, parent_id: &str) -> Result<Vec<CrawlDocument>, DieselError> {
        let parent_id = parent_id.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            documents::table
                .filter(documents::parent.eq(&parent_id))
                .order(documents::url.asc())
                .load::<DocumentRecord>(conn)
        })
        .await
        .map(|records| records.into_iter().map(CrawlDocument::from).collect())
    }

    /// Most recently written documents.
    pub async fn recent(&self, limit: u32) -> Result<Vec<CrawlDocument>, DieselError> {
        let limit = limit as i64;
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            documents::table
                .order(documents::updated_at.desc())
                .limit(limit)
                .load::<DocumentRecord>(conn)
        })
        .await
        .map(|records| records.into_iter().map(CrawlDocument::from).collect())
    }

    /// Count all documents.
    pub async fn count(&self) -> Result<u64, DieselError> {
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let count: i64 = documents::table.select(count_star()).first(conn)?;
            Ok(count as u64)
        })
        .await
    }

    /// Document counts per HTTP status, `None` for pages never answered.
    pub async fn count_by_status(&self) -> Result<Vec<(Option<u16>, u64)>, DieselError> {
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let rows: Vec<(Option<i32>, i64)> = documents::table
                .group_by(documents::status)
                .select((documents::status, count_star()))
                .order(documents::status.asc())
                .load(conn)?;
            Ok(rows
                .into_iter()
                .map(|(status, count)| (status.and_then(|s| u16::try_from(s).ok()), count as u64))
                .collect())
        })
        .await
    }
}

#[async_trait]
impl DocumentStore for DieselDocumentRepository {
    async fn find_by_url(&self, url: &str) -> Result<Option<CrawlDocument>, StoreError> {
        let url = url.to_string();
        let pool = self.pool.clone();

        let record = run_blocking(pool, move |conn| {
            documents::table
                .filter(documents::url.eq(&url))
                .first::<DocumentRecord>(conn)
                .optional()
        })
        .await?;
        Ok(record.map(CrawlDocument::from))
    }

    async fn create(&self, doc: &CrawlDocument) -> Result<String, StoreError> {
        let row = DocumentRow::encode(doc, Uuid::new_v4().to_string())?;
        let pool = self.pool.clone();

        let id = run_blocking(pool, move |conn| {
            diesel::insert_into(documents::table)
                .values(&row.insertable())
                .execute(conn)?;
            Ok(row.id)
        })
        .await?;
        Ok(id)
    }

    async fn update_by_url(&self, url: &str, doc: &CrawlDocument) -> Result<bool, StoreError> {
        let target = url.to_string();
        let row = DocumentRow::encode(doc, String::new())?;
        let pool = self.pool.clone();

        let rows = run_blocking(pool, move |conn| {
            diesel::update(documents::table.filter(documents::url.eq(&target)))
                .set(&row.changes())
                .execute(conn)
        })
        .await?;

        if rows == 0 {
            return Err(StoreError::NotFound(url.to_string()));
        }
        Ok(true)
    }

    async fn url_exists(&self, url: &str) -> Result<bool, StoreError> {
        let url = url.to_string();
        let pool = self.pool.clone();

        let count = run_blocking(pool, move |conn| {
            documents::table
                .filter(documents::url.eq(&url))
                .select(count_star())
                .first::<i64>(conn)
        })
        .await?;
        Ok(count > 0)
    }

    async fn upsert_by_url(
        &self,
        doc: &CrawlDocument,
        re_crawl: bool,
    ) -> Result<UpsertOutcome, StoreError> {
        let row = DocumentRow::encode(doc, Uuid::new_v4().to_string())?;
        let pool = self.pool.clone();

        let outcome = run_blocking(pool, move |conn| {
            conn.immediate_transaction::<_, DieselError, _>(|conn| {
                let existing: Option<String> = documents::table
                    .filter(documents::url.eq(&row.url))
                    .select(documents::id)
                    .first(conn)
                    .optional()?;

                if re_crawl {
                    diesel::insert_into(documents::table)
                        .values(&row.insertable())
                        .on_conflict(documents::url)
                        .do_update()
                        .set(&row.changes())
                        .execute(conn)?;
                } else {
                    diesel::insert_into(documents::table)
                        .values(&row.insertable())
                        .on_conflict_do_nothing()
                        .execute(conn)?;
                }

                let id: String = documents::table
                    .filter(documents::url.eq(&row.url))
                    .select(documents::id)
                    .first(conn)?;

                let action = match (existing, re_crawl) {
                    (None, _) => UpsertAction::Created,
                    (Some(_), true) => UpsertAction::Updated,
                    (Some(_), false) => UpsertAction::Unchanged,
                };
                Ok(UpsertOutcome { id, action })
            })
        })
        .await?;
        Ok(outcome)
    }
}
