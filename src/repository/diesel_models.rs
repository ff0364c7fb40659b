//! Diesel ORM models for database tables.
//!
//! List-valued document fields are stored as JSON text.

use diesel::prelude::*;

use crate::schema;

/// Document record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::documents)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DocumentRecord {
    pub id: String,
    pub url: String,
    pub netloc: String,
    pub status: Option<i32>,
    pub seen_time: String,
    pub parent: Option<String>,
    pub html: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub emails: String,
    pub pgp_keys: String,
    pub links: String,
    pub images: String,
    pub addresses: String,
    pub capture_id: Option<String>,
    pub is_onion: bool,
    pub in_scope: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// New document for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::documents)]
pub struct NewDocument<'a> {
    pub id: &'a str,
    pub url: &'a str,
    pub netloc: &'a str,
    pub status: Option<i32>,
    pub seen_time: &'a str,
    pub parent: Option<&'a str>,
    pub html: Option<&'a str>,
    pub title: Option<&'a str>,
    pub body: Option<&'a str>,
    pub emails: &'a str,
    pub pgp_keys: &'a str,
    pub links: &'a str,
    pub images: &'a str,
    pub addresses: &'a str,
    pub capture_id: Option<&'a str>,
    pub is_onion: bool,
    pub in_scope: bool,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

/// Columns overwritten on re-crawl. `None` clears the column.
#[derive(AsChangeset, Debug)]
#[diesel(table_name = schema::documents)]
#[diesel(treat_none_as_null = true)]
pub struct DocumentChanges<'a> {
    pub netloc: &'a str,
    pub status: Option<i32>,
    pub seen_time: &'a str,
    pub parent: Option<&'a str>,
    pub html: Option<&'a str>,
    pub title: Option<&'a str>,
    pub body: Option<&'a str>,
    pub emails: &'a str,
    pub pgp_keys: &'a str,
    pub links: &'a str,
    pub images: &'a str,
    pub addresses: &'a str,
    pub capture_id: Option<&'a str>,
    pub is_onion: bool,
    pub in_scope: bool,
    pub updated_at: &'a str,
}

/// Job record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::jobs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct JobRecord {
    pub id: i32,
    pub queue: String,
    pub kind: String,
    pub payload: String,
    pub status: String,
    pub enqueued_at: i64,
    pub expires_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub result_ttl_ms: i64,
    pub result: Option<String>,
    pub error: Option<String>,
}

/// New job for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::jobs)]
pub struct NewJob<'a> {
    pub queue: &'a str,
    pub kind: &'a str,
    pub payload: &'a str,
    pub status: &'a str,
    pub enqueued_at: i64,
    pub expires_at: i64,
    pub result_ttl_ms: i64,
}
