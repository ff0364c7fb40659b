//! SQLite pool shared by the document store and the job queue.
//!
//! Diesel's SQLite backend is synchronous, so every query goes through
//! [`run_blocking`] on tokio's blocking pool.

use std::path::Path;
use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PoolError};
use diesel::result::DatabaseErrorKind;
use diesel::SqliteConnection;

pub type DieselError = diesel::result::Error;

pub type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;

const MAX_CONNECTIONS: u32 = 10;
const CHECKOUT_TIMEOUT: Duration = Duration::from_secs(30);

/// Writers wait up to 10s for the lock held by another immediate
/// transaction rather than failing with SQLITE_BUSY.
const PRAGMAS: &str = "PRAGMA busy_timeout = 10000;
                       PRAGMA journal_mode = WAL;
                       PRAGMA synchronous = NORMAL;
                       PRAGMA foreign_keys = ON;
                       PRAGMA temp_store = MEMORY;";

#[derive(Debug, Clone, Copy)]
struct SqlitePragmas;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(PRAGMAS)
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Open a pool on the database file at `db_path`.
pub fn create_diesel_pool(db_path: &Path) -> Result<SqlitePool, PoolError> {
    create_diesel_pool_from_url(&db_path.display().to_string())
}

/// Open a pool from a path or `sqlite:` URL.
pub fn create_diesel_pool_from_url(database_url: &str) -> Result<SqlitePool, PoolError> {
    let path = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);

    Pool::builder()
        .max_size(MAX_CONNECTIONS)
        .connection_timeout(CHECKOUT_TIMEOUT)
        .connection_customizer(Box::new(SqlitePragmas))
        .build(ConnectionManager::<SqliteConnection>::new(path))
}

fn unavailable(message: String) -> DieselError {
    DieselError::DatabaseError(DatabaseErrorKind::Unknown, Box::new(message))
}

/// Check out a connection and run `f` on the blocking pool.
///
/// Pool checkout failures and panics in `f` surface as database errors.
pub async fn run_blocking<F, T>(pool: SqlitePool, f: F) -> Result<T, DieselError>
where
    F: FnOnce(&mut SqliteConnection) -> Result<T, DieselError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| unavailable(format!("no database connection: {}", e)))?;
        f(&mut conn)
    })
    .await
    .map_err(|e| unavailable(format!("database task failed: {}", e)))?
}
