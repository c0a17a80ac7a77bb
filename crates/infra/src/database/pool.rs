//! SQLite pool helpers
//!
//! Thin wrapper around an `r2d2` SQLite connection pool that applies the
//! durability pragmas the local store depends on and converts pool errors
//! into the domain error type.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use tideline_domain::Result;

use crate::errors::InfraError;

/// Connection pool shared by the local-store repositories.
pub type SqlitePool = Pool<SqliteConnectionManager>;

/// A connection checked out of [`SqlitePool`].
pub type PooledSqliteConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Pool sizing and checkout behaviour.
#[derive(Debug, Clone)]
pub struct SqlitePoolConfig {
    /// Maximum simultaneously checked-out connections
    pub max_size: u32,
    /// How long a checkout waits before failing
    pub connection_timeout: Duration,
    /// SQLite busy handler timeout, applied per connection
    pub busy_timeout: Duration,
}

impl Default for SqlitePoolConfig {
    fn default() -> Self {
        Self {
            max_size: 4,
            connection_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Create an `Arc<SqlitePool>` for the database at `path`.
///
/// Queue correctness requires every write to be durable before the calling
/// future resolves, so connections run WAL with `synchronous=FULL` and no
/// write-behind buffering anywhere above them.
pub fn create_sqlite_pool<P: AsRef<Path>>(
    path: P,
    config: &SqlitePoolConfig,
) -> Result<Arc<SqlitePool>> {
    let busy_timeout_ms = config.busy_timeout.as_millis();
    let manager = SqliteConnectionManager::file(path.as_ref())
        .with_init(move |conn| apply_pragmas(conn, busy_timeout_ms));

    Pool::builder()
        .max_size(config.max_size.max(1))
        .connection_timeout(config.connection_timeout)
        .build(manager)
        .map(Arc::new)
        .map_err(|err| InfraError::from(err).into())
}

fn apply_pragmas(conn: &mut Connection, busy_timeout_ms: u128) -> rusqlite::Result<()> {
    conn.execute_batch(&format!(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = FULL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = {busy_timeout_ms};"
    ))
}
