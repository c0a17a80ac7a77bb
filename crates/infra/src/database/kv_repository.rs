//! SQLite-backed implementation of the key/value store port.
//!
//! Plain values and TTL-cached values share one table. A cached read past
//! expiry still returns the value, flagged stale, so the UI stays populated
//! while a refresh is pending; only an explicit remove (or a never-set key)
//! yields `None`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use tideline_core::ports::KeyValueStore;
use tideline_domain::{CachedValue, Result as DomainResult};
use tokio::task;

use super::manager::DbManager;
use crate::errors::{map_join_error, InfraError};

/// SQLite-backed key/value repository.
pub struct SqliteKvStore {
    db: Arc<DbManager>,
}

impl SqliteKvStore {
    /// Construct a store backed by the shared database manager.
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    async fn upsert(&self, key: &str, value: &str, expires_at: Option<i64>) -> DomainResult<()> {
        let db = Arc::clone(&self.db);
        let key = key.to_string();
        let value = value.to_string();

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            conn.execute(
                "INSERT INTO kv_store (key, value, expires_at, updated_at)
                 VALUES (?1, ?2, ?3, CAST(strftime('%s','now') AS INTEGER))
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     expires_at = excluded.expires_at,
                     updated_at = excluded.updated_at",
                params![key, value, expires_at],
            )
            .map(|_| ())
            .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

#[async_trait]
impl KeyValueStore for SqliteKvStore {
    async fn get(&self, key: &str) -> DomainResult<Option<String>> {
        let db = Arc::clone(&self.db);
        let key = key.to_string();

        task::spawn_blocking(move || -> DomainResult<Option<String>> {
            let conn = db.get_connection()?;
            conn.query_row("SELECT value FROM kv_store WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn set(&self, key: &str, value: &str) -> DomainResult<()> {
        self.upsert(key, value, None).await
    }

    async fn remove(&self, key: &str) -> DomainResult<()> {
        let db = Arc::clone(&self.db);
        let key = key.to_string();

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])
                .map(|_| ())
                .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn set_cached(&self, key: &str, value: &str, ttl: Duration) -> DomainResult<()> {
        let expires_at = chrono::Utc::now().timestamp().saturating_add(ttl_to_secs(ttl));
        self.upsert(key, value, Some(expires_at)).await
    }

    async fn get_cached(&self, key: &str, now: i64) -> DomainResult<Option<CachedValue>> {
        let db = Arc::clone(&self.db);
        let key = key.to_string();

        task::spawn_blocking(move || -> DomainResult<Option<CachedValue>> {
            let conn = db.get_connection()?;
            let row = conn
                .query_row(
                    "SELECT value, expires_at FROM kv_store WHERE key = ?1",
                    params![key],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<i64>>(1)?)),
                )
                .optional()
                .map_err(map_sql_error)?;

            Ok(row.map(|(value, expires_at)| CachedValue {
                value,
                expires_at,
                is_stale: expires_at.is_some_and(|at| at <= now),
            }))
        })
        .await
        .map_err(map_join_error)?
    }
}

fn map_sql_error(err: rusqlite::Error) -> tideline_domain::TidelineError {
    InfraError::from(err).into()
}

fn ttl_to_secs(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::super::pool::SqlitePoolConfig;
    use super::*;

    async fn setup_store() -> (SqliteKvStore, TempDir) {
        let temp_dir = TempDir::new().expect("temp dir created");
        let db_path = temp_dir.path().join("test.db");

        let manager = DbManager::new(&db_path, &SqlitePoolConfig::default())
            .expect("manager created");
        manager.run_migrations().expect("migrations applied");

        (SqliteKvStore::new(Arc::new(manager)), temp_dir)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn set_then_get_round_trips() {
        let (store, _dir) = setup_store().await;

        store.set("profile:name", "Ada").await.unwrap();
        assert_eq!(store.get("profile:name").await.unwrap().as_deref(), Some("Ada"));
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn set_overwrites_previous_value() {
        let (store, _dir) = setup_store().await;

        store.set("k", "v1").await.unwrap();
        store.set("k", "v2").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn remove_deletes_value() {
        let (store, _dir) = setup_store().await;

        store.set("k", "v").await.unwrap();
        store.remove("k").await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());

        // Removing again is a no-op.
        store.remove("k").await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cached_value_is_fresh_before_expiry_and_stale_after() {
        let (store, _dir) = setup_store().await;

        store.set_cached("feed", r#"{"items":[]}"#, Duration::from_secs(60)).await.unwrap();

        let now = chrono::Utc::now().timestamp();
        let fresh = store.get_cached("feed", now).await.unwrap().expect("value exists");
        assert!(!fresh.is_stale);
        assert_eq!(fresh.value, r#"{"items":[]}"#);

        // Past expiry the value is still returned, flagged stale.
        let stale = store.get_cached("feed", now + 3_600).await.unwrap().expect("value exists");
        assert!(stale.is_stale);
        assert_eq!(stale.value, fresh.value);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cached_read_of_plain_value_never_goes_stale() {
        let (store, _dir) = setup_store().await;

        store.set("k", "v").await.unwrap();
        let cached = store.get_cached("k", i64::MAX).await.unwrap().expect("value exists");
        assert!(!cached.is_stale);
        assert!(cached.expires_at.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cached_read_returns_none_only_for_unset_or_removed_keys() {
        let (store, _dir) = setup_store().await;

        assert!(store.get_cached("never-set", 0).await.unwrap().is_none());

        store.set_cached("k", "v", Duration::from_secs(1)).await.unwrap();
        store.remove("k").await.unwrap();
        assert!(store.get_cached("k", 0).await.unwrap().is_none());
    }
}
