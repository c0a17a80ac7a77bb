//! SQLite-backed local store
//!
//! The local store owns all persisted bytes: the durable mutation queue and
//! the key/value area (connectivity hints, TTL-cached domain values). Every
//! repository call runs on the blocking pool with a pooled connection and
//! resolves only once the write is durable.

pub mod kv_repository;
pub mod manager;
pub mod pool;
pub mod queue_repository;

pub use kv_repository::SqliteKvStore;
pub use manager::DbManager;
pub use pool::{create_sqlite_pool, PooledSqliteConnection, SqlitePool, SqlitePoolConfig};
pub use queue_repository::SqliteQueueRepository;
