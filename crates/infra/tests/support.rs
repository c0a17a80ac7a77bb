//! Shared helpers for infra integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Once};

use tempfile::TempDir;
use tideline_domain::{OperationStatus, Priority, QueuedOperation};
use tideline_infra::database::{DbManager, SqlitePoolConfig};

/// Temporary database wrapper that keeps the underlying file alive for the
/// duration of a test run.
pub struct TestDatabase {
    pub manager: Arc<DbManager>,
    temp_dir: TempDir,
}

static TRACING: Once = Once::new();

/// Install a fmt subscriber once so failing tests show engine and store logs.
pub fn init_tracing() {
    TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with_test_writer()
            .init();
    });
}

impl TestDatabase {
    /// Create a new temporary database with migrations applied.
    pub fn new() -> Self {
        init_tracing();
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let manager = open_manager(&temp_dir);
        Self { manager: Arc::new(manager), temp_dir }
    }

    /// Reopen the same database file with a fresh manager, simulating an
    /// app restart.
    pub fn reopen(&mut self) -> Arc<DbManager> {
        let manager = Arc::new(open_manager(&self.temp_dir));
        self.manager = Arc::clone(&manager);
        manager
    }

    /// Execute a batch of SQL statements against the database.
    pub fn execute_batch(&self, sql: &str) {
        let conn = self
            .manager
            .get_connection()
            .expect("connection should be available for execute_batch");
        conn.execute_batch(sql).expect("SQL batch execution should succeed");
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

fn open_manager(temp_dir: &TempDir) -> DbManager {
    let db_path = temp_dir.path().join("test.db");
    let manager = DbManager::new(&db_path, &SqlitePoolConfig::default())
        .expect("db manager should be created");
    manager.run_migrations().expect("migrations should apply");
    manager
}

/// Utility helper for constructing queue operations inside tests.
pub fn make_operation(id: &str, priority: Priority, created_at: i64) -> QueuedOperation {
    QueuedOperation {
        id: id.to_string(),
        kind: "journal.create".to_string(),
        payload_json: r#"{"entry":"offline note","tags":["test"]}"#.to_string(),
        priority,
        created_at,
        attempts: 0,
        next_attempt_at: None,
        status: OperationStatus::Pending,
        last_error: None,
    }
}
