//! Port interfaces implemented by infrastructure and feature modules

use std::time::Duration;

use async_trait::async_trait;
use tideline_domain::{CachedValue, ConnectivityInfo, QueueCounts, QueuedOperation, Result};

use crate::sync::DispatchError;

/// Durable queue of pending mutations.
///
/// Every mutation is a small read-modify-write transaction: a crash between
/// claiming an operation and its network completion must leave the row
/// recoverable as pending on the next launch.
#[async_trait]
pub trait OperationQueue: Send + Sync {
    /// Persist a new operation. Durable before this call resolves.
    async fn enqueue(&self, op: &QueuedOperation) -> Result<()>;

    /// Atomically claim eligible pending operations for dispatch.
    ///
    /// Flips rows with `next_attempt_at <= now` (or unset) to in-flight and
    /// returns them ordered by priority weight, then `created_at`. A row
    /// claimed here cannot be claimed again by a concurrent drain trigger.
    async fn claim_due(&self, now: i64, limit: usize) -> Result<Vec<QueuedOperation>>;

    /// Remove an operation after successful dispatch.
    async fn remove(&self, id: &str) -> Result<()>;

    /// Return a claimed operation to pending with updated retry bookkeeping.
    async fn reschedule(
        &self,
        id: &str,
        attempts: u32,
        next_attempt_at: i64,
        error: &str,
    ) -> Result<()>;

    /// Dead-letter an operation. Dead rows are never auto-retried.
    async fn mark_dead(&self, id: &str, error: &str) -> Result<()>;

    /// Crash recovery: flip any in-flight rows back to pending.
    /// Returns the number of released rows.
    async fn release_in_flight(&self) -> Result<u64>;

    /// Point-in-time row counts.
    async fn counts(&self) -> Result<QueueCounts>;

    /// Discard all pending and dead rows.
    async fn clear(&self) -> Result<()>;

    /// List dead-lettered operations for inspection.
    async fn dead_letters(&self) -> Result<Vec<QueuedOperation>>;

    /// Reset a dead operation to pending with a fresh attempt budget.
    /// Returns false if no dead row matched.
    async fn retry_dead(&self, id: &str) -> Result<bool>;

    /// Discard a single dead operation. Returns false if no dead row matched.
    async fn remove_dead(&self, id: &str) -> Result<bool>;
}

/// Durable key/value storage with optional TTL-cached values.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Durable before this call resolves; no write-behind buffering.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;

    /// Store a value with a TTL.
    async fn set_cached(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Read a TTL-cached value. Returns the value even past expiry with
    /// `is_stale = true`; `None` only if the key was never set or removed.
    async fn get_cached(&self, key: &str, now: i64) -> Result<Option<CachedValue>>;
}

/// Seam over the OS network-reachability API.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// Sample current reachability. Must not report online without
    /// confirmation; when in doubt, return `NetworkType::Unknown`.
    async fn sample(&self) -> ConnectivityInfo;
}

/// Remote executor for one operation kind, supplied by feature modules.
#[async_trait]
pub trait OperationExecutor: Send + Sync {
    /// Dispatch the operation against its remote endpoint.
    ///
    /// Callers must tolerate duplicate delivery; the queue guarantees
    /// at-least-once, idempotency is delegated to the remote service.
    async fn execute(&self, op: &QueuedOperation) -> std::result::Result<(), DispatchError>;
}

/// Hook invoked when a dispatch fails with expired credentials.
///
/// The engine calls this at most once per drain pass and reschedules the
/// affected operation without burning an attempt against it.
#[async_trait]
pub trait CredentialRefresher: Send + Sync {
    async fn refresh(&self) -> std::result::Result<(), DispatchError>;
}

/// Time source for scheduling decisions, epoch seconds.
///
/// Tests drive a manual implementation instead of waiting on real timers.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Wall-clock implementation of [`Clock`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}
