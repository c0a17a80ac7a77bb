//! Domain types for the queue, connectivity, and cache

use serde::{Deserialize, Serialize};

use crate::impl_status_conversions;

// ============================================================================
// Queue types
// ============================================================================

/// Dispatch priority for queued operations.
///
/// Lower weight dispatches first within a drain pass. Operations with equal
/// priority preserve enqueue order (`created_at` ascending).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Normal,
    Low,
}

impl Priority {
    /// Sort weight: lower dispatches first.
    pub fn weight(self) -> i64 {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Normal => 2,
            Self::Low => 3,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

impl_status_conversions!(Priority {
    Critical => "critical",
    High => "high",
    Normal => "normal",
    Low => "low",
});

/// Lifecycle state of a queued operation.
///
/// `pending -> in_flight -> {removed} | {pending after backoff} | {failed_dead}`.
/// A `FailedDead` operation is never auto-retried; only an explicit retry or
/// discard moves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    InFlight,
    FailedRetryable,
    FailedDead,
}

impl_status_conversions!(OperationStatus {
    Pending => "pending",
    InFlight => "in_flight",
    FailedRetryable => "failed_retryable",
    FailedDead => "failed_dead",
});

/// A durable mutation record awaiting dispatch to a remote executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedOperation {
    /// Stable id, assigned at enqueue
    pub id: String,
    /// Discriminator selecting the remote executor
    pub kind: String,
    /// Opaque JSON body forwarded to the executor
    pub payload_json: String,
    pub priority: Priority,
    /// Epoch seconds at enqueue
    pub created_at: i64,
    /// Completed dispatch attempts; monotonically non-decreasing
    pub attempts: u32,
    /// Backoff gate: not eligible before this epoch second
    pub next_attempt_at: Option<i64>,
    pub status: OperationStatus,
    pub last_error: Option<String>,
}

/// Point-in-time row counts for the queue table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: u64,
    pub in_flight: u64,
    pub dead: u64,
}

// ============================================================================
// Status types
// ============================================================================

/// Aggregate sync state pushed to subscribers.
///
/// Derived on every relevant transition, never persisted. This shape is the
/// stable contract the presentation layer depends on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub is_online: bool,
    pub is_syncing: bool,
    pub pending_count: u64,
    pub failed_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

// ============================================================================
// Connectivity types
// ============================================================================

/// Classified reachability state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    Wifi,
    Cellular,
    Ethernet,
    /// Reachability could not be determined; treated as potentially offline
    Unknown,
    Offline,
}

impl_status_conversions!(NetworkType {
    Wifi => "wifi",
    Cellular => "cellular",
    Ethernet => "ethernet",
    Unknown => "unknown",
    Offline => "offline",
});

/// Point-in-time connectivity snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityInfo {
    pub is_online: bool,
    pub network: NetworkType,
}

impl ConnectivityInfo {
    pub fn offline() -> Self {
        Self { is_online: false, network: NetworkType::Offline }
    }

    pub fn wifi() -> Self {
        Self { is_online: true, network: NetworkType::Wifi }
    }

    pub fn cellular() -> Self {
        Self { is_online: true, network: NetworkType::Cellular }
    }

    pub fn is_wifi(&self) -> bool {
        self.network == NetworkType::Wifi
    }

    pub fn is_cellular(&self) -> bool {
        self.network == NetworkType::Cellular
    }

    /// True only when the state is confirmed online. `Unknown` reachability
    /// reports false so the engine never drains into a certain-to-fail burst.
    pub fn is_usable(&self) -> bool {
        self.is_online && self.network != NetworkType::Unknown
    }
}

impl Default for ConnectivityInfo {
    /// Never defaults to online without confirmation.
    fn default() -> Self {
        Self { is_online: false, network: NetworkType::Unknown }
    }
}

// ============================================================================
// Cache types
// ============================================================================

/// A TTL-cached value, returned even past expiry with `is_stale = true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedValue {
    pub value: String,
    /// Epoch seconds; `None` means the entry never expires
    pub expires_at: Option<i64>,
    pub is_stale: bool,
}
