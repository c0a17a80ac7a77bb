//! Configuration structures for the sync engine and connectivity monitor

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry and backoff configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Ceiling for the exponential backoff curve
    pub max_delay: Duration,
    /// Jitter applied to each delay, as a fraction of the delay (0.2 = ±20%)
    pub jitter_ratio: f64,
    /// Attempts before an operation is dead-lettered
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(300),
            jitter_ratio: 0.2,
            max_attempts: 5,
        }
    }
}

/// Configuration for the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Concurrently in-flight dispatches per drain pass
    pub worker_count: usize,
    /// Maximum operations claimed per drain pass
    pub batch_size: usize,
    /// Interval between opportunistic background drains
    pub drain_interval: Duration,
    /// Timeout for a single executor call
    pub dispatch_timeout: Duration,
    /// Join timeout when stopping the background task
    pub join_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            batch_size: 50,
            drain_interval: Duration::from_secs(60),
            dispatch_timeout: Duration::from_secs(30),
            join_timeout: Duration::from_secs(5),
            retry: RetryConfig::default(),
        }
    }
}

/// Configuration for the connectivity monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    /// Interval between reachability samples
    pub poll_interval: Duration,
    /// Join timeout when stopping the poll task
    pub join_timeout: Duration,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self { poll_interval: Duration::from_secs(15), join_timeout: Duration::from_secs(5) }
    }
}
