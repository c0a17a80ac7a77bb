//! # Tideline Infrastructure
//!
//! Infrastructure implementations of core domain ports.
//!
//! This crate contains:
//! - SQLite implementations of the local store (mutation queue + key/value)
//! - HTTP dispatch of queued operations to remote endpoints
//! - HTTP-based reachability probing
//!
//! ## Architecture
//! - Implements traits defined in `tideline-core`
//! - Depends on `tideline-domain` and `tideline-core`
//! - Contains all "impure" code (I/O, network)

pub mod connectivity;
pub mod database;
pub mod errors;
pub mod http;

// Re-export commonly used items
pub use connectivity::{HttpProbe, HttpProbeConfig};
pub use database::{DbManager, SqliteKvStore, SqliteQueueRepository};
pub use errors::InfraError;
pub use http::{HttpExecutor, HttpExecutorConfig, TokenSource};
