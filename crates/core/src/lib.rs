//! # Tideline Core
//!
//! Core services and port interfaces for the offline-first sync subsystem.
//!
//! This crate contains:
//! - Port traits implemented by infrastructure (`OperationQueue`,
//!   `KeyValueStore`, `ReachabilityProbe`, `OperationExecutor`)
//! - The connectivity monitor
//! - The sync engine: queue draining, retry/backoff, dead-lettering,
//!   status publication
//!
//! ## Architecture
//! - Depends only on `tideline-domain`
//! - All I/O happens behind the port traits; this crate stays testable
//!   with in-memory fakes and a manual clock

pub mod connectivity;
pub mod ports;
pub mod sync;

pub use connectivity::ConnectivityMonitor;
pub use ports::{
    Clock, CredentialRefresher, KeyValueStore, OperationExecutor, OperationQueue,
    ReachabilityProbe, SystemClock,
};
pub use sync::{BackoffPolicy, DispatchError, ExecutorRegistry, FailureKind, SyncEngine};
