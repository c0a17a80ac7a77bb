//! Sync engine: queue draining, retry/backoff, dead-lettering, status pub/sub
//!
//! All long-running pieces follow an explicit lifecycle: join handles are
//! tracked, cancellation is explicit via `CancellationToken`, and every
//! dispatch is wrapped in a timeout.

pub mod backoff;
pub mod engine;
mod errors;
pub mod registry;

pub use backoff::BackoffPolicy;
pub use engine::SyncEngine;
pub use errors::{DispatchError, FailureKind};
pub use registry::ExecutorRegistry;
