//! # Tideline Domain
//!
//! Domain types and models for the Tideline offline-first sync core.
//!
//! This crate contains:
//! - Queue and connectivity data types (`QueuedOperation`, `SyncStatus`, ...)
//! - Domain error types and Result definitions
//! - Configuration structures
//!
//! ## Architecture
//! - No dependencies on other Tideline crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
