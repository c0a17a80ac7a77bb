//! Infrastructure error handling
//!
//! Keeps conversions from external crate errors (rusqlite, r2d2, tokio)
//! on the infrastructure side of the boundary.

mod conversions;

pub use conversions::{map_join_error, InfraError};
