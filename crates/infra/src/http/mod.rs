//! HTTP dispatch of queued operations to remote endpoints

pub mod executor;

pub use executor::{HttpExecutor, HttpExecutorConfig, TokenSource};
