//! Connectivity monitoring
//!
//! Single source of truth for current reachability. The monitor polls a
//! [`ReachabilityProbe`](crate::ports::ReachabilityProbe) and publishes
//! transitions on a watch channel.

pub mod monitor;

pub use monitor::ConnectivityMonitor;
