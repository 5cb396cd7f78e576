//! Online/offline state.
//!
//! - `ConnectivityMonitor`: the single owner of last-known connectivity on
//!   the worker side; broadcasts changes to controlled clients
//! - `ConnectivityProbe`: how "check now" re-reads the state
//! - `ConnectivityContext`: the in-page view pages gate network actions on

pub mod context;
pub mod monitor;
pub mod probe;

pub use context::ConnectivityContext;
pub use monitor::{ConnectivityMonitor, ConnectivityStatus};
pub use probe::{ConnectivityProbe, FixedProbe, HttpProbe};
