//! Offline-aware caching and connectivity for the Extravagant Style
//! storefront.
//!
//! - [`worker`]: request interception with versioned cache generations
//! - [`connectivity`]: online/offline state, broadcast to open pages
//! - [`persistence`]: last-known-good store/user lists and checkout
//! - [`checkout`]: cart totals, offers and coupons
//! - [`push`]: push payloads and notification clicks
//! - [`api`]: typed client for the storefront backend

pub mod api;
pub mod cache;
pub mod checkout;
pub mod clients;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod models;
pub mod network;
pub mod notice;
pub mod persistence;
pub mod push;
pub mod worker;

pub use api::{ApiClient, ApiError};
pub use cache::{CacheStore, DiskCacheStore, MemoryCacheStore};
pub use clients::{ClientId, ClientMessage, Clients, WorkerMessage};
pub use config::Config;
pub use connectivity::{ConnectivityContext, ConnectivityMonitor, ConnectivityStatus};
pub use error::{CacheError, CouponError, FetchError, OfflineError, PushError};
pub use network::{HttpNetwork, Network};
pub use notice::{Notice, NoticeLevel};
pub use worker::{EventKind, EventOutcome, ServiceWorker, WorkerEvent};
