//! Page-local persistence of last-known-good data.
//!
//! Everything here lives behind a `localStorage`-like string key/value
//! store. Values are JSON; keys match what the storefront pages use so the
//! data stays readable by them.
//!
//! - `OfflineCollection`: store and user lists with connectivity-gated fetch
//! - `CheckoutStore`: the in-progress checkout, restorable for an hour
//! - `NoticeLimiter`: at most one stale-data notice per window

pub mod checkout;
pub mod collection;
pub mod limiter;
pub mod local_store;

pub use checkout::{CheckoutStore, PersistedCheckout, CHECKOUT_KEY};
pub use collection::{CollectionProfile, FetchState, Loaded, OfflineCollection};
pub use limiter::{NoticeLimiter, LAST_VISIT_KEY};
pub use local_store::{FileLocalStore, LocalStore, MemoryLocalStore};
