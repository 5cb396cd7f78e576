//! Cache storage for the interception layer and local persistence.
//!
//! This module provides:
//! - `CacheStore`: named cache generations of request/response pairs,
//!   with in-memory and on-disk backends
//! - `CachedData`: a value stamped with the time it was cached, used by
//!   the local persistence layer
//!
//! Only one generation is current at a time; the worker deletes the others
//! when it activates.

pub mod cached;
pub mod disk;
pub mod storage;

pub use cached::CachedData;
pub use disk::DiskCacheStore;
pub use storage::{run_blocking, CacheStore, MemoryCacheStore};
