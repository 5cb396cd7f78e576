use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::error::CacheError;
use crate::worker::http::{Response, ResponseSource};

/// Named cache generations of request/response pairs.
///
/// Calls are synchronous; the router runs writes on the blocking pool.
pub trait CacheStore: Send + Sync + 'static {
    /// Create the generation if it doesn't exist yet
    fn open(&self, generation: &str) -> Result<(), CacheError>;

    fn put(&self, generation: &str, key: &str, response: &Response) -> Result<(), CacheError>;

    fn get(&self, generation: &str, key: &str) -> Result<Option<Response>, CacheError>;

    fn keys(&self, generation: &str) -> Result<Vec<String>, CacheError>;

    /// Names of every generation present, sorted
    fn generations(&self) -> Result<Vec<String>, CacheError>;

    /// Returns false if the generation did not exist
    fn delete_generation(&self, generation: &str) -> Result<bool, CacheError>;

    /// Look `key` up in every generation, oldest name first
    fn match_any(&self, key: &str) -> Result<Option<Response>, CacheError> {
        for generation in self.generations()? {
            if let Some(response) = self.get(&generation, key)? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }
}

/// Run a store call on the blocking pool
pub async fn run_blocking<S, T, F>(store: &Arc<S>, f: F) -> Result<T, CacheError>
where
    S: CacheStore,
    T: Send + 'static,
    F: FnOnce(&S) -> Result<T, CacheError> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || f(&store))
        .await
        .map_err(|e| CacheError::Unavailable(format!("cache task failed: {}", e)))?
}

type Generation = BTreeMap<String, Response>;

/// `CacheStore` kept in memory, optionally bounded to a number of entries
/// per generation.
#[derive(Default)]
pub struct MemoryCacheStore {
    generations: RwLock<BTreeMap<String, Generation>>,
    max_entries: Option<usize>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject writes that would grow a generation past `max_entries`
    pub fn with_quota(max_entries: usize) -> Self {
        Self {
            generations: RwLock::default(),
            max_entries: Some(max_entries),
        }
    }

    fn poisoned() -> CacheError {
        CacheError::Unavailable("cache lock poisoned".to_string())
    }
}

impl CacheStore for MemoryCacheStore {
    fn open(&self, generation: &str) -> Result<(), CacheError> {
        let mut generations = self.generations.write().map_err(|_| Self::poisoned())?;
        generations.entry(generation.to_string()).or_default();
        Ok(())
    }

    fn put(&self, generation: &str, key: &str, response: &Response) -> Result<(), CacheError> {
        let mut generations = self.generations.write().map_err(|_| Self::poisoned())?;
        let entries = generations.entry(generation.to_string()).or_default();
        if let Some(max) = self.max_entries {
            if !entries.contains_key(key) && entries.len() >= max {
                return Err(CacheError::QuotaExceeded);
            }
        }
        let mut stored = response.clone();
        stored.source = ResponseSource::Cache;
        entries.insert(key.to_string(), stored);
        Ok(())
    }

    fn get(&self, generation: &str, key: &str) -> Result<Option<Response>, CacheError> {
        let generations = self.generations.read().map_err(|_| Self::poisoned())?;
        Ok(generations
            .get(generation)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    fn keys(&self, generation: &str) -> Result<Vec<String>, CacheError> {
        let generations = self.generations.read().map_err(|_| Self::poisoned())?;
        Ok(generations
            .get(generation)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn generations(&self) -> Result<Vec<String>, CacheError> {
        let generations = self.generations.read().map_err(|_| Self::poisoned())?;
        Ok(generations.keys().cloned().collect())
    }

    fn delete_generation(&self, generation: &str) -> Result<bool, CacheError> {
        let mut generations = self.generations.write().map_err(|_| Self::poisoned())?;
        Ok(generations.remove(generation).is_some())
    }
}
