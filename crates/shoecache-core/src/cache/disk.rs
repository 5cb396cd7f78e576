use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::CacheError;
use crate::worker::http::{Response, ResponseKind, ResponseSource};

use super::storage::CacheStore;

/// Directory under the cache root holding one subdirectory per generation.
const CACHES_DIR: &str = "caches";

/// Response metadata stored next to the body file.
#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    key: String,
    status: u16,
    status_text: String,
    headers: BTreeMap<String, String>,
    kind: ResponseKind,
    #[serde(default)]
    redirected: bool,
}

/// `CacheStore` on disk: `<root>/caches/<generation>/<sha256(key)>.{json,body}`.
pub struct DiskCacheStore {
    root: PathBuf,
}

impl DiskCacheStore {
    pub fn new(cache_dir: &Path) -> Result<Self, CacheError> {
        let root = cache_dir.join(CACHES_DIR);
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn generation_dir(&self, generation: &str) -> Result<PathBuf, CacheError> {
        if generation.is_empty()
            || generation.starts_with('.')
            || generation.contains(['/', '\\'])
        {
            return Err(CacheError::Unavailable(format!(
                "invalid generation name: {}",
                generation
            )));
        }
        Ok(self.root.join(generation))
    }

    fn entry_stem(key: &str) -> String {
        hex::encode(Sha256::digest(key.as_bytes()))
    }

    fn read_meta(path: &Path) -> Result<Option<EntryMeta>, CacheError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl CacheStore for DiskCacheStore {
    fn open(&self, generation: &str) -> Result<(), CacheError> {
        std::fs::create_dir_all(self.generation_dir(generation)?)?;
        Ok(())
    }

    fn put(&self, generation: &str, key: &str, response: &Response) -> Result<(), CacheError> {
        let dir = self.generation_dir(generation)?;
        std::fs::create_dir_all(&dir)?;
        let stem = Self::entry_stem(key);

        let meta = EntryMeta {
            key: key.to_string(),
            status: response.status,
            status_text: response.status_text.clone(),
            headers: response.headers.clone(),
            kind: response.kind,
            redirected: response.redirected,
        };
        // Body first: an entry exists once its metadata does
        std::fs::write(dir.join(format!("{}.body", stem)), &response.body)?;
        std::fs::write(
            dir.join(format!("{}.json", stem)),
            serde_json::to_string_pretty(&meta)?,
        )?;
        debug!(generation = generation, key = key, bytes = response.body.len(), "Cache entry written");
        Ok(())
    }

    fn get(&self, generation: &str, key: &str) -> Result<Option<Response>, CacheError> {
        let dir = self.generation_dir(generation)?;
        let stem = Self::entry_stem(key);
        let Some(meta) = Self::read_meta(&dir.join(format!("{}.json", stem)))? else {
            return Ok(None);
        };
        let body = match std::fs::read(dir.join(format!("{}.body", stem))) {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(generation = generation, key = key, "Cache entry has no body, ignoring");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Some(Response {
            status: meta.status,
            status_text: meta.status_text,
            headers: meta.headers,
            body,
            kind: meta.kind,
            redirected: meta.redirected,
            source: ResponseSource::Cache,
        }))
    }

    fn keys(&self, generation: &str) -> Result<Vec<String>, CacheError> {
        let dir = self.generation_dir(generation)?;
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(meta) = Self::read_meta(&path)? {
                keys.push(meta.key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn generations(&self) -> Result<Vec<String>, CacheError> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn delete_generation(&self, generation: &str) -> Result<bool, CacheError> {
        let dir = self.generation_dir(generation)?;
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
