//! Install and activate.
//!
//! Install fills the current generation from the manifest; individual
//! failures are reported, never fatal. Activate deletes every other
//! generation and claims open pages.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::cache::{run_blocking, CacheStore};
use crate::clients::Clients;
use crate::network::Network;

use super::http::Request;
use super::manifest::AssetManifest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerState {
    #[default]
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstallReport {
    pub generation: String,
    /// Manifest paths now in the cache
    pub cached: Vec<String>,
    /// Manifest paths that could not be cached, with the reason
    pub failed: Vec<(String, String)>,
}

impl InstallReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivateReport {
    pub generation: String,
    pub deleted: Vec<String>,
    /// Pages newly taken under control
    pub claimed: usize,
}

async fn precache_one<S: CacheStore, N: Network>(
    manifest: &AssetManifest,
    cache: &Arc<S>,
    network: &N,
    timeout: Duration,
    path: &str,
) -> Result<(), String> {
    let url = manifest.url_for(path).map_err(|e| e.to_string())?;
    let request = Request::new(reqwest::Method::GET, url);
    let response = tokio::time::timeout(timeout, network.fetch(&request))
        .await
        .map_err(|_| format!("timed out after {:?}", timeout))?
        .map_err(|e| e.to_string())?;
    if !response.is_ok() {
        return Err(format!("HTTP {}", response.status));
    }
    if !response.is_cacheable() {
        return Err(format!("HTTP {} not cacheable", response.status));
    }

    let generation = manifest.generation.clone();
    let key = request.cache_key();
    run_blocking(cache, move |cache| cache.put(&generation, &key, &response))
        .await
        .map_err(|e| e.to_string())
}

/// Fetch the whole manifest concurrently into the current generation
pub async fn install<S: CacheStore, N: Network>(
    manifest: &AssetManifest,
    cache: &Arc<S>,
    network: &N,
    timeout: Duration,
) -> InstallReport {
    let mut report = InstallReport {
        generation: manifest.generation.clone(),
        ..Default::default()
    };

    let generation = manifest.generation.clone();
    if let Err(e) = run_blocking(cache, move |cache| cache.open(&generation)).await {
        warn!(generation = %manifest.generation, error = %e, "Could not open cache generation");
        report.failed = manifest
            .precache()
            .iter()
            .map(|path| (path.clone(), e.to_string()))
            .collect();
        return report;
    }

    let results = join_all(
        manifest
            .precache()
            .iter()
            .map(|path| precache_one(manifest, cache, network, timeout, path)),
    )
    .await;

    for (path, result) in manifest.precache().iter().zip(results) {
        match result {
            Ok(()) => {
                debug!(path = %path, "Precached");
                report.cached.push(path.clone());
            }
            Err(reason) => {
                warn!(path = %path, reason = %reason, "Precache failed");
                report.failed.push((path.clone(), reason));
            }
        }
    }

    info!(
        generation = %report.generation,
        cached = report.cached.len(),
        failed = report.failed.len(),
        "Install finished"
    );
    report
}

/// Drop superseded generations and take control of open pages
pub async fn activate<S: CacheStore>(
    manifest: &AssetManifest,
    cache: &Arc<S>,
    clients: &Clients,
) -> ActivateReport {
    let current = manifest.generation.clone();
    let mut report = ActivateReport {
        generation: current.clone(),
        ..Default::default()
    };

    let keep = current.clone();
    let cleanup = run_blocking(cache, move |cache| {
        let mut deleted = Vec::new();
        for generation in cache.generations()? {
            if generation == keep {
                continue;
            }
            match cache.delete_generation(&generation) {
                Ok(true) => {
                    info!(generation = %generation, "Deleted old cache generation");
                    deleted.push(generation);
                }
                Ok(false) => {}
                Err(e) => warn!(generation = %generation, error = %e, "Could not delete cache generation"),
            }
        }
        Ok(deleted)
    })
    .await;

    match cleanup {
        Ok(deleted) => report.deleted = deleted,
        Err(e) => warn!(generation = %current, error = %e, "Cache cleanup failed"),
    }

    report.claimed = clients.claim();
    info!(generation = %current, claimed = report.claimed, "Activated");
    report
}
