//! Fetch interception.
//!
//! Every request is classified once into a `Route`. Each route has a
//! strategy returning `Result<Response, FetchError>`; `fallback` turns any
//! error into a response, so a routed request always gets an answer.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use reqwest::Method;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::{run_blocking, CacheStore};
use crate::error::FetchError;
use crate::network::Network;

use super::http::{Request, Response};
use super::manifest::AssetManifest;

/// Status text of synthesized failures
const UNAVAILABLE: &str = "Service Unavailable";

/// Body of the generic failure response
pub const NETWORK_ERROR_TEXT: &str = "Error de red, por favor verifica tu conexión.";

/// Error message of the synthesized API failure
pub const API_ERROR_TEXT: &str = "Error de red";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// `HEAD` to the app origin, answered locally
    Ping,
    /// Left to the browser
    Passthrough,
    /// Backend call: network only
    Api,
    /// Page load: network, then shell
    Navigation,
    /// Everything else: cache, then network
    Static,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Respond(Response),
    /// Not intercepted
    Passthrough,
}

impl FetchOutcome {
    pub fn response(&self) -> Option<&Response> {
        match self {
            FetchOutcome::Respond(response) => Some(response),
            FetchOutcome::Passthrough => None,
        }
    }
}

pub struct FetchRouter<S, N> {
    manifest: Arc<AssetManifest>,
    cache: Arc<S>,
    network: Arc<N>,
    timeout: Duration,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl<S: CacheStore, N: Network> FetchRouter<S, N> {
    pub fn new(manifest: Arc<AssetManifest>, cache: Arc<S>, network: Arc<N>, timeout: Duration) -> Self {
        Self {
            manifest,
            cache,
            network,
            timeout,
            pending: Mutex::new(Vec::new()),
        }
    }

    fn pending(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn classify(&self, request: &Request) -> Route {
        if request.method == Method::HEAD && self.manifest.is_app_origin(request) {
            Route::Ping
        } else if self.manifest.is_api(request) {
            Route::Api
        } else if self.manifest.is_passthrough(request) || request.method != Method::GET {
            Route::Passthrough
        } else if request.is_navigation() {
            Route::Navigation
        } else {
            Route::Static
        }
    }

    pub async fn handle(&self, request: &Request) -> FetchOutcome {
        let route = self.classify(request);
        debug!(url = %request.url, method = %request.method, route = ?route, "Fetch");

        let result = match route {
            Route::Passthrough => return FetchOutcome::Passthrough,
            Route::Ping => Ok(Response::synthesized(200, "OK", Vec::new())),
            Route::Api => self.fetch_network(request).await,
            Route::Navigation => self.fetch_network(request).await,
            Route::Static => self.static_asset(request).await,
        };

        match result {
            Ok(response) => FetchOutcome::Respond(response),
            Err(e) => {
                warn!(url = %request.url, route = ?route, error = %e, "Fetch failed, falling back");
                FetchOutcome::Respond(self.fallback(request, route).await)
            }
        }
    }

    /// Wait for background cache writes started so far
    pub async fn flush(&self) {
        let handles = std::mem::take(&mut *self.pending());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Background cache write panicked");
            }
        }
    }

    async fn fetch_network(&self, request: &Request) -> Result<Response, FetchError> {
        tokio::time::timeout(self.timeout, self.network.fetch(request))
            .await
            .map_err(|_| FetchError::Timeout(self.timeout))?
    }

    async fn static_asset(&self, request: &Request) -> Result<Response, FetchError> {
        let key = request.cache_key();
        if let Some(hit) = self.cache_get(&self.manifest.generation, &key).await {
            debug!(url = %request.url, "Cache hit");
            return Ok(hit);
        }

        let response = self.fetch_network(request).await?;
        if response.is_cacheable() && self.manifest.is_cacheable_extension(request) {
            self.spawn_put(key, response.clone());
        }
        Ok(response)
    }

    fn spawn_put(&self, key: String, response: Response) {
        let cache = Arc::clone(&self.cache);
        let generation = self.manifest.generation.clone();
        let handle = tokio::task::spawn_blocking(move || {
            match cache.put(&generation, &key, &response) {
                Ok(()) => debug!(generation = %generation, key = %key, "Cached network response"),
                Err(e) => warn!(generation = %generation, key = %key, error = %e, "Cache write failed"),
            }
        });
        let mut pending = self.pending();
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    async fn cache_get(&self, generation: &str, key: &str) -> Option<Response> {
        let (generation, key) = (generation.to_string(), key.to_string());
        match run_blocking(&self.cache, move |cache| cache.get(&generation, &key)).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(error = %e, "Cache read failed");
                None
            }
        }
    }

    async fn cache_match_any(&self, key: &str) -> Option<Response> {
        let key = key.to_string();
        match run_blocking(&self.cache, move |cache| cache.match_any(&key)).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(error = %e, "Cache read failed");
                None
            }
        }
    }

    /// The response for a request whose strategy failed
    async fn fallback(&self, request: &Request, route: Route) -> Response {
        match route {
            Route::Api => Response::json(503, UNAVAILABLE, &json!({ "error": API_ERROR_TEXT })),
            Route::Navigation => {
                for key in [self.manifest.shell_key(), self.manifest.offline_key()]
                    .into_iter()
                    .flatten()
                {
                    if let Some(page) = self.cache_get(&self.manifest.generation, &key).await {
                        return page;
                    }
                }
                network_error()
            }
            Route::Static if request.destination.has_cache_fallback() => self
                .cache_match_any(&request.cache_key())
                .await
                .unwrap_or_else(network_error),
            _ => network_error(),
        }
    }
}

/// Generic 503 for requests nothing else can answer
pub fn network_error() -> Response {
    Response::synthesized(503, UNAVAILABLE, NETWORK_ERROR_TEXT.as_bytes().to_vec())
        .with_header("content-type", "text/plain; charset=utf-8")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use crate::config::Config;
    use crate::network::testing::FakeNetwork;
    use crate::worker::http::{Destination, ResponseKind, ResponseSource};

    const APP: &str = "https://extravagant-style.vercel.app";
    const API: &str = "https://extravagant-back-1.onrender.com";
    const GEN: &str = "extravagant-style-v1";

    fn router(timeout: Duration) -> (FetchRouter<MemoryCacheStore, FakeNetwork>, Arc<MemoryCacheStore>, Arc<FakeNetwork>) {
        let manifest = Arc::new(AssetManifest::from_config(&Config::default()).expect("manifest"));
        let cache = Arc::new(MemoryCacheStore::new());
        let network = Arc::new(FakeNetwork::new());
        let router = FetchRouter::new(manifest, cache.clone(), network.clone(), timeout);
        (router, cache, network)
    }

    fn ok(body: &str) -> Response {
        Response::synthesized(200, "OK", body.as_bytes().to_vec())
    }

    fn url(path: &str) -> String {
        format!("{}{}", APP, path)
    }

    #[tokio::test]
    async fn test_static_response_cached_after_flush() {
        let (router, cache, network) = router(Duration::from_secs(5));
        network.serve(&url("/static/css/main.css"), b"body{margin:0}");

        let request = Request::get(&url("/static/css/main.css")).expect("url");
        let outcome = router.handle(&request).await;
        let response = outcome.response().expect("intercepted");
        assert_eq!(response.source, ResponseSource::Network);

        router.flush().await;
        let cached = cache.get(GEN, &url("/static/css/main.css")).expect("read").expect("written");
        assert_eq!(cached.body, b"body{margin:0}");

        // Served from cache from now on
        network.set_offline(true);
        let again = router.handle(&request).await;
        assert_eq!(again.response().expect("intercepted").source, ResponseSource::Cache);
    }

    #[tokio::test]
    async fn test_uncacheable_responses_not_written() {
        let (router, cache, network) = router(Duration::from_secs(5));
        let mut redirected = ok("x");
        redirected.redirected = true;
        network.serve_response(&url("/a.js"), redirected);
        let mut foreign = ok("y");
        foreign.kind = ResponseKind::Cors;
        network.serve_response(&url("/b.js"), foreign);
        network.serve(&url("/productos"), b"<html>");

        for path in ["/a.js", "/b.js", "/productos"] {
            router.handle(&Request::get(&url(path)).expect("url")).await;
        }
        router.flush().await;
        assert!(cache.keys(GEN).expect("keys").is_empty());
    }

    #[tokio::test]
    async fn test_api_failure_is_503_json() {
        let (router, _cache, network) = router(Duration::from_secs(5));
        network.set_offline(true);

        let request = Request::get(&format!("{}/api/coupons/SAVE10", API)).expect("url");
        let response = router.handle(&request).await.response().cloned().expect("intercepted");
        assert_eq!(response.status, 503);
        assert_eq!(response.header("content-type"), Some("application/json"));
        let body: serde_json::Value = serde_json::from_slice(&response.body).expect("json body");
        assert_eq!(body, json!({"error": "Error de red"}));
    }

    #[tokio::test]
    async fn test_api_is_never_served_from_cache() {
        let (router, cache, network) = router(Duration::from_secs(5));
        let key = format!("{}/tienda", API);
        cache.put(GEN, &key, &ok("[]")).expect("seed");
        network.set_offline(true);

        let response = router.handle(&Request::get(&key).expect("url")).await;
        assert_eq!(response.response().expect("intercepted").status, 503);
    }

    #[tokio::test]
    async fn test_api_post_is_routed() {
        let (router, _cache, network) = router(Duration::from_secs(5));
        network.set_offline(true);
        let request = Request::parse(Method::POST, &format!("{}/pedidos", API))
            .expect("url")
            .with_body(b"{}".to_vec());
        assert_eq!(router.classify(&request), Route::Api);
        assert_eq!(router.handle(&request).await.response().expect("intercepted").status, 503);
    }

    #[tokio::test]
    async fn test_navigation_failure_serves_shell() {
        let (router, cache, network) = router(Duration::from_secs(5));
        cache.put(GEN, &url("/index.html"), &ok("<div id=root>")).expect("seed");
        cache.put(GEN, &url("/offline.html"), &ok("offline")).expect("seed");
        network.set_offline(true);

        let request = Request::navigate(&url("/lista-productos")).expect("url");
        let response = router.handle(&request).await.response().cloned().expect("intercepted");
        assert_eq!(response.body, b"<div id=root>");
    }

    #[tokio::test]
    async fn test_navigation_without_shell_serves_offline_page_then_503() {
        let (router, cache, network) = router(Duration::from_secs(5));
        network.set_offline(true);
        let request = Request::navigate(&url("/checkout")).expect("url");

        let response = router.handle(&request).await.response().cloned().expect("intercepted");
        assert_eq!(response.status, 503);
        assert_eq!(response.text(), NETWORK_ERROR_TEXT);

        cache.put(GEN, &url("/offline.html"), &ok("offline")).expect("seed");
        let response = router.handle(&request).await.response().cloned().expect("intercepted");
        assert_eq!(response.text(), "offline");
    }

    #[tokio::test]
    async fn test_precached_icon_served_without_network() {
        let (router, cache, network) = router(Duration::from_secs(5));
        cache.put(GEN, &url("/icon-192x192.png"), &ok("png-bytes")).expect("seed");
        network.set_offline(true);

        let request = Request::get(&url("/icon-192x192.png")).expect("url");
        let response = router.handle(&request).await.response().cloned().expect("intercepted");
        assert_eq!(response.body, b"png-bytes");
        assert_eq!(network.calls(), 0);
    }

    #[tokio::test]
    async fn test_last_resort_match_for_images_only() {
        let (router, cache, network) = router(Duration::from_secs(5));
        cache.put("extravagant-style-v0", &url("/logo.png"), &ok("old logo")).expect("seed");
        cache.put("extravagant-style-v0", &url("/app.js"), &ok("old js")).expect("seed");
        network.set_offline(true);

        let image = Request::get(&url("/logo.png")).expect("url");
        assert_eq!(image.destination, Destination::Image);
        let response = router.handle(&image).await.response().cloned().expect("intercepted");
        assert_eq!(response.text(), "old logo");

        let script = Request::get(&url("/app.js")).expect("url");
        let response = router.handle(&script).await.response().cloned().expect("intercepted");
        assert_eq!(response.status, 503);
    }

    #[tokio::test]
    async fn test_head_ping_and_passthrough() {
        let (router, _cache, network) = router(Duration::from_secs(5));
        let ping = Request::parse(Method::HEAD, &url("/")).expect("url");
        let response = router.handle(&ping).await.response().cloned().expect("intercepted");
        assert_eq!(response.status, 200);
        assert!(response.body.is_empty());

        let hmr = Request::get(&url("/sockjs-node/info")).expect("url");
        assert_eq!(router.handle(&hmr).await, FetchOutcome::Passthrough);
        let form = Request::parse(Method::POST, &url("/contacto")).expect("url");
        assert_eq!(router.handle(&form).await, FetchOutcome::Passthrough);
        assert_eq!(network.calls(), 0);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let (router, _cache, network) = router(Duration::from_millis(50));
        network.set_hanging(true);
        let request = Request::get(&format!("{}/tienda", API)).expect("url");
        let response = router.handle(&request).await.response().cloned().expect("intercepted");
        assert_eq!(response.status, 503);
    }

    #[tokio::test]
    async fn test_cache_write_failure_is_not_fatal() {
        let manifest = Arc::new(AssetManifest::from_config(&Config::default()).expect("manifest"));
        let cache = Arc::new(MemoryCacheStore::with_quota(0));
        let network = Arc::new(FakeNetwork::new());
        network.serve(&url("/main.js"), b"js");
        let router = FetchRouter::new(manifest, cache.clone(), network, Duration::from_secs(5));

        let response = router.handle(&Request::get(&url("/main.js")).expect("url")).await;
        assert_eq!(response.response().expect("intercepted").status, 200);
        router.flush().await;
        assert!(cache.keys(GEN).expect("keys").is_empty());
    }
}
