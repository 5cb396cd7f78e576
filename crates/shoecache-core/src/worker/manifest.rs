use std::collections::BTreeSet;

use reqwest::{Method, Url};

use crate::config::Config;
use crate::error::FetchError;

use super::http::Request;

/// Suffixes of hot-reload chunks the dev server serves under `/static/js/`
const HOT_UPDATE_SUFFIXES: [&str; 2] = [".hot-update.js", ".hot-update.json"];

/// Everything the router needs to classify a request: origins, the cache
/// generation and its precache list, and the caching allow-list.
#[derive(Debug, Clone)]
pub struct AssetManifest {
    pub generation: String,
    app_origin: Url,
    api_origin: String,
    precache: Vec<String>,
    shell_path: String,
    offline_path: String,
    cacheable_extensions: BTreeSet<String>,
    passthrough_prefixes: Vec<String>,
}

fn parse_url(raw: &str) -> Result<Url, FetchError> {
    Url::parse(raw).map_err(|e| FetchError::InvalidRequest(format!("{}: {}", raw, e)))
}

impl AssetManifest {
    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        let app_origin = parse_url(&config.app_origin)?;
        let api_origin = parse_url(&config.api_base_url)?.origin().ascii_serialization();
        Ok(Self {
            generation: config.cache_version.clone(),
            app_origin,
            api_origin,
            precache: config.precache.clone(),
            shell_path: config.shell_path.clone(),
            offline_path: config.offline_path.clone(),
            cacheable_extensions: config
                .cacheable_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            passthrough_prefixes: config.passthrough_prefixes.clone(),
        })
    }

    pub fn app_origin(&self) -> String {
        self.app_origin.origin().ascii_serialization()
    }

    /// Absolute URL of an app path
    pub fn url_for(&self, path: &str) -> Result<Url, FetchError> {
        self.app_origin
            .join(path)
            .map_err(|e| FetchError::InvalidRequest(format!("{}: {}", path, e)))
    }

    /// Cache key of an app path
    pub fn key_for(&self, path: &str) -> Option<String> {
        self.url_for(path).ok().map(|url| Request::new(Method::GET, url).cache_key())
    }

    pub fn precache(&self) -> &[String] {
        &self.precache
    }

    pub fn shell_key(&self) -> Option<String> {
        self.key_for(&self.shell_path)
    }

    pub fn offline_key(&self) -> Option<String> {
        self.key_for(&self.offline_path)
    }

    pub fn is_app_origin(&self, request: &Request) -> bool {
        request.origin() == self.app_origin()
    }

    pub fn is_api(&self, request: &Request) -> bool {
        request.origin() == self.api_origin
    }

    /// Dev-server and hot-reload traffic on the app origin
    pub fn is_passthrough(&self, request: &Request) -> bool {
        if !self.is_app_origin(request) {
            return false;
        }
        let path = request.path();
        self.passthrough_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
            || (path.starts_with("/static/js/")
                && HOT_UPDATE_SUFFIXES.iter().any(|suffix| path.ends_with(suffix)))
    }

    /// Whether a successful response to this request may be written back
    pub fn is_cacheable_extension(&self, request: &Request) -> bool {
        request
            .extension()
            .is_some_and(|ext| self.cacheable_extensions.contains(&ext.to_ascii_lowercase()))
    }
}
