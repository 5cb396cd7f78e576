//! Application configuration management.
//!
//! This module handles loading and saving the configuration of the offline
//! layer: backend and app origins, the cache generation name, the precache
//! manifest and the various freshness windows.
//!
//! Configuration is stored at `~/.config/shoecache/config.json`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "shoecache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the backend base URL
const ENV_API_URL: &str = "SHOECACHE_API_URL";

/// Environment variable overriding the app origin
const ENV_APP_ORIGIN: &str = "SHOECACHE_APP_ORIGIN";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the backend API; requests to this origin are "API requests"
    pub api_base_url: String,
    /// Origin the storefront itself is served from
    pub app_origin: String,
    /// Name of the current cache generation
    pub cache_version: String,
    /// Root-relative paths pre-populated on install
    pub precache: Vec<String>,
    pub shell_path: String,
    pub offline_path: String,
    /// File extensions whose successful responses are written to the cache
    pub cacheable_extensions: Vec<String>,
    /// App-origin path prefixes the interception layer leaves alone
    pub passthrough_prefixes: Vec<String>,
    pub network_timeout_secs: u64,
    pub store_freshness_minutes: i64,
    pub notice_window_minutes: i64,
    pub checkout_max_age_minutes: i64,
    /// URL pinged by the HTTP connectivity probe
    pub probe_url: Option<String>,
    pub probe_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "https://extravagant-back-1.onrender.com".to_string(),
            app_origin: "https://extravagant-style.vercel.app".to_string(),
            cache_version: "extravagant-style-v1".to_string(),
            precache: [
                "/",
                "/index.html",
                "/offline.html",
                "/icon-192x192.png",
                "/icon-512x512.png",
                "/favicon.ico",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            shell_path: "/index.html".to_string(),
            offline_path: "/offline.html".to_string(),
            cacheable_extensions: [
                "js", "css", "html", "png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "woff",
                "woff2", "ttf", "otf", "eot", "json", "webmanifest",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            passthrough_prefixes: ["/sockjs-node", "/__webpack_hmr", "/__vite"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            network_timeout_secs: 15,
            store_freshness_minutes: 5,
            notice_window_minutes: 30,
            checkout_max_age_minutes: 60,
            probe_url: None,
            probe_timeout_secs: 5,
        }
    }
}

impl Config {
    /// Load from the default location, falling back to defaults if absent
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(ENV_API_URL) {
            self.api_base_url = url;
        }
        if let Ok(origin) = std::env::var(ENV_APP_ORIGIN) {
            self.app_origin = origin;
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// URL the connectivity probe pings; defaults to the app origin
    pub fn probe_target(&self) -> &str {
        self.probe_url.as_deref().unwrap_or(&self.app_origin)
    }

    pub fn store_freshness(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.store_freshness_minutes)
    }

    pub fn notice_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.notice_window_minutes)
    }

    pub fn checkout_max_age(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.checkout_max_age_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest_contains_shell_and_offline_page() {
        let config = Config::default();
        assert!(config.precache.contains(&config.shell_path));
        assert!(config.precache.contains(&config.offline_path));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{"cache_version": "extravagant-style-v2"}"#)
            .expect("partial config should parse");
        assert_eq!(config.cache_version, "extravagant-style-v2");
        assert_eq!(config.network_timeout_secs, 15);
        assert_eq!(config.checkout_max_age(), chrono::Duration::minutes(60));
    }

    #[test]
    fn test_probe_target_defaults_to_app_origin() {
        let mut config = Config::default();
        assert_eq!(config.probe_target(), config.app_origin);
        config.probe_url = Some("https://example.com/ping".to_string());
        assert_eq!(config.probe_target(), "https://example.com/ping");
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("shoecache-test-missing-config.json");
        let _ = std::fs::remove_file(&path);
        let config = Config::load_from(&path).expect("missing config is not an error");
        assert_eq!(config.cache_version, Config::default().cache_version);
    }
}
