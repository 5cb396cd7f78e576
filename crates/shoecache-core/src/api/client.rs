//! API client for the storefront backend.
//!
//! This module provides the `ApiClient` struct for the typed requests whose
//! results the offline layer persists locally.

use std::time::Duration;

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use tracing::{debug, warn};

use crate::models::{deserialize_amount, deserialize_id, Store, User};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Default HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Result of `GET /api/coupons/{code}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CouponValidation {
    /// Store the coupon belongs to
    #[serde(rename = "storeId", deserialize_with = "deserialize_id")]
    pub store_id: i64,
    /// Discount percentage
    #[serde(rename = "discount", deserialize_with = "deserialize_amount")]
    pub percentage: f64,
}

/// API client for the storefront backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    initial_backoff: Duration,
}

impl ApiClient {
    /// Create a new API client against `base_url`
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, ApiError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T, ApiError> {
        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let response = self.client.get(url).query(query).send().await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    let text = response.text().await?;
                    return serde_json::from_str(&text).map_err(|e| {
                        ApiError::InvalidResponse(format!("Failed to parse JSON from {}: {}", url, e))
                    });
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(url = url, retry = retries, backoff_ms = backoff.as_millis() as u64, "Rate limited, backing off");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }

    /// Fire-and-check request without a body worth reading; not retried
    async fn delete(&self, url: &str, query: &[(&str, String)]) -> Result<(), ApiError> {
        let response = self.client.delete(url).query(query).send().await?;
        match Self::check_response_for_retry(response).await? {
            Some(_) => Ok(()),
            None => Err(ApiError::RateLimited),
        }
    }

    fn coupon_query(user_id: Option<&str>) -> Vec<(&'static str, String)> {
        user_id
            .map(|id| vec![("userId", id.to_string())])
            .unwrap_or_default()
    }

    // ===== Data Fetching Methods =====

    /// Fetch every store, active or not
    pub async fn fetch_stores(&self) -> Result<Vec<Store>, ApiError> {
        let stores: Vec<Store> = self.get(&self.url("/tienda"), &[]).await?;
        debug!(count = stores.len(), "Stores fetched");
        Ok(stores)
    }

    /// Fetch all user accounts
    pub async fn fetch_users(&self) -> Result<Vec<User>, ApiError> {
        let users: Vec<User> = self.get(&self.url("/usuarios"), &[]).await?;
        debug!(count = users.len(), "Users fetched");
        Ok(users)
    }

    /// Validate a coupon code for the given cart subtotal and user
    pub async fn validate_coupon(
        &self,
        code: &str,
        subtotal: f64,
        user_id: Option<&str>,
    ) -> Result<CouponValidation, ApiError> {
        let url = self.url(&format!("/api/coupons/{}", code));
        let mut query = vec![("subtotal", subtotal.to_string())];
        query.extend(Self::coupon_query(user_id));
        self.get(&url, &query).await
    }

    /// Give a reserved coupon back when checkout is left without paying
    pub async fn release_coupon(&self, code: &str, user_id: Option<&str>) -> Result<(), ApiError> {
        let url = self.url(&format!("/api/coupons/release/{}", code));
        self.delete(&url, &Self::coupon_query(user_id)).await?;
        debug!(code = code, "Coupon released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ApiClient::new("https://api.example.com/").expect("client should build");
        assert_eq!(client.base_url(), "https://api.example.com");
        assert_eq!(client.url("/tienda"), "https://api.example.com/tienda");
    }

    #[test]
    fn test_parse_coupon_validation() {
        let parsed: CouponValidation = serde_json::from_str(r#"{"discount": "15", "storeId": 3}"#)
            .expect("coupon response should parse");
        assert_eq!(parsed, CouponValidation { store_id: 3, percentage: 15.0 });
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_connectivity_error() {
        let client = ApiClient::with_timeout("http://127.0.0.1:9", Duration::from_millis(500))
            .expect("client should build");
        let err = client.fetch_stores().await.expect_err("nothing listens on port 9");
        assert!(err.is_connectivity());
        let err = client
            .release_coupon("SAVE10", Some("7"))
            .await
            .expect_err("nothing listens on port 9");
        assert!(err.is_connectivity());
    }

    #[test]
    fn test_coupon_query() {
        assert!(ApiClient::coupon_query(None).is_empty());
        assert_eq!(ApiClient::coupon_query(Some("7")), vec![("userId", "7".to_string())]);
    }
}
