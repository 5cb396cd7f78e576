//! Error types for the interception, cache and push layers.
//!
//! None of these ever escape the fetch router: every `FetchError` is turned
//! into a fallback response, and `CacheError`s are logged and swallowed.

use std::time::Duration;

use thiserror::Error;

/// Failure of a single network attempt.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest doesn't report the configured limit, only that it hit it
            FetchError::Timeout(Duration::ZERO)
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// Failure reading or writing a cache generation.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache storage unavailable: {0}")]
    Unavailable(String),

    #[error("Cache quota exceeded")]
    QuotaExceeded,

    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to (de)serialize cache entry: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A push message that could not be turned into a notification.
#[derive(Error, Debug)]
pub enum PushError {
    #[error("Push message has no data")]
    MissingData,

    #[error("Push payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Push payload has no notification title")]
    MissingTitle,
}

/// Returned when a network-dependent action is attempted while offline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Connection required: {action}")]
pub struct OfflineError {
    pub action: String,
}

/// A coupon that could not be applied to the current cart.
#[derive(Error, Debug)]
pub enum CouponError {
    /// The coupon's store has nothing in the cart
    #[error("El cupón no es aplicable a los productos en tu carrito.")]
    NotApplicable,

    #[error(transparent)]
    Offline(#[from] OfflineError),

    #[error("Coupon validation failed: {0}")]
    Api(#[from] crate::api::ApiError),
}
