//! REST API client module for the storefront backend.
//!
//! This module provides the `ApiClient` for the handful of endpoints the
//! offline layer keeps local copies of: the store list, the user list and
//! coupon validation. Everything else the storefront does against the
//! backend is plain CRUD and passes through the fetch router untouched.

pub mod client;
pub mod error;

pub use client::{ApiClient, CouponValidation};
pub use error::ApiError;
