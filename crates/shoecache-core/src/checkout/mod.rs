//! Checkout totals and the in-progress checkout session.
//!
//! The session recomputes totals whenever the cart or coupon changes and
//! persists each result, so an interrupted checkout can be restored while
//! offline.

pub mod session;
pub mod totals;

pub use session::CheckoutSession;
pub use totals::{round2, store_subtotal, AppliedCoupon, CheckoutTotals};
