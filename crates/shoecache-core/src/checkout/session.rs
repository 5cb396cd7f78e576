use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::api::{ApiError, CouponValidation};
use crate::connectivity::ConnectivityContext;
use crate::error::CouponError;
use crate::models::CartItem;
use crate::persistence::{CheckoutStore, LocalStore, PersistedCheckout};

use super::totals::{round2, AppliedCoupon, CheckoutTotals};

/// The checkout page's state: cart, coupon and totals, persisted on every
/// recomputation.
pub struct CheckoutSession {
    items: Vec<CartItem>,
    coupon: Option<AppliedCoupon>,
    totals: CheckoutTotals,
    local: Arc<dyn LocalStore>,
    checkouts: CheckoutStore,
}

impl CheckoutSession {
    pub fn new(local: Arc<dyn LocalStore>, max_age: Duration) -> Self {
        Self {
            items: Vec::new(),
            coupon: None,
            totals: CheckoutTotals::default(),
            local,
            checkouts: CheckoutStore::new(max_age),
        }
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn totals(&self) -> CheckoutTotals {
        self.totals
    }

    pub fn coupon(&self) -> Option<&AppliedCoupon> {
        self.coupon.as_ref()
    }

    pub fn snapshot(&self, at: DateTime<Utc>) -> PersistedCheckout {
        PersistedCheckout {
            items: self.items.clone(),
            subtotal: self.totals.subtotal,
            total: self.totals.total,
            discount_amount: self.totals.coupon_discount,
            timestamp: at,
        }
    }

    fn recompute(&mut self) {
        if let Some(coupon) = self.coupon.take() {
            match coupon.reapply(&self.items) {
                Ok(coupon) => self.coupon = Some(coupon),
                Err(_) => info!(code = %coupon.code, "Coupon no longer applies, removed"),
            }
        }
        self.totals = CheckoutTotals::compute(&self.items, self.coupon.as_ref());
        if let Err(e) = self.checkouts.save(self.local.as_ref(), &self.snapshot(Utc::now())) {
            warn!(error = %e, "Failed to persist checkout");
        }
    }

    pub fn set_items(&mut self, items: Vec<CartItem>) -> CheckoutTotals {
        self.items = items;
        self.recompute();
        self.totals
    }

    /// While offline, take over a persisted checkout younger than the
    /// maximum age. Returns whether anything was restored.
    pub fn restore_if_offline(&mut self, ctx: &ConnectivityContext) -> bool {
        if ctx.is_online() {
            return false;
        }
        let Some(saved) = self.checkouts.restore(self.local.as_ref()) else {
            return false;
        };
        debug!(items = saved.items.len(), "Restoring persisted checkout");
        self.totals = CheckoutTotals {
            subtotal: saved.subtotal,
            offer_discount: round2(saved.subtotal - saved.total - saved.discount_amount).max(0.0),
            coupon_discount: saved.discount_amount,
            total: saved.total,
        };
        self.items = saved.items;
        self.coupon = None;
        true
    }

    /// Validate `code` with the backend and apply it to the cart
    pub async fn apply_coupon<F, Fut>(
        &mut self,
        ctx: &ConnectivityContext,
        code: &str,
        validate: F,
    ) -> Result<AppliedCoupon, CouponError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CouponValidation, ApiError>>,
    {
        ctx.require_online("aplicar cupones")?;
        let validation = validate().await?;
        let coupon = AppliedCoupon::apply(code, &validation, &self.items)?;
        info!(code = code, store = coupon.store_id, discount = coupon.discount, "Coupon applied");
        self.coupon = Some(coupon.clone());
        self.recompute();
        Ok(coupon)
    }

    /// Drop the applied coupon and give it back to the backend, as when the
    /// checkout is left without paying. A failed release is only logged.
    pub async fn release_coupon<F, Fut>(&mut self, release: F) -> Option<AppliedCoupon>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<(), ApiError>>,
    {
        let coupon = self.coupon.take()?;
        self.recompute();
        match release(coupon.code.clone()).await {
            Ok(()) => debug!(code = %coupon.code, "Coupon released"),
            Err(e) => warn!(code = %coupon.code, error = %e, "Failed to release coupon"),
        }
        Some(coupon)
    }

    /// Order placed: forget the cart and the persisted checkout
    pub fn complete(&mut self) -> anyhow::Result<()> {
        self.items.clear();
        self.coupon = None;
        self.totals = CheckoutTotals::default();
        self.checkouts.clear(self.local.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Map;
    use tokio::sync::mpsc;

    use super::*;
    use crate::clients::Clients;
    use crate::connectivity::ConnectivityMonitor;
    use crate::persistence::{MemoryLocalStore, CHECKOUT_KEY};

    fn item(store_id: i64, price: f64, quantity: u32) -> CartItem {
        CartItem {
            product_id: store_id * 10,
            store_id,
            name: "Sandalia".to_string(),
            price,
            quantity,
            discount_percent: 0.0,
            offer_type: None,
            extra: Map::new(),
        }
    }

    #[tokio::test]
    async fn test_every_recompute_is_persisted() {
        let local = Arc::new(MemoryLocalStore::new());
        let monitor = ConnectivityMonitor::new(true, Arc::new(Clients::new()));
        let (tx, _rx) = mpsc::unbounded_channel();
        let ctx = ConnectivityContext::new(monitor.subscribe(), tx);

        let mut session = CheckoutSession::new(local.clone(), Duration::hours(1));
        session.set_items(vec![item(1, 100.0, 1), item(2, 200.0, 1)]);
        let coupon = session
            .apply_coupon(&ctx, "SAVE10", || async {
                Ok(CouponValidation { store_id: 2, percentage: 10.0 })
            })
            .await
            .expect("coupon applies");
        assert_eq!(coupon.discount, 20.0);

        let stored: PersistedCheckout = (local.as_ref() as &dyn LocalStore)
            .get_json(CHECKOUT_KEY)
            .expect("readable")
            .expect("persisted");
        assert_eq!(stored.total, 280.0);
        assert_eq!(stored.discount_amount, 20.0);

        // Dropping the coupon store's item drops the coupon too
        session.set_items(vec![item(1, 100.0, 1)]);
        assert!(session.coupon().is_none());
        assert_eq!(session.totals().total, 100.0);
    }

    #[tokio::test]
    async fn test_restore_after_going_offline() {
        let local = Arc::new(MemoryLocalStore::new());
        let monitor = ConnectivityMonitor::new(true, Arc::new(Clients::new()));
        let (tx, mut notices) = mpsc::unbounded_channel();
        let ctx = ConnectivityContext::new(monitor.subscribe(), tx);

        let mut first = CheckoutSession::new(local.clone(), Duration::hours(1));
        first.set_items(vec![item(3, 59.5, 2)]);

        let mut second = CheckoutSession::new(local.clone(), Duration::hours(1));
        assert!(!second.restore_if_offline(&ctx));
        monitor.set_online(false);
        assert!(second.restore_if_offline(&ctx));
        assert_eq!(second.items(), first.items());
        assert_eq!(second.totals().total, 119.0);

        let err = second
            .apply_coupon(&ctx, "SAVE10", || async {
                Ok(CouponValidation { store_id: 3, percentage: 10.0 })
            })
            .await
            .expect_err("offline");
        assert!(matches!(err, CouponError::Offline(_)));
        assert_eq!(notices.try_recv().expect("gate warning").title, "Conexión Requerida");

        second.complete().expect("clear");
        assert!(local.get_item(CHECKOUT_KEY).expect("get").is_none());
    }

    #[tokio::test]
    async fn test_release_coupon_drops_it_even_when_release_fails() {
        let local = Arc::new(MemoryLocalStore::new());
        let monitor = ConnectivityMonitor::new(true, Arc::new(Clients::new()));
        let (tx, _rx) = mpsc::unbounded_channel();
        let ctx = ConnectivityContext::new(monitor.subscribe(), tx);

        let mut session = CheckoutSession::new(local.clone(), Duration::hours(1));
        assert!(session.release_coupon(|_| async { Ok(()) }).await.is_none());

        session.set_items(vec![item(2, 50.0, 2)]);
        session
            .apply_coupon(&ctx, "SAVE10", || async {
                Ok(CouponValidation { store_id: 2, percentage: 10.0 })
            })
            .await
            .expect("coupon applies");
        assert_eq!(session.totals().total, 90.0);

        let released = session
            .release_coupon(|code| async move {
                assert_eq!(code, "SAVE10");
                Err(ApiError::ServerError("500".to_string()))
            })
            .await
            .expect("coupon was applied");
        assert_eq!(released.code, "SAVE10");
        assert!(session.coupon().is_none());
        assert_eq!(session.totals().total, 100.0);
    }
}
