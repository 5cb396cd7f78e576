use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::CartItem;

use super::local_store::LocalStore;

pub const CHECKOUT_KEY: &str = "checkoutCart";

/// Snapshot of the checkout, written on every change to its totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedCheckout {
    pub items: Vec<CartItem>,
    pub subtotal: f64,
    pub total: f64,
    pub discount_amount: f64,
    pub timestamp: DateTime<Utc>,
}

/// Reads and writes the persisted checkout
pub struct CheckoutStore {
    max_age: Duration,
}

impl CheckoutStore {
    pub fn new(max_age: Duration) -> Self {
        Self { max_age }
    }

    /// An empty cart leaves whatever was stored before untouched
    pub fn save(&self, store: &dyn LocalStore, checkout: &PersistedCheckout) -> Result<bool> {
        if checkout.items.is_empty() {
            return Ok(false);
        }
        store.set_json(CHECKOUT_KEY, checkout)?;
        debug!(items = checkout.items.len(), total = checkout.total, "Checkout persisted");
        Ok(true)
    }

    /// The stored checkout if it is younger than the maximum age at `now`.
    /// Older or unreadable snapshots are ignored, not removed.
    pub fn restore_at(&self, store: &dyn LocalStore, now: DateTime<Utc>) -> Option<PersistedCheckout> {
        let saved: PersistedCheckout = match store.get_json(CHECKOUT_KEY) {
            Ok(Some(saved)) => saved,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable persisted checkout");
                return None;
            }
        };
        let age = now - saved.timestamp;
        if age < self.max_age {
            Some(saved)
        } else {
            debug!(age_minutes = age.num_minutes(), "Persisted checkout too old to restore");
            None
        }
    }

    pub fn restore(&self, store: &dyn LocalStore) -> Option<PersistedCheckout> {
        self.restore_at(store, Utc::now())
    }

    pub fn clear(&self, store: &dyn LocalStore) -> Result<()> {
        store.remove_item(CHECKOUT_KEY)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Map;

    use super::*;
    use crate::persistence::MemoryLocalStore;

    fn snapshot(at: DateTime<Utc>) -> PersistedCheckout {
        PersistedCheckout {
            items: vec![CartItem {
                product_id: 7,
                store_id: 2,
                name: "Botín Chelsea".to_string(),
                price: 1299.9,
                quantity: 1,
                discount_percent: 0.0,
                offer_type: None,
                extra: Map::new(),
            }],
            subtotal: 1299.9,
            total: 1169.91,
            discount_amount: 129.99,
            timestamp: at,
        }
    }

    #[test]
    fn test_restore_within_an_hour() {
        let store = MemoryLocalStore::new();
        let checkouts = CheckoutStore::new(Duration::hours(1));
        let t = Utc::now();
        let saved = snapshot(t);
        assert!(checkouts.save(&store, &saved).expect("save"));

        assert_eq!(checkouts.restore_at(&store, t + Duration::minutes(30)), Some(saved.clone()));
        assert_eq!(checkouts.restore_at(&store, t + Duration::minutes(59)), Some(saved));
        assert_eq!(checkouts.restore_at(&store, t + Duration::minutes(61)), None);
        // Stale snapshots stay in place
        assert!(store.get_item(CHECKOUT_KEY).expect("get").is_some());
    }

    #[test]
    fn test_restore_is_byte_for_byte() {
        let store = MemoryLocalStore::new();
        let checkouts = CheckoutStore::new(Duration::hours(1));
        let t = Utc::now();
        checkouts.save(&store, &snapshot(t)).expect("save");
        let before = store.get_item(CHECKOUT_KEY).expect("get").expect("present");

        let restored = checkouts
            .restore_at(&store, t + Duration::minutes(59))
            .expect("restorable");
        let after = serde_json::to_string(&restored).expect("serialize");
        assert_eq!(before, after);
    }

    #[test]
    fn test_empty_cart_not_saved() {
        let store = MemoryLocalStore::new();
        let checkouts = CheckoutStore::new(Duration::hours(1));
        let mut empty = snapshot(Utc::now());
        empty.items.clear();
        assert!(!checkouts.save(&store, &empty).expect("save"));
        assert!(store.get_item(CHECKOUT_KEY).expect("get").is_none());
    }

    #[test]
    fn test_wire_field_names() {
        let json = serde_json::to_value(snapshot(Utc::now())).expect("serialize");
        assert!(json.get("discountAmount").is_some());
        assert_eq!(json["items"][0]["ID_Producto"], 7);
    }

    #[test]
    fn test_clear() {
        let store = MemoryLocalStore::new();
        let checkouts = CheckoutStore::new(Duration::hours(1));
        checkouts.save(&store, &snapshot(Utc::now())).expect("save");
        checkouts.clear(&store).expect("clear");
        assert!(checkouts.restore(&store).is_none());
    }
}
