use serde::{Deserialize, Serialize};

use crate::api::CouponValidation;
use crate::error::CouponError;
use crate::models::CartItem;

/// Round to cents
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Subtotal of the items sold by `store_id`
pub fn store_subtotal(items: &[CartItem], store_id: i64) -> f64 {
    items
        .iter()
        .filter(|item| item.store_id == store_id)
        .map(CartItem::line_total)
        .sum()
}

/// A validated coupon and the discount it grants on the current cart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedCoupon {
    pub code: String,
    pub store_id: i64,
    pub percentage: f64,
    /// Amount taken off, already rounded
    pub discount: f64,
}

impl AppliedCoupon {
    /// Apply a backend-validated coupon to `items`. The percentage only
    /// counts against the coupon store's own subtotal.
    pub fn apply(
        code: &str,
        validation: &CouponValidation,
        items: &[CartItem],
    ) -> Result<Self, CouponError> {
        let base = store_subtotal(items, validation.store_id);
        if base <= 0.0 {
            return Err(CouponError::NotApplicable);
        }
        Ok(Self {
            code: code.to_string(),
            store_id: validation.store_id,
            percentage: validation.percentage,
            discount: round2(base * validation.percentage / 100.0),
        })
    }

    /// Recompute against a changed cart
    pub fn reapply(&self, items: &[CartItem]) -> Result<Self, CouponError> {
        let validation = CouponValidation {
            store_id: self.store_id,
            percentage: self.percentage,
        };
        Self::apply(&self.code, &validation, items)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutTotals {
    pub subtotal: f64,
    pub offer_discount: f64,
    pub coupon_discount: f64,
    pub total: f64,
}

impl CheckoutTotals {
    pub fn compute(items: &[CartItem], coupon: Option<&AppliedCoupon>) -> Self {
        let subtotal: f64 = items.iter().map(CartItem::line_total).sum();
        let offer_discount: f64 = items.iter().map(CartItem::offer_discount).sum();
        let coupon_discount = coupon.map(|c| c.discount).unwrap_or(0.0);
        Self {
            subtotal,
            offer_discount,
            coupon_discount,
            total: round2(subtotal - offer_discount - coupon_discount).max(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Map;

    use super::*;

    fn item(store_id: i64, price: f64, quantity: u32, discount: f64, offer: Option<&str>) -> CartItem {
        CartItem {
            product_id: store_id * 100,
            store_id,
            name: "Zapato".to_string(),
            price,
            quantity,
            discount_percent: discount,
            offer_type: offer.map(String::from),
            extra: Map::new(),
        }
    }

    #[test]
    fn test_totals_with_offers() {
        let items = vec![
            item(1, 100.0, 2, 10.0, None),
            item(2, 50.0, 3, 0.0, Some("2x1")),
        ];
        let totals = CheckoutTotals::compute(&items, None);
        assert_eq!(totals.subtotal, 350.0);
        assert_eq!(totals.offer_discount, 70.0);
        assert_eq!(totals.total, 280.0);
    }

    #[test]
    fn test_coupon_applies_to_its_store_only() {
        let items = vec![item(1, 100.0, 1, 0.0, None), item(2, 200.0, 1, 0.0, None)];
        let validation = CouponValidation { store_id: 2, percentage: 10.0 };
        let coupon = AppliedCoupon::apply("SAVE10", &validation, &items).expect("applicable");
        assert_eq!(coupon.discount, 20.0);

        let totals = CheckoutTotals::compute(&items, Some(&coupon));
        assert_eq!(totals.coupon_discount, 20.0);
        assert_eq!(totals.total, 280.0);
    }

    #[test]
    fn test_coupon_for_absent_store_rejected() {
        let items = vec![item(1, 100.0, 1, 0.0, None)];
        let validation = CouponValidation { store_id: 9, percentage: 10.0 };
        assert!(matches!(
            AppliedCoupon::apply("SAVE10", &validation, &items),
            Err(CouponError::NotApplicable)
        ));
    }

    #[test]
    fn test_coupon_discount_rounded_to_cents() {
        let items = vec![item(1, 19.99, 1, 0.0, None)];
        let validation = CouponValidation { store_id: 1, percentage: 10.0 };
        let coupon = AppliedCoupon::apply("X", &validation, &items).expect("applicable");
        assert_eq!(coupon.discount, 2.0);
        assert_eq!(CheckoutTotals::compute(&items, Some(&coupon)).total, 17.99);
    }
}
