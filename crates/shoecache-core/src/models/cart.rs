use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{deserialize_amount, deserialize_id};

/// Offer type granting one free unit per pair.
pub const OFFER_TWO_FOR_ONE: &str = "2x1";

/// A product line in the checkout cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    #[serde(rename = "ID_Producto", deserialize_with = "deserialize_id")]
    pub product_id: i64,
    #[serde(rename = "ID_Tienda", deserialize_with = "deserialize_id")]
    pub store_id: i64,
    #[serde(rename = "Nombre_Producto", default)]
    pub name: String,
    #[serde(rename = "Precio", deserialize_with = "deserialize_amount")]
    pub price: f64,
    #[serde(rename = "Cantidad")]
    pub quantity: u32,
    /// Percentage discount on this product, 0 when none
    #[serde(rename = "Descuento", default, deserialize_with = "deserialize_amount")]
    pub discount_percent: f64,
    #[serde(rename = "Tipo_Oferta", default)]
    pub offer_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CartItem {
    pub fn line_total(&self) -> f64 {
        self.price * f64::from(self.quantity)
    }

    pub fn is_two_for_one(&self) -> bool {
        self.offer_type.as_deref() == Some(OFFER_TWO_FOR_ONE)
    }

    /// Discount from the product's own offer (percentage first, then 2x1)
    pub fn offer_discount(&self) -> f64 {
        if self.discount_percent > 0.0 {
            self.line_total() * (self.discount_percent / 100.0)
        } else if self.is_two_for_one() && self.quantity >= 2 {
            f64::from(self.quantity / 2) * self.price
        } else {
            0.0
        }
    }
}
