//! Data models for storefront entities.
//!
//! Field names follow the backend's JSON (`ID_Tienda`, `NombreTienda`, ...).
//! Unknown fields are preserved so that records written back to local
//! storage round-trip unchanged.
//!
//! - `Store`: a vendor shop listed on the landing page
//! - `User`: an account shown in the admin user list
//! - `CartItem`: a product line in the checkout cart

pub mod cart;
pub mod store;
pub mod user;

pub use cart::{CartItem, OFFER_TWO_FOR_ONE};
pub use store::Store;
pub use user::User;

/// Records kept in an offline collection.
pub trait Record: Clone + Send + Sync + serde::Serialize + serde::de::DeserializeOwned {
    /// Whether the record should be kept after a network fetch
    fn is_listed(&self) -> bool {
        true
    }
}

// The backend serializes ids as numbers, but some screens round-trip them
// through strings (`"3"`). Accept both.
pub(crate) fn deserialize_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct IdVisitor;

    impl<'de> de::Visitor<'de> for IdVisitor {
        type Value = i64;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("an integer id or a numeric string")
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
            Ok(v)
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            i64::try_from(v).map_err(|_| E::custom("id out of range"))
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            v.trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid id: {}", v)))
        }
    }

    deserializer.deserialize_any(IdVisitor)
}

// Decimal columns come back from MySQL as strings ("199.90").
pub(crate) fn deserialize_amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct AmountVisitor;

    impl<'de> de::Visitor<'de> for AmountVisitor {
        type Value = f64;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a number or a numeric string")
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E> {
            Ok(v)
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
            Ok(v as f64)
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v as f64)
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.trim().is_empty() {
                return Ok(0.0);
            }
            v.trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid amount: {}", v)))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E> {
            Ok(0.0)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(0.0)
        }
    }

    deserializer.deserialize_any(AmountVisitor)
}
