use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{deserialize_id, Record};

/// A vendor shop as returned by `GET /tienda`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Store {
    #[serde(rename = "ID_Tienda", deserialize_with = "deserialize_id")]
    pub id: i64,
    #[serde(rename = "NombreTienda")]
    pub name: String,
    #[serde(rename = "Descripcion", default)]
    pub description: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(rename = "activo", default)]
    pub active: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Store {
    pub fn is_active(&self) -> bool {
        self.active == 1
    }

    /// Logo URL relative to the backend's upload directory
    pub fn logo_url(&self, api_base_url: &str) -> Option<String> {
        self.logo
            .as_deref()
            .filter(|logo| !logo.is_empty())
            .map(|logo| format!("{}/uploads/{}", api_base_url.trim_end_matches('/'), logo))
    }
}

impl Record for Store {
    fn is_listed(&self) -> bool {
        self.is_active()
    }
}
