use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{deserialize_id, Record};

/// An account as returned by `GET /usuarios`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "ID_Usuario", deserialize_with = "deserialize_id")]
    pub id: i64,
    #[serde(rename = "Nombre", default)]
    pub name: Option<String>,
    #[serde(rename = "Correo", default)]
    pub email: Option<String>,
    #[serde(rename = "Rol", default)]
    pub role: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record for User {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_list() {
        let json = r#"[
            {"ID_Usuario": 1, "Nombre": "Ana", "Correo": "ana@example.com", "Rol": "admin"},
            {"ID_Usuario": 2, "Nombre": "Luis", "Correo": "luis@example.com", "Rol": "vendedor"}
        ]"#;
        let users: Vec<User> = serde_json::from_str(json).expect("user list should parse");
        assert_eq!(users[0].role.as_deref(), Some("admin"));
        assert_eq!(users[1].name.as_deref(), Some("Luis"));
        assert!(users.iter().all(|u| u.is_listed()));
    }
}
