//! Push messages and notification clicks.
//!
//! A push payload looks like
//! `{"notification": {"title": "...", "body": "...", "data": {"url": "/pedidos"}}}`.
//! Extra notification fields (tag, image, ...) are passed through to the
//! displayed notification; icon, badge, vibration and interaction settings
//! are always ours.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::clients::{ClientId, Clients};
use crate::error::PushError;

/// Icon and badge shown on every notification
pub const NOTIFICATION_ICON: &str = "/android-chrome-192x192.png";

/// Vibration pattern in milliseconds
pub const VIBRATE_PATTERN: [u32; 3] = [100, 50, 100];

/// Where a click on a notification without a URL leads
pub const DEFAULT_CLICK_URL: &str = "/";

/// Option keys a payload may not set
const FIXED_OPTIONS: [&str; 4] = ["icon", "badge", "requireInteraction", "vibrate"];

#[derive(Debug, Deserialize)]
struct PushPayload {
    notification: Option<PushNotification>,
}

#[derive(Debug, Deserialize)]
struct PushNotification {
    title: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    data: Map<String, Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct NotificationData {
    pub url: String,
    #[serde(flatten)]
    #[cfg_attr(feature = "ts", ts(skip))]
    pub extra: Map<String, Value>,
}

/// Options passed to `showNotification`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct NotificationOptions {
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub data: NotificationData,
    pub require_interaction: bool,
    pub vibrate: Vec<u32>,
    #[serde(flatten)]
    #[cfg_attr(feature = "ts", ts(skip))]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub title: String,
    pub options: NotificationOptions,
}

impl Notification {
    pub fn url(&self) -> &str {
        &self.options.data.url
    }
}

/// Turn raw push data into a notification
pub fn parse_push(data: Option<&[u8]>) -> Result<Notification, PushError> {
    let data = data.ok_or(PushError::MissingData)?;
    let payload: PushPayload = serde_json::from_slice(data)?;
    let notification = payload.notification.ok_or(PushError::MissingTitle)?;
    let title = notification
        .title
        .filter(|t| !t.trim().is_empty())
        .ok_or(PushError::MissingTitle)?;

    let mut data = notification.data;
    let url = match data.remove("url") {
        Some(Value::String(url)) if !url.is_empty() => url,
        _ => DEFAULT_CLICK_URL.to_string(),
    };

    let mut extra = notification.extra;
    for key in FIXED_OPTIONS {
        if extra.remove(key).is_some() {
            debug!(key = key, "Ignoring notification option from payload");
        }
    }

    Ok(Notification {
        title,
        options: NotificationOptions {
            body: notification.body.unwrap_or_default(),
            icon: NOTIFICATION_ICON.to_string(),
            badge: NOTIFICATION_ICON.to_string(),
            data: NotificationData { url, extra: data },
            require_interaction: true,
            vibrate: VIBRATE_PATTERN.to_vec(),
            extra,
        },
    })
}

/// What a notification click did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    Focused(ClientId),
    /// A new window was requested at this URL
    Opened(String),
}

/// Resolve a notification URL against the app origin
pub fn absolute_url(url: &str, app_origin: &str) -> String {
    match reqwest::Url::parse(app_origin).and_then(|base| base.join(url)) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => url.to_string(),
    }
}

/// Focus a page already showing the notification's URL (controlled or not),
/// otherwise open one
pub fn handle_click(clients: &Clients, notification: &Notification, app_origin: &str) -> ClickOutcome {
    let target = absolute_url(notification.url(), app_origin);
    let existing = clients
        .match_all(true)
        .into_iter()
        .find(|client| client.url == target);
    if let Some(client) = existing {
        if clients.focus(client.id) {
            debug!(client = client.id, url = %target, "Focused existing client");
            return ClickOutcome::Focused(client.id);
        }
    }
    clients.open_window(&target);
    info!(url = %target, "Opening window for notification");
    ClickOutcome::Opened(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_push_defaults() {
        let raw = br#"{"notification": {"title": "Nuevo pedido", "tag": "orders"}}"#;
        let notification = parse_push(Some(raw)).expect("valid payload");
        assert_eq!(notification.title, "Nuevo pedido");
        assert_eq!(notification.options.body, "");
        assert_eq!(notification.url(), "/");
        assert_eq!(notification.options.icon, NOTIFICATION_ICON);
        assert!(notification.options.require_interaction);
        assert_eq!(notification.options.vibrate, vec![100, 50, 100]);
        assert_eq!(notification.options.extra.get("tag"), Some(&Value::from("orders")));
    }

    #[test]
    fn test_options_wire_format() {
        let raw = br#"{"notification": {"title": "T", "body": "B", "data": {"url": "/pedidos", "orderId": 12}}}"#;
        let notification = parse_push(Some(raw)).expect("valid payload");
        let json = serde_json::to_value(&notification.options).expect("serialize");
        assert_eq!(json["requireInteraction"], true);
        assert_eq!(json["data"]["url"], "/pedidos");
        assert_eq!(json["data"]["orderId"], 12);
        assert_eq!(json["badge"], NOTIFICATION_ICON);
    }

    #[test]
    fn test_payload_cannot_override_fixed_options() {
        let raw = br#"{"notification": {"title": "T", "icon": "/other.png", "badge": "/b.png", "requireInteraction": false, "vibrate": [1], "tag": "t"}}"#;
        let notification = parse_push(Some(raw)).expect("valid payload");
        let json = serde_json::to_value(&notification.options).expect("serialize");
        assert_eq!(json["icon"], NOTIFICATION_ICON);
        assert_eq!(json["badge"], NOTIFICATION_ICON);
        assert_eq!(json["requireInteraction"], true);
        assert_eq!(json["vibrate"], serde_json::json!([100, 50, 100]));
        assert_eq!(json["tag"], "t");

        let text = serde_json::to_string(&notification.options).expect("serialize");
        assert_eq!(text.matches("\"icon\"").count(), 1);
    }

    #[test]
    fn test_malformed_payloads() {
        assert!(matches!(parse_push(None), Err(PushError::MissingData)));
        assert!(matches!(parse_push(Some(b"not json")), Err(PushError::InvalidJson(_))));
        assert!(matches!(parse_push(Some(b"{}")), Err(PushError::MissingTitle)));
        assert!(matches!(
            parse_push(Some(br#"{"notification": {"body": "sin titulo"}}"#)),
            Err(PushError::MissingTitle)
        ));
    }

    #[test]
    fn test_click_focuses_matching_uncontrolled_client() {
        let clients = Clients::new();
        let (_other, _rx1) = clients.connect("https://shop.example/");
        let (orders, _rx2) = clients.connect("https://shop.example/pedidos");
        let notification = parse_push(Some(br#"{"notification": {"title": "T", "data": {"url": "/pedidos"}}}"#))
            .expect("valid payload");

        let outcome = handle_click(&clients, &notification, "https://shop.example");
        assert_eq!(outcome, ClickOutcome::Focused(orders));
        assert!(clients.take_open_requests().is_empty());
    }

    #[test]
    fn test_click_opens_window_when_no_match() {
        let clients = Clients::new();
        let notification = parse_push(Some(br#"{"notification": {"title": "T"}}"#)).expect("valid payload");
        let outcome = handle_click(&clients, &notification, "https://shop.example");
        assert_eq!(outcome, ClickOutcome::Opened("https://shop.example/".to_string()));
        assert_eq!(clients.take_open_requests(), vec!["https://shop.example/".to_string()]);
    }
}
