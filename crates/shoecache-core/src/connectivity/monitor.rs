use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::clients::{Clients, WorkerMessage};

use super::probe::ConnectivityProbe;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityStatus {
    pub online: bool,
    /// When this state was last recorded
    pub at: DateTime<Utc>,
}

impl ConnectivityStatus {
    pub fn new(online: bool, at: DateTime<Utc>) -> Self {
        Self { online, at }
    }

    pub fn to_message(self) -> WorkerMessage {
        WorkerMessage::ConnectivityStatus {
            is_online: self.online,
            timestamp: self.at.timestamp_millis(),
        }
    }
}

/// Last-known connectivity, broadcast to every controlled client.
///
/// State only moves on `set_online` (transition events) and `check_now`.
pub struct ConnectivityMonitor {
    status: watch::Sender<ConnectivityStatus>,
    clients: Arc<Clients>,
}

impl ConnectivityMonitor {
    /// Start from the state the host reports at startup
    pub fn new(initially_online: bool, clients: Arc<Clients>) -> Self {
        let (status, _) = watch::channel(ConnectivityStatus::new(initially_online, Utc::now()));
        Self { status, clients }
    }

    pub fn status(&self) -> ConnectivityStatus {
        *self.status.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.status.borrow().online
    }

    /// Change hook: the receiver sees every recorded state
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityStatus> {
        self.status.subscribe()
    }

    /// Handle an `online`/`offline` event. Broadcasts and returns true only
    /// when the state actually changed.
    pub fn set_online(&self, online: bool) -> bool {
        let now = Utc::now();
        let changed = self.status.send_if_modified(|status| {
            if status.online == online {
                false
            } else {
                *status = ConnectivityStatus::new(online, now);
                true
            }
        });
        if changed {
            info!(online = online, "Connectivity changed");
            self.broadcast();
        } else {
            debug!(online = online, "Connectivity event without change");
        }
        changed
    }

    /// Re-read connectivity and broadcast it regardless of change
    pub async fn check_now(&self, probe: &dyn ConnectivityProbe) -> ConnectivityStatus {
        let online = probe.probe().await;
        let status = ConnectivityStatus::new(online, Utc::now());
        self.status.send_replace(status);
        self.broadcast();
        status
    }

    fn broadcast(&self) -> usize {
        let message = self.status().to_message();
        let reached = self.clients.broadcast(message);
        debug!(clients = reached, "Connectivity broadcast");
        reached
    }
}
