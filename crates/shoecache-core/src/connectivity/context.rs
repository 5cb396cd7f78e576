use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::error::OfflineError;
use crate::notice::Notice;

use super::monitor::ConnectivityStatus;

/// In-page connectivity: the current state plus a way to raise notices.
#[derive(Clone)]
pub struct ConnectivityContext {
    status: watch::Receiver<ConnectivityStatus>,
    notices: mpsc::UnboundedSender<Notice>,
}

impl ConnectivityContext {
    pub fn new(
        status: watch::Receiver<ConnectivityStatus>,
        notices: mpsc::UnboundedSender<Notice>,
    ) -> Self {
        Self { status, notices }
    }

    pub fn is_online(&self) -> bool {
        self.status.borrow().online
    }

    pub fn status(&self) -> ConnectivityStatus {
        *self.status.borrow()
    }

    /// Wait for the next offline to online transition. Returns false once the
    /// monitor is gone.
    pub async fn reconnected(&mut self) -> bool {
        loop {
            let was_online = self.status.borrow_and_update().online;
            if self.status.changed().await.is_err() {
                return false;
            }
            if !was_online && self.status.borrow().online {
                return true;
            }
        }
    }

    pub fn show_notification(&self, notice: Notice) {
        debug!(title = %notice.title, level = ?notice.level, "Notice raised");
        // Nobody listening is fine, notices are advisory
        let _ = self.notices.send(notice);
    }

    /// Gate a network-dependent action on being online
    pub fn require_online(&self, action: &str) -> Result<(), OfflineError> {
        if self.is_online() {
            return Ok(());
        }
        self.show_notification(Notice::warning(
            "Conexión Requerida",
            format!("Se necesita conexión a Internet para {}", action),
        ));
        Err(OfflineError {
            action: action.to_string(),
        })
    }
}
