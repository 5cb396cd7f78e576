use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use super::local_store::LocalStore;

/// Milliseconds timestamp of the last shown notice or store visit.
pub const LAST_VISIT_KEY: &str = "lastStoreVisit";

/// Allows a stale-data notice at most once per window.
pub struct NoticeLimiter {
    window: Duration,
}

impl NoticeLimiter {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    /// True if a notice may be shown now; showing one restarts the window
    pub fn should_show(&self, store: &dyn LocalStore, now: DateTime<Utc>) -> Result<bool> {
        let last = store
            .get_item(LAST_VISIT_KEY)?
            .and_then(|raw| raw.trim().parse::<i64>().ok());
        let due = match last {
            Some(ms) => now.timestamp_millis() - ms > self.window.num_milliseconds(),
            None => true,
        };
        if due {
            self.touch(store, now)?;
        }
        Ok(due)
    }

    /// Record a visit, restarting the window without showing anything
    pub fn touch(&self, store: &dyn LocalStore, now: DateTime<Utc>) -> Result<()> {
        store.set_item(LAST_VISIT_KEY, &now.timestamp_millis().to_string())
    }
}
