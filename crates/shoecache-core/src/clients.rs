//! Registry of open pages ("clients") and the messages the worker posts to
//! them.
//!
//! A client is controlled once the worker has claimed it; pages that connect
//! after a claim are controlled from the start. Broadcasts only reach
//! controlled clients. Closed channels are pruned on the next send.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

pub type ClientId = u64;

/// Messages exchanged with pages over the worker message channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// Page asks for a fresh connectivity reading
    CheckConnectivity,
    /// Worker reports the connectivity state
    ConnectivityStatus {
        #[serde(rename = "isOnline")]
        is_online: bool,
        /// Milliseconds since the Unix epoch
        timestamp: i64,
    },
}

impl WorkerMessage {
    /// Parse an inbound message; anything unrecognised yields `None`
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

/// What a page receives on its channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Post(WorkerMessage),
    /// The worker brought this page to the foreground
    Focus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub id: ClientId,
    pub url: String,
    pub controlled: bool,
    pub focused: bool,
}

struct ClientEntry {
    info: ClientInfo,
    sender: mpsc::UnboundedSender<ClientMessage>,
}

#[derive(Default)]
struct Registry {
    next_id: ClientId,
    claimed: bool,
    entries: BTreeMap<ClientId, ClientEntry>,
    open_requests: Vec<String>,
}

impl Registry {
    fn insert(&mut self, url: &str) -> (ClientId, mpsc::UnboundedReceiver<ClientMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.next_id += 1;
        let id = self.next_id;
        let info = ClientInfo {
            id,
            url: url.to_string(),
            controlled: self.claimed,
            focused: false,
        };
        self.entries.insert(id, ClientEntry { info, sender });
        (id, receiver)
    }
}

/// Open pages known to the worker
#[derive(Default)]
pub struct Clients {
    registry: Mutex<Registry>,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        // Registry stays consistent even if a holder panicked
        self.registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a page and return its message channel
    pub fn connect(&self, url: &str) -> (ClientId, mpsc::UnboundedReceiver<ClientMessage>) {
        let (id, receiver) = self.registry().insert(url);
        debug!(client = id, url = url, "Client connected");
        (id, receiver)
    }

    pub fn get(&self, id: ClientId) -> Option<ClientInfo> {
        self.registry().entries.get(&id).map(|e| e.info.clone())
    }

    /// Take control of every open page; returns how many were newly claimed
    pub fn claim(&self) -> usize {
        let mut registry = self.registry();
        registry.claimed = true;
        let mut claimed = 0;
        for entry in registry.entries.values_mut() {
            if !entry.info.controlled {
                entry.info.controlled = true;
                claimed += 1;
            }
        }
        claimed
    }

    pub fn match_all(&self, include_uncontrolled: bool) -> Vec<ClientInfo> {
        self.registry()
            .entries
            .values()
            .filter(|e| include_uncontrolled || e.info.controlled)
            .map(|e| e.info.clone())
            .collect()
    }

    /// Post to every controlled page; returns the number reached
    pub fn broadcast(&self, message: WorkerMessage) -> usize {
        let mut registry = self.registry();
        let mut closed = Vec::new();
        let mut delivered = 0;
        for (id, entry) in registry.entries.iter() {
            if !entry.info.controlled {
                continue;
            }
            if entry.sender.send(ClientMessage::Post(message)).is_ok() {
                delivered += 1;
            } else {
                closed.push(*id);
            }
        }
        for id in closed {
            debug!(client = id, "Dropping closed client");
            registry.entries.remove(&id);
        }
        delivered
    }

    /// Bring a page to the foreground
    pub fn focus(&self, id: ClientId) -> bool {
        let mut registry = self.registry();
        if !registry.entries.contains_key(&id) {
            return false;
        }
        for (entry_id, entry) in registry.entries.iter_mut() {
            entry.info.focused = *entry_id == id;
        }
        registry
            .entries
            .get(&id)
            .is_some_and(|e| e.sender.send(ClientMessage::Focus).is_ok())
    }

    /// Ask the host to open a new page at `url`; the page registers itself
    /// with `connect` once loaded
    pub fn open_window(&self, url: &str) {
        self.registry().open_requests.push(url.to_string());
    }

    pub fn take_open_requests(&self) -> Vec<String> {
        std::mem::take(&mut self.registry().open_requests)
    }
}
