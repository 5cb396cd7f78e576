//! The interception layer, modelled on a service worker.
//!
//! `ServiceWorker` owns the fetch router, the connectivity monitor handle
//! and the client registry, and routes every incoming event through an
//! explicit `EventKind -> handler` table built in the constructor.

pub mod fetch;
pub mod http;
pub mod lifecycle;
pub mod manifest;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::clients::{Clients, WorkerMessage};
use crate::connectivity::{ConnectivityMonitor, ConnectivityProbe, ConnectivityStatus};
use crate::network::Network;
use crate::push::{self, ClickOutcome, Notification};

pub use fetch::{FetchOutcome, FetchRouter, Route};
pub use http::{Destination, Request, RequestMode, Response, ResponseKind, ResponseSource};
pub use lifecycle::{ActivateReport, InstallReport, WorkerState};
pub use manifest::AssetManifest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Install,
    Activate,
    Fetch,
    Message,
    Online,
    Offline,
    Push,
    NotificationClick,
    NotificationClose,
}

#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(Request),
    /// Raw message posted by a page
    Message(String),
    Online,
    Offline,
    /// Push data, if the message carried any
    Push(Option<Vec<u8>>),
    NotificationClick(Notification),
    NotificationClose(Notification),
}

impl WorkerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            WorkerEvent::Install => EventKind::Install,
            WorkerEvent::Activate => EventKind::Activate,
            WorkerEvent::Fetch(_) => EventKind::Fetch,
            WorkerEvent::Message(_) => EventKind::Message,
            WorkerEvent::Online => EventKind::Online,
            WorkerEvent::Offline => EventKind::Offline,
            WorkerEvent::Push(_) => EventKind::Push,
            WorkerEvent::NotificationClick(_) => EventKind::NotificationClick,
            WorkerEvent::NotificationClose(_) => EventKind::NotificationClose,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Installed(InstallReport),
    Activated(ActivateReport),
    Fetched(FetchOutcome),
    /// Connectivity was broadcast to clients
    Broadcast(ConnectivityStatus),
    /// A notification should be shown
    Notify(Notification),
    Clicked(ClickOutcome),
    /// Malformed or unrecognised input, logged and dropped
    Dropped(String),
    /// Nothing to do
    Ignored,
}

type Handler<S, N> = for<'a> fn(&'a ServiceWorker<S, N>, WorkerEvent) -> BoxFuture<'a, EventOutcome>;

pub struct ServiceWorker<S, N> {
    manifest: Arc<AssetManifest>,
    cache: Arc<S>,
    network: Arc<N>,
    router: FetchRouter<S, N>,
    clients: Arc<Clients>,
    monitor: Arc<ConnectivityMonitor>,
    probe: Arc<dyn ConnectivityProbe>,
    timeout: Duration,
    state: Mutex<WorkerState>,
    handlers: HashMap<EventKind, Handler<S, N>>,
}

impl<S: CacheStore, N: Network> ServiceWorker<S, N> {
    pub fn new(
        manifest: AssetManifest,
        cache: Arc<S>,
        network: Arc<N>,
        monitor: Arc<ConnectivityMonitor>,
        clients: Arc<Clients>,
        probe: Arc<dyn ConnectivityProbe>,
        timeout: Duration,
    ) -> Self {
        let manifest = Arc::new(manifest);
        let router = FetchRouter::new(Arc::clone(&manifest), Arc::clone(&cache), Arc::clone(&network), timeout);

        let mut handlers: HashMap<EventKind, Handler<S, N>> = HashMap::new();
        handlers.insert(EventKind::Install, on_install::<S, N>);
        handlers.insert(EventKind::Activate, on_activate::<S, N>);
        handlers.insert(EventKind::Fetch, on_fetch::<S, N>);
        handlers.insert(EventKind::Message, on_message::<S, N>);
        handlers.insert(EventKind::Online, on_connectivity::<S, N>);
        handlers.insert(EventKind::Offline, on_connectivity::<S, N>);
        handlers.insert(EventKind::Push, on_push::<S, N>);
        handlers.insert(EventKind::NotificationClick, on_notification_click::<S, N>);
        handlers.insert(EventKind::NotificationClose, on_notification_close::<S, N>);

        Self {
            manifest,
            cache,
            network,
            router,
            clients,
            monitor,
            probe,
            timeout,
            state: Mutex::new(WorkerState::Parsed),
            handlers,
        }
    }

    fn state_guard(&self) -> MutexGuard<'_, WorkerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> WorkerState {
        *self.state_guard()
    }

    fn set_state(&self, state: WorkerState) {
        debug!(state = ?state, "Worker state");
        *self.state_guard() = state;
    }

    pub fn manifest(&self) -> &AssetManifest {
        &self.manifest
    }

    pub fn clients(&self) -> &Arc<Clients> {
        &self.clients
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    pub fn probe(&self) -> &Arc<dyn ConnectivityProbe> {
        &self.probe
    }

    pub fn router(&self) -> &FetchRouter<S, N> {
        &self.router
    }

    /// Route an event to its registered handler
    pub async fn dispatch(&self, event: WorkerEvent) -> EventOutcome {
        let kind = event.kind();
        match self.handlers.get(&kind) {
            Some(handler) => handler(self, event).await,
            None => {
                debug!(kind = ?kind, "No handler registered");
                EventOutcome::Ignored
            }
        }
    }

    /// Precache the manifest, then move straight on without waiting
    pub async fn install(&self) -> InstallReport {
        self.set_state(WorkerState::Installing);
        let report = lifecycle::install(&self.manifest, &self.cache, self.network.as_ref(), self.timeout).await;
        self.set_state(WorkerState::Installed);
        report
    }

    pub async fn activate(&self) -> ActivateReport {
        self.set_state(WorkerState::Activating);
        let report = lifecycle::activate(&self.manifest, &self.cache, &self.clients).await;
        self.set_state(WorkerState::Activated);
        report
    }

    pub async fn fetch(&self, request: &Request) -> FetchOutcome {
        self.router.handle(request).await
    }

    /// Wait for background cache writes
    pub async fn flush(&self) {
        self.router.flush().await;
    }
}

fn on_install<S: CacheStore, N: Network>(worker: &ServiceWorker<S, N>, _event: WorkerEvent) -> BoxFuture<'_, EventOutcome> {
    Box::pin(async move { EventOutcome::Installed(worker.install().await) })
}

fn on_activate<S: CacheStore, N: Network>(worker: &ServiceWorker<S, N>, _event: WorkerEvent) -> BoxFuture<'_, EventOutcome> {
    Box::pin(async move { EventOutcome::Activated(worker.activate().await) })
}

fn on_fetch<S: CacheStore, N: Network>(worker: &ServiceWorker<S, N>, event: WorkerEvent) -> BoxFuture<'_, EventOutcome> {
    Box::pin(async move {
        match event {
            WorkerEvent::Fetch(request) => EventOutcome::Fetched(worker.fetch(&request).await),
            _ => EventOutcome::Ignored,
        }
    })
}

fn on_message<S: CacheStore, N: Network>(worker: &ServiceWorker<S, N>, event: WorkerEvent) -> BoxFuture<'_, EventOutcome> {
    Box::pin(async move {
        let WorkerEvent::Message(raw) = event else {
            return EventOutcome::Ignored;
        };
        match WorkerMessage::parse(&raw) {
            Some(WorkerMessage::CheckConnectivity) => {
                EventOutcome::Broadcast(worker.monitor.check_now(worker.probe.as_ref()).await)
            }
            _ => {
                debug!(message = %raw, "Ignoring message");
                EventOutcome::Ignored
            }
        }
    })
}

fn on_connectivity<S: CacheStore, N: Network>(worker: &ServiceWorker<S, N>, event: WorkerEvent) -> BoxFuture<'_, EventOutcome> {
    Box::pin(async move {
        let online = matches!(event, WorkerEvent::Online);
        if worker.monitor.set_online(online) {
            EventOutcome::Broadcast(worker.monitor.status())
        } else {
            EventOutcome::Ignored
        }
    })
}

fn on_push<S: CacheStore, N: Network>(_worker: &ServiceWorker<S, N>, event: WorkerEvent) -> BoxFuture<'_, EventOutcome> {
    Box::pin(async move {
        let WorkerEvent::Push(data) = event else {
            return EventOutcome::Ignored;
        };
        match push::parse_push(data.as_deref()) {
            Ok(notification) => {
                info!(title = %notification.title, "Push received");
                EventOutcome::Notify(notification)
            }
            Err(e) => {
                warn!(error = %e, "Dropping push message");
                EventOutcome::Dropped(e.to_string())
            }
        }
    })
}

fn on_notification_click<S: CacheStore, N: Network>(worker: &ServiceWorker<S, N>, event: WorkerEvent) -> BoxFuture<'_, EventOutcome> {
    Box::pin(async move {
        let WorkerEvent::NotificationClick(notification) = event else {
            return EventOutcome::Ignored;
        };
        let origin = worker.manifest.app_origin();
        EventOutcome::Clicked(push::handle_click(&worker.clients, &notification, &origin))
    })
}

fn on_notification_close<S: CacheStore, N: Network>(_worker: &ServiceWorker<S, N>, event: WorkerEvent) -> BoxFuture<'_, EventOutcome> {
    Box::pin(async move {
        if let WorkerEvent::NotificationClose(notification) = event {
            debug!(title = %notification.title, "Notification closed");
        }
        EventOutcome::Ignored
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use crate::clients::ClientMessage;
    use crate::config::Config;
    use crate::connectivity::FixedProbe;
    use crate::network::testing::FakeNetwork;

    const APP: &str = "https://extravagant-style.vercel.app";

    struct Setup {
        worker: ServiceWorker<MemoryCacheStore, FakeNetwork>,
        network: Arc<FakeNetwork>,
        probe: Arc<FixedProbe>,
    }

    fn setup() -> Setup {
        let manifest = AssetManifest::from_config(&Config::default()).expect("manifest");
        let clients = Arc::new(Clients::new());
        let monitor = Arc::new(ConnectivityMonitor::new(true, Arc::clone(&clients)));
        let network = Arc::new(FakeNetwork::new());
        let probe = Arc::new(FixedProbe::new(true));
        let worker = ServiceWorker::new(
            manifest,
            Arc::new(MemoryCacheStore::new()),
            Arc::clone(&network),
            monitor,
            clients,
            probe.clone(),
            Duration::from_secs(5),
        );
        Setup { worker, network, probe }
    }

    #[tokio::test]
    async fn test_lifecycle_then_offline_icon() {
        let s = setup();
        for path in Config::default().precache {
            s.network.serve(&format!("{}{}", APP, path), path.as_bytes());
        }
        let (_id, mut page) = s.worker.clients().connect(APP);

        let EventOutcome::Installed(report) = s.worker.dispatch(WorkerEvent::Install).await else {
            panic!("install outcome expected");
        };
        assert!(report.is_complete());
        assert_eq!(s.worker.state(), WorkerState::Installed);

        let EventOutcome::Activated(report) = s.worker.dispatch(WorkerEvent::Activate).await else {
            panic!("activate outcome expected");
        };
        assert_eq!(report.claimed, 1);
        assert_eq!(s.worker.state(), WorkerState::Activated);

        s.network.set_offline(true);
        let calls = s.network.calls();
        let request = Request::get(&format!("{}/icon-192x192.png", APP)).expect("url");
        let EventOutcome::Fetched(outcome) = s.worker.dispatch(WorkerEvent::Fetch(request)).await else {
            panic!("fetch outcome expected");
        };
        assert_eq!(outcome.response().expect("intercepted").body, b"/icon-192x192.png");
        assert_eq!(s.network.calls(), calls);

        s.worker.dispatch(WorkerEvent::Offline).await;
        assert!(matches!(
            page.try_recv(),
            Ok(ClientMessage::Post(WorkerMessage::ConnectivityStatus { is_online: false, .. }))
        ));
    }

    #[tokio::test]
    async fn test_online_events_are_idempotent() {
        let s = setup();
        s.worker.clients().claim();
        let (_id, mut page) = s.worker.clients().connect(APP);

        assert!(matches!(s.worker.dispatch(WorkerEvent::Offline).await, EventOutcome::Broadcast(_)));
        assert!(matches!(s.worker.dispatch(WorkerEvent::Online).await, EventOutcome::Broadcast(_)));
        assert_eq!(s.worker.dispatch(WorkerEvent::Online).await, EventOutcome::Ignored);

        let mut received = 0;
        while page.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 2);
    }

    #[tokio::test]
    async fn test_check_connectivity_message() {
        let s = setup();
        s.probe.set(false);
        let outcome = s
            .worker
            .dispatch(WorkerEvent::Message(r#"{"type":"CHECK_CONNECTIVITY"}"#.to_string()))
            .await;
        let EventOutcome::Broadcast(status) = outcome else {
            panic!("broadcast expected");
        };
        assert!(!status.online);
        assert!(!s.worker.monitor().is_online());

        let ignored = s.worker.dispatch(WorkerEvent::Message("hola".to_string())).await;
        assert_eq!(ignored, EventOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_push_and_click() {
        let s = setup();
        let payload = br#"{"notification": {"title": "Pedido enviado", "data": {"url": "/pedidos"}}}"#.to_vec();
        let EventOutcome::Notify(notification) = s.worker.dispatch(WorkerEvent::Push(Some(payload))).await else {
            panic!("notification expected");
        };

        let outcome = s.worker.dispatch(WorkerEvent::NotificationClick(notification)).await;
        assert_eq!(
            outcome,
            EventOutcome::Clicked(ClickOutcome::Opened(format!("{}/pedidos", APP)))
        );

        let dropped = s.worker.dispatch(WorkerEvent::Push(None)).await;
        assert!(matches!(dropped, EventOutcome::Dropped(_)));
    }
}
