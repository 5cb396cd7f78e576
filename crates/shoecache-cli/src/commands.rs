//! Subcommand implementations.

use std::io::Read;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use shoecache_core::checkout::CheckoutSession;
use shoecache_core::connectivity::{ConnectivityProbe, FixedProbe, HttpProbe};
use shoecache_core::models::{CartItem, Record, Store, User};
use shoecache_core::persistence::{CheckoutStore, FileLocalStore, LocalStore, Loaded, OfflineCollection};
use shoecache_core::worker::http::Method;
use shoecache_core::worker::{AssetManifest, FetchOutcome, Request, Response};
use shoecache_core::{
    ApiClient, ClientMessage, Clients, Config, ConnectivityContext, ConnectivityMonitor, DiskCacheStore,
    EventOutcome, FetchError, HttpNetwork, Network, Notice, ServiceWorker, WorkerEvent, WorkerMessage,
};

use crate::CheckoutAction;

/// File under the cache dir standing in for the page's `localStorage`
const LOCAL_STORAGE_FILE: &str = "local_storage.json";

/// Longest body printed by `fetch` before truncating
const MAX_BODY_PREVIEW: usize = 2000;

/// Network for the worker: real HTTP, or nothing at all under `--offline`
pub enum CliNetwork {
    Online(HttpNetwork),
    Offline,
}

impl Network for CliNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        match self {
            CliNetwork::Online(network) => network.fetch(request).await,
            CliNetwork::Offline => Err(FetchError::Network("offline mode".to_string())),
        }
    }
}

pub struct Runtime {
    config: Config,
    worker: ServiceWorker<DiskCacheStore, CliNetwork>,
    api: ApiClient,
    local: Arc<FileLocalStore>,
    ctx: ConnectivityContext,
    notices: Mutex<mpsc::UnboundedReceiver<Notice>>,
}

impl Runtime {
    pub async fn new(config: Config, offline: bool) -> Result<Self> {
        let cache_dir = config.cache_dir()?;
        let cache = Arc::new(DiskCacheStore::new(&cache_dir)?);

        let network = if offline {
            CliNetwork::Offline
        } else {
            CliNetwork::Online(HttpNetwork::new(&config.app_origin, config.network_timeout())?)
        };
        let probe: Arc<dyn ConnectivityProbe> = if offline {
            Arc::new(FixedProbe::new(false))
        } else {
            Arc::new(HttpProbe::new(config.probe_target(), config.probe_timeout())?)
        };
        let initially_online = probe.probe().await;
        debug!(online = initially_online, "Initial connectivity");

        let clients = Arc::new(Clients::new());
        let monitor = Arc::new(ConnectivityMonitor::new(initially_online, Arc::clone(&clients)));
        let worker = ServiceWorker::new(
            AssetManifest::from_config(&config)?,
            cache,
            Arc::new(network),
            Arc::clone(&monitor),
            clients,
            probe,
            config.network_timeout(),
        );

        let local = Arc::new(
            FileLocalStore::open(&cache_dir.join(LOCAL_STORAGE_FILE))
                .context("Failed to open local storage")?,
        );
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = ConnectivityContext::new(monitor.subscribe(), tx);
        let api = ApiClient::with_timeout(config.api_base_url.clone(), config.network_timeout())?;

        Ok(Self {
            config,
            worker,
            api,
            local,
            ctx,
            notices: Mutex::new(rx),
        })
    }

    /// Print notices raised so far
    pub fn print_notices(&self) {
        let mut notices = self.notices.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        while let Ok(notice) = notices.try_recv() {
            eprintln!("{}", notice);
        }
    }

    fn local(&self) -> Arc<dyn LocalStore> {
        self.local.clone()
    }
}

pub async fn install(runtime: &Runtime) -> Result<()> {
    if let EventOutcome::Installed(report) = runtime.worker.dispatch(WorkerEvent::Install).await {
        println!("Installed {}", report.generation);
        for path in &report.cached {
            println!("  cached  {}", path);
        }
        for (path, reason) in &report.failed {
            println!("  failed  {} ({})", path, reason);
        }
    }
    // Skip waiting
    activate(runtime).await
}

pub async fn activate(runtime: &Runtime) -> Result<()> {
    if let EventOutcome::Activated(report) = runtime.worker.dispatch(WorkerEvent::Activate).await {
        println!("Activated {}", report.generation);
        for generation in &report.deleted {
            println!("  deleted {}", generation);
        }
    }
    Ok(())
}

pub async fn fetch(runtime: &Runtime, url: &str, navigate: bool, method: &str) -> Result<()> {
    let request = if navigate {
        Request::navigate(url)?
    } else {
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .with_context(|| format!("Invalid HTTP method: {}", method))?;
        Request::parse(method, url)?
    };

    let outcome = runtime.worker.dispatch(WorkerEvent::Fetch(request)).await;
    runtime.worker.flush().await;

    match outcome {
        EventOutcome::Fetched(FetchOutcome::Respond(response)) => {
            println!("{} {} ({:?})", response.status, response.status_text, response.source);
            for (name, value) in &response.headers {
                println!("{}: {}", name, value);
            }
            println!();
            match std::str::from_utf8(&response.body) {
                Ok(text) if text.len() <= MAX_BODY_PREVIEW => println!("{}", text),
                Ok(_) => println!("[{} bytes of text]", response.body.len()),
                Err(_) => println!("[{} bytes of binary data]", response.body.len()),
            }
        }
        EventOutcome::Fetched(FetchOutcome::Passthrough) => println!("Not intercepted"),
        other => warn!(outcome = ?other, "Unexpected fetch outcome"),
    }
    Ok(())
}

fn print_loaded<T: Record + 'static>(loaded: &Loaded<T>, collection: &OfflineCollection<T>, describe: impl Fn(&T) -> String) {
    for record in &loaded.records {
        println!("{}", describe(record));
    }
    let age = collection
        .cached()
        .map(|cached| cached.age_display())
        .unwrap_or_else(|| "never".to_string());
    println!("({} records, {:?}, local copy updated {})", loaded.records.len(), loaded.state, age);
}

fn store_collection(runtime: &Runtime) -> Arc<OfflineCollection<Store>> {
    Arc::new(OfflineCollection::stores(
        runtime.local(),
        runtime.config.store_freshness(),
        runtime.config.notice_window(),
    ))
}

fn user_collection(runtime: &Runtime) -> Arc<OfflineCollection<User>> {
    Arc::new(OfflineCollection::users(
        runtime.local(),
        runtime.config.store_freshness(),
        runtime.config.notice_window(),
    ))
}

pub async fn stores(runtime: &Runtime, visit: Option<i64>) -> Result<()> {
    let stores = store_collection(runtime);
    let loaded = stores.load(&runtime.ctx, || runtime.api.fetch_stores()).await;
    print_loaded(&loaded, &stores, |store| {
        let logo = store.logo_url(&runtime.config.api_base_url).unwrap_or_default();
        format!("{:>4}  {}  {}", store.id, store.name, logo)
    });

    if let Some(id) = visit {
        match loaded.records.iter().find(|store| store.id == id) {
            Some(store) => {
                stores.touch()?;
                println!("Visiting {}", store.name);
            }
            None => println!("No store with id {}", id),
        }
    }

    let api = runtime.api.clone();
    if let Some(refresh) = stores.spawn_revalidate(runtime.ctx.clone(), move || async move { api.fetch_stores().await }) {
        if let Ok(Some(refreshed)) = refresh.await {
            println!("Refreshed in background: {} stores", refreshed.len());
        }
    }
    Ok(())
}

pub async fn users(runtime: &Runtime) -> Result<()> {
    let users = user_collection(runtime);
    let loaded = users.load(&runtime.ctx, || runtime.api.fetch_users()).await;
    print_loaded(&loaded, &users, |user| {
        format!(
            "{:>4}  {}  <{}>  {}",
            user.id,
            user.name.as_deref().unwrap_or("-"),
            user.email.as_deref().unwrap_or("-"),
            user.role.as_deref().unwrap_or("-")
        )
    });
    Ok(())
}

pub async fn checkout(runtime: &Runtime, action: CheckoutAction) -> Result<()> {
    let checkouts = CheckoutStore::new(runtime.config.checkout_max_age());
    match action {
        CheckoutAction::Show => match checkouts.restore(runtime.local.as_ref()) {
            Some(saved) => println!("{}", serde_json::to_string_pretty(&saved)?),
            None => println!("No restorable checkout"),
        },
        CheckoutAction::Clear => {
            checkouts.clear(runtime.local.as_ref())?;
            println!("Checkout cleared");
        }
        CheckoutAction::Save { items, coupon, user } => {
            let contents = std::fs::read_to_string(&items)
                .with_context(|| format!("Failed to read cart file: {}", items.display()))?;
            let items: Vec<CartItem> = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse cart file: {}", items.display()))?;

            let mut session = CheckoutSession::new(runtime.local(), runtime.config.checkout_max_age());
            session.set_items(items);

            if let Some(code) = coupon {
                let subtotal = session.totals().subtotal;
                let result = session
                    .apply_coupon(&runtime.ctx, &code, || {
                        runtime.api.validate_coupon(&code, subtotal, user.as_deref())
                    })
                    .await;
                if let Err(e) = result {
                    eprintln!("Coupon {}: {}", code, e);
                }
            }
            println!("{}", serde_json::to_string_pretty(&session.totals())?);

            // Leaving checkout without paying hands the coupon back
            let released = session
                .release_coupon(|code| async move {
                    runtime.api.release_coupon(&code, user.as_deref()).await
                })
                .await;
            if let Some(coupon) = released {
                debug!(code = %coupon.code, "Checkout left, coupon returned");
            }
        }
    }
    Ok(())
}

fn read_payload(path: &Path) -> Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut buffer = Vec::new();
        std::io::stdin().read_to_end(&mut buffer)?;
        Ok(buffer)
    } else {
        std::fs::read(path).with_context(|| format!("Failed to read payload: {}", path.display()))
    }
}

pub async fn push(runtime: &Runtime, payload: &Path, click: bool) -> Result<()> {
    let data = read_payload(payload)?;
    let notification = match runtime.worker.dispatch(WorkerEvent::Push(Some(data))).await {
        EventOutcome::Notify(notification) => notification,
        EventOutcome::Dropped(reason) => {
            println!("Push dropped: {}", reason);
            return Ok(());
        }
        other => {
            warn!(outcome = ?other, "Unexpected push outcome");
            return Ok(());
        }
    };
    println!("{}", notification.title);
    println!("{}", serde_json::to_string_pretty(&notification.options)?);

    if click {
        let outcome = runtime
            .worker
            .dispatch(WorkerEvent::NotificationClick(notification))
            .await;
        println!("Click: {:?}", outcome);
        for url in runtime.worker.clients().take_open_requests() {
            println!("Open window: {}", url);
        }
    }
    Ok(())
}

pub async fn watch(runtime: &Runtime, interval: u64) -> Result<()> {
    let clients = runtime.worker.clients();
    clients.claim();
    let (_id, mut page) = clients.connect(&runtime.config.app_origin);
    let check = serde_json::to_string(&WorkerMessage::CheckConnectivity)?;

    // Refresh stale lists whenever connectivity comes back
    let stores = store_collection(runtime);
    let api = runtime.api.clone();
    let ctx = runtime.ctx.clone();
    tokio::spawn(async move {
        stores
            .revalidate_on_reconnect(ctx, || api.fetch_stores())
            .await
    });
    let users = user_collection(runtime);
    let api = runtime.api.clone();
    let ctx = runtime.ctx.clone();
    tokio::spawn(async move {
        users
            .revalidate_on_reconnect(ctx, || api.fetch_users())
            .await
    });

    // Report the current state once, then only changes
    runtime.worker.dispatch(WorkerEvent::Message(check)).await;
    loop {
        while let Ok(message) = page.try_recv() {
            if let ClientMessage::Post(message) = message {
                println!("{}", serde_json::to_string(&message)?);
            }
        }
        runtime.print_notices();

        tokio::time::sleep(Duration::from_secs(interval.max(1))).await;
        let event = if runtime.worker.probe().probe().await {
            WorkerEvent::Online
        } else {
            WorkerEvent::Offline
        };
        runtime.worker.dispatch(event).await;
    }
}
