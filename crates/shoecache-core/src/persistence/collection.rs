use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::ApiError;
use crate::cache::CachedData;
use crate::connectivity::ConnectivityContext;
use crate::models::{Record, Store, User};
use crate::notice::Notice;

use super::limiter::NoticeLimiter;
use super::local_store::LocalStore;

/// Where a data source stands relative to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchState {
    /// Nothing loaded yet
    #[default]
    Idle,
    /// Last load came from the network
    Fresh,
    /// Showing the local copy after a failure or while offline
    StaleCached,
    /// Background refresh in flight
    Refreshing,
}

/// Storage keys and notice texts for one collection
#[derive(Debug, Clone, Copy)]
pub struct CollectionProfile {
    pub data_key: &'static str,
    pub updated_key: &'static str,
    /// Body of the "showing local copy" notices
    pub local_copy_body: &'static str,
    pub synced_body: &'static str,
    /// Warning shown offline when there is no local copy at all
    pub empty_offline: Option<(&'static str, &'static str)>,
}

impl CollectionProfile {
    pub const STORES: CollectionProfile = CollectionProfile {
        data_key: "cachedStores",
        updated_key: "storesLastUpdate",
        local_copy_body: "Mostrando tiendas guardadas localmente",
        synced_body: "Lista de tiendas actualizada",
        empty_offline: None,
    };

    pub const USERS: CollectionProfile = CollectionProfile {
        data_key: "cachedUsuarios",
        updated_key: "usuariosLastUpdate",
        local_copy_body: "Mostrando usuarios guardados localmente",
        synced_body: "Lista de usuarios actualizada",
        empty_offline: Some(("Sin Conexión", "No hay usuarios guardados para mostrar offline")),
    };
}

/// Result of a load
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<T> {
    pub records: Vec<T>,
    pub state: FetchState,
}

/// A list mirrored into local storage with connectivity-gated fetch.
///
/// Network results overwrite the local copy unless the local copy was
/// written by a fetch that started later.
pub struct OfflineCollection<T> {
    profile: CollectionProfile,
    store: Arc<dyn LocalStore>,
    limiter: NoticeLimiter,
    freshness: Duration,
    state: Mutex<FetchState>,
    _records: PhantomData<fn() -> T>,
}

impl OfflineCollection<Store> {
    pub fn stores(store: Arc<dyn LocalStore>, freshness: Duration, notice_window: Duration) -> Self {
        Self::new(CollectionProfile::STORES, store, freshness, notice_window)
    }
}

impl OfflineCollection<User> {
    pub fn users(store: Arc<dyn LocalStore>, freshness: Duration, notice_window: Duration) -> Self {
        Self::new(CollectionProfile::USERS, store, freshness, notice_window)
    }
}

impl<T: Record + 'static> OfflineCollection<T> {
    pub fn new(
        profile: CollectionProfile,
        store: Arc<dyn LocalStore>,
        freshness: Duration,
        notice_window: Duration,
    ) -> Self {
        Self {
            profile,
            store,
            limiter: NoticeLimiter::new(notice_window),
            freshness,
            state: Mutex::new(FetchState::Idle),
            _records: PhantomData,
        }
    }

    fn state_guard(&self) -> MutexGuard<'_, FetchState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> FetchState {
        *self.state_guard()
    }

    fn set_state(&self, state: FetchState) {
        let mut current = self.state_guard();
        if *current != state {
            debug!(key = self.profile.data_key, from = ?*current, to = ?state, "Fetch state");
            *current = state;
        }
    }

    pub fn profile(&self) -> &CollectionProfile {
        &self.profile
    }

    fn read_records(&self) -> Vec<T> {
        match self.store.get_json::<Vec<T>>(self.profile.data_key) {
            Ok(records) => records.unwrap_or_default(),
            Err(e) => {
                warn!(key = self.profile.data_key, error = %e, "Ignoring unreadable local copy");
                Vec::new()
            }
        }
    }

    fn read_updated_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.store.get_item(self.profile.updated_key).ok().flatten()?;
        DateTime::parse_from_rfc3339(raw.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// The local copy with its timestamp, if both exist
    pub fn cached(&self) -> Option<CachedData<Vec<T>>> {
        let updated_at = self.read_updated_at()?;
        Some(CachedData::at(self.read_records(), updated_at))
    }

    /// Write records fetched at `fetched_at`, unless a newer copy is stored.
    /// Returns whether the write happened.
    pub fn save_if_newer(&self, records: &[T], fetched_at: DateTime<Utc>) -> anyhow::Result<bool> {
        if let Some(stored_at) = self.read_updated_at() {
            if stored_at > fetched_at {
                debug!(key = self.profile.data_key, "Local copy is newer than fetch result, keeping it");
                return Ok(false);
            }
        }
        self.store.set_json(self.profile.data_key, records)?;
        self.store.set_item(
            self.profile.updated_key,
            &fetched_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        )?;
        Ok(true)
    }

    fn notify_limited(&self, ctx: &ConnectivityContext, notice: Notice) {
        match self.limiter.should_show(self.store.as_ref(), Utc::now()) {
            Ok(true) => ctx.show_notification(notice),
            Ok(false) => debug!(title = %notice.title, "Notice suppressed"),
            Err(e) => warn!(error = %e, "Notice limiter unavailable"),
        }
    }

    /// Restart the notice window, as when the user opens a store
    pub fn touch(&self) -> anyhow::Result<()> {
        self.limiter.touch(self.store.as_ref(), Utc::now())
    }

    fn persist(&self, records: &[T], fetched_at: DateTime<Utc>) {
        if let Err(e) = self.save_if_newer(records, fetched_at) {
            warn!(key = self.profile.data_key, error = %e, "Failed to persist local copy");
        }
    }

    /// Load from the network when online, otherwise (or on failure) from the
    /// local copy. Only listed records are kept from a network result.
    pub async fn load<F, Fut>(&self, ctx: &ConnectivityContext, fetch: F) -> Loaded<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>, ApiError>>,
    {
        if !ctx.is_online() {
            let records = self.read_records();
            self.set_state(FetchState::StaleCached);
            match self.profile.empty_offline {
                Some((title, body)) if records.is_empty() => {
                    ctx.show_notification(Notice::warning(title, body));
                }
                _ => self.notify_limited(ctx, Notice::info("Modo Offline", self.profile.local_copy_body)),
            }
            return Loaded {
                records,
                state: FetchState::StaleCached,
            };
        }

        let fetched_at = Utc::now();
        match fetch().await {
            Ok(records) => {
                let records: Vec<T> = records.into_iter().filter(|r| r.is_listed()).collect();
                self.persist(&records, fetched_at);
                self.set_state(FetchState::Fresh);
                info!(key = self.profile.data_key, count = records.len(), "Loaded from network");
                Loaded {
                    records,
                    state: FetchState::Fresh,
                }
            }
            Err(e) => {
                warn!(key = self.profile.data_key, error = %e, "Fetch failed, using local copy");
                let records = self.read_records();
                if !records.is_empty() {
                    self.notify_limited(
                        ctx,
                        Notice::warning("Error de conexión", self.profile.local_copy_body),
                    );
                }
                self.set_state(FetchState::StaleCached);
                Loaded {
                    records,
                    state: FetchState::StaleCached,
                }
            }
        }
    }

    fn is_past_freshness(&self, now: DateTime<Utc>) -> bool {
        self.cached()
            .is_some_and(|cached| cached.is_older_than(self.freshness, now))
    }

    /// Whether a background refresh should run now
    pub fn needs_refresh(&self, ctx: &ConnectivityContext, now: DateTime<Utc>) -> bool {
        ctx.is_online() && self.state() != FetchState::Refreshing && self.is_past_freshness(now)
    }

    /// Move to `Refreshing` if a refresh is due and none is running
    fn begin_refresh(&self, ctx: &ConnectivityContext, now: DateTime<Utc>) -> bool {
        if !ctx.is_online() || !self.is_past_freshness(now) {
            return false;
        }
        let mut state = self.state_guard();
        if *state == FetchState::Refreshing {
            return false;
        }
        debug!(key = self.profile.data_key, from = ?*state, "Refresh started");
        *state = FetchState::Refreshing;
        true
    }

    /// Refresh the local copy if it is past the freshness window.
    /// Returns the new records when a refresh ran and succeeded.
    pub async fn revalidate<F, Fut>(&self, ctx: &ConnectivityContext, fetch: F) -> Option<Vec<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>, ApiError>>,
    {
        if !self.begin_refresh(ctx, Utc::now()) {
            return None;
        }
        self.refresh(ctx, fetch).await
    }

    /// Revalidate every time connectivity comes back, until the monitor is gone
    pub async fn revalidate_on_reconnect<F, Fut>(&self, mut ctx: ConnectivityContext, fetch: F)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Vec<T>, ApiError>>,
    {
        while ctx.reconnected().await {
            debug!(key = self.profile.data_key, "Back online");
            self.revalidate(&ctx, &fetch).await;
        }
    }

    /// Runs after `begin_refresh` succeeded
    async fn refresh<F, Fut>(&self, ctx: &ConnectivityContext, fetch: F) -> Option<Vec<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>, ApiError>>,
    {
        let fetched_at = Utc::now();
        match fetch().await {
            Ok(records) => {
                let records: Vec<T> = records.into_iter().filter(|r| r.is_listed()).collect();
                self.persist(&records, fetched_at);
                self.set_state(FetchState::Fresh);
                self.notify_limited(ctx, Notice::success("Sincronización", self.profile.synced_body));
                Some(records)
            }
            Err(e) => {
                warn!(key = self.profile.data_key, error = %e, "Background refresh failed");
                self.set_state(FetchState::StaleCached);
                None
            }
        }
    }

    /// `revalidate` on a spawned task, so the caller never waits on it
    pub fn spawn_revalidate<F, Fut>(
        self: &Arc<Self>,
        ctx: ConnectivityContext,
        fetch: F,
    ) -> Option<JoinHandle<Option<Vec<T>>>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Vec<T>, ApiError>> + Send + 'static,
    {
        if !self.begin_refresh(&ctx, Utc::now()) {
            return None;
        }
        let this = Arc::clone(self);
        Some(tokio::spawn(async move { this.refresh(&ctx, fetch).await }))
    }
}
