//! # Polling Data Cache
//!
//! A self-scheduling fetch/refresh/cache unit for one backend resource.
//!
//! ## Key Design Principles:
//! - **Supersession**: every fetch cancels the still-pending fetch of the same
//!   resource before it is issued. Completions are additionally tagged with a
//!   generation number, so only the most recently *initiated* fetch can ever
//!   land in the state, whatever order responses arrive in.
//! - **Stale-but-available**: a failed fetch records its error next to the last
//!   good payload instead of replacing it. The next success clears the error.
//! - **Single writer**: only this cache mutates its `ResourceState` (its own
//!   fetch cycle, or a pushed payload from the reconciler). Readers get
//!   snapshots through a `watch` channel and never lock.
//! - **Deterministic teardown**: `shutdown` cancels the in-flight request and
//!   the timer; nothing mutates the state afterwards.

#![forbid(unsafe_code)]

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::errors::FetchError;
use crate::retrieve::transport::ApiTransport;

/// The telemetry endpoints of the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    System,
    Services,
    Containers,
    Applications,
    Security,
    Diagnostics,
    History,
    Health,
}

impl ResourceKind {
    pub fn name(&self) -> &'static str {
        match self {
            ResourceKind::System => "system",
            ResourceKind::Services => "services",
            ResourceKind::Containers => "containers",
            ResourceKind::Applications => "applications",
            ResourceKind::Security => "security",
            ResourceKind::Diagnostics => "diagnostics",
            ResourceKind::History => "history",
            ResourceKind::Health => "health",
        }
    }

    /// Poll cadence used by the dashboard. `None` means fetch once.
    pub fn default_interval(&self) -> Option<Duration> {
        match self {
            ResourceKind::System => Some(Duration::from_secs(5)),
            ResourceKind::Services | ResourceKind::Containers => Some(Duration::from_secs(10)),
            ResourceKind::Applications | ResourceKind::Diagnostics => Some(Duration::from_secs(30)),
            ResourceKind::Security => Some(Duration::from_secs(60)),
            ResourceKind::History | ResourceKind::Health => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A declared resource. Immutable once the cache is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub kind: ResourceKind,
    /// Path relative to the API base, e.g. `/api/system`.
    pub path: String,
    pub interval: Option<Duration>,
    pub enabled: bool,
}

impl Resource {
    /// The resource with its default path and interval.
    pub fn new(kind: ResourceKind, history_days: u32) -> Self {
        let path = match kind {
            ResourceKind::History => format!("/api/history?days={}", history_days.max(1)),
            ResourceKind::Health => "/health".to_string(),
            other => format!("/api/{}", other.name()),
        };
        Self {
            kind,
            path,
            interval: kind.default_interval(),
            enabled: true,
        }
    }

    pub fn with_interval(mut self, interval: Option<Duration>) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// The live value of one resource.
#[derive(Debug)]
pub struct ResourceState<T> {
    /// Last successfully decoded payload.
    pub data: Option<Arc<T>>,
    /// Error of the most recent fetch; cleared by the next success.
    pub error: Option<FetchError>,
    /// A fetch is in flight.
    pub loading: bool,
    /// When `data` was last replaced.
    pub updated_at: Option<DateTime<Utc>>,
}

impl<T> ResourceState<T> {
    /// Error with a previous payload still available.
    pub fn is_stale(&self) -> bool {
        self.error.is_some() && self.data.is_some()
    }
}

// Manual impls: `T` itself does not need to be `Clone`/`Default`.
impl<T> Clone for ResourceState<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            error: self.error.clone(),
            loading: self.loading,
            updated_at: self.updated_at,
        }
    }
}

impl<T> Default for ResourceState<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            loading: false,
            updated_at: None,
        }
    }
}

struct FetchSlot {
    generation: u64,
    inflight: Option<CancellationToken>,
}

/// Proof that a fetch was initiated; consumed by its completion.
struct FetchTicket {
    generation: u64,
    token: CancellationToken,
}

/// # Polling Cache
///
/// See the module documentation for the guarantees.
pub struct PollingCache<T> {
    resource: Resource,
    transport: Arc<dyn ApiTransport>,
    state: watch::Sender<ResourceState<T>>,
    slot: Mutex<FetchSlot>,
    enabled: watch::Sender<bool>,
    shutdown: CancellationToken,
}

impl<T> PollingCache<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    /// Creates the cache. Nothing is fetched until [`start`](Self::start) or a
    /// manual refetch.
    pub fn new(resource: Resource, transport: Arc<dyn ApiTransport>) -> Arc<Self> {
        let (state, _) = watch::channel(ResourceState::default());
        let (enabled, _) = watch::channel(resource.enabled);
        Arc::new(Self {
            resource,
            transport,
            state,
            slot: Mutex::new(FetchSlot { generation: 0, inflight: None }),
            enabled,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn kind(&self) -> ResourceKind {
        self.resource.kind
    }

    /// Consistent copy of the current state.
    pub fn snapshot(&self) -> ResourceState<T> {
        self.state.borrow().clone()
    }

    /// Shortcut for `snapshot().data`.
    pub fn data(&self) -> Option<Arc<T>> {
        self.state.borrow().data.clone()
    }

    /// Change notifications for renderers and derived data.
    pub fn watch(&self) -> watch::Receiver<ResourceState<T>> {
        self.state.subscribe()
    }

    pub fn is_enabled(&self) -> bool {
        *self.enabled.borrow()
    }

    /// Stops or resumes scheduling. Disabling keeps the last payload;
    /// re-enabling fetches immediately.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.send_if_modified(|current| {
            let changed = *current != enabled;
            *current = enabled;
            changed
        });
    }

    /// # Start
    ///
    /// Issues the first fetch right away and, for resources with an interval,
    /// keeps refetching at that cadence until [`shutdown`](Self::shutdown).
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move { cache.run().await })
    }

    async fn run(self: Arc<Self>) {
        let mut enabled = self.enabled.subscribe();
        log::debug!(
            "Polling {} every {:?}",
            self.resource.path,
            self.resource.interval
        );

        if *enabled.borrow_and_update() {
            self.refetch();
        }

        let mut ticker = self.resource.interval.map(|period| {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = next_tick(&mut ticker) => {
                    if *enabled.borrow() {
                        self.refetch();
                    }
                }
                changed = enabled.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if *enabled.borrow_and_update() {
                        self.refetch();
                        if let Some(ticker) = ticker.as_mut() {
                            ticker.reset();
                        }
                    }
                }
            }
        }

        log::debug!("Polling of {} stopped", self.resource.path);
    }

    /// Initiates a fetch in the background, superseding any pending one.
    pub fn refetch(self: &Arc<Self>) {
        if let Some(ticket) = self.begin_fetch() {
            let cache = Arc::clone(self);
            tokio::spawn(async move {
                cache.finish_fetch(ticket).await;
            });
        }
    }

    /// Initiates a fetch, superseding any pending one, and waits for it.
    ///
    /// Returns the state after this fetch settled. If a newer fetch or a
    /// pushed payload superseded it, that newer state is returned instead.
    pub async fn refresh(&self) -> ResourceState<T> {
        self.fetch_now().await;
        self.snapshot()
    }

    /// Initiates a fetch, superseding any pending one, and returns what that
    /// fetch itself produced.
    ///
    /// `None` when it never landed: a newer fetch, a pushed payload or
    /// shutdown superseded it. Unlike [`refresh`](Self::refresh), a failure is
    /// never masked by the last good payload.
    pub async fn fetch_now(&self) -> Option<Result<Arc<T>, FetchError>> {
        let ticket = self.begin_fetch()?;
        self.finish_fetch(ticket).await
    }

    /// Replaces the payload with one pushed over the realtime channel.
    ///
    /// Counts as the newest initiation: a pending fetch is superseded and can
    /// no longer overwrite the pushed value.
    pub fn apply_pushed(&self, value: T) {
        if self.shutdown.is_cancelled() {
            return;
        }
        let mut slot = lock(&self.slot);
        if let Some(previous) = slot.inflight.take() {
            previous.cancel();
        }
        slot.generation += 1;
        self.state.send_modify(|state| {
            state.data = Some(Arc::new(value));
            state.error = None;
            state.loading = false;
            state.updated_at = Some(Utc::now());
        });
    }

    /// Cancels the in-flight request and the timer. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        if let Some(token) = lock(&self.slot).inflight.take() {
            token.cancel();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    fn begin_fetch(&self) -> Option<FetchTicket> {
        if self.shutdown.is_cancelled() {
            return None;
        }
        let mut slot = lock(&self.slot);
        if let Some(previous) = slot.inflight.take() {
            previous.cancel();
        }
        slot.generation += 1;
        let token = self.shutdown.child_token();
        slot.inflight = Some(token.clone());
        self.state.send_if_modified(|state| {
            let changed = !state.loading;
            state.loading = true;
            changed
        });
        Some(FetchTicket { generation: slot.generation, token })
    }

    async fn finish_fetch(&self, ticket: FetchTicket) -> Option<Result<Arc<T>, FetchError>> {
        let outcome = tokio::select! {
            biased;
            _ = ticket.token.cancelled() => None,
            result = self.fetch_once() => Some(result),
        };
        let landed = outcome.and_then(|result| self.complete(ticket.generation, result));
        if landed.is_none() {
            log::trace!("{} fetch #{} superseded", self.resource.path, ticket.generation);
        }
        landed
    }

    async fn fetch_once(&self) -> Result<T, FetchError> {
        let response = self.transport.get(&self.resource.path).await?;
        if !response.success {
            return Err(FetchError::Status {
                status: response.status,
                message: response.failure_message(),
            });
        }
        serde_json::from_value(response.data.unwrap_or(Value::Null))
            .map_err(|e| FetchError::Decode(e.to_string()))
    }

    /// Lands `result` if `generation` is still the newest initiation.
    fn complete(&self, generation: u64, result: Result<T, FetchError>) -> Option<Result<Arc<T>, FetchError>> {
        let mut slot = lock(&self.slot);
        if slot.generation != generation || self.shutdown.is_cancelled() {
            return None;
        }
        slot.inflight = None;

        match result {
            Ok(value) => {
                let value = Arc::new(value);
                self.state.send_modify(|state| {
                    state.data = Some(value.clone());
                    state.error = None;
                    state.loading = false;
                    state.updated_at = Some(Utc::now());
                });
                Some(Ok(value))
            }
            Err(err) => {
                log::warn!("Fetching {} failed: {}", self.resource.path, err);
                self.state.send_modify(|state| {
                    state.error = Some(err.clone());
                    state.loading = false;
                });
                Some(Err(err))
            }
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn lock(slot: &Mutex<FetchSlot>) -> MutexGuard<'_, FetchSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}
