//! ============================================================================
//! Sync Coordinator - Background flush of finished workouts
//! ============================================================================
//! Pushes unsynced workout completions from the local cache to the backend:
//! - Once on `initialize()` when online
//! - On every offline -> online transition
//! - Every 30 seconds while online
//! - On demand via `force_sync()`
//!
//! Remote writes are upserts keyed by (user, date), so retrying a record
//! that already reached the backend updates the row instead of duplicating it.
//! Failures never escape: they become log lines and the aggregate
//! `SyncStatus` broadcast to subscribers.
//! ============================================================================

mod listeners;

pub use listeners::{ListenerRegistry, Subscription};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cache::{WorkoutCache, WorkoutCompletionRecord};
use crate::connectivity::{ConnectionStatus, ConnectivitySignal};
use crate::remote::{IdentityProvider, RemoteStore};

/// Period of the background sync timer
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// How long `Success` is shown before reverting to `Idle`
pub const DEFAULT_SUCCESS_RESET: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Success,
    Error,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Syncing => write!(f, "syncing"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Initialized,
    /// Torn down; `initialize()` may start it again
    Destroyed,
}

/// What a sync pass did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Skipped, no connection
    Offline,
    /// Skipped, another pass is running
    AlreadySyncing,
    NothingPending,
    /// No signed-in user; status set to `Error`
    Unauthenticated,
    /// Identity lookup itself failed; status set to `Error`
    IdentityUnavailable,
    /// Every pending record was attempted
    Completed { synced: usize, failed: usize },
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub interval: Duration,
    pub success_reset: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SYNC_INTERVAL,
            success_reset: DEFAULT_SUCCESS_RESET,
        }
    }
}

struct CoordinatorState {
    lifecycle: Lifecycle,
    sync_status: SyncStatus,
    /// Bumped on every status transition
    transition: u64,
    watcher: Option<JoinHandle<()>>,
    timer: Option<JoinHandle<()>>,
    reset: Option<JoinHandle<()>>,
}

struct Inner {
    cache: WorkoutCache,
    remote: Arc<dyn RemoteStore>,
    identity: Arc<dyn IdentityProvider>,
    connectivity: ConnectivitySignal,
    config: SyncConfig,
    state: Mutex<CoordinatorState>,
    sync_listeners: Arc<ListenerRegistry<SyncStatus>>,
    connection_listeners: Arc<ListenerRegistry<ConnectionStatus>>,
}

/// Connectivity-aware sync service. Clones share one instance. The watcher
/// and timer tasks hold weak references and stop once every handle is
/// dropped or `destroy()` is called; a pass already in flight keeps the
/// instance alive until it finishes.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

impl SyncCoordinator {
    pub fn new(
        cache: WorkoutCache,
        remote: Arc<dyn RemoteStore>,
        identity: Arc<dyn IdentityProvider>,
        connectivity: ConnectivitySignal,
    ) -> Self {
        Self::with_config(cache, remote, identity, connectivity, SyncConfig::default())
    }

    pub fn with_config(
        cache: WorkoutCache,
        remote: Arc<dyn RemoteStore>,
        identity: Arc<dyn IdentityProvider>,
        connectivity: ConnectivitySignal,
        config: SyncConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache,
                remote,
                identity,
                connectivity,
                config,
                state: Mutex::new(CoordinatorState {
                    lifecycle: Lifecycle::Uninitialized,
                    sync_status: SyncStatus::Idle,
                    transition: 0,
                    watcher: None,
                    timer: None,
                    reset: None,
                }),
                sync_listeners: ListenerRegistry::new(),
                connection_listeners: ListenerRegistry::new(),
            }),
        }
    }

    /// Start watching connectivity and syncing in the background.
    /// Must run inside a Tokio runtime. A second call is a no-op.
    pub fn initialize(&self) {
        let inner = &self.inner;
        let mut rx = inner.connectivity.subscribe();
        let online = *rx.borrow_and_update();

        {
            let mut state = inner.state();
            if state.lifecycle == Lifecycle::Initialized {
                debug!("Sync coordinator already initialized");
                return;
            }
            state.lifecycle = Lifecycle::Initialized;
            state.watcher = Some(inner.spawn_watcher(rx, online));
            if online {
                inner.start_timer(&mut state);
            }
        }

        info!(
            "Sync coordinator initialized ({}, every {:?})",
            ConnectionStatus::from_online(online),
            inner.config.interval
        );

        if online {
            inner.spawn_sync();
        }
    }

    /// Stop the connectivity watcher and the timer. Safe without
    /// `initialize()`. A pass in flight runs to completion.
    pub fn destroy(&self) {
        let mut state = self.inner.state();
        for task in [state.watcher.take(), state.timer.take()].into_iter().flatten() {
            task.abort();
        }
        if state.lifecycle == Lifecycle::Initialized {
            state.lifecycle = Lifecycle::Destroyed;
            info!("Sync coordinator destroyed");
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.state().lifecycle
    }

    pub fn is_online(&self) -> bool {
        self.inner.connectivity.is_online()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.inner.connectivity.status()
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.inner.sync_status()
    }

    /// Number of finished workouts waiting for the backend
    pub fn pending_count(&self) -> usize {
        self.inner.cache.get_unsynced_workout_completions().len()
    }

    pub fn on_sync_status_change(
        &self,
        listener: impl Fn(SyncStatus) + Send + Sync + 'static,
    ) -> Subscription<SyncStatus> {
        self.inner.sync_listeners.subscribe(listener)
    }

    pub fn on_connection_change(
        &self,
        listener: impl Fn(ConnectionStatus) + Send + Sync + 'static,
    ) -> Subscription<ConnectionStatus> {
        self.inner.connection_listeners.subscribe(listener)
    }

    /// Push every unsynced completion. No-op when offline or when a pass
    /// is already running.
    pub async fn sync_pending_completions(&self) -> SyncOutcome {
        self.inner.sync_pending().await
    }

    /// Externally triggered sync
    pub async fn force_sync(&self) -> SyncOutcome {
        if !self.is_online() {
            warn!("Cannot sync while offline");
            return SyncOutcome::Offline;
        }
        self.inner.sync_pending().await
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sync_status(&self) -> SyncStatus {
        self.state().sync_status
    }

    /// Record a transition and broadcast it. Returns the transition number.
    fn set_status(&self, status: SyncStatus) -> u64 {
        let transition = {
            let mut state = self.state();
            state.sync_status = status;
            state.transition += 1;
            state.transition
        };
        debug!("Sync status: {}", status);
        self.sync_listeners.notify(status);
        transition
    }

    /// Check-and-set of the `Syncing` guard, before any suspension point
    fn try_begin_sync(&self) -> Result<(), SyncOutcome> {
        {
            let mut state = self.state();
            if !self.connectivity.is_online() {
                return Err(SyncOutcome::Offline);
            }
            if state.sync_status == SyncStatus::Syncing {
                return Err(SyncOutcome::AlreadySyncing);
            }
            state.sync_status = SyncStatus::Syncing;
            state.transition += 1;
        }
        debug!("Sync status: {}", SyncStatus::Syncing);
        self.sync_listeners.notify(SyncStatus::Syncing);
        Ok(())
    }

    async fn sync_pending(self: &Arc<Self>) -> SyncOutcome {
        if let Err(skipped) = self.try_begin_sync() {
            debug!("Sync skipped: {:?}", skipped);
            return skipped;
        }

        let mut guard = PassGuard {
            inner: self,
            finished: false,
        };
        let outcome = self.run_pass().await;
        guard.finished = true;
        outcome
    }

    /// Body of a pass; the caller holds the `Syncing` guard
    async fn run_pass(self: &Arc<Self>) -> SyncOutcome {
        let pending = self.cache.get_unsynced_workout_completions();
        if pending.is_empty() {
            self.set_status(SyncStatus::Idle);
            return SyncOutcome::NothingPending;
        }

        let user = match self.identity.current_user().await {
            Ok(Some(user)) => user,
            Ok(None) => {
                warn!("Cannot sync {} completions: no signed-in user", pending.len());
                self.set_status(SyncStatus::Error);
                return SyncOutcome::Unauthenticated;
            }
            Err(e) => {
                warn!("Cannot sync: identity lookup failed: {}", e);
                self.set_status(SyncStatus::Error);
                return SyncOutcome::IdentityUnavailable;
            }
        };

        info!("Syncing {} pending workout completions", pending.len());

        let mut synced = 0;
        let mut failed = 0;
        for record in &pending {
            match self.push_completion(record, &user.id).await {
                Ok(()) => {
                    self.cache.mark_workout_completion_synced(&record.id);
                    synced += 1;
                }
                Err(e) => {
                    warn!("Failed to sync completion {}: {}", record.id, e);
                    failed += 1;
                }
            }
        }

        info!("Sync pass finished: {} synced, {} left for retry", synced, failed);
        let transition = self.set_status(SyncStatus::Success);
        self.schedule_idle_reset(transition);

        SyncOutcome::Completed { synced, failed }
    }

    /// Upsert by (user, date)
    async fn push_completion(&self, record: &WorkoutCompletionRecord, user_id: &str) -> anyhow::Result<()> {
        match self.remote.find_workout_log(user_id, record.date).await? {
            Some(existing) => {
                self.remote
                    .update_workout_log(&existing.id, &record.exercises, record.completed_at)
                    .await
            }
            None => {
                self.remote
                    .insert_workout_log(user_id, record.date, &record.exercises, record.completed_at)
                    .await
            }
        }
    }

    /// Revert `Success` to `Idle` unless another transition happened first
    fn schedule_idle_reset(self: &Arc<Self>, transition: u64) {
        let weak = Arc::downgrade(self);
        let delay = self.config.success_reset;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                let reverted = {
                    let mut state = inner.state();
                    let unchanged =
                        state.transition == transition && state.sync_status == SyncStatus::Success;
                    if unchanged {
                        state.sync_status = SyncStatus::Idle;
                        state.transition += 1;
                    }
                    unchanged
                };
                if reverted {
                    debug!("Sync status: {}", SyncStatus::Idle);
                    inner.sync_listeners.notify(SyncStatus::Idle);
                }
            }
        });

        if let Some(previous) = self.state().reset.replace(task) {
            previous.abort();
        }
    }

    /// Run a pass on its own task, so aborting the caller never cancels it
    fn spawn_sync(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            if let Some(inner) = weak.upgrade() {
                inner.sync_pending().await;
            }
        });
    }

    fn spawn_watcher(self: &Arc<Self>, mut rx: watch::Receiver<bool>, mut last: bool) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let online = *rx.borrow_and_update();
                if online == last {
                    continue;
                }
                last = online;

                let Some(inner) = weak.upgrade() else { break };
                if online {
                    inner.handle_online();
                } else {
                    inner.handle_offline();
                }
            }
        })
    }

    fn handle_online(self: &Arc<Self>) {
        info!("Connection restored, syncing pending workouts");
        self.connection_listeners.notify(ConnectionStatus::Online);
        self.spawn_sync();
        let mut state = self.state();
        if state.lifecycle == Lifecycle::Initialized {
            self.start_timer(&mut state);
        }
    }

    fn handle_offline(&self) {
        warn!("Connection lost, pausing background sync");
        self.connection_listeners.notify(ConnectionStatus::Offline);
        if let Some(timer) = self.state().timer.take() {
            timer.abort();
        }
    }

    fn start_timer(self: &Arc<Self>, state: &mut CoordinatorState) {
        if state.timer.as_ref().is_some_and(|timer| !timer.is_finished()) {
            return;
        }

        let weak = Arc::downgrade(self);
        let period = self.config.interval;
        state.timer = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                if inner.connectivity.is_online() && inner.sync_status() != SyncStatus::Syncing {
                    inner.spawn_sync();
                }
            }
        }));
    }
}

/// Puts the status back to `Idle` when a pass is dropped before finishing
struct PassGuard<'a> {
    inner: &'a Inner,
    finished: bool,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let reverted = {
            let mut state = self.inner.state();
            let stuck = state.sync_status == SyncStatus::Syncing;
            if stuck {
                state.sync_status = SyncStatus::Idle;
                state.transition += 1;
            }
            stuck
        };
        if reverted {
            warn!("Sync pass cancelled, pending workouts stay queued");
            self.inner.sync_listeners.notify(SyncStatus::Idle);
        }
    }
}
