//! Session lifecycle: start, end, reload and the once-a-second tick.
//!
//! The controller owns the in-memory mirror of the session and publishes it
//! through a watch channel. Every transition runs under one async lock, so
//! `start`, `end`, `reload` and ticks never interleave. The in-memory state is
//! updated before any storage call, and storage failures are logged and
//! otherwise ignored; `reload` is the path that reconciles with disk.

use std::ops::ControlFlow;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use super::ticker::Ticker;
use super::SessionError;
use crate::clock::{self, Clock};
use crate::models::Session;
use crate::store::SessionStore;

/// Period between ticks while a session is active.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// What the UI sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    NoSession,
    Active {
        expires_at: i64,
        remaining_seconds: u64,
    },
}

impl SessionStatus {
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    pub const fn remaining_seconds(&self) -> u64 {
        match self {
            Self::Active {
                remaining_seconds, ..
            } => *remaining_seconds,
            Self::NoSession => 0,
        }
    }

    pub const fn expires_at(&self) -> Option<i64> {
        match self {
            Self::Active { expires_at, .. } => Some(*expires_at),
            Self::NoSession => None,
        }
    }

    fn at(expires_at: i64, now: i64) -> Self {
        match clock::seconds_until(expires_at, now) {
            0 => Self::NoSession,
            remaining_seconds => Self::Active {
                expires_at,
                remaining_seconds,
            },
        }
    }
}

/// Host application visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppState {
    Foreground,
    Background,
}

/// How a resync treats what it finds on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resync {
    /// Disk is the truth; anything unreadable means no session.
    FromDisk,
    /// The session just failed to persist; keep the in-memory one for this run.
    KeepMirror,
}

/// State guarded by the transition lock.
#[derive(Debug, Default)]
struct Slot {
    ticker: Option<Ticker>,
    next_generation: u64,
}

impl Slot {
    fn disarm(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.cancel();
        }
    }
}

struct Inner {
    store: SessionStore,
    clock: Arc<dyn Clock>,
    status: watch::Sender<SessionStatus>,
    slot: Mutex<Slot>,
}

/// Single owner of session state for the running app.
///
/// Cloning is cheap and every clone drives the same session.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl SessionController {
    /// Create a controller in `NoSession`. Call [`reload`](Self::reload) to
    /// pick up a persisted session.
    pub fn new(store: SessionStore, clock: Arc<dyn Clock>) -> Self {
        let (status, _) = watch::channel(SessionStatus::NoSession);
        Self {
            inner: Arc::new(Inner {
                store,
                clock,
                status,
                slot: Mutex::new(Slot::default()),
            }),
        }
    }

    /// Current snapshot.
    pub fn status(&self) -> SessionStatus {
        *self.inner.status.borrow()
    }

    /// Receive every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status.subscribe()
    }

    /// Expiry a session started now would get.
    pub fn preview(&self, duration_minutes: u32) -> i64 {
        clock::compute_expires_at(self.inner.clock.now_ms(), duration_minutes)
    }

    /// Start a session of `duration_minutes`, replacing any current one.
    ///
    /// The new state is visible to subscribers before the record is written.
    pub async fn start(&self, duration_minutes: u32) -> Result<SessionStatus, SessionError> {
        if duration_minutes == 0 {
            return Err(SessionError::InvalidDuration(duration_minutes));
        }

        let inner = &self.inner;
        let mut slot = inner.slot.lock().await;

        let now = inner.clock.now_ms();
        let session = Session::new(now, duration_minutes);
        inner.publish(SessionStatus::Active {
            expires_at: session.expires_at,
            remaining_seconds: clock::remaining_seconds(Some(&session), now),
        });
        info!(
            duration_minutes,
            expires_at = session.expires_at,
            "Session started"
        );

        let mode = match inner.store.save(&session).await {
            Ok(()) => Resync::FromDisk,
            Err(err) => {
                warn!(error = %err, "Failed to persist session; keeping it in memory");
                Resync::KeepMirror
            }
        };
        inner.resync(&mut slot, mode).await;
        Ok(self.status())
    }

    /// End the session now. Safe to call with no session.
    pub async fn end(&self) -> SessionStatus {
        let inner = &self.inner;
        let mut slot = inner.slot.lock().await;

        slot.disarm();
        let was_active = inner.status.borrow().is_active();
        inner.publish(SessionStatus::NoSession);
        if let Err(err) = inner.store.clear().await {
            warn!(error = %err, "Failed to clear stored session");
        }
        if was_active {
            info!("Session ended");
        }
        SessionStatus::NoSession
    }

    /// Re-read the stored session and recompute everything from the clock.
    pub async fn reload(&self) -> SessionStatus {
        let mut slot = self.inner.slot.lock().await;
        self.inner.resync(&mut slot, Resync::FromDisk).await;
        self.status()
    }

    /// React to the host app changing visibility.
    ///
    /// Timers may not fire while in the background, so regaining the
    /// foreground always runs a full reload.
    pub async fn on_app_state(&self, state: AppState) -> SessionStatus {
        match state {
            AppState::Foreground => {
                debug!("App returned to foreground; reloading session");
                self.reload().await
            }
            AppState::Background => self.status(),
        }
    }
}

impl Inner {
    fn publish(&self, status: SessionStatus) {
        self.status.send_replace(status);
    }

    async fn resync(self: &Arc<Self>, slot: &mut Slot, mode: Resync) {
        let now = self.clock.now_ms();
        let mirror = self.status.borrow().expires_at();

        let expires_at = match (self.store.load().await, mode) {
            (Ok(Some(stored)), Resync::KeepMirror) if Some(stored.expires_at) != mirror => mirror,
            (Ok(Some(stored)), _) if stored.is_active_at(now) => Some(stored.expires_at),
            (Ok(Some(stored)), _) => {
                debug!(expires_at = stored.expires_at, "Stored session already expired");
                if let Err(err) = self.store.clear().await {
                    warn!(error = %err, "Failed to clear expired session");
                }
                None
            }
            (Ok(None), Resync::FromDisk) => None,
            (Err(err), Resync::FromDisk) => {
                warn!(error = %err, "Failed to read stored session; treating as none");
                None
            }
            (Ok(None) | Err(_), Resync::KeepMirror) => mirror,
        };

        slot.disarm();
        let status = expires_at.map_or(SessionStatus::NoSession, |e| SessionStatus::at(e, now));
        self.publish(status);
        if status.is_active() {
            self.arm(slot);
        }
        debug!(?status, "Session resynced");
    }

    fn arm(self: &Arc<Self>, slot: &mut Slot) {
        let generation = slot.next_generation;
        slot.next_generation += 1;

        let weak: Weak<Self> = Arc::downgrade(self);
        slot.ticker = Some(Ticker::spawn(generation, TICK_PERIOD, move || {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(inner) => inner.tick(generation).await,
                    None => ControlFlow::Break(()),
                }
            }
        }));
    }

    async fn tick(&self, generation: u64) -> ControlFlow<()> {
        let mut slot = self.slot.lock().await;
        if slot.ticker.as_ref().map(Ticker::generation) != Some(generation) {
            return ControlFlow::Break(());
        }

        let current = *self.status.borrow();
        let Some(expires_at) = current.expires_at() else {
            slot.disarm();
            return ControlFlow::Break(());
        };

        let status = SessionStatus::at(expires_at, self.clock.now_ms());
        self.publish(status);
        if status.is_active() {
            return ControlFlow::Continue(());
        }

        info!("Session time is up");
        if let Err(err) = self.store.clear().await {
            warn!(error = %err, "Failed to clear expired session");
        }
        if let Some(ticker) = slot.ticker.take() {
            ticker.detach();
        }
        ControlFlow::Break(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::ManualClock;
    use crate::store::testing::FlakyStore;
    use crate::store::{MemorySecureStore, SecureStore};

    const T0: i64 = 1_700_000_000_000;

    struct Harness {
        clock: ManualClock,
        backend: Arc<FlakyStore>,
        store: SessionStore,
        controller: SessionController,
    }

    fn harness() -> Harness {
        let clock = ManualClock::new(T0);
        let backend = Arc::new(FlakyStore::default());
        let store = SessionStore::new(backend.clone());
        let controller = SessionController::new(store.clone(), Arc::new(clock.clone()));
        Harness {
            clock,
            backend,
            store,
            controller,
        }
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    async fn wait_until_inactive(controller: &SessionController) {
        let mut rx = controller.subscribe();
        tokio::time::timeout(Duration::from_secs(10), rx.wait_for(|s| !s.is_active()))
            .await
            .expect("session did not end")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn start_reports_full_budget() {
        let h = harness();
        let status = h.controller.start(30).await.unwrap();

        assert!(status.is_active());
        assert_eq!(status.remaining_seconds(), 1_800);
        assert_eq!(status.expires_at(), Some(T0 + 30 * 60_000));

        let stored = h.store.load().await.unwrap().unwrap();
        assert_eq!(stored.started_at, T0);
        assert_eq!(stored.duration_minutes, 30);
    }

    #[tokio::test(start_paused = true)]
    async fn start_rejects_zero_duration() {
        let h = harness();
        assert_eq!(
            h.controller.start(0).await,
            Err(SessionError::InvalidDuration(0))
        );
        assert_eq!(h.controller.status(), SessionStatus::NoSession);
        assert_eq!(h.store.load().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_counts_down() {
        let h = harness();
        h.controller.start(30).await.unwrap();

        h.clock.advance(Duration::from_secs(1));
        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(h.controller.status().remaining_seconds(), 1_799);

        h.clock.advance(Duration::from_millis(2_500));
        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(h.controller.status().remaining_seconds(), 1_797);
    }

    #[tokio::test(start_paused = true)]
    async fn expires_on_its_own_and_clears_storage() {
        let h = harness();
        h.controller.start(30).await.unwrap();

        h.clock.advance(Duration::from_secs(1_801));
        wait_until_inactive(&h.controller).await;

        assert_eq!(h.controller.status(), SessionStatus::NoSession);
        assert_eq!(h.store.load().await.unwrap(), None);

        // The timer is gone: no further clock reads.
        let reads = h.clock.reads();
        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(h.clock.reads(), reads);
    }

    #[tokio::test(start_paused = true)]
    async fn reload_without_session_is_inactive() {
        let h = harness();
        let status = h.controller.reload().await;
        assert_eq!(status, SessionStatus::NoSession);
        assert_eq!(status.remaining_seconds(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reload_retires_session_that_expired_while_closed() {
        let h = harness();
        h.store
            .save(&Session::new(T0 - 2 * 60 * 60_000, 60))
            .await
            .unwrap();

        let status = h.controller.reload().await;
        assert_eq!(status, SessionStatus::NoSession);
        assert_eq!(h.store.load().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn reload_resumes_persisted_session() {
        let h = harness();
        h.store.save(&Session::new(T0 - 10 * 60_000, 15)).await.unwrap();

        let status = h.controller.reload().await;
        assert!(status.is_active());
        assert_eq!(status.remaining_seconds(), 5 * 60);

        h.clock.advance(Duration::from_secs(5 * 60));
        wait_until_inactive(&h.controller).await;
        assert_eq!(h.store.load().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn end_right_after_start_leaves_nothing_behind() {
        let h = harness();
        h.controller.start(15).await.unwrap();
        let status = h.controller.end().await;

        assert_eq!(status, SessionStatus::NoSession);
        assert_eq!(h.controller.status().remaining_seconds(), 0);
        assert_eq!(h.store.load().await.unwrap(), None);

        let mut rx = h.controller.subscribe();
        rx.borrow_and_update();
        let reads = h.clock.reads();
        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert!(!rx.has_changed().unwrap());
        assert_eq!(h.clock.reads(), reads);
    }

    #[tokio::test(start_paused = true)]
    async fn end_is_idempotent() {
        let h = harness();
        h.controller.start(15).await.unwrap();
        let once = h.controller.end().await;
        let twice = h.controller.end().await;
        assert_eq!(once, twice);
        assert_eq!(h.controller.status(), SessionStatus::NoSession);

        let fresh = harness();
        assert_eq!(fresh.controller.end().await, SessionStatus::NoSession);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_reloads_keep_a_single_timer() {
        let h = harness();
        h.controller.start(60).await.unwrap();
        for _ in 0..3 {
            h.controller.reload().await;
        }
        h.controller.on_app_state(AppState::Foreground).await;
        settle().await;

        let reads = h.clock.reads();
        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(h.clock.reads() - reads, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn start_replaces_running_session() {
        let h = harness();
        h.controller.start(60).await.unwrap();
        h.clock.advance(Duration::from_secs(30));
        let status = h.controller.start(15).await.unwrap();

        assert_eq!(status.remaining_seconds(), 15 * 60);
        let stored = h.store.load().await.unwrap().unwrap();
        assert_eq!(stored.duration_minutes, 15);
        assert_eq!(stored.started_at, T0 + 30_000);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_save_keeps_session_until_next_reload() {
        let h = harness();
        h.backend.set_fail_writes(true);

        let status = h.controller.start(30).await.unwrap();
        assert!(status.is_active());
        assert_eq!(status.remaining_seconds(), 1_800);

        h.clock.advance(Duration::from_secs(1));
        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(h.controller.status().remaining_seconds(), 1_799);

        let status = h.controller.on_app_state(AppState::Foreground).await;
        assert_eq!(status, SessionStatus::NoSession);
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_storage_fails_safe_on_reload() {
        let h = harness();
        h.controller.start(30).await.unwrap();
        h.backend.set_fail_reads(true);

        let status = h.controller.reload().await;
        assert_eq!(status, SessionStatus::NoSession);
    }

    #[tokio::test(start_paused = true)]
    async fn end_swallows_storage_errors() {
        let h = harness();
        h.controller.start(30).await.unwrap();
        h.backend.set_fail_writes(true);

        assert_eq!(h.controller.end().await, SessionStatus::NoSession);
        assert!(!h.controller.status().is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn background_does_not_touch_state() {
        let h = harness();
        h.controller.start(30).await.unwrap();
        let before = h.controller.status();
        assert_eq!(h.controller.on_app_state(AppState::Background).await, before);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_controller_stops_timer() {
        let clock = ManualClock::new(T0);
        let store = SessionStore::new(Arc::new(MemorySecureStore::new()));
        let controller = SessionController::new(store.clone(), Arc::new(clock.clone()));
        controller.start(30).await.unwrap();
        drop(controller);

        let reads = clock.reads();
        tokio::time::advance(Duration::from_secs(3)).await;
        settle().await;
        assert_eq!(clock.reads(), reads);
        assert!(store.load().await.unwrap().is_some());
    }

    /// Store whose writes wait until released.
    #[derive(Default)]
    struct GatedStore {
        inner: MemorySecureStore,
        writing: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait::async_trait]
    impl SecureStore for GatedStore {
        async fn set(&self, key: &str, value: &str) -> Result<(), crate::store::StoreError> {
            self.writing.notify_one();
            self.release.notified().await;
            self.inner.set(key, value).await
        }

        async fn get(&self, key: &str) -> Result<Option<String>, crate::store::StoreError> {
            self.inner.get(key).await
        }

        async fn delete(&self, key: &str) -> Result<(), crate::store::StoreError> {
            self.inner.delete(key).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn end_waits_for_in_flight_start() {
        let clock = ManualClock::new(T0);
        let backend = Arc::new(GatedStore::default());
        let store = SessionStore::new(backend.clone());
        let controller = SessionController::new(store.clone(), Arc::new(clock.clone()));

        let starting = tokio::spawn({
            let controller = controller.clone();
            async move { controller.start(15).await }
        });
        backend.writing.notified().await;

        let ending = tokio::spawn({
            let controller = controller.clone();
            async move { controller.end().await }
        });
        settle().await;
        assert!(!ending.is_finished());

        backend.release.notify_one();
        starting.await.unwrap().unwrap();
        assert_eq!(ending.await.unwrap(), SessionStatus::NoSession);

        assert_eq!(controller.status(), SessionStatus::NoSession);
        assert_eq!(store.load().await.unwrap(), None);

        let reads = clock.reads();
        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(clock.reads(), reads);
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_see_active_before_persistence() {
        let h = harness();
        let mut rx = h.controller.subscribe();
        let controller = h.controller.clone();
        let task = tokio::spawn(async move { controller.start(15).await });

        rx.wait_for(SessionStatus::is_active).await.unwrap();
        task.await.unwrap().unwrap();
        assert!(h.backend.get(crate::store::SESSION_KEY).await.unwrap().is_some());
    }
}
