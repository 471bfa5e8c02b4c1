//! Binds synchronization to the authentication lifecycle
//!
//! ## Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  LifecycleMachine (pure)                                        │
//! │  ├── mount(auth)         → Idle | ScheduleFetch | FetchNow      │
//! │  ├── auth_changed(auth)  → Idle | ScheduleFetch | FetchNow      │
//! │  │                         | Teardown | Restart                 │
//! │  └── unmount()           → Teardown                             │
//! │                                                                 │
//! │  LifecycleController (driver)                                   │
//! │  ├── watches AuthState changes                                  │
//! │  ├── owns the debounce timer for the first fetch                │
//! │  └── tears down on unmount (cancel, handle drop, closed signal) │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only the first entry into an authenticated state is debounced; every
//! later login fetches immediately. A new session observed while still
//! authenticated (switched user, rotated token, or a logout/login pair
//! merged by the watch channel) restarts: teardown first, then fetch, so
//! the previous session's items never outlive it.
//!
//! Fetches run as their own tasks so a logout can tear down while one is
//! still in flight; the engine's generation counter discards whatever that
//! fetch returns.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Sleep};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info};

use crate::auth::AuthState;
use crate::config::InitialFetch;
use crate::engine::SyncEngine;

/// What the driver should do in response to a lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    /// Nothing to do
    Idle,
    /// Fetch once `delay` has elapsed, unless torn down first
    ScheduleFetch(Duration),
    /// Fetch right away, cancelling any scheduled fetch
    FetchNow,
    /// Cancel pending work and clear all state
    Teardown,
    /// Teardown, then fetch right away under the new session
    Restart,
}

/// Pure lifecycle state machine; no timers, no I/O
#[derive(Debug)]
pub struct LifecycleMachine {
    initial_fetch: InitialFetch,
    mounted: bool,
    authenticated: bool,
    token: Option<String>,
    session: u64,
    /// Set once the first authenticated entry has been handled
    entered_once: bool,
}

impl LifecycleMachine {
    pub fn new(initial_fetch: InitialFetch) -> Self {
        Self {
            initial_fetch,
            mounted: false,
            authenticated: false,
            token: None,
            session: 0,
            entered_once: false,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// First observation of the auth state
    pub fn mount(&mut self, state: &AuthState) -> LifecycleAction {
        self.mounted = true;
        if state.can_make_authenticated_request() {
            self.enter(state)
        } else {
            LifecycleAction::Idle
        }
    }

    /// A new auth state was published
    pub fn auth_changed(&mut self, state: &AuthState) -> LifecycleAction {
        if !self.mounted {
            return self.mount(state);
        }

        let provable = state.can_make_authenticated_request();
        match (self.authenticated, provable) {
            (false, true) => self.enter(state),
            (true, false) => {
                self.authenticated = false;
                self.token = None;
                LifecycleAction::Teardown
            }
            (true, true)
                if state.session != self.session || state.bearer() != self.token.as_deref() =>
            {
                self.token = state.bearer().map(str::to_owned);
                self.session = state.session;
                LifecycleAction::Restart
            }
            _ => LifecycleAction::Idle,
        }
    }

    /// Always tears down, whatever the current state
    pub fn unmount(&mut self) -> LifecycleAction {
        self.mounted = false;
        self.authenticated = false;
        self.token = None;
        LifecycleAction::Teardown
    }

    fn enter(&mut self, state: &AuthState) -> LifecycleAction {
        self.authenticated = true;
        self.token = state.bearer().map(str::to_owned);
        self.session = state.session;

        if self.entered_once {
            return LifecycleAction::FetchNow;
        }
        self.entered_once = true;

        match self.initial_fetch {
            InitialFetch::Debounce { delay } if !delay.is_zero() => {
                LifecycleAction::ScheduleFetch(delay)
            }
            _ => LifecycleAction::FetchNow,
        }
    }
}

/// Handle to a running controller task
///
/// Dropping the handle cancels the controller, which then tears down on its
/// own task; [`LifecycleHandle::unmount`] additionally waits for that.
pub struct LifecycleHandle {
    shutdown: DropGuard,
    task: JoinHandle<()>,
}

impl LifecycleHandle {
    /// Stop the controller and wait for its teardown to complete
    pub async fn unmount(self) {
        let LifecycleHandle { shutdown, task } = self;
        drop(shutdown);
        if let Err(e) = task.await {
            debug!(error = %e, "Lifecycle task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Drives a [`SyncEngine`] from auth state transitions
///
/// # Example
///
/// ```ignore
/// let auth = AuthSignal::new();
/// let engine = SyncEngine::new(transport, auth.subscribe());
/// let lifecycle = LifecycleController::new(engine.clone(), auth.subscribe()).spawn();
///
/// auth.login("token");   // first fetch after the debounce
/// auth.logout();         // teardown
/// lifecycle.unmount().await;
/// ```
pub struct LifecycleController {
    engine: SyncEngine,
    auth: watch::Receiver<AuthState>,
    machine: LifecycleMachine,
}

impl LifecycleController {
    pub fn new(engine: SyncEngine, auth: watch::Receiver<AuthState>) -> Self {
        let machine = LifecycleMachine::new(engine.config().initial_fetch);
        Self {
            engine,
            auth,
            machine,
        }
    }

    /// Run on a background task until the handle is unmounted or dropped
    pub fn spawn(self) -> LifecycleHandle {
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(self.run(shutdown.clone()));
        LifecycleHandle {
            shutdown: shutdown.drop_guard(),
            task,
        }
    }

    /// Process auth transitions until `shutdown` fires or the auth signal closes
    pub async fn run(mut self, shutdown: CancellationToken) {
        let debounce = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(debounce);
        let mut armed = false;

        let initial = self.auth.borrow_and_update().clone();
        let action = self.machine.mount(&initial);
        debug!(?action, "Lifecycle mounted");
        self.apply(action, debounce.as_mut(), &mut armed);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                changed = self.auth.changed() => {
                    if changed.is_err() {
                        debug!("Auth signal closed");
                        break;
                    }
                    let state = self.auth.borrow_and_update().clone();
                    let action = self.machine.auth_changed(&state);
                    debug!(?action, "Auth state changed");
                    self.apply(action, debounce.as_mut(), &mut armed);
                }
                () = &mut debounce, if armed => {
                    armed = false;
                    self.spawn_fetch();
                }
            }
        }

        let action = self.machine.unmount();
        self.apply(action, debounce.as_mut(), &mut armed);
        info!("Lifecycle controller unmounted");
    }

    fn apply(
        &self,
        action: LifecycleAction,
        debounce: std::pin::Pin<&mut Sleep>,
        armed: &mut bool,
    ) {
        match action {
            LifecycleAction::Idle => {}
            LifecycleAction::ScheduleFetch(delay) => {
                debounce.reset(Instant::now() + delay);
                *armed = true;
            }
            LifecycleAction::FetchNow => {
                *armed = false;
                self.spawn_fetch();
            }
            LifecycleAction::Teardown => {
                *armed = false;
                self.engine.teardown();
            }
            LifecycleAction::Restart => {
                *armed = false;
                self.engine.teardown();
                self.spawn_fetch();
            }
        }
    }

    fn spawn_fetch(&self) {
        let engine = self.engine.clone();
        tokio::spawn(async move {
            match engine.fetch().await {
                Ok(outcome) => debug!(?outcome, "Lifecycle fetch finished"),
                // Already classified and logged by the engine
                Err(e) => debug!(error = %e, "Lifecycle fetch failed"),
            }
        });
    }
}
