//! Authentication signal consumed by the engine and lifecycle controller
//!
//! Authentication itself is somebody else's problem. The engine only needs
//! to know, at any instant, whether a request could carry a credential, and
//! to be told when that answer changes. Both come from a `watch` channel of
//! [`AuthState`].
//!
//! A `watch` receiver only sees the latest value, so a `logout(); login(t)`
//! pair published between two polls looks like no change at all. Every
//! state therefore carries a session epoch: [`AuthSignal::login`] and
//! [`AuthSignal::logout`] always bump it, and [`AuthSignal::set`] bumps it
//! whenever the credential differs. Consumers compare epochs, not tokens.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

/// Snapshot of the host application's authentication status
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    pub is_authenticated: bool,
    pub token: Option<String>,
    /// Session epoch assigned by [`AuthSignal`]; 0 for hand-built states
    pub session: u64,
}

impl AuthState {
    /// Signed-out state
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Signed-in state carrying the given bearer token
    pub fn authenticated(token: impl Into<String>) -> Self {
        Self {
            is_authenticated: true,
            token: Some(token.into()),
            session: 0,
        }
    }

    /// True only with an authenticated flag and a non-blank token
    pub fn can_make_authenticated_request(&self) -> bool {
        self.is_authenticated
            && self
                .token
                .as_deref()
                .is_some_and(|token| !token.trim().is_empty())
    }

    /// Token to attach to a request, if one is provable
    pub fn bearer(&self) -> Option<&str> {
        if self.can_make_authenticated_request() {
            self.token.as_deref()
        } else {
            None
        }
    }
}

// Keeps tokens out of logs.
impl fmt::Debug for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthState")
            .field("is_authenticated", &self.is_authenticated)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("session", &self.session)
            .finish()
    }
}

/// Publisher side of the auth state, owned by whatever manages sessions
///
/// # Example
///
/// ```ignore
/// let auth = AuthSignal::new();
/// let engine = SyncEngine::new(transport, auth.subscribe());
///
/// auth.login("token-123");
/// // ... lifecycle controller fetches
/// auth.logout();
/// ```
#[derive(Clone)]
pub struct AuthSignal {
    tx: Arc<watch::Sender<AuthState>>,
}

impl AuthSignal {
    /// Start signed out
    pub fn new() -> Self {
        Self::with_state(AuthState::anonymous())
    }

    pub fn with_state(state: AuthState) -> Self {
        let (tx, _rx) = watch::channel(state);
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> AuthState {
        self.tx.borrow().clone()
    }

    /// Publish `state`, starting a new session only if the credential changed
    ///
    /// Republishing an identical credential keeps the current epoch.
    pub fn set(&self, state: AuthState) {
        self.tx.send_modify(|current| {
            let same = current.is_authenticated == state.is_authenticated
                && current.token == state.token;
            let session = if same {
                current.session
            } else {
                current.session.wrapping_add(1)
            };
            *current = AuthState { session, ..state };
        });
    }

    /// Start a new session, even when `token` equals the current one
    pub fn login(&self, token: impl Into<String>) {
        self.begin(AuthState::authenticated(token));
    }

    pub fn logout(&self) {
        self.begin(AuthState::anonymous());
    }

    fn begin(&self, state: AuthState) {
        self.tx.send_modify(|current| {
            let session = current.session.wrapping_add(1);
            *current = AuthState { session, ..state };
        });
    }
}

impl Default for AuthSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Hook fired when the server-side unread count may have changed
///
/// Lets whatever renders the unread badge refresh without the engine
/// knowing how that count is computed.
pub trait UnreadCountHook: Send + Sync {
    fn notify_unread_count_changed(&self);
}

impl<F> UnreadCountHook for F
where
    F: Fn() + Send + Sync,
{
    fn notify_unread_count_changed(&self) {
        self()
    }
}
