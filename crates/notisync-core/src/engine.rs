//! SyncEngine - the only writer of the notification cache
//!
//! Every operation follows the same shape:
//!
//! 1. Prove a session exists (else `NotAuthenticated`, no transport call)
//! 2. Apply the optimistic change to the cache synchronously
//! 3. Await the transport call (the only suspension point)
//! 4. Reconcile: success keeps the optimistic state, failure is classified
//!    and either suppressed (auth) or surfaced and re-fetched (other)
//!
//! ## Stale results
//!
//! Each fetch takes a ticket from a generation counter. Teardown and newer
//! fetches bump the counter, so a fetch that resolves late can prove it was
//! superseded and drop its result instead of repopulating the cache.
//!
//! # Example
//!
//! ```ignore
//! let auth = AuthSignal::new();
//! let engine = SyncEngine::new(Arc::new(LocalTransport::new()), auth.subscribe());
//!
//! auth.login("token");
//! engine.fetch().await?;
//! engine.mark_read(&"n1".into()).await?;
//! println!("{} unread", engine.view().unread_count());
//! ```

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::auth::{AuthState, UnreadCountHook};
use crate::cache::{CacheState, CacheView, NotificationCache};
use crate::classify::{ErrorClass, ErrorClassifier};
use crate::config::{EngineConfig, ReconcilePolicy};
use crate::error::{Operation, SyncError, SyncResult, TransportError};
use crate::events::SyncEvent;
use crate::transport::NotificationTransport;
use crate::types::{
    BulkAction, CreateNotification, CreateReceipt, ListQuery, Notification, NotificationId,
    RawNotification,
};

/// Fallback message when the server refuses a create without saying why
const CREATE_FALLBACK_ERROR: &str = "Failed to send notification";

/// What happened to a fetch's result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The result replaced the cache
    Applied { count: usize, unread: usize },
    /// A newer fetch or a teardown superseded this one; result dropped
    Discarded,
}

/// Mutable state guarded by a single lock, never held across an await
struct EngineState {
    cache: NotificationCache,
    classifier: ErrorClassifier,
    /// Bumped by every fetch start and every teardown
    generation: u64,
}

struct EngineInner {
    transport: Arc<dyn NotificationTransport>,
    auth: watch::Receiver<AuthState>,
    config: EngineConfig,
    state: Mutex<EngineState>,
    view_tx: watch::Sender<CacheView>,
    event_tx: broadcast::Sender<SyncEvent>,
    unread_hook: RwLock<Option<Arc<dyn UnreadCountHook>>>,
}

/// Handle to the notification sync engine
///
/// Cheap to clone; all clones share one cache.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    /// Create an engine with the default configuration
    pub fn new(
        transport: Arc<dyn NotificationTransport>,
        auth: watch::Receiver<AuthState>,
    ) -> Self {
        Self::with_config(transport, auth, EngineConfig::default())
    }

    pub fn with_config(
        transport: Arc<dyn NotificationTransport>,
        auth: watch::Receiver<AuthState>,
        config: EngineConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        let (view_tx, _) = watch::channel(CacheView::default());
        Self {
            inner: Arc::new(EngineInner {
                transport,
                auth,
                config,
                state: Mutex::new(EngineState {
                    cache: NotificationCache::new(),
                    classifier: ErrorClassifier::new(),
                    generation: 0,
                }),
                view_tx,
                event_tx,
                unread_hook: RwLock::new(None),
            }),
        }
    }

    /// Register the hook fired whenever the unread count may have changed
    pub fn set_unread_hook(&self, hook: Arc<dyn UnreadCountHook>) {
        *self.inner.unread_hook.write() = Some(hook);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Read surface
    // ═══════════════════════════════════════════════════════════════════════

    /// Snapshot of the cached items and loading flag
    pub fn view(&self) -> CacheView {
        self.inner.state.lock().cache.view()
    }

    /// Receiver that observes a new view after every cache mutation
    pub fn subscribe_view(&self) -> watch::Receiver<CacheView> {
        self.inner.view_tx.subscribe()
    }

    /// Subscribe to engine events (toasts, fetch results, teardowns)
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.event_tx.subscribe()
    }

    pub fn cache_state(&self) -> CacheState {
        self.inner.state.lock().cache.state()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.lock().cache.loading()
    }

    pub fn unread_count(&self) -> usize {
        self.inner.state.lock().cache.unread_count()
    }

    pub fn get(&self, id: &NotificationId) -> Option<Notification> {
        self.inner.state.lock().cache.get(id).cloned()
    }

    /// Whether an auth failure has been logged and not yet cleared by a success
    pub fn is_auth_failure_latched(&self) -> bool {
        self.inner.state.lock().classifier.is_latched()
    }

    /// Number of auth-failure diagnostics logged so far
    pub fn auth_diagnostics(&self) -> u64 {
        self.inner.state.lock().classifier.auth_diagnostics()
    }

    /// Whether the current auth state allows a transport call
    pub fn can_make_authenticated_request(&self) -> bool {
        self.inner.auth.borrow().can_make_authenticated_request()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Replace the cache with the server's current list
    pub async fn fetch(&self) -> SyncResult<FetchOutcome> {
        let token = self.bearer()?;

        let ticket = self.mutate(|s| {
            s.generation += 1;
            s.cache.set_loading(true);
            s.generation
        });
        debug!(ticket, "Fetching notifications");

        match self.inner.transport.list(&token, &ListQuery::default()).await {
            Ok(response) => {
                let items: Vec<Notification> = response
                    .notifications
                    .into_iter()
                    .map(RawNotification::normalize)
                    .collect();

                let applied = self.mutate(|s| {
                    if s.generation != ticket {
                        return None;
                    }
                    s.cache.replace_all(items);
                    s.cache.set_loading(false);
                    s.classifier.reset();
                    Some((s.cache.items().len(), s.cache.unread_count()))
                });

                match applied {
                    Some((count, unread)) => {
                        info!(count, unread, "Notifications fetched");
                        self.emit(SyncEvent::Fetched { count, unread });
                        self.notify_unread();
                        Ok(FetchOutcome::Applied { count, unread })
                    }
                    None => Ok(self.discard(ticket)),
                }
            }
            Err(err) => {
                let current = self.mutate(|s| {
                    let current = s.generation == ticket;
                    if current {
                        s.cache.set_loading(false);
                    }
                    current
                });
                if current {
                    Err(self.fail(Operation::Fetch, err))
                } else {
                    Ok(self.discard(ticket))
                }
            }
        }
    }

    /// One-off filtered listing (archived, deleted, by type or priority)
    ///
    /// The cache is left alone: it only ever mirrors the default listing.
    pub async fn list(&self, query: &ListQuery) -> SyncResult<Vec<Notification>> {
        let token = self.bearer()?;

        match self.inner.transport.list(&token, query).await {
            Ok(response) => {
                self.succeeded();
                let items: Vec<_> = response
                    .notifications
                    .into_iter()
                    .map(RawNotification::normalize)
                    .collect();
                debug!(count = items.len(), ?query, "Filtered listing");
                Ok(items)
            }
            Err(err) => Err(self.fail(Operation::Fetch, err)),
        }
    }

    /// Create a notification server-side, then refresh from the server
    ///
    /// The created record is never inserted locally: the server may fan it
    /// out to many recipients and only its listing is authoritative.
    pub async fn create(&self, payload: &CreateNotification) -> SyncResult<CreateReceipt> {
        let token = self.bearer()?;

        let response = match self.inner.transport.create(&token, payload).await {
            Ok(response) => response,
            Err(err) => return Err(self.fail(Operation::Create, err)),
        };
        self.succeeded();

        if !response.success {
            let message = response
                .error
                .unwrap_or_else(|| CREATE_FALLBACK_ERROR.to_string());
            warn!(error = %message, "Notification creation rejected");
            self.emit(SyncEvent::failure(message.clone()));
            return Err(SyncError::Rejected(message));
        }

        let count = response.count.unwrap_or(0);
        info!(count, "Notification sent");
        self.emit(SyncEvent::success("Notification sent successfully"));

        if let Err(e) = self.fetch().await {
            debug!(error = %e, "Refresh after create failed");
        }
        Ok(CreateReceipt { count })
    }

    /// Mark one notification read; visible immediately, before the server answers
    pub async fn mark_read(&self, id: &NotificationId) -> SyncResult<()> {
        let token = self.bearer()?;

        let found = self.mutate(|s| s.cache.patch_by_id(id, |n| n.read = true));
        debug!(%id, found, "Optimistically marked read");

        match self.inner.transport.mark_read(&token, id).await {
            Ok(()) => {
                self.succeeded();
                self.notify_unread();
                Ok(())
            }
            Err(err) => Err(self.reconcile(Operation::MarkRead, err).await),
        }
    }

    /// Mark every cached notification read
    pub async fn mark_all_read(&self) -> SyncResult<()> {
        let token = self.bearer()?;

        self.mutate(|s| s.cache.patch_all(|n| n.read = true));

        match self.inner.transport.mark_all_read(&token).await {
            Ok(()) => {
                self.succeeded();
                self.emit(SyncEvent::success("All notifications marked as read"));
                self.notify_unread();
                Ok(())
            }
            Err(err) => Err(self.reconcile(Operation::MarkAllRead, err).await),
        }
    }

    /// Delete a notification; removed from the cache immediately
    pub async fn delete(&self, id: &NotificationId) -> SyncResult<()> {
        let token = self.bearer()?;

        let removed = self.mutate(|s| s.cache.remove_by_id(id));
        debug!(%id, found = removed.is_some(), "Optimistically removed");

        match self.inner.transport.delete(&token, id).await {
            Ok(()) => {
                self.succeeded();
                self.emit(SyncEvent::success("Notification deleted"));
                self.notify_unread();
                Ok(())
            }
            Err(err) => Err(self.reconcile(Operation::Delete, err).await),
        }
    }

    /// Archive a notification; hidden locally, soft-archived server-side
    pub async fn archive(&self, id: &NotificationId) -> SyncResult<()> {
        let token = self.bearer()?;

        let removed = self.mutate(|s| s.cache.remove_by_id(id));
        debug!(%id, found = removed.is_some(), "Optimistically archived");

        match self.inner.transport.archive(&token, id).await {
            Ok(()) => {
                self.succeeded();
                self.emit(SyncEvent::success("Notification archived"));
                self.notify_unread();
                Ok(())
            }
            Err(err) => Err(self.reconcile(Operation::Archive, err).await),
        }
    }

    /// Apply one action to several notifications in a single call
    ///
    /// `unarchive` and `restore` target items the cache does not hold, so
    /// they skip the optimistic step and refresh once the server agrees.
    pub async fn bulk_action(&self, action: BulkAction, ids: &[NotificationId]) -> SyncResult<()> {
        let token = self.bearer()?;

        if !action.restores() {
            self.mutate(|s| {
                for id in ids {
                    if action.removes() {
                        s.cache.remove_by_id(id);
                    } else {
                        s.cache.patch_by_id(id, |n| n.read = true);
                    }
                }
            });
        }

        match self.inner.transport.bulk_action(&token, action, ids).await {
            Ok(()) => {
                self.succeeded();
                self.emit(SyncEvent::success(format!(
                    "Bulk {} action completed",
                    action.as_str()
                )));
                if action.restores() {
                    if let Err(e) = self.fetch().await {
                        debug!(error = %e, "Refresh after restore failed");
                    }
                }
                self.notify_unread();
                Ok(())
            }
            Err(err) => Err(self.reconcile(Operation::BulkAction, err).await),
        }
    }

    /// Insert a notification delivered outside the fetch cycle
    ///
    /// Ignored without a provable session, so a late delivery cannot
    /// repopulate a torn-down cache. Returns whether it was inserted.
    pub fn push(&self, notification: Notification) -> bool {
        if !self.can_make_authenticated_request() {
            debug!(id = %notification.id, "Dropping pushed notification without session");
            return false;
        }
        self.mutate(|s| s.cache.append_one(notification));
        self.notify_unread();
        true
    }

    /// End of session: invalidate in-flight fetches, clear the cache, reset the latch
    ///
    /// Idempotent.
    pub fn teardown(&self) {
        let generation = self.mutate(|s| {
            s.generation += 1;
            s.cache.clear();
            s.classifier.reset();
            s.generation
        });
        info!(generation, "Notification state torn down");
        self.emit(SyncEvent::TornDown);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Internals
    // ═══════════════════════════════════════════════════════════════════════

    fn bearer(&self) -> SyncResult<String> {
        self.inner
            .auth
            .borrow()
            .bearer()
            .map(str::to_owned)
            .ok_or(SyncError::NotAuthenticated)
    }

    /// Run `f` under the state lock and publish the resulting view
    fn mutate<R>(&self, f: impl FnOnce(&mut EngineState) -> R) -> R {
        let mut state = self.inner.state.lock();
        let out = f(&mut state);
        self.inner.view_tx.send_replace(state.cache.view());
        out
    }

    fn emit(&self, event: SyncEvent) {
        let _ = self.inner.event_tx.send(event);
    }

    fn succeeded(&self) {
        self.inner.state.lock().classifier.reset();
    }

    fn notify_unread(&self) {
        let hook = self.inner.unread_hook.read().clone();
        if let Some(hook) = hook {
            hook.notify_unread_count_changed();
        }
    }

    fn discard(&self, ticket: u64) -> FetchOutcome {
        debug!(ticket, "Discarding superseded fetch result");
        self.emit(SyncEvent::FetchDiscarded { ticket });
        FetchOutcome::Discarded
    }

    /// Classify a failure; surface it unless it is an auth failure
    fn fail(&self, operation: Operation, error: TransportError) -> SyncError {
        let class = self
            .inner
            .state
            .lock()
            .classifier
            .classify(&error, operation);
        match class {
            ErrorClass::AuthRequired => SyncError::AuthRequired { operation },
            ErrorClass::Other => {
                self.emit(SyncEvent::failure(operation.failure_message()));
                SyncError::Transport {
                    operation,
                    source: error,
                }
            }
        }
    }

    /// Handle a mutation failure and, per policy, re-fetch to undo optimistic drift
    async fn reconcile(&self, operation: Operation, error: TransportError) -> SyncError {
        let error = self.fail(operation, error);
        let refetch = matches!(error, SyncError::Transport { .. })
            && self.inner.config.reconcile == ReconcilePolicy::Refetch;
        if refetch {
            debug!(%operation, "Re-fetching after failed mutation");
            if let Err(e) = self.fetch().await {
                debug!(error = %e, "Reconciling fetch failed");
            }
        }
        error
    }
}
