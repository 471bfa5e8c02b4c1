//! Engine behaviour under overlapping operations and auth transitions
//!
//! These tests hold transport calls open with a gate so the state between
//! the optimistic step and the server's answer can be observed.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use futures::future::join_all;
use notisync_core::{
    AuthSignal, BulkAction, CacheState, CreateNotification, CreateResponse, EngineConfig,
    FetchOutcome, ListQuery, ListResponse, LocalTransport, NotificationId, NotificationTransport,
    ReconcilePolicy, Role, SyncEngine, SyncError, SyncEvent, ToastKind, TransportError,
    TransportResult,
};
use tokio::sync::{broadcast, Notify};

// ============================================================================
// Test Utilities
// ============================================================================

/// LocalTransport wrapper whose calls can be held until released
#[derive(Default)]
struct GatedTransport {
    backend: LocalTransport,
    hold: AtomicBool,
    release: Notify,
    entered: AtomicUsize,
    /// Answer the next create with `success: false` and this message
    refuse_create: Mutex<Option<Option<String>>>,
}

impl GatedTransport {
    fn new() -> Arc<Self> {
        let transport = Self::default();
        transport.backend.add_user("alice", Role::Student, "tok-alice");
        transport.backend.add_user("root", Role::Admin, "tok-root");
        Arc::new(transport)
    }

    fn hold(&self) {
        self.hold.store(true, Ordering::SeqCst);
    }

    /// Let one held call through
    fn release_one(&self) {
        self.release.notify_one();
    }

    fn refuse_next_create(&self, message: Option<&str>) {
        *self.refuse_create.lock() = Some(message.map(str::to_owned));
    }

    fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    async fn gate(&self) {
        self.entered.fetch_add(1, Ordering::SeqCst);
        if self.hold.load(Ordering::SeqCst) {
            self.release.notified().await;
        }
    }
}

#[async_trait]
impl NotificationTransport for GatedTransport {
    async fn list(&self, token: &str, query: &ListQuery) -> TransportResult<ListResponse> {
        self.gate().await;
        self.backend.list(token, query).await
    }

    async fn create(
        &self,
        token: &str,
        payload: &CreateNotification,
    ) -> TransportResult<CreateResponse> {
        self.gate().await;
        if let Some(error) = self.refuse_create.lock().take() {
            return Ok(CreateResponse {
                success: false,
                count: None,
                error,
            });
        }
        self.backend.create(token, payload).await
    }

    async fn mark_read(&self, token: &str, id: &NotificationId) -> TransportResult<()> {
        self.gate().await;
        self.backend.mark_read(token, id).await
    }

    async fn mark_all_read(&self, token: &str) -> TransportResult<()> {
        self.gate().await;
        self.backend.mark_all_read(token).await
    }

    async fn delete(&self, token: &str, id: &NotificationId) -> TransportResult<()> {
        self.gate().await;
        self.backend.delete(token, id).await
    }

    async fn archive(&self, token: &str, id: &NotificationId) -> TransportResult<()> {
        self.gate().await;
        self.backend.archive(token, id).await
    }

    async fn bulk_action(
        &self,
        token: &str,
        action: BulkAction,
        ids: &[NotificationId],
    ) -> TransportResult<()> {
        self.gate().await;
        self.backend.bulk_action(token, action, ids).await
    }
}

fn setup() -> (AuthSignal, Arc<GatedTransport>, SyncEngine) {
    setup_with(EngineConfig::default())
}

fn setup_with(config: EngineConfig) -> (AuthSignal, Arc<GatedTransport>, SyncEngine) {
    let transport = GatedTransport::new();
    let auth = AuthSignal::new();
    let engine = SyncEngine::with_config(transport.clone(), auth.subscribe(), config);
    (auth, transport, engine)
}

/// Yield to spawned tasks until `done` holds
async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if done() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

fn drain_toasts(events: &mut broadcast::Receiver<SyncEvent>) -> Vec<(ToastKind, String)> {
    let mut toasts = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let SyncEvent::Toast { kind, message } = event {
            toasts.push((kind, message));
        }
    }
    toasts
}

// ============================================================================
// Auth Precondition
// ============================================================================

#[tokio::test]
async fn test_no_operation_reaches_transport_without_auth() {
    let (_auth, transport, engine) = setup();
    let id = NotificationId::from("n1");

    assert!(matches!(engine.fetch().await, Err(SyncError::NotAuthenticated)));
    assert!(matches!(engine.mark_read(&id).await, Err(SyncError::NotAuthenticated)));
    assert!(matches!(engine.mark_all_read().await, Err(SyncError::NotAuthenticated)));
    assert!(matches!(engine.delete(&id).await, Err(SyncError::NotAuthenticated)));
    assert!(matches!(engine.archive(&id).await, Err(SyncError::NotAuthenticated)));
    assert!(matches!(
        engine
            .create(&CreateNotification::new("t", "m"))
            .await,
        Err(SyncError::NotAuthenticated)
    ));

    assert_eq!(transport.entered(), 0);
    assert!(!engine.is_loading());
    assert_eq!(engine.cache_state(), CacheState::Empty);
}

// ============================================================================
// Optimistic Mutations
// ============================================================================

#[tokio::test]
async fn test_mark_read_visible_before_transport_resolves() {
    let (auth, transport, engine) = setup();
    let id = transport.backend.seed(CreateNotification::new("Hello", "world"));
    auth.login("tok-alice");
    engine.fetch().await.unwrap();
    assert!(!engine.get(&id).unwrap().read);

    transport.hold();
    let task = tokio::spawn({
        let engine = engine.clone();
        let id = id.clone();
        async move { engine.mark_read(&id).await }
    });
    wait_until(|| transport.entered() == 2).await;

    // Server has not seen the call yet; the cache already shows it read
    assert!(engine.get(&id).unwrap().read);
    assert!(!transport.backend.is_read_by(&id, "alice"));

    transport.release_one();
    task.await.unwrap().unwrap();
    assert!(transport.backend.is_read_by(&id, "alice"));
}

#[tokio::test]
async fn test_delete_and_archive_preserve_order_of_others() {
    let (auth, transport, engine) = setup();
    let a = transport.backend.seed(CreateNotification::new("A", "a"));
    let b = transport.backend.seed(CreateNotification::new("B", "b"));
    let c = transport.backend.seed(CreateNotification::new("C", "c"));
    let d = transport.backend.seed(CreateNotification::new("D", "d"));
    auth.login("tok-alice");
    engine.fetch().await.unwrap();

    engine.delete(&b).await.unwrap();
    engine.archive(&c).await.unwrap();

    let ids: Vec<_> = engine.view().items.into_iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![d, a]);
}

#[tokio::test]
async fn test_mark_all_read_and_bulk_action() {
    let (auth, transport, engine) = setup();
    let a = transport.backend.seed(CreateNotification::new("A", "a"));
    let b = transport.backend.seed(CreateNotification::new("B", "b"));
    auth.login("tok-alice");
    engine.fetch().await.unwrap();
    let mut events = engine.subscribe();

    engine.mark_all_read().await.unwrap();
    assert_eq!(engine.unread_count(), 0);
    assert!(transport.backend.is_read_by(&a, "alice"));

    engine
        .bulk_action(BulkAction::Archive, &[a.clone(), b.clone()])
        .await
        .unwrap();
    assert!(engine.view().items.is_empty());

    let toasts = drain_toasts(&mut events);
    assert_eq!(
        toasts,
        vec![
            (ToastKind::Success, "All notifications marked as read".to_string()),
            (ToastKind::Success, "Bulk archive action completed".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_concurrent_mutations_all_apply() {
    let (auth, transport, engine) = setup();
    let ids: Vec<_> = (0..5)
        .map(|i| {
            transport
                .backend
                .seed(CreateNotification::new(format!("N{i}"), "body"))
        })
        .collect();
    auth.login("tok-alice");
    engine.fetch().await.unwrap();

    let results = join_all(ids.iter().map(|id| engine.mark_read(id))).await;
    assert!(results.iter().all(Result::is_ok));
    assert_eq!(engine.unread_count(), 0);
    assert!(ids.iter().all(|id| transport.backend.is_read_by(id, "alice")));
}

// ============================================================================
// Failure Handling and Reconciliation
// ============================================================================

#[tokio::test]
async fn test_failed_mark_read_refetches_server_truth() {
    let (auth, transport, engine) = setup();
    let id = transport.backend.seed(CreateNotification::new("Hello", "world"));
    auth.login("tok-alice");
    engine.fetch().await.unwrap();
    let mut events = engine.subscribe();

    transport.backend.fail_next(TransportError::http(500, "boom"));
    let err = engine.mark_read(&id).await.unwrap_err();
    assert!(matches!(err, SyncError::Transport { .. }));

    // Re-fetch brought back the unread state the server still holds
    assert!(!engine.get(&id).unwrap().read);
    assert_eq!(
        drain_toasts(&mut events),
        vec![(ToastKind::Error, "Failed to mark notification as read".to_string())]
    );
}

#[tokio::test]
async fn test_failed_delete_restores_item_on_refetch() {
    let (auth, transport, engine) = setup();
    let id = transport.backend.seed(CreateNotification::new("Hello", "world"));
    auth.login("tok-alice");
    engine.fetch().await.unwrap();

    transport.backend.fail_next(TransportError::network("connection reset"));
    assert!(engine.delete(&id).await.is_err());
    assert!(engine.get(&id).is_some());
}

#[tokio::test]
async fn test_keep_optimistic_policy_leaves_divergence() {
    let config = EngineConfig {
        reconcile: ReconcilePolicy::KeepOptimistic,
        ..EngineConfig::default()
    };
    let (auth, transport, engine) = setup_with(config);
    let id = transport.backend.seed(CreateNotification::new("Hello", "world"));
    auth.login("tok-alice");
    engine.fetch().await.unwrap();
    let calls_before = transport.entered();

    transport.backend.fail_next(TransportError::http(502, "bad gateway"));
    assert!(engine.mark_read(&id).await.is_err());
    assert!(engine.get(&id).unwrap().read);
    assert_eq!(transport.entered(), calls_before + 1);
}

#[tokio::test]
async fn test_auth_failure_is_silent_and_not_refetched() {
    let (auth, transport, engine) = setup();
    let id = transport.backend.seed(CreateNotification::new("Hello", "world"));
    auth.login("tok-alice");
    engine.fetch().await.unwrap();
    let mut events = engine.subscribe();
    let calls_before = transport.entered();

    transport.backend.fail_next(TransportError::unauthorized());
    let err = engine.mark_read(&id).await.unwrap_err();
    assert!(matches!(err, SyncError::AuthRequired { .. }));

    assert!(drain_toasts(&mut events).is_empty());
    assert_eq!(transport.entered(), calls_before + 1);
    assert!(engine.is_auth_failure_latched());
}

#[tokio::test]
async fn test_single_log_per_latch_cycle() {
    let (auth, _transport, engine) = setup();
    auth.login("expired-token");

    for _ in 0..5 {
        let err = engine.fetch().await.unwrap_err();
        assert!(matches!(err, SyncError::AuthRequired { .. }));
    }
    assert_eq!(engine.auth_diagnostics(), 1);
    assert!(engine.is_auth_failure_latched());

    // One success clears the latch
    auth.login("tok-alice");
    engine.fetch().await.unwrap();
    assert!(!engine.is_auth_failure_latched());

    auth.login("expired-token");
    for _ in 0..3 {
        assert!(engine.fetch().await.is_err());
    }
    assert_eq!(engine.auth_diagnostics(), 2);
}

#[tokio::test]
async fn test_other_failures_surface_even_while_latched() {
    let (auth, transport, engine) = setup();
    auth.login("expired-token");
    engine.fetch().await.unwrap_err();
    assert!(engine.is_auth_failure_latched());
    let mut events = engine.subscribe();

    transport.backend.fail_next(TransportError::http(500, "boom"));
    let err = engine.fetch().await.unwrap_err();
    assert!(matches!(err, SyncError::Transport { .. }));
    assert_eq!(
        drain_toasts(&mut events),
        vec![(ToastKind::Error, "Failed to load notifications".to_string())]
    );
    assert!(!engine.is_loading());
}

#[tokio::test]
async fn test_create_transport_failure_toasts_generic_message() {
    let (auth, transport, engine) = setup();
    auth.login("tok-alice");
    let mut events = engine.subscribe();

    // Students are refused by the backend
    let err = engine
        .create(&CreateNotification::new("Hi", "all"))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Transport { .. }));
    assert_eq!(
        drain_toasts(&mut events),
        vec![(ToastKind::Error, "Failed to send notification".to_string())]
    );
    assert_eq!(transport.entered(), 1);
}

#[tokio::test]
async fn test_create_refused_in_body_surfaces_server_message() {
    let (auth, transport, engine) = setup();
    auth.login("tok-root");
    let mut events = engine.subscribe();

    transport.refuse_next_create(Some("Quota exceeded"));
    let err = engine
        .create(&CreateNotification::new("Hi", "all"))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Rejected(ref m) if m == "Quota exceeded"));
    assert_eq!(
        drain_toasts(&mut events),
        vec![(ToastKind::Error, "Quota exceeded".to_string())]
    );

    // Without a message the generic one is used
    transport.refuse_next_create(None);
    let err = engine
        .create(&CreateNotification::new("Hi", "all"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Failed to send notification");
    assert_eq!(transport.entered(), 2);
}

#[tokio::test]
async fn test_create_empty_title_is_a_transport_failure() {
    let (auth, transport, engine) = setup();
    auth.login("tok-root");
    let mut events = engine.subscribe();

    let err = engine
        .create(&CreateNotification::new("  ", "body"))
        .await
        .unwrap_err();
    match err {
        SyncError::Transport { source, .. } => {
            assert_eq!(source, TransportError::http(400, "Title is required"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(
        drain_toasts(&mut events),
        vec![(ToastKind::Error, "Failed to send notification".to_string())]
    );
    assert_eq!(transport.entered(), 1);
}

// ============================================================================
// Stale Fetches
// ============================================================================

#[tokio::test]
async fn test_teardown_discards_in_flight_fetch() {
    let (auth, transport, engine) = setup();
    transport.backend.seed(CreateNotification::new("Hello", "world"));
    auth.login("tok-alice");

    transport.hold();
    let task = tokio::spawn({
        let engine = engine.clone();
        async move { engine.fetch().await }
    });
    wait_until(|| transport.entered() == 1).await;
    assert!(engine.is_loading());
    assert_eq!(engine.cache_state(), CacheState::Loading);

    engine.teardown();
    assert!(!engine.is_loading());

    transport.release_one();
    let outcome = task.await.unwrap().unwrap();
    assert_eq!(outcome, FetchOutcome::Discarded);
    assert!(engine.view().items.is_empty());
    assert_eq!(engine.cache_state(), CacheState::Empty);
}

#[tokio::test]
async fn test_latest_started_fetch_wins() {
    let (auth, transport, engine) = setup();
    transport.backend.seed(CreateNotification::new("Hello", "world"));
    auth.login("tok-alice");

    transport.hold();
    let first = tokio::spawn({
        let engine = engine.clone();
        async move { engine.fetch().await }
    });
    wait_until(|| transport.entered() == 1).await;
    let second = tokio::spawn({
        let engine = engine.clone();
        async move { engine.fetch().await }
    });
    wait_until(|| transport.entered() == 2).await;

    transport.release_one();
    assert_eq!(first.await.unwrap().unwrap(), FetchOutcome::Discarded);
    // The newer fetch is still outstanding
    assert!(engine.is_loading());

    transport.release_one();
    assert_eq!(
        second.await.unwrap().unwrap(),
        FetchOutcome::Applied { count: 1, unread: 1 }
    );
    assert!(!engine.is_loading());
}

// ============================================================================
// Unread Hook
// ============================================================================

#[tokio::test]
async fn test_unread_hook_fires_on_count_changes() {
    let (auth, transport, engine) = setup();
    let id = transport.backend.seed(CreateNotification::new("Hello", "world"));
    let hits = Arc::new(AtomicUsize::new(0));
    engine.set_unread_hook(Arc::new({
        let hits = hits.clone();
        move || {
            hits.fetch_add(1, Ordering::SeqCst);
        }
    }));
    auth.login("tok-alice");

    engine.fetch().await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    engine.mark_read(&id).await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    transport.backend.fail_next(TransportError::unauthorized());
    assert!(engine.delete(&id).await.is_err());
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}
