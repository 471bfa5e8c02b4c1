//! In-process transport modelling the notification backend
//!
//! Holds a roster of users and a shared notification table with per-user
//! action records (read / archived / deleted), and answers the same way the
//! REST API does:
//!
//! - unknown bearer token → 401
//! - students creating notifications → 403
//! - empty title or message → 400
//! - unknown notification id → 404
//! - listings are newest first and carry the joined
//!   `notification_user_actions` record once a user has touched an item
//! - archived and deleted items stay out of listings unless the
//!   [`ListQuery`] asks for them, and `unarchive` / `restore` bring them back
//!
//! Failures can be injected with [`LocalTransport::fail_next`] and every
//! call can be slowed down with [`LocalTransport::set_latency`], which makes
//! it usable for demos and for exercising the engine's race handling.

use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use super::{NotificationTransport, TransportResult};
use crate::error::TransportError;
use crate::types::{
    BulkAction, CreateNotification, CreateResponse, ListQuery, ListResponse, NotificationId,
    NotificationType, Priority, RawNotification, RawUserAction, Target,
};

/// Role of a roster user, used for audience fan-out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Student,
    Staff,
    Admin,
}

impl Role {
    fn in_target(&self, target: Target) -> bool {
        match target {
            Target::All => true,
            Target::Students => *self == Role::Student,
            Target::Staff => *self == Role::Staff,
            Target::Admin => *self == Role::Admin,
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "staff" => Ok(Role::Staff),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// A user known to the local backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalUser {
    pub id: String,
    pub role: Role,
    pub token: String,
}

#[derive(Debug, Clone, Default)]
struct UserAction {
    is_read: bool,
    read_at: Option<DateTime<Utc>>,
    is_archived: bool,
    is_deleted: bool,
}

#[derive(Debug, Clone)]
struct StoredNotification {
    id: NotificationId,
    title: String,
    message: String,
    kind: NotificationType,
    priority: Priority,
    created_at: DateTime<Utc>,
    target: Target,
    actions: HashMap<String, UserAction>,
}

impl StoredNotification {
    fn in_audience(&self, user: &LocalUser) -> bool {
        user.role.in_target(self.target)
    }

    fn visible_to(&self, user: &LocalUser) -> bool {
        self.in_audience(user)
            && self
                .actions
                .get(&user.id)
                .map_or(true, |a| !a.is_archived && !a.is_deleted)
    }

    fn listed_for(&self, user: &LocalUser, query: &ListQuery) -> bool {
        if !self.in_audience(user) {
            return false;
        }
        if let Some(action) = self.actions.get(&user.id) {
            if action.is_archived && !query.include_archived {
                return false;
            }
            if action.is_deleted && !query.include_deleted {
                return false;
            }
        }
        query.kind.map_or(true, |kind| kind == self.kind)
            && query.priority.map_or(true, |priority| priority == self.priority)
    }

    fn to_raw(&self, user_id: &str) -> RawNotification {
        let action = self.actions.get(user_id);
        RawNotification {
            id: self.id.clone(),
            title: self.title.clone(),
            message: self.message.clone(),
            kind: self.kind,
            priority: self.priority,
            created_at: Some(self.created_at),
            is_read: match action {
                Some(_) => None,
                None => Some(false),
            },
            notification_user_actions: action.map(|a| {
                vec![RawUserAction {
                    is_read: Some(a.is_read),
                    read_at: a.read_at,
                    is_archived: Some(a.is_archived),
                    is_deleted: Some(a.is_deleted),
                }]
            }),
        }
    }
}

#[derive(Debug, Default)]
struct LocalState {
    users: Vec<LocalUser>,
    notifications: Vec<StoredNotification>,
    next_id: u64,
    injected: VecDeque<TransportError>,
    latency: Duration,
}

impl LocalState {
    fn user_for(&self, token: &str) -> TransportResult<LocalUser> {
        self.users
            .iter()
            .find(|u| u.token == token)
            .cloned()
            .ok_or_else(TransportError::unauthorized)
    }

    fn visible_mut<'a>(
        &'a mut self,
        user: &'a LocalUser,
        id: &NotificationId,
    ) -> TransportResult<&'a mut StoredNotification> {
        self.notifications
            .iter_mut()
            .find(|n| &n.id == id && n.visible_to(user))
            .ok_or_else(|| TransportError::http(404, format!("Notification {id} not found")))
    }

    fn insert(&mut self, payload: &CreateNotification) -> (NotificationId, u32) {
        self.next_id += 1;
        let id = NotificationId::new(format!("n{}", self.next_id));
        let recipients = self
            .users
            .iter()
            .filter(|u| u.role.in_target(payload.target))
            .count() as u32;
        self.notifications.push(StoredNotification {
            id: id.clone(),
            title: payload.title.trim().to_string(),
            message: payload.message.trim().to_string(),
            kind: payload.kind,
            priority: payload.priority,
            created_at: Utc::now(),
            target: payload.target,
            actions: HashMap::new(),
        });
        (id, recipients)
    }
}

/// In-process stand-in for the notification REST API
#[derive(Debug, Default)]
pub struct LocalTransport {
    state: Mutex<LocalState>,
    calls: AtomicU64,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user that can authenticate with `token`
    pub fn add_user(&self, id: impl Into<String>, role: Role, token: impl Into<String>) {
        self.state.lock().users.push(LocalUser {
            id: id.into(),
            role,
            token: token.into(),
        });
    }

    /// Insert a notification directly, bypassing validation and auth
    pub fn seed(&self, payload: CreateNotification) -> NotificationId {
        self.state.lock().insert(&payload).0
    }

    /// Make the next call fail with `error`, regardless of its arguments
    pub fn fail_next(&self, error: TransportError) {
        self.state.lock().injected.push_back(error);
    }

    /// Delay every subsequent call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    /// Total number of calls received, including failed ones
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Whether `user_id` has read `id`, as the server sees it
    pub fn is_read_by(&self, id: &NotificationId, user_id: &str) -> bool {
        self.state
            .lock()
            .notifications
            .iter()
            .find(|n| &n.id == id)
            .and_then(|n| n.actions.get(user_id))
            .is_some_and(|a| a.is_read)
    }

    /// Count the call, apply latency, then surface any injected failure
    async fn begin(&self, call: &'static str) -> TransportResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = self.state.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        debug!(call, "Local transport call");
        match self.state.lock().injected.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn act<F>(&self, token: &str, id: &NotificationId, apply: F) -> TransportResult<()>
    where
        F: FnOnce(&mut UserAction),
    {
        let mut state = self.state.lock();
        let user = state.user_for(token)?;
        let notification = state.visible_mut(&user, id)?;
        apply(notification.actions.entry(user.id.clone()).or_default());
        Ok(())
    }
}

#[async_trait]
impl NotificationTransport for LocalTransport {
    async fn list(&self, token: &str, query: &ListQuery) -> TransportResult<ListResponse> {
        self.begin("list").await?;
        let state = self.state.lock();
        let user = state.user_for(token)?;
        let notifications = state
            .notifications
            .iter()
            .rev()
            .filter(|n| n.listed_for(&user, query))
            .map(|n| n.to_raw(&user.id))
            .collect();
        Ok(ListResponse { notifications })
    }

    async fn create(
        &self,
        token: &str,
        payload: &CreateNotification,
    ) -> TransportResult<CreateResponse> {
        self.begin("create").await?;
        let mut state = self.state.lock();
        let user = state.user_for(token)?;
        if user.role == Role::Student {
            return Err(TransportError::http(403, "Access denied"));
        }
        if payload.title.trim().is_empty() {
            return Err(TransportError::http(400, "Title is required"));
        }
        if payload.message.trim().is_empty() {
            return Err(TransportError::http(400, "Message is required"));
        }
        let (id, count) = state.insert(payload);
        debug!(%id, count, "Notification created");
        Ok(CreateResponse {
            success: true,
            count: Some(count),
            error: None,
        })
    }

    async fn mark_read(&self, token: &str, id: &NotificationId) -> TransportResult<()> {
        self.begin("mark_read").await?;
        self.act(token, id, |a| {
            a.is_read = true;
            a.read_at = Some(Utc::now());
        })
    }

    async fn mark_all_read(&self, token: &str) -> TransportResult<()> {
        self.begin("mark_all_read").await?;
        let mut state = self.state.lock();
        let user = state.user_for(token)?;
        let now = Utc::now();
        for n in state.notifications.iter_mut().filter(|n| n.visible_to(&user)) {
            let action = n.actions.entry(user.id.clone()).or_default();
            action.is_read = true;
            action.read_at.get_or_insert(now);
        }
        Ok(())
    }

    async fn delete(&self, token: &str, id: &NotificationId) -> TransportResult<()> {
        self.begin("delete").await?;
        self.act(token, id, |a| a.is_deleted = true)
    }

    async fn archive(&self, token: &str, id: &NotificationId) -> TransportResult<()> {
        self.begin("archive").await?;
        self.act(token, id, |a| a.is_archived = true)
    }

    async fn bulk_action(
        &self,
        token: &str,
        action: BulkAction,
        ids: &[NotificationId],
    ) -> TransportResult<()> {
        self.begin("bulk_action").await?;
        if ids.is_empty() {
            return Err(TransportError::http(400, "No notification IDs provided"));
        }
        let mut state = self.state.lock();
        let user = state.user_for(token)?;
        let now = Utc::now();
        // Audience only: restoring must reach items the user has hidden
        for n in state
            .notifications
            .iter_mut()
            .filter(|n| ids.contains(&n.id) && n.in_audience(&user))
        {
            let record = n.actions.entry(user.id.clone()).or_default();
            match action {
                BulkAction::Read => {
                    record.is_read = true;
                    record.read_at.get_or_insert(now);
                }
                BulkAction::Archive => record.is_archived = true,
                BulkAction::Delete => record.is_deleted = true,
                BulkAction::Unarchive => record.is_archived = false,
                BulkAction::Restore => record.is_deleted = false,
            }
        }
        Ok(())
    }
}
