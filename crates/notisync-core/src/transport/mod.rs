//! Transport seam between the engine and the notification REST API
//!
//! The engine never speaks HTTP itself. Each logical operation maps to one
//! call on [`NotificationTransport`]; each call either yields the server's
//! payload or a [`TransportError`] the classifier can inspect.
//!
//! | Operation       | REST endpoint                               |
//! |-----------------|---------------------------------------------|
//! | `list`          | `GET    /api/notifications?{query}`         |
//! | `create`        | `POST   /api/notifications`                 |
//! | `mark_read`     | `PUT    /api/notifications/{id}/read`       |
//! | `mark_all_read` | `PUT    /api/notifications/mark-all-read`   |
//! | `archive`       | `PUT    /api/notifications/{id}/archive`    |
//! | `delete`        | `DELETE /api/notifications/{id}`            |
//! | `bulk_action`   | `POST   /api/notifications/bulk-action`     |
//!
//! `bulk_action` accepts `read`, `archive`, `delete`, `unarchive` and
//! `restore`. The list query (`include_archived`, `include_deleted`, `type`,
//! `priority`) narrows or widens what `list` returns.
//!
//! [`LocalTransport`] implements the same contract in-process.

pub mod local;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::types::{
    BulkAction, CreateNotification, CreateResponse, ListQuery, ListResponse, NotificationId,
};

pub use local::{LocalTransport, LocalUser, Role};

/// Result of a single transport call
pub type TransportResult<T> = Result<T, TransportError>;

/// One call per logical notification operation
///
/// `token` is the bearer credential of the current session; the engine only
/// calls the transport once it has proven one exists.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn list(&self, token: &str, query: &ListQuery) -> TransportResult<ListResponse>;

    async fn create(
        &self,
        token: &str,
        payload: &CreateNotification,
    ) -> TransportResult<CreateResponse>;

    async fn mark_read(&self, token: &str, id: &NotificationId) -> TransportResult<()>;

    async fn mark_all_read(&self, token: &str) -> TransportResult<()>;

    async fn delete(&self, token: &str, id: &NotificationId) -> TransportResult<()>;

    async fn archive(&self, token: &str, id: &NotificationId) -> TransportResult<()>;

    async fn bulk_action(
        &self,
        token: &str,
        action: BulkAction,
        ids: &[NotificationId],
    ) -> TransportResult<()>;
}
