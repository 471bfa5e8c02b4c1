//! Core types for the notification sync engine
//!
//! Two layers live here:
//!
//! - **Wire types** (`RawNotification`, `ListResponse`, `CreateResponse`):
//!   whatever shape the REST backend returns. The read flag may arrive as a
//!   top-level `is_read` / `isRead` field or nested inside
//!   `notification_user_actions[0]`.
//! - **Canonical types** (`Notification`): the single normalized shape the
//!   cache and every consumer see. `RawNotification::normalize` is the only
//!   conversion between the two.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Opaque, server-assigned notification identifier
///
/// The backend hands out string ids (UUIDs) but older endpoints return
/// integers; both deserialize into the same string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NotificationId(String);

impl NotificationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for NotificationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum WireId {
            Text(String),
            Number(i64),
        }

        Ok(match WireId::deserialize(deserializer)? {
            WireId::Text(s) => Self(s),
            WireId::Number(n) => Self(n.to_string()),
        })
    }
}

impl From<&str> for NotificationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NotificationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<i64> for NotificationId {
    fn from(n: i64) -> Self {
        Self(n.to_string())
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Severity/category of a notification
///
/// Unknown values degrade to `Info` instead of failing deserialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Info => "info",
            NotificationType::Success => "success",
            NotificationType::Warning => "warning",
            NotificationType::Error => "error",
        }
    }

    /// Lenient parse: anything unrecognized becomes `Info`
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(NotificationType::Info),
            "success" => Ok(NotificationType::Success),
            "warning" => Ok(NotificationType::Warning),
            "error" => Ok(NotificationType::Error),
            other => Err(format!("unknown notification type: {other}")),
        }
    }
}

impl<'de> Deserialize<'de> for NotificationType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(Self::parse_lenient).unwrap_or_default())
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery priority; unknown values degrade to `Medium`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default())
    }
}

/// Canonical notification record as held in the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub title: String,
    pub message: String,
    #[serde(rename = "type", default)]
    pub kind: NotificationType,
    #[serde(default)]
    pub priority: Priority,
    pub created_at: Option<DateTime<Utc>>,
    pub read: bool,
}

impl Notification {
    /// Minimal unread notification, mostly useful for pushes and tests
    pub fn new(id: impl Into<NotificationId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            message: String::new(),
            kind: NotificationType::Info,
            priority: Priority::Medium,
            created_at: None,
            read: false,
        }
    }
}

/// Per-user action sub-record attached by the backend join
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawUserAction {
    #[serde(default)]
    pub is_read: Option<bool>,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_archived: Option<bool>,
    #[serde(default)]
    pub is_deleted: Option<bool>,
}

/// Notification exactly as the backend serializes it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawNotification {
    pub id: NotificationId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type", default)]
    pub kind: NotificationType,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "isRead", skip_serializing_if = "Option::is_none")]
    pub is_read: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_user_actions: Option<Vec<RawUserAction>>,
}

impl RawNotification {
    /// Read flag, preferring the nested user-action record when it carries one
    pub fn read_state(&self) -> bool {
        self.notification_user_actions
            .as_ref()
            .and_then(|actions| actions.first())
            .and_then(|action| action.is_read)
            .or(self.is_read)
            .unwrap_or(false)
    }

    /// Convert to the canonical cache shape
    pub fn normalize(self) -> Notification {
        let read = self.read_state();
        Notification {
            id: self.id,
            title: self.title,
            message: self.message,
            kind: self.kind,
            priority: self.priority,
            created_at: self.created_at,
            read,
        }
    }
}

/// Body of `GET /api/notifications`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListResponse {
    #[serde(default)]
    pub notifications: Vec<RawNotification>,
}

/// Query parameters of `GET /api/notifications`
///
/// The default asks for what the cache holds: every live notification in
/// the caller's audience, any type, any priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub include_archived: bool,
    #[serde(default)]
    pub include_deleted: bool,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<NotificationType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

impl ListQuery {
    /// Also list notifications the caller archived
    pub fn with_archived(mut self) -> Self {
        self.include_archived = true;
        self
    }

    /// Also list notifications the caller deleted
    pub fn with_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    pub fn of_kind(mut self, kind: NotificationType) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn of_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// Audience of a created notification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    #[default]
    All,
    Students,
    Staff,
    Admin,
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Target::All),
            "students" => Ok(Target::Students),
            "staff" => Ok(Target::Staff),
            "admin" => Ok(Target::Admin),
            other => Err(format!(
                "Invalid target '{other}'. Must be one of: all, students, staff, admin"
            )),
        }
    }
}

/// Payload for `POST /api/notifications` (admin/staff only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateNotification {
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub target: Target,
    #[serde(rename = "type", default)]
    pub kind: NotificationType,
    #[serde(default)]
    pub priority: Priority,
}

impl CreateNotification {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            target: Target::All,
            kind: NotificationType::Info,
            priority: Priority::Medium,
        }
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    pub fn with_kind(mut self, kind: NotificationType) -> Self {
        self.kind = kind;
        self
    }
}

/// Body of a create response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What the engine hands back after a successful create
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateReceipt {
    /// Number of recipients the server fanned the notification out to
    pub count: u32,
}

/// Action applied to a set of notifications in one call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkAction {
    Read,
    Archive,
    Delete,
    Unarchive,
    Restore,
}

impl BulkAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkAction::Read => "read",
            BulkAction::Archive => "archive",
            BulkAction::Delete => "delete",
            BulkAction::Unarchive => "unarchive",
            BulkAction::Restore => "restore",
        }
    }

    /// Whether the action takes items out of the visible list
    pub fn removes(&self) -> bool {
        matches!(self, BulkAction::Archive | BulkAction::Delete)
    }

    /// Whether the action brings hidden items back into the visible list
    pub fn restores(&self) -> bool {
        matches!(self, BulkAction::Unarchive | BulkAction::Restore)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_and_string_ids() {
        let a: NotificationId = serde_json::from_str("1").unwrap();
        let b: NotificationId = serde_json::from_str("\"1\"").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "1");
    }

    #[test]
    fn test_unknown_type_degrades_to_info() {
        let raw: RawNotification =
            serde_json::from_str(r#"{"id": "n1", "type": "system"}"#).unwrap();
        assert_eq!(raw.kind, NotificationType::Info);

        let raw: RawNotification = serde_json::from_str(r#"{"id": "n1", "type": null}"#).unwrap();
        assert_eq!(raw.kind, NotificationType::Info);

        let raw: RawNotification =
            serde_json::from_str(r#"{"id": "n1", "type": "Warning"}"#).unwrap();
        assert_eq!(raw.kind, NotificationType::Warning);
    }

    #[test]
    fn test_read_state_top_level() {
        let raw: RawNotification =
            serde_json::from_str(r#"{"id": 7, "title": "Hi", "is_read": true}"#).unwrap();
        assert!(raw.normalize().read);

        let raw: RawNotification =
            serde_json::from_str(r#"{"id": 7, "isRead": true}"#).unwrap();
        assert!(raw.read_state());
    }

    #[test]
    fn test_read_state_prefers_nested_actions() {
        let raw: RawNotification = serde_json::from_str(
            r#"{
                "id": "abc",
                "is_read": true,
                "notification_user_actions": [{"is_read": false, "is_archived": false}]
            }"#,
        )
        .unwrap();
        assert!(!raw.read_state());

        // Nested record without a read flag falls back to the top-level one
        let raw: RawNotification = serde_json::from_str(
            r#"{"id": "abc", "is_read": true, "notification_user_actions": [{}]}"#,
        )
        .unwrap();
        assert!(raw.read_state());

        let raw: RawNotification =
            serde_json::from_str(r#"{"id": "abc", "notification_user_actions": []}"#).unwrap();
        assert!(!raw.read_state());
    }

    #[test]
    fn test_priority_defaults_to_medium() {
        let raw: RawNotification =
            serde_json::from_str(r#"{"id": "x", "priority": "whenever"}"#).unwrap();
        assert_eq!(raw.priority, Priority::Medium);
        let raw: RawNotification = serde_json::from_str(r#"{"id": "x", "priority": "high"}"#).unwrap();
        assert_eq!(raw.priority, Priority::High);
    }

    #[test]
    fn test_target_parse() {
        assert_eq!("students".parse::<Target>().unwrap(), Target::Students);
        let err = "everyone".parse::<Target>().unwrap_err();
        assert!(err.contains("Invalid target"));
    }

    #[test]
    fn test_bulk_action_removes() {
        assert!(!BulkAction::Read.removes());
        assert!(BulkAction::Archive.removes());
        assert!(BulkAction::Delete.removes());
        assert!(!BulkAction::Restore.removes());
        assert!(BulkAction::Unarchive.restores());
        assert!(BulkAction::Restore.restores());
        assert!(!BulkAction::Read.restores());

        let parsed: BulkAction = serde_json::from_str("\"unarchive\"").unwrap();
        assert_eq!(parsed, BulkAction::Unarchive);
        assert!(serde_json::from_str::<BulkAction>("\"purge\"").is_err());
    }

    #[test]
    fn test_list_query_wire_shape() {
        let query: ListQuery =
            serde_json::from_str(r#"{ "include_archived": true, "type": "warning" }"#).unwrap();
        assert_eq!(
            query,
            ListQuery::default()
                .with_archived()
                .of_kind(NotificationType::Warning)
        );
        assert!(!query.include_deleted);
        assert_eq!(query.priority, None);

        let json = serde_json::to_value(ListQuery::default().of_priority(Priority::High)).unwrap();
        assert_eq!(json["priority"], "high");
        assert!(json.get("type").is_none());
    }
}
