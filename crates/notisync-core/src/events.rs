//! Events emitted by the engine for consumer UIs
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  SyncEvent: Notifications about sync activity                   │
//! │  ├── Fetched: A fetch replaced the cache                        │
//! │  ├── FetchDiscarded: A stale fetch result was dropped           │
//! │  ├── TornDown: Session ended, cache cleared                     │
//! │  └── Toast: User-facing feedback (success or failure)           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Auth failures never produce a toast; they are an expected transitional
//! state while a session is being (re)established.

use std::fmt;

use serde::Serialize;

/// Severity of a toast message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    Success,
    Error,
}

impl fmt::Display for ToastKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToastKind::Success => write!(f, "success"),
            ToastKind::Error => write!(f, "error"),
        }
    }
}

/// Events emitted by the sync engine
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    /// A fetch completed and replaced the cached list
    Fetched {
        /// Number of notifications now cached
        count: usize,
        /// Number of unread notifications now cached
        unread: usize,
    },
    /// A fetch resolved after being superseded or torn down; its result was dropped
    FetchDiscarded {
        /// Generation ticket the fetch was started with
        ticket: u64,
    },
    /// Session ended; cache cleared and in-flight work invalidated
    TornDown,
    /// Feedback for the user
    Toast {
        kind: ToastKind,
        message: String,
    },
}

impl SyncEvent {
    pub fn success(message: impl Into<String>) -> Self {
        SyncEvent::Toast {
            kind: ToastKind::Success,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        SyncEvent::Toast {
            kind: ToastKind::Error,
            message: message.into(),
        }
    }

    /// Whether this event is something a user should see
    pub fn is_toast(&self) -> bool {
        matches!(self, SyncEvent::Toast { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toast_constructors() {
        assert_eq!(
            SyncEvent::success("done"),
            SyncEvent::Toast {
                kind: ToastKind::Success,
                message: "done".to_string()
            }
        );
        assert!(SyncEvent::failure("nope").is_toast());
        assert!(!SyncEvent::TornDown.is_toast());
    }

    #[test]
    fn test_event_serializes_tagged() {
        let json = serde_json::to_value(SyncEvent::Fetched { count: 2, unread: 1 }).unwrap();
        assert_eq!(json["event"], "fetched");
        assert_eq!(json["count"], 2);

        let json = serde_json::to_value(SyncEvent::failure("boom")).unwrap();
        assert_eq!(json["event"], "toast");
        assert_eq!(json["kind"], "error");
    }
}
