//! Error types for the notification sync engine

use std::fmt;

use thiserror::Error;

/// Logical operation an error originated from.
///
/// Carried in errors and log fields so a failure can be traced back to the
/// call site without string matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Fetch,
    Create,
    MarkRead,
    MarkAllRead,
    Delete,
    Archive,
    BulkAction,
}

impl Operation {
    /// Human-readable description used in diagnostics
    pub fn describe(&self) -> &'static str {
        match self {
            Operation::Fetch => "notification fetching",
            Operation::Create => "notification creation",
            Operation::MarkRead => "marking notification as read",
            Operation::MarkAllRead => "marking all notifications as read",
            Operation::Delete => "deleting notification",
            Operation::Archive => "archiving notification",
            Operation::BulkAction => "bulk notification action",
        }
    }

    /// Toast shown to the user when this operation fails for a non-auth reason
    pub fn failure_message(&self) -> &'static str {
        match self {
            Operation::Fetch => "Failed to load notifications",
            Operation::Create => "Failed to send notification",
            Operation::MarkRead => "Failed to mark notification as read",
            Operation::MarkAllRead => "Failed to mark notifications as read",
            Operation::Delete => "Failed to delete notification",
            Operation::Archive => "Failed to archive notification",
            Operation::BulkAction => "Failed to update notifications",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Raw failure reported by a transport call.
///
/// `status` is the HTTP status when the server answered; `None` means the
/// request never got a response (network down, connection reset).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub status: Option<u16>,
    pub message: String,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(code) => write!(f, "HTTP {}: {}", code, self.message),
            None => write!(f, "network error: {}", self.message),
        }
    }
}

impl std::error::Error for TransportError {}

impl TransportError {
    /// Error for a response carrying the given HTTP status
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Error for a request that never received a response
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    /// 401 shorthand
    pub fn unauthorized() -> Self {
        Self::http(401, "Authentication required")
    }
}

/// Main error type for sync engine operations
#[derive(Error, Debug)]
pub enum SyncError {
    /// No provable session; the transport was never called
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The transport rejected the call as unauthorized
    #[error("Authentication required for {operation}")]
    AuthRequired { operation: Operation },

    /// Any other transport or network failure
    #[error("Error {operation}: {source}")]
    Transport {
        operation: Operation,
        #[source]
        source: TransportError,
    },

    /// The server answered but refused the request
    #[error("{0}")]
    Rejected(String),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),
}

impl SyncError {
    /// Whether this failure is an expected auth transition rather than a user error
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            SyncError::NotAuthenticated | SyncError::AuthRequired { .. }
        )
    }
}

/// Result type alias using SyncError
pub type SyncResult<T> = Result<T, SyncError>;
