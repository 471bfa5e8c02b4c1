//! Transport failure classification with a log-once latch
//!
//! While a session is gone, every background call comes back 401. Auth
//! failures are logged once, then latched until an authenticated call
//! succeeds again.
//!
//! ```text
//!   success ─────────────────────────────┐
//!      │                                  ▼
//!  ┌───────────┐  401 (warn once)  ┌───────────┐
//!  │ Unlatched │ ────────────────▶ │  Latched  │ ◀─┐ 401 (silent)
//!  └───────────┘                   └───────────┘ ──┘
//! ```
//!
//! Non-auth failures bypass the latch entirely: always logged, always
//! surfaced.

use tracing::{error, warn};

use crate::error::{Operation, TransportError};

/// HTTP status that means "caller not authorized"
const UNAUTHORIZED: u16 = 401;

/// Outcome of classifying a transport failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    AuthRequired,
    Other,
}

/// Stateful classifier owning the auth-failure latch
#[derive(Debug, Default)]
pub struct ErrorClassifier {
    latched: bool,
    auth_diagnostics: u64,
}

impl ErrorClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pure classification, no logging and no latch change
    pub fn class_of(error: &TransportError) -> ErrorClass {
        match error.status {
            Some(UNAUTHORIZED) => ErrorClass::AuthRequired,
            _ => ErrorClass::Other,
        }
    }

    /// Classify a failure and emit the matching diagnostic
    pub fn classify(&mut self, error: &TransportError, operation: Operation) -> ErrorClass {
        let class = Self::class_of(error);
        match class {
            ErrorClass::AuthRequired => {
                if !self.latched {
                    warn!(
                        %operation,
                        "Authentication required for {}. User may need to log in.",
                        operation
                    );
                    self.latched = true;
                    self.auth_diagnostics += 1;
                }
            }
            ErrorClass::Other => {
                error!(%operation, error = %error, "Error {}", operation);
            }
        }
        class
    }

    /// Clear the latch after a successful authenticated operation
    pub fn reset(&mut self) {
        self.latched = false;
    }

    pub fn is_latched(&self) -> bool {
        self.latched
    }

    /// Number of auth diagnostics emitted over this classifier's lifetime
    pub fn auth_diagnostics(&self) -> u64 {
        self.auth_diagnostics
    }
}
