//! notisync Core Library
//!
//! Keeps a client-held list of notifications consistent with the server
//! across login/logout, with optimistic read/archive/delete and quiet
//! handling of expected auth failures.
//!
//! ## Overview
//!
//! ```text
//! AuthSignal ──▶ LifecycleController ──▶ SyncEngine ──▶ NotificationCache
//!                  (login: fetch,          │  ▲              │
//!                   logout: teardown)      ▼  │              ▼
//!                                     Transport │        CacheView / SyncEvent
//!                                          └── ErrorClassifier (log-once latch)
//! ```
//!
//! - **Optimistic**: mutations hit the cache before the server answers
//! - **Auth-aware**: no transport call without a provable session
//! - **Stale-safe**: fetches resolving after teardown are discarded
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use notisync_core::{AuthSignal, LifecycleController, LocalTransport, SyncEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = Arc::new(LocalTransport::new());
//!     let auth = AuthSignal::new();
//!     let engine = SyncEngine::new(transport, auth.subscribe());
//!     let lifecycle = LifecycleController::new(engine.clone(), auth.subscribe()).spawn();
//!
//!     auth.login("token");
//!     // ... the controller fetches after a short debounce
//!     for n in engine.view().items {
//!         println!("{} {}", if n.read { " " } else { "●" }, n.title);
//!     }
//!
//!     lifecycle.unmount().await;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cache;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod result;
pub mod transport;
pub mod types;

// Re-exports
pub use auth::{AuthSignal, AuthState, UnreadCountHook};
pub use cache::{CacheState, CacheView, NotificationCache};
pub use classify::{ErrorClass, ErrorClassifier};
pub use config::{EngineConfig, InitialFetch, ReconcilePolicy};
pub use engine::{FetchOutcome, SyncEngine};
pub use error::{Operation, SyncError, SyncResult, TransportError};
pub use events::{SyncEvent, ToastKind};
pub use lifecycle::{LifecycleAction, LifecycleController, LifecycleHandle, LifecycleMachine};
pub use result::OpResult;
pub use transport::{LocalTransport, LocalUser, NotificationTransport, Role, TransportResult};
pub use types::*;
