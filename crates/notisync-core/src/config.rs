//! Engine configuration
//!
//! All fields have defaults so an empty JSON object (or no file at all) is a
//! valid configuration.
//!
//! ```json
//! {
//!   "initial_fetch": { "debounce": { "debounce_ms": 100 } },
//!   "reconcile": "refetch",
//!   "event_capacity": 256
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// Default debounce before the first authenticated fetch
pub const DEFAULT_INITIAL_FETCH_DELAY: Duration = Duration::from_millis(100);

/// Default capacity for the event broadcast channel
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// When the first fetch of a session fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialFetch {
    /// Wait this long after auth becomes provable, to let dependent auth state settle
    Debounce {
        #[serde(rename = "debounce_ms", with = "millis")]
        delay: Duration,
    },
    /// Fetch as soon as auth is provable; for hosts that only publish settled auth states
    Immediate,
}

impl Default for InitialFetch {
    fn default() -> Self {
        InitialFetch::Debounce {
            delay: DEFAULT_INITIAL_FETCH_DELAY,
        }
    }
}

impl InitialFetch {
    pub fn delay(&self) -> Duration {
        match self {
            InitialFetch::Debounce { delay } => *delay,
            InitialFetch::Immediate => Duration::ZERO,
        }
    }
}

/// What to do with optimistic state after a mutation fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcilePolicy {
    /// Re-fetch from the server so the cache converges on the truth
    #[default]
    Refetch,
    /// Leave the optimistic state in place
    KeepOptimistic,
}

/// Configuration for [`crate::SyncEngine`] and [`crate::LifecycleController`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub initial_fetch: InitialFetch,
    pub reconcile: ReconcilePolicy,
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_fetch: InitialFetch::default(),
            reconcile: ReconcilePolicy::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> SyncResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.event_capacity == 0 {
            return Err(SyncError::Config(
                "event_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
