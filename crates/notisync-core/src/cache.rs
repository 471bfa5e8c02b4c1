//! In-memory notification cache
//!
//! Pure data holder: an ordered list of normalized notifications plus a
//! `loading` flag. No network awareness. Consumers read through
//! [`CacheView`] snapshots; only the engine holds a mutable reference.
//!
//! ```text
//!        replace_all                 set_loading(true)
//!  Empty ───────────▶ Populated ◀───────────────────▶ Loading
//!    ▲  set_loading(true)  │                              │
//!    └───────── clear ─────┴──────────── clear ───────────┘
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Notification, NotificationId};

/// Lifecycle state of a cache instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheState {
    /// Initial, or just torn down
    #[default]
    Empty,
    /// Fetch in flight
    Loading,
    /// Holds the result of a completed fetch
    Populated,
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheState::Empty => write!(f, "Empty"),
            CacheState::Loading => write!(f, "Loading"),
            CacheState::Populated => write!(f, "Populated"),
        }
    }
}

/// Read-only snapshot handed to consumers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheView {
    pub items: Vec<Notification>,
    pub loading: bool,
}

impl CacheView {
    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|n| !n.read).count()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Ordered notification list in server response order
#[derive(Debug, Default)]
pub struct NotificationCache {
    items: Vec<Notification>,
    loading: bool,
    populated: bool,
}

impl NotificationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[Notification] {
        &self.items
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn state(&self) -> CacheState {
        if self.loading {
            CacheState::Loading
        } else if self.populated {
            CacheState::Populated
        } else {
            CacheState::Empty
        }
    }

    pub fn get(&self, id: &NotificationId) -> Option<&Notification> {
        self.items.iter().find(|n| &n.id == id)
    }

    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|n| !n.read).count()
    }

    pub fn view(&self) -> CacheView {
        CacheView {
            items: self.items.clone(),
            loading: self.loading,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Mutation surface (engine only)
    // ═══════════════════════════════════════════════════════════════════════

    pub(crate) fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    /// Replace every item with a fresh server listing, keeping its order
    pub(crate) fn replace_all(&mut self, items: Vec<Notification>) {
        self.items = items;
        self.populated = true;
    }

    /// Apply `patch` to the item with `id`. Returns false if absent.
    pub(crate) fn patch_by_id<F>(&mut self, id: &NotificationId, patch: F) -> bool
    where
        F: FnOnce(&mut Notification),
    {
        match self.items.iter_mut().find(|n| &n.id == id) {
            Some(item) => {
                patch(item);
                true
            }
            None => false,
        }
    }

    /// Apply `patch` to every item
    pub(crate) fn patch_all<F>(&mut self, mut patch: F)
    where
        F: FnMut(&mut Notification),
    {
        self.items.iter_mut().for_each(|n| patch(n));
    }

    /// Remove the item with `id`, preserving the order of the rest
    pub(crate) fn remove_by_id(&mut self, id: &NotificationId) -> Option<Notification> {
        let index = self.items.iter().position(|n| &n.id == id)?;
        Some(self.items.remove(index))
    }

    /// Insert at the head, matching the server's newest-first order.
    ///
    /// An item already cached under the same id is replaced in place.
    pub(crate) fn append_one(&mut self, notification: Notification) {
        if let Some(existing) = self.items.iter_mut().find(|n| n.id == notification.id) {
            *existing = notification;
        } else {
            self.items.insert(0, notification);
        }
        self.populated = true;
    }

    /// Drop everything and return to `Empty`
    pub(crate) fn clear(&mut self) {
        self.items.clear();
        self.loading = false;
        self.populated = false;
    }
}
