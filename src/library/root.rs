//! Cached identity of the root folder.

use std::sync::{Mutex, PoisonError};

/// Lazily populated id of the single root folder.
///
/// Owned by the [`Database`](crate::Database) handle. Anything that wipes
/// the store must call [`RootCache::invalidate`]; the next
/// `FolderService::root` call repopulates it.
#[derive(Debug, Default)]
pub struct RootCache {
    id: Mutex<Option<i64>>,
}

impl RootCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached root id, if populated.
    pub fn get(&self) -> Option<i64> {
        *self.id.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remember the root id.
    pub fn set(&self, id: i64) {
        *self.id.lock().unwrap_or_else(PoisonError::into_inner) = Some(id);
    }

    /// Forget the root id.
    pub fn invalidate(&self) {
        *self.id.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
