//! Cached query results that must not outlive the session.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use serde_json::Value;

/// A cache of query results owned by the application.
///
/// The client only ever clears it, when the session ends, so one user's data is never
/// served to the next.
pub trait QueryCache: Send + Sync {
    /// Drops every cached result.
    fn clear(&self);
}

/// A [`QueryCache`] for applications that keep no cache.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopQueryCache;

impl QueryCache for NoopQueryCache {
    fn clear(&self) {}
}

/// A simple in-memory [`QueryCache`] keyed by query name.
#[derive(Debug, Default)]
pub struct MemoryQueryCache {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryQueryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached result for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Caches `value` under `key`.
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value);
    }

    /// Drops the cached result for `key`.
    pub fn invalidate(&self, key: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    /// Number of cached results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl QueryCache for MemoryQueryCache {
    fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn clear_drops_everything() {
        let cache = MemoryQueryCache::new();
        cache.insert("jobs", json!([{ "id": 1 }]));
        cache.insert("profile", json!({ "name": "Ada" }));
        cache.invalidate("profile");

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("jobs"), Some(json!([{ "id": 1 }])));

        QueryCache::clear(&cache);

        assert!(cache.is_empty());
        assert_eq!(cache.get("jobs"), None);
    }
}
