//! In-memory TTL cache for decoded feed payloads.
//!
//! Entries only record when they were inserted. The timeout is supplied on
//! every read, so retuning the timeout table immediately changes how existing
//! entries are judged without touching them. Expired entries are evicted
//! lazily by the read that finds them stale; there is no background sweeper.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// Snapshot of the cache contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_keys: usize,
    pub keys: Vec<String>,
}

/// Key/value store whose freshness is decided by the caller at read time.
///
/// The map sits behind a single mutex that is only held for the duration of
/// a map operation. Values are cloned out, so `V` should be cheap to clone
/// (the feed service stores `Arc` handles).
pub struct TtlCache<V> {
    entries: Mutex<HashMap<String, Entry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    // A panic while holding the lock cannot leave a half-written entry, so a
    // poisoned map is still usable.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the value for `key` unless it is missing or older than
    /// `timeout`. A stale entry is removed as a side effect.
    pub fn get(&self, key: &str, timeout: Duration) -> Option<V> {
        let mut entries = self.lock();
        let entry = entries.get(key)?;

        if entry.inserted_at.elapsed() > timeout {
            entries.remove(key);
            return None;
        }

        Some(entry.value.clone())
    }

    /// Stores `value` under `key`, replacing any previous entry and resetting
    /// its insertion time.
    pub fn set(&self, key: impl Into<String>, value: V) {
        let entry = Entry {
            value,
            inserted_at: Instant::now(),
        };
        self.lock().insert(key.into(), entry);
    }

    pub fn remove(&self, key: &str) {
        self.lock().remove(key);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Lists stored keys without checking expiry.
    pub fn stats(&self) -> CacheStats {
        let entries = self.lock();
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();

        CacheStats {
            total_keys: keys.len(),
            keys,
        }
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
