//! Short-lived cache of channel values.

use std::time::Duration;

use moka::sync::Cache;
use tracing::trace;

use crate::values::TypedValue;

/// Lifetime of a cached channel value.
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(2);

const MAX_ENTRIES: u64 = 1024;

/// Result of a remote fetch for one channel.
///
/// `siblings` carries the values of other channels that the same remote
/// call answered.
#[derive(Debug, Clone, PartialEq)]
pub struct Populated {
    pub value: TypedValue,
    pub siblings: Vec<(String, TypedValue)>,
}

impl Populated {
    pub fn single(value: TypedValue) -> Self {
        Self {
            value,
            siblings: Vec::new(),
        }
    }
}

/// Time-bounded channel value cache owned by one session.
///
/// Concurrent misses on the same channel may both fetch; the last writer
/// wins and the cache stays consistent.
#[derive(Clone)]
pub struct StateCache {
    entries: Cache<String, TypedValue>,
    ttl: Duration,
}

impl std::fmt::Debug for StateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateCache")
            .field("ttl", &self.ttl)
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

impl Default for StateCache {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_TTL)
    }
}

impl StateCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(MAX_ENTRIES)
                .time_to_live(ttl)
                .build(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached value of `channel_id`, without any remote call.
    pub fn get(&self, channel_id: &str) -> Option<TypedValue> {
        self.entries.get(channel_id)
    }

    pub fn insert(&self, channel_id: &str, value: TypedValue) {
        self.entries.insert(channel_id.to_string(), value);
    }

    pub fn invalidate(&self, channel_id: &str) {
        self.entries.invalidate(channel_id);
    }

    /// Cached value of `channel_id`, fetched with `fetch` on a miss.
    ///
    /// Sibling values returned by `fetch` are stored along with the
    /// requested one.
    pub fn get_or_populate<F>(&self, channel_id: &str, fetch: F) -> TypedValue
    where
        F: FnOnce() -> Populated,
    {
        if let Some(value) = self.entries.get(channel_id) {
            trace!("Cache hit for {}", channel_id);
            return value;
        }

        trace!("Cache miss for {}", channel_id);
        let populated = fetch();
        for (sibling, value) in populated.siblings {
            self.entries.insert(sibling, value);
        }
        self.entries
            .insert(channel_id.to_string(), populated.value.clone());
        populated.value
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.invalidate_all();
    }
}
