//! Bounded LRU memo for repeated path lookups.
//!
//! Protocol layers commonly issue getattr immediately followed by open on the
//! same not-yet-registered path. The memo keeps the most recently resolved
//! entries so the second call reuses the first call's [`CommandOutput`]
//! instead of parsing the command again and losing any output the first call
//! already produced.

use std::sync::Arc;

use hashlink::LruCache;

use crate::entry::CommandOutput;

/// A least-recently-used map of path → entry with a fixed capacity.
///
/// Capacity 1 reproduces a single-slot last-lookup memo; larger capacities
/// collapse lookups across a few interleaved paths.
pub struct LookupMemo {
    entries: LruCache<String, Arc<CommandOutput>>,
}

impl LookupMemo {
    pub const DEFAULT_CAPACITY: usize = 1;

    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: LruCache::new(capacity.max(1)),
        }
    }

    /// Fetch the memoized entry for `path`, marking it most recently used.
    pub fn get(&mut self, path: &str) -> Option<Arc<CommandOutput>> {
        self.entries.get(path).cloned()
    }

    /// Memoize `entry` under `path`, evicting the least recently used slot
    /// when full.
    pub fn insert(&mut self, path: &str, entry: Arc<CommandOutput>) {
        self.entries.insert(path.to_owned(), entry);
    }

    pub fn remove(&mut self, path: &str) {
        self.entries.remove(path);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
