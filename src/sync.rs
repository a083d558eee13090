// src/sync.rs - Keyed mutual exclusion
use dashmap::DashMap;
use parking_lot::Mutex;
use std::hash::Hash;
use std::sync::Arc;

/// One mutex per key, created on first use
///
/// Used to serialize ingestion per tag and alarm check-then-act per
/// definition without a global lock. Handles are cloned out of the map
/// before locking so no shard lock is held while waiting.
#[derive(Debug)]
pub struct KeyedLocks<K: Eq + Hash> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash + Copy> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Mutex guarding `key`
    pub fn handle(&self, key: K) -> Arc<Mutex<()>> {
        self.locks.entry(key).or_default().clone()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl<K: Eq + Hash + Copy> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}
