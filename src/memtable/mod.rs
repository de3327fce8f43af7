//! MemTable implementation using skip list
//!
//! The MemTable is an in-memory data structure that stores recent writes
//! in sorted order, allowing for fast writes and efficient range scans.
//! Deletions are stored as tombstone entries until compaction removes them.

mod skiplist;

use crate::{Entry, TOMBSTONE};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

pub use skiplist::SkipList;

/// MemTable for in-memory writes
pub struct MemTable {
    /// Skip list storing entries sorted by key
    data: RwLock<SkipList>,
    /// Byte size: sum of key length + value length over live entries
    size_bytes: AtomicUsize,
}

impl MemTable {
    /// Create a new MemTable
    pub fn new() -> Self {
        Self {
            data: RwLock::new(SkipList::new()),
            size_bytes: AtomicUsize::new(0),
        }
    }

    /// Insert or update an entry. On update the byte size is adjusted by the
    /// delta of the new minus the old value length.
    pub fn put(&self, key: &str, value: &str) {
        let mut data = self.data.write();
        match data.insert(key.to_string(), value.to_string()) {
            Some(old) => {
                if value.len() >= old.len() {
                    self.size_bytes
                        .fetch_add(value.len() - old.len(), Ordering::Relaxed);
                } else {
                    self.size_bytes
                        .fetch_sub(old.len() - value.len(), Ordering::Relaxed);
                }
            }
            None => {
                self.size_bytes
                    .fetch_add(key.len() + value.len(), Ordering::Relaxed);
            }
        }
    }

    /// Get the stored value, which may be the tombstone
    pub fn get(&self, key: &str) -> Option<String> {
        self.data.read().get(key).map(str::to_string)
    }

    /// Mark a key as deleted by storing the tombstone sentinel
    pub fn delete(&self, key: &str) {
        self.put(key, TOMBSTONE);
    }

    /// Snapshot of all entries in ascending key order, tombstones included
    pub fn entries(&self) -> Vec<Entry> {
        self.data
            .read()
            .iter()
            .map(|(k, v)| Entry::new(k, v))
            .collect()
    }

    /// Entries with `lo <= key <= hi` in ascending key order
    pub fn scan(&self, lo: &str, hi: &str) -> Vec<Entry> {
        self.data
            .read()
            .range(lo, hi)
            .map(|(k, v)| Entry::new(k, v))
            .collect()
    }

    /// Current byte size
    pub fn size(&self) -> usize {
        self.size_bytes.load(Ordering::Relaxed)
    }

    /// Check if the MemTable should be flushed
    pub fn should_flush(&self, size_threshold: usize) -> bool {
        self.size() >= size_threshold
    }

    /// Node count, tombstones included
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reset to empty
    pub fn clear(&self) {
        let mut data = self.data.write();
        *data = SkipList::new();
        self.size_bytes.store(0, Ordering::Relaxed);
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}
