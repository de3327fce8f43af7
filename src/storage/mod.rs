//! Storage engine - coordinates all storage components

mod engine;

pub use engine::{EngineInspect, EngineStats, LevelStats, LsmEngine, TableInspect};

use crate::config;
use crate::wal::SyncPolicy;
use std::path::PathBuf;

/// Storage engine configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Data directory holding the WAL and all SSTables
    pub data_dir: PathBuf,
    /// MemTable byte size that triggers an automatic flush
    pub memtable_size_threshold: usize,
    /// Bits in each SSTable's embedded Bloom filter
    pub bloom_filter_size: usize,
    /// Hash functions per Bloom filter
    pub bloom_hash_count: u8,
    /// Number of compaction levels
    pub max_levels: usize,
    /// Table count per level that triggers compaction into the next level
    pub size_ratio: usize,
    /// One sparse-index entry every N data records
    pub sparse_index_interval: usize,
    /// WAL durability policy
    pub wal_sync: SyncPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(config::DATA_DIR),
            memtable_size_threshold: config::MEMTABLE_SIZE_THRESHOLD,
            bloom_filter_size: config::BLOOM_FILTER_SIZE,
            bloom_hash_count: config::BLOOM_HASH_COUNT as u8,
            max_levels: config::MAX_LEVELS,
            size_ratio: config::SIZE_RATIO,
            sparse_index_interval: config::SPARSE_INDEX_INTERVAL,
            wal_sync: SyncPolicy::default(),
        }
    }
}
