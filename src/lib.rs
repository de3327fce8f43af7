//! lsmkv - Embedded persistent LSM-tree key-value storage engine
//!
//! A single-node, single-writer ordered key-value store. Acknowledged writes
//! survive process crashes; reads always observe the most recent write for a
//! key.
//!
//! # Architecture
//!
//! lsmkv is an LSM-tree storage engine with the following components:
//!
//! - **WAL (Write-Ahead Log)**: durability guarantee through sequential appends
//! - **MemTable**: in-memory skip list buffering recent writes in sorted order
//! - **SSTable**: immutable sorted files on disk with a sparse index and an
//!   embedded Bloom filter
//! - **Compaction**: size-tiered level-wise merging of SSTables
//!
//! # Example
//!
//! ```no_run
//! use lsmkv::{LsmEngine, StoreConfig};
//!
//! let engine = LsmEngine::open(StoreConfig::default()).unwrap();
//! engine.put("name", "Alice").unwrap();
//! assert_eq!(engine.get("name").unwrap().as_deref(), Some("Alice"));
//! engine.close().unwrap();
//! ```

pub mod compaction;
pub mod memtable;
pub mod sstable;
pub mod storage;
pub mod wal;

mod error;
mod types;

pub use error::{LsmError, Result};
pub use storage::{EngineStats, LevelStats, LsmEngine, StoreConfig};
pub use types::{Entry, TOMBSTONE};

/// lsmkv version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod config {
    /// MemTable byte size that triggers an automatic flush (64KB)
    pub const MEMTABLE_SIZE_THRESHOLD: usize = 64 * 1024;

    /// Bits in each SSTable's embedded Bloom filter
    pub const BLOOM_FILTER_SIZE: usize = 1024;

    /// Hash functions per Bloom filter
    pub const BLOOM_HASH_COUNT: usize = 7;

    /// Number of compaction levels, 0..MAX_LEVELS-1
    pub const MAX_LEVELS: usize = 5;

    /// Table count per level that triggers compaction into the next level
    pub const SIZE_RATIO: usize = 4;

    /// One sparse-index entry every N data records
    pub const SPARSE_INDEX_INTERVAL: usize = 16;

    /// Default data directory
    pub const DATA_DIR: &str = "./data";
}
