//! LSM orchestrator - composes the MemTable, WAL, SSTables, and compaction
//! into a single key-value store.
//!
//! Recency is positional: the MemTable is newer than any SSTable, a level-0
//! table created later is newer than an earlier one, and a lower level is
//! newer than a higher one. Reads stop at the first authoritative hit; scans
//! overlay newer sources onto older ones.

use super::StoreConfig;
use crate::compaction::{compact, Levels};
use crate::memtable::MemTable;
use crate::sstable::{parse_table_file_name, table_file_name, SSTableBuilder, SSTableReader};
use crate::types::{next_timestamp, validate_key, validate_value};
use crate::wal::{Wal, WalOp};
use crate::{Entry, LsmError, Result, TOMBSTONE};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

const WAL_FILE_NAME: &str = "wal.log";

/// Embedded LSM-tree key-value engine.
///
/// The engine is single-writer: one owning task issues all mutations. A data
/// directory is owned by exactly one live engine.
pub struct LsmEngine {
    config: StoreConfig,
    memtable: MemTable,
    wal: Wal,
    levels: RwLock<Levels>,
    last_timestamp: Mutex<u64>,
    closed: AtomicBool,
}

impl LsmEngine {
    /// Open the engine over `config.data_dir`, creating the directory if
    /// needed, loading existing SSTables, and replaying the WAL.
    pub fn open(config: StoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;

        let wal = Wal::open(config.data_dir.join(WAL_FILE_NAME), config.wal_sync)?;
        let (levels, last_timestamp) = Self::load_tables(&config)?;

        let engine = Self {
            config,
            memtable: MemTable::new(),
            wal,
            levels: RwLock::new(levels),
            last_timestamp: Mutex::new(last_timestamp),
            closed: AtomicBool::new(false),
        };

        let records = engine.wal.recover()?;
        if !records.is_empty() {
            info!(records = records.len(), "replaying write-ahead log");
            for record in &records {
                match record.op {
                    WalOp::Put => engine.memtable.put(&record.key, &record.value),
                    WalOp::Delete => engine.memtable.delete(&record.key),
                }
            }
        }

        Ok(engine)
    }

    /// Insert or update a key. The WAL record is durable before the change
    /// becomes observable.
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_open()?;
        validate_key(key)?;
        validate_value(value)?;

        self.wal.append(WalOp::Put, key, value)?;
        self.memtable.put(key, value);
        self.maybe_flush()
    }

    /// Delete a key. The key remains stored as a tombstone until bottom-level
    /// compaction removes it.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.ensure_open()?;
        validate_key(key)?;

        self.wal.append(WalOp::Delete, key, TOMBSTONE)?;
        self.memtable.delete(key);
        self.maybe_flush()
    }

    /// Get the current value for a key, or `None` if absent or deleted
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.ensure_open()?;

        if let Some(value) = self.memtable.get(key) {
            return Ok(Self::visible(value));
        }

        let levels = self.levels.read();
        for tables in levels.iter() {
            // Stored order within a level is newest to oldest
            for table in tables {
                if let Some(value) = table.get(key)? {
                    return Ok(Self::visible(value));
                }
            }
        }

        Ok(None)
    }

    /// Entries with `lo <= key <= hi` in ascending key order, tombstones
    /// filtered out.
    pub fn scan(&self, lo: &str, hi: &str) -> Result<Vec<Entry>> {
        self.ensure_open()?;

        // Overlay older sources with newer ones: highest level first, oldest
        // table first within a level, the MemTable last.
        let mut merged: BTreeMap<String, String> = BTreeMap::new();
        {
            let levels = self.levels.read();
            for tables in levels.iter().rev() {
                for table in tables.iter().rev() {
                    for entry in table.scan(lo, hi)? {
                        merged.insert(entry.key, entry.value);
                    }
                }
            }
        }
        for entry in self.memtable.scan(lo, hi) {
            merged.insert(entry.key, entry.value);
        }

        Ok(merged
            .into_iter()
            .filter(|(_, value)| value != TOMBSTONE)
            .map(|(key, value)| Entry::new(key, value))
            .collect())
    }

    /// Flush the MemTable to a new level-0 SSTable and run a compaction
    /// pass. A no-op when the MemTable is empty.
    pub fn flush(&self) -> Result<()> {
        self.ensure_open()?;
        self.flush_inner()
    }

    /// Flush outstanding writes and mark the engine closed. Idempotent;
    /// subsequent operations fail with [`LsmError::Closed`].
    pub fn close(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        if !self.memtable.is_empty() {
            self.flush_inner()?;
        }
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Read-only snapshot of engine counters
    pub fn stats(&self) -> Result<EngineStats> {
        self.ensure_open()?;

        let levels = self.levels.read();
        let level_stats = levels
            .iter()
            .enumerate()
            .map(|(level, tables)| LevelStats {
                level,
                tables: tables.len(),
                entries: tables.iter().map(|t| u64::from(t.entry_count())).sum(),
                file_bytes: tables.iter().map(SSTableReader::file_size).sum(),
            })
            .collect();

        Ok(EngineStats {
            memtable_entries: self.memtable.len(),
            memtable_bytes: self.memtable.size(),
            levels: level_stats,
        })
    }

    /// Bounded samples of entries from the MemTable and every table, for
    /// debugging. Not on any hot path.
    pub fn inspect(&self, limit: usize) -> Result<EngineInspect> {
        self.ensure_open()?;

        let mut memtable = self.memtable.entries();
        memtable.truncate(limit);

        let levels_guard = self.levels.read();
        let mut levels = Vec::with_capacity(levels_guard.len());
        for tables in levels_guard.iter() {
            let mut level = Vec::with_capacity(tables.len());
            for table in tables {
                let mut sample = table.entries()?;
                sample.truncate(limit);
                level.push(TableInspect {
                    file: table
                        .path()
                        .file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or_default()
                        .to_string(),
                    entry_count: table.entry_count(),
                    file_size: table.file_size(),
                    sample,
                });
            }
            levels.push(level);
        }

        Ok(EngineInspect { memtable, levels })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(LsmError::Closed);
        }
        Ok(())
    }

    fn visible(value: String) -> Option<String> {
        if value == TOMBSTONE {
            None
        } else {
            Some(value)
        }
    }

    fn maybe_flush(&self) -> Result<()> {
        if self.memtable.should_flush(self.config.memtable_size_threshold) {
            self.flush_inner()?;
        }
        Ok(())
    }

    fn flush_inner(&self) -> Result<()> {
        let entries = self.memtable.entries();
        if entries.is_empty() {
            return Ok(());
        }

        let mut last_timestamp = self.last_timestamp.lock();
        let timestamp = next_timestamp(&mut last_timestamp);
        let path = self.config.data_dir.join(table_file_name(0, timestamp));
        SSTableBuilder::write_table(
            &path,
            &entries,
            self.config.bloom_filter_size,
            self.config.bloom_hash_count,
            self.config.sparse_index_interval,
        )?;
        let reader = SSTableReader::open(&path)?;
        info!(entries = entries.len(), file = %path.display(), "flushed memtable");

        let mut levels = self.levels.write();
        levels[0].insert(0, reader);

        // The table is durable on disk, so the log records it covers can go.
        // A crash before this point replays them onto an empty MemTable.
        self.memtable.clear();
        self.wal.clear()?;

        compact(
            &mut levels,
            &self.config.data_dir,
            &self.config,
            &mut last_timestamp,
        )
    }

    /// Enumerate `L<level>_<timestamp>.sst` files into per-level newest-first
    /// order. Corrupt tables are skipped with a warning; foreign files are
    /// ignored.
    fn load_tables(config: &StoreConfig) -> Result<(Levels, u64)> {
        let mut tagged: Vec<Vec<(u64, SSTableReader)>> =
            (0..config.max_levels).map(|_| Vec::new()).collect();
        let mut last_timestamp = 0;

        for dir_entry in fs::read_dir(&config.data_dir)? {
            let path = dir_entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some((level, timestamp)) = parse_table_file_name(name) else {
                continue;
            };
            if level >= config.max_levels {
                warn!(file = name, level, "table level out of range, ignoring");
                continue;
            }
            match SSTableReader::open(&path) {
                Ok(reader) => {
                    last_timestamp = last_timestamp.max(timestamp);
                    tagged[level].push((timestamp, reader));
                }
                Err(e) => warn!(file = name, error = %e, "skipping corrupt SSTable"),
            }
        }

        let mut levels: Levels = Vec::with_capacity(config.max_levels);
        for mut tables in tagged {
            tables.sort_by(|a, b| b.0.cmp(&a.0));
            levels.push(tables.into_iter().map(|(_, reader)| reader).collect());
        }

        Ok((levels, last_timestamp))
    }
}

/// Engine statistics
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub memtable_entries: usize,
    pub memtable_bytes: usize,
    pub levels: Vec<LevelStats>,
}

/// Per-level statistics
#[derive(Debug, Clone, Serialize)]
pub struct LevelStats {
    pub level: usize,
    pub tables: usize,
    pub entries: u64,
    pub file_bytes: u64,
}

/// Bounded view of engine contents
#[derive(Debug, Clone, Serialize)]
pub struct EngineInspect {
    pub memtable: Vec<Entry>,
    pub levels: Vec<Vec<TableInspect>>,
}

/// Bounded view of one table
#[derive(Debug, Clone, Serialize)]
pub struct TableInspect {
    pub file: String,
    pub entry_count: u32,
    pub file_size: u64,
    pub sample: Vec<Entry>,
}
