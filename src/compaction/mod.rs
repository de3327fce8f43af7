//! Size-tiered compaction for the LSM tree
//!
//! When a level accumulates `size_ratio` tables, every table in it is merged
//! (newest wins on duplicate keys) into a single table at the next level, and
//! the source files are removed. Tombstones are dropped only when no deeper
//! level holds data, since a dropped tombstone could otherwise unmask an
//! older value.

use crate::sstable::{table_file_name, SSTableBuilder, SSTableReader};
use crate::storage::StoreConfig;
use crate::types::next_timestamp;
use crate::{Entry, Result};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{info, warn};

/// Per-level table handles. Index is the level; within a level, position 0
/// holds the newest table.
pub type Levels = Vec<Vec<SSTableReader>>;

/// Run one compaction pass over levels `0..max-1` in order.
///
/// Each level is examined once per call; a level promoted into is re-checked
/// on the next invocation.
pub fn compact(
    levels: &mut Levels,
    data_dir: &Path,
    config: &StoreConfig,
    last_timestamp: &mut u64,
) -> Result<()> {
    let max_levels = levels.len();

    for level in 0..max_levels.saturating_sub(1) {
        if levels[level].len() < config.size_ratio {
            continue;
        }

        let sources: Vec<Vec<Entry>> = levels[level]
            .iter()
            .map(|table| table.entries())
            .collect::<Result<_>>()?;
        let source_count = sources.len();

        // Tombstones can only be dropped once there is no older data that
        // they might still be hiding.
        let has_older_levels = (level + 1..max_levels).any(|deeper| !levels[deeper].is_empty());

        let mut merged = merge_sorted(sources);
        if !has_older_levels {
            merged.retain(|entry| !entry.is_tombstone());
        }

        if !merged.is_empty() {
            let timestamp = next_timestamp(last_timestamp);
            let path = data_dir.join(table_file_name(level + 1, timestamp));
            SSTableBuilder::write_table(
                &path,
                &merged,
                config.bloom_filter_size,
                config.bloom_hash_count,
                config.sparse_index_interval,
            )?;
            let reader = SSTableReader::open(&path)?;
            info!(
                level,
                tables = source_count,
                entries = merged.len(),
                file = %path.display(),
                "compacted level"
            );
            // Newest table at the target level
            levels[level + 1].insert(0, reader);
        }

        for table in levels[level].drain(..) {
            let path = table.path().to_path_buf();
            drop(table);
            if let Err(e) = fs::remove_file(&path) {
                // A file already removed by an earlier crash is not an error
                if e.kind() != ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "failed to remove compacted table");
                }
            }
        }
    }

    Ok(())
}

/// K-way merge of sorted entry sequences into one ascending sequence.
///
/// On a key held by several inputs, the entry from the lowest input index
/// (the newest table) wins and every input holding that key advances past it.
fn merge_sorted(inputs: Vec<Vec<Entry>>) -> Vec<Entry> {
    let mut positions = vec![0usize; inputs.len()];
    let mut heap: BinaryHeap<Reverse<(String, usize)>> = BinaryHeap::new();

    for (idx, input) in inputs.iter().enumerate() {
        if let Some(entry) = input.first() {
            heap.push(Reverse((entry.key.clone(), idx)));
        }
    }

    let mut merged = Vec::new();
    while let Some(Reverse((key, idx))) = heap.pop() {
        // Ties order by input index, so `idx` is the newest holder of `key`
        let entry = inputs[idx][positions[idx]].clone();
        positions[idx] += 1;
        if let Some(next) = inputs[idx].get(positions[idx]) {
            heap.push(Reverse((next.key.clone(), idx)));
        }

        // Advance every other input past the same key
        while let Some(Reverse((other_key, other_idx))) = heap.peek() {
            if *other_key != key {
                break;
            }
            let other_idx = *other_idx;
            heap.pop();
            positions[other_idx] += 1;
            if let Some(next) = inputs[other_idx].get(positions[other_idx]) {
                heap.push(Reverse((next.key.clone(), other_idx)));
            }
        }

        merged.push(entry);
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TOMBSTONE;
    use tempfile::TempDir;

    fn entries(pairs: &[(&str, &str)]) -> Vec<Entry> {
        pairs.iter().map(|(k, v)| Entry::new(*k, *v)).collect()
    }

    fn test_config(data_dir: &Path) -> StoreConfig {
        StoreConfig {
            data_dir: data_dir.to_path_buf(),
            ..StoreConfig::default()
        }
    }

    /// Build level-0 tables from `tables`, listed newest first
    fn seed_level0(dir: &Path, config: &StoreConfig, tables: &[Vec<Entry>]) -> Levels {
        let mut levels: Levels = (0..config.max_levels).map(|_| Vec::new()).collect();
        let newest = tables.len() as u64;
        for (i, table_entries) in tables.iter().enumerate() {
            // Newest-first input order means descending timestamps
            let timestamp = newest - i as u64;
            let path = dir.join(table_file_name(0, timestamp));
            SSTableBuilder::write_table(
                &path,
                table_entries,
                config.bloom_filter_size,
                config.bloom_hash_count,
                config.sparse_index_interval,
            )
            .unwrap();
            levels[0].push(SSTableReader::open(&path).unwrap());
        }
        levels
    }

    #[test]
    fn test_merge_newest_wins() {
        let merged = merge_sorted(vec![
            entries(&[("x", "NEW")]),
            entries(&[("x", "OLD_1")]),
            entries(&[("x", "OLD_2")]),
            entries(&[("y", "Y")]),
        ]);
        assert_eq!(merged, entries(&[("x", "NEW"), ("y", "Y")]));
    }

    #[test]
    fn test_merge_interleaved() {
        let merged = merge_sorted(vec![
            entries(&[("b", "new-b"), ("d", "4")]),
            entries(&[("a", "1"), ("b", "old-b"), ("c", "3")]),
        ]);
        assert_eq!(
            merged,
            entries(&[("a", "1"), ("b", "new-b"), ("c", "3"), ("d", "4")])
        );
    }

    #[test]
    fn test_compact_merges_level0_into_level1() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());
        let mut levels = seed_level0(
            temp_dir.path(),
            &config,
            &[
                entries(&[("x", "NEW")]),
                entries(&[("x", "OLD_1")]),
                entries(&[("x", "OLD_2")]),
                entries(&[("y", "Y")]),
            ],
        );
        let old_paths: Vec<_> = levels[0]
            .iter()
            .map(|t| t.path().to_path_buf())
            .collect();

        let mut last_timestamp = 100;
        compact(&mut levels, temp_dir.path(), &config, &mut last_timestamp).unwrap();

        assert!(levels[0].is_empty());
        assert_eq!(levels[1].len(), 1);
        assert_eq!(levels[1][0].get("x").unwrap().as_deref(), Some("NEW"));
        assert_eq!(levels[1][0].get("y").unwrap().as_deref(), Some("Y"));

        for path in old_paths {
            assert!(!path.exists());
        }
    }

    #[test]
    fn test_compact_below_ratio_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());
        let mut levels = seed_level0(
            temp_dir.path(),
            &config,
            &[entries(&[("a", "1")]), entries(&[("b", "2")])],
        );

        let mut last_timestamp = 100;
        compact(&mut levels, temp_dir.path(), &config, &mut last_timestamp).unwrap();

        assert_eq!(levels[0].len(), 2);
        assert!(levels[1].is_empty());
    }

    #[test]
    fn test_tombstones_dropped_at_bottom_level() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());
        let mut levels = seed_level0(
            temp_dir.path(),
            &config,
            &[
                entries(&[("a", TOMBSTONE)]),
                entries(&[("a", "old"), ("b", "1")]),
                entries(&[("c", "2")]),
                entries(&[("d", "3")]),
            ],
        );

        let mut last_timestamp = 100;
        compact(&mut levels, temp_dir.path(), &config, &mut last_timestamp).unwrap();

        let survivors = levels[1][0].entries().unwrap();
        assert!(survivors.iter().all(|e| e.key != "a"));
        assert_eq!(survivors, entries(&[("b", "1"), ("c", "2"), ("d", "3")]));
    }

    #[test]
    fn test_tombstones_retained_above_older_data() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());
        let mut levels = seed_level0(
            temp_dir.path(),
            &config,
            &[
                entries(&[("a", TOMBSTONE)]),
                entries(&[("b", "1")]),
                entries(&[("c", "2")]),
                entries(&[("d", "3")]),
            ],
        );

        // Deeper data for "a" that the tombstone must keep hiding
        let deep_path = temp_dir.path().join(table_file_name(2, 1));
        SSTableBuilder::write_table(
            &deep_path,
            &entries(&[("a", "ancient")]),
            config.bloom_filter_size,
            config.bloom_hash_count,
            config.sparse_index_interval,
        )
        .unwrap();
        levels[2].push(SSTableReader::open(&deep_path).unwrap());

        let mut last_timestamp = 100;
        compact(&mut levels, temp_dir.path(), &config, &mut last_timestamp).unwrap();

        let merged = levels[1][0].entries().unwrap();
        assert!(merged.contains(&Entry::new("a", TOMBSTONE)));
    }

    #[test]
    fn test_compact_all_tombstones_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());
        let mut levels = seed_level0(
            temp_dir.path(),
            &config,
            &[
                entries(&[("a", TOMBSTONE)]),
                entries(&[("b", TOMBSTONE)]),
                entries(&[("c", TOMBSTONE)]),
                entries(&[("d", TOMBSTONE)]),
            ],
        );

        let mut last_timestamp = 100;
        compact(&mut levels, temp_dir.path(), &config, &mut last_timestamp).unwrap();

        assert!(levels[0].is_empty());
        assert!(levels[1].is_empty());
    }
}
