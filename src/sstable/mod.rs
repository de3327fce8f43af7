//! SSTable (Sorted String Table) implementation
//!
//! Immutable on-disk storage with:
//! - entries in strictly ascending key order
//! - a sparse index mapping every Nth key to its record offset
//! - an embedded Bloom filter for fast negative lookups
//!
//! File layout (all integers little-endian):
//!
//! ```text
//! [Header: magic u32 | version u8 | entry_count u32]
//! [Data block: (key_len u16 | val_len u32 | key | value)*]
//! [Index block: (key_len u16 | offset u32 | key)*]
//! [Bloom block: size u32 | hash_count u8 | bits]
//! [Footer: data_offset u32 | index_offset u32 | bloom_offset u32 | magic u32]
//! ```

mod bloom;
mod builder;
mod reader;

pub use bloom::BloomFilter;
pub use builder::SSTableBuilder;
pub use reader::SSTableReader;

/// Magic number for SSTable files (ASCII "LSMT"), present in header and footer
pub const SSTABLE_MAGIC: u32 = 0x4C53_4D54;

/// SSTable format version
pub const FORMAT_VERSION: u8 = 1;

/// Header length: magic + version + entry count. The data block always
/// starts here.
pub(crate) const HEADER_LEN: usize = 9;

/// Footer length: three offsets + magic
pub(crate) const FOOTER_LEN: usize = 16;

/// File name for a table at `level` created at `timestamp`
pub fn table_file_name(level: usize, timestamp: u64) -> String {
    format!("L{level}_{timestamp}.sst")
}

/// Parse `L<level>_<timestamp>.sst`. Returns `None` for files that are not
/// SSTables; those are ignored by the engine.
pub fn parse_table_file_name(name: &str) -> Option<(usize, u64)> {
    let stem = name.strip_suffix(".sst")?;
    let stem = stem.strip_prefix('L')?;
    let (level, timestamp) = stem.split_once('_')?;
    if level.is_empty()
        || timestamp.is_empty()
        || !level.bytes().all(|b| b.is_ascii_digit())
        || !timestamp.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    Some((level.parse().ok()?, timestamp.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_file_name_round_trip() {
        let name = table_file_name(0, 1700000000123);
        assert_eq!(name, "L0_1700000000123.sst");
        assert_eq!(parse_table_file_name(&name), Some((0, 1700000000123)));
    }

    #[test]
    fn test_parse_rejects_foreign_files() {
        assert_eq!(parse_table_file_name("wal.log"), None);
        assert_eq!(parse_table_file_name("L0_123.sst.tmp"), None);
        assert_eq!(parse_table_file_name("L_123.sst"), None);
        assert_eq!(parse_table_file_name("L0_.sst"), None);
        assert_eq!(parse_table_file_name("Lx_1.sst"), None);
        assert_eq!(parse_table_file_name("L0_+1.sst"), None);
    }
}
