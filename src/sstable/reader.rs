//! SSTable reader for point lookups and range scans

use super::{BloomFilter, FOOTER_LEN, FORMAT_VERSION, HEADER_LEN, SSTABLE_MAGIC};
use crate::{Entry, LsmError, Result};
use bytes::Buf;
use std::fs;
use std::path::{Path, PathBuf};

/// Reader over one immutable SSTable file.
///
/// The file is buffered in memory at open time; the sparse index and Bloom
/// filter are parsed eagerly, so `get`/`scan` never touch the filesystem.
/// Readers never mutate the file.
pub struct SSTableReader {
    path: PathBuf,
    entry_count: u32,
    file_size: u64,
    /// The data block, `[data_offset, index_offset)` of the file
    data: Vec<u8>,
    index: Vec<IndexEntry>,
    bloom: BloomFilter,
}

struct IndexEntry {
    key: String,
    /// Byte offset of the record, relative to file start
    offset: u32,
}

impl SSTableReader {
    /// Open and validate an SSTable file
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let buf = fs::read(&path)?;

        if buf.len() < HEADER_LEN + FOOTER_LEN {
            return Err(LsmError::CorruptSstable(format!(
                "{}: file shorter than header and footer",
                path.display()
            )));
        }

        // Footer first: three offsets and the trailing magic
        let mut footer = &buf[buf.len() - FOOTER_LEN..];
        let data_offset = footer.get_u32_le() as usize;
        let index_offset = footer.get_u32_le() as usize;
        let bloom_offset = footer.get_u32_le() as usize;
        if footer.get_u32_le() != SSTABLE_MAGIC {
            return Err(LsmError::CorruptSstable(format!(
                "{}: bad footer magic",
                path.display()
            )));
        }

        // Then the header
        let mut header = &buf[..HEADER_LEN];
        if header.get_u32_le() != SSTABLE_MAGIC {
            return Err(LsmError::CorruptSstable(format!(
                "{}: bad header magic",
                path.display()
            )));
        }
        let version = header.get_u8();
        if version != FORMAT_VERSION {
            return Err(LsmError::CorruptSstable(format!(
                "{}: unsupported format version {version}",
                path.display()
            )));
        }
        let entry_count = header.get_u32_le();

        if data_offset != HEADER_LEN
            || index_offset < data_offset
            || bloom_offset < index_offset
            || bloom_offset > buf.len() - FOOTER_LEN
        {
            return Err(LsmError::CorruptSstable(format!(
                "{}: inconsistent region offsets",
                path.display()
            )));
        }

        let index = Self::parse_index(&buf[index_offset..bloom_offset], &path)?;
        if index
            .iter()
            .any(|e| (e.offset as usize) < HEADER_LEN || (e.offset as usize) > index_offset)
        {
            return Err(LsmError::CorruptSstable(format!(
                "{}: sparse index offset outside the data block",
                path.display()
            )));
        }
        if index
            .windows(2)
            .any(|pair| pair[0].key >= pair[1].key || pair[0].offset >= pair[1].offset)
        {
            return Err(LsmError::CorruptSstable(format!(
                "{}: sparse index not strictly ascending",
                path.display()
            )));
        }
        let bloom = BloomFilter::deserialize(&buf[bloom_offset..buf.len() - FOOTER_LEN])
            .map_err(|e| {
                LsmError::CorruptSstable(format!("{}: bad bloom block: {e}", path.display()))
            })?;

        let file_size = buf.len() as u64;
        let data = buf[data_offset..index_offset].to_vec();

        Ok(Self {
            path,
            entry_count,
            file_size,
            data,
            index,
            bloom,
        })
    }

    /// Path of the underlying file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries recorded in the header
    pub fn entry_count(&self) -> u32 {
        self.entry_count
    }

    /// Total file size in bytes
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Look up a key. Returns the stored value, which may be the tombstone.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        if !self.bloom.might_contain(key) {
            return Ok(None);
        }

        // Narrow the scan window with the sparse index: start from the last
        // indexed key <= target, stop at the first indexed key > target.
        let mut scan_start = HEADER_LEN as u32;
        let mut scan_end = (HEADER_LEN + self.data.len()) as u32;
        for entry in &self.index {
            if entry.key.as_str() > key {
                scan_end = entry.offset;
                break;
            }
            scan_start = entry.offset;
        }

        let lo = scan_start as usize - HEADER_LEN;
        let hi = scan_end as usize - HEADER_LEN;
        let mut records = Records::new(&self.data[lo..hi], &self.path);
        while let Some((record_key, value)) = records.next_record()? {
            match record_key.cmp(key.as_bytes()) {
                std::cmp::Ordering::Less => continue,
                std::cmp::Ordering::Equal => {
                    return Ok(Some(decode_utf8(value, &self.path)?));
                }
                std::cmp::Ordering::Greater => return Ok(None),
            }
        }

        Ok(None)
    }

    /// Entries with `lo <= key <= hi`, in ascending key order
    pub fn scan(&self, lo: &str, hi: &str) -> Result<Vec<Entry>> {
        let mut results = Vec::new();
        let mut records = Records::new(&self.data, &self.path);
        while let Some((key, value)) = records.next_record()? {
            if key > hi.as_bytes() {
                break;
            }
            if key >= lo.as_bytes() {
                results.push(Entry::new(
                    decode_utf8(key, &self.path)?,
                    decode_utf8(value, &self.path)?,
                ));
            }
        }
        Ok(results)
    }

    /// Every entry in the table, in ascending key order
    pub fn entries(&self) -> Result<Vec<Entry>> {
        let mut results = Vec::with_capacity(self.entry_count as usize);
        let mut records = Records::new(&self.data, &self.path);
        while let Some((key, value)) = records.next_record()? {
            results.push(Entry::new(
                decode_utf8(key, &self.path)?,
                decode_utf8(value, &self.path)?,
            ));
        }
        Ok(results)
    }

    fn parse_index(mut buf: &[u8], path: &Path) -> Result<Vec<IndexEntry>> {
        let mut entries = Vec::new();
        while !buf.is_empty() {
            if buf.len() < 6 {
                return Err(LsmError::CorruptSstable(format!(
                    "{}: truncated sparse index",
                    path.display()
                )));
            }
            let key_len = buf.get_u16_le() as usize;
            let offset = buf.get_u32_le();
            if buf.len() < key_len {
                return Err(LsmError::CorruptSstable(format!(
                    "{}: truncated sparse index key",
                    path.display()
                )));
            }
            let key = decode_utf8(&buf[..key_len], path)?;
            buf.advance(key_len);
            entries.push(IndexEntry { key, offset });
        }
        Ok(entries)
    }
}

/// Cursor over length-prefixed records in a data block slice
struct Records<'a> {
    buf: &'a [u8],
    path: &'a Path,
}

impl<'a> Records<'a> {
    fn new(buf: &'a [u8], path: &'a Path) -> Self {
        Self { buf, path }
    }

    fn next_record(&mut self) -> Result<Option<(&'a [u8], &'a [u8])>> {
        if self.buf.is_empty() {
            return Ok(None);
        }
        if self.buf.len() < 6 {
            return Err(self.truncated());
        }
        let mut buf: &'a [u8] = self.buf;
        let key_len = buf.get_u16_le() as usize;
        let val_len = buf.get_u32_le() as usize;
        if buf.len() < key_len + val_len {
            return Err(self.truncated());
        }
        let key = &buf[..key_len];
        let value = &buf[key_len..key_len + val_len];
        self.buf = &buf[key_len + val_len..];
        Ok(Some((key, value)))
    }

    fn truncated(&self) -> LsmError {
        LsmError::CorruptSstable(format!(
            "{}: unexpected end of data block inside a record",
            self.path.display()
        ))
    }
}

fn decode_utf8(bytes: &[u8], path: &Path) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|_| {
        LsmError::CorruptSstable(format!("{}: record is not valid UTF-8", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sstable::SSTableBuilder;
    use tempfile::TempDir;

    fn build(path: &Path, pairs: &[(&str, &str)]) {
        let entries: Vec<Entry> = pairs.iter().map(|(k, v)| Entry::new(*k, *v)).collect();
        SSTableBuilder::write_table(path, &entries, 1024, 7, 16).unwrap();
    }

    #[test]
    fn test_get_found_and_absent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("L0_1.sst");
        build(&path, &[("apple", "red"), ("banana", "yellow"), ("cherry", "dark")]);

        let reader = SSTableReader::open(&path).unwrap();
        assert_eq!(reader.entry_count(), 3);
        assert_eq!(reader.get("banana").unwrap().as_deref(), Some("yellow"));
        assert_eq!(reader.get("apple").unwrap().as_deref(), Some("red"));
        assert_eq!(reader.get("durian").unwrap(), None);
        assert_eq!(reader.get("aardvark").unwrap(), None);
    }

    #[test]
    fn test_get_across_sparse_windows() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("L0_2.sst");

        let entries: Vec<Entry> = (0..50)
            .map(|i| Entry::new(format!("key-{i:03}"), format!("val-{i}")))
            .collect();
        SSTableBuilder::write_table(&path, &entries, 1024, 7, 16).unwrap();

        let reader = SSTableReader::open(&path).unwrap();
        for i in 0..50 {
            assert_eq!(
                reader.get(&format!("key-{i:03}")).unwrap(),
                Some(format!("val-{i}")),
                "key-{i:03}"
            );
        }
        // Keys falling between records, before the first, and after the last
        assert_eq!(reader.get("key-007a").unwrap(), None);
        assert_eq!(reader.get("key-").unwrap(), None);
        assert_eq!(reader.get("key-999").unwrap(), None);
    }

    #[test]
    fn test_scan() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("L0_3.sst");
        build(
            &path,
            &[("a", "1"), ("b", "2"), ("c", "3"), ("d", "4"), ("e", "5")],
        );

        let reader = SSTableReader::open(&path).unwrap();

        let results = reader.scan("b", "d").unwrap();
        assert_eq!(
            results,
            vec![
                Entry::new("b", "2"),
                Entry::new("c", "3"),
                Entry::new("d", "4")
            ]
        );

        assert!(reader.scan("x", "z").unwrap().is_empty());
        assert_eq!(reader.scan("", "zzz").unwrap().len(), 5);
    }

    #[test]
    fn test_entries_sorted() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("L0_4.sst");
        build(&path, &[("a", "1"), ("b", "2"), ("c", "3")]);

        let reader = SSTableReader::open(&path).unwrap();
        let entries = reader.entries().unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries.windows(2).all(|w| w[0].key < w[1].key));
    }

    #[test]
    fn test_open_bad_magic() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("L0_5.sst");
        build(&path, &[("a", "1")]);

        let mut buf = fs::read(&path).unwrap();
        let len = buf.len();
        buf[len - 1] ^= 0xFF;
        fs::write(&path, &buf).unwrap();

        assert!(matches!(
            SSTableReader::open(&path),
            Err(LsmError::CorruptSstable(_))
        ));
    }

    #[test]
    fn test_open_truncated() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("L0_6.sst");
        fs::write(&path, b"short").unwrap();

        assert!(matches!(
            SSTableReader::open(&path),
            Err(LsmError::CorruptSstable(_))
        ));
    }

    #[test]
    fn test_value_with_delimiters() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("L0_7.sst");
        build(&path, &[("k", "a|b|c")]);

        let reader = SSTableReader::open(&path).unwrap();
        assert_eq!(reader.get("k").unwrap().as_deref(), Some("a|b|c"));
    }
}
