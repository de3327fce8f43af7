//! SSTable builder for writing sorted entries to disk

use super::{BloomFilter, FOOTER_LEN, FORMAT_VERSION, HEADER_LEN, SSTABLE_MAGIC};
use crate::{Entry, LsmError, Result};
use bytes::{BufMut, BytesMut};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Builds an SSTable from entries fed in ascending key order.
///
/// The data block is accumulated in memory together with the sparse index and
/// the Bloom filter; [`SSTableBuilder::finish`] lays the file out and syncs it
/// to disk before returning.
pub struct SSTableBuilder {
    data: BytesMut,
    index: Vec<IndexEntry>,
    bloom: BloomFilter,
    sparse_interval: usize,
    entry_count: u32,
    last_key: Option<String>,
}

struct IndexEntry {
    key: String,
    /// Byte offset of the record, relative to file start
    offset: u32,
}

impl SSTableBuilder {
    /// Create a builder with the given Bloom filter parameters and
    /// sparse-index interval
    pub fn new(bloom_bits: usize, bloom_hashes: u8, sparse_interval: usize) -> Self {
        Self {
            data: BytesMut::new(),
            index: Vec::new(),
            bloom: BloomFilter::new(bloom_bits, bloom_hashes),
            sparse_interval: sparse_interval.max(1),
            entry_count: 0,
            last_key: None,
        }
    }

    /// Append one entry. Keys must arrive in strictly ascending order.
    pub fn add(&mut self, key: &str, value: &str) -> Result<()> {
        if let Some(last) = &self.last_key {
            if key <= last.as_str() {
                return Err(LsmError::InvalidArgument(format!(
                    "unsorted SSTable input: {key:?} after {last:?}"
                )));
            }
        }
        if key.len() > u16::MAX as usize {
            return Err(LsmError::InvalidArgument(format!(
                "key length {} exceeds u16 range",
                key.len()
            )));
        }
        if value.len() > u32::MAX as usize {
            return Err(LsmError::InvalidArgument(format!(
                "value length {} exceeds u32 range",
                value.len()
            )));
        }

        self.bloom.add(key);

        if self.entry_count as usize % self.sparse_interval == 0 {
            self.index.push(IndexEntry {
                key: key.to_string(),
                offset: (HEADER_LEN + self.data.len()) as u32,
            });
        }

        self.data.put_u16_le(key.len() as u16);
        self.data.put_u32_le(value.len() as u32);
        self.data.put_slice(key.as_bytes());
        self.data.put_slice(value.as_bytes());

        self.entry_count += 1;
        self.last_key = Some(key.to_string());
        Ok(())
    }

    /// Write the table to `path`. The file has reached durable storage when
    /// this returns.
    pub fn finish(self, path: &Path) -> Result<()> {
        let data_offset = HEADER_LEN as u32;
        let index_offset = data_offset + self.data.len() as u32;

        let mut index_buf = BytesMut::new();
        for entry in &self.index {
            index_buf.put_u16_le(entry.key.len() as u16);
            index_buf.put_u32_le(entry.offset);
            index_buf.put_slice(entry.key.as_bytes());
        }
        let bloom_offset = index_offset + index_buf.len() as u32;
        let bloom_buf = self.bloom.serialize();

        let mut header = BytesMut::with_capacity(HEADER_LEN);
        header.put_u32_le(SSTABLE_MAGIC);
        header.put_u8(FORMAT_VERSION);
        header.put_u32_le(self.entry_count);

        let mut footer = BytesMut::with_capacity(FOOTER_LEN);
        footer.put_u32_le(data_offset);
        footer.put_u32_le(index_offset);
        footer.put_u32_le(bloom_offset);
        footer.put_u32_le(SSTABLE_MAGIC);

        let mut file = BufWriter::new(File::create(path)?);
        file.write_all(&header)?;
        file.write_all(&self.data)?;
        file.write_all(&index_buf)?;
        file.write_all(&bloom_buf)?;
        file.write_all(&footer)?;
        file.flush()?;
        file.get_ref().sync_all()?;

        Ok(())
    }

    /// Write `entries` (already sorted ascending) to a new table at `path`
    pub fn write_table(
        path: &Path,
        entries: &[Entry],
        bloom_bits: usize,
        bloom_hashes: u8,
        sparse_interval: usize,
    ) -> Result<()> {
        let mut builder = Self::new(bloom_bits, bloom_hashes, sparse_interval);
        for entry in entries {
            builder.add(&entry.key, &entry.value)?;
        }
        builder.finish(path)
    }
}
