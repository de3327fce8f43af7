//! Bloom filter for fast negative key lookups

use crate::{LsmError, Result};
use bytes::{BufMut, BytesMut};

const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;

/// Bloom filter: a bit array probed by `hash_count` FNV-1a variants, each
/// re-seeded by its hash index. No false negatives; bounded false positives.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: Vec<u8>,
    size: usize,
    hash_count: u8,
}

impl BloomFilter {
    /// Create an empty filter with `size` bits and `hash_count` hash functions
    pub fn new(size: usize, hash_count: u8) -> Self {
        Self {
            bits: vec![0u8; size.div_ceil(8)],
            size,
            hash_count,
        }
    }

    /// Add a key to the filter
    pub fn add(&mut self, key: &str) {
        for i in 0..u32::from(self.hash_count) {
            let bit = self.bit_position(key, i);
            self.set_bit(bit);
        }
    }

    /// Check if a key may be in the set. `false` means definitely absent.
    pub fn might_contain(&self, key: &str) -> bool {
        for i in 0..u32::from(self.hash_count) {
            let bit = self.bit_position(key, i);
            if !self.get_bit(bit) {
                return false;
            }
        }
        true
    }

    /// Number of bits
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of hash functions
    pub fn hash_count(&self) -> u8 {
        self.hash_count
    }

    /// Serialize as `size (u32 LE) | hash_count (u8) | bits`
    pub fn serialize(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(5 + self.bits.len());
        buf.put_u32_le(self.size as u32);
        buf.put_u8(self.hash_count);
        buf.put_slice(&self.bits);
        buf
    }

    /// Reconstruct a filter from its serialized form
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        if data.len() < 5 {
            return Err(LsmError::CorruptFilter("block too short".into()));
        }

        let size = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        let hash_count = data[4];
        if size == 0 || hash_count == 0 {
            return Err(LsmError::CorruptFilter(format!(
                "implausible parameters: size={size} hash_count={hash_count}"
            )));
        }

        let bits = data[5..].to_vec();
        if bits.len() != size.div_ceil(8) {
            return Err(LsmError::CorruptFilter(format!(
                "bit array is {} bytes, expected {}",
                bits.len(),
                size.div_ceil(8)
            )));
        }

        Ok(Self {
            bits,
            size,
            hash_count,
        })
    }

    /// FNV-1a over the key bytes, re-seeded per hash index so that each index
    /// probes an independent position.
    fn bit_position(&self, key: &str, i: u32) -> usize {
        let mut h = FNV_OFFSET_BASIS ^ i;
        for &byte in key.as_bytes() {
            h = (h ^ u32::from(byte)).wrapping_mul(FNV_PRIME);
        }
        (h as usize) % self.size
    }

    fn set_bit(&mut self, bit: usize) {
        self.bits[bit / 8] |= 1 << (bit % 8);
    }

    fn get_bit(&self, bit: usize) -> bool {
        (self.bits[bit / 8] >> (bit % 8)) & 1 == 1
    }
}
