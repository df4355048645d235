//! The per-entry metadata record and its codec.
//!
//! One record per entry, stored in the index under the raw name bytes.
//! `positions` keeps its on-disk shape in memory: a byte string of
//! varint-encoded block indices, appended to while streaming a write.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Metadata for a single entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    /// Full `/`-prefixed name.
    pub name: String,
    /// Total payload length in bytes.
    pub size: u64,
    /// Ordered block indices holding the payload; empty when inlined.
    pub positions: Blocks,
    /// Unix seconds at first creation; preserved across overwrites.
    pub create_time: i64,
    /// Unix seconds of the last mutation.
    pub mod_time: i64,
    /// Inlined payload for entries smaller than the inline threshold.
    pub small_data: Vec<u8>,
    /// IEEE CRC32 of the full payload.
    pub crc32: u32,
    /// Opaque user tags.
    pub tags: BTreeMap<String, String>,
}

impl Meta {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(raw: &[u8]) -> Result<Meta> {
        bincode::deserialize(raw).map_err(Error::Codec)
    }
}

/// A block-index list kept as a single varint-encoded byte string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blocks(Vec<u8>);

impl Blocks {
    /// Append one block index.
    pub fn push(&mut self, index: u32) {
        let mut v = index;
        loop {
            let b = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                self.0.push(b);
                return;
            }
            self.0.push(b | 0x80);
        }
    }

    pub fn iter(&self) -> BlocksIter<'_> {
        BlocksIter { rest: &self.0 }
    }

    /// Number of encoded indices.
    pub fn count(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

/// Decoding iterator over a [`Blocks`] byte string.
pub struct BlocksIter<'a> {
    rest: &'a [u8],
}

impl Iterator for BlocksIter<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        let mut value: u64 = 0;
        let mut shift = 0u32;
        for (i, &b) in self.rest.iter().enumerate() {
            value |= u64::from(b & 0x7f) << shift;
            if b & 0x80 == 0 {
                self.rest = &self.rest[i + 1..];
                return Some(value as u32);
            }
            shift += 7;
            if shift > 35 {
                break;
            }
        }
        // Truncated or oversized varint: stop rather than loop.
        self.rest = &[];
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_roundtrip() {
        let values = [0u32, 1, 127, 128, 255, 300_000, u32::MAX];
        let mut blocks = Blocks::default();
        for v in values {
            blocks.push(v);
        }
        let decoded: Vec<u32> = blocks.iter().collect();
        assert_eq!(decoded, values);
        assert_eq!(blocks.count(), values.len());
    }

    #[test]
    fn test_blocks_single_byte_indices() {
        let mut blocks = Blocks::default();
        for v in 0..128u32 {
            blocks.push(v);
        }
        // Every index below 128 encodes as one byte.
        assert_eq!(blocks.0.len(), 128);
    }

    #[test]
    fn test_meta_roundtrip() {
        let mut tags = BTreeMap::new();
        tags.insert("content-type".to_string(), "text/plain".to_string());

        let mut positions = Blocks::default();
        positions.push(3);
        positions.push(17);

        let meta = Meta {
            name: "/docs/readme.txt".to_string(),
            size: 150 * 1024,
            positions,
            create_time: 1_706_448_000,
            mod_time: 1_706_448_030,
            small_data: Vec::new(),
            crc32: 0xDEAD_BEEF,
            tags,
        };

        let encoded = meta.encode().unwrap();
        let decoded = Meta::decode(&encoded).unwrap();
        assert_eq!(decoded, meta);
    }

    #[test]
    fn test_meta_decode_garbage() {
        assert!(Meta::decode(&[0xff, 0x01]).is_err());
    }
}
