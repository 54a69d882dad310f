//! Shard Header
//!
//! `[0,8)` cursor, `[8,12)` block count, both big-endian.

use bytes::{Buf, BufMut};

use crate::error::{PackError, Result};

/// Header size: Cursor (8) + BlockCount (4) = 12 bytes
pub const HEADER_SIZE: u64 = 12;

const CURSOR_RANGE: std::ops::Range<usize> = 0..8;
const BLOCK_COUNT_RANGE: std::ops::Range<usize> = 8..12;

/// Persistent per-shard bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShardHeader {
    /// Offset where the next block will be allocated (0 until the first
    /// allocation)
    pub cursor: u64,
    /// Blocks ever allocated in this shard
    pub block_count: u32,
}

impl ShardHeader {
    /// Encode into the 12-byte on-disk form
    ///
    /// Each field owns its own byte range.
    pub fn encode(&self) -> [u8; HEADER_SIZE as usize] {
        let mut out = [0u8; HEADER_SIZE as usize];
        (&mut out[CURSOR_RANGE]).put_u64(self.cursor);
        (&mut out[BLOCK_COUNT_RANGE]).put_u32(self.block_count);
        out
    }

    /// Decode from the start of a shard file
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE as usize {
            return Err(PackError::CorruptMetadata(format!(
                "header needs {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }

        let cursor = (&bytes[CURSOR_RANGE]).get_u64();
        let block_count = (&bytes[BLOCK_COUNT_RANGE]).get_u32();

        if cursor != 0 && cursor < HEADER_SIZE {
            return Err(PackError::CorruptMetadata(format!(
                "cursor {} points inside the header",
                cursor
            )));
        }

        Ok(Self {
            cursor,
            block_count,
        })
    }

    /// Offset the next allocation will start at
    ///
    /// A fresh shard has cursor 0; its first block goes right after the
    /// header.
    pub fn next_offset(&self) -> u64 {
        self.cursor.max(HEADER_SIZE)
    }
}
